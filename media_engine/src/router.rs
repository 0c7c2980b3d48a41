//! §4.D Router / Predictor — `plan(features, mode, stats_snapshot) ->
//! RouteDecision`, a pure function of its three inputs (§3 invariant,
//! §8 "Router is a pure function").

use serde::{Deserialize, Serialize};

use crate::types::{CodecParams, ConversionPlan, FileFeatures, RouteDecision, RunMode, SkipPlan,
    SourceFormat, TargetFormat};

/// Moving-average snapshot the scheduler refreshes between files, never
/// mid-plan — keeping `plan()` pure per call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// rule_name -> (sample_count, mean_saving)
    pub rule_samples: std::collections::HashMap<String, (u32, f64)>,
}

impl StatsSnapshot {
    fn saving_and_confidence(&self, rule_name: &str, seeded_saving: f64) -> (f64, f64) {
        match self.rule_samples.get(rule_name) {
            Some(&(count, mean)) if count > 0 => {
                let confidence = if count < 5 {
                    0.6_f64.min((count as f64) / 5.0 * 0.6)
                } else {
                    (0.6 + (count as f64 - 5.0) / 50.0).min(0.98)
                };
                (mean, confidence)
            }
            _ => (seeded_saving, 0.3),
        }
    }
}

const SMALL_SIZE: u64 = 100 * 1024;
const MEDIUM_SIZE: u64 = 10 * 1024 * 1024;

/// Canonical effort-by-size-bucket rule shared by every JXL golden rule.
fn effort_for_size(size_bytes: u64) -> u8 {
    if size_bytes <= SMALL_SIZE {
        9
    } else if size_bytes <= MEDIUM_SIZE {
        7
    } else {
        5
    }
}

fn jxl_plan(
    rule_name: &str,
    lossless_jpeg: bool,
    distance: f64,
    size_bytes: u64,
    seeded_saving: f64,
    expected_bytes: u64,
    stats: &StatsSnapshot,
) -> ConversionPlan {
    let effort = effort_for_size(size_bytes);
    let (saving, confidence) = stats.saving_and_confidence(rule_name, seeded_saving);
    ConversionPlan {
        target_format: TargetFormat::Jxl,
        params: CodecParams::Jxl {
            lossless_jpeg,
            distance,
            effort,
        },
        rule_name: rule_name.to_string(),
        confidence,
        expected_saving: saving,
        expected_bytes,
    }
}

fn avif_plan(
    rule_name: &str,
    crf: u8,
    speed: u8,
    animated: bool,
    seeded_saving: f64,
    expected_bytes: u64,
    stats: &StatsSnapshot,
) -> ConversionPlan {
    let (saving, confidence) = stats.saving_and_confidence(rule_name, seeded_saving);
    ConversionPlan {
        target_format: TargetFormat::Avif,
        params: CodecParams::Avif {
            crf,
            speed,
            animated,
        },
        rule_name: rule_name.to_string(),
        confidence,
        expected_saving: saving,
        expected_bytes,
    }
}

fn mov_plan(
    rule_name: &str,
    repackage_only: bool,
    reencode_codec: Option<String>,
    seeded_saving: f64,
    expected_bytes: u64,
    stats: &StatsSnapshot,
) -> ConversionPlan {
    let (saving, confidence) = stats.saving_and_confidence(rule_name, seeded_saving);
    ConversionPlan {
        target_format: TargetFormat::Mov,
        params: CodecParams::Mov {
            repackage_only,
            reencode_codec,
        },
        rule_name: rule_name.to_string(),
        confidence,
        expected_saving: saving,
        expected_bytes,
    }
}

fn skip(reason: &str) -> RouteDecision {
    RouteDecision::Skip(SkipPlan {
        reason: reason.to_string(),
    })
}

/// The authoritative decision table (§4.D). Pure: identical
/// `(features, mode, stats)` always yields an identical `RouteDecision`.
pub fn plan(
    features: &FileFeatures,
    mode: RunMode,
    stats: &StatsSnapshot,
    original_size: u64,
    h266_available: bool,
    h266_codec_override: Option<&str>,
) -> RouteDecision {
    if mode == RunMode::Emoji && features.format.is_video() {
        return skip("emoji_mode_skips_video");
    }

    if mode == RunMode::Emoji {
        // "*, emoji (image) -> AVIF aggressive crf>=50".
        return RouteDecision::Convert(avif_plan(
            "emoji_aggressive",
            55,
            6,
            features.is_animated(),
            0.7,
            original_size / 6,
            stats,
        ));
    }

    match features.format {
        SourceFormat::Jpeg => RouteDecision::Convert(jxl_plan(
            "jpeg_lossless_transcode",
            true,
            0.0,
            original_size,
            0.18,
            (original_size as f64 * 0.82) as u64,
            stats,
        )),
        SourceFormat::Png => RouteDecision::Convert(jxl_plan(
            "png_lossless",
            false,
            0.0,
            original_size,
            0.4,
            (original_size as f64 * 0.6) as u64,
            stats,
        )),
        SourceFormat::Gif if !features.is_animated() => RouteDecision::Convert(jxl_plan(
            "gif_static_lossless",
            false,
            0.0,
            original_size,
            0.35,
            (original_size as f64 * 0.65) as u64,
            stats,
        )),
        SourceFormat::Gif => RouteDecision::Convert(avif_plan(
            "gif_animated_to_avif",
            30,
            6,
            true,
            0.5,
            (original_size as f64 * 0.5) as u64,
            stats,
        )),
        SourceFormat::WebpStatic => RouteDecision::Convert(jxl_plan(
            "webp_static_via_intermediate",
            false,
            0.0,
            original_size,
            0.1,
            (original_size as f64 * 0.9) as u64,
            stats,
        )),
        SourceFormat::WebpAnimated => RouteDecision::Convert(avif_plan(
            "webp_animated_via_intermediate",
            30,
            6,
            true,
            0.2,
            (original_size as f64 * 0.8) as u64,
            stats,
        )),
        SourceFormat::Heic | SourceFormat::Heif => RouteDecision::Convert(jxl_plan(
            "heic_via_intermediate_png",
            false,
            0.0,
            original_size,
            -0.1,
            (original_size as f64 * 1.1) as u64,
            stats,
        )),
        SourceFormat::Apng => RouteDecision::Convert(avif_plan(
            "apng_to_avif",
            30,
            6,
            true,
            0.45,
            (original_size as f64 * 0.55) as u64,
            stats,
        )),
        SourceFormat::VideoMp4 | SourceFormat::VideoMov | SourceFormat::VideoWebm => {
            // Video always repackages by default; H.266 re-encode is an
            // optional target, activated only when the caller opts in via
            // `format_overrides` AND the Tool Probe confirmed `libvvenc` is
            // actually available (§9 Open Questions) — never automatically
            // just because the encoder probes available.
            let reencode_codec = h266_codec_override
                .filter(|_| h266_available)
                .map(|codec| codec.to_string());
            let repackage_only = reencode_codec.is_none();
            let rule_name = if repackage_only {
                "video_repackage"
            } else {
                "video_h266_reencode"
            };
            RouteDecision::Convert(mov_plan(
                rule_name,
                repackage_only,
                reencode_codec,
                0.02,
                original_size,
                stats,
            ))
        }
        SourceFormat::Avif | SourceFormat::Jxl | SourceFormat::Tiff | SourceFormat::Bmp => {
            RouteDecision::Convert(jxl_plan(
                "generic_static_via_intermediate",
                false,
                0.0,
                original_size,
                0.15,
                (original_size as f64 * 0.85) as u64,
                stats,
            ))
        }
        SourceFormat::Unknown => skip("unsupported"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn features(format: SourceFormat, frame_count: u32) -> FileFeatures {
        FileFeatures {
            width: 100,
            height: 100,
            frame_count,
            fps: None,
            pixel_format: None,
            has_alpha: false,
            estimated_quality: 8.0,
            container_metadata: HashMap::new(),
            format,
        }
    }

    #[test]
    fn router_is_pure() {
        let f = features(SourceFormat::Png, 1);
        let stats = StatsSnapshot::default();
        let a = plan(&f, RunMode::AutoPlus, &stats, 4_000_000, false, None);
        let b = plan(&f, RunMode::AutoPlus, &stats, 4_000_000, false, None);
        match (a, b) {
            (RouteDecision::Convert(p1), RouteDecision::Convert(p2)) => {
                assert_eq!(p1.rule_name, p2.rule_name);
                assert_eq!(p1.expected_saving, p2.expected_saving);
            }
            _ => panic!("expected Convert for both calls"),
        }
    }

    #[test]
    fn jpeg_routes_to_lossless_jxl() {
        let f = features(SourceFormat::Jpeg, 1);
        let stats = StatsSnapshot::default();
        match plan(&f, RunMode::AutoPlus, &stats, 2_000_000, false, None) {
            RouteDecision::Convert(p) => {
                assert_eq!(p.target_format, TargetFormat::Jxl);
                match p.params {
                    CodecParams::Jxl { lossless_jpeg, .. } => assert!(lossless_jpeg),
                    _ => panic!("expected Jxl params"),
                }
            }
            _ => panic!("expected Convert"),
        }
    }

    #[test]
    fn animated_gif_routes_to_avif() {
        let f = features(SourceFormat::Gif, 20);
        let stats = StatsSnapshot::default();
        match plan(&f, RunMode::AutoPlus, &stats, 1_000_000, false, None) {
            RouteDecision::Convert(p) => assert_eq!(p.target_format, TargetFormat::Avif),
            _ => panic!("expected Convert"),
        }
    }

    #[test]
    fn unknown_format_is_skipped() {
        let f = features(SourceFormat::Unknown, 1);
        let stats = StatsSnapshot::default();
        match plan(&f, RunMode::AutoPlus, &stats, 1000, false, None) {
            RouteDecision::Skip(s) => assert_eq!(s.reason, "unsupported"),
            _ => panic!("expected Skip"),
        }
    }

    #[test]
    fn video_in_emoji_mode_is_skipped() {
        let f = features(SourceFormat::VideoMp4, 1);
        let stats = StatsSnapshot::default();
        match plan(&f, RunMode::Emoji, &stats, 50_000_000, false, None) {
            RouteDecision::Skip(_) => {}
            _ => panic!("expected Skip for video in emoji mode"),
        }
    }

    #[test]
    fn video_repackages_by_default_even_when_h266_is_available() {
        let f = features(SourceFormat::VideoMov, 1);
        let stats = StatsSnapshot::default();
        match plan(&f, RunMode::AutoPlus, &stats, 10_000_000, true, None) {
            RouteDecision::Convert(p) => match p.params {
                CodecParams::Mov { repackage_only, reencode_codec } => {
                    assert!(repackage_only);
                    assert_eq!(reencode_codec, None);
                }
                _ => panic!("expected Mov params"),
            },
            _ => panic!("expected Convert"),
        }
    }

    #[test]
    fn video_h266_override_is_ignored_without_tool_probe_support() {
        let f = features(SourceFormat::VideoMov, 1);
        let stats = StatsSnapshot::default();
        match plan(&f, RunMode::AutoPlus, &stats, 10_000_000, false, Some("libvvenc")) {
            RouteDecision::Convert(p) => match p.params {
                CodecParams::Mov { repackage_only, reencode_codec } => {
                    assert!(repackage_only);
                    assert_eq!(reencode_codec, None);
                }
                _ => panic!("expected Mov params"),
            },
            _ => panic!("expected Convert"),
        }
    }

    #[test]
    fn video_h266_override_activates_reencode_when_probe_confirms_it() {
        let f = features(SourceFormat::VideoMov, 1);
        let stats = StatsSnapshot::default();
        match plan(&f, RunMode::AutoPlus, &stats, 10_000_000, true, Some("libvvenc")) {
            RouteDecision::Convert(p) => match p.params {
                CodecParams::Mov { repackage_only, reencode_codec } => {
                    assert!(!repackage_only);
                    assert_eq!(reencode_codec, Some("libvvenc".to_string()));
                }
                _ => panic!("expected Mov params"),
            },
            _ => panic!("expected Convert"),
        }
    }

    #[test]
    fn effort_buckets_match_size_thresholds() {
        assert_eq!(effort_for_size(50 * 1024), 9);
        assert_eq!(effort_for_size(5 * 1024 * 1024), 7);
        assert_eq!(effort_for_size(50 * 1024 * 1024), 5);
    }

    #[test]
    fn low_sample_count_caps_confidence_at_point_six() {
        let mut stats = StatsSnapshot::default();
        stats.rule_samples.insert("jpeg_lossless_transcode".to_string(), (3, 0.25));
        let f = features(SourceFormat::Jpeg, 1);
        match plan(&f, RunMode::AutoPlus, &stats, 2_000_000, false, None) {
            RouteDecision::Convert(p) => assert!(p.confidence <= 0.6),
            _ => panic!("expected Convert"),
        }
    }
}
