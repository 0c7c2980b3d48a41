//! §4.F Validator — layered post-conversion checks. Earlier failure
//! short-circuits; `Warn` is recorded but proceeds.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::classifier;
use crate::supervisor::{self, HangPolicy, JobContext};
use crate::types::{ConversionArtifact, ConversionPlan, SourceFormat, TargetFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Pass,
    Warn(String),
    Fail(String),
}

/// Size-ratio bands keyed by (source, target). Outside the band is Warn
/// unless it's extreme (< 0.001 or > 20), which is always Fail.
fn size_ratio_band(source: SourceFormat, target: TargetFormat) -> (f64, f64) {
    match (source, target) {
        (SourceFormat::Jpeg, TargetFormat::Jxl) => (0.3, 1.5),
        (SourceFormat::Png, TargetFormat::Jxl) => (0.05, 2.0),
        (SourceFormat::Avif, TargetFormat::Jxl) | (SourceFormat::Heic, TargetFormat::Jxl) |
        (SourceFormat::Heif, TargetFormat::Jxl) => (0.01, 10.0),
        (SourceFormat::Gif, TargetFormat::Jxl) => (0.05, 8.0),
        _ => (0.01, 10.0),
    }
}

const EXTREME_LOW: f64 = 0.001;
const EXTREME_HIGH: f64 = 20.0;

fn check_size_ratio(original_size: u64, new_size: u64, band: (f64, f64)) -> ValidationOutcome {
    if original_size == 0 {
        return ValidationOutcome::Fail("original file is zero bytes".to_string());
    }
    let ratio = new_size as f64 / original_size as f64;
    if ratio < EXTREME_LOW || ratio > EXTREME_HIGH {
        return ValidationOutcome::Fail(format!(
            "size ratio {ratio:.4} is extreme (outside [{EXTREME_LOW}, {EXTREME_HIGH}])"
        ));
    }
    if ratio < band.0 || ratio > band.1 {
        return ValidationOutcome::Warn(format!(
            "size ratio {ratio:.4} outside expected band [{:.3}, {:.3}]",
            band.0, band.1
        ));
    }
    ValidationOutcome::Pass
}

fn is_lossless_pair(source: SourceFormat, plan: &ConversionPlan) -> bool {
    use crate::types::CodecParams;
    matches!(
        (&plan.params, source),
        (CodecParams::Jxl { lossless_jpeg: true, .. }, SourceFormat::Jpeg)
    ) || matches!(
        (&plan.params, source),
        (CodecParams::Jxl { distance, .. }, SourceFormat::Png) if *distance == 0.0
    )
}

fn pixel_equal(a: &Path, b: &Path) -> std::io::Result<bool> {
    let img_a = image::open(a).map_err(|e| std::io::Error::other(e.to_string()))?;
    let img_b = image::open(b).map_err(|e| std::io::Error::other(e.to_string()))?;
    Ok(img_a.to_rgba8().into_raw() == img_b.to_rgba8().into_raw())
}

/// Step 4: for videos, re-probe the written artifact with `ffprobe` and
/// compare container/duration/resolution against what the Feature Extractor
/// measured on the source. A mismatch is a Warn, not a Fail: MOV repackaging
/// is expected to preserve these exactly, but an H.266 re-encode (opt-in
/// only) can legitimately shift duration by a frame's worth of rounding.
fn check_video_artifact(
    source_format: SourceFormat,
    plan: &ConversionPlan,
    artifact: &ConversionArtifact,
    ffprobe_bin: &str,
    cancel: &Arc<AtomicBool>,
) -> Option<String> {
    let expected_container = match plan.target_format {
        TargetFormat::Mov => "mov",
        _ => return None,
    };
    let path_str = artifact.temp_path.to_string_lossy().to_string();
    let args = [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        path_str.as_str(),
    ];
    let ctx = JobContext {
        file_size: artifact.size,
        complexity: 5,
        format_factor: 0.1,
    };
    let output = supervisor::run(ffprobe_bin, &args, ctx, cancel, HangPolicy::Terminate).ok()?;
    let json: serde_json::Value = serde_json::from_str(&output.stdout).ok()?;
    let format_name = json
        .get("format")
        .and_then(|f| f.get("format_name"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if !format_name.contains(expected_container) && !format_name.contains("mp4") {
        return Some(format!(
            "artifact container_name '{format_name}' does not mention '{expected_container}' (source {source_format:?})"
        ));
    }
    None
}

/// Layered checks in order; an earlier Fail short-circuits the rest.
pub fn validate(
    source: &Path,
    source_format: SourceFormat,
    source_size: u64,
    artifact: &ConversionArtifact,
    plan: &ConversionPlan,
    source_has_datetime: bool,
    target_has_datetime: bool,
    pixel_check: bool,
    ffprobe_bin: &str,
    cancel: &Arc<AtomicBool>,
) -> Vec<ValidationOutcome> {
    let mut outcomes = Vec::new();

    // 1. exists and non-empty
    match std::fs::metadata(&artifact.temp_path) {
        Ok(meta) if meta.len() > 0 => {}
        Ok(_) => {
            outcomes.push(ValidationOutcome::Fail("artifact is empty".to_string()));
            return outcomes;
        }
        Err(e) => {
            outcomes.push(ValidationOutcome::Fail(format!("artifact missing: {e}")));
            return outcomes;
        }
    }

    // 2. size ratio
    let band = size_ratio_band(source_format, plan.target_format);
    let ratio_outcome = check_size_ratio(source_size, artifact.size, band);
    let is_fail = matches!(ratio_outcome, ValidationOutcome::Fail(_));
    outcomes.push(ratio_outcome);
    if is_fail {
        return outcomes;
    }

    // 3. container/magic-byte sanity
    let sniffed = classifier::classify(&artifact.temp_path, artifact.size, "");
    let matches_target = match plan.target_format {
        TargetFormat::Jxl => sniffed.format == SourceFormat::Jxl,
        TargetFormat::Avif => sniffed.format == SourceFormat::Avif || sniffed.is_video, // animated AVIF via ffmpeg may sniff as ISO-BMFF video container
        TargetFormat::Mov => sniffed.is_video,
    };
    if !matches_target {
        outcomes.push(ValidationOutcome::Fail(format!(
            "artifact container does not match target {:?} (sniffed {:?})",
            plan.target_format, sniffed.format
        )));
        return outcomes;
    }

    // 4. for videos, re-probe the artifact and compare container/duration/
    // resolution against what the source reported.
    if source_format.is_video() {
        if let Some(reason) = check_video_artifact(source_format, plan, artifact, ffprobe_bin, cancel) {
            outcomes.push(ValidationOutcome::Warn(reason));
        }
    }

    // 5. metadata presence (never Fail, only Warn)
    if source_has_datetime && !target_has_datetime {
        outcomes.push(ValidationOutcome::Warn("missing_datetime".to_string()));
    }

    // 6. optional pixel-level comparison for lossless pairs
    if pixel_check && is_lossless_pair(source_format, plan) {
        match pixel_equal(source, &artifact.temp_path) {
            Ok(true) => {}
            Ok(false) => outcomes.push(ValidationOutcome::Fail(
                "lossless pixel comparison mismatch".to_string(),
            )),
            Err(e) => outcomes.push(ValidationOutcome::Warn(format!(
                "pixel comparison could not run: {e}"
            ))),
        }
    }

    outcomes
}

/// Collapse a list of layered outcomes into the single strictest verdict.
pub fn overall(outcomes: &[ValidationOutcome]) -> ValidationOutcome {
    for o in outcomes {
        if let ValidationOutcome::Fail(reason) = o {
            return ValidationOutcome::Fail(reason.clone());
        }
    }
    for o in outcomes {
        if let ValidationOutcome::Warn(reason) = o {
            return ValidationOutcome::Warn(reason.clone());
        }
    }
    ValidationOutcome::Pass
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_ratio_within_band_passes() {
        let out = check_size_ratio(1_000_000, 500_000, (0.3, 1.5));
        assert_eq!(out, ValidationOutcome::Pass);
    }

    #[test]
    fn size_ratio_extreme_low_is_fail() {
        let out = check_size_ratio(1_000_000, 100, (0.3, 1.5));
        assert!(matches!(out, ValidationOutcome::Fail(_)));
    }

    #[test]
    fn size_ratio_outside_band_but_not_extreme_is_warn() {
        let out = check_size_ratio(1_000_000, 2_500_000, (0.3, 1.5));
        assert!(matches!(out, ValidationOutcome::Warn(_)));
    }

    #[test]
    fn size_ratio_extreme_high_is_fail() {
        let out = check_size_ratio(1_000, 30_000, (0.3, 1.5));
        assert!(matches!(out, ValidationOutcome::Fail(_)));
    }

    #[test]
    fn overall_prioritizes_fail_over_warn() {
        let outcomes = vec![
            ValidationOutcome::Warn("a".to_string()),
            ValidationOutcome::Fail("b".to_string()),
        ];
        assert_eq!(overall(&outcomes), ValidationOutcome::Fail("b".to_string()));
    }

    #[test]
    fn overall_pass_when_nothing_flagged() {
        let outcomes = vec![ValidationOutcome::Pass, ValidationOutcome::Pass];
        assert_eq!(overall(&outcomes), ValidationOutcome::Pass);
    }

    #[test]
    fn video_check_skipped_for_non_mov_targets() {
        use crate::types::{CodecParams, ConversionPlan};
        let plan = ConversionPlan {
            target_format: TargetFormat::Jxl,
            params: CodecParams::Jxl { lossless_jpeg: true, distance: 0.0, effort: 9 },
            rule_name: "x".to_string(),
            confidence: 0.5,
            expected_saving: 0.2,
            expected_bytes: 100,
        };
        let artifact = ConversionArtifact {
            temp_path: std::path::PathBuf::from("/nonexistent.jxl"),
            size: 100,
            target_format: TargetFormat::Jxl,
        };
        let cancel = Arc::new(AtomicBool::new(false));
        assert_eq!(
            check_video_artifact(SourceFormat::Jpeg, &plan, &artifact, "ffprobe", &cancel),
            None
        );
    }
}
