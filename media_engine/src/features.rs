//! §4.C Feature Extractor — `extract(path, classification) -> FileFeatures`.
//!
//! Dimension/pixel-format probing goes through `ffprobe` via the Process
//! Supervisor (§4.L) with a short timeout. `estimated_quality` is treated
//! as a black-box heuristic per §9 Open Questions — generalized here from
//! `shared_utils::image_quality_core`/`image_jpeg_analysis`/
//! `image_heic_analysis`, renormalized to the spec's `[0.0, 10.0]` range.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{EngineError, Result};
use crate::supervisor::{self, HangPolicy, JobContext};
use crate::types::{Classification, FileFeatures, SourceFormat};

const PROBE_TIMEOUT_FORMAT_FACTOR: f64 = 0.1; // short probe, not a full encode

fn probe_ctx(file_size: u64) -> JobContext {
    JobContext {
        file_size,
        complexity: 5,
        format_factor: PROBE_TIMEOUT_FORMAT_FACTOR,
    }
}

/// Run `ffprobe -v quiet -print_format json -show_format -show_streams
/// <path>` and return the parsed JSON value.
fn ffprobe_json(path: &Path, ffprobe_bin: &str, file_size: u64) -> Result<serde_json::Value> {
    let cancel = Arc::new(AtomicBool::new(false));
    let path_str = path.to_string_lossy().to_string();
    let args = [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        path_str.as_str(),
    ];
    let out = supervisor::run(ffprobe_bin, &args, probe_ctx(file_size), &cancel, HangPolicy::Terminate)?;
    if !out.status_success {
        return Err(EngineError::ProbeFailed {
            path: path.to_path_buf(),
            message: out.stderr,
        });
    }
    serde_json::from_str(&out.stdout).map_err(|e| EngineError::ProbeFailed {
        path: path.to_path_buf(),
        message: format!("failed to parse ffprobe JSON: {e}"),
    })
}

fn first_video_stream(v: &serde_json::Value) -> Option<&serde_json::Value> {
    v.get("streams")?
        .as_array()?
        .iter()
        .find(|s| s.get("codec_type").and_then(|c| c.as_str()) == Some("video"))
}

fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let n: f64 = num.parse().ok()?;
        let d: f64 = den.parse().ok()?;
        if d == 0.0 {
            return None;
        }
        Some(n / d)
    } else {
        s.parse().ok()
    }
}

/// Heuristic quality score combining file size, bits-per-pixel, and (for
/// JPEG) an implicit quantization-roughness proxy via bytes-per-pixel
/// banding. Output clamped to [0.0, 10.0].
fn estimate_quality(
    format: SourceFormat,
    width: u32,
    height: u32,
    file_size: u64,
) -> f64 {
    let pixels = (width as f64 * height as f64).max(1.0);
    let bits_per_pixel = (file_size as f64 * 8.0) / pixels;

    let base = match format {
        SourceFormat::Jpeg => {
            // JPEG visually-lossless territory sits around 2-4 bpp; below
            // ~0.5 bpp is visibly over-compressed.
            (bits_per_pixel / 3.0 * 10.0).clamp(0.0, 10.0)
        }
        SourceFormat::Png | SourceFormat::Bmp | SourceFormat::Tiff => 9.5, // presumed lossless
        SourceFormat::Gif => 6.0,
        _ => (bits_per_pixel / 2.0 * 10.0).clamp(0.0, 10.0),
    };
    base.clamp(0.0, 10.0)
}

pub fn extract(
    path: &Path,
    classification: Classification,
    file_size: u64,
    ffprobe_bin: &str,
) -> Result<FileFeatures> {
    if classification.is_video || matches!(
        classification.format,
        SourceFormat::Gif | SourceFormat::WebpAnimated | SourceFormat::Apng
    ) {
        return extract_via_ffprobe(path, classification, file_size, ffprobe_bin);
    }

    // Static images: decode dimensions with the `image` crate rather than
    // shelling out, it's cheap and already a workspace dependency.
    match image::image_dimensions(path) {
        Ok((width, height)) => {
            let has_alpha = image::open(path)
                .map(|img| img.color().has_alpha())
                .unwrap_or(false);
            let quality = estimate_quality(classification.format, width, height, file_size);
            Ok(FileFeatures {
                width,
                height,
                frame_count: 1,
                fps: None,
                pixel_format: None,
                has_alpha,
                estimated_quality: quality,
                container_metadata: HashMap::new(),
                format: classification.format,
            })
        }
        Err(e) => {
            debug!(?path, error = %e, "image-crate probe failed, falling back to ffprobe");
            extract_via_ffprobe(path, classification, file_size, ffprobe_bin)
        }
    }
}

fn extract_via_ffprobe(
    path: &Path,
    classification: Classification,
    file_size: u64,
    ffprobe_bin: &str,
) -> Result<FileFeatures> {
    let json = ffprobe_json(path, ffprobe_bin, file_size)?;
    let stream = first_video_stream(&json).ok_or_else(|| EngineError::ProbeFailed {
        path: path.to_path_buf(),
        message: "no video/image stream found in ffprobe output".to_string(),
    })?;

    let width = stream.get("width").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    let height = stream.get("height").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    let pixel_format = stream
        .get("pix_fmt")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let fps = stream
        .get("r_frame_rate")
        .and_then(|v| v.as_str())
        .and_then(parse_frame_rate);
    let frame_count = stream
        .get("nb_frames")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(if classification.is_animated { 2 } else { 1 });

    let mut container_metadata = HashMap::new();
    if let Some(fmt) = json.get("format") {
        if let Some(duration) = fmt.get("duration").and_then(|v| v.as_str()) {
            container_metadata.insert("duration".to_string(), duration.to_string());
        }
        if let Some(container) = fmt.get("format_name").and_then(|v| v.as_str()) {
            container_metadata.insert("container".to_string(), container.to_string());
        }
    }

    let quality = estimate_quality(classification.format, width, height, file_size);

    Ok(FileFeatures {
        width,
        height,
        frame_count,
        fps,
        pixel_format,
        has_alpha: false,
        estimated_quality: quality,
        container_metadata,
        format: classification.format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_frame_count_implies_animated() {
        let features = FileFeatures {
            width: 10,
            height: 10,
            frame_count: 5,
            fps: Some(10.0),
            pixel_format: None,
            has_alpha: false,
            estimated_quality: 5.0,
            container_metadata: HashMap::new(),
            format: SourceFormat::Gif,
        };
        assert!(features.is_animated());
    }

    #[test]
    fn quality_estimate_clamped_to_range() {
        let q = estimate_quality(SourceFormat::Jpeg, 1000, 1000, 100_000_000);
        assert!((0.0..=10.0).contains(&q));
        let q2 = estimate_quality(SourceFormat::Jpeg, 1000, 1000, 1);
        assert!((0.0..=10.0).contains(&q2));
    }

    #[test]
    fn png_presumed_near_lossless_quality() {
        let q = estimate_quality(SourceFormat::Png, 800, 600, 2_000_000);
        assert!(q > 8.0);
    }

    #[test]
    fn frame_rate_parses_fraction() {
        assert_eq!(parse_frame_rate("30000/1001"), Some(30000.0 / 1001.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
    }
}
