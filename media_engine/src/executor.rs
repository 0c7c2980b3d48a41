//! §4.E Conversion Executor — translates a `ConversionPlan` into a sequence
//! of external-command invocations, producing a `ConversionArtifact` at a
//! temp path. Never writes directly to the target.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{EngineError, Result};
use crate::supervisor::{self, HangPolicy, JobContext};
use crate::types::{CodecParams, ConversionArtifact, ConversionPlan, SourceFormat, TargetFormat};

/// Tools this executor shells out to, resolved ahead of time by the caller
/// from the `ToolProbeResult`.
pub struct ExecutorTools {
    pub cjxl: Option<PathBuf>,
    pub avifenc: Option<PathBuf>,
    pub ffmpeg: PathBuf,
    pub avif_encoder_name: &'static str, // "libaom-av1" or "libsvtav1"
}

fn format_factor(target: TargetFormat, source: SourceFormat) -> f64 {
    match (source, target) {
        (SourceFormat::Jpeg, _) => 1.0,
        (SourceFormat::Png, _) => 1.5,
        (SourceFormat::WebpStatic, _) | (SourceFormat::WebpAnimated, _) => 2.0,
        (SourceFormat::Heic, _) | (SourceFormat::Heif, _) => 2.5,
        _ if target == TargetFormat::Avif => 3.0,
        _ if target == TargetFormat::Jxl => 2.2,
        (SourceFormat::VideoMp4, _) | (SourceFormat::VideoMov, _) | (SourceFormat::VideoWebm, _) => 4.0,
        _ => 2.0,
    }
}

/// RAII guard that removes an intermediate file on every exit path
/// (success, error, or unwind), mirroring the rename-then-restore idiom
/// `shared_utils::metadata::exif` uses for its fallback path.
struct ScopedTempFile(PathBuf);

impl Drop for ScopedTempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn needs_intermediate_png(source: SourceFormat, target: TargetFormat) -> bool {
    match target {
        TargetFormat::Jxl => !matches!(
            source,
            SourceFormat::Jpeg | SourceFormat::Png | SourceFormat::Gif
        ),
        TargetFormat::Avif => !matches!(source, SourceFormat::Gif),
        TargetFormat::Mov => false,
    }
}

fn decode_to_intermediate_png(
    source: &Path,
    tmp_dir: &Path,
    tools: &ExecutorTools,
    ctx: JobContext,
    cancel: &Arc<AtomicBool>,
) -> Result<ScopedTempFile> {
    let intermediate = tmp_dir.join(format!("{}.png", uuid_like()));
    let source_str = source.to_string_lossy().to_string();
    let intermediate_str = intermediate.to_string_lossy().to_string();
    let args = ["-y", "-i", source_str.as_str(), intermediate_str.as_str()];
    let out = supervisor::run(
        tools.ffmpeg.to_string_lossy().as_ref(),
        &args,
        ctx,
        cancel,
        HangPolicy::Terminate,
    )?;
    if !out.status_success {
        return Err(EngineError::ConversionFailed {
            path: source.to_path_buf(),
            message: "intermediate PNG decode failed".to_string(),
            stderr: out.stderr,
        });
    }
    Ok(ScopedTempFile(intermediate))
}

/// Stand-in for a UUID without adding the `uuid` crate: combines process id,
/// a monotonic counter, and the current time's low bits. Uniqueness within
/// one run is all the spec requires (`<temp_dir>/<uuid>.<ext>`).
fn uuid_like() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{}-{}-{}", std::process::id(), n, nanos)
}

pub fn execute(
    source: &Path,
    source_format: SourceFormat,
    plan: &ConversionPlan,
    tmp_dir: &Path,
    file_size: u64,
    tools: &ExecutorTools,
    cancel: &Arc<AtomicBool>,
) -> Result<ConversionArtifact> {
    std::fs::create_dir_all(tmp_dir)?;
    let ext = plan.target_format.to_string();
    let temp_path = tmp_dir.join(format!("{}.{}", uuid_like(), ext));
    let factor = format_factor(plan.target_format, source_format);
    let ctx = JobContext {
        file_size,
        complexity: 50,
        format_factor: factor,
    };

    // Held for the remainder of this function so the intermediate PNG is
    // removed on every exit path, including an early `?` return or panic
    // unwind — the RAII idiom `shared_utils::metadata::exif`'s fallback
    // rename-and-retry path already relies on.
    let _intermediate_guard;
    let effective_source = if needs_intermediate_png(source_format, plan.target_format) {
        let guard = decode_to_intermediate_png(source, tmp_dir, tools, ctx, cancel)?;
        let path = guard.0.clone();
        _intermediate_guard = Some(guard);
        path
    } else {
        _intermediate_guard = None;
        source.to_path_buf()
    };

    let result = match &plan.params {
        CodecParams::Jxl {
            lossless_jpeg,
            distance,
            effort,
        } => execute_jxl(
            &effective_source,
            &temp_path,
            *lossless_jpeg,
            *distance,
            *effort,
            tools,
            ctx,
            cancel,
        ),
        CodecParams::Avif {
            crf,
            speed,
            animated,
        } => execute_avif(
            &effective_source,
            &temp_path,
            *crf,
            *speed,
            *animated,
            tools,
            ctx,
            cancel,
        ),
        CodecParams::Mov {
            repackage_only,
            reencode_codec,
        } => execute_mov(
            &effective_source,
            &temp_path,
            *repackage_only,
            reencode_codec.as_deref(),
            tools,
            ctx,
            cancel,
        ),
    };

    result.map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        e
    })?;

    let size = std::fs::metadata(&temp_path)?.len();
    Ok(ConversionArtifact {
        temp_path,
        size,
        target_format: plan.target_format,
    })
}

fn execute_jxl(
    input: &Path,
    output: &Path,
    lossless_jpeg: bool,
    distance: f64,
    effort: u8,
    tools: &ExecutorTools,
    ctx: JobContext,
    cancel: &Arc<AtomicBool>,
) -> Result<()> {
    let cjxl = tools
        .cjxl
        .as_ref()
        .ok_or_else(|| EngineError::ToolMissing {
            tool: "cjxl".to_string(),
        })?;
    let input_str = input.to_string_lossy().to_string();
    let output_str = output.to_string_lossy().to_string();
    let distance_str;
    let effort_str;
    let args: Vec<&str> = if lossless_jpeg {
        vec!["--lossless_jpeg=1", input_str.as_str(), output_str.as_str()]
    } else {
        distance_str = format!("{distance}");
        effort_str = format!("{effort}");
        vec![
            "-d",
            distance_str.as_str(),
            "-e",
            effort_str.as_str(),
            input_str.as_str(),
            output_str.as_str(),
        ]
    };
    info!(?input, ?output, "invoking cjxl");
    let out = supervisor::run(
        cjxl.to_string_lossy().as_ref(),
        &args,
        ctx,
        cancel,
        HangPolicy::Terminate,
    )?;
    if !out.status_success {
        return Err(EngineError::ConversionFailed {
            path: input.to_path_buf(),
            message: "cjxl exited non-zero".to_string(),
            stderr: out.stderr,
        });
    }
    Ok(())
}

fn execute_avif(
    input: &Path,
    output: &Path,
    crf: u8,
    speed: u8,
    animated: bool,
    tools: &ExecutorTools,
    ctx: JobContext,
    cancel: &Arc<AtomicBool>,
) -> Result<()> {
    let input_str = input.to_string_lossy().to_string();
    let output_str = output.to_string_lossy().to_string();

    if animated {
        let crf_str = format!("{crf}");
        let speed_str = format!("{speed}");
        let args = [
            "-i",
            input_str.as_str(),
            "-c:v",
            tools.avif_encoder_name,
            "-crf",
            crf_str.as_str(),
            "-cpu-used",
            speed_str.as_str(),
            "-an",
            "-y",
            output_str.as_str(),
        ];
        debug!(?input, encoder = tools.avif_encoder_name, "invoking ffmpeg for animated AVIF");
        let out = supervisor::run(
            tools.ffmpeg.to_string_lossy().as_ref(),
            &args,
            ctx,
            cancel,
            HangPolicy::Terminate,
        )?;
        if !out.status_success {
            return Err(EngineError::ConversionFailed {
                path: input.to_path_buf(),
                message: "ffmpeg animated AVIF encode failed".to_string(),
                stderr: out.stderr,
            });
        }
        return Ok(());
    }

    let avifenc = tools
        .avifenc
        .as_ref()
        .ok_or_else(|| EngineError::ToolMissing {
            tool: "avifenc".to_string(),
        })?;
    let speed_str = format!("{speed}");
    let quality_str = format!("{}", 100u32.saturating_sub(crf as u32 * 2).min(100));
    let args = [
        "-s",
        speed_str.as_str(),
        "-q",
        quality_str.as_str(),
        input_str.as_str(),
        output_str.as_str(),
    ];
    debug!(?input, "invoking avifenc");
    let out = supervisor::run(
        avifenc.to_string_lossy().as_ref(),
        &args,
        ctx,
        cancel,
        HangPolicy::Terminate,
    )?;
    if !out.status_success {
        return Err(EngineError::ConversionFailed {
            path: input.to_path_buf(),
            message: "avifenc exited non-zero".to_string(),
            stderr: out.stderr,
        });
    }
    Ok(())
}

fn execute_mov(
    input: &Path,
    output: &Path,
    repackage_only: bool,
    reencode_codec: Option<&str>,
    tools: &ExecutorTools,
    ctx: JobContext,
    cancel: &Arc<AtomicBool>,
) -> Result<()> {
    let input_str = input.to_string_lossy().to_string();
    let output_str = output.to_string_lossy().to_string();

    let args: Vec<String> = if repackage_only {
        vec![
            "-i".into(),
            input_str.clone(),
            "-c".into(),
            "copy".into(),
            "-movflags".into(),
            "+faststart".into(),
            "-y".into(),
            output_str.clone(),
        ]
    } else {
        let codec = reencode_codec.unwrap_or("libvvenc");
        vec![
            "-i".into(),
            input_str.clone(),
            "-c:v".into(),
            codec.to_string(),
            "-movflags".into(),
            "+faststart".into(),
            "-y".into(),
            output_str.clone(),
        ]
    };
    let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
    info!(?input, repackage_only, "invoking ffmpeg for MOV target");
    let out = supervisor::run(
        tools.ffmpeg.to_string_lossy().as_ref(),
        &args_ref,
        ctx,
        cancel,
        HangPolicy::Terminate,
    )?;
    if !out.status_success {
        return Err(EngineError::ConversionFailed {
            path: input.to_path_buf(),
            message: "ffmpeg MOV mux failed".to_string(),
            stderr: out.stderr,
        });
    }
    Ok(())
}
