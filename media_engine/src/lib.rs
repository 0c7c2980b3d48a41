//! Batch media-conversion engine: scan a directory tree, classify and probe
//! each file, route it to a JPEG XL / AVIF / MOV target, convert, validate,
//! migrate metadata, and atomically swap the result in. Generalizes the
//! teacher's single-format-pair CLI pipeline into one engine that drives
//! every target format from one codebase; CLI parsing and presentation stay
//! out of this crate (see the thin binaries at the workspace root).

pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod decision_gate;
pub mod errors;
pub mod events;
pub mod executor;
pub mod features;
pub mod migrator;
pub mod replacer;
pub mod router;
pub mod scheduler;
pub mod supervisor;
pub mod tool_probe;
pub mod types;
pub mod validator;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};
use walkdir::WalkDir;

use checkpoint::CheckpointStore;
use config::RunConfig;
use errors::{EngineError, Result};
use events::{EngineEvent, EventSink, PipelinePhase, PromptResponder};
use executor::ExecutorTools;
use router::StatsSnapshot;
use scheduler::{Job, PoolSizing, Scheduler};
use types::{
    Decision, FileFeatures, FileRecord, FileStatus, MediaFile, RouteDecision,
    SessionRecord, SessionStatus, SourceFormat,
};

/// Totals returned once a run (or a resumed remainder of one) finishes.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub session_id: String,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Combines pid, a process-local counter, and the current time into a
/// session id, the same spirit as `executor::uuid_like` avoiding a `uuid`
/// dependency for an identifier nobody parses back out.
fn new_session_id() -> String {
    use std::sync::atomic::AtomicU64;
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("session-{}-{}-{}", std::process::id(), n, nanos)
}

fn walk_candidates(target_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(target_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

fn build_media_file(path: &Path) -> std::io::Result<MediaFile> {
    let meta = std::fs::metadata(path)?;
    let declared_ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let classification = classifier::classify(path, meta.len(), &declared_ext);
    Ok(MediaFile {
        path: path.to_path_buf(),
        size: meta.len(),
        mtime: meta.modified().unwrap_or(SystemTime::now()),
        declared_ext,
        sniffed_format: classification.format,
        is_animated: classification.is_animated,
        is_video: classification.is_video,
    })
}

/// A scanned-and-probed file waiting to be routed, alongside the "is this
/// unusable" signal the Batch-Decision Gate (§4.J) needs before the main
/// pass starts.
struct AnalyzedFile {
    file: MediaFile,
    features: Option<FileFeatures>,
}

/// Classify + extract features for every file under `target_dir`, without
/// running any conversion. Files whose feature extraction errors out are
/// reported back as `None` features so the caller can route them into the
/// corrupt bucket.
fn analyze(target_dir: &Path, ffprobe_bin: &str) -> Vec<AnalyzedFile> {
    let mut out = Vec::new();
    for path in walk_candidates(target_dir) {
        let file = match build_media_file(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!(?path, error = %e, "failed to stat candidate file, skipping");
                continue;
            }
        };
        if file.sniffed_format == SourceFormat::Unknown {
            continue;
        }
        let classification = types::Classification {
            format: file.sniffed_format,
            is_animated: file.is_animated,
            is_video: file.is_video,
        };
        let features = features::extract(&file.path, classification, file.size, ffprobe_bin).ok();
        out.push(AnalyzedFile { file, features });
    }
    out
}

const LOW_QUALITY_THRESHOLD: f64 = 1.5;

fn partition_for_gate(analyzed: &[AnalyzedFile]) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut corrupt = Vec::new();
    let mut low_quality = Vec::new();
    for a in analyzed {
        match &a.features {
            None => corrupt.push(a.file.path.clone()),
            Some(f) if f.estimated_quality < LOW_QUALITY_THRESHOLD => {
                low_quality.push(a.file.path.clone())
            }
            Some(_) => {}
        }
    }
    (corrupt, low_quality)
}

/// The engine's runtime context: everything a worker thread needs that
/// doesn't change per-file.
struct RunContext {
    config: RunConfig,
    tools: ExecutorTools,
    ffprobe_bin: String,
    exiftool_bin: String,
    sink: EventSink,
    checkpoint: Mutex<CheckpointStore>,
    session_id: String,
    cancel: Arc<AtomicBool>,
    h266_available: bool,
    gate: Decision,
}

/// Runs the full per-file pipeline: plan -> execute -> migrate -> validate
/// -> replace, recording a `FileRecord` transition at each stage. Never
/// panics; every failure path records `Failed`/`Skipped` and returns.
fn process_one(ctx: &RunContext, job: Job, stats: &StatsSnapshot) {
    let file = job.file;
    let features = job.features;
    let now = now_unix();
    let mut record = FileRecord::new(&ctx.session_id, &file, ctx.config.mode, now);

    ctx.sink.emit(EngineEvent::FileStart {
        path: file.path.clone(),
    });
    ctx.sink.emit(EngineEvent::PhaseChange {
        path: file.path.clone(),
        phase: PipelinePhase::Classify,
    });
    record.advance(FileStatus::Analyzing, now_unix());

    ctx.sink.emit(EngineEvent::PhaseChange {
        path: file.path.clone(),
        phase: PipelinePhase::Plan,
    });
    let h266_codec_override = ctx.config.format_overrides.get("mov_codec").map(|s| s.as_str());
    let mut decision = router::plan(
        &features,
        ctx.config.mode,
        stats,
        file.size,
        ctx.h266_available,
        h266_codec_override,
    );
    record.advance(FileStatus::Decided, now_unix());

    // §4.J step 4: a file flagged as very-low-quality during analyze is
    // handed the batch-decision gate's chosen policy before routing is
    // trusted. Skip/Delete terminate here; ForceConvert keeps the plan
    // above as-is; EmojiMode recomputes it under the aggressive AVIF rule.
    if features.estimated_quality < LOW_QUALITY_THRESHOLD {
        match ctx.gate.low_quality {
            types::LowQualityDecision::Skip => {
                record.advance(FileStatus::Skipped, now_unix());
                ctx.sink.emit(EngineEvent::FileSkipped {
                    path: file.path.clone(),
                    reason: "low_quality_skip".to_string(),
                });
                save_record(ctx, &record);
                return;
            }
            types::LowQualityDecision::Delete => {
                if let Err(e) = std::fs::remove_file(&file.path) {
                    warn!(path = ?file.path, error = %e, "failed to delete low-quality file");
                }
                record.advance(FileStatus::Skipped, now_unix());
                ctx.sink.emit(EngineEvent::FileSkipped {
                    path: file.path.clone(),
                    reason: "low_quality_deleted".to_string(),
                });
                save_record(ctx, &record);
                return;
            }
            types::LowQualityDecision::ForceConvert => {}
            types::LowQualityDecision::EmojiMode => {
                decision = router::plan(
                    &features,
                    types::RunMode::Emoji,
                    stats,
                    file.size,
                    ctx.h266_available,
                    h266_codec_override,
                );
            }
        }
    }

    let plan = match decision {
        RouteDecision::Skip(skip) => {
            record.advance(FileStatus::Skipped, now_unix());
            ctx.sink.emit(EngineEvent::FileSkipped {
                path: file.path.clone(),
                reason: skip.reason.clone(),
            });
            save_record(ctx, &record);
            return;
        }
        RouteDecision::Convert(plan) => plan,
    };
    record.rule_name = Some(plan.rule_name.clone());

    if ctx.config.dry_run {
        record.advance(FileStatus::Skipped, now_unix());
        ctx.sink.emit(EngineEvent::FileSkipped {
            path: file.path.clone(),
            reason: "dry_run".to_string(),
        });
        save_record(ctx, &record);
        return;
    }

    if let Some(reason) = source_changed_since_scan(&file) {
        record.advance(FileStatus::Skipped, now_unix());
        ctx.sink.emit(EngineEvent::FileSkipped {
            path: file.path.clone(),
            reason: reason.clone(),
        });
        warn!(path = ?file.path, reason, "source file changed between scan and convert, skipping");
        save_record(ctx, &record);
        return;
    }

    ctx.sink.emit(EngineEvent::PhaseChange {
        path: file.path.clone(),
        phase: PipelinePhase::Execute,
    });
    record.advance(FileStatus::Converting, now_unix());
    let tmp_dir = ctx.config.output_dir().join(".mfb_tmp");
    let artifact = match run_with_retries(ctx, &file, &plan, &tmp_dir) {
        Ok(a) => a,
        Err(e) => {
            fail(ctx, &mut record, &file, &e);
            return;
        }
    };

    ctx.sink.emit(EngineEvent::PhaseChange {
        path: file.path.clone(),
        phase: PipelinePhase::Migrate,
    });
    let migration = migrator::migrate(&file.path, &artifact.temp_path, &ctx.exiftool_bin, &ctx.cancel);
    if migration.tier_used.is_none() {
        warn!(path = ?file.path, "metadata migration produced no tier success");
    }

    ctx.sink.emit(EngineEvent::PhaseChange {
        path: file.path.clone(),
        phase: PipelinePhase::Validate,
    });
    record.advance(FileStatus::Validating, now_unix());
    // `migrate` already determined whether the source had a timestamp the
    // target is missing; forward that single fact through validate()'s
    // generic (source_has, target_has) check rather than re-deriving it.
    let (source_has_datetime, target_has_datetime) = if migration.missing_datetime {
        (true, false)
    } else {
        (false, true)
    };
    let outcomes = validator::validate(
        &file.path,
        file.sniffed_format,
        file.size,
        &artifact,
        &plan,
        source_has_datetime,
        target_has_datetime,
        true,
        &ctx.ffprobe_bin,
        &ctx.cancel,
    );
    if let validator::ValidationOutcome::Fail(reason) = validator::overall(&outcomes) {
        let _ = std::fs::remove_file(&artifact.temp_path);
        fail(
            ctx,
            &mut record,
            &file,
            &EngineError::ValidationFailed {
                path: file.path.clone(),
                reason,
            },
        );
        return;
    }

    ctx.sink.emit(EngineEvent::PhaseChange {
        path: file.path.clone(),
        phase: PipelinePhase::Replace,
    });
    record.advance(FileStatus::Replacing, now_unix());
    let backup_dir = ctx.config.output_dir().join(".mfb_backups");
    let verification_mode = replacer::VerificationMode::SizeOnly;
    match replacer::replace(
        &file.path,
        &artifact.temp_path,
        &backup_dir,
        &ctx.session_id,
        verification_mode,
        ctx.config.keep_backups,
    ) {
        Ok(_) => {
            record.advance(FileStatus::Completed, now_unix());
            record.new_size = Some(artifact.size);
            record.space_saved = Some(file.size as i64 - artifact.size as i64);
            ctx.sink.emit(EngineEvent::FileComplete {
                path: file.path.clone(),
                original_size: file.size,
                new_size: artifact.size,
            });
            save_record(ctx, &record);
        }
        Err(e) => fail(ctx, &mut record, &file, &e),
    }
}

/// §8 boundary behavior: a file modified between scan and convert (size or
/// mtime changed) must be detected rather than blindly re-encoded against
/// stale features. Returns `Some(reason)` when the file should be skipped.
fn source_changed_since_scan(file: &MediaFile) -> Option<String> {
    match std::fs::metadata(&file.path) {
        Ok(meta) => {
            let mtime_matches = meta
                .modified()
                .map(|m| m == file.mtime)
                .unwrap_or(false);
            if meta.len() != file.size || !mtime_matches {
                Some("source_modified_since_scan".to_string())
            } else {
                None
            }
        }
        Err(e) => Some(format!("source_unreadable_since_scan: {e}")),
    }
}

fn run_with_retries(
    ctx: &RunContext,
    file: &MediaFile,
    plan: &types::ConversionPlan,
    tmp_dir: &Path,
) -> Result<types::ConversionArtifact> {
    let mut last_err = None;
    for attempt in 0..=ctx.config.retries {
        if ctx.cancel.load(Ordering::Relaxed) {
            return Err(EngineError::Cancelled);
        }
        match executor::execute(
            &file.path,
            file.sniffed_format,
            plan,
            tmp_dir,
            file.size,
            &ctx.tools,
            &ctx.cancel,
        ) {
            Ok(artifact) => return Ok(artifact),
            Err(e) => {
                warn!(?file.path, attempt, error = %e, "conversion attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or(EngineError::Unsupported {
        reason: "no attempts were made".to_string(),
    }))
}

fn fail(ctx: &RunContext, record: &mut FileRecord, file: &MediaFile, err: &EngineError) {
    error!(?file.path, error = %err, "file processing failed");
    record.error_message = Some(err.to_string());
    record.attempts += 1;
    record.advance(FileStatus::Failed, now_unix());
    ctx.sink.emit(EngineEvent::FileFailed {
        path: file.path.clone(),
        reason: err.to_string(),
        attempts: record.attempts,
    });
    save_record(ctx, record);
}

fn save_record(ctx: &RunContext, record: &FileRecord) {
    if let Ok(mut store) = ctx.checkpoint.lock() {
        if let Err(e) = store.save_file_record(record) {
            error!(error = %e, "failed to persist file record");
        }
    }
}

/// Entry point: validate config, probe tools, scan, resolve the batch
/// decision gate, then drive the adaptive scheduler until the queue drains.
///
/// `sink` is supplied by the caller (not created internally) so a CLI or
/// other adapter can hold the matching `Receiver` and render the typed
/// event stream live instead of racing the core for who drains it.
pub fn run(config: RunConfig, responder: &dyn PromptResponder, sink: EventSink) -> Result<RunSummary> {
    config.validate().map_err(EngineError::Other)?;

    let probe = tool_probe::probe(&config.tool_paths)?;
    let h266_available = probe.has_capability("ffmpeg", "libvvenc");
    let ffmpeg_path = probe
        .tools
        .get("ffmpeg")
        .and_then(|t| t.path.clone())
        .ok_or_else(|| EngineError::ToolMissing {
            tool: "ffmpeg".to_string(),
        })?;
    let avif_encoder_name = if probe.has_capability("ffmpeg", "libaom-av1") {
        "libaom-av1"
    } else {
        "libsvtav1"
    };
    let tools = ExecutorTools {
        cjxl: probe.tools.get("cjxl").and_then(|t| t.path.clone()),
        avifenc: probe.tools.get("avifenc").and_then(|t| t.path.clone()),
        ffmpeg: ffmpeg_path.clone(),
        avif_encoder_name,
    };
    let ffprobe_bin = probe
        .tools
        .get("ffprobe")
        .and_then(|t| t.path.clone())
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "ffprobe".to_string());
    let exiftool_bin = probe
        .tools
        .get("exiftool")
        .and_then(|t| t.path.clone())
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "exiftool".to_string());

    let mut checkpoint = CheckpointStore::open(&config.checkpoint_path, config.flush_every_n)?;
    checkpoint.mark_non_terminal_sessions_crashed()?;

    let resumed_session = checkpoint.find_resumable_session(&config.target_dir)?;
    let session_id = match &resumed_session {
        Some(existing) => {
            info!(session_id = %existing.session_id, "resuming prior session");
            existing.session_id.clone()
        }
        None => new_session_id(),
    };

    // §4.I resume steps 2-3 / §8 "Resume equivalence": a resumed session
    // must not re-submit files it already finished. §6's `skip_existing`
    // extends the same skip-set across every prior session against this
    // target_dir, not just the one being resumed, so a second full run
    // produces zero additional work.
    let mut skip_paths: HashSet<PathBuf> = HashSet::new();
    if let Some(existing) = &resumed_session {
        for record in checkpoint.list_file_records(&existing.session_id)? {
            if record.status == FileStatus::Completed {
                skip_paths.insert(record.path);
            }
        }
    }
    if config.skip_existing {
        for prior in checkpoint.list_sessions()? {
            if prior.target_dir != config.target_dir {
                continue;
            }
            for record in checkpoint.list_file_records(&prior.session_id)? {
                if record.status == FileStatus::Completed {
                    skip_paths.insert(record.path);
                }
            }
        }
    }

    info!(target = ?config.target_dir, mode = ?config.mode, "scanning for candidates");
    let analyzed = analyze(&config.target_dir, &ffprobe_bin);
    let (corrupt, low_quality) = partition_for_gate(&analyzed);
    let gate = decision_gate::resolve(
        &corrupt,
        &low_quality,
        config.interactive,
        &sink,
        responder,
    );

    let stats = checkpoint.get_stats(&session_id)?;
    let session_record = SessionRecord {
        session_id: session_id.clone(),
        target_dir: config.target_dir.clone(),
        output_dir: config.output_dir(),
        mode: config.mode,
        in_place: config.in_place,
        start_time: now_unix(),
        last_update: now_unix(),
        end_time: None,
        status: SessionStatus::Running,
        total: analyzed.len() as u64,
        processed: 0,
        succeeded: 0,
        failed: 0,
        skipped: 0,
        bytes_before: 0,
        bytes_after: 0,
    };

    // §4.J step 4: a Terminate verdict on the corrupt bucket aborts the run
    // before any work is dispatched. DeleteAll removes the flagged files
    // from disk; Repair/Ignore fall through with no action (no repair
    // tooling is in scope for this engine).
    if matches!(gate.corrupt, types::CorruptDecision::Terminate) {
        warn!("batch-decision gate: Terminate selected, aborting run before dispatch");
        let total = analyzed.len() as u64;
        let mut aborted = session_record;
        aborted.status = SessionStatus::Cancelled;
        aborted.end_time = Some(now_unix());
        aborted.skipped = total;
        checkpoint.save_session(&aborted)?;
        checkpoint.flush()?;
        return Ok(RunSummary {
            session_id,
            total,
            skipped: total,
            ..Default::default()
        });
    }
    if matches!(gate.corrupt, types::CorruptDecision::DeleteAll) {
        for path in &corrupt {
            match std::fs::remove_file(path) {
                Ok(()) => info!(?path, "deleted corrupt file per batch-decision gate"),
                Err(e) => warn!(?path, error = %e, "failed to delete corrupt file"),
            }
        }
    }
    checkpoint.save_session(&session_record)?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        let _ = ctrlc::set_handler(move || {
            warn!("interrupt received, cancelling run");
            cancel.store(true, Ordering::SeqCst);
        });
    }

    let sizing = PoolSizing::detect().with_override(config.concurrency_override);
    let memory_threshold_mb =
        shared_utils::system_memory::get_total_memory_mb().unwrap_or(0);
    let scheduler = Scheduler::new(sizing, memory_threshold_mb, Arc::clone(&cancel), sink.clone());

    let ctx = Arc::new(RunContext {
        config: config.clone(),
        tools,
        ffprobe_bin,
        exiftool_bin,
        sink: sink.clone(),
        checkpoint: Mutex::new(checkpoint),
        session_id: session_id.clone(),
        cancel: Arc::clone(&cancel),
        h266_available,
        gate,
    });

    let mut total = 0u64;
    for a in analyzed {
        let Some(features) = a.features else {
            continue; // corrupt bucket already handed to the gate above
        };
        if skip_paths.contains(&a.file.path) {
            info!(path = ?a.file.path, "already completed in a prior session, skipping");
            continue;
        }
        scheduler.submit(Job {
            file: a.file,
            features,
        });
        total += 1;
    }
    scheduler.close();

    let monitor_handle = scheduler.spawn_memory_monitor();
    let stats_for_workers = stats;
    let handles = scheduler.spawn_pool({
        let ctx = Arc::clone(&ctx);
        move |job| process_one(&ctx, job, &stats_for_workers)
    });
    for h in handles {
        let _ = h.join();
    }
    let was_cancelled = cancel.load(Ordering::Relaxed);
    cancel.store(true, Ordering::SeqCst); // stop the memory monitor thread too
    let _ = monitor_handle.join();

    let mut checkpoint = ctx
        .checkpoint
        .lock()
        .map_err(|_| EngineError::Other(anyhow::anyhow!("checkpoint mutex poisoned")))?;
    let records = checkpoint.list_file_records(&session_id)?;
    let mut summary = RunSummary {
        session_id: session_id.clone(),
        total,
        ..Default::default()
    };
    for r in &records {
        match r.status {
            FileStatus::Completed => {
                summary.succeeded += 1;
                summary.bytes_before += r.original_size;
                summary.bytes_after += r.new_size.unwrap_or(r.original_size);
            }
            FileStatus::Failed => summary.failed += 1,
            FileStatus::Skipped | FileStatus::Cancelled => summary.skipped += 1,
            _ => {}
        }
    }

    let mut final_session = session_record;
    final_session.status = if was_cancelled && summary.succeeded + summary.failed < total {
        SessionStatus::Cancelled
    } else {
        SessionStatus::Completed
    };
    final_session.end_time = Some(now_unix());
    final_session.processed = summary.succeeded + summary.failed + summary.skipped;
    final_session.succeeded = summary.succeeded;
    final_session.failed = summary.failed;
    final_session.skipped = summary.skipped;
    final_session.bytes_before = summary.bytes_before;
    final_session.bytes_after = summary.bytes_after;
    checkpoint.save_session(&final_session)?;
    checkpoint.flush()?;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_quality_threshold_flags_expected_files() {
        let analyzed = vec![
            AnalyzedFile {
                file: dummy_file("a.jpg"),
                features: Some(dummy_features(0.5)),
            },
            AnalyzedFile {
                file: dummy_file("b.jpg"),
                features: Some(dummy_features(9.0)),
            },
            AnalyzedFile {
                file: dummy_file("c.jpg"),
                features: None,
            },
        ];
        let (corrupt, low_quality) = partition_for_gate(&analyzed);
        assert_eq!(corrupt.len(), 1);
        assert_eq!(low_quality.len(), 1);
    }

    fn dummy_file(name: &str) -> MediaFile {
        MediaFile {
            path: PathBuf::from(name),
            size: 100,
            mtime: SystemTime::now(),
            declared_ext: "jpg".to_string(),
            sniffed_format: SourceFormat::Jpeg,
            is_animated: false,
            is_video: false,
        }
    }

    fn dummy_features(quality: f64) -> FileFeatures {
        FileFeatures {
            width: 10,
            height: 10,
            frame_count: 1,
            fps: None,
            pixel_format: None,
            has_alpha: false,
            estimated_quality: quality,
            container_metadata: Default::default(),
            format: SourceFormat::Jpeg,
        }
    }

    #[test]
    fn session_ids_are_unique_across_calls() {
        let a = new_session_id();
        let b = new_session_id();
        assert_ne!(a, b);
    }
}
