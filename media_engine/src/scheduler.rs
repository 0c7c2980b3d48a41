//! §4.K Adaptive Scheduler — the heart of the concurrency model. Owns a
//! bounded job queue and a dynamically sized OS-thread worker pool; each
//! worker runs the full per-file pipeline synchronously (classify ->
//! extract -> plan -> execute -> validate -> migrate -> replace).
//!
//! Sizing and memory-pressure hysteresis reuse
//! `shared_utils::system_memory` (already vetted cross-platform:
//! `sysctl`/`vm_stat` on macOS, `/proc/meminfo` on Linux) as the "read
//! process-wide memory usage" primitive called for in §4.K; the lock
//! discipline (single mutex over queue+worker-count, a separate atomic for
//! in-flight jobs) follows §5 exactly.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::events::{EngineEvent, EventSink};
use crate::types::{FileFeatures, MediaFile, RunMode, SourceFormat};

/// `workers = min(2 * cores, max_workers)`, `max_workers = 4 * cores`,
/// `min_workers = cores`.
#[derive(Debug, Clone, Copy)]
pub struct PoolSizing {
    pub min_workers: usize,
    pub initial_workers: usize,
    pub max_workers: usize,
}

fn detect_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl PoolSizing {
    pub fn from_cpus(cores: usize) -> Self {
        let cores = cores.max(1);
        Self {
            min_workers: cores,
            initial_workers: (2 * cores).min(4 * cores),
            max_workers: 4 * cores,
        }
    }

    pub fn detect() -> Self {
        Self::from_cpus(detect_cores())
    }

    /// `concurrency_override` from `RunConfig`, clamped into
    /// `[min_workers, max_workers]` when present.
    pub fn with_override(mut self, override_workers: Option<usize>) -> Self {
        if let Some(n) = override_workers {
            self.initial_workers = n.clamp(self.min_workers, self.max_workers.max(self.min_workers));
        }
        self
    }
}

/// Per-job complexity score in [0, 100]: 40% size bucket, 30% format, 20%
/// run mode, 10% quality tier.
pub fn complexity_score(file_size: u64, format: SourceFormat, mode: RunMode, estimated_quality: f64) -> u8 {
    let size_component = size_bucket_score(file_size) * 0.40;
    let format_component = format_score(format) * 0.30;
    let mode_component = mode_score(mode) * 0.20;
    let quality_component = quality_tier_score(estimated_quality) * 0.10;
    let total = size_component + format_component + mode_component + quality_component;
    total.round().clamp(0.0, 100.0) as u8
}

fn size_bucket_score(size: u64) -> f64 {
    const MIB: f64 = 1024.0 * 1024.0;
    let mb = size as f64 / MIB;
    if mb <= 1.0 {
        10.0
    } else if mb <= 10.0 {
        // log-scaled across [1,10] MiB -> [20,47]
        let t = (mb.ln()) / (10f64.ln());
        20.0 + t * (47.0 - 20.0)
    } else if mb <= 100.0 {
        let t = (mb / 10.0).ln() / (10f64.ln());
        47.0 + t * (92.0 - 47.0)
    } else {
        92.0 + (mb / 100.0).ln().max(0.0) * 2.0
    }
}

fn format_score(format: SourceFormat) -> f64 {
    match format {
        SourceFormat::Jpeg => 20.0,
        SourceFormat::Png => 35.0,
        SourceFormat::WebpStatic | SourceFormat::WebpAnimated => 45.0,
        SourceFormat::Tiff | SourceFormat::Bmp => 55.0,
        SourceFormat::Heic | SourceFormat::Heif => 65.0,
        SourceFormat::Gif | SourceFormat::Apng => 50.0,
        SourceFormat::Avif | SourceFormat::Jxl => 45.0,
        SourceFormat::VideoMp4 | SourceFormat::VideoMov => 80.0,
        SourceFormat::VideoWebm => 85.0,
        SourceFormat::Unknown => 0.0,
    }
}

fn mode_score(mode: RunMode) -> f64 {
    match mode {
        RunMode::Emoji => 30.0,
        RunMode::AutoPlus => 60.0,
        RunMode::Quality => 80.0,
    }
}

fn quality_tier_score(estimated_quality: f64) -> f64 {
    // Higher source quality implies a costlier encode to preserve it.
    (estimated_quality / 10.0 * 100.0).clamp(0.0, 100.0)
}

/// Estimated peak memory a job needs: `2 * file_size * (1 + complexity/100)`.
pub fn estimated_memory_bytes(file_size: u64, complexity: u8) -> u64 {
    let factor = 1.0 + (complexity as f64 / 100.0);
    (2.0 * file_size as f64 * factor) as u64
}

const ADMISSION_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const ADMISSION_MARGIN_BYTES: u64 = 256 * 1024 * 1024;
const MEMORY_POLL_INTERVAL: Duration = Duration::from_secs(2);
const PRESSURE_HIGH_RATIO: f64 = 0.75;
const PRESSURE_LOW_RATIO: f64 = 0.55; // threshold - 20%
const SHRINK_FACTOR: f64 = 0.8;
const GROW_FACTOR: f64 = 1.2;

/// A unit of work the scheduler admits and a worker executes end to end.
/// `features` is already populated by the analyze pass so a worker never
/// needs to re-probe a file it is about to convert.
#[derive(Debug, Clone)]
pub struct Job {
    pub file: MediaFile,
    pub features: FileFeatures,
}

struct QueueState {
    jobs: VecDeque<Job>,
    worker_target: usize,
    closed: bool,
}

/// Shared scheduler state: one mutex over queue+worker-count (§5), a
/// separate atomic for the in-flight counter so the watchdog/admission path
/// never needs to hold the queue lock just to read it.
pub struct Scheduler {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    in_flight: AtomicUsize,
    sizing: PoolSizing,
    cancel: Arc<AtomicBool>,
    memory_threshold_mb: u64,
    sink: EventSink,
}

impl Scheduler {
    pub fn new(sizing: PoolSizing, memory_threshold_mb: u64, cancel: Arc<AtomicBool>, sink: EventSink) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                worker_target: sizing.initial_workers,
                closed: false,
            }),
            not_empty: Condvar::new(),
            in_flight: AtomicUsize::new(0),
            sizing,
            cancel,
            memory_threshold_mb,
            sink,
        })
    }

    pub fn worker_target(&self) -> usize {
        self.state.lock().unwrap().worker_target
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Push a scanned file onto the queue. Called from the scan stream, not
    /// from a worker.
    pub fn submit(&self, job: Job) {
        let mut state = self.state.lock().unwrap();
        state.jobs.push_back(job);
        self.not_empty.notify_one();
    }

    /// No more files will be submitted; workers drain the remaining queue
    /// then exit.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.not_empty.notify_all();
    }

    /// Blocks until a job is available and the pool has room under the
    /// current (memory-pressure-adjusted) `worker_target`, the queue is
    /// closed and drained, or cancellation is requested.
    fn next_job(&self) -> Option<Job> {
        let mut state = self.state.lock().unwrap();
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return None;
            }
            if self.in_flight.load(Ordering::SeqCst) < state.worker_target {
                if let Some(job) = state.jobs.pop_front() {
                    return Some(job);
                }
            }
            if state.jobs.is_empty() && state.closed {
                return None;
            }
            let (guard, timeout) = self
                .not_empty
                .wait_timeout(state, Duration::from_millis(200))
                .unwrap();
            state = guard;
            let _ = timeout;
        }
    }

    /// Admission check before a worker starts a job: wait for enough
    /// estimated-available memory, up to 30s, else error per §4.K.
    fn admit(&self, estimated_bytes: u64) -> Result<(), ()> {
        let start = Instant::now();
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(());
            }
            let available = shared_utils::system_memory::get_available_memory_mb()
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(u64::MAX); // unknown memory -> don't block admission
            if available >= estimated_bytes.saturating_add(ADMISSION_MARGIN_BYTES) {
                return Ok(());
            }
            if start.elapsed() >= ADMISSION_WAIT_TIMEOUT {
                warn!(estimated_bytes, "job refused admission after 30s of memory back-off");
                return Err(());
            }
            // Jitter the back-off so a pool of workers waiting on the same
            // memory ceiling doesn't wake and re-check in lockstep.
            let jitter_ms = rand::rng().random_range(0..100);
            std::thread::sleep(Duration::from_millis(250 + jitter_ms));
        }
    }

    /// Worker loop body: pull, admit, run. Returns when the queue is
    /// exhausted/closed or cancellation is observed.
    pub fn run_worker<F>(self: &Arc<Self>, mut process: F)
    where
        F: FnMut(Job),
    {
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return;
            }
            let Some(job) = self.next_job() else {
                return;
            };
            let complexity = complexity_score(
                job.file.size,
                job.file.sniffed_format,
                RunMode::AutoPlus,
                job.features.estimated_quality,
            );
            let estimated = estimated_memory_bytes(job.file.size, complexity);
            if self.admit(estimated).is_err() {
                if self.cancel.load(Ordering::Relaxed) {
                    return;
                }
                continue;
            }
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            process(job);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Spawn `max_workers` OS threads, each driving `run_worker` with a
    /// clone of `process`. Only `worker_target` (initially `initial_workers`)
    /// of them are admitted into `next_job` at a time; the rest idle on the
    /// condvar until the memory monitor raises `worker_target`, which is how
    /// the pool actually expands toward `max_workers` under §4.K. Returns
    /// join handles the caller waits on after closing the queue.
    pub fn spawn_pool<F>(self: &Arc<Self>, process: F) -> Vec<std::thread::JoinHandle<()>>
    where
        F: Fn(Job) + Send + Sync + 'static,
    {
        let process = Arc::new(process);
        let mut handles = Vec::new();
        for i in 0..self.sizing.max_workers {
            let scheduler = Arc::clone(self);
            let process = Arc::clone(&process);
            handles.push(
                std::thread::Builder::new()
                    .name(format!("mfb-worker-{i}"))
                    .spawn(move || {
                        scheduler.run_worker(|job| process(job));
                    })
                    .expect("failed to spawn worker thread"),
            );
        }
        handles
    }

    /// Start the memory-pressure monitor thread (§4.K): every 2s, shrink
    /// toward `min_workers` by 0.8x when usage crosses 75% of threshold,
    /// grow back toward `max_workers` by 1.2x once it drops below
    /// threshold-20%. In-flight jobs are never killed for memory reasons;
    /// only the advertised `worker_target` changes.
    pub fn spawn_memory_monitor(self: &Arc<Self>) -> std::thread::JoinHandle<()> {
        let scheduler = Arc::clone(self);
        std::thread::Builder::new()
            .name("mfb-memory-monitor".to_string())
            .spawn(move || {
                while !scheduler.cancel.load(Ordering::Relaxed) {
                    std::thread::sleep(MEMORY_POLL_INTERVAL);
                    scheduler.sample_and_adjust();
                }
            })
            .expect("failed to spawn memory monitor thread")
    }

    fn sample_and_adjust(&self) {
        let Some(available_mb) = shared_utils::system_memory::get_available_memory_mb() else {
            return;
        };
        if self.memory_threshold_mb == 0 {
            return;
        }
        let used_mb = self.memory_threshold_mb.saturating_sub(available_mb.min(self.memory_threshold_mb));
        let ratio = used_mb as f64 / self.memory_threshold_mb as f64;

        let mut state = self.state.lock().unwrap();
        let queued = state.jobs.len();
        if ratio > PRESSURE_HIGH_RATIO {
            let shrunk = ((state.worker_target as f64) * SHRINK_FACTOR).floor() as usize;
            let new_target = shrunk.max(self.sizing.min_workers);
            if new_target != state.worker_target {
                state.worker_target = new_target;
                debug!(new_target, ratio, "shrinking worker pool under memory pressure");
                self.sink.emit(EngineEvent::MemoryPressure {
                    level: "high",
                    worker_count: new_target,
                });
            }
        } else if ratio < PRESSURE_LOW_RATIO {
            let grown = ((state.worker_target as f64) * GROW_FACTOR).ceil() as usize;
            let cap = self.sizing.max_workers.min(queued.max(state.worker_target));
            let new_target = grown.min(cap).max(state.worker_target);
            if new_target != state.worker_target {
                state.worker_target = new_target;
                debug!(new_target, ratio, "expanding worker pool, memory pressure eased");
                self.sink.emit(EngineEvent::MemoryPressure {
                    level: "low",
                    worker_count: new_target,
                });
            }
        }
    }

    pub fn request_cancel(&self) {
        info!("scheduler: cancellation requested");
        self.cancel.store(true, Ordering::SeqCst);
        self.not_empty.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::SystemTime;

    #[test]
    fn pool_sizing_matches_spec_formula() {
        let s = PoolSizing::from_cpus(4);
        assert_eq!(s.min_workers, 4);
        assert_eq!(s.initial_workers, 8);
        assert_eq!(s.max_workers, 16);
    }

    #[test]
    fn concurrency_override_is_clamped() {
        let s = PoolSizing::from_cpus(4).with_override(Some(100));
        assert_eq!(s.initial_workers, 16);
        let s = PoolSizing::from_cpus(4).with_override(Some(1));
        assert_eq!(s.initial_workers, 4);
    }

    #[test]
    fn complexity_score_is_bounded() {
        let score = complexity_score(500_000_000, SourceFormat::VideoWebm, RunMode::Quality, 10.0);
        assert!(score <= 100);
        let score_low = complexity_score(1024, SourceFormat::Jpeg, RunMode::Emoji, 1.0);
        assert!(score_low < score);
    }

    #[test]
    fn video_scores_higher_than_jpeg_at_same_size() {
        let video = complexity_score(5_000_000, SourceFormat::VideoMp4, RunMode::AutoPlus, 5.0);
        let jpeg = complexity_score(5_000_000, SourceFormat::Jpeg, RunMode::AutoPlus, 5.0);
        assert!(video > jpeg);
    }

    #[test]
    fn estimated_memory_scales_with_complexity() {
        let low = estimated_memory_bytes(1_000_000, 0);
        let high = estimated_memory_bytes(1_000_000, 100);
        assert!(high > low);
        assert_eq!(low, 2_000_000);
        assert_eq!(high, 4_000_000);
    }

    fn sample_file(size: u64) -> MediaFile {
        MediaFile {
            path: PathBuf::from("/tmp/a.png"),
            size,
            mtime: SystemTime::now(),
            declared_ext: "png".to_string(),
            sniffed_format: SourceFormat::Png,
            is_animated: false,
            is_video: false,
        }
    }

    fn sample_features() -> FileFeatures {
        FileFeatures {
            width: 100,
            height: 100,
            frame_count: 1,
            fps: None,
            pixel_format: None,
            has_alpha: false,
            estimated_quality: 9.0,
            container_metadata: Default::default(),
            format: SourceFormat::Png,
        }
    }

    #[test]
    fn scheduler_drains_submitted_jobs_in_order_of_availability() {
        let cancel = Arc::new(AtomicBool::new(false));
        let (sink, _rx) = EventSink::new();
        let sizing = PoolSizing::from_cpus(2);
        let scheduler = Scheduler::new(sizing, 0, cancel, sink);

        scheduler.submit(Job { file: sample_file(10), features: sample_features() });
        scheduler.submit(Job { file: sample_file(20), features: sample_features() });
        scheduler.close();

        let processed = Arc::new(Mutex::new(Vec::new()));
        let processed_clone = Arc::clone(&processed);
        scheduler.run_worker(move |job| {
            processed_clone.lock().unwrap().push(job.file.size);
        });

        let got = processed.lock().unwrap();
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn cancellation_stops_worker_loop_without_processing_remaining_jobs() {
        let cancel = Arc::new(AtomicBool::new(false));
        let (sink, _rx) = EventSink::new();
        let sizing = PoolSizing::from_cpus(1);
        let scheduler = Scheduler::new(sizing, 0, cancel.clone(), sink);
        scheduler.submit(Job { file: sample_file(10), features: sample_features() });
        cancel.store(true, Ordering::SeqCst);

        let processed = Arc::new(AtomicUsize::new(0));
        let processed_clone = Arc::clone(&processed);
        scheduler.run_worker(move |_job| {
            processed_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(processed.load(Ordering::SeqCst), 0);
    }
}
