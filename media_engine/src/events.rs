//! Typed event stream (§6). The core never formats a display string; it
//! only emits these events. A UI/log adapter outside the core subscribes
//! and renders them (see `shared_utils::logging`/`modern_ui` for the kind
//! of adapter a caller would build on top).

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::types::LowQualityDecision;

#[derive(Debug, Clone)]
pub enum PipelinePhase {
    Classify,
    Extract,
    Plan,
    Execute,
    Validate,
    Migrate,
    Replace,
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    FileStart {
        path: PathBuf,
    },
    FileComplete {
        path: PathBuf,
        original_size: u64,
        new_size: u64,
    },
    FileFailed {
        path: PathBuf,
        reason: String,
        attempts: u32,
    },
    FileSkipped {
        path: PathBuf,
        reason: String,
    },
    PhaseChange {
        path: PathBuf,
        phase: PipelinePhase,
    },
    UserPrompt {
        prompt: PromptRequest,
    },
    MemoryPressure {
        level: &'static str,
        worker_count: usize,
    },
    ProcessHung {
        path: PathBuf,
        command: String,
    },
}

/// A question the Batch-Decision Gate or Process Supervisor needs answered.
/// `respond_by` is the countdown deadline; the caller's responder may reply
/// on `answer` before then, or the gate applies the default when it elapses.
#[derive(Debug)]
pub struct PromptRequest {
    pub description: String,
    pub choices: Vec<String>,
    pub default_choice: String,
    pub countdown: Duration,
    pub answer: Sender<String>,
}

/// Handle a worker/scheduler uses to publish events. Cloneable and `Sync` —
/// every worker thread gets its own clone, shared behind a mutex so the
/// handle can live inside scheduler state shared across threads (a bare
/// `mpsc::Sender` is `Send` but not `Sync`).
#[derive(Clone)]
pub struct EventSink {
    tx: Arc<Mutex<Sender<EngineEvent>>>,
}

impl EventSink {
    pub fn new() -> (Self, Receiver<EngineEvent>) {
        let (tx, rx) = std::sync::mpsc::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(tx)),
            },
            rx,
        )
    }

    /// Publishing never blocks the worker and never panics on a dropped
    /// receiver (the caller may have stopped listening).
    pub fn emit(&self, event: EngineEvent) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(event);
        }
    }
}

/// Responds to `UserPrompt` events. Interactive callers wire this to a
/// terminal; non-interactive runs use `NonInteractiveResponder`, which
/// answers with the default immediately.
pub trait PromptResponder: Send + Sync {
    fn respond(&self, choices: &[String], default_choice: &str, countdown: Duration) -> String;
}

pub struct NonInteractiveResponder;

impl PromptResponder for NonInteractiveResponder {
    fn respond(&self, _choices: &[String], default_choice: &str, _countdown: Duration) -> String {
        default_choice.to_string()
    }
}

/// Convenience for decision-gate default mapping, kept here since both the
/// gate and the event layer need it.
pub fn default_low_quality_decision() -> LowQualityDecision {
    LowQualityDecision::Skip
}
