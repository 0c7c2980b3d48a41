//! Error taxonomy for the conversion core.
//!
//! Kinds mirror the failure classes a `FileRecord` can land in, not raw
//! library errors — those get wrapped into the `source` field via `anyhow`.

use std::path::PathBuf;
use thiserror::Error;

/// Whether an `EngineError` should be retried, recorded as a terminal
/// failure, or should abort the whole run before work starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Retry up to `RunConfig::retries` with linear back-off.
    Transient,
    /// Record as Failed/Skipped immediately, no retry.
    Terminal,
    /// Abort the whole run before the worker pool starts.
    Fatal,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("required tool '{tool}' not found")]
    ToolMissing { tool: String },

    #[error("unsupported input: {reason}")]
    Unsupported { reason: String },

    #[error("feature probe failed for {path}: {message}")]
    ProbeFailed { path: PathBuf, message: String },

    #[error("conversion failed for {path}: {message}")]
    ConversionFailed {
        path: PathBuf,
        message: String,
        stderr: String,
    },

    #[error("validation failed for {path}: {reason}")]
    ValidationFailed { path: PathBuf, reason: String },

    #[error("metadata migration failed for {path}: {message}")]
    MetadataMigrationFailed { path: PathBuf, message: String },

    #[error("atomic replacement failed for {path}: {message}")]
    ReplacementFailed { path: PathBuf, message: String },

    #[error("process hung or timed out running {command}")]
    ProcessHung { command: String },

    #[error("cancelled")]
    Cancelled,

    #[error("source appears corrupt: {path}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    #[error("checkpoint store error: {0}")]
    Checkpoint(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EngineError::ProbeFailed { .. }
            | EngineError::ConversionFailed { .. }
            | EngineError::ProcessHung { .. } => ErrorSeverity::Transient,

            EngineError::ValidationFailed { .. }
            | EngineError::Unsupported { .. }
            | EngineError::MetadataMigrationFailed { .. }
            | EngineError::ReplacementFailed { .. }
            | EngineError::Corruption { .. }
            | EngineError::Cancelled => ErrorSeverity::Terminal,

            EngineError::ToolMissing { .. }
            | EngineError::Checkpoint(_)
            | EngineError::Io(_)
            | EngineError::Other(_) => ErrorSeverity::Fatal,
        }
    }

    /// Metadata migration is the one category that never fails the overall
    /// conversion: the caller downgrades it to a Warn and continues.
    pub fn is_warn_only(&self) -> bool {
        matches!(self, EngineError::MetadataMigrationFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
