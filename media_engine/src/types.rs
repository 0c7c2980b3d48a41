//! Core data model: the value types that flow through the pipeline.
//!
//! These are plain structs/enums, `Clone` where they cross thread or
//! Checkpoint Store boundaries, `serde`-derived where they are persisted.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Authoritative sniffed format, independent of the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
    WebpStatic,
    WebpAnimated,
    Heic,
    Heif,
    Avif,
    Apng,
    Jxl,
    Tiff,
    Bmp,
    VideoMp4,
    VideoMov,
    VideoWebm,
    Unknown,
}

impl SourceFormat {
    pub fn is_video(self) -> bool {
        matches!(
            self,
            SourceFormat::VideoMp4 | SourceFormat::VideoMov | SourceFormat::VideoWebm
        )
    }

    /// True for formats whose container inherently carries multiple frames.
    /// GIF is excluded: a GIF's animatedness depends on its frame count and
    /// is decided by the classifier, not by the format tag alone.
    pub fn is_inherently_animated(self) -> bool {
        matches!(self, SourceFormat::Apng | SourceFormat::WebpAnimated)
    }
}

/// Output container target. MOV always maps to an ISO-BMFF/QuickTime muxing;
/// AVIF covers both the still and animated still-image container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetFormat {
    Jxl,
    Avif,
    Mov,
}

impl std::fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TargetFormat::Jxl => "jxl",
            TargetFormat::Avif => "avif",
            TargetFormat::Mov => "mov",
        };
        write!(f, "{s}")
    }
}

/// Run mode selected by the caller; governs aggressiveness of the Router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    AutoPlus,
    Quality,
    Emoji,
}

/// `MediaFile` — describes a file under consideration by the scanner.
/// Immutable once constructed; ownership passes to the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub path: PathBuf,
    pub size: u64,
    #[serde(with = "system_time_secs")]
    pub mtime: SystemTime,
    pub declared_ext: String,
    pub sniffed_format: SourceFormat,
    pub is_animated: bool,
    pub is_video: bool,
}

/// Classification result from the File Classifier (§4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub format: SourceFormat,
    pub is_animated: bool,
    pub is_video: bool,
}

/// Measured characteristics from the Feature Extractor (§4.C).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFeatures {
    pub width: u32,
    pub height: u32,
    /// >=1; >1 iff animated.
    pub frame_count: u32,
    pub fps: Option<f64>,
    pub pixel_format: Option<String>,
    pub has_alpha: bool,
    /// [0.0, 10.0]
    pub estimated_quality: f64,
    pub container_metadata: HashMap<String, String>,
    pub format: SourceFormat,
}

impl FileFeatures {
    pub fn is_animated(&self) -> bool {
        self.frame_count > 1
    }
}

/// Codec parameters for a `ConversionPlan`, one variant per target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CodecParams {
    Jxl {
        lossless_jpeg: bool,
        distance: f64,
        effort: u8,
    },
    Avif {
        crf: u8,
        speed: u8,
        animated: bool,
    },
    Mov {
        repackage_only: bool,
        reencode_codec: Option<String>,
    },
}

/// `ConversionPlan` — the Router's output; a pure function of its inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionPlan {
    pub target_format: TargetFormat,
    pub params: CodecParams,
    pub rule_name: String,
    pub confidence: f64,
    pub expected_saving: f64,
    pub expected_bytes: u64,
}

/// A plan that resolves to "do not convert this file" with a reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipPlan {
    pub reason: String,
}

/// Either a real conversion plan or a decision to skip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RouteDecision {
    Convert(ConversionPlan),
    Skip(SkipPlan),
}

/// `ConversionArtifact` — a produced temp file, owned by the executor until
/// replaced or discarded.
#[derive(Debug, Clone)]
pub struct ConversionArtifact {
    pub temp_path: PathBuf,
    pub size: u64,
    pub target_format: TargetFormat,
}

/// Status lifecycle for a `FileRecord`. Monotonic: Pending -> active -> one
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Pending,
    Scanning,
    Analyzing,
    Decided,
    Converting,
    Validating,
    Replacing,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl FileStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FileStatus::Completed
                | FileStatus::Failed
                | FileStatus::Skipped
                | FileStatus::Cancelled
        )
    }

    /// Ordinal used to detect non-monotonic (rollback) transitions. Terminal
    /// states all share the highest ordinal: once terminal, a FileRecord
    /// never observably regresses to another terminal state either.
    fn rank(self) -> u8 {
        match self {
            FileStatus::Pending => 0,
            FileStatus::Scanning => 1,
            FileStatus::Analyzing => 2,
            FileStatus::Decided => 3,
            FileStatus::Converting => 4,
            FileStatus::Validating => 5,
            FileStatus::Replacing => 6,
            FileStatus::Completed
            | FileStatus::Failed
            | FileStatus::Skipped
            | FileStatus::Cancelled => 7,
        }
    }

    /// True if `self -> next` is a legal forward (or same) transition.
    pub fn can_advance_to(self, next: FileStatus) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next.rank() >= self.rank()
    }
}

/// `FileRecord` — the checkpoint-store unit of truth for one file in one
/// session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub session_id: String,
    pub path: PathBuf,
    pub status: FileStatus,
    pub source_hash: Option<String>,
    pub original_size: u64,
    pub new_size: Option<u64>,
    pub space_saved: Option<i64>,
    pub mode: RunMode,
    pub rule_name: Option<String>,
    pub target_path: Option<PathBuf>,
    pub attempts: u32,
    pub error_message: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub last_update: i64,
}

impl FileRecord {
    pub fn new(session_id: &str, file: &MediaFile, mode: RunMode, now: i64) -> Self {
        Self {
            session_id: session_id.to_string(),
            path: file.path.clone(),
            status: FileStatus::Pending,
            source_hash: None,
            original_size: file.size,
            new_size: None,
            space_saved: None,
            mode,
            rule_name: None,
            target_path: None,
            attempts: 0,
            error_message: None,
            start_time: None,
            end_time: None,
            last_update: now,
        }
    }

    /// Advance status, enforcing monotonicity. Returns false (no-op) if the
    /// transition would regress the lifecycle.
    pub fn advance(&mut self, next: FileStatus, now: i64) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        self.last_update = now;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Running,
    Paused,
    Completed,
    Crashed,
    Cancelled,
}

/// `SessionRecord` — owns zero or more FileRecords (logically; the
/// Checkpoint Store is the actual persistence owner).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub target_dir: PathBuf,
    pub output_dir: PathBuf,
    pub mode: RunMode,
    pub in_place: bool,
    pub start_time: i64,
    pub last_update: i64,
    pub end_time: Option<i64>,
    pub status: SessionStatus,
    pub total: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Outcome of the batch-decision gate for one file class (§4.J).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorruptDecision {
    Repair,
    DeleteAll,
    Terminate,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LowQualityDecision {
    Skip,
    Delete,
    ForceConvert,
    EmojiMode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Decision {
    pub corrupt: CorruptDecision,
    pub low_quality: LowQualityDecision,
}

impl Default for Decision {
    fn default() -> Self {
        Self {
            corrupt: CorruptDecision::Ignore,
            low_quality: LowQualityDecision::Skip,
        }
    }
}

/// `ToolProbeResult` — availability/path/capability map for external tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolProbeResult {
    pub tools: HashMap<String, ToolInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub available: bool,
    pub path: Option<PathBuf>,
    pub capabilities: Vec<String>,
}

impl ToolProbeResult {
    pub fn is_available(&self, tool: &str) -> bool {
        self.tools.get(tool).map(|t| t.available).unwrap_or(false)
    }

    pub fn has_capability(&self, tool: &str, capability: &str) -> bool {
        self.tools
            .get(tool)
            .map(|t| t.capabilities.iter().any(|c| c == capability))
            .unwrap_or(false)
    }
}

mod system_time_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
        let secs = t
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        secs.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SystemTime, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(UNIX_EPOCH + Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_monotonicity_forward_ok() {
        assert!(FileStatus::Pending.can_advance_to(FileStatus::Scanning));
        assert!(FileStatus::Scanning.can_advance_to(FileStatus::Converting));
        assert!(FileStatus::Converting.can_advance_to(FileStatus::Completed));
    }

    #[test]
    fn status_monotonicity_rejects_rollback() {
        assert!(!FileStatus::Converting.can_advance_to(FileStatus::Scanning));
        assert!(!FileStatus::Completed.can_advance_to(FileStatus::Pending));
    }

    #[test]
    fn terminal_states_never_change() {
        assert!(!FileStatus::Completed.can_advance_to(FileStatus::Failed));
        assert!(FileStatus::Completed.can_advance_to(FileStatus::Completed));
    }

    #[test]
    fn file_record_advance_rejects_regression() {
        let file = MediaFile {
            path: "/tmp/a.png".into(),
            size: 10,
            mtime: SystemTime::now(),
            declared_ext: "png".into(),
            sniffed_format: SourceFormat::Png,
            is_animated: false,
            is_video: false,
        };
        let mut rec = FileRecord::new("s1", &file, RunMode::AutoPlus, 0);
        assert!(rec.advance(FileStatus::Scanning, 1));
        assert!(rec.advance(FileStatus::Completed, 2));
        assert!(!rec.advance(FileStatus::Analyzing, 3));
        assert_eq!(rec.status, FileStatus::Completed);
    }
}
