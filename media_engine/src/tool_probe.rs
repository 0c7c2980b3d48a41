//! §4.A Tool Probe — discovers and validates external binaries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, warn};

use crate::errors::{EngineError, Result};
use crate::types::{ToolInfo, ToolProbeResult};

const REQUIRED_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];
const OPTIONAL_TOOLS: &[&str] = &["cjxl", "djxl", "avifenc", "exiftool"];

const FFMPEG_ENCODER_CAPABILITIES: &[&str] =
    &["libaom-av1", "libsvtav1", "libx265", "libvvenc", "libjxl"];

/// Locate `tool` via an explicit override first, then the process PATH.
fn locate(tool: &str, overrides: &HashMap<String, PathBuf>) -> Option<PathBuf> {
    if let Some(p) = overrides.get(tool) {
        if p.is_file() {
            return Some(p.clone());
        }
        warn!(tool, path = ?p, "configured tool path does not exist, falling back to PATH");
    }
    which::which(tool).ok()
}

/// Run `ffmpeg -codecs` once and collect which of `FFMPEG_ENCODER_CAPABILITIES`
/// are mentioned in the output.
fn probe_ffmpeg_capabilities(ffmpeg_path: &PathBuf) -> Vec<String> {
    let output = Command::new(ffmpeg_path).arg("-codecs").output();
    let text = match output {
        Ok(o) => String::from_utf8_lossy(&o.stdout).to_string(),
        Err(e) => {
            debug!(error = %e, "ffmpeg -codecs probe failed");
            return Vec::new();
        }
    };
    FFMPEG_ENCODER_CAPABILITIES
        .iter()
        .filter(|cap| text.contains(*cap))
        .map(|cap| cap.to_string())
        .collect()
}

/// Enumerate required and optional binaries. Required tools absent is
/// fatal; optional tools absent just means dependent plans get downgraded.
pub fn probe(overrides: &HashMap<String, PathBuf>) -> Result<ToolProbeResult> {
    let mut result = ToolProbeResult::default();

    for &tool in REQUIRED_TOOLS {
        let path = locate(tool, overrides);
        if path.is_none() {
            return Err(EngineError::ToolMissing {
                tool: tool.to_string(),
            });
        }
        let capabilities = if tool == "ffmpeg" {
            probe_ffmpeg_capabilities(path.as_ref().unwrap())
        } else {
            Vec::new()
        };
        result.tools.insert(
            tool.to_string(),
            ToolInfo {
                available: true,
                path,
                capabilities,
            },
        );
    }

    for &tool in OPTIONAL_TOOLS {
        let path = locate(tool, overrides);
        result.tools.insert(
            tool.to_string(),
            ToolInfo {
                available: path.is_some(),
                path,
                capabilities: Vec::new(),
            },
        );
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_override_falls_back_to_path_lookup() {
        let overrides = HashMap::new();
        // locate() must not panic even when nothing is configured; actual
        // availability depends on the host's PATH so we only assert it
        // doesn't error.
        let _ = locate("ffmpeg", &overrides);
    }

    #[test]
    fn bogus_override_path_is_ignored() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "ffmpeg".to_string(),
            PathBuf::from("/definitely/not/a/real/path/ffmpeg"),
        );
        let located = locate("ffmpeg", &overrides);
        if let Some(p) = located {
            assert_ne!(p, PathBuf::from("/definitely/not/a/real/path/ffmpeg"));
        }
    }

    #[test]
    fn capability_probe_never_panics_on_bad_path() {
        let caps = probe_ffmpeg_capabilities(&PathBuf::from("/nonexistent/ffmpeg"));
        assert!(caps.is_empty());
    }
}
