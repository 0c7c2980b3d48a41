//! `RunConfig` — the validated input surface to the core (§6). Parsing CLI
//! flags, YAML, or env vars is a caller concern; this struct is what a
//! caller-side config layer deserializes into.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::RunMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub target_dir: PathBuf,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    pub mode: RunMode,
    #[serde(default)]
    pub in_place: bool,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub concurrency_override: Option<usize>,
    #[serde(default)]
    pub skip_existing: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default)]
    pub timeout_override: Option<u64>,
    #[serde(default)]
    pub format_overrides: HashMap<String, String>,
    #[serde(default)]
    pub tool_paths: HashMap<String, PathBuf>,
    #[serde(default)]
    pub keep_backups: bool,
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
    #[serde(default = "default_flush_every_n")]
    pub flush_every_n: u32,
}

fn default_retries() -> u32 {
    2
}

fn default_flush_every_n() -> u32 {
    10
}

fn default_checkpoint_path() -> PathBuf {
    dirs_fallback_home()
        .join(".modern_format_boost")
        .join("sessions.db")
}

/// Minimal HOME lookup; this workspace does not depend on the `dirs` crate,
/// so this mirrors the `$HOME`-or-`/tmp` fallback `shared_utils` itself uses
/// around the codebase for default paths.
fn dirs_fallback_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

impl RunConfig {
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.target_dir.clone())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.target_dir.is_absolute() {
            anyhow::bail!("target_dir must be an absolute path: {:?}", self.target_dir);
        }
        shared_utils::safety::check_dangerous_directory(&self.target_dir)
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_dir_defaults_to_target_dir() {
        let cfg = RunConfig {
            target_dir: PathBuf::from("/tmp/x"),
            output_dir: None,
            mode: RunMode::AutoPlus,
            in_place: true,
            interactive: false,
            concurrency_override: None,
            skip_existing: false,
            dry_run: false,
            retries: default_retries(),
            timeout_override: None,
            format_overrides: HashMap::new(),
            tool_paths: HashMap::new(),
            keep_backups: false,
            checkpoint_path: default_checkpoint_path(),
            flush_every_n: default_flush_every_n(),
        };
        assert_eq!(cfg.output_dir(), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn validate_rejects_relative_target_dir() {
        let cfg = RunConfig {
            target_dir: PathBuf::from("relative/path"),
            output_dir: None,
            mode: RunMode::AutoPlus,
            in_place: true,
            interactive: false,
            concurrency_override: None,
            skip_existing: false,
            dry_run: false,
            retries: 2,
            timeout_override: None,
            format_overrides: HashMap::new(),
            tool_paths: HashMap::new(),
            keep_backups: false,
            checkpoint_path: default_checkpoint_path(),
            flush_every_n: 10,
        };
        assert!(cfg.validate().is_err());
    }
}
