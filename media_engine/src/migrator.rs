//! §4.H Metadata Migrator — copies EXIF/XMP/ICC from source to target;
//! reapplies filesystem mtime/btime and platform-specific extended
//! attributes. Generalizes the teacher's two-tier exiftool fallback
//! (`shared_utils::metadata::exif::preserve_internal_metadata`) into the
//! spec's explicit three tiers.

use std::path::Path;
use std::process::Command;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use filetime::FileTime;
use tracing::warn;

use crate::supervisor::{self, HangPolicy, JobContext};

/// `JobContext` for a single-file exiftool invocation: these are metadata
/// reads/writes, not transcodes, so a fixed low complexity is enough to size
/// the timeout (§4.L).
fn exiftool_ctx(file_size: u64) -> JobContext {
    JobContext {
        file_size,
        complexity: 5,
        format_factor: 0.1,
    }
}

fn file_size_or_zero(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationTier {
    FullTagCopy,
    ReducedTagSet,
    EssentialTimestampsOnly,
}

#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub tier_used: Option<MigrationTier>,
    pub icc_copied: bool,
    pub tagged_srgb: bool,
    pub missing_datetime: bool,
    pub xattrs_copied: bool,
    pub timestamps_restored: bool,
}

const REDUCED_TAGS: &[&str] = &[
    "-DateTimeOriginal",
    "-CreateDate",
    "-ModifyDate",
    "-Make",
    "-Model",
    "-LensModel",
    "-ExposureTime",
    "-FNumber",
    "-ISO",
    "-Copyright",
    "-ImageDescription",
];

const ESSENTIAL_TAGS: &[&str] = &["-DateTimeOriginal", "-CreateDate", "-ModifyDate"];

/// Run exiftool through the Process Supervisor and return whether its own
/// success marker was present, because exiftool sometimes exits 0 while
/// writing nothing (§4.H).
fn run_exiftool(exiftool_bin: &str, args: &[&str], file_size: u64, cancel: &Arc<AtomicBool>) -> (bool, String) {
    let ctx = exiftool_ctx(file_size);
    match supervisor::run(exiftool_bin, args, ctx, cancel, HangPolicy::Terminate) {
        Ok(out) => {
            let combined = format!("{}\n{}", out.stdout, out.stderr);
            let success_marker = combined.contains("image files updated")
                || combined.contains("1 image files updated");
            (success_marker, combined)
        }
        Err(e) => (false, format!("failed to run exiftool: {e}")),
    }
}

fn tier1_full_copy(source: &Path, target: &Path, exiftool_bin: &str, cancel: &Arc<AtomicBool>) -> bool {
    let src = source.to_string_lossy().to_string();
    let dst = target.to_string_lossy().to_string();
    let args = [
        "-TagsFromFile",
        src.as_str(),
        "-all:all",
        "-overwrite_original",
        dst.as_str(),
    ];
    run_exiftool(exiftool_bin, &args, file_size_or_zero(source), cancel).0
}

fn tier2_reduced_tags(source: &Path, target: &Path, exiftool_bin: &str, cancel: &Arc<AtomicBool>) -> bool {
    let src = source.to_string_lossy().to_string();
    let dst = target.to_string_lossy().to_string();
    let mut args: Vec<&str> = vec!["-TagsFromFile", src.as_str()];
    args.extend_from_slice(REDUCED_TAGS);
    args.push("-overwrite_original");
    args.push(dst.as_str());
    run_exiftool(exiftool_bin, &args, file_size_or_zero(source), cancel).0
}

fn tier3_essential_timestamps(source: &Path, target: &Path, exiftool_bin: &str, cancel: &Arc<AtomicBool>) -> bool {
    let src = source.to_string_lossy().to_string();
    let dst = target.to_string_lossy().to_string();
    let mut args: Vec<&str> = vec!["-TagsFromFile", src.as_str()];
    args.extend_from_slice(ESSENTIAL_TAGS);
    args.push("-overwrite_original");
    args.push(dst.as_str());
    run_exiftool(exiftool_bin, &args, file_size_or_zero(source), cancel).0
}

fn source_has_datetime(source: &Path, exiftool_bin: &str, cancel: &Arc<AtomicBool>) -> bool {
    let src = source.to_string_lossy().to_string();
    let ctx = exiftool_ctx(file_size_or_zero(source));
    supervisor::run(exiftool_bin, &["-s3", "-DateTimeOriginal", src.as_str()], ctx, cancel, HangPolicy::Terminate)
        .map(|out| !out.stdout.trim().is_empty())
        .unwrap_or(false)
}

fn target_has_datetime(target: &Path, exiftool_bin: &str, cancel: &Arc<AtomicBool>) -> bool {
    source_has_datetime(target, exiftool_bin, cancel)
}

/// Reapply filesystem mtime (and, where exposed, birthtime) from source to
/// target. A single cross-platform entry point per §9's design note.
pub fn restore_timestamps(source: &Path, target: &Path) -> std::io::Result<()> {
    let meta = std::fs::metadata(source)?;
    let mtime = FileTime::from_last_modification_time(&meta);
    let atime = FileTime::from_last_access_time(&meta);
    filetime::set_file_times(target, atime, mtime)?;
    restore_creation_time_platform(source, target);
    Ok(())
}

#[cfg(target_os = "macos")]
fn restore_creation_time_platform(source: &Path, target: &Path) {
    // macOS exposes birthtime only via `SetFile`/`touch -t -c`; shell out
    // rather than hand-roll the Mach API call, matching the teacher's own
    // macOS-specific metadata path.
    if let Ok(meta) = std::fs::metadata(source) {
        if let Ok(created) = meta.created() {
            let datetime: chrono::DateTime<chrono::Local> = created.into();
            let stamp = datetime.format("%m/%d/%Y %H:%M:%S").to_string();
            let _ = Command::new("SetFile")
                .args(["-d", stamp.as_str()])
                .arg(target)
                .output();
        }
    }
}

#[cfg(not(target_os = "macos"))]
fn restore_creation_time_platform(_source: &Path, _target: &Path) {
    // Linux/BSD expose no portable birthtime-set syscall; mtime/atime
    // restoration above is the best available signal.
}

/// Copy macOS Finder extended attributes (`com.apple.metadata:*`) verbatim
/// when present.
fn copy_extended_attributes(source: &Path, target: &Path) -> bool {
    let Ok(names) = xattr::list(source) else {
        return false;
    };
    let mut copied_any = false;
    for name in names {
        let name_str = name.to_string_lossy();
        if !name_str.starts_with("com.apple.metadata") && !name_str.starts_with("user.") {
            continue;
        }
        if let Ok(Some(value)) = xattr::get(source, &name) {
            if xattr::set(target, &name, &value).is_ok() {
                copied_any = true;
            }
        }
    }
    copied_any
}

// The `image` crate does not expose embedded ICC profile bytes generically
// across formats, so presence is checked through exiftool instead.
fn icc_profile_present(path: &Path, exiftool_bin: &str, cancel: &Arc<AtomicBool>) -> bool {
    has_icc_via_exiftool(path, exiftool_bin, cancel)
}

fn has_icc_via_exiftool(path: &Path, exiftool_bin: &str, cancel: &Arc<AtomicBool>) -> bool {
    let p = path.to_string_lossy().to_string();
    let ctx = exiftool_ctx(file_size_or_zero(path));
    supervisor::run(exiftool_bin, &["-s3", "-ICC_Profile:ProfileDescription", p.as_str()], ctx, cancel, HangPolicy::Terminate)
        .map(|out| !out.stdout.trim().is_empty())
        .unwrap_or(false)
}

fn copy_icc_profile(source: &Path, target: &Path, exiftool_bin: &str, cancel: &Arc<AtomicBool>) -> bool {
    let src = source.to_string_lossy().to_string();
    let dst = target.to_string_lossy().to_string();
    run_exiftool(
        exiftool_bin,
        &["-TagsFromFile", src.as_str(), "-icc_profile", "-overwrite_original", dst.as_str()],
        file_size_or_zero(source),
        cancel,
    )
    .0
}

fn tag_srgb(target: &Path, exiftool_bin: &str, cancel: &Arc<AtomicBool>) -> bool {
    let dst = target.to_string_lossy().to_string();
    run_exiftool(exiftool_bin, &["-ColorSpace=sRGB", "-overwrite_original", dst.as_str()], file_size_or_zero(target), cancel).0
}

/// `migrate(source, target, exiftool_bin, cancel) -> MigrationOutcome`.
/// Migration failures are Warn-level: the conversion is never rolled back
/// solely because metadata migration failed. Every exiftool invocation
/// flows through the Process Supervisor (§2) so a hung exiftool process is
/// terminated on the same timeout/escalation policy as the executor's tools.
pub fn migrate(source: &Path, target: &Path, exiftool_bin: &str, cancel: &Arc<AtomicBool>) -> MigrationOutcome {
    let had_datetime = source_has_datetime(source, exiftool_bin, cancel);

    let tier_used = if tier1_full_copy(source, target, exiftool_bin, cancel) {
        Some(MigrationTier::FullTagCopy)
    } else if tier2_reduced_tags(source, target, exiftool_bin, cancel) {
        Some(MigrationTier::ReducedTagSet)
    } else if tier3_essential_timestamps(source, target, exiftool_bin, cancel) {
        Some(MigrationTier::EssentialTimestampsOnly)
    } else {
        warn!(?source, ?target, "all exiftool metadata migration tiers failed");
        None
    };

    let icc_copied = if icc_profile_present(source, exiftool_bin, cancel) {
        copy_icc_profile(source, target, exiftool_bin, cancel)
    } else {
        false
    };
    let tagged_srgb = !icc_copied && tag_srgb(target, exiftool_bin, cancel);

    let xattrs_copied = copy_extended_attributes(source, target);
    let timestamps_restored = restore_timestamps(source, target).is_ok();

    let missing_datetime = had_datetime && !target_has_datetime(target, exiftool_bin, cancel);

    MigrationOutcome {
        tier_used,
        icc_copied,
        tagged_srgb,
        missing_datetime,
        xattrs_copied,
        timestamps_restored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn restore_timestamps_copies_mtime() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src.png");
        let target = dir.path().join("dst.jxl");
        std::fs::write(&source, b"a").unwrap();
        std::fs::write(&target, b"b").unwrap();

        let past = FileTime::from_unix_time(1_000_000, 0);
        filetime::set_file_times(&source, past, past).unwrap();

        restore_timestamps(&source, &target).unwrap();

        let target_meta = std::fs::metadata(&target).unwrap();
        let target_mtime = FileTime::from_last_modification_time(&target_meta);
        assert_eq!(target_mtime, past);
    }

    #[test]
    fn migration_outcome_never_panics_without_exiftool_installed() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("src.png");
        let target = dir.path().join("dst.jxl");
        std::fs::write(&source, b"a").unwrap();
        std::fs::write(&target, b"b").unwrap();
        // Just assert it runs to completion regardless of host tooling.
        let cancel = Arc::new(AtomicBool::new(false));
        let _ = migrate(&source, &target, "exiftool", &cancel);
    }
}
