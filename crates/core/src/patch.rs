//! Patch-file scanning and chronological sequencing.
//!
//! Mailbox patches produced by `git format-patch` carry an originating
//! commit id on the leading `From <sha>` line and an RFC-2822 authorship
//! timestamp on the `Date:` header. Two independently generated patch sets
//! (e.g. an upstream and a downstream line of development) are pooled and
//! sorted ascending by that timestamp, producing one global application
//! order that replays both streams in true wall-clock order.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use tracing::{debug, info, warn};

use crate::errors::{GitError, PatchError};
use crate::git::GitRunner;

/// One patch file, ready for sequencing.
#[derive(Debug, Clone)]
pub struct PatchRecord {
    /// Commit hash from the `From <sha>` line.
    pub commit_id: String,
    /// Authorship timestamp from the `Date:` header.
    pub timestamp: DateTime<FixedOffset>,
    /// Location of the patch content.
    pub path: PathBuf,
}

impl PatchRecord {
    /// Patch file name without the `.patch` extension, used in dataset
    /// file naming.
    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Commit id from the leading `From <sha>` mbox line.
pub fn read_commit_id(path: &Path) -> Result<String, PatchError> {
    let content = std::fs::read_to_string(path)?;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("From ") {
            if let Some(id) = rest.split_whitespace().next() {
                return Ok(id.to_string());
            }
        }
    }
    Err(PatchError::MissingCommitId(path.to_path_buf()))
}

/// Authorship timestamp from the first `Date:` header line.
pub fn read_patch_date(path: &Path) -> Result<DateTime<FixedOffset>, PatchError> {
    let content = std::fs::read_to_string(path)?;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("Date: ") {
            return DateTime::parse_from_rfc2822(rest.trim())
                .map_err(|_| PatchError::MissingDate(path.to_path_buf()));
        }
    }
    Err(PatchError::MissingDate(path.to_path_buf()))
}

/// Scan one directory for `*.patch` files, in file-name order.
///
/// Patches missing a commit id or a parseable date are dropped with a
/// warning; only an unreadable directory is an error.
fn scan_patch_dir(dir: &Path) -> Result<Vec<PatchRecord>, PatchError> {
    if !dir.is_dir() {
        return Err(PatchError::DirectoryNotFound(dir.to_path_buf()));
    }
    // Patch paths are later handed to git running in another directory, so
    // they must not depend on the current working directory.
    let dir = dir.canonicalize()?;

    let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "patch"))
        .collect();
    paths.sort();

    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        let commit_id = match read_commit_id(&path) {
            Ok(id) => id,
            Err(e) => {
                warn!(patch = %path.display(), error = %e, "skipping patch");
                continue;
            }
        };
        let timestamp = match read_patch_date(&path) {
            Ok(ts) => ts,
            Err(e) => {
                warn!(patch = %path.display(), error = %e, "skipping patch");
                continue;
            }
        };
        records.push(PatchRecord {
            commit_id,
            timestamp,
            path,
        });
    }

    debug!(dir = %dir.display(), count = records.len(), "scanned patch directory");
    Ok(records)
}

/// Pool every patch from all input directories and sort ascending by
/// authorship timestamp.
///
/// The sort is stable, so dropping an unparseable patch never reorders the
/// remaining ones, and same-instant patches keep their scan order.
pub fn sequence(dirs: &[PathBuf]) -> Result<Vec<PatchRecord>, PatchError> {
    let mut records = Vec::new();
    for dir in dirs {
        records.extend(scan_patch_dir(dir)?);
    }

    records.sort_by_key(|r| r.timestamp);
    info!(count = records.len(), "sequenced patches");
    Ok(records)
}

/// Generate mailbox patches for the repository's entire first-parent
/// history (root commit excluded) into `output_dir`.
pub async fn generate_patches(
    git: &GitRunner,
    output_dir: &Path,
    extra_args: &[String],
) -> Result<(), GitError> {
    let root = git.root_commit().await?;
    let range = format!("{}..HEAD", root);
    git.format_patch(&range, output_dir, extra_args).await
}
