//! Error types for the MergeMiner core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`MinerError`] enum unifies them all for callers that want a
//! single error type.
//!
//! The taxonomy mirrors how failures are handled: git command failures and
//! patch parse failures are recovered per item, restore failures are fatal
//! to the whole run, and an unlocatable resolution is not an error at all
//! (it is encoded as a `NOT FOUND` record in the dataset).

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum MinerError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from git CLI invocations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// A `git` command exited with a non-zero status.
    #[error("git command failed ({command}, exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// A `git` command exceeded its time budget.
    #[error("git command timed out after {secs}s: {command}")]
    Timeout { command: String, secs: u64 },

    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Replay errors
// ---------------------------------------------------------------------------

/// Errors from the workspace replay subsystem.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The commit being replayed has fewer than two parents.
    #[error("commit {0} is not a merge commit")]
    NotAMergeCommit(String),

    /// The workspace could not be returned to its captured state.
    ///
    /// Fatal: the working tree may hold user data in a stash or sit on a
    /// disposable branch, and further mining would compound the damage.
    #[error("failed to restore workspace state: {detail}")]
    RestoreFailed { detail: String },

    /// Underlying git error during replay.
    #[error(transparent)]
    Git(#[from] GitError),
}

// ---------------------------------------------------------------------------
// Patch errors
// ---------------------------------------------------------------------------

/// Errors from patch-file scanning and sequencing.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The patch file has no leading `From <sha>` line.
    #[error("no commit id found in patch '{}'", .0.display())]
    MissingCommitId(PathBuf),

    /// The patch file has no parseable `Date:` header.
    #[error("no parseable Date header in patch '{}'", .0.display())]
    MissingDate(PathBuf),

    /// The patch directory does not exist or is unreadable.
    #[error("patch directory not found: '{}'", .0.display())]
    DirectoryNotFound(PathBuf),

    /// Generic I/O wrapper.
    #[error("patch I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Dataset errors
// ---------------------------------------------------------------------------

/// Errors from the dataset output writer.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The output directory could not be created.
    #[error("output directory error at '{path}': {detail}")]
    OutputDirError { path: String, detail: String },

    /// Generic I/O wrapper.
    #[error("dataset I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = GitError::CommandFailed {
            command: "git merge abc".into(),
            exit_code: 128,
            stderr: "fatal: not something we can merge".into(),
        };
        assert!(err.to_string().contains("git merge abc"));
        assert!(err.to_string().contains("128"));

        let err = GitError::Timeout {
            command: "git am x.patch".into(),
            secs: 10,
        };
        assert_eq!(
            err.to_string(),
            "git command timed out after 10s: git am x.patch"
        );

        let err = ReplayError::RestoreFailed {
            detail: "stash pop failed".into(),
        };
        assert!(err.to_string().contains("stash pop failed"));

        let err = PatchError::MissingDate(PathBuf::from("/tmp/0001-fix.patch"));
        assert!(err.to_string().contains("0001-fix.patch"));
    }

    #[test]
    fn test_miner_error_from_subsystem() {
        let git_err = GitError::BinaryNotFound("git".into());
        let miner_err: MinerError = git_err.into();
        assert!(matches!(miner_err, MinerError::Git(_)));

        let replay_err = ReplayError::NotAMergeCommit("abc123".into());
        let miner_err: MinerError = replay_err.into();
        assert!(matches!(miner_err, MinerError::Replay(_)));
    }
}
