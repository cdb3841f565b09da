//! Safe, reversible merge replay against a live working tree.
//!
//! The working tree is a singleton mutable resource: every mutation goes
//! through [`WorkspaceReplayer`], which implements the scoped
//! acquire/release discipline the miner depends on. A mining run captures
//! the workspace state once ([`WorkspaceReplayer::capture_state`]), replays
//! merges on a uuid-named disposable branch, and restores the original
//! state at the end. Every path out of an attempt — clean merge, conflict,
//! command failure, or an error raised by the caller while it processes
//! conflicted files — must pass through [`WorkspaceReplayer::finish_attempt`]
//! before the next attempt begins; cleanup is async, so the guarantee is
//! explicit rather than a drop guard.
//!
//! State machine for one iteration:
//!
//! ```text
//! Clean -> Stashed? -> TempBranchCreated -> Merging
//!       -> (Conflicted | CleanMerge) -> Aborted -> TempBranchDeleted
//!       -> RestoredBranch -> StashPopped? -> Clean
//! ```
//!
//! A failure to restore (branch checkout or stash pop) is fatal for the
//! whole run: it would silently lose user data, so it is reported, never
//! swallowed.

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::errors::{GitError, ReplayError};
use crate::git::GitRunner;

/// Captured workspace state, owed a matching [`WorkspaceReplayer::restore`].
#[derive(Debug, Clone)]
pub struct WorkspaceSnapshot {
    /// HEAD commit at capture time.
    pub head: String,
    /// Branch name at capture time (`HEAD` when detached).
    pub branch: String,
    /// Whether local modifications were stashed away.
    pub stashed: bool,
}

/// Result of a non-committing merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The merge applied without conflicts.
    Clean,
    /// The merge stopped with these paths in the unmerged state.
    Conflicted { files: Vec<String> },
}

impl MergeOutcome {
    pub fn is_conflicted(&self) -> bool {
        matches!(self, Self::Conflicted { .. })
    }
}

/// An in-progress merge replay on a disposable branch.
///
/// Consumed by [`WorkspaceReplayer::finish_attempt`]; holding one means the
/// working tree is parked on the disposable branch.
#[derive(Debug)]
pub struct MergeAttempt {
    branch: String,
    /// Combined stdout/stderr of the merge command.
    pub output: String,
    pub outcome: MergeOutcome,
}

/// Scoped mutator of one repository's working tree.
pub struct WorkspaceReplayer {
    git: GitRunner,
}

impl WorkspaceReplayer {
    pub fn new(git: GitRunner) -> Self {
        Self { git }
    }

    /// The underlying runner, for read-only queries against the same tree.
    pub fn git(&self) -> &GitRunner {
        &self.git
    }

    // -----------------------------------------------------------------------
    // Snapshot / restore
    // -----------------------------------------------------------------------

    /// Record the current head, branch, and dirty state; stash local
    /// modifications if any exist.
    #[instrument(skip(self))]
    pub async fn capture_state(&self) -> Result<WorkspaceSnapshot, ReplayError> {
        let head = self.git.current_head().await?;
        let branch = self.git.current_branch().await?;

        let status = self.git.status_porcelain().await?;
        let stashed = if status.is_empty() {
            false
        } else {
            self.git.stash_push().await?;
            true
        };

        info!(%head, %branch, stashed, "captured workspace state");
        Ok(WorkspaceSnapshot {
            head,
            branch,
            stashed,
        })
    }

    /// Return to the original branch and re-apply stashed modifications.
    ///
    /// Must be invoked exactly once per [`Self::capture_state`], on success
    /// and failure paths alike. Any failure here is
    /// [`ReplayError::RestoreFailed`] and must abort the run.
    #[instrument(skip(self, snapshot), fields(branch = %snapshot.branch))]
    pub async fn restore(&self, snapshot: WorkspaceSnapshot) -> Result<(), ReplayError> {
        self.git
            .checkout(&snapshot.branch)
            .await
            .map_err(|e| ReplayError::RestoreFailed {
                detail: format!("checkout of '{}' failed: {}", snapshot.branch, e),
            })?;

        if snapshot.stashed {
            self.git
                .stash_pop()
                .await
                .map_err(|e| ReplayError::RestoreFailed {
                    detail: format!("stash pop failed: {}", e),
                })?;
        }

        info!("workspace restored");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Merge replay
    // -----------------------------------------------------------------------

    /// First two parents of `commit`, the "ours"/"theirs" pair for replay.
    ///
    /// Parents beyond the second (octopus merges) are ignored.
    pub async fn merge_parents(&self, commit: &str) -> Result<(String, String), ReplayError> {
        let parents = self.git.commit_parents(commit).await?;
        if parents.len() < 2 {
            return Err(ReplayError::NotAMergeCommit(commit.to_string()));
        }
        Ok((parents[0].clone(), parents[1].clone()))
    }

    /// Create a disposable branch, hard-reset it to `parent_a`, and attempt
    /// a non-committing merge of `parent_b`.
    ///
    /// On success the tree is parked on the disposable branch and the
    /// returned attempt must be passed to [`Self::finish_attempt`]. If any
    /// step after branch creation fails, cleanup runs before the error is
    /// returned — the caller never sees a half-set-up attempt.
    #[instrument(skip(self, snapshot), fields(parent_a, parent_b))]
    pub async fn begin_merge_attempt(
        &self,
        snapshot: &WorkspaceSnapshot,
        parent_a: &str,
        parent_b: &str,
    ) -> Result<MergeAttempt, ReplayError> {
        let branch = format!("mergeminer-replay-{}", Uuid::new_v4().simple());
        self.git.create_branch(&branch).await?;

        match self.reset_and_merge(parent_a, parent_b).await {
            Ok((output, outcome)) => {
                debug!(branch, conflicted = outcome.is_conflicted(), "merge attempt ready");
                Ok(MergeAttempt {
                    branch,
                    output,
                    outcome,
                })
            }
            Err(e) => {
                self.cleanup(&branch, snapshot).await?;
                Err(e.into())
            }
        }
    }

    async fn reset_and_merge(
        &self,
        parent_a: &str,
        parent_b: &str,
    ) -> Result<(String, MergeOutcome), GitError> {
        self.git.reset_hard(parent_a).await?;

        let output = self.git.merge_no_commit(parent_b).await?;
        let combined = output.combined();

        if output.success() {
            return Ok((combined, MergeOutcome::Clean));
        }

        // Non-zero exit: either a content conflict (unmerged paths present)
        // or an outright failure.
        let files = self.git.conflict_paths().await?;
        if files.is_empty() {
            return Err(GitError::CommandFailed {
                command: format!("git merge {} --no-commit --no-ff", parent_b),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        Ok((combined, MergeOutcome::Conflicted { files }))
    }

    /// Release an attempt: abort any in-progress merge, leave the
    /// disposable branch, and delete it.
    pub async fn finish_attempt(
        &self,
        attempt: MergeAttempt,
        snapshot: &WorkspaceSnapshot,
    ) -> Result<(), ReplayError> {
        self.cleanup(&attempt.branch, snapshot).await
    }

    async fn cleanup(&self, branch: &str, snapshot: &WorkspaceSnapshot) -> Result<(), ReplayError> {
        // Releases any in-progress merge; a no-op when the attempt was clean
        // or never got as far as merging.
        self.git.abort_merge().await?;

        self.git
            .checkout(&snapshot.head)
            .await
            .map_err(|e| ReplayError::RestoreFailed {
                detail: format!("checkout of '{}' failed: {}", snapshot.head, e),
            })?;

        if let Err(e) = self.git.delete_branch(branch).await {
            warn!(branch, error = %e, "failed to delete disposable branch");
            return Err(ReplayError::RestoreFailed {
                detail: format!("delete of disposable branch '{}' failed: {}", branch, e),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposable_branch_names_are_unique() {
        let a = format!("mergeminer-replay-{}", Uuid::new_v4().simple());
        let b = format!("mergeminer-replay-{}", Uuid::new_v4().simple());
        assert_ne!(a, b);
    }

    #[test]
    fn test_merge_outcome_classification() {
        assert!(!MergeOutcome::Clean.is_conflicted());
        assert!(MergeOutcome::Conflicted {
            files: vec!["a.rs".into()]
        }
        .is_conflicted());
    }
}
