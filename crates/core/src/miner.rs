//! The conflict-mining engine.
//!
//! Drives the end-to-end pipeline in two modes that share one record shape:
//!
//! - **Merge-replay**: every merge commit in a repository's history is
//!   replayed from its first two parents on a disposable branch; conflicts
//!   that reappear are extracted and correlated against the file content of
//!   the actual historical merge commit (the ground-truth resolution).
//! - **Patch-sequence**: two divergent patch streams are interleaved by
//!   authorship time and applied one by one to a target workspace; conflicts
//!   are correlated against a separately supplied resolved reference.
//!
//! Execution is strictly sequential: each mining iteration fully owns the
//! working tree for its duration. A single item failing for reasons other
//! than a content conflict (command failure, timeout) is logged and
//! skipped after the workspace is reset; only a failed workspace
//! restoration aborts the run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MinerConfig;
use crate::dataset::DatasetWriter;
use crate::errors::{GitError, MinerError, ReplayError};
use crate::extract;
use crate::git::{parser, GitRunner};
use crate::locate::{self, ResolutionRecord};
use crate::patch::{self, PatchRecord};
use crate::replay::{MergeOutcome, WorkspaceReplayer, WorkspaceSnapshot};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Counters from a single mining run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MiningStats {
    /// Merge commits or patches examined.
    pub items_processed: usize,
    /// Items that reproduced at least one conflict.
    pub items_with_conflicts: usize,
    /// Conflict sections extracted.
    pub sections_extracted: usize,
    /// Sections whose resolution was located.
    pub resolutions_found: usize,
    /// Sections recorded with the NOT FOUND sentinel.
    pub resolutions_not_found: usize,
    /// Items skipped after a non-conflict failure.
    pub items_failed: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Orchestrates replay, extraction, location, and dataset output.
pub struct MiningEngine {
    margin: usize,
    apply_timeout: Duration,
    output_dir: PathBuf,
}

impl MiningEngine {
    pub fn new(config: &MinerConfig) -> Self {
        Self {
            margin: config.mining.margin,
            apply_timeout: Duration::from_secs(config.mining.apply_timeout_secs),
            output_dir: config.mining.output_dir.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Merge-replay mode
    // -----------------------------------------------------------------------

    /// Replay every merge commit in `repo` and mine reproduced conflicts.
    ///
    /// The workspace is captured once up front and restored at the end,
    /// including on error paths; each merge commit is independently rolled
    /// back after its attempt.
    pub async fn mine_merges(&self, repo: &Path) -> Result<MiningStats, MinerError> {
        let git = GitRunner::open(repo)?;
        let replayer = WorkspaceReplayer::new(git);

        let merge_commits = replayer.git().merge_commits().await?;
        info!(count = merge_commits.len(), "replaying merge commits");

        let mut stats = MiningStats::default();
        let snapshot = replayer.capture_state().await?;

        let result = self
            .replay_merge_commits(&replayer, &snapshot, &merge_commits, &mut stats)
            .await;
        let restored = replayer.restore(snapshot).await;

        restored?;
        result?;

        info!(
            items = stats.items_processed,
            conflicted = stats.items_with_conflicts,
            sections = stats.sections_extracted,
            "merge mining completed"
        );
        Ok(stats)
    }

    async fn replay_merge_commits(
        &self,
        replayer: &WorkspaceReplayer,
        snapshot: &WorkspaceSnapshot,
        commits: &[String],
        stats: &mut MiningStats,
    ) -> Result<(), MinerError> {
        for commit in commits {
            stats.items_processed += 1;
            match self.replay_one_merge(replayer, snapshot, commit, stats).await {
                Ok(()) => {}
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    warn!(commit = %commit, error = %e, "skipping merge commit");
                    stats.items_failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn replay_one_merge(
        &self,
        replayer: &WorkspaceReplayer,
        snapshot: &WorkspaceSnapshot,
        commit: &str,
        stats: &mut MiningStats,
    ) -> Result<(), MinerError> {
        let (parent_a, parent_b) = match replayer.merge_parents(commit).await {
            Ok(parents) => parents,
            Err(ReplayError::NotAMergeCommit(_)) => {
                debug!(commit = %commit, "fewer than two parents, skipping");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let attempt = replayer
            .begin_merge_attempt(snapshot, &parent_a, &parent_b)
            .await?;

        debug!(
            commit = %commit,
            parent_a = %parent_a,
            parent_b = %parent_b,
            output = %attempt.output,
            "merge replayed"
        );

        let mined = match &attempt.outcome {
            MergeOutcome::Clean => Ok(()),
            MergeOutcome::Conflicted { files } => {
                info!(commit = %commit, count = files.len(), "conflicts reproduced");
                self.mine_conflicted_files(replayer.git(), commit, files, Some(commit), stats)
                    .await
            }
        };

        // Cleanup runs no matter how mining went; its failure outranks the
        // mining result because the tree may be left unusable.
        replayer.finish_attempt(attempt, snapshot).await?;
        mined
    }

    // -----------------------------------------------------------------------
    // Patch-sequence mode
    // -----------------------------------------------------------------------

    /// Apply patches from `patch_dirs` to `target_repo` in chronological
    /// order, mining conflicts against `resolved_ref`.
    ///
    /// Clean applications accumulate (the next patch sees their result);
    /// a conflicted or failed application is cleared before moving on.
    pub async fn mine_patches(
        &self,
        target_repo: &Path,
        patch_dirs: &[PathBuf],
        resolved_ref: &str,
    ) -> Result<MiningStats, MinerError> {
        let git = GitRunner::open(target_repo)?;
        let records = patch::sequence(patch_dirs)?;
        info!(count = records.len(), "applying patch stream");

        let mut stats = MiningStats::default();
        for record in &records {
            stats.items_processed += 1;
            match self
                .apply_and_mine_patch(&git, record, resolved_ref, &mut stats)
                .await
            {
                Ok(()) => {}
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    warn!(
                        commit = %record.commit_id,
                        patch = %record.path.display(),
                        error = %e,
                        "skipping patch"
                    );
                    stats.items_failed += 1;
                    self.reset_target(&git).await;
                }
            }
        }

        info!(
            items = stats.items_processed,
            conflicted = stats.items_with_conflicts,
            sections = stats.sections_extracted,
            "patch mining completed"
        );
        Ok(stats)
    }

    async fn apply_and_mine_patch(
        &self,
        git: &GitRunner,
        record: &PatchRecord,
        resolved_ref: &str,
        stats: &mut MiningStats,
    ) -> Result<(), MinerError> {
        debug!(commit = %record.commit_id, patch = %record.path.display(), "applying patch");

        let output = git.apply_mailbox(&record.path, self.apply_timeout).await?;
        let mut conflicts = parser::conflicts_from_apply_output(&output.combined());
        if conflicts.is_empty() && !output.success() {
            conflicts = git.conflict_paths().await?;
        }

        if conflicts.is_empty() {
            if output.success() {
                return Ok(());
            }
            // `am` refused the patch outright; fall back to a plain tree
            // application before giving up on the item.
            git.abort_mailbox().await?;
            let fallback = git.apply_patch(&record.path, self.apply_timeout).await?;
            if fallback.success() {
                debug!(commit = %record.commit_id, "applied via git apply");
                return Ok(());
            }
            conflicts = parser::conflicts_from_apply_output(&fallback.combined());
            if conflicts.is_empty() {
                conflicts = git.conflict_paths().await?;
            }
            if conflicts.is_empty() {
                return Err(GitError::CommandFailed {
                    command: format!("git apply --3way {}", record.path.display()),
                    exit_code: fallback.exit_code,
                    stderr: fallback.stderr,
                }
                .into());
            }
        }

        info!(
            commit = %record.commit_id,
            count = conflicts.len(),
            "patch application conflicted"
        );

        let resolved_commit = self.resolved_merge_commit(git, resolved_ref).await;
        let file_stem = format!("{}-{}", record.commit_id, record.file_stem());
        let mined = self
            .mine_conflicted_files(git, &file_stem, &conflicts, resolved_commit.as_deref(), stats)
            .await;

        // Clear the conflicted application so the next patch starts from a
        // clean tree.
        self.reset_target(git).await;
        mined
    }

    /// First merge commit on the ancestry path toward the resolved
    /// reference; its tree holds the human-applied resolutions.
    async fn resolved_merge_commit(&self, git: &GitRunner, resolved_ref: &str) -> Option<String> {
        match git.first_merge_between(resolved_ref).await {
            Ok(Some(hash)) => Some(hash),
            Ok(None) => {
                warn!(resolved_ref, "no merge commit on ancestry path to resolved reference");
                None
            }
            Err(e) => {
                warn!(resolved_ref, error = %e, "resolved reference not usable");
                None
            }
        }
    }

    async fn reset_target(&self, git: &GitRunner) {
        if let Err(e) = git.abort_mailbox().await {
            debug!(error = %e, "mailbox abort failed");
        }
        if let Err(e) = git.reset_hard("HEAD").await {
            debug!(error = %e, "reset of target workspace failed");
        }
    }

    // -----------------------------------------------------------------------
    // Combined two-repository replay
    // -----------------------------------------------------------------------

    /// Mine conflicts between two diverging repositories.
    ///
    /// Generates mailbox patches for both histories, initialises a fresh
    /// target workspace under `temp_dir`, fetches the downstream repository
    /// into it (providing both the resolved reference and the blobs
    /// three-way application needs), and replays the interleaved stream.
    pub async fn replay_streams(
        &self,
        upstream: &Path,
        downstream: &Path,
        downstream_gitopts: &[String],
        temp_dir: &Path,
    ) -> Result<MiningStats, MinerError> {
        let upstream_git = GitRunner::open(upstream)?;
        let downstream_git = GitRunner::open(downstream)?;

        let upstream_patches = temp_dir.join("upstream");
        let downstream_patches = temp_dir.join("downstream");
        patch::generate_patches(&upstream_git, &upstream_patches, &[]).await?;
        patch::generate_patches(&downstream_git, &downstream_patches, downstream_gitopts).await?;

        let target_dir = temp_dir.join("target");
        let target = GitRunner::new(&target_dir);
        target.init_repo().await?;
        target.config_set("user.name", "mergeminer").await?;
        target.config_set("user.email", "mergeminer@localhost").await?;
        target.fetch(&downstream.to_string_lossy()).await?;

        self.mine_patches(
            &target_dir,
            &[upstream_patches, downstream_patches],
            "FETCH_HEAD",
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Shared extraction / location / output
    // -----------------------------------------------------------------------

    /// Extract sections from each conflicted file and correlate them with
    /// the resolved reference, appending one record per section.
    ///
    /// Per-file problems (unreadable content, missing reference copy) skip
    /// the file or mark its sections NOT FOUND; only dataset output errors
    /// propagate.
    async fn mine_conflicted_files(
        &self,
        git: &GitRunner,
        file_stem: &str,
        files: &[String],
        resolved_commit: Option<&str>,
        stats: &mut MiningStats,
    ) -> Result<(), MinerError> {
        let writer = DatasetWriter::create(&self.output_dir, file_stem)?;

        for file in files {
            let full_path = git.repo_path().join(file);
            let content = match std::fs::read_to_string(&full_path) {
                Ok(c) => c,
                Err(e) => {
                    warn!(file = %file, error = %e, "conflicted file unreadable, skipping");
                    continue;
                }
            };
            let lines: Vec<String> = content.lines().map(str::to_string).collect();

            let sections = extract::extract(&lines, self.margin);
            if sections.is_empty() {
                debug!(file = %file, "no conflict markers found");
                continue;
            }

            let reference = match resolved_commit {
                Some(commit) => match git.show_file(commit, file).await {
                    Ok(text) => Some(text.lines().map(str::to_string).collect::<Vec<String>>()),
                    Err(e) => {
                        warn!(file = %file, commit, error = %e, "no resolved copy of file");
                        None
                    }
                },
                None => None,
            };

            for section in &sections {
                stats.sections_extracted += 1;
                let record = match &reference {
                    Some(reference_lines) => locate::locate(section, reference_lines),
                    None => ResolutionRecord {
                        resolved: None,
                        confidence: 0.0,
                    },
                };
                if record.is_found() {
                    stats.resolutions_found += 1;
                } else {
                    stats.resolutions_not_found += 1;
                }
                writer.append(file, section, &record)?;
            }
        }

        stats.items_with_conflicts += 1;
        Ok(())
    }
}

/// Whether an error must abort the whole run rather than skip one item.
fn is_fatal(err: &MinerError) -> bool {
    matches!(
        err,
        MinerError::Replay(ReplayError::RestoreFailed { .. })
            | MinerError::Dataset(_)
            | MinerError::Git(GitError::BinaryNotFound(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(is_fatal(&MinerError::Replay(ReplayError::RestoreFailed {
            detail: "stash pop failed".into()
        })));
        assert!(is_fatal(&MinerError::Git(GitError::BinaryNotFound(
            "git".into()
        ))));
        assert!(!is_fatal(&MinerError::Git(GitError::CommandFailed {
            command: "git merge x".into(),
            exit_code: 1,
            stderr: String::new(),
        })));
        assert!(!is_fatal(&MinerError::Git(GitError::Timeout {
            command: "git am x.patch".into(),
            secs: 10,
        })));
    }

    #[test]
    fn test_stats_default_is_zeroed() {
        let stats = MiningStats::default();
        assert_eq!(stats.items_processed, 0);
        assert_eq!(stats.sections_extracted, 0);
    }
}
