//! Asynchronous git CLI runner.
//!
//! Git is driven purely as a black-box command executor: arguments in,
//! captured text and exit status out. A non-zero exit becomes a typed
//! [`GitError::CommandFailed`] carrying the command line and stderr; callers
//! that expect non-zero exits (merge and patch application report conflicts
//! that way) use [`GitRunner::run_unchecked`] and inspect the
//! [`CommandOutput`] themselves.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::parser;
use crate::errors::GitError;

/// Captured output of a single git invocation, success or not.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Process exit code (`-1` if terminated by a signal).
    pub exit_code: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout with stderr appended. Merge-family commands report conflict
    /// details across both streams, so correlation works on the combination.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Executes git subcommands against one working directory.
#[derive(Debug, Clone)]
pub struct GitRunner {
    repo_path: PathBuf,
}

impl GitRunner {
    /// Create a runner for `repo_path` without checking the path.
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    /// Create a runner for an existing repository directory.
    pub fn open(repo_path: impl Into<PathBuf>) -> Result<Self, GitError> {
        let path: PathBuf = repo_path.into();
        if !path.is_dir() {
            return Err(GitError::RepositoryNotFound(path.display().to_string()));
        }
        Ok(Self { repo_path: path })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    // -----------------------------------------------------------------------
    // Low-level execution
    // -----------------------------------------------------------------------

    /// Run a git command; non-zero exit is an error.
    ///
    /// Returns trimmed stdout, with stderr appended when `combine_stderr` is
    /// set (merge commands report conflicts via stderr-adjacent text).
    pub async fn run(&self, args: &[&str], combine_stderr: bool) -> Result<String, GitError> {
        let output = self.run_unchecked(args, None).await?;
        if !output.success() {
            warn!(
                exit_code = output.exit_code,
                stderr = %output.stderr,
                "git command failed"
            );
            return Err(GitError::CommandFailed {
                command: command_line(args),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        let mut result = output.stdout.trim().to_string();
        if combine_stderr {
            result.push_str(output.stderr.trim());
        }
        Ok(result)
    }

    /// Run a git command and capture its output regardless of exit status.
    ///
    /// Only spawn failures, I/O failures, and timeouts are errors. A timeout
    /// kills the child (via `kill_on_drop`) and surfaces as
    /// [`GitError::Timeout`]; the caller is responsible for resetting any
    /// half-applied workspace state.
    pub async fn run_unchecked(
        &self,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, GitError> {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo_path)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(cmd = %command_line(args), cwd = %self.repo_path.display(), "running git command");

        let result = match timeout {
            Some(dur) => match tokio::time::timeout(dur, cmd.output()).await {
                Ok(r) => r,
                Err(_) => {
                    warn!(cmd = %command_line(args), secs = dur.as_secs(), "git command timed out");
                    return Err(GitError::Timeout {
                        command: command_line(args),
                        secs: dur.as_secs(),
                    });
                }
            },
            None => cmd.output().await,
        };

        let output = result.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GitError::BinaryNotFound("git".into())
            } else {
                GitError::IoError(e)
            }
        })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // History inspection
    // -----------------------------------------------------------------------

    /// List merge commit hashes, newest first.
    #[instrument(skip(self), fields(repo = %self.repo_path.display()))]
    pub async fn merge_commits(&self) -> Result<Vec<String>, GitError> {
        let output = self
            .run(&["log", "--merges", "--pretty=format:%H"], false)
            .await?;
        let commits: Vec<String> = output
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        debug!(count = commits.len(), "listed merge commits");
        Ok(commits)
    }

    /// Parent hashes of `commit`, in recorded order.
    pub async fn commit_parents(&self, commit: &str) -> Result<Vec<String>, GitError> {
        let output = self
            .run(&["show", "--pretty=format:%P", "-s", commit], false)
            .await?;
        Ok(parser::parent_ids(&output))
    }

    /// Hash of the current HEAD commit.
    pub async fn current_head(&self) -> Result<String, GitError> {
        self.run(&["rev-parse", "HEAD"], false).await
    }

    /// Name of the current branch (`HEAD` when detached).
    pub async fn current_branch(&self) -> Result<String, GitError> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"], false).await
    }

    /// `git status --porcelain` output.
    pub async fn status_porcelain(&self) -> Result<String, GitError> {
        self.run(&["status", "--porcelain"], false).await
    }

    /// Paths currently in the unmerged (`UU`) state.
    pub async fn conflict_paths(&self) -> Result<Vec<String>, GitError> {
        let status = self.status_porcelain().await?;
        Ok(parser::conflict_paths(&status))
    }

    /// File content as of `commit` (`git show <commit>:<path>`).
    pub async fn show_file(&self, commit: &str, path: &str) -> Result<String, GitError> {
        let spec = format!("{}:{}", commit, path);
        let output = self.run_unchecked(&["show", &spec], None).await?;
        if !output.success() {
            return Err(GitError::CommandFailed {
                command: command_line(&["show", &spec]),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output.stdout)
    }

    /// First merge commit on the ancestry path between HEAD and `reference`,
    /// oldest first. `None` when the range contains no merge commit.
    pub async fn first_merge_between(&self, reference: &str) -> Result<Option<String>, GitError> {
        let range = format!("HEAD...{}", reference);
        let output = self
            .run(
                &["rev-list", "--merges", "--ancestry-path", "--reverse", &range],
                false,
            )
            .await?;
        Ok(output.lines().next().map(str::to_string))
    }

    /// The root (parentless, non-merge) commit of HEAD's history.
    pub async fn root_commit(&self) -> Result<String, GitError> {
        let output = self
            .run(&["rev-list", "--no-merges", "--max-parents=0", "HEAD"], false)
            .await?;
        output
            .lines()
            .next()
            .map(str::to_string)
            .ok_or_else(|| GitError::CommandFailed {
                command: "git rev-list --no-merges --max-parents=0 HEAD".into(),
                exit_code: 0,
                stderr: "no root commit found".into(),
            })
    }

    // -----------------------------------------------------------------------
    // Workspace mutation
    // -----------------------------------------------------------------------

    /// Stash local modifications.
    #[instrument(skip(self), fields(repo = %self.repo_path.display()))]
    pub async fn stash_push(&self) -> Result<(), GitError> {
        self.run(&["stash", "push", "-m", "mergeminer temporary stash"], false)
            .await?;
        info!("stashed local changes");
        Ok(())
    }

    /// Pop the most recent stash entry.
    pub async fn stash_pop(&self) -> Result<(), GitError> {
        self.run(&["stash", "pop"], false).await?;
        info!("popped stash");
        Ok(())
    }

    /// Check out a branch or commit.
    pub async fn checkout(&self, target: &str) -> Result<(), GitError> {
        self.run(&["checkout", target], false).await?;
        Ok(())
    }

    /// Create a branch at HEAD and check it out.
    pub async fn create_branch(&self, name: &str) -> Result<(), GitError> {
        self.run(&["checkout", "-b", name], false).await?;
        debug!(name, "created branch");
        Ok(())
    }

    /// Force-delete a branch.
    pub async fn delete_branch(&self, name: &str) -> Result<(), GitError> {
        self.run(&["branch", "-D", name], false).await?;
        debug!(name, "deleted branch");
        Ok(())
    }

    /// Hard-reset the current branch to `commit`.
    pub async fn reset_hard(&self, commit: &str) -> Result<(), GitError> {
        self.run(&["reset", "--hard", commit], false).await?;
        Ok(())
    }

    /// Attempt a non-committing merge. Conflicts exit non-zero, so the raw
    /// [`CommandOutput`] is returned for the caller to classify.
    #[instrument(skip(self), fields(repo = %self.repo_path.display(), commit))]
    pub async fn merge_no_commit(&self, commit: &str) -> Result<CommandOutput, GitError> {
        self.run_unchecked(&["merge", commit, "--no-commit", "--no-ff"], None)
            .await
    }

    /// Abort an in-progress merge. A no-op (not an error) when no merge is
    /// in progress; only a failure to run git at all is reported.
    pub async fn abort_merge(&self) -> Result<(), GitError> {
        let output = self.run_unchecked(&["merge", "--abort"], None).await?;
        if !output.success() {
            debug!("no merge in progress to abort");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Patch application
    // -----------------------------------------------------------------------

    /// Apply a mailbox patch with `git am -3`, bounded by `timeout`.
    ///
    /// Three-way mode is required: it is the only mode that leaves content
    /// conflicts as in-tree markers rather than refusing the patch outright.
    pub async fn apply_mailbox(
        &self,
        patch: &Path,
        timeout: Duration,
    ) -> Result<CommandOutput, GitError> {
        let patch_str = patch.to_string_lossy();
        self.run_unchecked(&["am", "-3", &patch_str], Some(timeout))
            .await
    }

    /// Abort an in-progress `git am` session. A no-op (not an error) when
    /// no session exists.
    pub async fn abort_mailbox(&self) -> Result<(), GitError> {
        let output = self.run_unchecked(&["am", "--abort"], None).await?;
        if !output.success() {
            debug!("no mailbox session to abort");
        }
        Ok(())
    }

    /// Apply a patch to the working tree with `git apply --3way`.
    pub async fn apply_patch(
        &self,
        patch: &Path,
        timeout: Duration,
    ) -> Result<CommandOutput, GitError> {
        let patch_str = patch.to_string_lossy();
        self.run_unchecked(&["apply", "--3way", &patch_str], Some(timeout))
            .await
    }

    // -----------------------------------------------------------------------
    // Repository setup
    // -----------------------------------------------------------------------

    /// Initialise a new repository in the runner's directory.
    pub async fn init_repo(&self) -> Result<(), GitError> {
        std::fs::create_dir_all(&self.repo_path)?;
        self.run(&["init"], false).await?;
        info!(path = %self.repo_path.display(), "initialised repository");
        Ok(())
    }

    /// Set a repository-local config value.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<(), GitError> {
        self.run(&["config", key, value], false).await?;
        Ok(())
    }

    /// Fetch from another repository (path or URL); the fetched tip is left
    /// in `FETCH_HEAD` and its objects become available locally.
    #[instrument(skip(self), fields(repo = %self.repo_path.display(), source))]
    pub async fn fetch(&self, source: &str) -> Result<(), GitError> {
        self.run(&["fetch", source], false).await?;
        info!("fetch completed");
        Ok(())
    }

    /// Generate mailbox patches for `range` into `output_dir`.
    pub async fn format_patch(
        &self,
        range: &str,
        output_dir: &Path,
        extra_args: &[String],
    ) -> Result<(), GitError> {
        std::fs::create_dir_all(output_dir)?;
        let out_str = output_dir.to_string_lossy();
        let mut args: Vec<&str> = vec!["format-patch", range, "--output-directory", &out_str];
        for arg in extra_args {
            if !arg.is_empty() {
                args.push(arg);
            }
        }
        self.run(&args, false).await?;
        info!(range, out = %out_str, "generated patches");
        Ok(())
    }
}

fn command_line(args: &[&str]) -> String {
    format!("git {}", args.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output_joins_streams() {
        let output = CommandOutput {
            exit_code: 1,
            stdout: "Auto-merging src/main.rs".into(),
            stderr: "CONFLICT (content): Merge conflict in src/main.rs".into(),
        };
        let combined = output.combined();
        assert!(combined.contains("Auto-merging"));
        assert!(combined.contains("CONFLICT (content)"));
        // stderr lands on its own line
        assert!(combined.contains("\nCONFLICT"));
    }

    #[test]
    fn test_combined_output_empty_stderr() {
        let output = CommandOutput {
            exit_code: 0,
            stdout: "ok\n".into(),
            stderr: String::new(),
        };
        assert_eq!(output.combined(), "ok\n");
        assert!(output.success());
    }

    #[test]
    fn test_open_rejects_missing_path() {
        let err = GitRunner::open("/nonexistent/mergeminer-test-path").unwrap_err();
        assert!(matches!(err, GitError::RepositoryNotFound(_)));
    }
}
