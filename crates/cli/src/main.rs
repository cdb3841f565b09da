//! MergeMiner command-line tool.
//!
//! Provides subcommands for the two mining modes (merge replay and patch
//! sequencing), the combined two-repository replay flow, patch generation,
//! an in-place conflict-section dump, and configuration file management.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mergeminer_core::config::MinerConfig;
use mergeminer_core::extract;
use mergeminer_core::miner::{MiningEngine, MiningStats};
use mergeminer_core::patch;
use mergeminer_core::GitRunner;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// MergeMiner command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "mergeminer",
    version,
    about = "Mine historical merge conflicts and their human resolutions"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay every merge commit in a repository and mine reproduced conflicts.
    Merges {
        /// Path to the git repository.
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,

        /// Output directory for .conflict dataset files.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Context lines captured around each conflict body.
        #[arg(short, long)]
        margin: Option<usize>,
    },

    /// Apply prepared patch directories chronologically and mine conflicts.
    Patches {
        /// Path to the target git repository.
        #[arg(short = 't', long, default_value = ".")]
        repo: PathBuf,

        /// Directory of .patch files (repeatable).
        #[arg(short, long = "patch-dir", required = true)]
        patch_dir: Vec<PathBuf>,

        /// Git ref in the target repository holding the resolved history.
        #[arg(short = 'r', long)]
        resolved_ref: String,

        /// Output directory for .conflict dataset files.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Context lines captured around each conflict body.
        #[arg(short, long)]
        margin: Option<usize>,

        /// Per-patch application time budget in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Generate patches for two diverging repositories and mine the
    /// interleaved stream against a fresh target workspace.
    Replay {
        /// Path to the upstream git repository.
        #[arg(short, long)]
        upstream: PathBuf,

        /// Path to the downstream (resolved) git repository.
        #[arg(short, long)]
        downstream: PathBuf,

        /// Extra git format-patch options for the downstream repository.
        #[arg(long, default_value = "")]
        downstream_gitopts: String,

        /// Working directory for generated patches and the target workspace.
        #[arg(short, long)]
        temp: PathBuf,

        /// Output directory for .conflict dataset files.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Context lines captured around each conflict body.
        #[arg(short, long)]
        margin: Option<usize>,

        /// Per-patch application time budget in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Generate mailbox patches for a repository's history.
    GenPatches {
        /// Path to the git repository.
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,

        /// Output directory for .patch files.
        #[arg(short, long)]
        output: PathBuf,

        /// Extra git format-patch options.
        #[arg(short, long, default_value = "--no-merges")]
        gitopt: String,
    },

    /// Print conflict sections of currently conflicted files.
    Extract {
        /// Path to the git repository.
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,

        /// Context lines captured around each conflict body.
        #[arg(short, long)]
        margin: Option<usize>,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./mergeminer.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_target(false)
        .without_time()
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Config management commands must not require a loadable config.
    match &cli.command {
        Commands::Init { output } => return cmd_init(output),
        Commands::Validate => return cmd_validate(cli.config.as_deref()),
        _ => {}
    }

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Merges {
            repo,
            output,
            margin,
        } => {
            apply_overrides(&mut config, margin, output, None);
            let engine = MiningEngine::new(&config);
            let stats = engine.mine_merges(&repo).await?;
            print_stats(&stats)
        }

        Commands::Patches {
            repo,
            patch_dir,
            resolved_ref,
            output,
            margin,
            timeout_secs,
        } => {
            apply_overrides(&mut config, margin, output, timeout_secs);
            let engine = MiningEngine::new(&config);
            let stats = engine.mine_patches(&repo, &patch_dir, &resolved_ref).await?;
            print_stats(&stats)
        }

        Commands::Replay {
            upstream,
            downstream,
            downstream_gitopts,
            temp,
            output,
            margin,
            timeout_secs,
        } => {
            apply_overrides(&mut config, margin, output, timeout_secs);
            let engine = MiningEngine::new(&config);
            let gitopts = split_gitopts(&downstream_gitopts);
            let stats = engine
                .replay_streams(&upstream, &downstream, &gitopts, &temp)
                .await?;
            print_stats(&stats)
        }

        Commands::GenPatches {
            repo,
            output,
            gitopt,
        } => cmd_gen_patches(&repo, &output, &gitopt).await,

        Commands::Extract { repo, margin } => {
            cmd_extract(&repo, margin.unwrap_or(config.mining.margin)).await
        }

        Commands::Init { .. } | Commands::Validate => unreachable!(),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<MinerConfig> {
    match path {
        Some(p) => MinerConfig::load_from_file(p).context("failed to load configuration file"),
        None => Ok(MinerConfig::default()),
    }
}

fn apply_overrides(
    config: &mut MinerConfig,
    margin: Option<usize>,
    output: Option<PathBuf>,
    timeout_secs: Option<u64>,
) {
    if let Some(m) = margin {
        config.mining.margin = m;
    }
    if let Some(o) = output {
        config.mining.output_dir = o;
    }
    if let Some(t) = timeout_secs {
        config.mining.apply_timeout_secs = t;
    }
}

fn split_gitopts(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn print_stats(stats: &MiningStats) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(stats).context("failed to render stats")?
    );
    Ok(())
}

async fn cmd_gen_patches(repo: &Path, output: &Path, gitopt: &str) -> Result<()> {
    let git = GitRunner::open(repo).context("failed to open repository")?;
    let opts = split_gitopts(gitopt);
    patch::generate_patches(&git, output, &opts)
        .await
        .context("failed to generate patches")?;
    println!("Patches written to {}", output.display());
    Ok(())
}

async fn cmd_extract(repo: &Path, margin: usize) -> Result<()> {
    let git = GitRunner::open(repo).context("failed to open repository")?;
    let conflict_files = git
        .conflict_paths()
        .await
        .context("failed to read repository status")?;

    for file in conflict_files {
        println!("Conflicted file: {}", file);
        let full_path = git.repo_path().join(&file);
        let content = std::fs::read_to_string(&full_path)
            .with_context(|| format!("failed to read '{}'", file))?;
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        for section in extract::extract(&lines, margin) {
            for line in &section.lines {
                println!("{}", line.trim_end());
            }
        }
        println!("---");
    }
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        bail!("refusing to overwrite existing file: {}", output.display());
    }
    std::fs::write(output, MinerConfig::default_toml())
        .with_context(|| format!("failed to write '{}'", output.display()))?;
    println!("Wrote default configuration to {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: Option<&Path>) -> Result<()> {
    let path = config_path.ok_or_else(|| anyhow::anyhow!("--config is required for validate"))?;
    MinerConfig::load_from_file(path).context("configuration is invalid")?;
    println!("Configuration OK: {}", path.display());
    Ok(())
}
