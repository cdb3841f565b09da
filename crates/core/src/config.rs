//! TOML-based configuration for MergeMiner.
//!
//! Every field has a default, so a missing config file is never required:
//! the CLI loads the file when present and lets flags override individual
//! values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Mining behaviour settings.
    #[serde(default)]
    pub mining: MiningConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// Mining behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Context lines captured on each side of a conflict body.
    #[serde(default = "default_margin")]
    pub margin: usize,

    /// Time budget in seconds for a single patch application.
    #[serde(default = "default_apply_timeout")]
    pub apply_timeout_secs: u64,

    /// Directory receiving `.conflict` dataset files.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_margin() -> usize {
    3
}
fn default_apply_timeout() -> u64 {
    10
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./conflicts")
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            margin: default_margin(),
            apply_timeout_secs: default_apply_timeout(),
            output_dir: default_output_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl MinerConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Check value-level constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mining.apply_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "mining.apply_timeout_secs".into(),
                detail: "must be at least 1".into(),
            });
        }
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "log.level".into(),
                detail: format!("unknown level '{}'", self.log.level),
            });
        }
        debug!("configuration validated");
        Ok(())
    }

    /// Default configuration rendered as TOML, for `mergeminer init`.
    pub fn default_toml() -> String {
        r#"# MergeMiner configuration

[mining]
# Context lines captured on each side of a conflict body.
margin = 3
# Time budget in seconds for a single patch application.
apply_timeout_secs = 10
# Directory receiving .conflict dataset files.
output_dir = "./conflicts"

[log]
# Minimum log level: trace, debug, info, warn, error.
level = "warn"
"#
        .to_string()
    }
}
