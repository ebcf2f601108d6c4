//! Framework configuration, read from a TOML file.
//!
//! ```toml
//! log_filter = "debug"
//! rethrow_errors = true
//! num_threads = 4
//! record_child_history_in_workspace = false
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "RUSTY_REDUCE_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameworkConfig {
    /// Default `env_logger` filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Top-level algorithms return failures as errors instead of `Ok(false)`.
    pub rethrow_errors: bool,
    /// Worker threads for spectrum-parallel loops; `None` uses rayon's default.
    pub num_threads: Option<usize>,
    /// Also append child-algorithm entries to the workspaces they touch.
    pub record_child_history_in_workspace: bool,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        FrameworkConfig {
            log_filter: "info".to_string(),
            rethrow_errors: false,
            num_threads: None,
            record_child_history_in_workspace: false,
        }
    }
}

impl FrameworkConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config = toml::from_str(text).context("parsing framework configuration")?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    /// Load the file named by `RUSTY_REDUCE_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }
}
