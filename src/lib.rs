pub mod api;
pub mod error;
pub mod job;
pub mod logging;
pub mod runner;
pub mod utils;
pub mod webhook;

use error::HookError;
use runner::ScriptRunner;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HookConfig {
    /// Shared secret used to sign webhook payloads.
    #[serde(default, alias = "Secret")]
    pub secret: String,
    /// Directory holding the hook scripts. Scripts are looked up on `$PATH` when unset.
    #[serde(default, alias = "ScriptsPath")]
    pub scripts_path: Option<PathBuf>,
    /// Hooks in declaration order; the first match wins.
    #[serde(default, rename = "hook", alias = "Hooks", alias = "hooks")]
    pub hooks: Vec<Hook>,
}

/// Binds a repository branch to the script run when it changes.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Hook {
    #[serde(alias = "Repo")]
    pub repo: String,
    #[serde(alias = "Branch")]
    pub branch: String,
    #[serde(alias = "Shell")]
    pub shell: String,
}

impl Hook {
    /// The full ref a push to this hook's branch carries, e.g. `refs/heads/main`.
    pub fn branch_ref(&self) -> String {
        format!("{}{}", webhook::BRANCH_REF_PREFIX, self.branch)
    }
}

/// Load and parse the configuration file.
///
/// Files ending in `.json` are read as JSON, anything else as TOML.
pub fn load_config(path: impl AsRef<Path>) -> Result<HookConfig, HookError> {
    let path = path.as_ref();
    let config_str = std::fs::read_to_string(path).map_err(|e| {
        HookError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config: HookConfig = if is_json {
        serde_json::from_str(&config_str).map_err(|e| {
            HookError::ConfigError(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?
    } else {
        toml::from_str(&config_str).map_err(|e| {
            HookError::ConfigError(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?
    };

    Ok(config)
}

/// Read-only state shared by every request handler.
pub struct AppState {
    pub config: HookConfig,
    pub runner: ScriptRunner,
}

impl AppState {
    pub fn new(config: HookConfig) -> Self {
        let runner = ScriptRunner::new(config.scripts_path.clone());
        Self { config, runner }
    }
}

pub type SharedState = Arc<AppState>;
