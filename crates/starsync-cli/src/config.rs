use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use starsync_coordinator::{CoordinatorConfig, ResolutionMode};

use crate::cli::Cli;

/// Store directory used when neither the config file nor `--root` names one.
pub const DEFAULT_ROOT: &str = ".starsync";

/// Settings read from the TOML config file.
///
/// ```toml
/// root = "/var/lib/starsync"
///
/// [coordinator]
/// max_resolve_retries = 20
/// resolution = "manual"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub root: Option<PathBuf>,
    pub coordinator: CoordinatorConfig,
}

impl CliConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid starsync config")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Load the file named by `--config` (if any) and apply flag overrides.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(cli);
        Ok(config)
    }

    /// Command-line flags take precedence over file settings.
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(root) = &cli.root {
            self.root = Some(root.clone());
        }
        if let Some(retries) = cli.max_retries {
            self.coordinator.max_resolve_retries = retries;
        }
        if cli.manual {
            self.coordinator.resolution = ResolutionMode::Manual;
        }
    }

    pub fn store_root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT))
    }
}
