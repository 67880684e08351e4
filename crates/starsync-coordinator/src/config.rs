use serde::{Deserialize, Serialize};

/// How the coordinator resolves conflicts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// Max-merge both candidates and resubmit.
    #[default]
    Auto,
    /// Ask a human through the conflict prompt channel.
    Manual,
}

/// Configuration for the [`SnapshotCoordinator`](crate::SnapshotCoordinator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Maximum number of resolve round trips per request before giving up.
    pub max_resolve_retries: u32,
    pub resolution: ResolutionMode,
    /// Capacity of the conflict prompt channel in manual mode.
    pub prompt_capacity: usize,
    /// Capacity of the state event broadcast channel.
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_resolve_retries: 50,
            resolution: ResolutionMode::Auto,
            prompt_capacity: 16,
            event_capacity: 256,
        }
    }
}

impl CoordinatorConfig {
    /// Default configuration with human-in-the-loop resolution.
    pub fn manual() -> Self {
        Self {
            resolution: ResolutionMode::Manual,
            ..Default::default()
        }
    }

    pub fn with_max_resolve_retries(mut self, retries: u32) -> Self {
        self.max_resolve_retries = retries;
        self
    }
}
