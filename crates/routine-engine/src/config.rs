//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_tick_seconds() -> u64 {
    10
}

fn default_channel_capacity() -> usize {
    1024
}

/// Tunable parameters for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Period of the clock tick that re-checks schedule boundaries
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,

    /// Capacity of the fact-change broadcast channels
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_tick_seconds(),
            channel_capacity: default_channel_capacity(),
        }
    }
}
