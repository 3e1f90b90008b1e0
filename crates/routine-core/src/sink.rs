//! Command sink: the outbound interface to physical devices
//!
//! The sink is fire-and-forget from the sequencer's perspective. A failed
//! dispatch is reported back for logging but never blocks or cancels the
//! executing program; retry policy belongs to the sink implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::facts::Parameter;

/// A command to dispatch to a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandCall {
    /// Target device
    pub device: String,

    /// Command id
    pub command: String,

    /// Command parameters, in order
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

/// Failure reported by the command sink
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("device rejected command: {0}")]
    Rejected(String),

    #[error("device unreachable: {0}")]
    Unreachable(String),
}

/// Accepts device commands and reports success or failure asynchronously
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Dispatch one command
    async fn dispatch(&self, call: CommandCall) -> Result<(), SinkError>;
}
