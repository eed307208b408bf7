use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

fn default_flow_timeout_secs() -> u64 {
    30
}

/// Runtime configuration for the flow subsystem.
///
/// All fields have defaults so an empty configuration section is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRuntimeConfig {
    /// How long a flow may stay in-flight after its timeout is armed
    /// before `FlowTimedOut` is delivered
    #[serde(default = "default_flow_timeout_secs")]
    pub flow_timeout_secs: u64,

    /// This node instance's identity, attached to outbound deduplication
    /// identifiers so receivers can tell replays from post-restart sends
    #[serde(default)]
    pub sender_uuid: Option<Uuid>,
}

impl Default for FlowRuntimeConfig {
    fn default() -> Self {
        Self {
            flow_timeout_secs: default_flow_timeout_secs(),
            sender_uuid: None,
        }
    }
}

impl FlowRuntimeConfig {
    /// The flow timeout as a [`Duration`]
    pub fn flow_timeout(&self) -> Duration {
        Duration::from_secs(self.flow_timeout_secs)
    }
}
