use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Value object: globally unique identifier for a flow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowId(pub Uuid);

impl FlowId {
    /// Create a fresh flow identifier
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value object: identity of a peer node participating in a flow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Party(pub String);

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value object: hash identifying a ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub String);

impl fmt::Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value object: identifier attached to a flow error so that propagated
/// copies of the same error are deduplicated by the receiving broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorId(pub Uuid);

impl ErrorId {
    /// Create a fresh error identifier
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ErrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse status of a flow, as seen by the state machine manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowStatus {
    /// Flow is executing or suspended on I/O
    Running,
    /// Flow is suspended waiting for a wakeup
    Sleeping,
    /// Flow has finished successfully
    Completed,
    /// Flow has finished with an error
    Failed,
}

/// Snapshot of a flow's externally visible state, handed to the state
/// machine manager on removal and safe-point retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStateSnapshot {
    /// The flow this snapshot describes
    pub flow_id: FlowId,

    /// Status at the time the snapshot was taken
    pub status: FlowStatus,

    /// Number of times the flow has suspended so far
    pub suspension_count: u64,
}

impl FlowStateSnapshot {
    /// Snapshot for a flow that is still making progress
    pub fn running(flow_id: FlowId) -> Self {
        Self {
            flow_id,
            status: FlowStatus::Running,
            suspension_count: 0,
        }
    }
}
