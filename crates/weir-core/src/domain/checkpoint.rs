//! Checkpoints are durable snapshots of a suspended flow. The executor
//! never interprets the captured flow frames; it serializes the whole
//! snapshot through the configured serializer and stores the bytes.

use crate::domain::flow::FlowId;
use crate::domain::session::{SessionId, SessionState};
use crate::error::FlowError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Durable snapshot of a suspended flow's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Captured flow frames, opaque to the executor
    pub flow_state: serde_json::Value,

    /// Open sessions at the time of suspension
    pub sessions: HashMap<SessionId, SessionState>,

    /// Number of suspensions this flow has gone through
    pub suspension_count: u64,
}

impl Checkpoint {
    /// Snapshot with no sessions, as taken at a flow's first suspension
    pub fn new(flow_state: serde_json::Value) -> Self {
        Self {
            flow_state,
            sessions: HashMap::new(),
            suspension_count: 0,
        }
    }
}

/// Ambient information passed to the serializer alongside the checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializationContext {
    /// The flow being marshalled, for diagnostics
    pub flow_id: FlowId,
}

/// Marshals checkpoints to and from durable bytes.
///
/// Output must be deterministic for a given checkpoint: replayed persists
/// after a crash have to produce the same bytes so downstream
/// deduplication identifiers stay stable.
pub trait CheckpointSerializer: Send + Sync {
    /// Serialize a checkpoint to the bytes that get stored
    fn serialize_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        context: &SerializationContext,
    ) -> Result<Vec<u8>, FlowError>;

    /// Reconstruct a checkpoint from stored bytes
    fn deserialize_checkpoint(
        &self,
        bytes: &[u8],
        context: &SerializationContext,
    ) -> Result<Checkpoint, FlowError>;
}

/// Default serializer backed by `serde_json`
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCheckpointSerializer;

impl CheckpointSerializer for JsonCheckpointSerializer {
    fn serialize_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        context: &SerializationContext,
    ) -> Result<Vec<u8>, FlowError> {
        serde_json::to_vec(checkpoint).map_err(|e| {
            FlowError::Serialization(format!(
                "failed to serialize checkpoint for flow {}: {}",
                context.flow_id, e
            ))
        })
    }

    fn deserialize_checkpoint(
        &self,
        bytes: &[u8],
        context: &SerializationContext,
    ) -> Result<Checkpoint, FlowError> {
        serde_json::from_slice(bytes).map_err(|e| {
            FlowError::Serialization(format!(
                "failed to deserialize checkpoint for flow {}: {}",
                context.flow_id, e
            ))
        })
    }
}
