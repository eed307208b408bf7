//! Wire-facing value objects for the flow messaging substrate.
//!
//! The substrate delivers at-least-once; receivers deduplicate on the
//! sender-supplied deduplication identifier. Anything the executor sends
//! must therefore carry an identifier that is derivable from durable flow
//! state, so a replay after a crash produces a bit-identical send.

use crate::domain::flow::ErrorId;
use crate::domain::session::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Value uniquely identifying one send attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeduplicationId(pub String);

impl DeduplicationId {
    /// Wrap a caller-supplied identifier
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Deterministic identifier for propagating `error_id` to the peer
    /// sink session. The same pair always yields the same identifier, so
    /// the peer's broker can discard replayed copies.
    pub fn for_error(error_id: &ErrorId, sink_session_id: &SessionId) -> Self {
        Self(format!("error-{}-{}", error_id, sink_session_id))
    }
}

impl fmt::Display for DeduplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A deduplication identifier qualified by the sending node's instance
/// UUID. The instance UUID changes across node restarts, which lets the
/// receiver distinguish a replay of an old send from a genuinely new send
/// that happens to reuse an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderDeduplicationId {
    /// The per-send identifier
    pub deduplication_id: DeduplicationId,

    /// The sending node instance, if known
    pub sender_uuid: Option<Uuid>,
}

/// An error raised inside a flow, in the form peers see it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowErrorMessage {
    /// Identifier used to derive the deduplication id of each propagation
    pub error_id: ErrorId,

    /// Human-readable description of the failure
    pub message: String,
}

/// The first message of a session, asking the peer to start its side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialSessionMessage {
    /// The initiator's session id; the peer addresses replies to it
    pub initiator_session_id: SessionId,

    /// Name of the flow the peer should run to service the session
    pub initiator_flow_name: String,

    /// Optional payload piggybacked on session initiation
    pub first_payload: Option<serde_json::Value>,
}

/// Payload of a message on an already established session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExistingSessionMessagePayload {
    /// Application data
    Data(serde_json::Value),
    /// An error propagated from the sending flow
    Error(FlowErrorMessage),
    /// Orderly close of the session
    End,
}

/// A message on an already established session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingSessionMessage {
    /// The peer's sink session id this message addresses
    pub recipient_session_id: SessionId,

    /// What is being sent
    pub payload: ExistingSessionMessagePayload,
}

/// Union of everything the executor hands to the messaging substrate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionMessage {
    /// Session initiation
    Initial(InitialSessionMessage),
    /// Traffic on an established session
    Existing(ExistingSessionMessage),
}
