//! The closed union of side effects a flow state machine may request.
//!
//! Every transition of the state machine emits a sequence of actions; the
//! action executor realizes them in order. The union is deliberately
//! closed: adding a variant must break every dispatch site at compile
//! time.

use crate::domain::checkpoint::Checkpoint;
use crate::domain::event::Event;
use crate::domain::flow::{FlowId, FlowStateSnapshot, Party, TransactionHash};
use crate::domain::messaging::{
    DeduplicationId, ExistingSessionMessage, FlowErrorMessage, InitialSessionMessage,
    SenderDeduplicationId,
};
use crate::domain::repository::{AsyncOperation, DeduplicationHandler};
use crate::domain::session::{SessionId, SessionState};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Why a flow is being removed from the state machine manager
#[derive(Debug, Clone, PartialEq)]
pub enum RemovalReason {
    /// The flow finished its business logic
    Completed,
    /// The flow failed; the errors have been (or are being) propagated
    Errored(Vec<FlowErrorMessage>),
}

/// A side effect requested by the flow state machine
pub enum Action {
    /// Subscribe to the ledger commit of `hash`
    TrackTransaction {
        /// Transaction to watch
        hash: TransactionHash,
    },

    /// Serialize and store a flow's checkpoint
    PersistCheckpoint {
        /// The flow being checkpointed
        id: FlowId,
        /// The snapshot to marshal
        checkpoint: Checkpoint,
        /// Whether a checkpoint already exists for this flow; the caller
        /// asserts add vs update and the storage layer enforces it
        is_update: bool,
    },

    /// Run each handler's pre-commit hook inside the active transaction
    PersistDeduplicationFacts {
        /// Handlers for the messages consumed by this transition
        handlers: Vec<Arc<dyn DeduplicationHandler>>,
    },

    /// Run each handler's post-commit hook; failures are swallowed
    AcknowledgeMessages {
        /// Handlers for the messages consumed by this transition
        handlers: Vec<Arc<dyn DeduplicationHandler>>,
    },

    /// Send error messages to every live session's peer
    PropagateErrors {
        /// The errors to propagate
        error_messages: Vec<FlowErrorMessage>,
        /// The flow's sessions; only live ones are sent anything
        sessions: Vec<SessionState>,
        /// The sending node instance, if known
        sender_uuid: Option<Uuid>,
    },

    /// Feed an event straight back into the fiber
    ScheduleEvent {
        /// The event to deliver
        event: Event,
    },

    /// Suspend the flow until the given instant
    SleepUntil {
        /// Wakeup deadline; a past instant wakes immediately
        time: DateTime<Utc>,
    },

    /// Delete a flow's checkpoint inside the active transaction
    RemoveCheckpoint {
        /// The flow whose checkpoint goes away
        id: FlowId,
    },

    /// Send the first message of a new session
    SendInitial {
        /// Peer that should start its side of the session
        destination: Party,
        /// The initiation message
        initialise: InitialSessionMessage,
        /// Identifier the receiver deduplicates on
        deduplication_id: SenderDeduplicationId,
    },

    /// Send a message on an established session
    SendExisting {
        /// The session's counterparty
        peer: Party,
        /// The message to deliver
        message: ExistingSessionMessage,
        /// Identifier the receiver deduplicates on
        deduplication_id: SenderDeduplicationId,
    },

    /// Route future messages for a session to a flow
    AddSessionBinding {
        /// Target flow
        flow_id: FlowId,
        /// Session to bind
        session_id: SessionId,
    },

    /// Drop a set of session bindings atomically
    RemoveSessionBindings {
        /// Sessions to unbind
        session_ids: HashSet<SessionId>,
    },

    /// Tell the manager the flow got through its unstarted phase
    SignalFlowHasStarted {
        /// The flow that started
        flow_id: FlowId,
    },

    /// Remove a finished flow from the manager
    RemoveFlow {
        /// The flow to remove
        flow_id: FlowId,
        /// Why it is going away
        removal_reason: RemovalReason,
        /// Its externally visible state at removal
        last_state: FlowStateSnapshot,
    },

    /// Open a database transaction and bind it to the fiber
    CreateTransaction,

    /// Roll back the bound transaction, if any
    RollbackTransaction,

    /// Commit the bound transaction and unbind it on every path
    CommitTransaction,

    /// Start a deferred operation; its outcome comes back as an event
    ExecuteAsyncOperation {
        /// The operation to start
        operation: Arc<dyn AsyncOperation>,
        /// Identifier making a replayed attempt idempotent
        deduplication_id: DeduplicationId,
    },

    /// Release vault soft locks held under a lock id; no-op on `None`
    ReleaseSoftLocks {
        /// The lock set to release
        lock_id: Option<Uuid>,
    },

    /// Restart the flow from its last durable checkpoint
    RetryFlowFromSafePoint {
        /// The flow's externally visible state at the point of retry
        current_state: FlowStateSnapshot,
    },

    /// Arm the per-flow timeout in the manager
    ScheduleFlowTimeout {
        /// The flow to watch
        flow_id: FlowId,
    },

    /// Disarm the per-flow timeout in the manager
    CancelFlowTimeout {
        /// The flow to stop watching
        flow_id: FlowId,
    },
}

impl Action {
    /// Stable name of the action variant, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Action::TrackTransaction { .. } => "TrackTransaction",
            Action::PersistCheckpoint { .. } => "PersistCheckpoint",
            Action::PersistDeduplicationFacts { .. } => "PersistDeduplicationFacts",
            Action::AcknowledgeMessages { .. } => "AcknowledgeMessages",
            Action::PropagateErrors { .. } => "PropagateErrors",
            Action::ScheduleEvent { .. } => "ScheduleEvent",
            Action::SleepUntil { .. } => "SleepUntil",
            Action::RemoveCheckpoint { .. } => "RemoveCheckpoint",
            Action::SendInitial { .. } => "SendInitial",
            Action::SendExisting { .. } => "SendExisting",
            Action::AddSessionBinding { .. } => "AddSessionBinding",
            Action::RemoveSessionBindings { .. } => "RemoveSessionBindings",
            Action::SignalFlowHasStarted { .. } => "SignalFlowHasStarted",
            Action::RemoveFlow { .. } => "RemoveFlow",
            Action::CreateTransaction => "CreateTransaction",
            Action::RollbackTransaction => "RollbackTransaction",
            Action::CommitTransaction => "CommitTransaction",
            Action::ExecuteAsyncOperation { .. } => "ExecuteAsyncOperation",
            Action::ReleaseSoftLocks { .. } => "ReleaseSoftLocks",
            Action::RetryFlowFromSafePoint { .. } => "RetryFlowFromSafePoint",
            Action::ScheduleFlowTimeout { .. } => "ScheduleFlowTimeout",
            Action::CancelFlowTimeout { .. } => "CancelFlowTimeout",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_variants() {
        assert_eq!(Action::CreateTransaction.name(), "CreateTransaction");
        assert_eq!(
            Action::SleepUntil { time: Utc::now() }.to_string(),
            "SleepUntil"
        );
    }
}
