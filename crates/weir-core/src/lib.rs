//!
//! Weir Core - flow runtime for the Weir platform
//!
//! This crate implements the execution layer for suspendable,
//! checkpointed flows that coordinate multi-party ledger transactions:
//! the closed unions of actions and events, the action executor that
//! realizes state-machine side effects with strict ordering and
//! transactional boundaries, and the runtime bookkeeping around it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Application services - the action executor and runtime scaffolding
pub mod application;

/// Runtime configuration
pub mod config;

/// Domain layer - value objects, unions, and external-interface traits
pub mod domain;

/// Error types
pub mod error;

/// Metric primitives owned by the executor
pub mod metrics;

// Re-export key types
pub use application::action_executor::ActionExecutor;
pub use application::fiber::{fiber_channel, EventMailbox, FiberHandle};
pub use application::scheduler::EventScheduler;
pub use application::state_machine_manager::StateMachineManager;
pub use application::transaction_context::TransactionContext;
pub use config::FlowRuntimeConfig;
pub use domain::action::{Action, RemovalReason};
pub use domain::checkpoint::{
    Checkpoint, CheckpointSerializer, JsonCheckpointSerializer, SerializationContext,
};
pub use domain::event::{Event, OperationResult};
pub use domain::flow::{ErrorId, FlowId, FlowStateSnapshot, FlowStatus, Party, TransactionHash};
pub use domain::messaging::{
    DeduplicationId, ExistingSessionMessage, ExistingSessionMessagePayload, FlowErrorMessage,
    InitialSessionMessage, SenderDeduplicationId, SessionMessage,
};
pub use domain::repository::{
    AsyncOperation, CheckpointStorage, Clock, Database, DatabaseTransaction, DeduplicationHandler,
    FlowFiber, FlowMessaging, SoftLockRegistry, StateMachineManagerInternal, SystemClock,
    TransactionTracker,
};
pub use domain::session::{InitiatedState, SessionId, SessionState};
pub use error::{FlowError, MessagingError, StorageError};
