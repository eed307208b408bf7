//! External-interface traits for the flow runtime.
//!
//! This module defines the seams between the action executor and its
//! collaborators. External crates implement these traits to provide real
//! persistence, messaging, and ledger integration; the in-memory state
//! store crate provides implementations for development and testing.

use crate::domain::event::{Event, OperationResult};
use crate::domain::flow::{FlowId, FlowStateSnapshot, Party, TransactionHash};
use crate::domain::messaging::{DeduplicationId, SenderDeduplicationId, SessionMessage};
use crate::domain::session::SessionId;
use crate::error::{FlowError, MessagingError, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::HashSet;
use uuid::Uuid;

/// Checkpoint write surface.
///
/// Implemented by [`DatabaseTransaction`], so every write structurally
/// participates in the ambient database transaction. The storage layer
/// enforces that a checkpoint is added exactly once per flow and only
/// updated thereafter.
#[async_trait]
pub trait CheckpointStorage: Send {
    /// Store the first checkpoint for a flow
    async fn add_checkpoint(&mut self, id: &FlowId, checkpoint: Vec<u8>)
        -> Result<(), StorageError>;

    /// Replace the existing checkpoint for a flow
    async fn update_checkpoint(
        &mut self,
        id: &FlowId,
        checkpoint: Vec<u8>,
    ) -> Result<(), StorageError>;

    /// Delete a flow's checkpoint; returns whether one existed
    async fn remove_checkpoint(&mut self, id: &FlowId) -> Result<bool, StorageError>;
}

/// An open database transaction, bound to at most one fiber at a time.
///
/// `commit` and `rollback` consume the transaction, so it cannot remain
/// bound afterwards regardless of outcome. `commit` performs any close
/// internally; a close failure cannot mask the commit error.
#[async_trait]
pub trait DatabaseTransaction: CheckpointStorage + Send {
    /// Idempotently record that a message was processed, atomically with
    /// the rest of the transaction
    async fn record_deduplication_fact(
        &mut self,
        key: &DeduplicationId,
    ) -> Result<(), StorageError>;

    /// Make all buffered writes durable
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Discard all buffered writes
    async fn rollback(self: Box<Self>);
}

/// The node database the flow runtime persists into
#[async_trait]
pub trait Database: Send + Sync {
    /// Open a new transaction
    async fn begin_transaction(&self) -> Result<Box<dyn DatabaseTransaction>, StorageError>;

    /// Read a flow's committed checkpoint outside any transaction; used
    /// for safe-point retry
    async fn load_checkpoint(&self, id: &FlowId) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Per-inbound-message deduplication lifecycle.
///
/// `inside_database_transaction` records the receipt fact atomically with
/// the transition's business effects; `after_database_transaction`
/// acknowledges the message to the broker once the commit has succeeded.
#[async_trait]
pub trait DeduplicationHandler: Send + Sync {
    /// Record the receipt fact inside the active transaction
    async fn inside_database_transaction(
        &self,
        transaction: &mut dyn DatabaseTransaction,
    ) -> Result<(), StorageError>;

    /// Acknowledge the message to the broker after the commit
    async fn after_database_transaction(&self) -> Result<(), MessagingError>;
}

/// Reliable, at-least-once peer message transport
#[async_trait]
pub trait FlowMessaging: Send + Sync {
    /// Hand a session message to the substrate. Delivery, durability, and
    /// retry are the substrate's concern; the executor only guarantees a
    /// stable deduplication identifier.
    async fn send_session_message(
        &self,
        peer: &Party,
        message: SessionMessage,
        deduplication_id: SenderDeduplicationId,
    ) -> Result<(), MessagingError>;
}

/// Internal interface of the state machine manager, the layer that tracks
/// live fibers, session bindings, and flow timeouts
#[async_trait]
pub trait StateMachineManagerInternal: Send + Sync {
    /// Route future messages for `session_id` to `flow_id`
    async fn add_session_binding(
        &self,
        flow_id: FlowId,
        session_id: SessionId,
    ) -> Result<(), FlowError>;

    /// Drop a set of session bindings atomically
    async fn remove_session_bindings(
        &self,
        session_ids: &HashSet<SessionId>,
    ) -> Result<(), FlowError>;

    /// Mark a flow as having started successfully
    async fn signal_flow_has_started(&self, flow_id: FlowId) -> Result<(), FlowError>;

    /// Remove a finished flow and everything attached to it
    async fn remove_flow(
        &self,
        flow_id: FlowId,
        removal_reason: crate::domain::action::RemovalReason,
        last_state: FlowStateSnapshot,
    ) -> Result<(), FlowError>;

    /// Restart a flow from its last durable checkpoint. The manager
    /// re-reads durable state; no checkpoint mutation happens here.
    async fn retry_flow_from_safe_point(
        &self,
        current_state: FlowStateSnapshot,
    ) -> Result<(), FlowError>;

    /// Arm the per-flow timeout
    async fn schedule_flow_timeout(&self, flow_id: FlowId) -> Result<(), FlowError>;

    /// Disarm the per-flow timeout
    async fn cancel_flow_timeout(&self, flow_id: FlowId) -> Result<(), FlowError>;
}

/// The suspendable execution unit hosting one flow
pub trait FlowFiber: Send + Sync {
    /// The flow this fiber is executing
    fn id(&self) -> FlowId;

    /// Enqueue an asynchronous result for the flow's state machine.
    /// Delivery is FIFO relative to scheduling order.
    fn schedule_event(&self, event: Event);
}

/// Source of wall-clock time, injectable so tests can control it
pub trait Clock: Send + Sync {
    /// The current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock reading the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Subscription interface for ledger transaction commits
pub trait TransactionTracker: Send + Sync {
    /// Resolve once the transaction identified by `hash` has committed.
    /// The returned future is awaited off the fiber's carrier thread.
    fn track(&self, hash: TransactionHash) -> BoxFuture<'static, Result<TransactionHash, FlowError>>;
}

/// A long-running operation started by the state machine and completed by
/// the executor injecting an event
pub trait AsyncOperation: Send + Sync {
    /// Start the operation. A synchronous `Err` means the operation could
    /// not even be started and is surfaced to the state machine wrapped
    /// in [`FlowError::AsyncOperationTransition`]; the returned future's
    /// outcome is delivered as an event instead.
    fn execute(
        &self,
        deduplication_id: DeduplicationId,
    ) -> Result<BoxFuture<'static, Result<OperationResult, FlowError>>, FlowError>;
}

/// Vault soft-lock bookkeeping
#[async_trait]
pub trait SoftLockRegistry: Send + Sync {
    /// Release all soft locks held under `lock_id`
    async fn release_soft_locks(&self, lock_id: Uuid) -> Result<(), StorageError>;
}
