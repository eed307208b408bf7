//! Mock and recording implementations of the weir-core interfaces.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use weir_core::domain::action::RemovalReason;
use weir_core::domain::event::{Event, OperationResult};
use weir_core::domain::flow::{FlowId, FlowStateSnapshot, Party, TransactionHash};
use weir_core::domain::messaging::{DeduplicationId, SenderDeduplicationId, SessionMessage};
use weir_core::domain::repository::{
    AsyncOperation, Clock, DatabaseTransaction, DeduplicationHandler, FlowFiber, FlowMessaging,
    SoftLockRegistry, StateMachineManagerInternal, TransactionTracker,
};
use weir_core::domain::session::SessionId;
use weir_core::error::{FlowError, MessagingError, StorageError};

/// A clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// A clock pinned to a fixed, arbitrary start instant
    pub fn new() -> Self {
        // 2020-01-01T00:00:00Z
        Self::starting_at(Utc.timestamp_opt(1_577_836_800, 0).single().unwrap_or_else(Utc::now))
    }

    /// A clock pinned to `start`
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock();
        *now += duration;
    }

    /// Move the clock forward by whole seconds
    pub fn advance_secs(&self, seconds: i64) {
        self.advance(chrono::Duration::seconds(seconds));
    }

    /// Move the clock forward by milliseconds
    pub fn advance_millis(&self, millis: i64) {
        self.advance(chrono::Duration::milliseconds(millis));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// A fiber that collects every event scheduled on it
pub struct CollectingFiber {
    id: FlowId,
    events: Mutex<Vec<Event>>,
}

impl CollectingFiber {
    /// A fiber for a fresh flow id
    pub fn new() -> Self {
        Self::for_flow(FlowId::random())
    }

    /// A fiber for a specific flow id
    pub fn for_flow(id: FlowId) -> Self {
        Self {
            id,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Everything scheduled so far, in order
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl Default for CollectingFiber {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowFiber for CollectingFiber {
    fn id(&self) -> FlowId {
        self.id
    }

    fn schedule_event(&self, event: Event) {
        self.events.lock().push(event);
    }
}

/// A message handed to the messaging substrate
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    /// The recipient
    pub peer: Party,
    /// The message
    pub message: SessionMessage,
    /// The identifier the receiver deduplicates on
    pub deduplication_id: SenderDeduplicationId,
}

/// Messaging substrate that records sends instead of delivering them
#[derive(Default)]
pub struct RecordingFlowMessaging {
    sent: Mutex<Vec<SentMessage>>,
    fail_sends: AtomicBool,
}

impl RecordingFlowMessaging {
    /// A substrate that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in order
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Make every subsequent send fail
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl FlowMessaging for RecordingFlowMessaging {
    async fn send_session_message(
        &self,
        peer: &Party,
        message: SessionMessage,
        deduplication_id: SenderDeduplicationId,
    ) -> Result<(), MessagingError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(MessagingError::SendFailed {
                peer: peer.to_string(),
                reason: "injected send failure".to_string(),
            });
        }
        self.sent.lock().push(SentMessage {
            peer: peer.clone(),
            message,
            deduplication_id,
        });
        Ok(())
    }
}

/// A delegation observed by [`RecordingManager`]
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerCall {
    /// `add_session_binding`
    AddSessionBinding(FlowId, SessionId),
    /// `remove_session_bindings`
    RemoveSessionBindings(HashSet<SessionId>),
    /// `signal_flow_has_started`
    SignalFlowHasStarted(FlowId),
    /// `remove_flow`
    RemoveFlow(FlowId, RemovalReason, FlowStateSnapshot),
    /// `retry_flow_from_safe_point`
    RetryFlowFromSafePoint(FlowStateSnapshot),
    /// `schedule_flow_timeout`
    ScheduleFlowTimeout(FlowId),
    /// `cancel_flow_timeout`
    CancelFlowTimeout(FlowId),
}

/// State machine manager that records every delegation
#[derive(Default)]
pub struct RecordingManager {
    calls: Mutex<Vec<ManagerCall>>,
}

impl RecordingManager {
    /// A manager that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delegation so far, in order
    pub fn calls(&self) -> Vec<ManagerCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl StateMachineManagerInternal for RecordingManager {
    async fn add_session_binding(
        &self,
        flow_id: FlowId,
        session_id: SessionId,
    ) -> Result<(), FlowError> {
        self.calls
            .lock()
            .push(ManagerCall::AddSessionBinding(flow_id, session_id));
        Ok(())
    }

    async fn remove_session_bindings(
        &self,
        session_ids: &HashSet<SessionId>,
    ) -> Result<(), FlowError> {
        self.calls
            .lock()
            .push(ManagerCall::RemoveSessionBindings(session_ids.clone()));
        Ok(())
    }

    async fn signal_flow_has_started(&self, flow_id: FlowId) -> Result<(), FlowError> {
        self.calls
            .lock()
            .push(ManagerCall::SignalFlowHasStarted(flow_id));
        Ok(())
    }

    async fn remove_flow(
        &self,
        flow_id: FlowId,
        removal_reason: RemovalReason,
        last_state: FlowStateSnapshot,
    ) -> Result<(), FlowError> {
        self.calls
            .lock()
            .push(ManagerCall::RemoveFlow(flow_id, removal_reason, last_state));
        Ok(())
    }

    async fn retry_flow_from_safe_point(
        &self,
        current_state: FlowStateSnapshot,
    ) -> Result<(), FlowError> {
        self.calls
            .lock()
            .push(ManagerCall::RetryFlowFromSafePoint(current_state));
        Ok(())
    }

    async fn schedule_flow_timeout(&self, flow_id: FlowId) -> Result<(), FlowError> {
        self.calls
            .lock()
            .push(ManagerCall::ScheduleFlowTimeout(flow_id));
        Ok(())
    }

    async fn cancel_flow_timeout(&self, flow_id: FlowId) -> Result<(), FlowError> {
        self.calls
            .lock()
            .push(ManagerCall::CancelFlowTimeout(flow_id));
        Ok(())
    }
}

/// Transaction tracker whose subscriptions resolve immediately
#[derive(Default)]
pub struct StubTransactionTracker {
    failure: Mutex<Option<FlowError>>,
    tracked: Mutex<Vec<TransactionHash>>,
}

impl StubTransactionTracker {
    /// A tracker that confirms every subscription
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent subscription resolve with `error`
    pub fn fail_with(&self, error: FlowError) {
        *self.failure.lock() = Some(error);
    }

    /// Hashes subscribed to so far
    pub fn tracked(&self) -> Vec<TransactionHash> {
        self.tracked.lock().clone()
    }
}

impl TransactionTracker for StubTransactionTracker {
    fn track(
        &self,
        hash: TransactionHash,
    ) -> BoxFuture<'static, Result<TransactionHash, FlowError>> {
        self.tracked.lock().push(hash.clone());
        let failure = self.failure.lock().clone();
        Box::pin(async move {
            match failure {
                Some(error) => Err(error),
                None => Ok(hash),
            }
        })
    }
}

/// How a [`StubAsyncOperation`] behaves when started
#[derive(Debug, Clone)]
pub enum AsyncOperationBehaviour {
    /// The returned future resolves with this result
    Complete(OperationResult),
    /// The returned future resolves with this failure
    Fail(FlowError),
    /// `execute` itself fails; the operation never starts
    RefuseToStart(FlowError),
}

/// Async operation with scripted behaviour
pub struct StubAsyncOperation {
    behaviour: AsyncOperationBehaviour,
    received: Mutex<Vec<DeduplicationId>>,
}

impl StubAsyncOperation {
    /// An operation with the given scripted behaviour
    pub fn new(behaviour: AsyncOperationBehaviour) -> Self {
        Self {
            behaviour,
            received: Mutex::new(Vec::new()),
        }
    }

    /// Deduplication ids passed to `execute` so far
    pub fn received_deduplication_ids(&self) -> Vec<DeduplicationId> {
        self.received.lock().clone()
    }
}

impl AsyncOperation for StubAsyncOperation {
    fn execute(
        &self,
        deduplication_id: DeduplicationId,
    ) -> Result<BoxFuture<'static, Result<OperationResult, FlowError>>, FlowError> {
        self.received.lock().push(deduplication_id);
        match self.behaviour.clone() {
            AsyncOperationBehaviour::Complete(result) => Ok(Box::pin(async move { Ok(result) })),
            AsyncOperationBehaviour::Fail(error) => Ok(Box::pin(async move { Err(error) })),
            AsyncOperationBehaviour::RefuseToStart(error) => Err(error),
        }
    }
}

/// Soft-lock registry that records releases
#[derive(Default)]
pub struct RecordingSoftLockRegistry {
    released: Mutex<Vec<Uuid>>,
}

impl RecordingSoftLockRegistry {
    /// A registry that accepts every release
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock ids released so far
    pub fn released(&self) -> Vec<Uuid> {
        self.released.lock().clone()
    }
}

#[async_trait]
impl SoftLockRegistry for RecordingSoftLockRegistry {
    async fn release_soft_locks(&self, lock_id: Uuid) -> Result<(), StorageError> {
        self.released.lock().push(lock_id);
        Ok(())
    }
}

/// Deduplication handler that records its fact through the ambient
/// transaction, so tests can prove the pre-commit hook ran inside it
pub struct RecordingDeduplicationHandler {
    key: DeduplicationId,
    fail_inside: bool,
    fail_after: bool,
    inside_calls: AtomicUsize,
    after_calls: AtomicUsize,
}

impl RecordingDeduplicationHandler {
    /// A handler recording under `key` whose hooks both succeed
    pub fn new(key: DeduplicationId) -> Self {
        Self {
            key,
            fail_inside: false,
            fail_after: false,
            inside_calls: AtomicUsize::new(0),
            after_calls: AtomicUsize::new(0),
        }
    }

    /// A handler whose pre-commit hook fails
    pub fn failing_inside(key: DeduplicationId) -> Self {
        Self {
            fail_inside: true,
            ..Self::new(key)
        }
    }

    /// A handler whose post-commit acknowledgement fails
    pub fn failing_after(key: DeduplicationId) -> Self {
        Self {
            fail_after: true,
            ..Self::new(key)
        }
    }

    /// Times the pre-commit hook ran
    pub fn inside_calls(&self) -> usize {
        self.inside_calls.load(Ordering::SeqCst)
    }

    /// Times the post-commit hook ran
    pub fn after_calls(&self) -> usize {
        self.after_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeduplicationHandler for RecordingDeduplicationHandler {
    async fn inside_database_transaction(
        &self,
        transaction: &mut dyn DatabaseTransaction,
    ) -> Result<(), StorageError> {
        self.inside_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inside {
            return Err(StorageError::Other(
                "injected pre-commit failure".to_string(),
            ));
        }
        transaction.record_deduplication_fact(&self.key).await
    }

    async fn after_database_transaction(&self) -> Result<(), MessagingError> {
        self.after_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after {
            return Err(MessagingError::AcknowledgementFailed(
                "injected broker failure".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shareable handle to a [`CollectingFiber`], typed as the trait object
/// the executor expects
pub fn collecting_fiber() -> (Arc<CollectingFiber>, Arc<dyn FlowFiber>) {
    let fiber = Arc::new(CollectingFiber::new());
    let as_trait: Arc<dyn FlowFiber> = Arc::clone(&fiber) as Arc<dyn FlowFiber>;
    (fiber, as_trait)
}
