//! Realizes the side effects requested by flow state-machine transitions.
//!
//! The executor is the bottom layer of the flow runtime: it turns each
//! [`Action`] into an effect on durable storage, the messaging substrate,
//! the state machine manager, or the fiber's own mailbox. It is stateless
//! with respect to flows; the only state it owns is the checkpoint
//! metrics.
//!
//! Failure policy: exceptions escape to the state machine layer, which
//! classifies them, except where an operation contract says otherwise
//! (post-commit acknowledgement failures are swallowed, non-live sessions
//! are skipped, past sleep deadlines are clamped, and async-operation
//! start failures are wrapped rather than recovered).

use crate::application::scheduler::EventScheduler;
use crate::application::transaction_context::TransactionContext;
use crate::domain::action::{Action, RemovalReason};
use crate::domain::checkpoint::{Checkpoint, CheckpointSerializer, SerializationContext};
use crate::domain::event::Event;
use crate::domain::flow::{FlowId, FlowStateSnapshot, Party, TransactionHash};
use crate::domain::messaging::{
    DeduplicationId, ExistingSessionMessage, ExistingSessionMessagePayload, FlowErrorMessage,
    InitialSessionMessage, SenderDeduplicationId, SessionMessage,
};
use crate::domain::repository::{
    AsyncOperation, Clock, Database, DeduplicationHandler, FlowFiber, FlowMessaging,
    SoftLockRegistry, StateMachineManagerInternal, TransactionTracker,
};
use crate::domain::session::{InitiatedState, SessionId, SessionState};
use crate::error::FlowError;
use crate::metrics::FlowMetrics;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Executes actions on behalf of flow fibers
pub struct ActionExecutor {
    database: Arc<dyn Database>,
    serializer: Arc<dyn CheckpointSerializer>,
    messaging: Arc<dyn FlowMessaging>,
    manager: Arc<dyn StateMachineManagerInternal>,
    tracker: Arc<dyn TransactionTracker>,
    soft_locks: Arc<dyn SoftLockRegistry>,
    clock: Arc<dyn Clock>,
    scheduler: EventScheduler,
    metrics: FlowMetrics,
}

impl ActionExecutor {
    /// Create an executor over its collaborators
    pub fn new(
        database: Arc<dyn Database>,
        serializer: Arc<dyn CheckpointSerializer>,
        messaging: Arc<dyn FlowMessaging>,
        manager: Arc<dyn StateMachineManagerInternal>,
        tracker: Arc<dyn TransactionTracker>,
        soft_locks: Arc<dyn SoftLockRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            database,
            serializer,
            messaging,
            manager,
            tracker,
            soft_locks,
            clock,
            scheduler: EventScheduler::new(),
            metrics: FlowMetrics::new(),
        }
    }

    /// The executor's checkpoint metrics
    pub fn metrics(&self) -> &FlowMetrics {
        &self.metrics
    }

    /// Execute one action for the given fiber.
    ///
    /// Actions emitted by a single transition are executed in order, one
    /// at a time per fiber; `context` carries the fiber's ambient
    /// database transaction.
    pub async fn execute(
        &self,
        fiber: &Arc<dyn FlowFiber>,
        context: &mut TransactionContext,
        action: Action,
    ) -> Result<(), FlowError> {
        debug!(flow_id = %fiber.id(), action = %action, "executing action");
        match action {
            Action::TrackTransaction { hash } => self.execute_track_transaction(fiber, hash),
            Action::PersistCheckpoint {
                id,
                checkpoint,
                is_update,
            } => {
                self.execute_persist_checkpoint(context, id, checkpoint, is_update)
                    .await
            }
            Action::PersistDeduplicationFacts { handlers } => {
                self.execute_persist_deduplication_facts(context, handlers)
                    .await
            }
            Action::AcknowledgeMessages { handlers } => {
                self.execute_acknowledge_messages(handlers).await
            }
            Action::PropagateErrors {
                error_messages,
                sessions,
                sender_uuid,
            } => {
                self.execute_propagate_errors(error_messages, sessions, sender_uuid)
                    .await
            }
            Action::ScheduleEvent { event } => {
                fiber.schedule_event(event);
                Ok(())
            }
            Action::SleepUntil { time } => {
                self.execute_sleep_until(fiber, time);
                Ok(())
            }
            Action::RemoveCheckpoint { id } => self.execute_remove_checkpoint(context, id).await,
            Action::SendInitial {
                destination,
                initialise,
                deduplication_id,
            } => {
                self.execute_send_initial(destination, initialise, deduplication_id)
                    .await
            }
            Action::SendExisting {
                peer,
                message,
                deduplication_id,
            } => {
                self.execute_send_existing(peer, message, deduplication_id)
                    .await
            }
            Action::AddSessionBinding {
                flow_id,
                session_id,
            } => self.manager.add_session_binding(flow_id, session_id).await,
            Action::RemoveSessionBindings { session_ids } => {
                self.execute_remove_session_bindings(session_ids).await
            }
            Action::SignalFlowHasStarted { flow_id } => {
                self.manager.signal_flow_has_started(flow_id).await
            }
            Action::RemoveFlow {
                flow_id,
                removal_reason,
                last_state,
            } => {
                self.execute_remove_flow(flow_id, removal_reason, last_state)
                    .await
            }
            Action::CreateTransaction => self.execute_create_transaction(fiber, context).await,
            Action::RollbackTransaction => {
                Self::execute_rollback_transaction(context).await;
                Ok(())
            }
            Action::CommitTransaction => Self::execute_commit_transaction(context).await,
            Action::ExecuteAsyncOperation {
                operation,
                deduplication_id,
            } => self.execute_async_operation(fiber, operation, deduplication_id),
            Action::ReleaseSoftLocks { lock_id } => self.execute_release_soft_locks(lock_id).await,
            Action::RetryFlowFromSafePoint { current_state } => {
                self.manager.retry_flow_from_safe_point(current_state).await
            }
            Action::ScheduleFlowTimeout { flow_id } => {
                self.manager.schedule_flow_timeout(flow_id).await
            }
            Action::CancelFlowTimeout { flow_id } => {
                self.manager.cancel_flow_timeout(flow_id).await
            }
        }
    }

    /// Arm a commit notification. Non-blocking: the subscription runs on
    /// its own task and feeds the outcome back as an event.
    fn execute_track_transaction(
        &self,
        fiber: &Arc<dyn FlowFiber>,
        hash: TransactionHash,
    ) -> Result<(), FlowError> {
        let future = self.tracker.track(hash);
        let fiber = Arc::clone(fiber);
        tokio::spawn(async move {
            match future.await {
                Ok(hash) => fiber.schedule_event(Event::TransactionCommitted { hash }),
                Err(error) => fiber.schedule_event(Event::Error { error }),
            }
        });
        Ok(())
    }

    async fn execute_persist_checkpoint(
        &self,
        context: &mut TransactionContext,
        id: FlowId,
        checkpoint: Checkpoint,
        is_update: bool,
    ) -> Result<(), FlowError> {
        let serialization_context = SerializationContext { flow_id: id };
        let bytes = self
            .serializer
            .serialize_checkpoint(&checkpoint, &serialization_context)?;
        let size_bytes = bytes.len() as u64;

        let transaction = context.current_mut()?;
        if is_update {
            transaction.update_checkpoint(&id, bytes).await?;
        } else {
            transaction.add_checkpoint(&id, bytes).await?;
        }

        self.metrics.record_checkpoint(self.clock.now(), size_bytes);
        Ok(())
    }

    /// Pre-commit hooks run inside the active transaction so the dedup
    /// facts commit atomically with the transition. A handler failure
    /// aborts the transition.
    async fn execute_persist_deduplication_facts(
        &self,
        context: &mut TransactionContext,
        handlers: Vec<Arc<dyn DeduplicationHandler>>,
    ) -> Result<(), FlowError> {
        let transaction = context.current_mut()?;
        for handler in &handlers {
            handler.inside_database_transaction(&mut *transaction).await?;
        }
        Ok(())
    }

    /// Post-commit hooks. The business transaction is already durable, so
    /// an acknowledgement failure only risks a redelivery that the dedup
    /// facts will catch; every handler runs and nothing fails the
    /// transition here.
    async fn execute_acknowledge_messages(
        &self,
        handlers: Vec<Arc<dyn DeduplicationHandler>>,
    ) -> Result<(), FlowError> {
        for handler in &handlers {
            if let Err(error) = handler.after_database_transaction().await {
                info!(%error, "message acknowledgement failed after commit; redelivery is deduplicated");
            }
        }
        Ok(())
    }

    async fn execute_propagate_errors(
        &self,
        error_messages: Vec<FlowErrorMessage>,
        sessions: Vec<SessionState>,
        sender_uuid: Option<Uuid>,
    ) -> Result<(), FlowError> {
        for error in &error_messages {
            warn!(error_id = %error.error_id, "propagating error to peers: {}", error.message);
        }
        for session in &sessions {
            let peer_sink_session_id = match session.initiated_state {
                InitiatedState::Live {
                    peer_sink_session_id,
                } => peer_sink_session_id,
                // Peers that never confirmed, or already ended, hear nothing
                InitiatedState::Uninitiated | InitiatedState::Ended => continue,
            };
            for error in &error_messages {
                let deduplication_id =
                    DeduplicationId::for_error(&error.error_id, &peer_sink_session_id);
                let message = SessionMessage::Existing(ExistingSessionMessage {
                    recipient_session_id: peer_sink_session_id,
                    payload: ExistingSessionMessagePayload::Error(error.clone()),
                });
                self.messaging
                    .send_session_message(
                        &session.peer,
                        message,
                        SenderDeduplicationId {
                            deduplication_id,
                            sender_uuid,
                        },
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// A sleep is a waiting state plus a scheduled wakeup, so shutdown or
    /// retry can interrupt it with a single unschedule call.
    fn execute_sleep_until(&self, fiber: &Arc<dyn FlowFiber>, time: DateTime<Utc>) {
        let delay = (time - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        self.scheduler
            .schedule(Arc::clone(fiber), delay, Event::Wakeup);
    }

    async fn execute_remove_checkpoint(
        &self,
        context: &mut TransactionContext,
        id: FlowId,
    ) -> Result<(), FlowError> {
        let transaction = context.current_mut()?;
        let removed = transaction.remove_checkpoint(&id).await?;
        if !removed {
            debug!(flow_id = %id, "no checkpoint to remove");
        }
        Ok(())
    }

    async fn execute_send_initial(
        &self,
        destination: Party,
        initialise: InitialSessionMessage,
        deduplication_id: SenderDeduplicationId,
    ) -> Result<(), FlowError> {
        self.messaging
            .send_session_message(
                &destination,
                SessionMessage::Initial(initialise),
                deduplication_id,
            )
            .await?;
        Ok(())
    }

    async fn execute_send_existing(
        &self,
        peer: Party,
        message: ExistingSessionMessage,
        deduplication_id: SenderDeduplicationId,
    ) -> Result<(), FlowError> {
        self.messaging
            .send_session_message(&peer, SessionMessage::Existing(message), deduplication_id)
            .await?;
        Ok(())
    }

    async fn execute_remove_session_bindings(
        &self,
        session_ids: HashSet<SessionId>,
    ) -> Result<(), FlowError> {
        self.manager.remove_session_bindings(&session_ids).await
    }

    async fn execute_remove_flow(
        &self,
        flow_id: FlowId,
        removal_reason: RemovalReason,
        last_state: FlowStateSnapshot,
    ) -> Result<(), FlowError> {
        // A pending wakeup for a removed flow would deliver into nothing
        self.scheduler.cancel(&flow_id);
        self.manager
            .remove_flow(flow_id, removal_reason, last_state)
            .await
    }

    async fn execute_create_transaction(
        &self,
        fiber: &Arc<dyn FlowFiber>,
        context: &mut TransactionContext,
    ) -> Result<(), FlowError> {
        if context.is_bound() {
            return Err(FlowError::Programming(format!(
                "flow {} already has a database transaction bound",
                fiber.id()
            )));
        }
        let transaction = self.database.begin_transaction().await?;
        context.bind(transaction)
    }

    /// Idempotent against the absence of a transaction
    async fn execute_rollback_transaction(context: &mut TransactionContext) {
        if let Some(transaction) = context.unbind() {
            transaction.rollback().await;
        }
    }

    /// The transaction leaves the context before the commit is attempted,
    /// so nothing stays bound whether the commit succeeds or throws.
    async fn execute_commit_transaction(context: &mut TransactionContext) -> Result<(), FlowError> {
        let transaction = context.unbind().ok_or_else(|| {
            FlowError::Programming(
                "cannot commit: no database transaction is bound to this fiber".to_string(),
            )
        })?;
        transaction.commit().await?;
        Ok(())
    }

    /// Start the operation and bridge its outcome back as an event. A
    /// synchronous failure to even start is wrapped and surfaced; the
    /// state machine decides whether to retry or hospitalize.
    fn execute_async_operation(
        &self,
        fiber: &Arc<dyn FlowFiber>,
        operation: Arc<dyn AsyncOperation>,
        deduplication_id: DeduplicationId,
    ) -> Result<(), FlowError> {
        match operation.execute(deduplication_id) {
            Ok(future) => {
                let fiber = Arc::clone(fiber);
                tokio::spawn(async move {
                    match future.await {
                        Ok(result) => {
                            fiber.schedule_event(Event::AsyncOperationCompletion { result })
                        }
                        Err(error) => fiber.schedule_event(Event::AsyncOperationThrows { error }),
                    }
                });
                Ok(())
            }
            Err(error) => Err(FlowError::AsyncOperationTransition(Box::new(error))),
        }
    }

    async fn execute_release_soft_locks(&self, lock_id: Option<Uuid>) -> Result<(), FlowError> {
        if let Some(lock_id) = lock_id {
            self.soft_locks.release_soft_locks(lock_id).await?;
        }
        Ok(())
    }
}
