//! End-to-end tests driving the action executor over the in-memory
//! database and recording collaborators.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;

use weir_core::{
    Action, AsyncOperation, Checkpoint, Clock, DeduplicationHandler, DeduplicationId, ErrorId,
    Event, FlowError, FlowErrorMessage, FlowStateSnapshot, FlowStatus, JsonCheckpointSerializer,
    OperationResult, Party, RemovalReason, SenderDeduplicationId, SerializationContext, SessionId,
    SessionMessage, SessionState, TransactionContext, TransactionHash,
};
use weir_core::domain::checkpoint::CheckpointSerializer;
use weir_core::domain::messaging::ExistingSessionMessagePayload;
use weir_core::domain::repository::FlowFiber;
use weir_test_utils::{
    collecting_fiber, AsyncOperationBehaviour, ExecutorHarness, ManagerCall,
    RecordingDeduplicationHandler, StubAsyncOperation,
};

fn alice() -> Party {
    Party("O=Alice,L=London,C=GB".to_string())
}

fn bob() -> Party {
    Party("O=Bob,L=Paris,C=FR".to_string())
}

#[tokio::test]
async fn happy_suspension_persists_and_acknowledges() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (fiber, as_trait) = collecting_fiber();
    let flow_id = as_trait.id();
    let mut context = TransactionContext::new();

    let checkpoint = Checkpoint::new(json!({"suspended_at": "receive"}));
    let handler = Arc::new(RecordingDeduplicationHandler::new(DeduplicationId::new(
        "inbound-message-1",
    )));
    let handlers: Vec<Arc<dyn DeduplicationHandler>> =
        vec![Arc::clone(&handler) as Arc<dyn DeduplicationHandler>];

    harness
        .executor
        .execute(&as_trait, &mut context, Action::CreateTransaction)
        .await?;
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::PersistCheckpoint {
                id: flow_id,
                checkpoint: checkpoint.clone(),
                is_update: false,
            },
        )
        .await?;

    // The dedup fact rides in the same transaction as the checkpoint
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::PersistDeduplicationFacts {
                handlers: handlers.clone(),
            },
        )
        .await?;
    assert_eq!(handler.inside_calls(), 1);
    assert!(!harness
        .database
        .has_deduplication_fact(&DeduplicationId::new("inbound-message-1")));

    harness
        .executor
        .execute(&as_trait, &mut context, Action::CommitTransaction)
        .await?;
    assert!(!context.is_bound());

    harness
        .executor
        .execute(&as_trait, &mut context, Action::AcknowledgeMessages { handlers })
        .await?;
    assert_eq!(handler.after_calls(), 1);

    // Storage holds the serializer's exact bytes, and both facts are in
    let expected = JsonCheckpointSerializer
        .serialize_checkpoint(&checkpoint, &SerializationContext { flow_id })?;
    assert_eq!(harness.database.checkpoint(&flow_id), Some(expected.clone()));
    assert!(harness
        .database
        .has_deduplication_fact(&DeduplicationId::new("inbound-message-1")));

    // Metrics saw exactly one write of the serialized size
    assert_eq!(harness.executor.metrics().checkpointing_rate_count(), 1);
    assert_eq!(
        harness
            .executor
            .metrics()
            .checkpoint_size_samples(harness.clock.now()),
        vec![expected.len() as u64]
    );

    assert!(fiber.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn commit_failure_unbinds_and_persists_nothing() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (_fiber, as_trait) = collecting_fiber();
    let flow_id = as_trait.id();
    let mut context = TransactionContext::new();

    let handler = Arc::new(RecordingDeduplicationHandler::new(DeduplicationId::new(
        "inbound-message-2",
    )));
    let handlers: Vec<Arc<dyn DeduplicationHandler>> =
        vec![Arc::clone(&handler) as Arc<dyn DeduplicationHandler>];

    harness
        .executor
        .execute(&as_trait, &mut context, Action::CreateTransaction)
        .await?;
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::PersistCheckpoint {
                id: flow_id,
                checkpoint: Checkpoint::new(json!({})),
                is_update: false,
            },
        )
        .await?;
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::PersistDeduplicationFacts {
                handlers: handlers.clone(),
            },
        )
        .await?;

    harness.database.fail_next_commit();
    let result = harness
        .executor
        .execute(&as_trait, &mut context, Action::CommitTransaction)
        .await;
    assert!(matches!(result, Err(FlowError::Storage(_))));

    // The exception escaped, so the state machine never issues the
    // acknowledgement action; nothing the transaction wrote is visible
    assert!(!context.is_bound());
    assert_eq!(harness.database.checkpoint(&flow_id), None);
    assert!(!harness
        .database
        .has_deduplication_fact(&DeduplicationId::new("inbound-message-2")));
    assert_eq!(handler.after_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn errors_are_propagated_only_to_live_sessions() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (_fiber, as_trait) = collecting_fiber();
    let mut context = TransactionContext::new();

    let sink_one = SessionId::random();
    let sink_two = SessionId::random();
    let error_id = ErrorId::random();
    let error = FlowErrorMessage {
        error_id,
        message: "counterparty rejected the proposal".to_string(),
    };
    let sender_uuid = Some(uuid::Uuid::new_v4());

    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::PropagateErrors {
                error_messages: vec![error.clone()],
                sessions: vec![
                    SessionState::live(alice(), sink_one),
                    SessionState::ended(bob()),
                    SessionState::live(bob(), sink_two),
                ],
                sender_uuid,
            },
        )
        .await?;

    let sent = harness.messaging.sent();
    assert_eq!(sent.len(), 2);

    assert_eq!(sent[0].peer, alice());
    assert_eq!(
        sent[0].deduplication_id,
        SenderDeduplicationId {
            deduplication_id: DeduplicationId::for_error(&error_id, &sink_one),
            sender_uuid,
        }
    );
    match &sent[0].message {
        SessionMessage::Existing(message) => {
            assert_eq!(message.recipient_session_id, sink_one);
            assert_eq!(
                message.payload,
                ExistingSessionMessagePayload::Error(error.clone())
            );
        }
        other => panic!("expected an existing-session message, got {other:?}"),
    }

    assert_eq!(sent[1].peer, bob());
    assert_eq!(
        sent[1].deduplication_id.deduplication_id,
        DeduplicationId::for_error(&error_id, &sink_two)
    );
    Ok(())
}

#[tokio::test]
async fn async_operation_completion_comes_back_as_one_event() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (fiber, as_trait) = collecting_fiber();
    let mut context = TransactionContext::new();

    let result = OperationResult(json!({"signatures": 2}));
    let operation = Arc::new(StubAsyncOperation::new(AsyncOperationBehaviour::Complete(
        result.clone(),
    )));

    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::ExecuteAsyncOperation {
                operation: Arc::clone(&operation) as Arc<dyn AsyncOperation>,
                deduplication_id: DeduplicationId::new("notarise-1"),
            },
        )
        .await?;

    sleep(Duration::from_millis(20)).await;
    assert_eq!(
        fiber.events(),
        vec![Event::AsyncOperationCompletion { result }]
    );
    assert_eq!(
        operation.received_deduplication_ids(),
        vec![DeduplicationId::new("notarise-1")]
    );
    Ok(())
}

#[tokio::test]
async fn async_operation_failure_comes_back_as_a_throws_event() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (fiber, as_trait) = collecting_fiber();
    let mut context = TransactionContext::new();

    let failure = FlowError::Other("notary unreachable".to_string());
    let operation = Arc::new(StubAsyncOperation::new(AsyncOperationBehaviour::Fail(
        failure.clone(),
    )));

    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::ExecuteAsyncOperation {
                operation: operation as Arc<dyn AsyncOperation>,
                deduplication_id: DeduplicationId::new("notarise-2"),
            },
        )
        .await?;

    sleep(Duration::from_millis(20)).await;
    assert_eq!(
        fiber.events(),
        vec![Event::AsyncOperationThrows { error: failure }]
    );
    Ok(())
}

#[tokio::test]
async fn async_operation_start_failure_is_wrapped_and_raised() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (fiber, as_trait) = collecting_fiber();
    let mut context = TransactionContext::new();

    let cause = FlowError::Other("operation rejected".to_string());
    let operation = Arc::new(StubAsyncOperation::new(
        AsyncOperationBehaviour::RefuseToStart(cause.clone()),
    ));

    let result = harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::ExecuteAsyncOperation {
                operation: operation as Arc<dyn AsyncOperation>,
                deduplication_id: DeduplicationId::new("notarise-3"),
            },
        )
        .await;

    assert_eq!(
        result,
        Err(FlowError::AsyncOperationTransition(Box::new(cause)))
    );
    sleep(Duration::from_millis(20)).await;
    assert!(fiber.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn bandwidth_history_gains_at_most_one_sample_per_second() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (_fiber, as_trait) = collecting_fiber();
    let flow_id = as_trait.id();
    let mut context = TransactionContext::new();

    harness
        .executor
        .execute(&as_trait, &mut context, Action::CreateTransaction)
        .await?;

    // A burst of 1,000 writes inside 100ms of clock time
    for i in 0..1_000u32 {
        harness
            .executor
            .execute(
                &as_trait,
                &mut context,
                Action::PersistCheckpoint {
                    id: flow_id,
                    checkpoint: Checkpoint::new(json!({"spin": i})),
                    is_update: i > 0,
                },
            )
            .await?;
        harness.clock.advance(chrono::Duration::microseconds(100));
    }

    let metrics = harness.executor.metrics();
    assert_eq!(metrics.checkpointing_rate_count(), 1_000);
    assert_eq!(metrics.bandwidth_samples(harness.clock.now()).len(), 1);

    // Two seconds later a single write produces exactly one more sample
    harness.clock.advance_secs(2);
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::PersistCheckpoint {
                id: flow_id,
                checkpoint: Checkpoint::new(json!({"spin": "last"})),
                is_update: true,
            },
        )
        .await?;
    assert_eq!(metrics.bandwidth_samples(harness.clock.now()).len(), 2);
    Ok(())
}

#[tokio::test]
async fn rollback_discards_everything_and_tolerates_absence() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (_fiber, as_trait) = collecting_fiber();
    let flow_id = as_trait.id();
    let mut context = TransactionContext::new();

    harness
        .executor
        .execute(&as_trait, &mut context, Action::CreateTransaction)
        .await?;
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::PersistCheckpoint {
                id: flow_id,
                checkpoint: Checkpoint::new(json!({})),
                is_update: false,
            },
        )
        .await?;
    harness
        .executor
        .execute(&as_trait, &mut context, Action::RollbackTransaction)
        .await?;

    assert!(!context.is_bound());
    assert_eq!(harness.database.checkpoint(&flow_id), None);

    // Rolling back with nothing bound is a no-op
    harness
        .executor
        .execute(&as_trait, &mut context, Action::RollbackTransaction)
        .await?;
    Ok(())
}

#[tokio::test]
async fn opening_a_second_transaction_is_a_programming_error() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (_fiber, as_trait) = collecting_fiber();
    let mut context = TransactionContext::new();

    harness
        .executor
        .execute(&as_trait, &mut context, Action::CreateTransaction)
        .await?;
    let result = harness
        .executor
        .execute(&as_trait, &mut context, Action::CreateTransaction)
        .await;

    assert!(matches!(result, Err(FlowError::Programming(_))));
    // The original transaction is still the bound one
    assert!(context.is_bound());
    Ok(())
}

#[tokio::test]
async fn committing_without_a_transaction_is_a_programming_error() {
    let harness = ExecutorHarness::new();
    let (_fiber, as_trait) = collecting_fiber();
    let mut context = TransactionContext::new();

    let result = harness
        .executor
        .execute(&as_trait, &mut context, Action::CommitTransaction)
        .await;
    assert!(matches!(result, Err(FlowError::Programming(_))));
}

#[tokio::test]
async fn acknowledgement_failures_are_swallowed_and_all_handlers_run() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (_fiber, as_trait) = collecting_fiber();
    let mut context = TransactionContext::new();

    let failing = Arc::new(RecordingDeduplicationHandler::failing_after(
        DeduplicationId::new("inbound-a"),
    ));
    let succeeding = Arc::new(RecordingDeduplicationHandler::new(DeduplicationId::new(
        "inbound-b",
    )));

    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::AcknowledgeMessages {
                handlers: vec![
                    Arc::clone(&failing) as Arc<dyn DeduplicationHandler>,
                    Arc::clone(&succeeding) as Arc<dyn DeduplicationHandler>,
                ],
            },
        )
        .await?;

    assert_eq!(failing.after_calls(), 1);
    assert_eq!(succeeding.after_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn a_failing_pre_commit_hook_aborts_the_transition() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (_fiber, as_trait) = collecting_fiber();
    let mut context = TransactionContext::new();

    harness
        .executor
        .execute(&as_trait, &mut context, Action::CreateTransaction)
        .await?;

    let failing = Arc::new(RecordingDeduplicationHandler::failing_inside(
        DeduplicationId::new("inbound-c"),
    ));
    let result = harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::PersistDeduplicationFacts {
                handlers: vec![failing as Arc<dyn DeduplicationHandler>],
            },
        )
        .await;

    assert!(matches!(result, Err(FlowError::Storage(_))));
    Ok(())
}

#[tokio::test]
async fn replaying_an_identical_update_changes_nothing_observable() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (_fiber, as_trait) = collecting_fiber();
    let flow_id = as_trait.id();
    let mut context = TransactionContext::new();

    let checkpoint = Checkpoint::new(json!({"frame": "sign"}));

    harness
        .executor
        .execute(&as_trait, &mut context, Action::CreateTransaction)
        .await?;
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::PersistCheckpoint {
                id: flow_id,
                checkpoint: checkpoint.clone(),
                is_update: false,
            },
        )
        .await?;
    harness
        .executor
        .execute(&as_trait, &mut context, Action::CommitTransaction)
        .await?;
    let stored = harness.database.checkpoint(&flow_id);

    // Replay the same bytes as an update, as a post-crash retry would
    harness
        .executor
        .execute(&as_trait, &mut context, Action::CreateTransaction)
        .await?;
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::PersistCheckpoint {
                id: flow_id,
                checkpoint,
                is_update: true,
            },
        )
        .await?;
    harness
        .executor
        .execute(&as_trait, &mut context, Action::CommitTransaction)
        .await?;

    assert_eq!(harness.database.checkpoint(&flow_id), stored);
    Ok(())
}

#[tokio::test]
async fn remove_checkpoint_deletes_inside_the_transaction() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (_fiber, as_trait) = collecting_fiber();
    let flow_id = as_trait.id();
    let mut context = TransactionContext::new();

    harness
        .executor
        .execute(&as_trait, &mut context, Action::CreateTransaction)
        .await?;
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::PersistCheckpoint {
                id: flow_id,
                checkpoint: Checkpoint::new(json!({})),
                is_update: false,
            },
        )
        .await?;
    harness
        .executor
        .execute(&as_trait, &mut context, Action::CommitTransaction)
        .await?;

    harness
        .executor
        .execute(&as_trait, &mut context, Action::CreateTransaction)
        .await?;
    harness
        .executor
        .execute(&as_trait, &mut context, Action::RemoveCheckpoint { id: flow_id })
        .await?;
    // Still visible until the transaction commits
    assert!(harness.database.checkpoint(&flow_id).is_some());
    harness
        .executor
        .execute(&as_trait, &mut context, Action::CommitTransaction)
        .await?;
    assert_eq!(harness.database.checkpoint(&flow_id), None);

    // Removing without a transaction is a programming error
    let result = harness
        .executor
        .execute(&as_trait, &mut context, Action::RemoveCheckpoint { id: flow_id })
        .await;
    assert!(matches!(result, Err(FlowError::Programming(_))));
    Ok(())
}

#[tokio::test]
async fn schedule_event_passes_the_event_through_unchanged() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (fiber, as_trait) = collecting_fiber();
    let mut context = TransactionContext::new();

    let event = Event::Error {
        error: FlowError::Other("peer went away".to_string()),
    };
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::ScheduleEvent {
                event: event.clone(),
            },
        )
        .await?;

    assert_eq!(fiber.events(), vec![event]);
    Ok(())
}

#[tokio::test]
async fn sleep_until_delivers_a_wakeup_and_clamps_past_deadlines() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (fiber, as_trait) = collecting_fiber();
    let mut context = TransactionContext::new();

    // A deadline already in the past wakes up immediately
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::SleepUntil {
                time: harness.clock.now() - chrono::Duration::seconds(10),
            },
        )
        .await?;
    sleep(Duration::from_millis(20)).await;
    assert_eq!(fiber.events(), vec![Event::Wakeup]);

    // A future deadline waits for the scheduler
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::SleepUntil {
                time: harness.clock.now() + chrono::Duration::milliseconds(30),
            },
        )
        .await?;
    sleep(Duration::from_millis(5)).await;
    assert_eq!(fiber.events().len(), 1);
    sleep(Duration::from_millis(80)).await;
    assert_eq!(fiber.events(), vec![Event::Wakeup, Event::Wakeup]);
    Ok(())
}

#[tokio::test]
async fn tracked_transactions_feed_commit_events_back() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (fiber, as_trait) = collecting_fiber();
    let mut context = TransactionContext::new();

    let hash = TransactionHash("5AC1".to_string());
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::TrackTransaction { hash: hash.clone() },
        )
        .await?;

    sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.tracker.tracked(), vec![hash.clone()]);
    assert_eq!(fiber.events(), vec![Event::TransactionCommitted { hash }]);
    Ok(())
}

#[tokio::test]
async fn tracker_failures_come_back_as_error_events() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (fiber, as_trait) = collecting_fiber();
    let mut context = TransactionContext::new();

    let failure = FlowError::Other("subscription dropped".to_string());
    harness.tracker.fail_with(failure.clone());
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::TrackTransaction {
                hash: TransactionHash("DEAD".to_string()),
            },
        )
        .await?;

    sleep(Duration::from_millis(20)).await;
    assert_eq!(fiber.events(), vec![Event::Error { error: failure }]);
    Ok(())
}

#[tokio::test]
async fn soft_locks_are_released_only_when_a_lock_id_is_given() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (_fiber, as_trait) = collecting_fiber();
    let mut context = TransactionContext::new();

    harness
        .executor
        .execute(&as_trait, &mut context, Action::ReleaseSoftLocks { lock_id: None })
        .await?;
    assert!(harness.soft_locks.released().is_empty());

    let lock_id = uuid::Uuid::new_v4();
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::ReleaseSoftLocks {
                lock_id: Some(lock_id),
            },
        )
        .await?;
    assert_eq!(harness.soft_locks.released(), vec![lock_id]);
    Ok(())
}

#[tokio::test]
async fn manager_delegations_arrive_in_order() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (_fiber, as_trait) = collecting_fiber();
    let flow_id = as_trait.id();
    let mut context = TransactionContext::new();

    let session_id = SessionId::random();
    let last_state = FlowStateSnapshot {
        flow_id,
        status: FlowStatus::Completed,
        suspension_count: 2,
    };

    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::AddSessionBinding {
                flow_id,
                session_id,
            },
        )
        .await?;
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::SignalFlowHasStarted { flow_id },
        )
        .await?;
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::ScheduleFlowTimeout { flow_id },
        )
        .await?;
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::CancelFlowTimeout { flow_id },
        )
        .await?;
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::RetryFlowFromSafePoint {
                current_state: FlowStateSnapshot::running(flow_id),
            },
        )
        .await?;
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::RemoveSessionBindings {
                session_ids: HashSet::from([session_id]),
            },
        )
        .await?;
    harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::RemoveFlow {
                flow_id,
                removal_reason: RemovalReason::Completed,
                last_state: last_state.clone(),
            },
        )
        .await?;

    assert_eq!(
        harness.manager.calls(),
        vec![
            ManagerCall::AddSessionBinding(flow_id, session_id),
            ManagerCall::SignalFlowHasStarted(flow_id),
            ManagerCall::ScheduleFlowTimeout(flow_id),
            ManagerCall::CancelFlowTimeout(flow_id),
            ManagerCall::RetryFlowFromSafePoint(FlowStateSnapshot::running(flow_id)),
            ManagerCall::RemoveSessionBindings(HashSet::from([session_id])),
            ManagerCall::RemoveFlow(flow_id, RemovalReason::Completed, last_state),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn send_failures_escape_to_the_state_machine() -> Result<(), FlowError> {
    let harness = ExecutorHarness::new();
    let (_fiber, as_trait) = collecting_fiber();
    let mut context = TransactionContext::new();

    harness.messaging.fail_sends();
    let result = harness
        .executor
        .execute(
            &as_trait,
            &mut context,
            Action::PropagateErrors {
                error_messages: vec![FlowErrorMessage {
                    error_id: ErrorId::random(),
                    message: "boom".to_string(),
                }],
                sessions: vec![SessionState::live(alice(), SessionId::random())],
                sender_uuid: None,
            },
        )
        .await;

    assert!(matches!(result, Err(FlowError::Messaging(_))));
    Ok(())
}
