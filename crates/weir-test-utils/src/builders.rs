//! Harness builders wiring an executor over recording collaborators.

use std::sync::Arc;

use weir_core::application::action_executor::ActionExecutor;
use weir_core::domain::checkpoint::JsonCheckpointSerializer;
use weir_core::domain::repository::{
    Clock, Database, FlowMessaging, SoftLockRegistry, StateMachineManagerInternal,
    TransactionTracker,
};
use weir_state_inmemory::InMemoryDatabase;

use crate::implementations::{
    ManualClock, RecordingFlowMessaging, RecordingManager, RecordingSoftLockRegistry,
    StubTransactionTracker,
};

/// An action executor wired to an in-memory database and recording mocks,
/// with handles kept on every collaborator for assertions
pub struct ExecutorHarness {
    /// The in-memory node database
    pub database: Arc<InMemoryDatabase>,
    /// Records every send
    pub messaging: Arc<RecordingFlowMessaging>,
    /// Records every delegation
    pub manager: Arc<RecordingManager>,
    /// Resolves subscriptions immediately
    pub tracker: Arc<StubTransactionTracker>,
    /// Records every soft-lock release
    pub soft_locks: Arc<RecordingSoftLockRegistry>,
    /// Controllable time source
    pub clock: Arc<ManualClock>,
    /// The executor under test
    pub executor: ActionExecutor,
}

impl ExecutorHarness {
    /// Build a harness with fresh collaborators
    pub fn new() -> Self {
        let database = Arc::new(InMemoryDatabase::new());
        let messaging = Arc::new(RecordingFlowMessaging::new());
        let manager = Arc::new(RecordingManager::new());
        let tracker = Arc::new(StubTransactionTracker::new());
        let soft_locks = Arc::new(RecordingSoftLockRegistry::new());
        let clock = Arc::new(ManualClock::new());

        let executor = ActionExecutor::new(
            Arc::clone(&database) as Arc<dyn Database>,
            Arc::new(JsonCheckpointSerializer),
            Arc::clone(&messaging) as Arc<dyn FlowMessaging>,
            Arc::clone(&manager) as Arc<dyn StateMachineManagerInternal>,
            Arc::clone(&tracker) as Arc<dyn TransactionTracker>,
            Arc::clone(&soft_locks) as Arc<dyn SoftLockRegistry>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );

        Self {
            database,
            messaging,
            manager,
            tracker,
            soft_locks,
            clock,
            executor,
        }
    }
}

impl Default for ExecutorHarness {
    fn default() -> Self {
        Self::new()
    }
}
