//! Tracks live fibers, session-to-flow bindings, and flow timeouts, and
//! drives safe-point retries from durable state.
//!
//! The transition function that decides what a flow does next lives above
//! this layer; the manager only keeps the runtime bookkeeping the action
//! executor delegates to.

use crate::application::scheduler::EventScheduler;
use crate::config::FlowRuntimeConfig;
use crate::domain::action::RemovalReason;
use crate::domain::checkpoint::{CheckpointSerializer, SerializationContext};
use crate::domain::event::Event;
use crate::domain::flow::{FlowId, FlowStateSnapshot};
use crate::domain::repository::{
    Clock, Database, FlowFiber, StateMachineManagerInternal,
};
use crate::domain::session::SessionId;
use crate::error::FlowError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runtime bookkeeping for live flows
pub struct StateMachineManager {
    fibers: DashMap<FlowId, Arc<dyn FlowFiber>>,
    // Single map under one lock so a set of bindings is removed atomically
    session_bindings: RwLock<HashMap<SessionId, FlowId>>,
    started: DashMap<FlowId, DateTime<Utc>>,
    timeouts: EventScheduler,
    database: Arc<dyn Database>,
    serializer: Arc<dyn CheckpointSerializer>,
    clock: Arc<dyn Clock>,
    config: FlowRuntimeConfig,
}

impl StateMachineManager {
    /// Create a manager over the node database
    pub fn new(
        database: Arc<dyn Database>,
        serializer: Arc<dyn CheckpointSerializer>,
        clock: Arc<dyn Clock>,
        config: FlowRuntimeConfig,
    ) -> Self {
        Self {
            fibers: DashMap::new(),
            session_bindings: RwLock::new(HashMap::new()),
            started: DashMap::new(),
            timeouts: EventScheduler::new(),
            database,
            serializer,
            clock,
            config,
        }
    }

    /// Make a fiber reachable for event delivery
    pub fn register_fiber(&self, fiber: Arc<dyn FlowFiber>) {
        debug!(flow_id = %fiber.id(), "registering fiber");
        self.fibers.insert(fiber.id(), fiber);
    }

    /// The fiber hosting `flow_id`, if it is live
    pub fn fiber(&self, flow_id: &FlowId) -> Option<Arc<dyn FlowFiber>> {
        self.fibers.get(flow_id).map(|entry| Arc::clone(&entry))
    }

    /// Number of live fibers
    pub fn live_flow_count(&self) -> usize {
        self.fibers.len()
    }

    /// The flow a session currently routes to
    pub fn session_binding(&self, session_id: &SessionId) -> Option<FlowId> {
        self.session_bindings.read().get(session_id).copied()
    }

    /// Whether the flow has signalled a successful start
    pub fn has_started(&self, flow_id: &FlowId) -> bool {
        self.started.contains_key(flow_id)
    }
}

#[async_trait]
impl StateMachineManagerInternal for StateMachineManager {
    async fn add_session_binding(
        &self,
        flow_id: FlowId,
        session_id: SessionId,
    ) -> Result<(), FlowError> {
        let previous = self.session_bindings.write().insert(session_id, flow_id);
        if let Some(previous) = previous {
            if previous != flow_id {
                warn!(%session_id, %previous, %flow_id, "session rebound to a different flow");
            }
        }
        Ok(())
    }

    async fn remove_session_bindings(
        &self,
        session_ids: &HashSet<SessionId>,
    ) -> Result<(), FlowError> {
        let mut bindings = self.session_bindings.write();
        for session_id in session_ids {
            bindings.remove(session_id);
        }
        debug!(count = session_ids.len(), "removed session bindings");
        Ok(())
    }

    async fn signal_flow_has_started(&self, flow_id: FlowId) -> Result<(), FlowError> {
        self.started.insert(flow_id, self.clock.now());
        debug!(%flow_id, "flow has started");
        Ok(())
    }

    async fn remove_flow(
        &self,
        flow_id: FlowId,
        removal_reason: RemovalReason,
        last_state: FlowStateSnapshot,
    ) -> Result<(), FlowError> {
        self.timeouts.cancel(&flow_id);
        self.fibers.remove(&flow_id);
        self.started.remove(&flow_id);
        self.session_bindings
            .write()
            .retain(|_, bound| *bound != flow_id);
        info!(%flow_id, reason = ?removal_reason, status = ?last_state.status, "removed flow");
        Ok(())
    }

    async fn retry_flow_from_safe_point(
        &self,
        current_state: FlowStateSnapshot,
    ) -> Result<(), FlowError> {
        let flow_id = current_state.flow_id;
        let Some(fiber) = self.fiber(&flow_id) else {
            // The flow may have been removed while the retry was in flight
            warn!(%flow_id, "retry requested for a flow with no live fiber");
            return Ok(());
        };

        let checkpoint = match self.database.load_checkpoint(&flow_id).await? {
            Some(bytes) => Some(
                self.serializer
                    .deserialize_checkpoint(&bytes, &SerializationContext { flow_id })?,
            ),
            None => None,
        };

        info!(%flow_id, has_checkpoint = checkpoint.is_some(), "retrying flow from safe point");
        fiber.schedule_event(Event::RetryFromSafePoint { checkpoint });
        Ok(())
    }

    async fn schedule_flow_timeout(&self, flow_id: FlowId) -> Result<(), FlowError> {
        let Some(fiber) = self.fiber(&flow_id) else {
            warn!(%flow_id, "timeout requested for a flow with no live fiber");
            return Ok(());
        };
        self.timeouts.schedule(
            fiber,
            self.config.flow_timeout(),
            Event::FlowTimedOut { flow_id },
        );
        Ok(())
    }

    async fn cancel_flow_timeout(&self, flow_id: FlowId) -> Result<(), FlowError> {
        self.timeouts.cancel(&flow_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fiber::fiber_channel;
    use crate::domain::checkpoint::{Checkpoint, JsonCheckpointSerializer};
    use crate::domain::flow::FlowStatus;
    use crate::domain::repository::{DatabaseTransaction, SystemClock};
    use crate::error::StorageError;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::sleep;

    // Read-only stub: retries only need the committed checkpoint view
    struct FixedCheckpointDatabase {
        checkpoint: Option<Vec<u8>>,
    }

    #[async_trait]
    impl Database for FixedCheckpointDatabase {
        async fn begin_transaction(
            &self,
        ) -> Result<Box<dyn DatabaseTransaction>, StorageError> {
            Err(StorageError::Other(
                "this stub has no write path".to_string(),
            ))
        }

        async fn load_checkpoint(&self, _id: &FlowId) -> Result<Option<Vec<u8>>, StorageError> {
            Ok(self.checkpoint.clone())
        }
    }

    fn manager_with(checkpoint: Option<Vec<u8>>, config: FlowRuntimeConfig) -> StateMachineManager {
        StateMachineManager::new(
            Arc::new(FixedCheckpointDatabase { checkpoint }),
            Arc::new(JsonCheckpointSerializer),
            Arc::new(SystemClock),
            config,
        )
    }

    #[tokio::test]
    async fn bindings_are_removed_as_a_set() -> Result<(), FlowError> {
        let manager = manager_with(None, FlowRuntimeConfig::default());
        let flow_id = FlowId::random();
        let first = SessionId::random();
        let second = SessionId::random();
        let kept = SessionId::random();

        manager.add_session_binding(flow_id, first).await?;
        manager.add_session_binding(flow_id, second).await?;
        manager.add_session_binding(flow_id, kept).await?;

        manager
            .remove_session_bindings(&HashSet::from([first, second]))
            .await?;
        assert_eq!(manager.session_binding(&first), None);
        assert_eq!(manager.session_binding(&second), None);
        assert_eq!(manager.session_binding(&kept), Some(flow_id));
        Ok(())
    }

    #[tokio::test]
    async fn remove_flow_cleans_up_everything() -> Result<(), FlowError> {
        let manager = manager_with(None, FlowRuntimeConfig::default());
        let (handle, _mailbox) = fiber_channel(FlowId::random());
        let flow_id = handle.id();
        let session_id = SessionId::random();

        manager.register_fiber(Arc::new(handle));
        manager.add_session_binding(flow_id, session_id).await?;
        manager.signal_flow_has_started(flow_id).await?;
        assert!(manager.has_started(&flow_id));

        manager
            .remove_flow(
                flow_id,
                RemovalReason::Completed,
                FlowStateSnapshot {
                    flow_id,
                    status: FlowStatus::Completed,
                    suspension_count: 3,
                },
            )
            .await?;

        assert_eq!(manager.live_flow_count(), 0);
        assert_eq!(manager.session_binding(&session_id), None);
        assert!(!manager.has_started(&flow_id));
        Ok(())
    }

    #[tokio::test]
    async fn retry_reads_back_the_durable_checkpoint() -> Result<(), FlowError> {
        let checkpoint = Checkpoint::new(json!({"frame": "receive"}));
        let bytes = serde_json::to_vec(&checkpoint)
            .map_err(|e| FlowError::Serialization(e.to_string()))?;
        let manager = manager_with(Some(bytes), FlowRuntimeConfig::default());

        let (handle, mut mailbox) = fiber_channel(FlowId::random());
        let flow_id = handle.id();
        manager.register_fiber(Arc::new(handle));

        manager
            .retry_flow_from_safe_point(FlowStateSnapshot::running(flow_id))
            .await?;

        assert_eq!(
            mailbox.next_event().await,
            Some(Event::RetryFromSafePoint {
                checkpoint: Some(checkpoint)
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn flow_timeout_fires_unless_cancelled() -> Result<(), FlowError> {
        let config = FlowRuntimeConfig {
            flow_timeout_secs: 0,
            sender_uuid: None,
        };
        let manager = manager_with(None, config);

        let (handle, mut mailbox) = fiber_channel(FlowId::random());
        let flow_id = handle.id();
        manager.register_fiber(Arc::new(handle));

        manager.schedule_flow_timeout(flow_id).await?;
        assert_eq!(
            mailbox.next_event().await,
            Some(Event::FlowTimedOut { flow_id })
        );

        manager.schedule_flow_timeout(flow_id).await?;
        manager.cancel_flow_timeout(flow_id).await?;
        sleep(Duration::from_millis(50)).await;
        assert_eq!(mailbox.try_next_event(), None);
        Ok(())
    }
}
