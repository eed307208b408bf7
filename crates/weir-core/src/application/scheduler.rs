//! Central delayed-event delivery.
//!
//! Sleeps and flow timeouts are both modelled as an event scheduled for
//! later delivery: the flow enters a waiting state and the scheduler
//! delivers the event at the deadline. Cancellation is a single
//! unschedule call, which is what makes sleeping flows interruptible.

use crate::domain::event::Event;
use crate::domain::flow::FlowId;
use crate::domain::repository::FlowFiber;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

struct PendingDelivery {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Schedules at most one pending event delivery per flow
#[derive(Default)]
pub struct EventScheduler {
    pending: Arc<Mutex<HashMap<FlowId, PendingDelivery>>>,
    generations: AtomicU64,
}

impl EventScheduler {
    /// A scheduler with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to the fiber after `delay`, replacing any delivery
    /// already pending for the same flow
    pub fn schedule(&self, fiber: Arc<dyn FlowFiber>, delay: Duration, event: Event) {
        let flow_id = fiber.id();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fiber.schedule_event(event);

            // Deregister, unless a newer delivery has replaced this one
            let mut pending = pending.lock();
            if pending
                .get(&flow_id)
                .is_some_and(|delivery| delivery.generation == generation)
            {
                pending.remove(&flow_id);
            }
        });

        let previous = self.pending.lock().insert(
            flow_id,
            PendingDelivery { generation, handle },
        );
        if let Some(previous) = previous {
            debug!(%flow_id, "replacing pending delivery");
            previous.handle.abort();
        }
    }

    /// Drop the pending delivery for a flow; returns whether one existed
    pub fn cancel(&self, flow_id: &FlowId) -> bool {
        match self.pending.lock().remove(flow_id) {
            Some(delivery) => {
                delivery.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Number of deliveries currently pending
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fiber::fiber_channel;
    use tokio::time::sleep;

    #[tokio::test]
    async fn delivers_the_event_after_the_delay() {
        let scheduler = EventScheduler::new();
        let (handle, mut mailbox) = fiber_channel(FlowId::random());

        scheduler.schedule(
            Arc::new(handle),
            Duration::from_millis(20),
            Event::Wakeup,
        );
        assert_eq!(mailbox.try_next_event(), None);

        assert_eq!(mailbox.next_event().await, Some(Event::Wakeup));
        sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn cancel_prevents_delivery() {
        let scheduler = EventScheduler::new();
        let (handle, mut mailbox) = fiber_channel(FlowId::random());
        let flow_id = handle.id();

        scheduler.schedule(
            Arc::new(handle),
            Duration::from_millis(50),
            Event::Wakeup,
        );
        assert!(scheduler.cancel(&flow_id));

        sleep(Duration::from_millis(100)).await;
        assert_eq!(mailbox.try_next_event(), None);
        assert!(!scheduler.cancel(&flow_id));
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_pending_delivery() {
        let scheduler = EventScheduler::new();
        let (handle, mut mailbox) = fiber_channel(FlowId::random());
        let fiber: Arc<dyn FlowFiber> = Arc::new(handle);

        scheduler.schedule(
            Arc::clone(&fiber),
            Duration::from_millis(50),
            Event::Wakeup,
        );
        scheduler.schedule(
            Arc::clone(&fiber),
            Duration::from_millis(10),
            Event::FlowTimedOut { flow_id: fiber.id() },
        );

        assert_eq!(
            mailbox.next_event().await,
            Some(Event::FlowTimedOut { flow_id: fiber.id() })
        );
        sleep(Duration::from_millis(100)).await;
        assert_eq!(mailbox.try_next_event(), None);
    }
}
