//! The fiber's event mailbox.
//!
//! A fiber is modelled as an owned task with a FIFO, single-consumer
//! mailbox: the handle side implements [`FlowFiber`] and is shared with
//! the executor and scheduler, the mailbox side is consumed by the state
//! machine driving the flow.

use crate::domain::event::Event;
use crate::domain::flow::FlowId;
use crate::domain::repository::FlowFiber;
use tokio::sync::mpsc;
use tracing::debug;

/// Sending side of a fiber's mailbox
#[derive(Debug, Clone)]
pub struct FiberHandle {
    id: FlowId,
    sender: mpsc::UnboundedSender<Event>,
}

impl FlowFiber for FiberHandle {
    fn id(&self) -> FlowId {
        self.id
    }

    fn schedule_event(&self, event: Event) {
        // The mailbox disappears when the flow is removed; late events
        // (async completions after a retry, stale wakeups) are dropped.
        if self.sender.send(event).is_err() {
            debug!(flow_id = %self.id, "dropping event for removed fiber");
        }
    }
}

/// Receiving side of a fiber's mailbox
#[derive(Debug)]
pub struct EventMailbox {
    id: FlowId,
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl EventMailbox {
    /// The flow this mailbox belongs to
    pub fn id(&self) -> FlowId {
        self.id
    }

    /// Wait for the next event; `None` once every handle is gone
    pub async fn next_event(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Take the next event if one is already queued
    pub fn try_next_event(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

/// Create the two halves of a fiber's mailbox
pub fn fiber_channel(id: FlowId) -> (FiberHandle, EventMailbox) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (FiberHandle { id, sender }, EventMailbox { id, receiver })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::OperationResult;
    use serde_json::json;

    #[tokio::test]
    async fn events_are_delivered_in_scheduling_order() {
        let (handle, mut mailbox) = fiber_channel(FlowId::random());

        handle.schedule_event(Event::Wakeup);
        handle.schedule_event(Event::AsyncOperationCompletion {
            result: OperationResult(json!(1)),
        });
        handle.schedule_event(Event::AsyncOperationCompletion {
            result: OperationResult(json!(2)),
        });

        assert_eq!(mailbox.next_event().await, Some(Event::Wakeup));
        assert_eq!(
            mailbox.next_event().await,
            Some(Event::AsyncOperationCompletion {
                result: OperationResult(json!(1))
            })
        );
        assert_eq!(
            mailbox.next_event().await,
            Some(Event::AsyncOperationCompletion {
                result: OperationResult(json!(2))
            })
        );
        assert_eq!(mailbox.try_next_event(), None);
    }

    #[tokio::test]
    async fn scheduling_on_a_closed_mailbox_does_not_panic() {
        let (handle, mailbox) = fiber_channel(FlowId::random());
        drop(mailbox);
        handle.schedule_event(Event::Wakeup);
    }

    #[tokio::test]
    async fn events_pass_through_unchanged() {
        let (handle, mut mailbox) = fiber_channel(FlowId::random());
        let event = Event::AsyncOperationCompletion {
            result: OperationResult(json!({"nested": ["values", 3]})),
        };
        handle.schedule_event(event.clone());
        assert_eq!(mailbox.next_event().await, Some(event));
    }
}
