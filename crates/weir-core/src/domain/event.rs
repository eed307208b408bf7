use crate::domain::checkpoint::Checkpoint;
use crate::domain::flow::{FlowId, TransactionHash};
use crate::error::FlowError;
use serde::{Deserialize, Serialize};

/// Result produced by a completed async operation, opaque to the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult(pub serde_json::Value);

/// Asynchronous results fed back into a fiber's state machine.
///
/// Events are delivered through the fiber's mailbox in FIFO order relative
/// to their scheduling time; the state machine consumes them one at a
/// time.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A tracked ledger transaction has committed
    TransactionCommitted {
        /// Hash the flow subscribed to
        hash: TransactionHash,
    },

    /// An async operation finished successfully
    AsyncOperationCompletion {
        /// The operation's result
        result: OperationResult,
    },

    /// An async operation finished with a failure
    AsyncOperationThrows {
        /// The captured failure
        error: FlowError,
    },

    /// A failure that the state machine must classify
    Error {
        /// The failure being surfaced
        error: FlowError,
    },

    /// A sleep deadline has passed
    Wakeup,

    /// The flow's armed timeout has fired
    FlowTimedOut {
        /// The flow that timed out
        flow_id: FlowId,
    },

    /// The flow should restart from its last durable checkpoint
    RetryFromSafePoint {
        /// The checkpoint read back from storage, if one exists
        checkpoint: Option<Checkpoint>,
    },
}
