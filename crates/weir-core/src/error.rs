use thiserror::Error;

/// Errors raised by the durable storage layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A checkpoint was added twice for the same flow
    #[error("checkpoint already exists for flow {0}")]
    CheckpointAlreadyExists(String),

    /// An update was issued for a flow that has no checkpoint
    #[error("no checkpoint to update for flow {0}")]
    CheckpointNotFound(String),

    /// The database transaction failed to commit
    #[error("database transaction failed to commit: {0}")]
    CommitFailed(String),

    /// Any other storage failure
    #[error("storage error: {0}")]
    Other(String),
}

/// Errors raised by the flow messaging substrate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    /// A session message could not be handed to the substrate
    #[error("failed to send session message to {peer}: {reason}")]
    SendFailed {
        /// The intended recipient
        peer: String,
        /// Why the send was rejected
        reason: String,
    },

    /// A post-commit broker acknowledgement failed
    #[error("failed to acknowledge message: {0}")]
    AcknowledgementFailed(String),

    /// Any other messaging failure
    #[error("messaging error: {0}")]
    Other(String),
}

/// Error type surfaced from action execution to the state machine layer,
/// which classifies failures as retryable, fatal, or grounds for
/// hospitalizing the flow
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// A contract of the runtime itself was violated; fatal
    #[error("programming error: {0}")]
    Programming(String),

    /// Durable storage failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The messaging substrate failed
    #[error(transparent)]
    Messaging(#[from] MessagingError),

    /// A checkpoint could not be marshalled
    #[error("checkpoint serialization error: {0}")]
    Serialization(String),

    /// An async operation failed synchronously while being started; the
    /// state machine decides whether to retry or hospitalize
    #[error("async operation failed to transition: {0}")]
    AsyncOperationTransition(Box<FlowError>),

    /// Any other failure
    #[error("{0}")]
    Other(String),
}
