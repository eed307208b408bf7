//! Test utilities for the Weir flow runtime
//!
//! This crate provides recording mocks for the weir-core interfaces and a
//! harness builder that wires an action executor over them plus the
//! in-memory database. It is a dev-dependency of the other crates; none
//! of this ships in a node.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Harness builders
pub mod builders;

/// Mock and recording implementations
pub mod implementations;

pub use builders::ExecutorHarness;
pub use implementations::{
    collecting_fiber, AsyncOperationBehaviour, CollectingFiber, ManagerCall, ManualClock,
    RecordingDeduplicationHandler, RecordingFlowMessaging, RecordingManager,
    RecordingSoftLockRegistry, SentMessage, StubAsyncOperation, StubTransactionTracker,
};
