//! Application services: the action executor and the runtime scaffolding
//! it executes against.

/// The action executor
pub mod action_executor;

/// Fiber mailboxes
pub mod fiber;

/// Delayed event delivery
pub mod scheduler;

/// Runtime bookkeeping for live flows
pub mod state_machine_manager;

/// The ambient database transaction slot
pub mod transaction_context;
