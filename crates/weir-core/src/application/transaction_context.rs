//! The ambient database transaction, carried explicitly.
//!
//! Each fiber owns one `TransactionContext` that action execution threads
//! through by mutable reference. The context holds at most one open
//! transaction; commit and rollback take the transaction out of the slot
//! before consuming it, so nothing stays bound regardless of outcome.

use crate::domain::repository::DatabaseTransaction;
use crate::error::FlowError;

/// Per-fiber slot for the ambient database transaction
#[derive(Default)]
pub struct TransactionContext {
    current: Option<Box<dyn DatabaseTransaction>>,
}

impl TransactionContext {
    /// An empty context with no transaction bound
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a transaction is currently bound
    pub fn is_bound(&self) -> bool {
        self.current.is_some()
    }

    /// Bind a freshly opened transaction. Binding over an existing one is
    /// a programming error: the caller must commit or roll back first.
    pub fn bind(&mut self, transaction: Box<dyn DatabaseTransaction>) -> Result<(), FlowError> {
        if self.current.is_some() {
            return Err(FlowError::Programming(
                "a database transaction is already bound to this fiber".to_string(),
            ));
        }
        self.current = Some(transaction);
        Ok(())
    }

    /// Take the bound transaction out of the context, if any
    pub fn unbind(&mut self) -> Option<Box<dyn DatabaseTransaction>> {
        self.current.take()
    }

    /// The bound transaction, for operations that must run inside it
    pub fn current_mut(&mut self) -> Result<&mut (dyn DatabaseTransaction + '_), FlowError> {
        match self.current.as_deref_mut() {
            Some(transaction) => Ok(transaction),
            None => Err(FlowError::Programming(
                "no database transaction is bound to this fiber".to_string(),
            )),
        }
    }
}
