//! In-memory state store implementation for the Weir flow runtime
//!
//! This crate provides an in-memory implementation of the `Database`
//! interfaces defined in the weir-core crate. It is primarily useful for
//! development and testing: transactions buffer their writes and apply
//! them on commit, so pre-commit state is never observable, and a commit
//! failure can be injected to exercise recovery paths.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use weir_core::domain::flow::FlowId;
use weir_core::domain::messaging::DeduplicationId;
use weir_core::domain::repository::{CheckpointStorage, Database, DatabaseTransaction};
use weir_core::error::StorageError;

#[derive(Default)]
struct Store {
    checkpoints: HashMap<FlowId, Vec<u8>>,
    deduplication_facts: HashSet<String>,
}

/// In-memory node database with transactional semantics
#[derive(Default)]
pub struct InMemoryDatabase {
    store: Arc<RwLock<Store>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryDatabase {
    /// An empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed checkpoint for a flow, if any
    pub fn checkpoint(&self, id: &FlowId) -> Option<Vec<u8>> {
        self.store.read().checkpoints.get(id).cloned()
    }

    /// Number of committed checkpoints
    pub fn checkpoint_count(&self) -> usize {
        self.store.read().checkpoints.len()
    }

    /// Whether a deduplication fact has been committed
    pub fn has_deduplication_fact(&self, key: &DeduplicationId) -> bool {
        self.store.read().deduplication_facts.contains(&key.0)
    }

    /// Make the next commit fail, to exercise recovery paths in tests
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn begin_transaction(&self) -> Result<Box<dyn DatabaseTransaction>, StorageError> {
        Ok(Box::new(InMemoryTransaction {
            store: Arc::clone(&self.store),
            fail_next_commit: Arc::clone(&self.fail_next_commit),
            writes: Vec::new(),
            facts: Vec::new(),
        }))
    }

    async fn load_checkpoint(&self, id: &FlowId) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.store.read().checkpoints.get(id).cloned())
    }
}

enum Write {
    Add(FlowId, Vec<u8>),
    Update(FlowId, Vec<u8>),
    Remove(FlowId),
}

/// A transaction over the in-memory database; writes are buffered and
/// only become visible on commit
pub struct InMemoryTransaction {
    store: Arc<RwLock<Store>>,
    fail_next_commit: Arc<AtomicBool>,
    writes: Vec<Write>,
    facts: Vec<String>,
}

impl InMemoryTransaction {
    // Whether a checkpoint exists from this transaction's point of view:
    // committed state overlaid with the buffered writes, last write wins
    fn checkpoint_exists(&self, id: &FlowId) -> bool {
        let mut exists = self.store.read().checkpoints.contains_key(id);
        for write in &self.writes {
            match write {
                Write::Add(written, _) | Write::Update(written, _) if written == id => {
                    exists = true;
                }
                Write::Remove(written) if written == id => exists = false,
                _ => {}
            }
        }
        exists
    }
}

#[async_trait]
impl CheckpointStorage for InMemoryTransaction {
    async fn add_checkpoint(
        &mut self,
        id: &FlowId,
        checkpoint: Vec<u8>,
    ) -> Result<(), StorageError> {
        if self.checkpoint_exists(id) {
            return Err(StorageError::CheckpointAlreadyExists(id.to_string()));
        }
        self.writes.push(Write::Add(*id, checkpoint));
        Ok(())
    }

    async fn update_checkpoint(
        &mut self,
        id: &FlowId,
        checkpoint: Vec<u8>,
    ) -> Result<(), StorageError> {
        if !self.checkpoint_exists(id) {
            return Err(StorageError::CheckpointNotFound(id.to_string()));
        }
        self.writes.push(Write::Update(*id, checkpoint));
        Ok(())
    }

    async fn remove_checkpoint(&mut self, id: &FlowId) -> Result<bool, StorageError> {
        if !self.checkpoint_exists(id) {
            return Ok(false);
        }
        self.writes.push(Write::Remove(*id));
        Ok(true)
    }
}

#[async_trait]
impl DatabaseTransaction for InMemoryTransaction {
    async fn record_deduplication_fact(
        &mut self,
        key: &DeduplicationId,
    ) -> Result<(), StorageError> {
        self.facts.push(key.0.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StorageError::CommitFailed(
                "injected commit failure".to_string(),
            ));
        }

        let mut store = self.store.write();

        // Re-validate against committed state before applying, so a
        // violation by a concurrent transaction leaves nothing behind
        let mut overlay: HashMap<FlowId, bool> = HashMap::new();
        for write in &self.writes {
            let id = match write {
                Write::Add(id, _) | Write::Update(id, _) | Write::Remove(id) => *id,
            };
            let exists = overlay
                .get(&id)
                .copied()
                .unwrap_or_else(|| store.checkpoints.contains_key(&id));
            match write {
                Write::Add(..) => {
                    if exists {
                        return Err(StorageError::CheckpointAlreadyExists(id.to_string()));
                    }
                    overlay.insert(id, true);
                }
                Write::Update(..) => {
                    if !exists {
                        return Err(StorageError::CheckpointNotFound(id.to_string()));
                    }
                }
                Write::Remove(..) => {
                    overlay.insert(id, false);
                }
            }
        }

        let write_count = self.writes.len();
        for write in self.writes {
            match write {
                Write::Add(id, bytes) | Write::Update(id, bytes) => {
                    store.checkpoints.insert(id, bytes);
                }
                Write::Remove(id) => {
                    store.checkpoints.remove(&id);
                }
            }
        }
        for fact in self.facts {
            store.deduplication_facts.insert(fact);
        }
        debug!(writes = write_count, "committed transaction");
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        debug!(writes = self.writes.len(), "rolled back transaction");
    }
}
