//! Fault-injecting document store.
//!
//! Wraps any `DocumentStore` and fails selected operations with a
//! `StoreError::Database`, so tests can break one step of a multi-step
//! coordinator operation and observe the result.
//!
//! # Example
//!
//! ```rust,ignore
//! let store = Arc::new(FaultyStore::in_memory());
//! store.fail_on(StoreOp::UpdateMany, ACTIVE_USERS_COLLECTION);
//!
//! let outcome = coordinator.close_room("u1", "r1").await?;
//! assert_eq!(outcome.warnings.len(), 1);
//! ```

use async_trait::async_trait;
use room_controller::errors::StoreError;
use room_controller::repositories::{DocumentStore, Filter, InMemoryDocumentStore, Update};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Document store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    FindOne,
    FindMany,
    Count,
    InsertOne,
    InsertOneBounded,
    UpdateOne,
    UpdateMany,
    DeleteById,
    EnsureUniqueIndex,
    Ping,
}

#[derive(Debug, Default)]
struct FaultState {
    /// `(op, None)` fails the op on every collection.
    failures: HashSet<(StoreOp, Option<String>)>,
    calls: HashMap<StoreOp, usize>,
}

/// `DocumentStore` wrapper with switchable failures.
pub struct FaultyStore {
    inner: Arc<dyn DocumentStore>,
    state: Mutex<FaultState>,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            state: Mutex::new(FaultState::default()),
        }
    }

    /// Wrap a fresh `InMemoryDocumentStore`.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryDocumentStore::new()))
    }

    /// Fail `op` on `collection` until healed.
    pub fn fail_on(&self, op: StoreOp, collection: &str) {
        self.lock()
            .failures
            .insert((op, Some(collection.to_string())));
    }

    /// Fail `op` on every collection until healed.
    pub fn fail_on_all(&self, op: StoreOp) {
        self.lock().failures.insert((op, None));
    }

    /// Remove every injected failure.
    pub fn heal(&self) {
        self.lock().failures.clear();
    }

    /// Number of times `op` was invoked (including failed calls).
    pub fn calls(&self, op: StoreOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FaultState> {
        self.state.lock().expect("fault state lock poisoned")
    }

    fn check(&self, op: StoreOp, collection: Option<&str>) -> Result<(), StoreError> {
        let mut state = self.lock();
        *state.calls.entry(op).or_insert(0) += 1;

        let scoped = collection
            .map(|c| state.failures.contains(&(op, Some(c.to_string()))))
            .unwrap_or(false);
        if scoped || state.failures.contains(&(op, None)) {
            return Err(StoreError::Database(format!(
                "injected failure: {:?} on {}",
                op,
                collection.unwrap_or("*")
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Value>, StoreError> {
        self.check(StoreOp::FindOne, Some(collection))?;
        self.inner.find_one(collection, filter).await
    }

    async fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        self.check(StoreOp::FindMany, Some(collection))?;
        self.inner.find_many(collection, filter).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.check(StoreOp::Count, Some(collection))?;
        self.inner.count(collection, filter).await
    }

    async fn insert_one(
        &self,
        collection: &str,
        id: &str,
        document: Value,
    ) -> Result<(), StoreError> {
        self.check(StoreOp::InsertOne, Some(collection))?;
        self.inner.insert_one(collection, id, document).await
    }

    async fn insert_one_bounded(
        &self,
        collection: &str,
        id: &str,
        document: Value,
        limit: u64,
    ) -> Result<bool, StoreError> {
        self.check(StoreOp::InsertOneBounded, Some(collection))?;
        self.inner
            .insert_one_bounded(collection, id, document, limit)
            .await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<u64, StoreError> {
        self.check(StoreOp::UpdateOne, Some(collection))?;
        self.inner.update_one(collection, filter, update).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<u64, StoreError> {
        self.check(StoreOp::UpdateMany, Some(collection))?;
        self.inner.update_many(collection, filter, update).await
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<u64, StoreError> {
        self.check(StoreOp::DeleteById, Some(collection))?;
        self.inner.delete_by_id(collection, id).await
    }

    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        self.check(StoreOp::EnsureUniqueIndex, Some(collection))?;
        self.inner.ensure_unique_index(collection, field).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check(StoreOp::Ping, None)?;
        self.inner.ping().await
    }
}
