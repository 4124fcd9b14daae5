//! Repository layer for Room Controller.
//!
//! Follows the Handler -> Service -> Repository architecture. The
//! coordinator talks to typed repositories (`RoomsRepository`,
//! `ActiveUsersRepository`), which translate entities to JSON documents and
//! issue filter-based operations against a `DocumentStore`.
//!
//! # Implementations
//!
//! - `postgres` - `PgDocumentStore`, one JSONB `documents` table
//! - `memory` - `InMemoryDocumentStore`, for tests and local runs

pub mod active_users;
pub mod filter;
pub mod memory;
pub mod postgres;
pub mod rooms;

use crate::errors::StoreError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub use active_users::ActiveUsersRepository;
pub use filter::{Condition, Filter, Update};
pub use memory::InMemoryDocumentStore;
pub use postgres::PgDocumentStore;
pub use rooms::RoomsRepository;

/// Collection holding `Room` documents.
pub const ROOMS_COLLECTION: &str = "rooms";

/// Collection holding `ActiveUser` documents.
pub const ACTIVE_USERS_COLLECTION: &str = "active_users";

/// Filter-keyed document persistence.
///
/// Documents are JSON objects carrying their own `id` key. Implementations
/// hold no business logic; every invariant is enforced by the caller except
/// unique indexes registered through `ensure_unique_index`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// First document matching `filter` (ordered by id).
    async fn find_one(&self, collection: &str, filter: &Filter)
        -> Result<Option<Value>, StoreError>;

    /// All documents matching `filter`, ordered by id.
    async fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// Insert a new document. A duplicate `id` or a unique index conflict
    /// fails with `StoreError::UniqueViolation`.
    async fn insert_one(&self, collection: &str, id: &str, document: Value)
        -> Result<(), StoreError>;

    /// Insert only while the collection holds fewer than `limit` documents.
    ///
    /// The count and the insert are one atomic step. Returns `false` when the
    /// limit was reached and nothing was written.
    async fn insert_one_bounded(
        &self,
        collection: &str,
        id: &str,
        document: Value,
        limit: u64,
    ) -> Result<bool, StoreError>;

    /// Apply `update` to the first matching document. Returns the number of
    /// documents modified (0 or 1).
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<u64, StoreError>;

    /// Apply `update` to every matching document.
    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<u64, StoreError>;

    /// Returns the number of documents removed (0 or 1).
    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<u64, StoreError>;

    /// Make `field` unique within `collection`. Idempotent. Documents where
    /// the field is `null` are not constrained.
    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError>;

    /// Connectivity probe.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Encode an entity as a store document.
pub(crate) fn to_document<T: Serialize>(entity: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(entity)?)
}

/// Decode a store document into an entity.
pub(crate) fn from_document<T: DeserializeOwned>(document: Value) -> Result<T, StoreError> {
    Ok(serde_json::from_value(document)?)
}
