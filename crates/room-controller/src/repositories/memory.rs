//! In-memory document store.
//!
//! Holds every collection behind a single `tokio::sync::RwLock`, so each
//! operation (including the bounded insert) is atomic with respect to the
//! others. Documents are kept ordered by id, matching the ordering of
//! `PgDocumentStore`.
//!
//! Used by the test suites and for running the service without a database.

use super::filter::validate_identifier;
use super::{DocumentStore, Filter, Update};
use crate::errors::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

type Collection = BTreeMap<String, Value>;

#[derive(Debug, Default)]
struct StoreState {
    collections: HashMap<String, Collection>,
    /// Unique fields per collection.
    unique_fields: HashMap<String, BTreeSet<String>>,
}

impl StoreState {
    fn unique_fields(&self, collection: &str) -> impl Iterator<Item = &String> {
        self.unique_fields
            .get(collection)
            .into_iter()
            .flat_map(|fields| fields.iter())
    }

    /// Check that `documents` hold no duplicate non-null value for any
    /// unique field of `collection`.
    fn check_unique(&self, collection: &str, documents: &Collection) -> Result<(), StoreError> {
        for field in self.unique_fields(collection) {
            check_field_unique(collection, field, documents)?;
        }
        Ok(())
    }
}

fn check_field_unique(
    collection: &str,
    field: &str,
    documents: &Collection,
) -> Result<(), StoreError> {
    let mut seen = BTreeSet::new();
    for value in documents.values().filter_map(|doc| doc.get(field)) {
        if value.is_null() {
            continue;
        }
        if !seen.insert(value.to_string()) {
            return Err(StoreError::UniqueViolation(format!(
                "duplicate {}.{}: {}",
                collection, field, value
            )));
        }
    }
    Ok(())
}

/// Process-local `DocumentStore`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection` regardless of content.
    pub async fn len(&self, collection: &str) -> usize {
        self.state
            .read()
            .await
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        limit: Option<u64>,
    ) -> Result<u64, StoreError> {
        filter.validate()?;
        update.validate()?;

        let mut state = self.state.write().await;
        let Some(documents) = state.collections.get(collection) else {
            return Ok(0);
        };

        // Apply to a copy so a uniqueness failure leaves the collection intact
        let mut next = documents.clone();
        let mut modified = 0u64;
        for document in next.values_mut() {
            if limit.is_some_and(|max| modified >= max) {
                break;
            }
            if filter.matches(document) {
                update.apply_to(document);
                modified += 1;
            }
        }

        if modified > 0 {
            state.check_unique(collection, &next)?;
            state.collections.insert(collection.to_string(), next);
        }
        Ok(modified)
    }

    fn insert_locked(
        state: &mut StoreState,
        collection: &str,
        id: &str,
        document: Value,
    ) -> Result<(), StoreError> {
        let documents = state.collections.get(collection);
        if documents.is_some_and(|docs| docs.contains_key(id)) {
            return Err(StoreError::UniqueViolation(format!(
                "duplicate {}.id: {}",
                collection, id
            )));
        }

        for field in state.unique_fields(collection) {
            let Some(value) = document.get(field.as_str()).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = documents
                .into_iter()
                .flat_map(|docs| docs.values())
                .any(|existing| existing.get(field.as_str()) == Some(value));
            if taken {
                return Err(StoreError::UniqueViolation(format!(
                    "duplicate {}.{}: {}",
                    collection, field, value
                )));
            }
        }

        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Value>, StoreError> {
        filter.validate()?;
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.values().find(|doc| filter.matches(doc)))
            .cloned())
    }

    async fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        filter.validate()?;
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        filter.validate()?;
        let state = self.state.read().await;
        Ok(state.collections.get(collection).map_or(0, |docs| {
            docs.values().filter(|doc| filter.matches(doc)).count() as u64
        }))
    }

    async fn insert_one(
        &self,
        collection: &str,
        id: &str,
        document: Value,
    ) -> Result<(), StoreError> {
        validate_identifier(collection)?;
        let mut state = self.state.write().await;
        Self::insert_locked(&mut state, collection, id, document)
    }

    async fn insert_one_bounded(
        &self,
        collection: &str,
        id: &str,
        document: Value,
        limit: u64,
    ) -> Result<bool, StoreError> {
        validate_identifier(collection)?;
        let mut state = self.state.write().await;
        let current = state.collections.get(collection).map_or(0, BTreeMap::len) as u64;
        if current >= limit {
            return Ok(false);
        }
        Self::insert_locked(&mut state, collection, id, document)?;
        Ok(true)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<u64, StoreError> {
        self.update(collection, filter, update, Some(1)).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<u64, StoreError> {
        self.update(collection, filter, update, None).await
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let removed = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id));
        Ok(u64::from(removed.is_some()))
    }

    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        validate_identifier(collection)?;
        validate_identifier(field)?;

        let mut state = self.state.write().await;
        if let Some(documents) = state.collections.get(collection) {
            check_field_unique(collection, field, documents)?;
        }
        state
            .unique_fields
            .entry(collection.to_string())
            .or_default()
            .insert(field.to_string());
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_and_find_ordered_by_id() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_one("rooms", "r2", json!({ "id": "r2", "name": "b" }))
            .await
            .unwrap();
        store
            .insert_one("rooms", "r1", json!({ "id": "r1", "name": "a" }))
            .await
            .unwrap();

        let all = store.find_many("rooms", &Filter::new()).await.unwrap();
        let ids: Vec<&Value> = all.iter().map(|doc| &doc["id"]).collect();
        assert_eq!(ids, [&json!("r1"), &json!("r2")]);

        let found = store
            .find_one("rooms", &Filter::new().eq("name", "b"))
            .await
            .unwrap();
        assert_eq!(found.unwrap()["id"], "r2");
    }

    #[tokio::test]
    async fn test_duplicate_id_is_unique_violation() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_one("rooms", "r1", json!({ "id": "r1" }))
            .await
            .unwrap();

        let err = store
            .insert_one("rooms", "r1", json!({ "id": "r1" }))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_unique_index_rejects_insert_and_update() {
        let store = InMemoryDocumentStore::new();
        store.ensure_unique_index("rooms", "name").await.unwrap();
        store
            .insert_one("rooms", "r1", json!({ "id": "r1", "name": "a" }))
            .await
            .unwrap();
        store
            .insert_one("rooms", "r2", json!({ "id": "r2", "name": "b" }))
            .await
            .unwrap();

        let err = store
            .insert_one("rooms", "r3", json!({ "id": "r3", "name": "a" }))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());

        let err = store
            .update_one("rooms", &Filter::by_id("r2"), &Update::new().set("name", "a"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());

        // Failed update leaves the document untouched
        let r2 = store
            .find_one("rooms", &Filter::by_id("r2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(r2["name"], "b");
    }

    #[tokio::test]
    async fn test_unique_index_ignores_nulls() {
        let store = InMemoryDocumentStore::new();
        store.ensure_unique_index("users", "room").await.unwrap();
        store
            .insert_one("users", "u1", json!({ "id": "u1", "room": null }))
            .await
            .unwrap();
        store
            .insert_one("users", "u2", json!({ "id": "u2", "room": null }))
            .await
            .unwrap();
        assert_eq!(store.len("users").await, 2);
    }

    #[tokio::test]
    async fn test_ensure_unique_index_fails_on_existing_duplicates() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_one("rooms", "r1", json!({ "id": "r1", "creator": "u1" }))
            .await
            .unwrap();
        store
            .insert_one("rooms", "r2", json!({ "id": "r2", "creator": "u1" }))
            .await
            .unwrap();

        let err = store.ensure_unique_index("rooms", "creator").await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_bounded_insert_stops_at_limit() {
        let store = InMemoryDocumentStore::new();
        assert!(store
            .insert_one_bounded("rooms", "r1", json!({ "id": "r1" }), 2)
            .await
            .unwrap());
        assert!(store
            .insert_one_bounded("rooms", "r2", json!({ "id": "r2" }), 2)
            .await
            .unwrap());
        assert!(!store
            .insert_one_bounded("rooms", "r3", json!({ "id": "r3" }), 2)
            .await
            .unwrap());
        assert_eq!(store.len("rooms").await, 2);
    }

    #[tokio::test]
    async fn test_update_one_touches_single_document() {
        let store = InMemoryDocumentStore::new();
        for id in ["u1", "u2"] {
            store
                .insert_one("users", id, json!({ "id": id, "status": "watching" }))
                .await
                .unwrap();
        }

        let filter = Filter::new().eq("status", "watching");
        let modified = store
            .update_one("users", &filter, &Update::new().set("status", "idle"))
            .await
            .unwrap();
        assert_eq!(modified, 1);
        assert_eq!(store.count("users", &filter).await.unwrap(), 1);

        let modified = store
            .update_many("users", &filter, &Update::new().set("status", "idle"))
            .await
            .unwrap();
        assert_eq!(modified, 1);
        assert_eq!(store.count("users", &filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let store = InMemoryDocumentStore::new();
        assert_eq!(store.count("rooms", &Filter::new()).await.unwrap(), 0);
        assert!(store
            .find_one("rooms", &Filter::by_id("r1"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.delete_by_id("rooms", "r1").await.unwrap(), 0);
        assert_eq!(
            store
                .update_many("rooms", &Filter::new(), &Update::new().set("name", "x"))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_invalid_field_rejected() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .find_many("rooms", &Filter::new().eq("na me", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidField(_)));
    }
}
