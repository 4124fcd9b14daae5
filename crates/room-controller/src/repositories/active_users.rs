//! Active users repository.

use super::{
    from_document, to_document, DocumentStore, Filter, Update, ACTIVE_USERS_COLLECTION,
};
use crate::errors::StoreError;
use crate::models::{user_fields, ActiveUser, UserStatus};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

/// Repository for presence records.
#[derive(Clone)]
pub struct ActiveUsersRepository {
    store: Arc<dyn DocumentStore>,
}

impl ActiveUsersRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    #[instrument(skip_all, name = "rc.repo.users.find", fields(user_id = %id))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<ActiveUser>, StoreError> {
        self.store
            .find_one(ACTIVE_USERS_COLLECTION, &Filter::by_id(id))
            .await?
            .map(from_document)
            .transpose()
    }

    #[instrument(skip_all, name = "rc.repo.users.insert", fields(user_id = %user.id))]
    pub async fn insert(&self, user: &ActiveUser) -> Result<(), StoreError> {
        self.store
            .insert_one(ACTIVE_USERS_COLLECTION, &user.id, to_document(user)?)
            .await
    }

    /// Set `status`, `room` and optionally clear `joinPosition` for one user.
    #[instrument(skip_all, name = "rc.repo.users.set_presence", fields(user_id = %id))]
    pub async fn set_presence(
        &self,
        id: &str,
        status: UserStatus,
        room: Option<&str>,
        clear_join_position: bool,
    ) -> Result<u64, StoreError> {
        let mut update = Update::new()
            .set(user_fields::STATUS, status.as_str())
            .set(user_fields::ROOM, room);
        if clear_join_position {
            update = update.set(user_fields::JOIN_POSITION, Value::Null);
        }

        self.store
            .update_one(ACTIVE_USERS_COLLECTION, &Filter::by_id(id), &update)
            .await
    }

    /// Filter selecting the audience of `room_id`.
    pub fn audience_filter(room_id: &str) -> Filter {
        Filter::new().eq(user_fields::ROOM, room_id).is_in(
            user_fields::STATUS,
            UserStatus::AUDIENCE.iter().map(UserStatus::as_str),
        )
    }

    pub async fn count_audience(&self, room_id: &str) -> Result<u64, StoreError> {
        self.store
            .count(ACTIVE_USERS_COLLECTION, &Self::audience_filter(room_id))
            .await
    }

    #[instrument(skip_all, name = "rc.repo.users.list_audience", fields(room_id = %room_id))]
    pub async fn list_audience(&self, room_id: &str) -> Result<Vec<ActiveUser>, StoreError> {
        self.store
            .find_many(ACTIVE_USERS_COLLECTION, &Self::audience_filter(room_id))
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    /// Return every audience member of `room_id` to idle.
    #[instrument(skip_all, name = "rc.repo.users.release_audience", fields(room_id = %room_id))]
    pub async fn release_audience(&self, room_id: &str) -> Result<u64, StoreError> {
        let update = Update::new()
            .set(user_fields::STATUS, UserStatus::Idle.as_str())
            .set(user_fields::ROOM, Value::Null)
            .set(user_fields::JOIN_POSITION, Value::Null);

        self.store
            .update_many(
                ACTIVE_USERS_COLLECTION,
                &Self::audience_filter(room_id),
                &update,
            )
            .await
    }
}
