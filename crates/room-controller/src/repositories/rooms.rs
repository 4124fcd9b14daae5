//! Rooms repository.
//!
//! Typed access to the `rooms` collection.

use super::{from_document, to_document, DocumentStore, Filter, Update, ROOMS_COLLECTION};
use crate::errors::StoreError;
use crate::models::{room_fields, Room, RoomStatus};
use std::sync::Arc;
use tracing::instrument;

/// Repository for room documents.
#[derive(Clone)]
pub struct RoomsRepository {
    store: Arc<dyn DocumentStore>,
}

impl RoomsRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    #[instrument(skip_all, name = "rc.repo.rooms.count")]
    pub async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.store.count(ROOMS_COLLECTION, filter).await
    }

    pub async fn count_by_creator(&self, creator: &str) -> Result<u64, StoreError> {
        self.count(&Filter::new().eq(room_fields::CREATOR, creator))
            .await
    }

    #[instrument(skip_all, name = "rc.repo.rooms.find_one")]
    pub async fn find_one(&self, filter: &Filter) -> Result<Option<Room>, StoreError> {
        self.store
            .find_one(ROOMS_COLLECTION, filter)
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Room>, StoreError> {
        self.find_one(&Filter::by_id(id)).await
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Room>, StoreError> {
        self.find_one(&Filter::new().eq(room_fields::NAME, name))
            .await
    }

    /// Room `id` owned by `creator`, if any.
    pub async fn find_owned(&self, id: &str, creator: &str) -> Result<Option<Room>, StoreError> {
        self.find_one(&Filter::by_id(id).eq(room_fields::CREATOR, creator))
            .await
    }

    /// A room named `name` other than `exclude_id`.
    pub async fn find_name_holder(
        &self,
        name: &str,
        exclude_id: &str,
    ) -> Result<Option<Room>, StoreError> {
        self.find_one(
            &Filter::new()
                .eq(room_fields::NAME, name)
                .ne(room_fields::ID, exclude_id),
        )
        .await
    }

    #[instrument(skip_all, name = "rc.repo.rooms.list")]
    pub async fn list(&self, filter: &Filter) -> Result<Vec<Room>, StoreError> {
        self.store
            .find_many(ROOMS_COLLECTION, filter)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    /// Solo rooms not created by `user_id`.
    pub async fn list_pk_candidates(&self, user_id: &str) -> Result<Vec<Room>, StoreError> {
        self.list(
            &Filter::new()
                .eq(room_fields::STATUS, RoomStatus::Single.as_str())
                .ne(room_fields::CREATOR, user_id),
        )
        .await
    }

    #[instrument(skip_all, name = "rc.repo.rooms.insert", fields(room_id = %room.id))]
    pub async fn insert(&self, room: &Room) -> Result<(), StoreError> {
        self.store
            .insert_one(ROOMS_COLLECTION, &room.id, to_document(room)?)
            .await
    }

    /// Insert while fewer than `limit` rooms exist. Returns `false` at the limit.
    #[instrument(skip_all, name = "rc.repo.rooms.insert_bounded", fields(room_id = %room.id))]
    pub async fn insert_bounded(&self, room: &Room, limit: u64) -> Result<bool, StoreError> {
        self.store
            .insert_one_bounded(ROOMS_COLLECTION, &room.id, to_document(room)?, limit)
            .await
    }

    /// Overwrite every mutable field of the stored room with `room`.
    #[instrument(skip_all, name = "rc.repo.rooms.save", fields(room_id = %room.id))]
    pub async fn save(&self, room: &Room) -> Result<u64, StoreError> {
        let update = Update::new()
            .set(room_fields::NAME, room.name.as_str())
            .set(room_fields::STATUS, room.status.as_str())
            .set(room_fields::RTC_ROOM, room.rtc_room.as_str())
            .set(room_fields::PLAY_URL, room.play_url.as_str())
            .set(room_fields::PK_ANCHOR, room.pk_anchor.clone());

        self.store
            .update_one(ROOMS_COLLECTION, &Filter::by_id(&room.id), &update)
            .await
    }

    #[instrument(skip_all, name = "rc.repo.rooms.delete", fields(room_id = %id))]
    pub async fn delete(&self, id: &str) -> Result<u64, StoreError> {
        self.store.delete_by_id(ROOMS_COLLECTION, id).await
    }

    /// Unique indexes backing name and one-room-per-creator.
    pub async fn ensure_unique_indexes(&self) -> Result<(), StoreError> {
        self.store
            .ensure_unique_index(ROOMS_COLLECTION, room_fields::NAME)
            .await?;
        self.store
            .ensure_unique_index(ROOMS_COLLECTION, room_fields::CREATOR)
            .await
    }
}
