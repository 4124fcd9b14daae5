//! Coordinator fixtures.
//!
//! `TestContext` bundles a `RoomCoordinator` with the store it runs on and
//! offers seeding helpers that write documents directly, bypassing the
//! coordinator's guards. `RoomFixture` builds rooms.

use room_controller::models::{ActiveUser, Room, RoomStatus, UserStatus};
use room_controller::repositories::{
    DocumentStore, Filter, InMemoryDocumentStore, ACTIVE_USERS_COLLECTION, ROOMS_COLLECTION,
};
use room_controller::services::{CoordinatorSettings, RoomCoordinator};
use std::sync::Arc;

/// Generate a unique room ID.
pub fn unique_room_id() -> String {
    format!("room-{}", uuid::Uuid::new_v4())
}

/// Builder for `Room` values.
#[derive(Debug, Clone)]
pub struct RoomFixture {
    room: Room,
}

impl RoomFixture {
    /// A solo room `id` named `name` created by `creator`.
    pub fn new(id: &str, name: &str, creator: &str) -> Self {
        Self {
            room: Room::new(id, name, creator),
        }
    }

    /// A solo room with a generated ID.
    pub fn named(name: &str, creator: &str) -> Self {
        Self::new(&unique_room_id(), name, creator)
    }

    /// Put the room in a PK battle against `anchor`.
    pub fn pk(mut self, anchor: &str) -> Self {
        self.room.status = RoomStatus::Pk;
        self.room.pk_anchor = Some(anchor.to_string());
        self
    }

    pub fn rtc(mut self, rtc_room: &str, play_url: &str) -> Self {
        self.room.rtc_room = rtc_room.to_string();
        self.room.play_url = play_url.to_string();
        self
    }

    pub fn build(self) -> Room {
        self.room
    }
}

/// Coordinator plus the store it runs on.
pub struct TestContext {
    pub store: Arc<dyn DocumentStore>,
    pub coordinator: RoomCoordinator,
}

impl TestContext {
    /// Default settings over a fresh in-memory store.
    pub async fn new() -> Self {
        Self::with_settings(CoordinatorSettings::default()).await
    }

    /// Room number limit `limit`, uniqueness not enforced.
    pub async fn with_limit(limit: u64) -> Self {
        Self::with_settings(CoordinatorSettings {
            room_number_limit: limit,
            ..CoordinatorSettings::default()
        })
        .await
    }

    /// Uniqueness enforced by the store.
    pub async fn strict() -> Self {
        Self::with_settings(CoordinatorSettings {
            uniqueness_enforced: true,
            ..CoordinatorSettings::default()
        })
        .await
    }

    pub async fn with_settings(settings: CoordinatorSettings) -> Self {
        Self::with_store(Arc::new(InMemoryDocumentStore::new()), settings).await
    }

    /// Run the coordinator over `store` (e.g. a `FaultyStore`).
    pub async fn with_store(store: Arc<dyn DocumentStore>, settings: CoordinatorSettings) -> Self {
        let coordinator = RoomCoordinator::new(Arc::clone(&store), settings);
        coordinator
            .prepare_store()
            .await
            .expect("failed to prepare store");
        Self { store, coordinator }
    }

    /// Register idle users.
    pub async fn register(&self, user_ids: &[&str]) {
        for id in user_ids {
            self.coordinator
                .register_user(id)
                .await
                .expect("failed to register user");
        }
    }

    /// Write a presence record as-is.
    pub async fn seed_user(&self, id: &str, status: UserStatus, room: Option<&str>) -> ActiveUser {
        self.seed_user_at(id, status, room, None).await
    }

    /// Write a presence record with a join position.
    pub async fn seed_user_at(
        &self,
        id: &str,
        status: UserStatus,
        room: Option<&str>,
        join_position: Option<u32>,
    ) -> ActiveUser {
        let user = ActiveUser {
            id: id.to_string(),
            status,
            room: room.map(str::to_string),
            join_position,
        };
        self.store
            .insert_one(
                ACTIVE_USERS_COLLECTION,
                id,
                serde_json::to_value(&user).expect("failed to encode user"),
            )
            .await
            .expect("failed to seed user");
        user
    }

    /// Write a room document as-is.
    pub async fn seed_room(&self, room: &Room) {
        self.store
            .insert_one(
                ROOMS_COLLECTION,
                &room.id,
                serde_json::to_value(room).expect("failed to encode room"),
            )
            .await
            .expect("failed to seed room");
    }

    /// Create a room through the coordinator and assert no warnings.
    pub async fn open_room(&self, id: &str, name: &str, creator: &str) -> Room {
        let outcome = self
            .coordinator
            .create_room(Room::new(id, name, creator))
            .await
            .expect("failed to create room");
        assert!(outcome.is_clean(), "unexpected warnings: {:?}", outcome.warnings);
        outcome.value
    }

    /// Presence record of `id`; panics when missing.
    pub async fn user(&self, id: &str) -> ActiveUser {
        self.coordinator
            .get_active_user(id)
            .await
            .expect("user should exist")
    }

    pub async fn room_count(&self) -> u64 {
        self.store
            .count(ROOMS_COLLECTION, &Filter::new())
            .await
            .expect("failed to count rooms")
    }
}
