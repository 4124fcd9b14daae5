//! Presence & Room Coordinator.
//!
//! Owns the lifecycle of rooms and the presence of every participating
//! user. Each operation is a sequence of guarded reads followed by writes
//! against the document store; presence decisions are delegated to
//! `services::transitions`.
//!
//! # Consistency
//!
//! - Guards run in a fixed order and each failure is a distinct `RoomError`
//! - Multi-step operations are not transactional. Once the primary write
//!   (room insert or delete) succeeds, failures of the follow-up user updates
//!   are logged and returned as `ReconciliationWarning`s
//! - With uniqueness enforcement on, the store holds unique indexes on room
//!   `name` and `creator`, and the room insert is an atomic count-guarded
//!   write. Without it, two concurrent creations may both pass the checks

use crate::config::{Config, DEFAULT_ROOM_NUMBER_LIMIT};
use crate::errors::{RoomError, StoreError};
use crate::models::{
    ActiveUser, Outcome, ReconciliationStep, ReconciliationWarning, Room, RoomPatch,
};
use crate::observability::metrics;
use crate::repositories::{ActiveUsersRepository, DocumentStore, Filter, RoomsRepository};
use crate::services::transitions::{transition, validate_room_state, PresenceOp, Transition};
use std::sync::Arc;
use tracing::instrument;

/// Tunables of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Maximum number of rooms that may exist at once.
    pub room_number_limit: u64,

    /// Rely on store-level unique indexes and the bounded insert.
    pub uniqueness_enforced: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            room_number_limit: DEFAULT_ROOM_NUMBER_LIMIT,
            uniqueness_enforced: false,
        }
    }
}

impl From<&Config> for CoordinatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            room_number_limit: config.room_number_limit,
            uniqueness_enforced: config.room_uniqueness_enforced,
        }
    }
}

/// Count the operation outcome and log rejections.
fn record_outcome<T>(operation: &'static str, result: &Result<T, RoomError>) {
    match result {
        Ok(_) => metrics::record_room_operation(operation, "ok"),
        Err(err @ RoomError::StoreOperationFailed(_)) => {
            tracing::error!(
                target: "rc.service.rooms",
                operation = operation,
                error = %err,
                "Store operation failed"
            );
            metrics::record_room_operation(operation, err.error_code());
        }
        Err(err) => {
            tracing::info!(
                target: "rc.service.rooms",
                operation = operation,
                error_code = err.error_code(),
                "Operation rejected"
            );
            metrics::record_room_operation(operation, err.error_code());
        }
    }
}

fn reconciliation_warning(
    step: ReconciliationStep,
    room_id: &str,
    user_id: Option<&str>,
    error: &RoomError,
) -> ReconciliationWarning {
    tracing::warn!(
        target: "rc.service.rooms",
        step = step.as_str(),
        room_id = %room_id,
        user_id = ?user_id,
        error = %error,
        "Reconciliation step failed"
    );
    metrics::record_reconciliation_failure(step.as_str());

    ReconciliationWarning {
        step,
        room_id: room_id.to_string(),
        user_id: user_id.map(str::to_string),
        error: error.to_string(),
    }
}

/// Coordinates rooms and user presence over a `DocumentStore`.
#[derive(Clone)]
pub struct RoomCoordinator {
    store: Arc<dyn DocumentStore>,
    rooms: RoomsRepository,
    users: ActiveUsersRepository,
    settings: CoordinatorSettings,
}

impl RoomCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>, settings: CoordinatorSettings) -> Self {
        Self {
            rooms: RoomsRepository::new(Arc::clone(&store)),
            users: ActiveUsersRepository::new(Arc::clone(&store)),
            store,
            settings,
        }
    }

    pub fn from_config(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self::new(store, CoordinatorSettings::from(config))
    }

    pub fn settings(&self) -> CoordinatorSettings {
        self.settings
    }

    /// Install the unique indexes required by uniqueness enforcement.
    ///
    /// No-op when enforcement is off. Fails if existing rooms already
    /// violate uniqueness.
    pub async fn prepare_store(&self) -> Result<(), RoomError> {
        if self.settings.uniqueness_enforced {
            self.rooms.ensure_unique_indexes().await?;
            tracing::info!(
                target: "rc.service.rooms",
                "Room uniqueness enforced by the store"
            );
        }
        Ok(())
    }

    pub async fn ping_store(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }

    // ------------------------------------------------------------------
    // Room lifecycle
    // ------------------------------------------------------------------

    /// Create `room` and put its creator live.
    ///
    /// Recreating a room with the same name by the same creator returns the
    /// existing room without writing anything.
    ///
    /// # Errors
    ///
    /// Checked in this order:
    /// - `TooManyRooms` - room number limit reached
    /// - `RoomNameUsed` - another creator owns a room with this name
    /// - `CanOnlyCreateOneRoom` - the creator already owns a room
    /// - `UserNotFound` - the creator has no presence record
    /// - `UserWatching` / `UserJoined` - the creator is in someone's audience
    /// - `InvalidRoomState` - `pk` room without an anchor
    #[instrument(skip_all, fields(room_id = %room.id, name = %room.name, user_id = %room.creator))]
    pub async fn create_room(&self, room: Room) -> Result<Outcome<Room>, RoomError> {
        let result = self.try_create_room(room).await;
        record_outcome("create_room", &result);
        result
    }

    async fn try_create_room(&self, room: Room) -> Result<Outcome<Room>, RoomError> {
        let room_count = self.rooms.count(&Filter::new()).await?;
        if room_count >= self.settings.room_number_limit {
            return Err(RoomError::TooManyRooms);
        }

        if let Some(existing) = self.rooms.find_by_name(&room.name).await? {
            return if existing.creator == room.creator {
                tracing::debug!(
                    target: "rc.service.rooms",
                    room_id = %existing.id,
                    "Room already exists for creator"
                );
                Ok(Outcome::new(existing))
            } else {
                Err(RoomError::RoomNameUsed)
            };
        }

        if self.rooms.count_by_creator(&room.creator).await? > 0 {
            return Err(RoomError::CanOnlyCreateOneRoom);
        }

        let creator = self
            .users
            .find_by_id(&room.creator)
            .await?
            .ok_or(RoomError::UserNotFound)?;
        let go_live = transition(&creator, PresenceOp::CreateRoom { room_id: &room.id })?;
        validate_room_state(&room)?;

        if self.settings.uniqueness_enforced {
            match self
                .rooms
                .insert_bounded(&room, self.settings.room_number_limit)
                .await
            {
                Ok(true) => {}
                Ok(false) => return Err(RoomError::TooManyRooms),
                Err(err) if err.is_unique_violation() => {
                    return self.resolve_create_conflict(&room, err).await;
                }
                Err(err) => return Err(err.into()),
            }
        } else {
            self.rooms.insert(&room).await?;
        }

        tracing::info!(
            target: "rc.service.rooms",
            room_id = %room.id,
            user_id = %room.creator,
            "Room created"
        );

        let mut outcome = Outcome::new(room);
        if let Err(err) = self.apply(&creator.id, go_live).await {
            outcome.warnings.push(reconciliation_warning(
                ReconciliationStep::CreatorGoLive,
                &outcome.value.id,
                Some(creator.id.as_str()),
                &err,
            ));
        }
        Ok(outcome)
    }

    /// Translate a lost insert race into the failure a sequential caller
    /// would have seen.
    async fn resolve_create_conflict(
        &self,
        room: &Room,
        conflict: StoreError,
    ) -> Result<Outcome<Room>, RoomError> {
        tracing::debug!(
            target: "rc.service.rooms",
            room_id = %room.id,
            error = %conflict,
            "Room insert hit a unique index"
        );

        if let Some(existing) = self.rooms.find_by_name(&room.name).await? {
            return if existing.creator == room.creator {
                Ok(Outcome::new(existing))
            } else {
                Err(RoomError::RoomNameUsed)
            };
        }
        if self.rooms.count_by_creator(&room.creator).await? > 0 {
            return Err(RoomError::CanOnlyCreateOneRoom);
        }
        Err(conflict.into())
    }

    /// Delete a room owned by `user_id` and release its creator and audience.
    ///
    /// # Errors
    ///
    /// - `RoomNotFound` - no room `room_id` created by `user_id`
    #[instrument(skip_all, fields(user_id = %user_id, room_id = %room_id))]
    pub async fn close_room(&self, user_id: &str, room_id: &str) -> Result<Outcome<()>, RoomError> {
        let result = self.try_close_room(user_id, room_id).await;
        record_outcome("close_room", &result);
        result
    }

    async fn try_close_room(&self, user_id: &str, room_id: &str) -> Result<Outcome<()>, RoomError> {
        let room = self
            .rooms
            .find_owned(room_id, user_id)
            .await?
            .ok_or(RoomError::RoomNotFound)?;

        self.rooms.delete(&room.id).await?;
        tracing::info!(
            target: "rc.service.rooms",
            room_id = %room.id,
            user_id = %user_id,
            "Room closed"
        );

        let mut outcome = Outcome::new(());

        if let Err(err) = self.release_creator(user_id, &room.id).await {
            outcome.warnings.push(reconciliation_warning(
                ReconciliationStep::CreatorRelease,
                &room.id,
                Some(user_id),
                &err,
            ));
        }

        match self.users.release_audience(&room.id).await {
            Ok(released) => {
                tracing::debug!(
                    target: "rc.service.rooms",
                    room_id = %room.id,
                    released = released,
                    "Audience released"
                );
            }
            Err(err) => {
                outcome.warnings.push(reconciliation_warning(
                    ReconciliationStep::AudienceRelease,
                    &room.id,
                    None,
                    &RoomError::from(err),
                ));
            }
        }

        Ok(outcome)
    }

    async fn release_creator(&self, user_id: &str, room_id: &str) -> Result<(), RoomError> {
        let creator = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(RoomError::UserNotFound)?;
        if !creator.is_in_room(room_id) {
            tracing::debug!(
                target: "rc.service.rooms",
                user_id = %user_id,
                room_id = %room_id,
                recorded_room = ?creator.room,
                "Creator record points elsewhere, releasing anyway"
            );
        }
        let release = transition(&creator, PresenceOp::CloseOwnRoom)?;
        self.apply(user_id, release).await
    }

    /// Apply `patch` to room `id`.
    ///
    /// # Errors
    ///
    /// - `RoomNotFound` - no room `id`
    /// - `RoomNameUsed` - another room already has the new name
    /// - `InvalidRoomState` - the result is a `pk` room without an anchor
    #[instrument(skip_all, fields(room_id = %id))]
    pub async fn update_room(&self, id: &str, patch: RoomPatch) -> Result<Room, RoomError> {
        let result = self.try_update_room(id, patch).await;
        record_outcome("update_room", &result);
        result
    }

    async fn try_update_room(&self, id: &str, patch: RoomPatch) -> Result<Room, RoomError> {
        let mut room = self
            .rooms
            .find_by_id(id)
            .await?
            .ok_or(RoomError::RoomNotFound)?;

        if let Some(name) = &patch.name {
            if self.rooms.find_name_holder(name, id).await?.is_some() {
                return Err(RoomError::RoomNameUsed);
            }
        }

        patch.apply_to(&mut room);
        validate_room_state(&room)?;

        match self.rooms.save(&room).await {
            Ok(0) => Err(RoomError::RoomNotFound),
            Ok(_) => {
                tracing::debug!(
                    target: "rc.service.rooms",
                    room_id = %room.id,
                    status = room.status.as_str(),
                    "Room updated"
                );
                Ok(room)
            }
            Err(err) if err.is_unique_violation() && patch.name.is_some() => {
                Err(RoomError::RoomNameUsed)
            }
            Err(err) => Err(err.into()),
        }
    }

    // ------------------------------------------------------------------
    // Presence
    // ------------------------------------------------------------------

    /// Make `user_id` watch `room_id`.
    ///
    /// A co-streamer re-entering their own room gets the room back with no
    /// state change.
    ///
    /// # Errors
    ///
    /// - `RoomNotFound`, `UserNotFound`
    /// - `UserBroadcasting` - the user is live
    /// - `UserJoined` - the user co-streams in another room
    #[instrument(skip_all, fields(user_id = %user_id, room_id = %room_id))]
    pub async fn enter_room(&self, user_id: &str, room_id: &str) -> Result<Room, RoomError> {
        let result = self.try_enter_room(user_id, room_id).await;
        record_outcome("enter_room", &result);
        result
    }

    async fn try_enter_room(&self, user_id: &str, room_id: &str) -> Result<Room, RoomError> {
        let room = self
            .rooms
            .find_by_id(room_id)
            .await?
            .ok_or(RoomError::RoomNotFound)?;
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(RoomError::UserNotFound)?;

        let enter = transition(&user, PresenceOp::EnterRoom { room_id })?;
        self.apply(user_id, enter).await?;
        Ok(room)
    }

    /// Return `user_id` to idle.
    ///
    /// The room is looked up for logging only; a missing room does not
    /// block leaving.
    ///
    /// # Errors
    ///
    /// - `UserNotFound`
    /// - `UserBroadcasting` - broadcasters leave by closing their room
    #[instrument(skip_all, fields(user_id = %user_id, room_id = %room_id))]
    pub async fn leave_room(&self, user_id: &str, room_id: &str) -> Result<(), RoomError> {
        let result = self.try_leave_room(user_id, room_id).await;
        record_outcome("leave_room", &result);
        result
    }

    async fn try_leave_room(&self, user_id: &str, room_id: &str) -> Result<(), RoomError> {
        match self.rooms.find_by_id(room_id).await {
            Ok(Some(room)) => {
                tracing::debug!(
                    target: "rc.service.rooms",
                    room_id = %room.id,
                    creator = %room.creator,
                    "Leaving room"
                );
            }
            Ok(None) => {
                tracing::debug!(
                    target: "rc.service.rooms",
                    room_id = %room_id,
                    "Leaving a room that no longer exists"
                );
            }
            Err(err) => {
                tracing::warn!(
                    target: "rc.service.rooms",
                    room_id = %room_id,
                    error = %err,
                    "Room lookup failed while leaving"
                );
            }
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(RoomError::UserNotFound)?;

        let leave = transition(&user, PresenceOp::LeaveRoom)?;
        self.apply(user_id, leave).await
    }

    /// Ensure `user_id` has a presence record, creating it idle if absent.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn register_user(&self, user_id: &str) -> Result<ActiveUser, RoomError> {
        let result = self.try_register_user(user_id).await;
        record_outcome("register_user", &result);
        result
    }

    async fn try_register_user(&self, user_id: &str) -> Result<ActiveUser, RoomError> {
        if let Some(user) = self.users.find_by_id(user_id).await? {
            return Ok(user);
        }

        let user = ActiveUser::idle(user_id);
        match self.users.insert(&user).await {
            Ok(()) => Ok(user),
            // Registered concurrently
            Err(err) if err.is_unique_violation() => self
                .users
                .find_by_id(user_id)
                .await?
                .ok_or_else(|| err.into()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_active_user(&self, user_id: &str) -> Result<ActiveUser, RoomError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(RoomError::UserNotFound)
    }

    /// Write a presence transition for `user_id`.
    async fn apply(&self, user_id: &str, change: Transition) -> Result<(), RoomError> {
        let Transition::Move {
            status,
            room,
            clear_join_position,
        } = change
        else {
            return Ok(());
        };

        self.users
            .set_presence(user_id, status, room.as_deref(), clear_join_position)
            .await?;
        tracing::debug!(
            target: "rc.service.rooms",
            user_id = %user_id,
            status = status.as_str(),
            room_id = ?room,
            "Presence updated"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    #[instrument(skip_all)]
    pub async fn list_all_rooms(&self) -> Result<Vec<Room>, RoomError> {
        Ok(self.rooms.list(&Filter::new()).await?)
    }

    /// Solo rooms `user_id` could challenge (their own excluded).
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn list_pk_rooms(&self, user_id: &str) -> Result<Vec<Room>, RoomError> {
        Ok(self.rooms.list_pk_candidates(user_id).await?)
    }

    #[instrument(skip_all)]
    pub async fn list_rooms_by_fields(&self, filter: &Filter) -> Result<Vec<Room>, RoomError> {
        Ok(self.rooms.list(filter).await?)
    }

    #[instrument(skip_all)]
    pub async fn get_room_by_fields(&self, filter: &Filter) -> Result<Room, RoomError> {
        self.rooms
            .find_one(filter)
            .await?
            .ok_or(RoomError::RoomNotFound)
    }

    #[instrument(skip_all, fields(room_id = %id))]
    pub async fn get_room_by_id(&self, id: &str) -> Result<Room, RoomError> {
        self.rooms
            .find_by_id(id)
            .await?
            .ok_or(RoomError::RoomNotFound)
    }

    /// Number of watchers and co-streamers of `room_id`.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn get_audience_number(&self, room_id: &str) -> Result<u64, RoomError> {
        self.get_room_by_id(room_id).await?;
        Ok(self.users.count_audience(room_id).await?)
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn get_all_audiences(&self, room_id: &str) -> Result<Vec<ActiveUser>, RoomError> {
        self.get_room_by_id(room_id).await?;
        Ok(self.users.list_audience(room_id).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{RoomStatus, UserStatus};
    use crate::repositories::InMemoryDocumentStore;

    async fn coordinator_with_users(users: &[&str]) -> RoomCoordinator {
        let coordinator = RoomCoordinator::new(
            Arc::new(InMemoryDocumentStore::new()),
            CoordinatorSettings::default(),
        );
        for user in users {
            coordinator.register_user(user).await.unwrap();
        }
        coordinator
    }

    #[test]
    fn test_default_settings() {
        let settings = CoordinatorSettings::default();
        assert_eq!(settings.room_number_limit, 20);
        assert!(!settings.uniqueness_enforced);
    }

    #[tokio::test]
    async fn test_create_room_puts_creator_live() {
        let coordinator = coordinator_with_users(&["u1"]).await;

        let outcome = coordinator
            .create_room(Room::new("r1", "alice-room", "u1"))
            .await
            .unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.value.status, RoomStatus::Single);

        let creator = coordinator.get_active_user("u1").await.unwrap();
        assert_eq!(creator.status, UserStatus::SingleLive);
        assert_eq!(creator.room.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_create_room_rejects_pk_without_anchor() {
        let coordinator = coordinator_with_users(&["u1"]).await;
        let mut room = Room::new("r1", "alice-room", "u1");
        room.status = RoomStatus::Pk;

        let err = coordinator.create_room(room).await.unwrap_err();
        assert!(matches!(err, RoomError::InvalidRoomState(_)));
    }

    #[tokio::test]
    async fn test_register_user_is_idempotent() {
        let coordinator = coordinator_with_users(&["u1"]).await;
        coordinator
            .create_room(Room::new("r1", "alice-room", "u1"))
            .await
            .unwrap();

        // Re-registering keeps the live presence
        let user = coordinator.register_user("u1").await.unwrap();
        assert_eq!(user.status, UserStatus::SingleLive);
    }

    #[tokio::test]
    async fn test_update_room_rejects_taken_name() {
        let coordinator = coordinator_with_users(&["u1", "u2"]).await;
        coordinator
            .create_room(Room::new("r1", "alice-room", "u1"))
            .await
            .unwrap();
        coordinator
            .create_room(Room::new("r2", "bob-room", "u2"))
            .await
            .unwrap();

        let err = coordinator
            .update_room("r2", RoomPatch::new().with_name("alice-room"))
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::RoomNameUsed));

        // Keeping its own name is not a collision
        let room = coordinator
            .update_room("r1", RoomPatch::new().with_name("alice-room"))
            .await
            .unwrap();
        assert_eq!(room.name, "alice-room");
    }
}
