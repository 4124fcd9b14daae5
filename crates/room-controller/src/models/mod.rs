//! Room Controller models.
//!
//! Contains the two persisted entities (`Room`, `ActiveUser`), their status
//! enumerations, the `RoomPatch` partial-update type and the `Outcome`
//! wrapper that carries reconciliation warnings next to a primary result.

use serde::{Deserialize, Serialize};

/// Document keys of the `rooms` collection.
pub mod room_fields {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const CREATOR: &str = "creator";
    pub const STATUS: &str = "status";
    pub const RTC_ROOM: &str = "rtcRoom";
    pub const PLAY_URL: &str = "playUrl";
    pub const PK_ANCHOR: &str = "pkAnchor";
}

/// Document keys of the `active_users` collection.
pub mod user_fields {
    pub const ID: &str = "id";
    pub const STATUS: &str = "status";
    pub const ROOM: &str = "room";
    pub const JOIN_POSITION: &str = "joinPosition";
}

/// Room status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Solo broadcast.
    #[default]
    Single,

    /// Battling another broadcaster; `pk_anchor` names the opponent.
    Pk,
}

impl RoomStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Single => "single",
            RoomStatus::Pk => "pk",
        }
    }
}

/// Presence status of a platform user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserStatus {
    /// Not associated with any room.
    #[default]
    Idle,

    /// Broadcasting alone.
    SingleLive,

    /// Broadcasting, waiting for a PK match.
    PkWait,

    /// Broadcasting in a PK battle.
    PkLive,

    /// Passive viewer.
    Watching,

    /// Viewer who asked to co-stream, not yet accepted.
    JoinWait,

    /// Accepted co-streamer.
    Joined,
}

impl UserStatus {
    /// Statuses of a user who owns a live broadcast.
    pub const BROADCASTING: [UserStatus; 3] =
        [UserStatus::SingleLive, UserStatus::PkWait, UserStatus::PkLive];

    /// Statuses counted as audience of the room the user is in.
    pub const AUDIENCE: [UserStatus; 3] =
        [UserStatus::Watching, UserStatus::JoinWait, UserStatus::Joined];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Idle => "idle",
            UserStatus::SingleLive => "singleLive",
            UserStatus::PkWait => "pkWait",
            UserStatus::PkLive => "pkLive",
            UserStatus::Watching => "watching",
            UserStatus::JoinWait => "joinWait",
            UserStatus::Joined => "joined",
        }
    }

    pub fn is_broadcasting(&self) -> bool {
        Self::BROADCASTING.contains(self)
    }

    pub fn is_audience(&self) -> bool {
        Self::AUDIENCE.contains(self)
    }

    /// Joined or waiting to join (co-streaming engagement).
    pub fn is_co_streaming(&self) -> bool {
        matches!(self, UserStatus::JoinWait | UserStatus::Joined)
    }
}

/// A broadcaster's live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Opaque ID assigned by the caller before creation.
    pub id: String,

    /// Human-chosen name, unique among rooms.
    pub name: String,

    /// User ID of the broadcaster.
    pub creator: String,

    #[serde(default)]
    pub status: RoomStatus,

    /// Opaque real-time-transport room handle (empty until assigned).
    #[serde(default)]
    pub rtc_room: String,

    /// Opaque playback URL (empty until assigned).
    #[serde(default)]
    pub play_url: String,

    /// Opponent broadcaster when `status` is `pk`.
    #[serde(default)]
    pub pk_anchor: Option<String>,
}

impl Room {
    /// Create a solo room with no transport handles assigned yet.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        creator: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            creator: creator.into(),
            status: RoomStatus::Single,
            rtc_room: String::new(),
            play_url: String::new(),
            pk_anchor: None,
        }
    }
}

/// Presence record of a platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUser {
    /// Platform user ID.
    pub id: String,

    #[serde(default)]
    pub status: UserStatus,

    /// Room currently associated with the user.
    #[serde(default)]
    pub room: Option<String>,

    /// Seat while co-streaming.
    #[serde(default)]
    pub join_position: Option<u32>,
}

impl ActiveUser {
    /// An idle user with no room.
    pub fn idle(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: UserStatus::Idle,
            room: None,
            join_position: None,
        }
    }

    /// Returns true when the user is associated with `room_id`.
    pub fn is_in_room(&self, room_id: &str) -> bool {
        self.room.as_deref() == Some(room_id)
    }
}

/// Partial update of a room.
///
/// `None` means "leave unchanged". `pk_anchor` is tri-state: `None` leaves
/// it alone, `Some(None)` clears it and `Some(Some(_))` sets it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomPatch {
    pub name: Option<String>,
    pub status: Option<RoomStatus>,
    pub rtc_room: Option<String>,
    pub play_url: Option<String>,
    pub pk_anchor: Option<Option<String>>,
}

impl RoomPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a patch from a sparsely populated room.
    ///
    /// Empty `name`, `rtc_room` and `play_url` mean "no change". `status` is
    /// always applied. `pk_anchor` always overwrites, so an absent or empty
    /// anchor clears the opponent.
    pub fn from_sparse(room: &Room) -> Self {
        let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
        Self {
            name: non_empty(&room.name),
            status: Some(room.status),
            rtc_room: non_empty(&room.rtc_room),
            play_url: non_empty(&room.play_url),
            pk_anchor: Some(room.pk_anchor.clone().filter(|anchor| !anchor.is_empty())),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: RoomStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_rtc_room(mut self, rtc_room: impl Into<String>) -> Self {
        self.rtc_room = Some(rtc_room.into());
        self
    }

    #[must_use]
    pub fn with_play_url(mut self, play_url: impl Into<String>) -> Self {
        self.play_url = Some(play_url.into());
        self
    }

    #[must_use]
    pub fn with_pk_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.pk_anchor = Some(Some(anchor.into()));
        self
    }

    #[must_use]
    pub fn clear_pk_anchor(mut self) -> Self {
        self.pk_anchor = Some(None);
        self
    }

    /// Apply the patch to `room` in place.
    pub fn apply_to(&self, room: &mut Room) {
        if let Some(name) = &self.name {
            room.name = name.clone();
        }
        if let Some(status) = self.status {
            room.status = status;
        }
        if let Some(rtc_room) = &self.rtc_room {
            room.rtc_room = rtc_room.clone();
        }
        if let Some(play_url) = &self.play_url {
            room.play_url = play_url.clone();
        }
        if let Some(anchor) = &self.pk_anchor {
            room.pk_anchor = anchor.clone();
        }
    }
}

/// Best-effort step that runs after the primary write of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconciliationStep {
    /// Marking the creator `singleLive` after inserting a room.
    CreatorGoLive,

    /// Returning the creator to `idle` after deleting a room.
    CreatorRelease,

    /// Returning the audience to `idle` after deleting a room.
    AudienceRelease,
}

impl ReconciliationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationStep::CreatorGoLive => "creator_go_live",
            ReconciliationStep::CreatorRelease => "creator_release",
            ReconciliationStep::AudienceRelease => "audience_release",
        }
    }
}

/// A secondary step that failed after the primary write succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationWarning {
    pub step: ReconciliationStep,
    pub room_id: String,
    /// User whose record could not be reconciled (`None` for bulk steps).
    pub user_id: Option<String>,
    pub error: String,
}

/// Primary result of an operation plus any reconciliation warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<ReconciliationWarning>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// Returns true when every secondary step succeeded.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Health check response.
///
/// Returned by the `/health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status ("healthy" or "unhealthy").
    pub status: String,

    /// Document store connectivity status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}
