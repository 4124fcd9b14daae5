//! Room Controller error types.
//!
//! `RoomError` is the typed outcome of every coordinator operation. Guard
//! failures are distinct variants so callers never have to parse messages;
//! store failures pass through as `StoreOperationFailed`.
//!
//! `StoreError` classifies failures raised by a `DocumentStore`
//! implementation.

use thiserror::Error;

/// Errors raised by a document store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database rejected or failed the operation.
    #[error("Database error: {0}")]
    Database(String),

    /// A document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A unique index (or the primary key) rejected the write.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A collection or field name is not a plain identifier.
    #[error("Invalid field name: {0}")]
    InvalidField(String),
}

impl StoreError {
    /// Returns true when the error is a uniqueness rejection.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::UniqueViolation(db_err.message().to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Room Controller error type.
///
/// Maps to HTTP-style status codes for the handler layer:
/// - RoomNotFound, UserNotFound: 404
/// - RoomNameUsed, CanOnlyCreateOneRoom, UserWatching, UserJoined,
///   UserBroadcasting: 409
/// - InvalidRoomState: 400
/// - TooManyRooms: 503
/// - StoreOperationFailed: 500
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Room name is already used")]
    RoomNameUsed,

    #[error("Room number limit reached")]
    TooManyRooms,

    #[error("User can only create one room")]
    CanOnlyCreateOneRoom,

    #[error("User is watching another room")]
    UserWatching,

    #[error("User is joined into a room")]
    UserJoined,

    #[error("User is broadcasting")]
    UserBroadcasting,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid room state: {0}")]
    InvalidRoomState(String),

    #[error("Store operation failed: {0}")]
    StoreOperationFailed(#[from] StoreError),
}

impl RoomError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            RoomError::RoomNotFound | RoomError::UserNotFound => 404,
            RoomError::RoomNameUsed
            | RoomError::CanOnlyCreateOneRoom
            | RoomError::UserWatching
            | RoomError::UserJoined
            | RoomError::UserBroadcasting => 409,
            RoomError::InvalidRoomState(_) => 400,
            RoomError::TooManyRooms => 503,
            RoomError::StoreOperationFailed(_) => 500,
        }
    }

    /// Returns the stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            RoomError::RoomNotFound => "ROOM_NOT_FOUND",
            RoomError::RoomNameUsed => "ROOM_NAME_USED",
            RoomError::TooManyRooms => "TOO_MANY_ROOMS",
            RoomError::CanOnlyCreateOneRoom => "CAN_ONLY_CREATE_ONE_ROOM",
            RoomError::UserWatching => "USER_WATCHING",
            RoomError::UserJoined => "USER_JOINED",
            RoomError::UserBroadcasting => "USER_BROADCASTING",
            RoomError::UserNotFound => "USER_NOT_FOUND",
            RoomError::InvalidRoomState(_) => "INVALID_ROOM_STATE",
            RoomError::StoreOperationFailed(_) => "STORE_OPERATION_FAILED",
        }
    }
}
