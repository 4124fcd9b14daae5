//! Presence state machine.
//!
//! Every change to an `ActiveUser` made by the coordinator is decided here.
//! `transition` is a pure function of the user's current record and the
//! requested operation, so the rules can be exercised without a store.
//!
//! | status \ op           | CreateRoom        | EnterRoom(r)                | LeaveRoom        | CloseOwnRoom |
//! |-----------------------|-------------------|-----------------------------|------------------|--------------|
//! | idle                  | singleLive        | watching r                  | idle             | idle         |
//! | singleLive/pkWait/pkLive | singleLive     | UserBroadcasting            | UserBroadcasting | idle         |
//! | watching              | UserWatching      | watching r                  | idle             | idle         |
//! | joinWait/joined       | UserJoined        | stay if room == r else UserJoined | idle       | idle         |
//!
//! `CloseOwnRoom` releases the creator whatever their record says, so a
//! creator left stale by a failed go-live is still reset. It keeps
//! `joinPosition`; every other move to idle clears it.

use crate::errors::RoomError;
use crate::models::{ActiveUser, Room, RoomStatus, UserStatus};

/// Operation requested on a user's presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceOp<'a> {
    /// The user is creating (and going live in) `room_id`.
    CreateRoom { room_id: &'a str },

    /// The user wants to watch `room_id`.
    EnterRoom { room_id: &'a str },

    /// The user leaves whatever room they are in.
    LeaveRoom,

    /// The user's own room was deleted.
    CloseOwnRoom,
}

/// Accepted outcome of a presence operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Write the new presence.
    Move {
        status: UserStatus,
        room: Option<String>,
        clear_join_position: bool,
    },

    /// Leave the record untouched.
    Stay,
}

/// Reason a presence operation is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UserWatching,
    UserJoined,
    UserBroadcasting,
}

impl From<Rejection> for RoomError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::UserWatching => RoomError::UserWatching,
            Rejection::UserJoined => RoomError::UserJoined,
            Rejection::UserBroadcasting => RoomError::UserBroadcasting,
        }
    }
}

fn idle() -> Transition {
    Transition::Move {
        status: UserStatus::Idle,
        room: None,
        clear_join_position: true,
    }
}

/// Decide how `user` changes under `op`.
pub fn transition(user: &ActiveUser, op: PresenceOp<'_>) -> Result<Transition, Rejection> {
    let status = user.status;

    match op {
        PresenceOp::CreateRoom { room_id } => match status {
            UserStatus::Watching => Err(Rejection::UserWatching),
            UserStatus::JoinWait | UserStatus::Joined => Err(Rejection::UserJoined),
            _ => Ok(Transition::Move {
                status: UserStatus::SingleLive,
                room: Some(room_id.to_string()),
                clear_join_position: false,
            }),
        },

        PresenceOp::EnterRoom { room_id } => {
            if status.is_broadcasting() {
                return Err(Rejection::UserBroadcasting);
            }
            if status.is_co_streaming() {
                // Re-entering the room already joined is a no-op
                return if user.is_in_room(room_id) {
                    Ok(Transition::Stay)
                } else {
                    Err(Rejection::UserJoined)
                };
            }
            Ok(Transition::Move {
                status: UserStatus::Watching,
                room: Some(room_id.to_string()),
                clear_join_position: false,
            })
        }

        PresenceOp::LeaveRoom => {
            if status.is_broadcasting() {
                Err(Rejection::UserBroadcasting)
            } else {
                Ok(idle())
            }
        }

        PresenceOp::CloseOwnRoom => Ok(Transition::Move {
            status: UserStatus::Idle,
            room: None,
            clear_join_position: false,
        }),
    }
}

/// Check room-level invariants on a fully patched room.
pub fn validate_room_state(room: &Room) -> Result<(), RoomError> {
    if room.status == RoomStatus::Pk && room.pk_anchor.as_deref().map_or(true, str::is_empty) {
        return Err(RoomError::InvalidRoomState(
            "pk room requires a pk anchor".to_string(),
        ));
    }
    Ok(())
}
