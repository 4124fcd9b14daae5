//! Service layer for Room Controller.
//!
//! # Components
//!
//! - `room_coordinator` - room lifecycle and presence operations
//! - `transitions` - presence state machine used by the coordinator

pub mod room_coordinator;
pub mod transitions;

pub use room_coordinator::{CoordinatorSettings, RoomCoordinator};
pub use transitions::{transition, validate_room_state, PresenceOp, Rejection, Transition};
