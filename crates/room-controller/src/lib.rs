//! Room Controller Library
//!
//! Session layer of a live-streaming platform: manages the lifecycle of live
//! rooms (one broadcaster, an optional PK opponent, any number of viewers)
//! and the presence status of every participating user.
//!
//! # Architecture
//!
//! The Room Controller follows the Handler -> Service -> Repository pattern:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs                 (health, metrics)
//! services/room_coordinator.rs                   (room and presence rules)
//! repositories/{rooms,active_users}.rs           (typed collections)
//! repositories/{postgres,memory}.rs              (DocumentStore backends)
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with status code mapping
//! - `handlers` - HTTP request handlers
//! - `models` - Rooms, active users and their statuses
//! - `observability` - Prometheus metrics
//! - `repositories` - Document store abstraction and implementations
//! - `routes` - Axum router setup
//! - `services` - Coordinator and presence state machine

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
