//! HTTP request handlers for Room Controller.
//!
//! Only operational endpoints are served; room operations are invoked
//! in-process through `RoomCoordinator`.

pub mod health;
pub mod metrics;

pub use health::health_check;
pub use metrics::metrics_handler;
