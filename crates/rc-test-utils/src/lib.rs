//! # RC Test Utilities
//!
//! Shared test utilities for the Room Controller.
//!
//! This crate provides:
//! - Coordinator fixtures (`TestContext`, `RoomFixture`)
//! - Fault injection (`FaultyStore`)
//! - Server test harness (`TestRcServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let ctx = TestContext::new().await;
//!     ctx.register(&["u1"]).await;
//!
//!     let room = ctx.open_room("r1", "alice-room", "u1").await;
//!     assert_eq!(ctx.user("u1").await.room.as_deref(), Some(room.id.as_str()));
//! }
//! ```

pub mod faulty_store;
pub mod fixtures;
pub mod server_harness;

// Re-export commonly used items
pub use faulty_store::*;
pub use fixtures::*;
pub use server_harness::*;
