//! Presence integration tests.
//!
//! Covers entering and leaving rooms, the mutual exclusion between
//! broadcasting and watching, and the audience queries.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use rc_test_utils::{RoomFixture, TestContext};
use room_controller::errors::RoomError;
use room_controller::models::UserStatus;

async fn context_with_room() -> TestContext {
    let ctx = TestContext::new().await;
    ctx.register(&["host", "viewer"]).await;
    ctx.open_room("r1", "host-room", "host").await;
    ctx
}

#[tokio::test]
async fn test_enter_and_leave_room() {
    let ctx = context_with_room().await;

    let room = ctx.coordinator.enter_room("viewer", "r1").await.unwrap();
    assert_eq!(room.id, "r1");

    let viewer = ctx.user("viewer").await;
    assert_eq!(viewer.status, UserStatus::Watching);
    assert_eq!(viewer.room.as_deref(), Some("r1"));

    ctx.coordinator.leave_room("viewer", "r1").await.unwrap();
    let viewer = ctx.user("viewer").await;
    assert_eq!(viewer.status, UserStatus::Idle);
    assert_eq!(viewer.room, None);
}

#[tokio::test]
async fn test_watcher_can_switch_rooms() {
    let ctx = context_with_room().await;
    ctx.register(&["host2"]).await;
    ctx.open_room("r2", "second-room", "host2").await;

    ctx.coordinator.enter_room("viewer", "r1").await.unwrap();
    ctx.coordinator.enter_room("viewer", "r2").await.unwrap();

    let viewer = ctx.user("viewer").await;
    assert_eq!(viewer.status, UserStatus::Watching);
    assert_eq!(viewer.room.as_deref(), Some("r2"));
    assert_eq!(ctx.coordinator.get_audience_number("r1").await.unwrap(), 0);
    assert_eq!(ctx.coordinator.get_audience_number("r2").await.unwrap(), 1);
}

#[tokio::test]
async fn test_broadcaster_cannot_enter_or_leave() {
    let ctx = context_with_room().await;
    ctx.register(&["host2"]).await;
    ctx.open_room("r2", "second-room", "host2").await;

    let err = ctx.coordinator.enter_room("host", "r2").await.unwrap_err();
    assert!(matches!(err, RoomError::UserBroadcasting));

    let err = ctx.coordinator.leave_room("host", "r1").await.unwrap_err();
    assert!(matches!(err, RoomError::UserBroadcasting));

    let host = ctx.user("host").await;
    assert_eq!(host.status, UserStatus::SingleLive);
    assert_eq!(host.room.as_deref(), Some("r1"));
}

#[tokio::test]
async fn test_watcher_cannot_create_room() {
    let ctx = context_with_room().await;
    ctx.coordinator.enter_room("viewer", "r1").await.unwrap();

    let err = ctx
        .coordinator
        .create_room(room_controller::models::Room::new(
            "r2",
            "viewer-room",
            "viewer",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::UserWatching));
    assert_eq!(ctx.room_count().await, 1);
}

#[tokio::test]
async fn test_co_streamer_reentry_and_switch() {
    let ctx = context_with_room().await;
    ctx.seed_room(&RoomFixture::new("r2", "other-room", "host2").build())
        .await;
    ctx.seed_user_at("guest", UserStatus::Joined, Some("r1"), Some(3))
        .await;

    // Re-entering the joined room changes nothing
    let room = ctx.coordinator.enter_room("guest", "r1").await.unwrap();
    assert_eq!(room.id, "r1");
    let guest = ctx.user("guest").await;
    assert_eq!(guest.status, UserStatus::Joined);
    assert_eq!(guest.join_position, Some(3));

    let err = ctx.coordinator.enter_room("guest", "r2").await.unwrap_err();
    assert!(matches!(err, RoomError::UserJoined));

    // Leaving drops the seat
    ctx.coordinator.leave_room("guest", "r1").await.unwrap();
    let guest = ctx.user("guest").await;
    assert_eq!(guest.status, UserStatus::Idle);
    assert_eq!(guest.join_position, None);
}

#[tokio::test]
async fn test_unknown_user_or_room() {
    let ctx = context_with_room().await;

    let err = ctx.coordinator.enter_room("ghost", "r1").await.unwrap_err();
    assert!(matches!(err, RoomError::UserNotFound));

    let err = ctx
        .coordinator
        .enter_room("viewer", "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::RoomNotFound));
    assert_eq!(ctx.user("viewer").await.status, UserStatus::Idle);

    let err = ctx.coordinator.leave_room("ghost", "r1").await.unwrap_err();
    assert!(matches!(err, RoomError::UserNotFound));
}

#[tokio::test]
async fn test_leave_room_that_no_longer_exists() {
    let ctx = TestContext::new().await;
    ctx.seed_user("viewer", UserStatus::Watching, Some("gone"))
        .await;

    ctx.coordinator.leave_room("viewer", "gone").await.unwrap();

    let viewer = ctx.user("viewer").await;
    assert_eq!(viewer.status, UserStatus::Idle);
    assert_eq!(viewer.room, None);
}

#[tokio::test]
async fn test_audience_queries() {
    let ctx = context_with_room().await;
    ctx.register(&["v2"]).await;
    ctx.coordinator.enter_room("viewer", "r1").await.unwrap();
    ctx.coordinator.enter_room("v2", "r1").await.unwrap();
    ctx.seed_user_at("guest", UserStatus::JoinWait, Some("r1"), Some(1))
        .await;
    ctx.seed_user("idle-user", UserStatus::Idle, None).await;

    // The broadcaster is not part of their own audience
    assert_eq!(ctx.coordinator.get_audience_number("r1").await.unwrap(), 3);

    let audience = ctx.coordinator.get_all_audiences("r1").await.unwrap();
    let mut ids: Vec<&str> = audience.iter().map(|u| u.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["guest", "v2", "viewer"]);

    ctx.coordinator.leave_room("v2", "r1").await.unwrap();
    assert_eq!(ctx.coordinator.get_audience_number("r1").await.unwrap(), 2);
}

#[tokio::test]
async fn test_audience_of_missing_room() {
    let ctx = TestContext::new().await;

    let err = ctx
        .coordinator
        .get_audience_number("missing")
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::RoomNotFound));

    let err = ctx
        .coordinator
        .get_all_audiences("missing")
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::RoomNotFound));
}

#[tokio::test]
async fn test_register_user() {
    let ctx = TestContext::new().await;

    let user = ctx.coordinator.register_user("u1").await.unwrap();
    assert_eq!(user.status, UserStatus::Idle);
    assert_eq!(user.room, None);

    ctx.seed_user("u2", UserStatus::Watching, Some("r1")).await;
    let existing = ctx.coordinator.register_user("u2").await.unwrap();
    assert_eq!(existing.status, UserStatus::Watching);

    let err = ctx.coordinator.get_active_user("ghost").await.unwrap_err();
    assert!(matches!(err, RoomError::UserNotFound));
}
