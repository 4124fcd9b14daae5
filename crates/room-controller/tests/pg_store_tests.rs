//! PostgreSQL document store tests.
//!
//! Each test gets a fresh database from `#[sqlx::test]` with the migrations
//! applied. They need a reachable server in `DATABASE_URL`, so they are
//! ignored by default; run them with `cargo test -- --ignored`.

use room_controller::errors::{RoomError, StoreError};
use room_controller::models::{user_fields, Room, UserStatus};
use room_controller::repositories::{
    DocumentStore, Filter, PgDocumentStore, Update, ACTIVE_USERS_COLLECTION, ROOMS_COLLECTION,
};
use room_controller::services::{CoordinatorSettings, RoomCoordinator};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_filters_treat_missing_fields_as_null(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = PgDocumentStore::new(pool);
    store
        .insert_one("users", "a", json!({ "id": "a", "room": "r1" }))
        .await?;
    store.insert_one("users", "b", json!({ "id": "b" })).await?;
    store
        .insert_one("users", "c", json!({ "id": "c", "room": null }))
        .await?;

    let without_room = store
        .find_many("users", &Filter::new().eq("room", serde_json::Value::Null))
        .await?;
    let ids: Vec<&str> = without_room
        .iter()
        .filter_map(|d| d.get("id").and_then(|id| id.as_str()))
        .collect();
    assert_eq!(ids, ["b", "c"]);

    assert_eq!(store.count("users", &Filter::new().ne("room", "r1")).await?, 2);
    assert_eq!(
        store
            .count("users", &Filter::new().is_in("id", Vec::<String>::new()))
            .await?,
        0
    );

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_update_one_touches_a_single_document(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = PgDocumentStore::new(pool);
    for id in ["a", "b"] {
        store
            .insert_one("users", id, json!({ "id": id, "status": "watching" }))
            .await?;
    }
    let idle = Update::new().set("status", "idle");

    let touched = store
        .update_one("users", &Filter::new().eq("status", "watching"), &idle)
        .await?;
    assert_eq!(touched, 1);

    let first = store.find_one("users", &Filter::by_id("a")).await?;
    assert_eq!(first.and_then(|d| d.get("status").cloned()), Some(json!("idle")));

    let touched = store
        .update_many("users", &Filter::new().eq("status", "watching"), &idle)
        .await?;
    assert_eq!(touched, 1);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_id_is_a_unique_violation(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = PgDocumentStore::new(pool);
    store.insert_one("rooms", "r1", json!({ "id": "r1" })).await?;

    let err = store
        .insert_one("rooms", "r1", json!({ "id": "r1" }))
        .await
        .err();
    assert!(matches!(err, Some(StoreError::UniqueViolation(_))));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_unique_index_and_bounded_insert(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = PgDocumentStore::new(pool);
    store.ensure_unique_index("rooms", "name").await?;
    // Idempotent
    store.ensure_unique_index("rooms", "name").await?;

    assert!(
        store
            .insert_one_bounded("rooms", "r1", json!({ "id": "r1", "name": "x" }), 2)
            .await?
    );

    let err = store
        .insert_one_bounded("rooms", "r2", json!({ "id": "r2", "name": "x" }), 2)
        .await
        .err();
    assert!(matches!(err, Some(StoreError::UniqueViolation(_))));

    assert!(
        store
            .insert_one_bounded("rooms", "r3", json!({ "id": "r3", "name": "y" }), 2)
            .await?
    );
    assert!(
        !store
            .insert_one_bounded("rooms", "r4", json!({ "id": "r4", "name": "z" }), 2)
            .await?
    );

    // Other collections are not constrained by the index
    store
        .insert_one("archive", "a1", json!({ "id": "a1", "name": "x" }))
        .await?;

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_invalid_field_names_are_rejected(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = PgDocumentStore::new(pool);

    let err = store.ensure_unique_index("rooms", "name'; --").await.err();
    assert!(matches!(err, Some(StoreError::InvalidField(_))));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_coordinator_round_trip(pool: PgPool) -> Result<(), anyhow::Error> {
    let store: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(pool));
    let coordinator = RoomCoordinator::new(
        Arc::clone(&store),
        CoordinatorSettings {
            room_number_limit: 5,
            uniqueness_enforced: true,
        },
    );
    coordinator.prepare_store().await?;
    coordinator.register_user("host").await?;
    coordinator.register_user("viewer").await?;

    let outcome = coordinator
        .create_room(Room::new("r1", "pg-room", "host"))
        .await?;
    assert!(outcome.is_clean());

    let err = coordinator
        .create_room(Room::new("r2", "pg-room", "viewer"))
        .await
        .err();
    assert!(matches!(err, Some(RoomError::RoomNameUsed)));

    coordinator.enter_room("viewer", "r1").await?;
    assert_eq!(coordinator.get_audience_number("r1").await?, 1);

    let outcome = coordinator.close_room("host", "r1").await?;
    assert!(outcome.is_clean());

    let viewer = coordinator.get_active_user("viewer").await?;
    assert_eq!(viewer.status, UserStatus::Idle);
    assert_eq!(viewer.room, None);
    assert_eq!(store.count(ROOMS_COLLECTION, &Filter::new()).await?, 0);
    assert_eq!(
        store
            .count(
                ACTIVE_USERS_COLLECTION,
                &Filter::new().eq(user_fields::STATUS, "idle")
            )
            .await?,
        2
    );

    Ok(())
}
