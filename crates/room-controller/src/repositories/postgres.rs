//! PostgreSQL document store.
//!
//! Every collection lives in one `documents` table keyed by
//! `(collection, id)` with the document itself in a JSONB `body` column.
//! Filters compile to parameterized `WHERE` clauses over top-level body
//! fields; a missing field compares as JSON `null`.
//!
//! # Security
//!
//! - Field names and values are always bound as parameters
//! - DDL for unique indexes cannot be parameterized, so collection and field
//!   names are validated as plain identifiers first
//! - The database URL is never logged

use super::filter::validate_identifier;
use super::{Condition, DocumentStore, Filter, Update};
use crate::config::Config;
use crate::errors::StoreError;
use crate::observability::metrics;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Open a pool whose sessions resolve tables in `config.database_schema`
/// and enforce `config.db_statement_timeout_seconds`.
pub async fn connect_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    let statement_timeout = format!("{}s", config.db_statement_timeout_seconds);
    let options = PgConnectOptions::from_str(&config.database_url)?.options([
        ("search_path", config.database_schema.as_str()),
        ("statement_timeout", statement_timeout.as_str()),
    ]);

    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect_with(options)
        .await
}

/// Create `schema` if needed and apply the embedded migrations to it.
pub async fn migrate(pool: &PgPool, schema: &str) -> Result<(), StoreError> {
    validate_identifier(schema)?;
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
        .execute(pool)
        .await?;
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))
}

/// `DocumentStore` over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Run `operation` and record its duration and status.
async fn timed<T, F>(operation: &'static str, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let start = Instant::now();
    let result = fut.await;
    let status = match &result {
        Ok(_) => "success",
        Err(StoreError::UniqueViolation(_)) => "conflict",
        Err(_) => "error",
    };
    metrics::record_store_operation(operation, status, start.elapsed());
    result
}

/// Append `collection = $n AND <conditions>` to `builder`.
fn push_where(builder: &mut QueryBuilder<'_, Postgres>, collection: &str, filter: &Filter) {
    builder
        .push(" WHERE collection = ")
        .push_bind(collection.to_string());

    for condition in filter.conditions() {
        if matches!(condition, Condition::In(_, values) if values.is_empty()) {
            builder.push(" AND FALSE");
            continue;
        }

        builder
            .push(" AND COALESCE(body -> ")
            .push_bind(condition.field().to_string())
            .push(", 'null'::jsonb)");

        match condition {
            Condition::Eq(_, value) => {
                builder.push(" = ").push_bind(Json(value.clone()));
            }
            Condition::Ne(_, value) => {
                builder.push(" <> ").push_bind(Json(value.clone()));
            }
            Condition::In(_, values) => {
                builder.push(" IN (");
                let mut list = builder.separated(", ");
                for value in values {
                    list.push_bind(Json(value.clone()));
                }
                list.push_unseparated(")");
            }
        }
    }
}

fn rows_to_u64(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    #[instrument(skip_all, name = "rc.store.find_one", fields(collection = %collection))]
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Value>, StoreError> {
        timed("find_one", async {
            filter.validate()?;
            let mut builder = QueryBuilder::new("SELECT body FROM documents");
            push_where(&mut builder, collection, filter);
            builder.push(" ORDER BY id LIMIT 1");

            let row: Option<Json<Value>> = builder
                .build_query_scalar()
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(|Json(body)| body))
        })
        .await
    }

    #[instrument(skip_all, name = "rc.store.find_many", fields(collection = %collection))]
    async fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        timed("find_many", async {
            filter.validate()?;
            let mut builder = QueryBuilder::new("SELECT body FROM documents");
            push_where(&mut builder, collection, filter);
            builder.push(" ORDER BY id");

            let rows: Vec<Json<Value>> = builder
                .build_query_scalar()
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(|Json(body)| body).collect())
        })
        .await
    }

    #[instrument(skip_all, name = "rc.store.count", fields(collection = %collection))]
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        timed("count", async {
            filter.validate()?;
            let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM documents");
            push_where(&mut builder, collection, filter);

            let count: i64 = builder
                .build_query_scalar()
                .fetch_one(&self.pool)
                .await?;
            Ok(rows_to_u64(count))
        })
        .await
    }

    #[instrument(skip_all, name = "rc.store.insert_one", fields(collection = %collection, id = %id))]
    async fn insert_one(
        &self,
        collection: &str,
        id: &str,
        document: Value,
    ) -> Result<(), StoreError> {
        timed("insert_one", async {
            sqlx::query("INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)")
                .bind(collection)
                .bind(id)
                .bind(Json(document))
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    #[instrument(skip_all, name = "rc.store.insert_one_bounded", fields(collection = %collection, id = %id))]
    async fn insert_one_bounded(
        &self,
        collection: &str,
        id: &str,
        document: Value,
        limit: u64,
    ) -> Result<bool, StoreError> {
        timed("insert_one_bounded", async {
            let mut tx = self.pool.begin().await?;

            // Serializes bounded inserts into the same collection until commit
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(collection)
                .execute(&mut *tx)
                .await?;

            let result = sqlx::query(
                r#"
                INSERT INTO documents (collection, id, body)
                SELECT $1, $2, $3
                WHERE (SELECT COUNT(*) FROM documents WHERE collection = $1) < $4
                "#,
            )
            .bind(collection)
            .bind(id)
            .bind(Json(document))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(result.rows_affected() == 1)
        })
        .await
    }

    #[instrument(skip_all, name = "rc.store.update_one", fields(collection = %collection))]
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<u64, StoreError> {
        timed("update_one", async {
            filter.validate()?;
            update.validate()?;

            let mut builder = QueryBuilder::new("UPDATE documents SET body = body || ");
            builder
                .push_bind(Json(update.to_value()))
                .push(" WHERE collection = ")
                .push_bind(collection.to_string())
                .push(" AND id = (SELECT id FROM documents");
            push_where(&mut builder, collection, filter);
            builder.push(" ORDER BY id LIMIT 1)");

            let result = builder.build().execute(&self.pool).await?;
            Ok(result.rows_affected())
        })
        .await
    }

    #[instrument(skip_all, name = "rc.store.update_many", fields(collection = %collection))]
    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<u64, StoreError> {
        timed("update_many", async {
            filter.validate()?;
            update.validate()?;

            let mut builder = QueryBuilder::new("UPDATE documents SET body = body || ");
            builder.push_bind(Json(update.to_value()));
            push_where(&mut builder, collection, filter);

            let result = builder.build().execute(&self.pool).await?;
            Ok(result.rows_affected())
        })
        .await
    }

    #[instrument(skip_all, name = "rc.store.delete", fields(collection = %collection, id = %id))]
    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<u64, StoreError> {
        timed("delete", async {
            let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    #[instrument(skip_all, name = "rc.store.ensure_unique_index", fields(collection = %collection, field = %field))]
    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        timed("ensure_unique_index", async {
            validate_identifier(collection)?;
            validate_identifier(field)?;

            let sql = format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS documents_{collection}_{field}_unique \
                 ON documents ((body ->> '{field}')) WHERE collection = '{collection}'"
            );
            sqlx::query(&sql).execute(&self.pool).await?;

            tracing::info!(
                target: "rc.repository.postgres",
                collection = %collection,
                field = %field,
                "Unique index ensured"
            );
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        timed("ping", async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }
}
