//! PostgreSQL projection bookkeeping.

use async_trait::async_trait;
use chronicle_core::error::StoreError;
use chronicle_core::projection::{Position, ProjectionStore, Status};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::schema::PROJECTIONS_TABLE;

/// PostgreSQL-backed [`ProjectionStore`].
///
/// One row per projection in the `projections` table. State and position
/// are stored verbatim as JSONB; the `locked_until` lease column is
/// written as NULL on create and left to external schedulers.
#[derive(Debug, Clone)]
pub struct PostgresProjectionManager {
    pool: PgPool,
}

impl PostgresProjectionManager {
    /// Creates a manager on an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectionStore for PostgresProjectionManager {
    async fn create(
        &self,
        name: &str,
        state: serde_json::Value,
        status: Status,
    ) -> Result<(), StoreError> {
        let insert = format!(
            "INSERT INTO {PROJECTIONS_TABLE} (name, position, state, status, locked_until) VALUES ($1, $2, $3, $4, NULL)"
        );
        sqlx::query(&insert)
            .bind(name)
            .bind(Json(Position::new()))
            .bind(state)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(StoreError::storage)?;

        tracing::info!(projection = name, "created projection");
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let exists =
            format!("SELECT EXISTS(SELECT 1 FROM {PROJECTIONS_TABLE} WHERE name = $1)");
        sqlx::query_scalar(&exists)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::storage)
    }

    async fn fetch_status(&self, name: &str) -> Result<Status, StoreError> {
        let select = format!("SELECT status FROM {PROJECTIONS_TABLE} WHERE name = $1");
        let status: Option<String> = sqlx::query_scalar(&select)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::storage)?;

        status
            .ok_or_else(|| StoreError::ProjectionNotFound {
                name: name.to_owned(),
            })?
            .parse()
    }

    async fn load(&self, name: &str) -> Result<(Position, serde_json::Value), StoreError> {
        let select =
            format!("SELECT position, state FROM {PROJECTIONS_TABLE} WHERE name = $1 LIMIT 1");
        let row: Option<(Option<Json<Position>>, Option<serde_json::Value>)> =
            sqlx::query_as(&select)
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::storage)?;

        let (position, state) = row.ok_or_else(|| StoreError::ProjectionNotFound {
            name: name.to_owned(),
        })?;

        Ok((
            position.map(|json| json.0).unwrap_or_default(),
            state.unwrap_or(serde_json::Value::Null),
        ))
    }

    async fn update_status(&self, name: &str, status: Status) -> Result<(), StoreError> {
        let update = format!("UPDATE {PROJECTIONS_TABLE} SET status = $1 WHERE name = $2");
        let result = sqlx::query(&update)
            .bind(status.as_str())
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(StoreError::storage)?;

        require_row(result.rows_affected(), name)
    }

    async fn reset(&self, name: &str, state: serde_json::Value) -> Result<(), StoreError> {
        let update = format!(
            "UPDATE {PROJECTIONS_TABLE} SET status = $1, state = $2, position = $3 WHERE name = $4"
        );
        let result = sqlx::query(&update)
            .bind(Status::Idle.as_str())
            .bind(state)
            .bind(Json(Position::new()))
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(StoreError::storage)?;

        require_row(result.rows_affected(), name)
    }

    async fn persist(
        &self,
        name: &str,
        state: serde_json::Value,
        position: Position,
    ) -> Result<(), StoreError> {
        let update = format!(
            "UPDATE {PROJECTIONS_TABLE} SET status = $1, state = $2, position = $3 WHERE name = $4"
        );
        let result = sqlx::query(&update)
            .bind(Status::Idle.as_str())
            .bind(state)
            .bind(Json(position))
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(StoreError::storage)?;

        require_row(result.rows_affected(), name)?;
        tracing::debug!(projection = name, "persisted projection checkpoint");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let delete = format!("DELETE FROM {PROJECTIONS_TABLE} WHERE name = $1");
        let result = sqlx::query(&delete)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(StoreError::storage)?;

        require_row(result.rows_affected(), name)?;
        tracing::info!(projection = name, "deleted projection");
        Ok(())
    }
}

fn require_row(rows_affected: u64, name: &str) -> Result<(), StoreError> {
    if rows_affected == 0 {
        return Err(StoreError::ProjectionNotFound {
            name: name.to_owned(),
        });
    }
    Ok(())
}
