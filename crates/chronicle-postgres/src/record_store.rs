//! Ad-hoc record CRUD for external read models.
//!
//! Projections that materialize custom read-model tables use this instead
//! of the stream tables. Table and column names are caller-supplied and
//! are always routed through identifier quoting; values always bind
//! positionally.

use chronicle_core::error::StoreError;
use sqlx::PgPool;

use crate::query::{BindValue, bind_values};
use crate::table_name::quote_ident;

/// Column name/value pair list for inserts, updates and row matches.
pub type ColumnValues<'a> = [(&'a str, BindValue)];

/// PostgreSQL-backed generic record store.
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Creates a record store on an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns `true` if the table exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the probe fails.
    pub async fn exists(&self, table: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_tables WHERE tablename = $1)")
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::storage)
    }

    /// Drops the table; a no-op when already absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the drop fails.
    pub async fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        let drop = format!("DROP TABLE IF EXISTS {};", quote_ident(table));
        sqlx::query(&drop)
            .execute(&self.pool)
            .await
            .map_err(StoreError::storage)?;
        Ok(())
    }

    /// Truncates the table and restarts its identity sequences.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the truncate fails.
    pub async fn reset(&self, table: &str) -> Result<(), StoreError> {
        let truncate = format!("TRUNCATE TABLE {} RESTART IDENTITY;", quote_ident(table));
        sqlx::query(&truncate)
            .execute(&self.pool)
            .await
            .map_err(StoreError::storage)?;
        Ok(())
    }

    /// Inserts one row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] on an empty column list or if the
    /// insert fails.
    pub async fn insert(&self, table: &str, values: &ColumnValues<'_>) -> Result<(), StoreError> {
        if values.is_empty() {
            return Err(StoreError::Storage("insert requires columns".to_owned()));
        }

        let columns: Vec<String> = values
            .iter()
            .map(|(column, _)| quote_ident(column))
            .collect();
        let placeholders: Vec<String> = (1..=values.len()).map(|n| format!("${n}")).collect();
        let insert = format!(
            "INSERT INTO {table} ({columns}) VALUES ({placeholders});",
            table = quote_ident(table),
            columns = columns.join(","),
            placeholders = placeholders.join(",")
        );

        let bound: Vec<BindValue> = values.iter().map(|(_, value)| value.clone()).collect();
        bind_values(sqlx::query(&insert), &bound)
            .execute(&self.pool)
            .await
            .map_err(StoreError::storage)?;
        Ok(())
    }

    /// Deletes the rows matching every identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] on an empty identifier list or if
    /// the delete fails.
    pub async fn remove(
        &self,
        table: &str,
        identifiers: &ColumnValues<'_>,
    ) -> Result<(), StoreError> {
        if identifiers.is_empty() {
            return Err(StoreError::Storage("remove requires identifiers".to_owned()));
        }

        let delete = format!(
            "DELETE FROM {table} WHERE {conditions};",
            table = quote_ident(table),
            conditions = assignments(identifiers, 1).join(" AND ")
        );

        let bound: Vec<BindValue> = identifiers.iter().map(|(_, value)| value.clone()).collect();
        bind_values(sqlx::query(&delete), &bound)
            .execute(&self.pool)
            .await
            .map_err(StoreError::storage)?;
        Ok(())
    }

    /// Updates the rows matching every identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] on an empty column or identifier
    /// list, or if the update fails.
    pub async fn update(
        &self,
        table: &str,
        values: &ColumnValues<'_>,
        identifiers: &ColumnValues<'_>,
    ) -> Result<(), StoreError> {
        if values.is_empty() {
            return Err(StoreError::Storage("update requires columns".to_owned()));
        }
        if identifiers.is_empty() {
            return Err(StoreError::Storage("update requires identifiers".to_owned()));
        }

        let update = format!(
            "UPDATE {table} SET {updates} WHERE {conditions};",
            table = quote_ident(table),
            updates = assignments(values, 1).join(","),
            conditions = assignments(identifiers, values.len() + 1).join(" AND ")
        );

        let bound: Vec<BindValue> = values
            .iter()
            .chain(identifiers.iter())
            .map(|(_, value)| value.clone())
            .collect();
        bind_values(sqlx::query(&update), &bound)
            .execute(&self.pool)
            .await
            .map_err(StoreError::storage)?;
        Ok(())
    }
}

/// `"column" = $n` fragments, numbering from `start`.
fn assignments(columns: &ColumnValues<'_>, start: usize) -> Vec<String> {
    columns
        .iter()
        .enumerate()
        .map(|(index, (column, _))| format!("{} = ${}", quote_ident(column), start + index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignments_number_from_start() {
        let columns = [
            ("title", BindValue::Str("a".into())),
            ("count", BindValue::Int(1)),
        ];

        assert_eq!(
            assignments(&columns, 3),
            vec!["\"title\" = $3".to_owned(), "\"count\" = $4".to_owned()]
        );
    }
}
