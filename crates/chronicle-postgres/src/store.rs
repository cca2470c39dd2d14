//! PostgreSQL event store: stream lifecycle, append and read paths.

use std::sync::Arc;

use chronicle_core::error::StoreError;
use chronicle_core::event::PendingEvent;
use chronicle_core::matcher::MetadataMatcher;
use chronicle_core::metadata::Metadata;
use chronicle_core::registry::TypeRegistry;
use sqlx::PgPool;

use crate::iterator::EventIterator;
use crate::query::{BindValue, compile_matcher};
use crate::schema::{
    AGGREGATE_VERSION_INDEX_SUFFIX, CREATE_EVENT_STREAMS_TABLE, CREATE_PROJECTIONS_TABLE,
    EVENT_STREAMS_TABLE, PROJECTIONS_TABLE, create_stream_table_statements,
    drop_stream_table_statement,
};
use crate::table_name::{quote_ident, quote_literal, stream_table_name};

/// Per-stream arguments for a merged read.
#[derive(Debug, Clone)]
pub struct LoadStreamParameter {
    /// Logical stream name.
    pub stream_name: String,
    /// First sequence number to read (inclusive).
    pub from_number: i64,
    /// Metadata filter; empty means no filter.
    pub matcher: MetadataMatcher,
}

impl LoadStreamParameter {
    /// Unfiltered read of one stream from `from_number`.
    pub fn new(stream_name: impl Into<String>, from_number: i64) -> Self {
        Self {
            stream_name: stream_name.into(),
            from_number,
            matcher: MetadataMatcher::new(),
        }
    }

    /// Attaches a metadata filter.
    #[must_use]
    pub fn with_matcher(mut self, matcher: MetadataMatcher) -> Self {
        self.matcher = matcher;
        self
    }
}

/// PostgreSQL-backed event store.
///
/// Each logical stream is backed by its own physical table (named by
/// [`stream_table_name`]) and registered in the `event_streams`
/// bookkeeping table; the registry row and the physical table are created
/// and dropped together.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a store on an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotently creates the stream and projection registry tables.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the probe or DDL fails.
    pub async fn install(&self) -> Result<(), StoreError> {
        self.create_registry_table(EVENT_STREAMS_TABLE, CREATE_EVENT_STREAMS_TABLE)
            .await?;
        self.create_registry_table(PROJECTIONS_TABLE, CREATE_PROJECTIONS_TABLE)
            .await
    }

    async fn create_registry_table(&self, table: &str, ddl: &str) -> Result<(), StoreError> {
        if self.table_exists(table).await? {
            return Ok(());
        }
        sqlx::query(ddl)
            .execute(&self.pool)
            .await
            .map_err(StoreError::storage)?;
        tracing::debug!(table, "created registry table");
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_tables WHERE tablename = $1)")
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::storage)
    }

    /// Registers a stream and creates its physical table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StreamAlreadyExists`] if the name is taken and
    /// [`StoreError::SchemaCreationFailed`] if the table DDL is rejected.
    pub async fn create_stream(&self, stream_name: &str) -> Result<(), StoreError> {
        self.register_stream(stream_name).await?;
        self.create_stream_schema(stream_name).await?;
        tracing::info!(stream = stream_name, "created stream");
        Ok(())
    }

    /// Inserts the stream's registry row.
    ///
    /// The registry's uniqueness constraints are authoritative: a
    /// concurrent duplicate registration loses with
    /// [`StoreError::StreamAlreadyExists`], no pre-check involved.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StreamAlreadyExists`] on a uniqueness
    /// violation, [`StoreError::Storage`] otherwise.
    pub async fn register_stream(&self, stream_name: &str) -> Result<(), StoreError> {
        let table_name = stream_table_name(stream_name);
        let insert = format!(
            "INSERT INTO {EVENT_STREAMS_TABLE} (real_stream_name, stream_name, metadata) VALUES ($1, $2, $3)"
        );

        match sqlx::query(&insert)
            .bind(stream_name)
            .bind(&table_name)
            .bind(sqlx::types::Json(Metadata::new()))
            .execute(&self.pool)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::StreamAlreadyExists {
                stream: stream_name.to_owned(),
            }),
            Err(err) => Err(StoreError::storage(err)),
        }
    }

    /// Deletes the stream's registry row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StreamNotFound`] if no row was deleted.
    pub async fn unregister_stream(&self, stream_name: &str) -> Result<(), StoreError> {
        let delete = format!("DELETE FROM {EVENT_STREAMS_TABLE} WHERE real_stream_name = $1");
        let result = sqlx::query(&delete)
            .bind(stream_name)
            .execute(&self.pool)
            .await
            .map_err(StoreError::storage)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::StreamNotFound {
                stream: stream_name.to_owned(),
            });
        }
        Ok(())
    }

    /// Returns `true` if the stream is registered.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the query fails.
    pub async fn has_stream(&self, stream_name: &str) -> Result<bool, StoreError> {
        let exists = format!(
            "SELECT EXISTS(SELECT 1 FROM {EVENT_STREAMS_TABLE} WHERE real_stream_name = $1)"
        );
        sqlx::query_scalar(&exists)
            .bind(stream_name)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::storage)
    }

    /// Lists registered stream names, excluding system streams (names
    /// starting with `$`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the query fails.
    pub async fn stream_names(&self) -> Result<Vec<String>, StoreError> {
        let select = format!(
            "SELECT real_stream_name FROM {EVENT_STREAMS_TABLE} WHERE real_stream_name NOT LIKE '$%'"
        );
        sqlx::query_scalar(&select)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::storage)
    }

    /// Unregisters a stream, then drops its physical table. If the
    /// registry row is missing nothing is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StreamNotFound`] if the stream was not
    /// registered.
    pub async fn delete_stream(&self, stream_name: &str) -> Result<(), StoreError> {
        self.unregister_stream(stream_name).await?;
        self.drop_stream_schema(stream_name).await?;
        tracing::info!(stream = stream_name, "deleted stream");
        Ok(())
    }

    /// Creates the stream's physical table, check constraints and
    /// per-aggregate indexes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SchemaCreationFailed`] if any DDL statement
    /// is rejected.
    pub async fn create_stream_schema(&self, stream_name: &str) -> Result<(), StoreError> {
        let table_name = stream_table_name(stream_name);
        for statement in create_stream_table_statements(&table_name) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(|err| StoreError::SchemaCreationFailed {
                    stream: stream_name.to_owned(),
                    reason: err.to_string(),
                })?;
        }
        Ok(())
    }

    /// Drops the stream's physical table; a no-op when already absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the drop fails.
    pub async fn drop_stream_schema(&self, stream_name: &str) -> Result<(), StoreError> {
        let table_name = stream_table_name(stream_name);
        sqlx::query(&drop_stream_table_statement(&table_name))
            .execute(&self.pool)
            .await
            .map_err(StoreError::storage)?;
        Ok(())
    }

    /// Appends a batch of events to a stream inside one transaction,
    /// preserving the caller-supplied order. All-or-nothing: any failure
    /// rolls back the whole batch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConcurrencyConflict`] when an event claims an
    /// aggregate version that is already taken, [`StoreError::Storage`]
    /// for any other fault.
    pub async fn append_to(
        &self,
        stream_name: &str,
        events: Vec<PendingEvent>,
    ) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let table_name = stream_table_name(stream_name);
        let insert = format!(
            "INSERT INTO {table} (event_id, event_name, payload, metadata, created_at) VALUES ($1, $2, $3, $4, $5)",
            table = quote_ident(&table_name)
        );

        let mut tx = self.pool.begin().await.map_err(StoreError::storage)?;
        for event in &events {
            sqlx::query(&insert)
                .bind(event.event_id)
                .bind(&event.event_name)
                .bind(&event.payload)
                .bind(sqlx::types::Json(&event.metadata))
                .bind(event.created_at.naive_utc())
                .execute(&mut *tx)
                .await
                .map_err(|err| classify_append_error(stream_name, err))?;
        }
        tx.commit().await.map_err(StoreError::storage)?;

        tracing::debug!(stream = stream_name, count = events.len(), "appended events");
        Ok(())
    }

    /// Opens a lazy cursor over one stream from `from_number`, optionally
    /// bounded to `count` events and filtered by `matcher`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StreamNotFound`] before any page is fetched
    /// if the stream is not registered.
    pub async fn load<E>(
        &self,
        registry: Arc<TypeRegistry<E>>,
        stream_name: &str,
        from_number: i64,
        count: Option<i64>,
        matcher: &MetadataMatcher,
    ) -> Result<EventIterator<E>, StoreError> {
        let (query, values) = self.create_query(stream_name, from_number, 0, matcher).await?;
        Ok(EventIterator::new(
            self.pool.clone(),
            registry,
            query,
            values,
            count,
        ))
    }

    /// Opens a lazy cursor over several streams at once. Each stream gets
    /// its own bounded sub-query; with more than one stream the union is
    /// ordered by `created_at` so interleaved history comes back in
    /// wall-clock order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StreamNotFound`] before any query executes
    /// if any requested stream is not registered.
    pub async fn merge_and_load<E>(
        &self,
        registry: Arc<TypeRegistry<E>>,
        count: Option<i64>,
        streams: &[LoadStreamParameter],
    ) -> Result<EventIterator<E>, StoreError> {
        let mut param_counter = 0;
        let mut queries = Vec::with_capacity(streams.len());
        let mut parameters: Vec<BindValue> = Vec::new();

        for stream in streams {
            let (query, values) = self
                .create_query(
                    &stream.stream_name,
                    stream.from_number,
                    param_counter,
                    &stream.matcher,
                )
                .await?;

            param_counter += values.len();
            queries.push(format!("({query})"));
            parameters.extend(values);
        }

        let grouped = if queries.len() > 1 {
            format!("{} ORDER BY created_at ASC", queries.join(" UNION ALL "))
        } else {
            queries
                .into_iter()
                .next()
                .ok_or_else(|| StoreError::Storage("merge read of zero streams".to_owned()))?
        };

        Ok(EventIterator::new(
            self.pool.clone(),
            registry,
            grouped,
            parameters,
            count,
        ))
    }

    /// Builds one stream's SELECT with its bind values, numbering
    /// parameters from `param_offset`. Verifies registration first.
    async fn create_query(
        &self,
        stream_name: &str,
        from_number: i64,
        param_offset: usize,
        matcher: &MetadataMatcher,
    ) -> Result<(String, Vec<BindValue>), StoreError> {
        if !self.has_stream(stream_name).await? {
            return Err(StoreError::StreamNotFound {
                stream: stream_name.to_owned(),
            });
        }

        let table_name = stream_table_name(stream_name);
        let (mut wheres, mut values) = compile_matcher(param_offset, matcher)?;

        wheres.push(format!("no >= ${}", param_offset + values.len() + 1));
        values.push(BindValue::Int(from_number));

        let query = format!(
            "SELECT no, event_id, event_name, payload, metadata, created_at, {stream} AS stream FROM {table} WHERE {wheres} ORDER BY no ASC",
            stream = quote_literal(stream_name),
            table = quote_ident(&table_name),
            wheres = wheres.join(" AND ")
        );

        Ok((query, values))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Maps an insert failure during append: a violation of the
/// aggregate-version index is an optimistic concurrency conflict, anything
/// else stays a storage fault.
fn classify_append_error(stream_name: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation()
            && db
                .constraint()
                .is_some_and(|constraint| constraint.ends_with(AGGREGATE_VERSION_INDEX_SUFFIX))
        {
            return StoreError::ConcurrencyConflict {
                stream: stream_name.to_owned(),
            };
        }
    }
    StoreError::storage(err)
}
