//! Lazy, paginated event iterator.
//!
//! Pages are fetched on demand with `LIMIT`/`OFFSET` and buffered after
//! decoding, so advancing inside an already-fetched page does no I/O and
//! [`EventIterator::restart`] replays the buffer without re-querying.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chronicle_core::error::StoreError;
use chronicle_core::event::RecordedEvent;
use chronicle_core::metadata::Metadata;
use chronicle_core::registry::TypeRegistry;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::query::{BindValue, bind_values};

/// Rows fetched per round trip.
const PAGE_SIZE: i64 = 1000;

/// A lazy, restartable cursor over the events produced by a compiled
/// stream query.
///
/// The cursor is parked in its error state by the first storage or decode
/// fault; from then on [`advance`](Self::advance) produces nothing and the
/// error is reported through [`current`](Self::current),
/// [`is_empty`](Self::is_empty), [`drain_to_list`](Self::drain_to_list)
/// and [`error`](Self::error) until [`restart`](Self::restart) clears it.
pub struct EventIterator<E> {
    pool: PgPool,
    registry: Arc<TypeRegistry<E>>,
    query: String,
    parameters: Vec<BindValue>,
    remaining: Option<i64>,
    offset: i64,
    position: Option<usize>,
    events: Vec<RecordedEvent<E>>,
    done: bool,
    error: Option<StoreError>,
}

impl<E> EventIterator<E> {
    pub(crate) fn new(
        pool: PgPool,
        registry: Arc<TypeRegistry<E>>,
        query: String,
        parameters: Vec<BindValue>,
        count: Option<i64>,
    ) -> Self {
        Self {
            pool,
            registry,
            query,
            parameters,
            remaining: count,
            offset: 0,
            position: None,
            events: Vec::new(),
            done: false,
            error: None,
        }
    }

    /// Moves to the next event, fetching the next page if the buffer is
    /// consumed. Returns `false` once exhausted or errored.
    pub async fn advance(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }

        let next = self.position.map_or(0, |position| position + 1);
        if next < self.events.len() {
            self.position = Some(next);
            return true;
        }

        self.fetch_page().await;

        if self.error.is_none() && next < self.events.len() {
            self.position = Some(next);
            return true;
        }

        self.position = Some(self.events.len());
        false
    }

    /// Returns the event at the cursor, advancing once first if the
    /// cursor has never been positioned.
    ///
    /// # Errors
    ///
    /// Returns the stored error if the cursor is in its error state.
    pub async fn current(&mut self) -> Result<Option<&RecordedEvent<E>>, StoreError> {
        if self.position.is_none() {
            self.advance().await;
        }
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        Ok(self.position.and_then(|position| self.events.get(position)))
    }

    /// Rewinds to the start of the already-buffered events and clears any
    /// stored error. Fetched pages are replayed, not re-queried.
    pub fn restart(&mut self) {
        self.position = None;
        self.error = None;
    }

    /// The stored error, if the cursor is in its error state.
    #[must_use]
    pub fn error(&self) -> Option<&StoreError> {
        self.error.as_ref()
    }

    /// Forces one [`advance`](Self::advance) and reports whether the
    /// query produced no events at all.
    ///
    /// # Errors
    ///
    /// Returns the stored error if the cursor is in its error state.
    pub async fn is_empty(&mut self) -> Result<bool, StoreError> {
        self.advance().await;
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        Ok(self.events.is_empty())
    }

    /// Drops the buffer and stops fetching; the cursor is terminal.
    pub fn close(&mut self) {
        self.events.clear();
        self.position = None;
        self.done = true;
    }

    async fn fetch_page(&mut self) {
        if self.done {
            return;
        }
        if let Some(remaining) = self.remaining {
            if remaining <= 0 {
                self.done = true;
                return;
            }
        }

        let limit = self.remaining.map_or(PAGE_SIZE, |r| r.min(PAGE_SIZE));
        let paged = format!(
            "{query} LIMIT {limit} OFFSET {offset}",
            query = self.query,
            offset = self.offset
        );
        tracing::debug!(offset = self.offset, limit, "fetching event page");

        let rows = match bind_values(sqlx::query(&paged), &self.parameters)
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                self.error = Some(StoreError::storage(err));
                return;
            }
        };

        let fetched = i64::try_from(rows.len()).unwrap_or(i64::MAX);
        let mut decoded: i64 = 0;
        for row in rows {
            match decode_row(&self.registry, &row) {
                Ok(event) => {
                    self.events.push(event);
                    decoded += 1;
                }
                Err(err) => {
                    self.error = Some(err);
                    break;
                }
            }
        }

        self.offset += decoded;
        if let Some(remaining) = &mut self.remaining {
            *remaining -= decoded;
            if *remaining <= 0 {
                self.done = true;
            }
        }
        if self.error.is_none() && fetched < limit {
            self.done = true;
        }
    }
}

impl<E: Clone> EventIterator<E> {
    /// Advances to exhaustion, collecting every produced event.
    ///
    /// # Errors
    ///
    /// Propagates the first storage or decode error encountered and stops.
    pub async fn drain_to_list(&mut self) -> Result<Vec<RecordedEvent<E>>, StoreError> {
        let mut list = Vec::new();
        while self.advance().await {
            if let Some(event) = self.position.and_then(|position| self.events.get(position)) {
                list.push(event.clone());
            }
        }
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        Ok(list)
    }
}

fn decode_row<E>(registry: &TypeRegistry<E>, row: &PgRow) -> Result<RecordedEvent<E>, StoreError> {
    let no: i64 = row.try_get("no").map_err(StoreError::storage)?;
    let event_id: Uuid = row.try_get("event_id").map_err(StoreError::storage)?;
    let event_name: String = row.try_get("event_name").map_err(StoreError::storage)?;
    let payload: serde_json::Value = row.try_get("payload").map_err(StoreError::storage)?;
    let metadata: sqlx::types::Json<Metadata> =
        row.try_get("metadata").map_err(StoreError::storage)?;
    let created_at: chrono::NaiveDateTime =
        row.try_get("created_at").map_err(StoreError::storage)?;
    let stream: String = row.try_get("stream").map_err(StoreError::storage)?;

    let payload = registry.decode(&event_name, payload)?;

    Ok(RecordedEvent {
        no,
        event_id,
        event_name,
        payload,
        metadata: metadata.0,
        created_at: DateTime::from_naive_utc_and_offset(created_at, Utc),
        stream,
    })
}
