//! In-memory `ProjectionStore` fake.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chronicle_core::error::StoreError;
use chronicle_core::projection::{Position, ProjectionStore, Status};

#[derive(Debug, Clone)]
struct ProjectionRow {
    position: Position,
    state: serde_json::Value,
    status: Status,
}

/// A `ProjectionStore` backed by a mutex-guarded map, mirroring the
/// Postgres implementation's semantics: duplicate creates fail, every
/// lookup or conditional update of a missing row reports
/// `ProjectionNotFound`, and `reset`/`persist` force the status back to
/// `Idle`.
///
/// Methods panic if the internal mutex is poisoned.
#[derive(Debug, Default)]
pub struct InMemoryProjectionStore {
    rows: Mutex<HashMap<String, ProjectionRow>>,
}

impl InMemoryProjectionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(name: &str) -> StoreError {
    StoreError::ProjectionNotFound {
        name: name.to_owned(),
    }
}

#[async_trait]
impl ProjectionStore for InMemoryProjectionStore {
    async fn create(
        &self,
        name: &str,
        state: serde_json::Value,
        status: Status,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(name) {
            return Err(StoreError::Storage(format!(
                "duplicate projection name: {name}"
            )));
        }
        rows.insert(
            name.to_owned(),
            ProjectionRow {
                position: Position::new(),
                state,
                status,
            },
        );
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.rows.lock().unwrap().contains_key(name))
    }

    async fn fetch_status(&self, name: &str) -> Result<Status, StoreError> {
        self.rows
            .lock()
            .unwrap()
            .get(name)
            .map(|row| row.status)
            .ok_or_else(|| not_found(name))
    }

    async fn load(&self, name: &str) -> Result<(Position, serde_json::Value), StoreError> {
        self.rows
            .lock()
            .unwrap()
            .get(name)
            .map(|row| (row.position.clone(), row.state.clone()))
            .ok_or_else(|| not_found(name))
    }

    async fn update_status(&self, name: &str, status: Status) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(name).ok_or_else(|| not_found(name))?;
        row.status = status;
        Ok(())
    }

    async fn reset(&self, name: &str, state: serde_json::Value) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(name).ok_or_else(|| not_found(name))?;
        row.status = Status::Idle;
        row.state = state;
        row.position = Position::new();
        Ok(())
    }

    async fn persist(
        &self,
        name: &str,
        state: serde_json::Value,
        position: Position,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(name).ok_or_else(|| not_found(name))?;
        row.status = Status::Idle;
        row.state = state;
        row.position = position;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        rows.remove(name).map(|_| ()).ok_or_else(|| not_found(name))
    }
}
