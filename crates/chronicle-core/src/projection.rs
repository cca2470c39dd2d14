//! Projection bookkeeping contract.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Execution status of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Not currently running.
    Idle,
    /// Actively consuming events.
    Running,
    /// Asked to stop after the current batch.
    Stopping,
}

impl Status {
    /// The persisted string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            other => Err(StoreError::Storage(format!(
                "unknown projection status: {other}"
            ))),
        }
    }
}

/// Checkpoint positions: stream logical name to last consumed sequence
/// number. Only streams the projection has actually consumed appear here.
pub type Position = BTreeMap<String, i64>;

/// Persistence contract for projection bookkeeping rows.
///
/// State and position values are opaque to implementations: they are
/// stored and returned verbatim, never interpreted.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Inserts a new projection row with an empty position map.
    ///
    /// # Errors
    ///
    /// A duplicate name surfaces as [`StoreError::Storage`]; callers that
    /// need to distinguish it should check [`exists`](Self::exists) first.
    async fn create(
        &self,
        name: &str,
        state: serde_json::Value,
        status: Status,
    ) -> Result<(), StoreError>;

    /// Returns `true` if a projection row exists.
    async fn exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Reads the current status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectionNotFound`] if no row matches.
    async fn fetch_status(&self, name: &str) -> Result<Status, StoreError>;

    /// Reads the checkpoint position map and the opaque state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectionNotFound`] if no row matches.
    async fn load(&self, name: &str) -> Result<(Position, serde_json::Value), StoreError>;

    /// Sets the status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectionNotFound`] if no row was updated.
    async fn update_status(&self, name: &str, status: Status) -> Result<(), StoreError>;

    /// Replaces the state, clears the position map and forces the status
    /// back to [`Status::Idle`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectionNotFound`] if no row was updated.
    async fn reset(&self, name: &str, state: serde_json::Value) -> Result<(), StoreError>;

    /// Persists a checkpoint: replaces state and position, forcing the
    /// status back to [`Status::Idle`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectionNotFound`] if no row was updated.
    async fn persist(
        &self,
        name: &str,
        state: serde_json::Value,
        position: Position,
    ) -> Result<(), StoreError>;

    /// Deletes the projection row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProjectionNotFound`] if no row was deleted.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;
}
