//! Store gateway for game records
//!
//! The reconciliation engine only talks to the store through [`GameStore`].
//! Two implementations ship with the server:
//! - [`SqliteGameStore`]: durable storage on SQLite via sqlx
//! - [`MemoryGameStore`]: process-local storage for tests and ephemeral runs
//!
//! # Conditional writes
//!
//! `replace` and `delete` take the `lastActionId` the caller observed when it
//! read the record. If the stored token has moved since, the write is refused
//! with [`StoreError::Conflict`]. `insert` refuses a second record of the same
//! user carrying an already used `createdId`. Callers re-run their
//! read-decide-write sequence on conflict.

mod memory;
mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::games::{Game, GamePreviewWithUserId, User};

pub use memory::MemoryGameStore;
pub use sqlite::SqliteGameStore;

/// Store-level failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write lost against a concurrent writer
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row no longer satisfies the record invariants
    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Per-user game collection plus the cross-user queries of the leaderboard
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Point lookup by record id
    async fn get(&self, user_id: &str, id: &str) -> StoreResult<Option<Game>>;

    /// Lookup by creation idempotency key, at most one record
    async fn find_by_created_id(&self, user_id: &str, created_id: &str)
        -> StoreResult<Option<Game>>;

    /// Records with `createdTimestamp >= since`, oldest first
    async fn created_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Game>>;

    /// Persist a new record and return its assigned id.
    ///
    /// `game.id` is ignored.
    async fn insert(&self, user_id: &str, game: &Game) -> StoreResult<String>;

    /// Replace the record `game.id` if its stored token is still `expected_action_id`
    async fn replace(&self, user_id: &str, game: &Game, expected_action_id: &str)
        -> StoreResult<()>;

    /// Delete the record `id` if its stored token is still `expected_action_id`
    async fn delete(&self, user_id: &str, id: &str, expected_action_id: &str) -> StoreResult<()>;

    /// Best games of one board size across all users, highest total sum first
    async fn best_by_total_sum(
        &self,
        count_rows_and_columns: u32,
        limit: usize,
    ) -> StoreResult<Vec<GamePreviewWithUserId>>;

    /// Whether any user already carries `nickname`
    async fn nickname_exists(&self, nickname: &str) -> StoreResult<bool>;

    /// Nicknames of the given users; unknown users are absent from the map
    async fn nicknames(&self, user_ids: &[String]) -> StoreResult<HashMap<String, String>>;

    /// Register or rename a user
    async fn save_user(&self, user: &User) -> StoreResult<()>;
}
