//! Sync data types
//!
//! Defines the wire envelopes of the replay protocol:
//! - Modification requests queued offline (create, update, delete)
//! - Reconciliation outcomes, one per request, keyed by `localId`
//! - Pull queries for records the client already knows or has not seen yet

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::games::{now_millis, BaseGameInfo, Game};

/// Kind of queued modification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Create,
    Update,
    Delete,
}

// ============================================================================
// Modification Requests
// ============================================================================

/// A game created offline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub local_id: i64,
    /// Client-computed idempotency key, the fingerprint of the created board
    pub created_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_local_modified_timestamp: DateTime<Utc>,
    pub base_game_info: BaseGameInfo,
}

/// A known game edited offline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub local_id: i64,
    pub id: String,
    /// Token of the version the edit was based on
    pub last_action_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_local_modified_timestamp: DateTime<Utc>,
    pub base_game_info: BaseGameInfo,
}

/// A known game deleted offline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub local_id: i64,
    pub id: String,
    pub last_action_id: String,
}

/// One queued modification, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ModifiedRequest {
    Create(CreateRequest),
    Update(UpdateRequest),
    Delete(DeleteRequest),
}

impl ModifiedRequest {
    pub fn local_id(&self) -> i64 {
        match self {
            ModifiedRequest::Create(r) => r.local_id,
            ModifiedRequest::Update(r) => r.local_id,
            ModifiedRequest::Delete(r) => r.local_id,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            ModifiedRequest::Create(_) => Action::Create,
            ModifiedRequest::Update(_) => Action::Update,
            ModifiedRequest::Delete(_) => Action::Delete,
        }
    }
}

// ============================================================================
// Reconciliation Outcomes
// ============================================================================

/// Authoritative outcome of one modification, tagged by `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModifiedResponse {
    /// The created game is stored under `id`
    #[serde(rename_all = "camelCase")]
    CreatedSuccess {
        local_id: i64,
        id: String,
        last_action_id: String,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        created_timestamp: DateTime<Utc>,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        last_synced_timestamp: DateTime<Utc>,
    },

    /// Another device moved the created game on; the client adopts `game`
    #[serde(rename_all = "camelCase")]
    CreatedWasChanged { local_id: i64, game: Game },

    /// The edit is stored under `id`, which may be a new identity
    #[serde(rename_all = "camelCase")]
    Updated {
        local_id: i64,
        id: String,
        last_action_id: String,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        created_timestamp: DateTime<Utc>,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        last_synced_timestamp: DateTime<Utc>,
    },

    /// The game no longer exists
    #[serde(rename_all = "camelCase")]
    DeletedSuccess { local_id: i64 },

    /// The game changed after the client's last sync and was kept
    #[serde(rename_all = "camelCase")]
    DeletedWasChanged { local_id: i64, game: Game },

    /// The item could not be reconciled; the client may replay it later
    #[serde(rename_all = "camelCase")]
    Failed { local_id: i64, reason: String },
}

impl ModifiedResponse {
    pub fn created(local_id: i64, game: &Game) -> Self {
        ModifiedResponse::CreatedSuccess {
            local_id,
            id: game.id.clone(),
            last_action_id: game.last_action_id.clone(),
            created_timestamp: game.created_timestamp,
            last_synced_timestamp: game.last_synced_timestamp,
        }
    }

    pub fn updated(local_id: i64, game: &Game) -> Self {
        ModifiedResponse::Updated {
            local_id,
            id: game.id.clone(),
            last_action_id: game.last_action_id.clone(),
            created_timestamp: game.created_timestamp,
            last_synced_timestamp: game.last_synced_timestamp,
        }
    }

    pub fn failed(local_id: i64, reason: impl ToString) -> Self {
        ModifiedResponse::Failed {
            local_id,
            reason: reason.to_string(),
        }
    }

    pub fn local_id(&self) -> i64 {
        match self {
            ModifiedResponse::CreatedSuccess { local_id, .. }
            | ModifiedResponse::CreatedWasChanged { local_id, .. }
            | ModifiedResponse::Updated { local_id, .. }
            | ModifiedResponse::DeletedSuccess { local_id }
            | ModifiedResponse::DeletedWasChanged { local_id, .. }
            | ModifiedResponse::Failed { local_id, .. } => *local_id,
        }
    }

    /// Action this outcome answers, `None` for failures
    pub fn action(&self) -> Option<Action> {
        match self {
            ModifiedResponse::CreatedSuccess { .. } | ModifiedResponse::CreatedWasChanged { .. } => {
                Some(Action::Create)
            }
            ModifiedResponse::Updated { .. } => Some(Action::Update),
            ModifiedResponse::DeletedSuccess { .. } | ModifiedResponse::DeletedWasChanged { .. } => {
                Some(Action::Delete)
            }
            ModifiedResponse::Failed { .. } => None,
        }
    }
}

// ============================================================================
// Pull Queries
// ============================================================================

/// A record the client holds, with the token it last saw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUpdatedRequest {
    #[serde(rename = "remoteId", alias = "id")]
    pub id: String,
    #[serde(rename = "remoteActionId", alias = "lastActionId")]
    pub last_action_id: String,
}

/// Server-side state of a record the client holds, tagged by `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GetUpdatedResponse {
    #[serde(rename_all = "camelCase")]
    NoChanges {
        id: String,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        last_synced_timestamp: DateTime<Utc>,
    },
    Changed { id: String, game: Game },
    Deleted { id: String },
    Failed { id: String, reason: String },
}

impl GetUpdatedResponse {
    pub fn no_changes(id: String) -> Self {
        GetUpdatedResponse::NoChanges {
            id,
            last_synced_timestamp: now_millis(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            GetUpdatedResponse::NoChanges { id, .. }
            | GetUpdatedResponse::Changed { id, .. }
            | GetUpdatedResponse::Deleted { id }
            | GetUpdatedResponse::Failed { id, .. } => id,
        }
    }
}

/// Page of records created since a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAfterRequest {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_created_timestamp: DateTime<Utc>,
    /// Ids the client already holds
    #[serde(default)]
    pub excluded_remote_ids: Vec<String>,
    pub limit: usize,
}
