//! Reconciliation engine
//!
//! Turns one replayed modification plus the current store state into an
//! authoritative outcome. Each action has a pure classification step that
//! maps the observed state onto one row of its decision table, followed by
//! the write that row prescribes.
//!
//! # Create
//!
//! | stored? | same content | fp(stored) == createdId | fp(request) == createdId | decision |
//! |---------|--------------|-------------------------|--------------------------|----------|
//! | no      |              |                         |                          | `FirstTime` |
//! | yes     | yes          |                         |                          | `DuplicateRetry` |
//! | yes     | no           | no                      | yes                      | `AdvancedByOthers` |
//! | yes     | no           | yes                     | no                       | `AdvancedByCreator` |
//! | yes     | no           | otherwise               |                          | `DivergedEverywhere` |
//!
//! # Update
//!
//! | stored? | same token | same content | decision |
//! |---------|------------|--------------|----------|
//! | no      |            |              | `Recreate` |
//! | yes     | yes        |              | `Apply` |
//! | yes     | no         | yes          | `AlreadyApplied` |
//! | yes     | no         | no           | `Fork` |
//!
//! # Delete
//!
//! | stored? | same token | decision |
//! |---------|------------|----------|
//! | no      |            | `AlreadyDeleted` |
//! | yes     | yes        | `Delete` |
//! | yes     | no         | `WasChanged` |
//!
//! Client edits are never dropped: when the engine cannot tell whose version
//! is newer it stores the client's content under a fresh identity.

use std::future::Future;
use std::sync::Arc;

use crate::games::{fingerprint, new_action_id, now_millis, Game};
use crate::store::{GameStore, StoreResult};

use super::error::SyncResult;
use super::types::{CreateRequest, DeleteRequest, ModifiedRequest, ModifiedResponse, UpdateRequest};

/// Default number of read-decide-write attempts per item
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

// ============================================================================
// Decision Tables
// ============================================================================

/// Row of the create decision table
#[derive(Debug, Clone, PartialEq)]
pub enum CreateDecision {
    /// No record carries the createdId yet
    FirstTime,
    /// The creation already went through, its response was lost
    DuplicateRetry(Game),
    /// Another device advanced the record before the creator heard back
    AdvancedByOthers(Game),
    /// Only the creator advanced the board since the lost response
    AdvancedByCreator(Game),
    /// Both sides advanced; the stored record is released and the request stored anew
    DivergedEverywhere(Game),
}

/// Row of the update decision table
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateDecision {
    /// The record was deleted elsewhere
    Recreate,
    /// Nothing happened since the client's last sync
    Apply(Game),
    /// An identical earlier update went through, its response was lost
    AlreadyApplied(Game),
    /// Concurrent edits or a double submission; the request is stored as a new record
    Fork,
}

/// Row of the delete decision table
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteDecision {
    AlreadyDeleted,
    Delete,
    /// The record changed after the client's last sync and is kept
    WasChanged(Game),
}

pub fn classify_create(stored: Option<Game>, request: &CreateRequest) -> CreateDecision {
    let Some(stored) = stored else {
        return CreateDecision::FirstTime;
    };

    let same_content = stored.info == request.base_game_info;
    let stored_is_creation = fingerprint(&stored.info) == request.created_id;
    let request_is_creation = fingerprint(&request.base_game_info) == request.created_id;

    match (same_content, stored_is_creation, request_is_creation) {
        (true, _, _) => CreateDecision::DuplicateRetry(stored),
        (false, false, true) => CreateDecision::AdvancedByOthers(stored),
        (false, true, false) => CreateDecision::AdvancedByCreator(stored),
        (false, _, _) => CreateDecision::DivergedEverywhere(stored),
    }
}

pub fn classify_update(stored: Option<Game>, request: &UpdateRequest) -> UpdateDecision {
    match stored {
        None => UpdateDecision::Recreate,
        Some(stored) if stored.last_action_id == request.last_action_id => {
            UpdateDecision::Apply(stored)
        }
        Some(stored) if stored.info == request.base_game_info => {
            UpdateDecision::AlreadyApplied(stored)
        }
        Some(_) => UpdateDecision::Fork,
    }
}

pub fn classify_delete(stored: Option<Game>, request: &DeleteRequest) -> DeleteDecision {
    match stored {
        None => DeleteDecision::AlreadyDeleted,
        Some(stored) if stored.last_action_id == request.last_action_id => DeleteDecision::Delete,
        Some(stored) => DeleteDecision::WasChanged(stored),
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Applies replayed modifications against a [`GameStore`]
///
/// Holds no state between calls. Every write that depends on an earlier read
/// is conditional on the token seen by that read; when it loses against a
/// concurrent writer the whole item is re-read and re-decided, up to
/// `max_attempts` times.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn GameStore>,
    max_attempts: u32,
}

impl Reconciler {
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        Self::with_max_attempts(store, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(store: Arc<dyn GameStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    /// Reconcile any kind of modification
    pub async fn reconcile(
        &self,
        user_id: &str,
        request: &ModifiedRequest,
    ) -> SyncResult<ModifiedResponse> {
        match request {
            ModifiedRequest::Create(r) => self.reconcile_create(user_id, r).await,
            ModifiedRequest::Update(r) => self.reconcile_update(user_id, r).await,
            ModifiedRequest::Delete(r) => self.reconcile_delete(user_id, r).await,
        }
    }

    /// Reconcile a game created offline; yields `CreatedSuccess` or `CreatedWasChanged`
    pub async fn reconcile_create(
        &self,
        user_id: &str,
        request: &CreateRequest,
    ) -> SyncResult<ModifiedResponse> {
        self.with_retry(user_id, request.local_id, || self.try_create(user_id, request))
            .await
    }

    /// Reconcile a game edited offline; always yields `Updated`
    pub async fn reconcile_update(
        &self,
        user_id: &str,
        request: &UpdateRequest,
    ) -> SyncResult<ModifiedResponse> {
        self.with_retry(user_id, request.local_id, || self.try_update(user_id, request))
            .await
    }

    /// Reconcile a game deleted offline; yields `DeletedSuccess` or `DeletedWasChanged`
    pub async fn reconcile_delete(
        &self,
        user_id: &str,
        request: &DeleteRequest,
    ) -> SyncResult<ModifiedResponse> {
        self.with_retry(user_id, request.local_id, || self.try_delete(user_id, request))
            .await
    }

    async fn with_retry<F, Fut>(
        &self,
        user_id: &str,
        local_id: i64,
        mut attempt: F,
    ) -> SyncResult<ModifiedResponse>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<ModifiedResponse>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match attempt().await {
                Err(e) if e.is_conflict() && attempts < self.max_attempts => {
                    tracing::debug!(
                        user_id = %user_id,
                        local_id,
                        attempts,
                        "Conflicting write, re-reading: {}",
                        e
                    );
                }
                Err(e) if e.is_conflict() => {
                    tracing::warn!(
                        user_id = %user_id,
                        local_id,
                        attempts,
                        "Giving up after conflicting writes: {}",
                        e
                    );
                    return Err(e.into());
                }
                result => return result.map_err(Into::into),
            }
        }
    }

    async fn try_create(
        &self,
        user_id: &str,
        request: &CreateRequest,
    ) -> StoreResult<ModifiedResponse> {
        let stored = self
            .store
            .find_by_created_id(user_id, &request.created_id)
            .await?;
        let decision = classify_create(stored, request);

        tracing::debug!(
            user_id = %user_id,
            local_id = request.local_id,
            created_id = %request.created_id,
            decision = decision.name(),
            "Reconciling create"
        );

        match decision {
            CreateDecision::FirstTime => self.insert_created(user_id, request).await,

            CreateDecision::DuplicateRetry(stored) => {
                Ok(ModifiedResponse::created(request.local_id, &stored.resynced()))
            }

            CreateDecision::AdvancedByOthers(stored) => Ok(ModifiedResponse::CreatedWasChanged {
                local_id: request.local_id,
                game: stored.resynced(),
            }),

            CreateDecision::AdvancedByCreator(stored) => {
                let game = Game::from_info(
                    request.base_game_info.clone(),
                    stored.id.clone(),
                    new_action_id(),
                    stored.created_timestamp,
                    now_millis(),
                    request.last_local_modified_timestamp,
                    Some(request.created_id.clone()),
                );
                self.store
                    .replace(user_id, &game, &stored.last_action_id)
                    .await?;
                Ok(ModifiedResponse::created(request.local_id, &game))
            }

            CreateDecision::DivergedEverywhere(stored) => {
                // The old record keeps its content and token but stops
                // answering to this createdId.
                let released = Game {
                    created_id: None,
                    ..stored.clone()
                };
                self.store
                    .replace(user_id, &released, &stored.last_action_id)
                    .await?;
                self.insert_created(user_id, request).await
            }
        }
    }

    async fn try_update(
        &self,
        user_id: &str,
        request: &UpdateRequest,
    ) -> StoreResult<ModifiedResponse> {
        let stored = self.store.get(user_id, &request.id).await?;
        let decision = classify_update(stored, request);

        tracing::debug!(
            user_id = %user_id,
            local_id = request.local_id,
            game_id = %request.id,
            decision = decision.name(),
            "Reconciling update"
        );

        match decision {
            UpdateDecision::Recreate | UpdateDecision::Fork => {
                let now = now_millis();
                let mut game = Game::from_info(
                    request.base_game_info.clone(),
                    String::new(),
                    new_action_id(),
                    now,
                    now,
                    request.last_local_modified_timestamp,
                    None,
                );
                game.id = self.store.insert(user_id, &game).await?;
                tracing::info!(
                    user_id = %user_id,
                    from = %request.id,
                    to = %game.id,
                    "Stored update as a new game"
                );
                Ok(ModifiedResponse::updated(request.local_id, &game))
            }

            UpdateDecision::Apply(stored) => {
                let game = Game::from_info(
                    request.base_game_info.clone(),
                    stored.id.clone(),
                    new_action_id(),
                    stored.created_timestamp,
                    now_millis(),
                    request.last_local_modified_timestamp,
                    stored.created_id.clone(),
                );
                self.store
                    .replace(user_id, &game, &request.last_action_id)
                    .await?;
                Ok(ModifiedResponse::updated(request.local_id, &game))
            }

            UpdateDecision::AlreadyApplied(stored) => {
                Ok(ModifiedResponse::updated(request.local_id, &stored.resynced()))
            }
        }
    }

    async fn try_delete(
        &self,
        user_id: &str,
        request: &DeleteRequest,
    ) -> StoreResult<ModifiedResponse> {
        let stored = self.store.get(user_id, &request.id).await?;
        let decision = classify_delete(stored, request);

        tracing::debug!(
            user_id = %user_id,
            local_id = request.local_id,
            game_id = %request.id,
            decision = decision.name(),
            "Reconciling delete"
        );

        match decision {
            DeleteDecision::AlreadyDeleted => Ok(ModifiedResponse::DeletedSuccess {
                local_id: request.local_id,
            }),
            DeleteDecision::Delete => {
                self.store
                    .delete(user_id, &request.id, &request.last_action_id)
                    .await?;
                Ok(ModifiedResponse::DeletedSuccess {
                    local_id: request.local_id,
                })
            }
            DeleteDecision::WasChanged(stored) => Ok(ModifiedResponse::DeletedWasChanged {
                local_id: request.local_id,
                game: stored.resynced(),
            }),
        }
    }

    /// Store a brand-new record for a create request
    async fn insert_created(
        &self,
        user_id: &str,
        request: &CreateRequest,
    ) -> StoreResult<ModifiedResponse> {
        let now = now_millis();
        let mut game = Game::from_info(
            request.base_game_info.clone(),
            String::new(),
            new_action_id(),
            now,
            now,
            request.last_local_modified_timestamp,
            Some(request.created_id.clone()),
        );
        game.id = self.store.insert(user_id, &game).await?;

        tracing::info!(user_id = %user_id, game_id = %game.id, "Created game");
        Ok(ModifiedResponse::created(request.local_id, &game))
    }
}

impl CreateDecision {
    /// Short label for logs
    pub fn name(&self) -> &'static str {
        match self {
            CreateDecision::FirstTime => "first_time",
            CreateDecision::DuplicateRetry(_) => "duplicate_retry",
            CreateDecision::AdvancedByOthers(_) => "advanced_by_others",
            CreateDecision::AdvancedByCreator(_) => "advanced_by_creator",
            CreateDecision::DivergedEverywhere(_) => "diverged_everywhere",
        }
    }
}

impl UpdateDecision {
    pub fn name(&self) -> &'static str {
        match self {
            UpdateDecision::Recreate => "recreate",
            UpdateDecision::Apply(_) => "apply",
            UpdateDecision::AlreadyApplied(_) => "already_applied",
            UpdateDecision::Fork => "fork",
        }
    }
}

impl DeleteDecision {
    pub fn name(&self) -> &'static str {
        match self {
            DeleteDecision::AlreadyDeleted => "already_deleted",
            DeleteDecision::Delete => "delete",
            DeleteDecision::WasChanged(_) => "was_changed",
        }
    }
}
