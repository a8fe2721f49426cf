//! Pull side of sync: what changed or appeared since the client last looked

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use crate::games::Game;
use crate::store::{GameStore, StoreResult};

use super::types::{GetUpdatedRequest, GetUpdatedResponse};

/// Default clamp for `getCreatedAfter` pages
pub const DEFAULT_MAX_PAGE_SIZE: usize = 500;

/// Answers pull queries against a [`GameStore`]
#[derive(Clone)]
pub struct PullResponder {
    store: Arc<dyn GameStore>,
    max_page_size: usize,
}

impl PullResponder {
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        Self::with_max_page_size(store, DEFAULT_MAX_PAGE_SIZE)
    }

    pub fn with_max_page_size(store: Arc<dyn GameStore>, max_page_size: usize) -> Self {
        Self {
            store,
            max_page_size,
        }
    }

    /// Compare each known record against the store
    ///
    /// Entries are looked up concurrently; a failed lookup only affects its
    /// own entry.
    pub async fn get_updated(
        &self,
        user_id: &str,
        known: Vec<GetUpdatedRequest>,
    ) -> Vec<GetUpdatedResponse> {
        let lookups = known.into_iter().map(|entry| async move {
            match self.store.get(user_id, &entry.id).await {
                Ok(None) => GetUpdatedResponse::Deleted { id: entry.id },
                Ok(Some(game)) if game.last_action_id == entry.last_action_id => {
                    GetUpdatedResponse::no_changes(entry.id)
                }
                Ok(Some(game)) => GetUpdatedResponse::Changed {
                    id: entry.id,
                    game: game.resynced(),
                },
                Err(e) => {
                    tracing::warn!(
                        user_id = %user_id,
                        game_id = %entry.id,
                        "Lookup failed: {}",
                        e
                    );
                    GetUpdatedResponse::Failed {
                        id: entry.id,
                        reason: e.to_string(),
                    }
                }
            }
        });

        join_all(lookups).await
    }

    /// Records created at or after `since`, oldest first, minus `excluded`
    ///
    /// Over-fetches by the number of exclusions so that filtering still
    /// fills the page when the excluded ids fall inside it.
    pub async fn get_created_after(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        excluded: &[String],
        limit: usize,
    ) -> StoreResult<Vec<Game>> {
        let limit = limit.min(self.max_page_size);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();
        let candidates = self
            .store
            .created_since(user_id, since, limit + excluded.len())
            .await?;

        let page: Vec<Game> = candidates
            .into_iter()
            .filter(|g| !excluded.contains(g.id.as_str()))
            .take(limit)
            .map(|g| g.resynced())
            .collect();

        tracing::debug!(
            user_id = %user_id,
            since = since.timestamp_millis(),
            returned = page.len(),
            "Created-after page"
        );
        Ok(page)
    }
}
