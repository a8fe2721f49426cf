//! In-memory store gateway

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{GameStore, StoreError, StoreResult};
use crate::games::{Game, GamePreviewWithUserId, User};

/// Process-local [`GameStore`]
///
/// Every call takes the lock once and never holds it across an await, so
/// each operation is atomic with respect to the others.
#[derive(Default)]
pub struct MemoryGameStore {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    /// user id -> record id -> record
    games: HashMap<String, HashMap<String, Game>>,
    users: HashMap<String, User>,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held for a user
    pub fn game_count(&self, user_id: &str) -> usize {
        self.state
            .read()
            .games
            .get(user_id)
            .map_or(0, |games| games.len())
    }
}

fn created_id_taken(games: &HashMap<String, Game>, created_id: &str, except_id: &str) -> bool {
    games
        .values()
        .any(|g| g.id != except_id && g.created_id.as_deref() == Some(created_id))
}

#[async_trait]
impl GameStore for MemoryGameStore {
    async fn get(&self, user_id: &str, id: &str) -> StoreResult<Option<Game>> {
        Ok(self
            .state
            .read()
            .games
            .get(user_id)
            .and_then(|games| games.get(id))
            .cloned())
    }

    async fn find_by_created_id(
        &self,
        user_id: &str,
        created_id: &str,
    ) -> StoreResult<Option<Game>> {
        Ok(self.state.read().games.get(user_id).and_then(|games| {
            games
                .values()
                .find(|g| g.created_id.as_deref() == Some(created_id))
                .cloned()
        }))
    }

    async fn created_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Game>> {
        let state = self.state.read();
        let mut games: Vec<Game> = state
            .games
            .get(user_id)
            .map(|games| {
                games
                    .values()
                    .filter(|g| g.created_timestamp >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        games.sort_by(|a, b| {
            a.created_timestamp
                .cmp(&b.created_timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });
        games.truncate(limit);
        Ok(games)
    }

    async fn insert(&self, user_id: &str, game: &Game) -> StoreResult<String> {
        let mut state = self.state.write();
        let games = state.games.entry(user_id.to_string()).or_default();

        if let Some(created_id) = game.created_id.as_deref() {
            if created_id_taken(games, created_id, "") {
                return Err(StoreError::Conflict(format!(
                    "createdId {} already in use",
                    created_id
                )));
            }
        }

        let id = Uuid::new_v4().to_string();
        let mut stored = game.clone();
        stored.id = id.clone();
        games.insert(id.clone(), stored);
        Ok(id)
    }

    async fn replace(
        &self,
        user_id: &str,
        game: &Game,
        expected_action_id: &str,
    ) -> StoreResult<()> {
        let mut state = self.state.write();
        let games = state.games.entry(user_id.to_string()).or_default();

        match games.get(&game.id) {
            Some(stored) if stored.last_action_id == expected_action_id => {}
            Some(_) => {
                return Err(StoreError::Conflict(format!(
                    "game {} changed since {}",
                    game.id, expected_action_id
                )))
            }
            None => return Err(StoreError::Conflict(format!("game {} is gone", game.id))),
        }

        if let Some(created_id) = game.created_id.as_deref() {
            if created_id_taken(games, created_id, &game.id) {
                return Err(StoreError::Conflict(format!(
                    "createdId {} already in use",
                    created_id
                )));
            }
        }

        games.insert(game.id.clone(), game.clone());
        Ok(())
    }

    async fn delete(&self, user_id: &str, id: &str, expected_action_id: &str) -> StoreResult<()> {
        let mut state = self.state.write();
        let Some(games) = state.games.get_mut(user_id) else {
            return Err(StoreError::Conflict(format!("game {} is gone", id)));
        };

        match games.get(id) {
            Some(stored) if stored.last_action_id == expected_action_id => {
                games.remove(id);
                Ok(())
            }
            Some(_) => Err(StoreError::Conflict(format!(
                "game {} changed since {}",
                id, expected_action_id
            ))),
            None => Err(StoreError::Conflict(format!("game {} is gone", id))),
        }
    }

    async fn best_by_total_sum(
        &self,
        count_rows_and_columns: u32,
        limit: usize,
    ) -> StoreResult<Vec<GamePreviewWithUserId>> {
        let state = self.state.read();
        let mut ranked: Vec<GamePreviewWithUserId> = state
            .games
            .iter()
            .flat_map(|(user_id, games)| {
                games
                    .values()
                    .filter(|g| g.info.count_rows_and_columns() == count_rows_and_columns)
                    .map(move |g| GamePreviewWithUserId {
                        game_preview: g.preview(),
                        user_id: user_id.clone(),
                    })
            })
            .collect();

        ranked.sort_by(|a, b| b.game_preview.total_sum.cmp(&a.game_preview.total_sum));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn nickname_exists(&self, nickname: &str) -> StoreResult<bool> {
        Ok(self
            .state
            .read()
            .users
            .values()
            .any(|u| u.nickname == nickname))
    }

    async fn nicknames(&self, user_ids: &[String]) -> StoreResult<HashMap<String, String>> {
        let state = self.state.read();
        Ok(user_ids
            .iter()
            .filter_map(|id| {
                state
                    .users
                    .get(id)
                    .map(|u| (id.clone(), u.nickname.clone()))
            })
            .collect())
    }

    async fn save_user(&self, user: &User) -> StoreResult<()> {
        self.state
            .write()
            .users
            .insert(user.id.clone(), user.clone());
        Ok(())
    }
}
