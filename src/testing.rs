//! Test fixtures shared by the module test suites

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::games::{
    new_action_id, BaseGameInfo, Game, GamePreviewWithUserId, GameState, User, EMPTY_CELL,
};
use crate::store::{GameStore, MemoryGameStore, StoreError, StoreResult};

/// 9x9 payload with the given tiles placed on an otherwise empty board
pub fn info_with(seconds: u64, tiles: &[(usize, i32)]) -> BaseGameInfo {
    let mut matrix = vec![EMPTY_CELL; 81];
    for &(index, value) in tiles {
        matrix[index] = value;
    }
    BaseGameInfo::new(seconds, 9, GameState::new(matrix, vec![2, 4]), vec![]).unwrap()
}

pub fn millis(at: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at).unwrap()
}

/// Record created (and last synced) at `created_ms`, with a fresh action token
pub fn game_at(info: BaseGameInfo, created_ms: i64, created_id: Option<&str>) -> Game {
    let at = millis(created_ms);
    Game::from_info(
        info,
        String::new(),
        new_action_id(),
        at,
        at,
        at,
        created_id.map(str::to_string),
    )
}

/// Insert `game` and return it as stored
pub async fn seed(store: &dyn GameStore, user_id: &str, game: Game) -> Game {
    let id = store.insert(user_id, &game).await.unwrap();
    Game { id, ..game }
}

fn unavailable() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

/// Wraps a [`MemoryGameStore`] and injects faults
///
/// - lookups of ids in `broken_ids` fail with a database error
/// - the first `conflicting_writes` conditional writes report a conflict
/// - when `interloper` is set, the first conditional write is preceded by a
///   concurrent replace of the targeted record with that payload
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryGameStore,
    pub broken_ids: HashSet<String>,
    pub conflicting_writes: AtomicU32,
    pub interloper: parking_lot::Mutex<Option<BaseGameInfo>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_broken_ids(ids: &[&str]) -> Self {
        Self {
            broken_ids: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_conflicting_writes(count: u32) -> Self {
        Self {
            conflicting_writes: AtomicU32::new(count),
            ..Self::default()
        }
    }

    pub fn with_interloper(info: BaseGameInfo) -> Self {
        Self {
            interloper: parking_lot::Mutex::new(Some(info)),
            ..Self::default()
        }
    }

    fn take_conflict(&self) -> bool {
        self.conflicting_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn interfere(&self, user_id: &str, id: &str) {
        let payload = self.interloper.lock().take();
        if let Some(info) = payload {
            let stored = self.inner.get(user_id, id).await.unwrap().unwrap();
            let concurrent = Game {
                info: info.clone(),
                total_sum: info.total_sum(),
                last_action_id: new_action_id(),
                ..stored.clone()
            };
            self.inner
                .replace(user_id, &concurrent, &stored.last_action_id)
                .await
                .unwrap();
        }
    }
}

#[async_trait]
impl GameStore for FaultyStore {
    async fn get(&self, user_id: &str, id: &str) -> StoreResult<Option<Game>> {
        if self.broken_ids.contains(id) {
            return Err(unavailable());
        }
        self.inner.get(user_id, id).await
    }

    async fn find_by_created_id(
        &self,
        user_id: &str,
        created_id: &str,
    ) -> StoreResult<Option<Game>> {
        if self.broken_ids.contains(created_id) {
            return Err(unavailable());
        }
        self.inner.find_by_created_id(user_id, created_id).await
    }

    async fn created_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Game>> {
        self.inner.created_since(user_id, since, limit).await
    }

    async fn insert(&self, user_id: &str, game: &Game) -> StoreResult<String> {
        self.inner.insert(user_id, game).await
    }

    async fn replace(
        &self,
        user_id: &str,
        game: &Game,
        expected_action_id: &str,
    ) -> StoreResult<()> {
        if self.take_conflict() {
            return Err(StoreError::Conflict("injected".into()));
        }
        self.interfere(user_id, &game.id).await;
        self.inner.replace(user_id, game, expected_action_id).await
    }

    async fn delete(&self, user_id: &str, id: &str, expected_action_id: &str) -> StoreResult<()> {
        if self.take_conflict() {
            return Err(StoreError::Conflict("injected".into()));
        }
        self.interfere(user_id, id).await;
        self.inner.delete(user_id, id, expected_action_id).await
    }

    async fn best_by_total_sum(
        &self,
        count_rows_and_columns: u32,
        limit: usize,
    ) -> StoreResult<Vec<GamePreviewWithUserId>> {
        self.inner.best_by_total_sum(count_rows_and_columns, limit).await
    }

    async fn nickname_exists(&self, nickname: &str) -> StoreResult<bool> {
        self.inner.nickname_exists(nickname).await
    }

    async fn nicknames(&self, user_ids: &[String]) -> StoreResult<HashMap<String, String>> {
        self.inner.nicknames(user_ids).await
    }

    async fn save_user(&self, user: &User) -> StoreResult<()> {
        self.inner.save_user(user).await
    }
}
