//! SQLite store gateway
//!
//! Boards and undo stacks are stored as JSON text, instants as Unix
//! milliseconds.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{GameStore, StoreError, StoreResult};
use crate::games::{BaseGameInfo, Game, GamePreview, GamePreviewWithUserId, GameState, User};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS games (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    total_played_seconds INTEGER NOT NULL,
    count_rows_and_columns INTEGER NOT NULL,
    current TEXT NOT NULL,
    stack TEXT NOT NULL,
    last_action_id TEXT NOT NULL,
    created_timestamp INTEGER NOT NULL,
    last_synced_timestamp INTEGER NOT NULL,
    last_local_modified_timestamp INTEGER NOT NULL,
    total_sum INTEGER NOT NULL,
    created_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_games_user_created ON games(user_id, created_timestamp);
CREATE UNIQUE INDEX IF NOT EXISTS idx_games_user_created_id ON games(user_id, created_id)
    WHERE created_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_games_best ON games(count_rows_and_columns, total_sum DESC);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    nickname TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_nickname ON users(nickname);
"#;

const GAME_COLUMNS: &str = "id, total_played_seconds, count_rows_and_columns, current, stack, \
     last_action_id, created_timestamp, last_synced_timestamp, \
     last_local_modified_timestamp, total_sum, created_id";

/// SQLite-backed [`GameStore`]
#[derive(Clone)]
pub struct SqliteGameStore {
    pool: SqlitePool,
}

impl SqliteGameStore {
    /// Wrap an existing pool. Call [`SqliteGameStore::init`] before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `database_url` and initialize the schema
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.init().await?;
        Ok(store)
    }

    /// Create tables and indexes
    pub async fn init(&self) -> StoreResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Map a unique-index violation to a write conflict
fn conflict_on_unique(err: sqlx::Error, what: &str) -> StoreError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("{} already in use", what))
        }
        other => StoreError::Database(other),
    }
}

#[async_trait]
impl GameStore for SqliteGameStore {
    async fn get(&self, user_id: &str, id: &str) -> StoreResult<Option<Game>> {
        let row = sqlx::query_as::<_, GameRow>(&format!(
            "SELECT {} FROM games WHERE user_id = ? AND id = ?",
            GAME_COLUMNS
        ))
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(GameRow::into_game).transpose()
    }

    async fn find_by_created_id(
        &self,
        user_id: &str,
        created_id: &str,
    ) -> StoreResult<Option<Game>> {
        let row = sqlx::query_as::<_, GameRow>(&format!(
            "SELECT {} FROM games WHERE user_id = ? AND created_id = ? LIMIT 1",
            GAME_COLUMNS
        ))
        .bind(user_id)
        .bind(created_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(GameRow::into_game).transpose()
    }

    async fn created_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Game>> {
        let rows = sqlx::query_as::<_, GameRow>(&format!(
            r#"
            SELECT {}
            FROM games
            WHERE user_id = ? AND created_timestamp >= ?
            ORDER BY created_timestamp ASC, id ASC
            LIMIT ?
            "#,
            GAME_COLUMNS
        ))
        .bind(user_id)
        .bind(since.timestamp_millis())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GameRow::into_game).collect()
    }

    async fn insert(&self, user_id: &str, game: &Game) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        let played_seconds = played_seconds_column(game)?;
        let current = serde_json::to_string(game.info.current())?;
        let stack = serde_json::to_string(game.info.stack())?;

        sqlx::query(
            r#"
            INSERT INTO games (
                id, user_id, total_played_seconds, count_rows_and_columns, current, stack,
                last_action_id, created_timestamp, last_synced_timestamp,
                last_local_modified_timestamp, total_sum, created_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(played_seconds)
        .bind(game.info.count_rows_and_columns() as i64)
        .bind(&current)
        .bind(&stack)
        .bind(&game.last_action_id)
        .bind(game.created_timestamp.timestamp_millis())
        .bind(game.last_synced_timestamp.timestamp_millis())
        .bind(game.last_local_modified_timestamp.timestamp_millis())
        .bind(game.total_sum)
        .bind(&game.created_id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "createdId"))?;

        Ok(id)
    }

    async fn replace(
        &self,
        user_id: &str,
        game: &Game,
        expected_action_id: &str,
    ) -> StoreResult<()> {
        let played_seconds = played_seconds_column(game)?;
        let current = serde_json::to_string(game.info.current())?;
        let stack = serde_json::to_string(game.info.stack())?;

        let result = sqlx::query(
            r#"
            UPDATE games SET
                total_played_seconds = ?,
                count_rows_and_columns = ?,
                current = ?,
                stack = ?,
                last_action_id = ?,
                created_timestamp = ?,
                last_synced_timestamp = ?,
                last_local_modified_timestamp = ?,
                total_sum = ?,
                created_id = ?
            WHERE user_id = ? AND id = ? AND last_action_id = ?
            "#,
        )
        .bind(played_seconds)
        .bind(game.info.count_rows_and_columns() as i64)
        .bind(&current)
        .bind(&stack)
        .bind(&game.last_action_id)
        .bind(game.created_timestamp.timestamp_millis())
        .bind(game.last_synced_timestamp.timestamp_millis())
        .bind(game.last_local_modified_timestamp.timestamp_millis())
        .bind(game.total_sum)
        .bind(&game.created_id)
        .bind(user_id)
        .bind(&game.id)
        .bind(expected_action_id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "createdId"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "game {} changed since {}",
                game.id, expected_action_id
            )));
        }

        Ok(())
    }

    async fn delete(&self, user_id: &str, id: &str, expected_action_id: &str) -> StoreResult<()> {
        let result =
            sqlx::query("DELETE FROM games WHERE user_id = ? AND id = ? AND last_action_id = ?")
                .bind(user_id)
                .bind(id)
                .bind(expected_action_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "game {} changed since {}",
                id, expected_action_id
            )));
        }

        Ok(())
    }

    async fn best_by_total_sum(
        &self,
        count_rows_and_columns: u32,
        limit: usize,
    ) -> StoreResult<Vec<GamePreviewWithUserId>> {
        let rows = sqlx::query_as::<_, PreviewRow>(
            r#"
            SELECT id, user_id, total_played_seconds, count_rows_and_columns,
                   last_local_modified_timestamp, total_sum
            FROM games
            WHERE count_rows_and_columns = ?
            ORDER BY total_sum DESC
            LIMIT ?
            "#,
        )
        .bind(count_rows_and_columns as i64)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PreviewRow::into_preview).collect()
    }

    async fn nickname_exists(&self, nickname: &str) -> StoreResult<bool> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE nickname = ? LIMIT 1")
            .bind(nickname)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn nicknames(&self, user_ids: &[String]) -> StoreResult<HashMap<String, String>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders: Vec<&str> = user_ids.iter().map(|_| "?").collect();
        let query = format!(
            "SELECT id, nickname FROM users WHERE id IN ({})",
            placeholders.join(", ")
        );

        let mut q = sqlx::query_as::<_, (String, String)>(&query);
        for id in user_ids {
            q = q.bind(id);
        }

        Ok(q.fetch_all(&self.pool).await?.into_iter().collect())
    }

    async fn save_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, nickname) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET nickname = excluded.nickname
            "#,
        )
        .bind(&user.id)
        .bind(&user.nickname)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn played_seconds_column(game: &Game) -> StoreResult<i64> {
    i64::try_from(game.info.total_played_seconds()).map_err(|_| StoreError::Corrupt {
        id: game.id.clone(),
        reason: format!(
            "total_played_seconds = {} is out of range",
            game.info.total_played_seconds()
        ),
    })
}

fn played_seconds_value(id: &str, seconds: i64) -> StoreResult<u64> {
    u64::try_from(seconds).map_err(|_| StoreError::Corrupt {
        id: id.to_string(),
        reason: format!("total_played_seconds = {} is out of range", seconds),
    })
}

fn from_millis(id: &str, field: &str, millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StoreError::Corrupt {
        id: id.to_string(),
        reason: format!("{} = {} is out of range", field, millis),
    })
}

#[derive(sqlx::FromRow)]
struct GameRow {
    id: String,
    total_played_seconds: i64,
    count_rows_and_columns: i64,
    current: String,
    stack: String,
    last_action_id: String,
    created_timestamp: i64,
    last_synced_timestamp: i64,
    last_local_modified_timestamp: i64,
    total_sum: i64,
    created_id: Option<String>,
}

impl GameRow {
    fn into_game(self) -> StoreResult<Game> {
        let current: GameState = serde_json::from_str(&self.current)?;
        let stack: Vec<GameState> = serde_json::from_str(&self.stack)?;

        let info = BaseGameInfo::new(
            played_seconds_value(&self.id, self.total_played_seconds)?,
            self.count_rows_and_columns.max(0) as u32,
            current,
            stack,
        )
        .map_err(|e| StoreError::Corrupt {
            id: self.id.clone(),
            reason: e.to_string(),
        })?;

        let created_timestamp = from_millis(&self.id, "created_timestamp", self.created_timestamp)?;
        let last_synced_timestamp =
            from_millis(&self.id, "last_synced_timestamp", self.last_synced_timestamp)?;
        let last_local_modified_timestamp = from_millis(
            &self.id,
            "last_local_modified_timestamp",
            self.last_local_modified_timestamp,
        )?;

        Ok(Game {
            id: self.id,
            info,
            last_action_id: self.last_action_id,
            created_timestamp,
            last_synced_timestamp,
            last_local_modified_timestamp,
            total_sum: self.total_sum,
            created_id: self.created_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PreviewRow {
    id: String,
    user_id: String,
    total_played_seconds: i64,
    count_rows_and_columns: i64,
    last_local_modified_timestamp: i64,
    total_sum: i64,
}

impl PreviewRow {
    fn into_preview(self) -> StoreResult<GamePreviewWithUserId> {
        let last_local_modified_timestamp = from_millis(
            &self.id,
            "last_local_modified_timestamp",
            self.last_local_modified_timestamp,
        )?;

        let total_played_seconds = played_seconds_value(&self.id, self.total_played_seconds)?;

        Ok(GamePreviewWithUserId {
            game_preview: GamePreview {
                id: self.id,
                total_played_seconds,
                count_rows_and_columns: self.count_rows_and_columns.max(0) as u32,
                last_local_modified_timestamp,
                total_sum: self.total_sum,
            },
            user_id: self.user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::MAX_PLAYED_SECONDS;
    use crate::testing::{game_at, info_with};

    async fn setup_test_store() -> (tempfile::TempDir, SqliteGameStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("games.db").display());
        let store = SqliteGameStore::connect(&url).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_round_trip_record() {
        let (_dir, store) = setup_test_store().await;
        let game = game_at(info_with(33, &[(4, 16), (5, 2)]), 1_234, Some("h1"));

        let id = store.insert("user-1", &game).await.unwrap();
        let stored = store.get("user-1", &id).await.unwrap().unwrap();

        assert_eq!(stored, Game { id: id.clone(), ..game });
        assert!(store.get("user-2", &id).await.unwrap().is_none());

        let by_created = store
            .find_by_created_id("user-1", "h1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_created.id, id);
    }

    #[tokio::test]
    async fn test_played_seconds_column_range() {
        let (_dir, store) = setup_test_store().await;
        let mut game = game_at(info_with(0, &[]), 1_000, None);
        game.info = BaseGameInfo::new(
            MAX_PLAYED_SECONDS,
            9,
            game.info.current().clone(),
            Vec::new(),
        )
        .unwrap();

        let id = store.insert("user-1", &game).await.unwrap();
        let stored = store.get("user-1", &id).await.unwrap().unwrap();
        assert_eq!(stored.info.total_played_seconds(), MAX_PLAYED_SECONDS);

        sqlx::query("UPDATE games SET total_played_seconds = -1 WHERE id = ?")
            .bind(&id)
            .execute(&store.pool)
            .await
            .unwrap();
        let err = store.get("user-1", &id).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_created_id_conflicts() {
        let (_dir, store) = setup_test_store().await;
        let game = game_at(info_with(1, &[]), 1_000, Some("h1"));

        store.insert("user-1", &game).await.unwrap();
        let err = store.insert("user-1", &game).await.unwrap_err();
        assert!(err.is_conflict());

        let untagged = game_at(info_with(1, &[]), 1_000, None);
        store.insert("user-1", &untagged).await.unwrap();
        store.insert("user-1", &untagged).await.unwrap();
    }

    #[tokio::test]
    async fn test_conditional_replace_and_delete() {
        let (_dir, store) = setup_test_store().await;
        let game = game_at(info_with(1, &[]), 1_000, None);
        let id = store.insert("user-1", &game).await.unwrap();

        let next = Game {
            id: id.clone(),
            last_action_id: "A2".to_string(),
            ..game.clone()
        };
        assert!(store
            .replace("user-1", &next, "stale")
            .await
            .unwrap_err()
            .is_conflict());
        store
            .replace("user-1", &next, &game.last_action_id)
            .await
            .unwrap();

        assert!(store
            .delete("user-1", &id, &game.last_action_id)
            .await
            .unwrap_err()
            .is_conflict());
        store.delete("user-1", &id, "A2").await.unwrap();
        assert!(store.get("user-1", &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_created_since_ordering() {
        let (_dir, store) = setup_test_store().await;
        for at in [3_000, 1_000, 2_000, 999] {
            store
                .insert("user-1", &game_at(info_with(1, &[]), at, None))
                .await
                .unwrap();
        }

        let since = DateTime::from_timestamp_millis(1_000).unwrap();
        let games = store.created_since("user-1", since, 10).await.unwrap();
        let stamps: Vec<i64> = games
            .iter()
            .map(|g| g.created_timestamp.timestamp_millis())
            .collect();
        assert_eq!(stamps, vec![1_000, 2_000, 3_000]);
    }

    #[tokio::test]
    async fn test_leaderboard_queries() {
        let (_dir, store) = setup_test_store().await;
        store
            .insert("user-1", &game_at(info_with(1, &[(0, 500)]), 1_000, None))
            .await
            .unwrap();
        store
            .insert("user-2", &game_at(info_with(1, &[(0, 900)]), 1_000, None))
            .await
            .unwrap();
        store
            .save_user(&User {
                id: "user-2".into(),
                nickname: "nine".into(),
            })
            .await
            .unwrap();

        let best = store.best_by_total_sum(9, 1).await.unwrap();
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].user_id, "user-2");

        let names = store
            .nicknames(&["user-1".to_string(), "user-2".to_string()])
            .await
            .unwrap();
        assert_eq!(names.get("user-2").map(String::as_str), Some("nine"));
        assert!(!names.contains_key("user-1"));
        assert!(store.nickname_exists("nine").await.unwrap());
    }
}
