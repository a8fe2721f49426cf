//! Game record types
//!
//! Defines the versioned record model shared by every sync operation:
//! - Board snapshots (`GameState`) and the gameplay payload (`BaseGameInfo`)
//! - Persisted records with identity and version fields (`Game`)
//! - Leaderboard projections

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Value stored in a board cell that holds no tile
pub const EMPTY_CELL: i32 = -1;

/// Board sizes a client is allowed to play
pub const AVAILABLE_COUNT_ROWS_AND_COLUMNS: [u32; 3] = [9, 16, 25];

/// Check whether a board size is one of the playable sizes
pub fn is_count_rows_and_columns_valid(count: u32) -> bool {
    AVAILABLE_COUNT_ROWS_AND_COLUMNS.contains(&count)
}

/// Current instant truncated to millisecond precision.
///
/// Instants travel over the wire and into the store as Unix milliseconds,
/// so every timestamp the server mints is truncated up front.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Generate a fresh opaque action token
/// Largest accepted `totalPlayedSeconds`
pub const MAX_PLAYED_SECONDS: u64 = i64::MAX as u64;

pub fn new_action_id() -> String {
    Uuid::new_v4().to_string()
}

// ============================================================================
// Validation
// ============================================================================

/// Errors raised when a board violates its shape invariants
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("countRowsAndColumns = {0} is invalid")]
    InvalidBoardSize(u32),

    #[error("totalPlayedSeconds = {0} is out of range")]
    PlayedSecondsOutOfRange(u64),

    #[error("current.matrix.length = {actual}, but countRowsAndColumns = {count}")]
    CurrentMatrixLength { actual: usize, count: u32 },

    #[error("stack[{index}].matrix.length = {actual}, but countRowsAndColumns = {count}")]
    StackMatrixLength {
        index: usize,
        actual: usize,
        count: u32,
    },
}

// ============================================================================
// Board State
// ============================================================================

/// One snapshot of the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Row-major cells, `EMPTY_CELL` where no tile is placed
    pub matrix: Vec<i32>,
    /// Tiles queued to enter the board next
    pub new_items: Vec<i32>,
}

impl GameState {
    pub fn new(matrix: Vec<i32>, new_items: Vec<i32>) -> Self {
        Self { matrix, new_items }
    }

    /// Sum of all cells
    pub fn matrix_sum(&self) -> i64 {
        self.matrix.iter().map(|&v| i64::from(v)).sum()
    }

    /// Number of cells holding a tile
    pub fn filled_cells(&self) -> usize {
        self.matrix.iter().filter(|&&v| v != EMPTY_CELL).count()
    }

    /// Sum of queued tiles
    pub fn new_items_sum(&self) -> i64 {
        self.new_items.iter().map(|&v| i64::from(v)).sum()
    }
}

/// Gameplay payload of a record: everything a client edits
///
/// Only constructible through [`BaseGameInfo::new`], which enforces that the
/// current board and every undo snapshot hold `countRowsAndColumns²` cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawBaseGameInfo")]
pub struct BaseGameInfo {
    total_played_seconds: u64,
    count_rows_and_columns: u32,
    current: GameState,
    stack: Vec<GameState>,
}

/// Unchecked wire shape of [`BaseGameInfo`]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBaseGameInfo {
    total_played_seconds: u64,
    count_rows_and_columns: u32,
    current: GameState,
    #[serde(default)]
    stack: Vec<GameState>,
}

impl TryFrom<RawBaseGameInfo> for BaseGameInfo {
    type Error = ValidationError;

    fn try_from(raw: RawBaseGameInfo) -> Result<Self, Self::Error> {
        Self::new(
            raw.total_played_seconds,
            raw.count_rows_and_columns,
            raw.current,
            raw.stack,
        )
    }
}

impl BaseGameInfo {
    /// Build a payload, checking board size and matrix lengths
    pub fn new(
        total_played_seconds: u64,
        count_rows_and_columns: u32,
        current: GameState,
        stack: Vec<GameState>,
    ) -> Result<Self, ValidationError> {
        if !is_count_rows_and_columns_valid(count_rows_and_columns) {
            return Err(ValidationError::InvalidBoardSize(count_rows_and_columns));
        }

        // Stored as a signed 64-bit column
        if total_played_seconds > MAX_PLAYED_SECONDS {
            return Err(ValidationError::PlayedSecondsOutOfRange(total_played_seconds));
        }

        let cells = (count_rows_and_columns * count_rows_and_columns) as usize;

        if current.matrix.len() != cells {
            return Err(ValidationError::CurrentMatrixLength {
                actual: current.matrix.len(),
                count: count_rows_and_columns,
            });
        }

        if let Some((index, snapshot)) = stack
            .iter()
            .enumerate()
            .find(|(_, snapshot)| snapshot.matrix.len() != cells)
        {
            return Err(ValidationError::StackMatrixLength {
                index,
                actual: snapshot.matrix.len(),
                count: count_rows_and_columns,
            });
        }

        Ok(Self {
            total_played_seconds,
            count_rows_and_columns,
            current,
            stack,
        })
    }

    pub fn total_played_seconds(&self) -> u64 {
        self.total_played_seconds
    }

    pub fn count_rows_and_columns(&self) -> u32 {
        self.count_rows_and_columns
    }

    pub fn current(&self) -> &GameState {
        &self.current
    }

    /// Undo history, oldest first
    pub fn stack(&self) -> &[GameState] {
        &self.stack
    }

    /// Score of the current board
    pub fn total_sum(&self) -> i64 {
        self.current.matrix_sum()
    }
}

// ============================================================================
// Persisted Record
// ============================================================================

/// A persisted game session owned by one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    /// Store-assigned identifier
    pub id: String,
    /// Gameplay payload
    #[serde(flatten)]
    pub info: BaseGameInfo,
    /// Version token, regenerated on every accepted mutation
    pub last_action_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_timestamp: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_synced_timestamp: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_local_modified_timestamp: DateTime<Utc>,
    /// Cached score of `info.current`
    pub total_sum: i64,
    /// Idempotency key of the creating request, cleared once superseded
    pub created_id: Option<String>,
}

impl Game {
    /// Wrap a payload with identity and version fields
    pub fn from_info(
        info: BaseGameInfo,
        id: String,
        last_action_id: String,
        created_timestamp: DateTime<Utc>,
        last_synced_timestamp: DateTime<Utc>,
        last_local_modified_timestamp: DateTime<Utc>,
        created_id: Option<String>,
    ) -> Self {
        let total_sum = info.total_sum();
        Self {
            id,
            info,
            last_action_id,
            created_timestamp,
            last_synced_timestamp,
            last_local_modified_timestamp,
            total_sum,
            created_id,
        }
    }

    /// Copy of this record stamped as synced right now
    pub fn resynced(&self) -> Self {
        Self {
            last_synced_timestamp: now_millis(),
            ..self.clone()
        }
    }

    /// Leaderboard projection of this record
    pub fn preview(&self) -> GamePreview {
        GamePreview {
            id: self.id.clone(),
            total_played_seconds: self.info.total_played_seconds(),
            count_rows_and_columns: self.info.count_rows_and_columns(),
            last_local_modified_timestamp: self.last_local_modified_timestamp,
            total_sum: self.total_sum,
        }
    }
}

// ============================================================================
// Leaderboard & Users
// ============================================================================

/// A registered player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub nickname: String,
}

/// Summary of a game shown on the leaderboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePreview {
    pub id: String,
    pub total_played_seconds: u64,
    pub count_rows_and_columns: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_local_modified_timestamp: DateTime<Utc>,
    pub total_sum: i64,
}

/// Leaderboard entry before the owner's nickname is resolved
#[derive(Debug, Clone, PartialEq)]
pub struct GamePreviewWithUserId {
    pub game_preview: GamePreview,
    pub user_id: String,
}

/// Leaderboard entry as served to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePreviewWithUserDetails {
    pub game_preview: GamePreview,
    pub user_nickname: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_board(count: u32) -> GameState {
        GameState::new(vec![EMPTY_CELL; (count * count) as usize], vec![1, 2, 3])
    }

    #[test]
    fn test_rejects_unknown_board_size() {
        let err = BaseGameInfo::new(0, 10, empty_board(10), vec![]).unwrap_err();
        assert_eq!(err, ValidationError::InvalidBoardSize(10));
    }

    #[test]
    fn test_rejects_short_current_matrix() {
        let err = BaseGameInfo::new(0, 9, empty_board(4), vec![]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::CurrentMatrixLength {
                actual: 16,
                count: 9
            }
        );
    }

    #[test]
    fn test_rejects_mismatched_stack_snapshot() {
        let err = BaseGameInfo::new(0, 9, empty_board(9), vec![empty_board(9), empty_board(16)])
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::StackMatrixLength {
                index: 1,
                actual: 256,
                count: 9
            }
        );
    }

    #[test]
    fn test_rejects_unstorable_played_seconds() {
        let err = BaseGameInfo::new(u64::MAX, 9, empty_board(9), vec![]).unwrap_err();
        assert_eq!(err, ValidationError::PlayedSecondsOutOfRange(u64::MAX));

        let err = BaseGameInfo::new(MAX_PLAYED_SECONDS + 1, 9, empty_board(9), vec![]).unwrap_err();
        assert!(matches!(err, ValidationError::PlayedSecondsOutOfRange(_)));

        assert!(BaseGameInfo::new(MAX_PLAYED_SECONDS, 9, empty_board(9), vec![]).is_ok());

        let json = serde_json::json!({
            "totalPlayedSeconds": u64::MAX,
            "countRowsAndColumns": 9,
            "current": { "matrix": vec![EMPTY_CELL; 81], "newItems": [] },
        });
        let err = serde_json::from_value::<BaseGameInfo>(json).unwrap_err();
        assert!(err.to_string().contains("totalPlayedSeconds"));
    }

    #[test]
    fn test_deserialize_validates() {
        let json = serde_json::json!({
            "totalPlayedSeconds": 12,
            "countRowsAndColumns": 9,
            "current": { "matrix": [1, 2, 3], "newItems": [] },
            "stack": []
        });

        let err = serde_json::from_value::<BaseGameInfo>(json).unwrap_err();
        assert!(err.to_string().contains("current.matrix.length = 3"));
    }

    #[test]
    fn test_equality_includes_stack_length() {
        let short = BaseGameInfo::new(5, 9, empty_board(9), vec![empty_board(9)]).unwrap();
        let long =
            BaseGameInfo::new(5, 9, empty_board(9), vec![empty_board(9), empty_board(9)]).unwrap();

        assert_ne!(short, long);
        assert_eq!(short, short.clone());
    }

    #[test]
    fn test_game_serializes_flat_camel_case() {
        let mut board = empty_board(9);
        board.matrix[0] = 4;
        board.matrix[1] = 8;
        let info = BaseGameInfo::new(30, 9, board, vec![]).unwrap();
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();

        let game = Game::from_info(
            info,
            "game-1".to_string(),
            "action-1".to_string(),
            at,
            at,
            at,
            Some("hash".to_string()),
        );
        assert_eq!(game.total_sum, 4 + 8 - 79);

        let json = serde_json::to_value(&game).unwrap();
        assert_eq!(json["id"], "game-1");
        assert_eq!(json["countRowsAndColumns"], 9);
        assert_eq!(json["lastActionId"], "action-1");
        assert_eq!(json["createdTimestamp"], 1_700_000_000_123_i64);
        assert_eq!(json["createdId"], "hash");

        let back: Game = serde_json::from_value(json).unwrap();
        assert_eq!(back, game);
    }

    #[test]
    fn test_resynced_only_touches_sync_stamp() {
        let info = BaseGameInfo::new(1, 9, empty_board(9), vec![]).unwrap();
        let old = DateTime::from_timestamp_millis(1_000).unwrap();
        let game = Game::from_info(info, "g".into(), "a".into(), old, old, old, None);

        let resynced = game.resynced();
        assert!(resynced.last_synced_timestamp > old);
        assert_eq!(resynced.created_timestamp, old);
        assert_eq!(resynced.last_action_id, "a");
    }
}
