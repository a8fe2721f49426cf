//! Game record model
//!
//! Provides:
//! - Versioned game records and their gameplay payload
//! - The content fingerprint used as a creation/authorship signal
//! - Leaderboard assembly over the store

mod fingerprint;
mod leaderboard;
mod types;

pub use fingerprint::fingerprint;
pub use leaderboard::best_games;
pub use types::{
    is_count_rows_and_columns_valid, new_action_id, now_millis, BaseGameInfo, Game, GamePreview,
    GamePreviewWithUserDetails, GamePreviewWithUserId, GameState, User, ValidationError,
    AVAILABLE_COUNT_ROWS_AND_COLUMNS, EMPTY_CELL, MAX_PLAYED_SECONDS,
};
