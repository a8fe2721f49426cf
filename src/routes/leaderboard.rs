//! Leaderboard routes

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::games::{
    best_games, is_count_rows_and_columns_valid, GamePreviewWithUserDetails, ValidationError,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestGamesQuery {
    pub count_rows_and_columns: u32,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/best", get(get_best_games))
}

/// Best games of one board size across all users
async fn get_best_games(
    State(state): State<AppState>,
    query: std::result::Result<Query<BestGamesQuery>, QueryRejection>,
) -> Result<Json<Vec<GamePreviewWithUserDetails>>> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    if !is_count_rows_and_columns_valid(query.count_rows_and_columns) {
        return Err(ValidationError::InvalidBoardSize(query.count_rows_and_columns).into());
    }

    let games = best_games(
        state.store(),
        query.count_rows_and_columns,
        state.config().sync.leaderboard_limit,
    )
    .await?;
    Ok(Json(games))
}
