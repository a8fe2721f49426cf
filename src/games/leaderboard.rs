//! Leaderboard assembly

use crate::store::{GameStore, StoreResult};

use super::types::GamePreviewWithUserDetails;

/// Top games of one board size across all users, best `totalSum` first
///
/// Owners without a registered nickname are listed with an empty one.
pub async fn best_games(
    store: &dyn GameStore,
    count_rows_and_columns: u32,
    limit: usize,
) -> StoreResult<Vec<GamePreviewWithUserDetails>> {
    let ranked = store
        .best_by_total_sum(count_rows_and_columns, limit)
        .await?;

    let mut user_ids: Vec<String> = ranked.iter().map(|r| r.user_id.clone()).collect();
    user_ids.sort();
    user_ids.dedup();
    let nicknames = store.nicknames(&user_ids).await?;

    Ok(ranked
        .into_iter()
        .map(|r| GamePreviewWithUserDetails {
            user_nickname: nicknames.get(&r.user_id).cloned().unwrap_or_default(),
            game_preview: r.game_preview,
        })
        .collect())
}
