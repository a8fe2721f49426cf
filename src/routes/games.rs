//! Game sync routes
//!
//! All routes here act on behalf of the authenticated caller.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde_json::Value;

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::games::Game;
use crate::state::AppState;
use crate::sync::{
    decode_batch, CreatedAfterRequest, GetUpdatedRequest, GetUpdatedResponse, ModifiedResponse,
};

type JsonPayload<T> = std::result::Result<Json<T>, JsonRejection>;

/// Create the games router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/modified", post(post_modified))
        .route("/updated", post(post_updated))
        .route("/created-after", post(post_created_after))
}

fn body<T>(payload: JsonPayload<T>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| AppError::BadRequest(e.body_text()))
}

/// Replay modifications queued offline
async fn post_modified(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    payload: JsonPayload<Vec<Value>>,
) -> Result<Json<Vec<ModifiedResponse>>> {
    let items = decode_batch(body(payload)?)?;
    tracing::info!(user_id = %user_id, count = items.len(), "Replaying modifications");

    let responses = state.reconciler().reconcile_batch(&user_id, items).await;
    Ok(Json(responses))
}

/// Report what happened to records the client already holds
async fn post_updated(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    payload: JsonPayload<Vec<GetUpdatedRequest>>,
) -> Result<Json<Vec<GetUpdatedResponse>>> {
    let known = body(payload)?;
    Ok(Json(state.pull().get_updated(&user_id, known).await))
}

/// Page through records created since a point in time
async fn post_created_after(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    payload: JsonPayload<CreatedAfterRequest>,
) -> Result<Json<Vec<Game>>> {
    let request = body(payload)?;
    let games = state
        .pull()
        .get_created_after(
            &user_id,
            request.last_created_timestamp,
            &request.excluded_remote_ids,
            request.limit,
        )
        .await?;
    Ok(Json(games))
}
