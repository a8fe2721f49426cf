//! User API routes

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::games::User;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckUniqueRequest {
    #[serde(default)]
    pub user_name: String,
}

#[derive(Debug, Serialize)]
pub struct CheckUniqueResponse {
    pub unique: bool,
}

#[derive(Debug, Deserialize)]
pub struct SaveUserRequest {
    #[serde(default)]
    pub nickname: String,
}

/// Create the users router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/check-unique", post(check_unique))
        .route("/me", put(save_me))
}

/// Whether no registered user carries the nickname
async fn check_unique(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CheckUniqueRequest>, JsonRejection>,
) -> Result<Json<CheckUniqueResponse>> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let user_name = request.user_name.trim();
    if user_name.is_empty() {
        return Err(AppError::BadRequest("Invalid userName".to_string()));
    }

    let taken = state.store().nickname_exists(user_name).await?;
    Ok(Json(CheckUniqueResponse { unique: !taken }))
}

/// Register the caller or change their nickname
async fn save_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: std::result::Result<Json<SaveUserRequest>, JsonRejection>,
) -> Result<Json<User>> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let nickname = request.nickname.trim();
    if nickname.is_empty() {
        return Err(AppError::BadRequest("Invalid nickname".to_string()));
    }

    let current = state.store().nicknames(&[user_id.clone()]).await?;
    let keeps_own = current.get(&user_id).map(String::as_str) == Some(nickname);
    if !keeps_own && state.store().nickname_exists(nickname).await? {
        return Err(AppError::BadRequest("Nickname already taken".to_string()));
    }

    let user = User {
        id: user_id,
        nickname: nickname.to_string(),
    };
    state.store().save_user(&user).await?;

    tracing::info!(user_id = %user.id, "Saved user");
    Ok(Json(user))
}
