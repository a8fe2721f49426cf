//! Server clock endpoint, used by clients to calibrate local timestamps

use axum::{routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::games::now_millis;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampResponse {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub now_timestamp: DateTime<Utc>,
}

async fn get_timestamp() -> Json<TimestampResponse> {
    Json(TimestampResponse {
        now_timestamp: now_millis(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_timestamp))
}
