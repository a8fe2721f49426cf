//! Request authentication
//!
//! The sync routes resolve the caller through an [`IdentityVerifier`]. The
//! server ships [`HmacTokenVerifier`], which checks self-contained tokens of
//! the form
//!
//! ```text
//! <userId>.<expiresAtMillis>.<hex HMAC-SHA256(secret, "<userId>.<expiresAtMillis>")>
//! ```
//!
//! Tokens travel in the `Authorization` header, with or without a `Bearer `
//! prefix.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::error::AppError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Default lifetime of issued tokens
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing credential")]
    Missing,

    #[error("Malformed token")]
    Malformed,

    #[error("Invalid signature")]
    BadSignature,

    #[error("Token expired")]
    Expired,
}

/// Resolves a credential to the id of the user it belongs to
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<String, AuthError>;
}

/// Verifies and issues HMAC-signed user tokens
#[derive(Clone)]
pub struct HmacTokenVerifier {
    secret: Vec<u8>,
    ttl: Duration,
}

impl HmacTokenVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
        }
    }

    /// Sets the lifetime of issued tokens
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Issue a token for `user_id` valid for the configured lifetime
    pub fn issue(&self, user_id: &str) -> String {
        self.issue_expiring_at(user_id, Utc::now() + self.ttl)
    }

    pub fn issue_expiring_at(&self, user_id: &str, expires_at: DateTime<Utc>) -> String {
        let payload = format!("{}.{}", user_id, expires_at.timestamp_millis());
        let signature = hex::encode(self.mac(&payload).finalize().into_bytes());
        format!("{}.{}", payload, signature)
    }

    fn mac(&self, payload: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        mac
    }

    fn check(&self, token: &str) -> Result<String, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Missing);
        }

        // User ids may contain dots, the last two segments never do
        let mut parts = token.rsplitn(3, '.');
        let (Some(signature), Some(expires_at), Some(user_id)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed);
        };
        if user_id.is_empty() {
            return Err(AuthError::Malformed);
        }

        let payload = &token[..token.len() - signature.len() - 1];
        let expires_at: i64 = expires_at.parse().map_err(|_| AuthError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| AuthError::Malformed)?;

        self.mac(payload)
            .verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        if Utc::now().timestamp_millis() >= expires_at {
            return Err(AuthError::Expired);
        }

        Ok(user_id.to_string())
    }
}

#[async_trait]
impl IdentityVerifier for HmacTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<String, AuthError> {
        self.check(credential)
    }
}

/// Strip an optional `Bearer ` scheme from an `Authorization` value
pub fn bearer_credential(value: &str) -> &str {
    let value = value.trim();
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => value,
    }
}

/// Id of the authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let credential = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(bearer_credential)
            .unwrap_or_default();

        let user_id = state.verifier().verify(credential).await.map_err(|e| {
            tracing::debug!("Rejected credential: {}", e);
            AppError::Unauthorized(e)
        })?;

        Ok(AuthUser(user_id))
    }
}
