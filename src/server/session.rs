//! Bearer session extraction.
//!
//! Every authenticated request carries `Authorization: Bearer <jwt>`. The
//! extractor verifies the token and mirrors its claims into the local user
//! row, so users are provisioned lazily on their first request and refreshed
//! whenever claims change.

use super::state::ServerState;
use crate::auth::AuthError;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::debug;

#[derive(Debug)]
pub struct Session {
    pub user_id: i64,
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub is_premium: bool,
}

pub enum SessionExtractionError {
    MissingToken,
    InvalidToken,
    InternalError,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> Response {
        match self {
            SessionExtractionError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                Json(json!({ "error": "Missing bearer token" })),
            )
                .into_response(),
            SessionExtractionError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer error=\"invalid_token\"")],
                Json(json!({ "error": "Invalid bearer token" })),
            )
                .into_response(),
            SessionExtractionError::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Pull the token out of `Authorization: Bearer <token>`.
fn extract_bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?;
    let value = value.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts).ok_or(SessionExtractionError::MissingToken)?;

        let claims = match ctx.token_verifier.verify(&token).await {
            Ok(claims) => claims,
            Err(AuthError::JwksFetch(reason)) => {
                debug!("Could not reach JWKS endpoint: {}", reason);
                super::metrics::record_auth_request("jwks_unavailable");
                return Err(SessionExtractionError::InternalError);
            }
            Err(err) => {
                debug!("Rejected bearer token: {}", err);
                super::metrics::record_auth_request("rejected");
                return Err(SessionExtractionError::InvalidToken);
            }
        };

        // Lazy provisioning: first sight of a subject creates the row,
        // changed claims refresh it.
        let user = match ctx.user_manager.sync_user(&claims.to_user_upsert()) {
            Ok(user) => user,
            Err(err) => {
                debug!("Failed to sync user {}: {}", claims.subject, err);
                return Err(SessionExtractionError::InternalError);
            }
        };

        super::metrics::record_auth_request("ok");

        Ok(Session {
            user_id: user.id,
            subject: user.subject,
            email: user.email,
            display_name: user.display_name,
            is_premium: user.is_premium,
        })
    }
}
