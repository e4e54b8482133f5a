// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bearer token guard for protected routes.
//!
//! [`require_jwt_login`] runs before every protected handler. It resolves the
//! `Authorization: Bearer <jwt>` header to a live session and stores it in
//! the request extensions as a [`CurrentSession`]. Anything else is answered
//! with 401 and a JSON reason before the handler runs.

use crate::{
    auth::{jwt::JwtError, login::Authenticator, registry::Session},
    SharedState,
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

/// Session of the caller, available to handlers behind the guard.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub uuid: Uuid,
    pub session: Session,
}

/// Resolve an `Authorization` header value to a live session.
///
/// # Errors
///
/// - Return [`AuthError::Unauthorized`] if there is no header.
/// - Return [`AuthError::WrongAuthType`] if it is not a bearer token.
/// - Return [`AuthError::InvalidToken`] if the token does not verify or its
///   session is unknown.
/// - Return [`AuthError::TokenExpired`] if the token is past its expiry.
pub fn authenticate(
    authenticator: &Authenticator,
    header: Option<&str>,
) -> Result<CurrentSession, AuthError> {
    let header = header.ok_or(AuthError::Unauthorized)?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::WrongAuthType)?;

    let claims = authenticator
        .keys()
        .verify_session(token.trim())
        .map_err(|error| match error {
            JwtError::Expired => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?;

    let session = authenticator
        .registry()
        .get(&claims.uuid)
        .ok_or(AuthError::InvalidToken)?;

    Ok(CurrentSession {
        uuid: claims.uuid,
        session,
    })
}

/// Reject requests without a valid session token.
pub async fn require_jwt_login(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Response {
    // INVARIANT: A header that is not valid UTF-8 cannot be a bearer token.
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or_default());

    match authenticate(&state.auth, header) {
        Ok(current) => {
            request.extensions_mut().insert(current);
            next.run(request).await
        }
        Err(error) => {
            debug!("rejecting {} {}: {error}", request.method(), request.uri().path());
            error.into_response()
        }
    }
}

/// Reasons a request is not let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Wrong auth type")]
    WrongAuthType,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": self.to_string() })),
        )
            .into_response()
    }
}
