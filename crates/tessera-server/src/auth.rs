//! Authentication middleware.
//!
//! API routes accept a bearer token. When no token is configured the server
//! runs in localhost mode and every request is let through.
//!
//! # Security
//!
//! Token comparison uses constant-time comparison to prevent timing attacks.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Who made the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Identity {
    /// Presented the configured bearer token.
    Token,
    /// Auth is disabled.
    Local,
}

impl Identity {
    /// Check if this is a token identity.
    pub fn is_token(&self) -> bool {
        matches!(self, Identity::Token)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth Error
// ─────────────────────────────────────────────────────────────────────────────

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization token")]
    MissingToken,
    /// Header present but not `Bearer <token>`.
    #[error("Invalid authorization format")]
    InvalidFormat,
    #[error("Invalid token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::MissingToken | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::InvalidFormat => StatusCode::BAD_REQUEST,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Security Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Constant-time string equality.
///
/// Lengths are not secret; a mismatch still burns one comparison.
fn constant_time_eq(presented: &str, expected: &str) -> bool {
    let (presented, expected) = (presented.as_bytes(), expected.as_bytes());
    if presented.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    presented.ct_eq(expected).into()
}

// ─────────────────────────────────────────────────────────────────────────────
// Middleware
// ─────────────────────────────────────────────────────────────────────────────

/// Authentication middleware function.
///
/// Validates the request and injects the `Identity` into request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = validate_request(&request, &state)?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Validate a request and return the identity.
fn validate_request(request: &Request<Body>, state: &AppState) -> Result<Identity, AuthError> {
    let Some(expected_token) = state.config().auth_token.as_deref() else {
        return Ok(Identity::Local);
    };

    let Some(auth_header) = request.headers().get(AUTHORIZATION) else {
        return Err(AuthError::MissingToken);
    };
    let auth_str = auth_header.to_str().map_err(|_| AuthError::InvalidFormat)?;

    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Err(AuthError::InvalidFormat);
    };

    if constant_time_eq(token.trim(), expected_token) {
        Ok(Identity::Token)
    } else {
        Err(AuthError::InvalidToken)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
