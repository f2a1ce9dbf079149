// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication middleware for the gateway.
//!
//! Users authenticate at a trusted identity front-end, which forwards each
//! request with a shared bearer secret and the caller's identity headers.
//! The middleware checks the secret, builds a [`Principal`] from the headers,
//! and attaches it as a request extension.
//!
//! When no secret is configured, all requests are rejected (fail-closed).

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use vmportal_config::model::AuthConfig;
use vmportal_core::Principal;

use crate::error::ApiError;

/// Middleware that validates the front-end secret and attaches the caller's [`Principal`].
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = auth.proxy_secret.as_deref() else {
        tracing::error!("gateway has no proxy secret configured -- rejecting request");
        return Err(ApiError::unauthorized());
    };

    let presented = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented != Some(expected) {
        tracing::debug!(path = %request.uri().path(), "request without valid front-end secret");
        return Err(ApiError::unauthorized());
    }

    let Some(principal) = principal_from_headers(&auth, request.headers()) else {
        tracing::debug!(path = %request.uri().path(), "request without caller identity");
        return Err(ApiError::unauthorized());
    };

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Read the caller's identity headers. `None` when the user header is absent or blank.
fn principal_from_headers(auth: &AuthConfig, headers: &HeaderMap) -> Option<Principal> {
    let external_id = headers
        .get(auth.user_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())?;

    let is_admin = headers
        .get(auth.roles_header.as_str())
        .and_then(|v| v.to_str().ok())
        .is_some_and(|roles| {
            roles
                .split(',')
                .any(|role| role.trim().eq_ignore_ascii_case(&auth.admin_role))
        });

    Some(Principal {
        external_id: external_id.to_string(),
        is_admin,
    })
}
