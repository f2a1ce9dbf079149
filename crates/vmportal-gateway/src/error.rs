// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON error responses for the REST API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use vmportal_core::PortalError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Stable machine-readable error code.
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// An API failure: a status plus a stable error code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str) -> Self {
        Self {
            status,
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn user_not_in_db(external_id: &str) -> Self {
        Self::new(StatusCode::FORBIDDEN, "user_not_in_db").with_details(external_id)
    }

    pub fn vm_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "vm_not_found")
    }

    pub fn forbidden_not_owner() -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden_not_owner")
    }

    pub fn vm_not_linked() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "vm_not_linked_to_proxmox")
    }

    pub fn rate_limited() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited")
    }

    /// The hypervisor rejected or failed the request.
    pub fn hypervisor(err: &PortalError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "proxmox_error").with_details(err.to_string())
    }

    /// Storage and other unexpected failures. Details stay in the log.
    pub fn internal(err: &PortalError) -> Self {
        tracing::error!(error = %err, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
    }
}

impl From<PortalError> for ApiError {
    fn from(err: PortalError) -> Self {
        Self::internal(&err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.code,
                details: self.details,
            }),
        )
            .into_response()
    }
}
