// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.
//!
//! Handles POST /api/console-session, GET /api/vms,
//! POST /api/vms/{id}/power/{action}, and the public /health and /metrics.

use std::str::FromStr;

use axum::{
    Json,
    extract::{Extension, Path, Query, State, rejection::QueryRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use vmportal_core::{
    Clock, HealthStatus, HypervisorClient, PortalAdapter, PortalStore, PowerAction, Principal,
    SecurityEvent, Severity, User, VmRecord,
};

use crate::error::ApiError;
use crate::server::GatewayState;

/// Query for POST /api/console-session.
#[derive(Debug, Deserialize)]
pub struct ConsoleSessionParams {
    #[serde(rename = "vmId")]
    pub vm_id: Uuid,
}

/// Response body for POST /api/console-session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleSessionResponse {
    pub session_id: String,
}

/// Response body for POST /api/vms/{id}/power/{action}.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerActionResponse {
    pub vm_id: Uuid,
    pub action: String,
    pub status: &'static str,
}

/// One entry of GET /api/vms.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmSummary {
    pub id: Uuid,
    pub node: String,
    pub vm_id: u32,
    pub name: String,
    pub status: String,
    pub cpu_cores: u32,
    pub memory_mib: u64,
    pub disk_gib: u64,
    pub is_disabled: bool,
    pub total_run_time_seconds: u64,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub owner_user_id: Option<Uuid>,
}

impl From<VmRecord> for VmSummary {
    fn from(vm: VmRecord) -> Self {
        Self {
            id: vm.id,
            node: vm.node,
            vm_id: vm.vm_id,
            name: vm.name,
            status: vm.status.to_string(),
            cpu_cores: vm.cpu_cores,
            memory_mib: vm.memory_mib,
            disk_gib: vm.disk_gib,
            is_disabled: vm.is_disabled,
            total_run_time_seconds: vm.total_run_time_seconds,
            last_synced_at: vm.last_synced_at,
            owner_user_id: vm.owner_user_id,
        }
    }
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// POST /api/console-session?vmId={uuid}
///
/// Issues a one-time console session for a VM the caller owns (admins may
/// open any VM). The returned id is redeemed by `/ws/console/{id}`.
pub async fn create_console_session(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    params: Result<Query<ConsoleSessionParams>, QueryRejection>,
) -> Result<Json<ConsoleSessionResponse>, ApiError> {
    let Query(params) = params.map_err(|e| {
        ApiError::new(StatusCode::BAD_REQUEST, "invalid_vm_id").with_details(e.body_text())
    })?;

    let (user, vm) = authorize_vm(&state, &principal, params.vm_id).await?;

    if !state.limiter.try_acquire(&principal.external_id, "console") {
        warn!(user = %principal.external_id, "console session rate limited");
        return Err(ApiError::rate_limited());
    }

    let node = vm.node.trim();
    let session_id = state
        .broker
        .create_session(node, vm.vm_id, &principal.external_id)
        .await
        .map_err(|e| {
            warn!(node, vm_id = vm.vm_id, error = %e, "console session creation failed");
            ApiError::hypervisor(&e)
        })?;

    record_event(
        &state,
        "ConsoleSessionCreated",
        &user,
        &headers,
        serde_json::json!({ "vmId": vm.id, "node": node, "vmid": vm.vm_id }),
    )
    .await;

    Ok(Json(ConsoleSessionResponse { session_id }))
}

/// POST /api/vms/{id}/power/{action}
pub async fn power_action(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Path((vm_id, action)): Path<(Uuid, String)>,
) -> Result<Json<PowerActionResponse>, ApiError> {
    let action = PowerAction::from_str(&action).map_err(|_| {
        ApiError::new(StatusCode::BAD_REQUEST, "invalid_action").with_details(action.clone())
    })?;

    let (user, vm) = authorize_vm(&state, &principal, vm_id).await?;

    if !state.limiter.try_acquire(&principal.external_id, "power") {
        warn!(user = %principal.external_id, "power action rate limited");
        return Err(ApiError::rate_limited());
    }

    let node = vm.node.trim();
    let result = match action {
        PowerAction::Start => state.hypervisor.start_vm(node, vm.vm_id).await,
        PowerAction::Stop => state.hypervisor.stop_vm(node, vm.vm_id).await,
        PowerAction::Shutdown => state.hypervisor.shutdown_vm(node, vm.vm_id).await,
        PowerAction::Reboot => state.hypervisor.reboot_vm(node, vm.vm_id).await,
    };
    result.map_err(|e| {
        warn!(node, vm_id = vm.vm_id, %action, error = %e, "power action failed");
        ApiError::hypervisor(&e)
    })?;

    info!(node, vm_id = vm.vm_id, %action, user = %principal.external_id, "power action requested");
    record_event(
        &state,
        "VmPowerAction",
        &user,
        &headers,
        serde_json::json!({ "vmId": vm.id, "node": node, "vmid": vm.vm_id, "action": action }),
    )
    .await;

    Ok(Json(PowerActionResponse {
        vm_id: vm.id,
        action: action.to_string(),
        status: "accepted",
    }))
}

/// GET /api/vms
///
/// Admins see every live record; everyone else sees the VMs they own.
pub async fn list_vms(
    State(state): State<GatewayState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<VmSummary>>, ApiError> {
    let vms = state.store.list_vms(false).await?;
    let visible: Vec<VmRecord> = if principal.is_admin {
        vms
    } else {
        let user = state
            .store
            .get_user_by_external_id(&principal.external_id)
            .await?
            .ok_or_else(|| ApiError::user_not_in_db(&principal.external_id))?;
        vms.into_iter()
            .filter(|vm| vm.owner_user_id == Some(user.id))
            .collect()
    };
    Ok(Json(visible.into_iter().map(VmSummary::from).collect()))
}

/// GET /health
///
/// Unauthenticated. Degrades to 503 when the store is unreachable.
pub async fn get_public_health(State(state): State<GatewayState>) -> Response {
    let healthy = matches!(state.store.health_check().await, Ok(HealthStatus::Healthy));
    let body = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

/// GET /metrics
///
/// Prometheus text format, or 404 when no recorder is installed.
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Resolve the caller and the VM, and check the caller may act on it.
async fn authorize_vm(
    state: &GatewayState,
    principal: &Principal,
    vm_id: Uuid,
) -> Result<(User, VmRecord), ApiError> {
    let user = state
        .store
        .get_user_by_external_id(&principal.external_id)
        .await?
        .ok_or_else(|| ApiError::user_not_in_db(&principal.external_id))?;

    let vm = state
        .store
        .get_vm(vm_id)
        .await?
        .filter(|vm| !vm.is_deleted)
        .ok_or_else(ApiError::vm_not_found)?;

    if !principal.is_admin && vm.owner_user_id != Some(user.id) {
        return Err(ApiError::forbidden_not_owner());
    }
    if !vm.is_linked() {
        return Err(ApiError::vm_not_linked());
    }
    Ok((user, vm))
}

/// Append to the audit trail. Failures are logged, never surfaced.
async fn record_event(
    state: &GatewayState,
    event_type: &str,
    user: &User,
    headers: &HeaderMap,
    details: serde_json::Value,
) {
    let mut event = SecurityEvent::new(event_type, state.clock.now());
    event.user_id = Some(user.id);
    event.severity = Severity::Info;
    event.ip_address = client_ip(headers);
    event.user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    event.details = Some(details.to_string());

    if let Err(e) = state.store.record_security_event(&event).await {
        warn!(event_type, error = %e, "failed to record security event");
    }
}

/// First hop of `X-Forwarded-For`, as set by the identity front-end.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn console_session_params_use_camel_case() {
        let id = Uuid::new_v4();
        let params: ConsoleSessionParams =
            serde_json::from_value(serde_json::json!({ "vmId": id })).unwrap();
        assert_eq!(params.vm_id, id);
    }

    #[test]
    fn console_session_response_serializes() {
        let json = serde_json::to_string(&ConsoleSessionResponse {
            session_id: "abc".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"sessionId":"abc"}"#);
    }

    #[test]
    fn client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        assert!(client_ip(&headers).is_none());
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.2"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }
}
