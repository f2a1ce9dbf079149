// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the broker, relay, reconciliation engine, and gateway.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Health status reported by collaborator health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Collaborator is fully operational.
    Healthy,
    /// Collaborator is operational but experiencing issues.
    Degraded(String),
    /// Collaborator is not operational.
    Unhealthy(String),
}

/// Power state of a VM as last observed on the hypervisor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize, Default,
)]
pub enum VmStatus {
    Running,
    Stopped,
    Paused,
    #[default]
    Unknown,
}

impl VmStatus {
    /// Maps the hypervisor's lowercase status string; anything unrecognised is `Unknown`.
    pub fn from_hypervisor(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            "paused" => Self::Paused,
            _ => Self::Unknown,
        }
    }
}

/// Power actions a user can request for a VM they own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    Start,
    Stop,
    Shutdown,
    Reboot,
}

/// Natural key of a VM on the cluster: node name plus numeric VM id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VmKey {
    pub node: String,
    pub vm_id: u32,
}

impl VmKey {
    pub fn new(node: impl Into<String>, vm_id: u32) -> Self {
        Self {
            node: node.into(),
            vm_id,
        }
    }
}

impl fmt::Display for VmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.vm_id)
    }
}

/// A locally persisted VM record.
///
/// Lifecycle flags (`is_disabled`, `is_deleted`) and the status/resource
/// fields are written only by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmRecord {
    pub id: Uuid,
    pub node: String,
    pub vm_id: u32,
    pub name: String,
    pub status: VmStatus,
    pub cpu_cores: u32,
    pub memory_mib: u64,
    pub disk_gib: u64,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_status_change_at: Option<DateTime<Utc>>,
    pub total_run_time_seconds: u64,
    pub is_disabled: bool,
    pub disabled_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub owner_user_id: Option<Uuid>,
    pub max_cpu_cores: Option<u32>,
    pub max_memory_mib: Option<u64>,
    pub max_disk_gib: Option<u64>,
}

impl VmRecord {
    /// A fresh, active record with unknown status and no resources recorded yet.
    pub fn new(node: impl Into<String>, vm_id: u32, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            node: node.into(),
            vm_id,
            name: name.into(),
            status: VmStatus::Unknown,
            cpu_cores: 0,
            memory_mib: 0,
            disk_gib: 0,
            last_synced_at: None,
            last_status_change_at: None,
            total_run_time_seconds: 0,
            is_disabled: false,
            disabled_at: None,
            is_deleted: false,
            deleted_at: None,
            owner_user_id: None,
            max_cpu_cores: None,
            max_memory_mib: None,
            max_disk_gib: None,
        }
    }

    pub fn key(&self) -> VmKey {
        VmKey::new(self.node.clone(), self.vm_id)
    }

    /// Whether this record points at a real hypervisor VM.
    pub fn is_linked(&self) -> bool {
        self.vm_id > 0 && !self.node.trim().is_empty()
    }
}

/// One VM as reported live by the hypervisor inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVm {
    pub node: String,
    pub vm_id: u32,
    pub name: String,
    pub status: VmStatus,
    pub tags: BTreeSet<String>,
    /// Zero means the hypervisor did not report a value.
    pub cpu_cores: u32,
    pub memory_mib: u64,
    pub disk_gib: u64,
}

impl RemoteVm {
    pub fn key(&self) -> VmKey {
        VmKey::new(self.node.clone(), self.vm_id)
    }
}

/// Hypervisor login ticket used as the `PVEAuthCookie` value.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginTicket {
    pub ticket: String,
    pub csrf_token: String,
}

impl fmt::Debug for LoginTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginTicket")
            .field("ticket", &"[REDACTED]")
            .field("csrf_token", &"[REDACTED]")
            .finish()
    }
}

/// A VNC proxy grant issued by the hypervisor for one console connection.
#[derive(Clone, PartialEq, Eq)]
pub struct VncProxyTicket {
    pub port: u16,
    pub ticket: String,
}

impl fmt::Debug for VncProxyTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VncProxyTicket")
            .field("port", &self.port)
            .field("ticket", &"[REDACTED]")
            .finish()
    }
}

/// An ephemeral, single-use console access grant.
#[derive(Clone, PartialEq, Eq)]
pub struct ConsoleSession {
    pub token: String,
    pub node: String,
    pub vm_id: u32,
    pub port: u16,
    pub vnc_ticket: String,
    pub login_ticket: String,
    pub owner_external_id: String,
    pub expires_at: DateTime<Utc>,
}

impl ConsoleSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Owner check is case-insensitive on the external id; admins bypass it.
    pub fn is_accessible_by(&self, principal: &Principal) -> bool {
        principal.is_admin || self.owner_external_id.eq_ignore_ascii_case(&principal.external_id)
    }
}

impl fmt::Debug for ConsoleSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSession")
            .field("node", &self.node)
            .field("vm_id", &self.vm_id)
            .field("port", &self.port)
            .field("owner_external_id", &self.owner_external_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// The authenticated caller of a request, as vouched for by the identity front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub external_id: String,
    pub is_admin: bool,
}

/// Portal role assigned to a user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize, Default,
)]
pub enum UserRole {
    Admin,
    #[default]
    Employee,
}

/// A portal user provisioned from the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub external_id: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Severity attached to an audit event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize, Default,
)]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

/// An audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub event_type: String,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub severity: Severity,
}

impl SecurityEvent {
    pub fn new(event_type: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            user_id: None,
            ip_address: None,
            user_agent: None,
            details: None,
            occurred_at,
            severity: Severity::Info,
        }
    }
}
