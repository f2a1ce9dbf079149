// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the VmPortal services.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Top-level VmPortal configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PortalConfig {
    /// Instance identity and logging.
    #[serde(default)]
    pub portal: InstanceConfig,

    /// HTTP/WebSocket listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Trusted identity front-end settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Hypervisor API settings.
    #[serde(default)]
    pub proxmox: ProxmoxConfig,

    /// Console session settings.
    #[serde(default)]
    pub console: ConsoleConfig,

    /// Inventory reconciliation settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Audit event retention settings.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Instance identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceConfig {
    /// Display name of this portal instance.
    #[serde(default = "default_instance_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: default_instance_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_instance_name() -> String {
    "vmportal".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the server to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS. Empty means same-origin only.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Trusted identity front-end configuration.
///
/// The front-end authenticates users and forwards their identity in headers,
/// proving itself with a shared bearer secret.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Shared bearer secret presented by the identity front-end. `None` rejects all requests.
    #[serde(default)]
    pub proxy_secret: Option<String>,

    /// Header carrying the caller's external user id.
    #[serde(default = "default_user_header")]
    pub user_header: String,

    /// Header carrying the caller's comma-separated roles.
    #[serde(default = "default_roles_header")]
    pub roles_header: String,

    /// Role name that grants administrator oversight.
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "proxy_secret",
                &self.proxy_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user_header", &self.user_header)
            .field("roles_header", &self.roles_header)
            .field("admin_role", &self.admin_role)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            proxy_secret: None,
            user_header: default_user_header(),
            roles_header: default_roles_header(),
            admin_role: default_admin_role(),
        }
    }
}

fn default_user_header() -> String {
    "x-portal-user".to_string()
}

fn default_roles_header() -> String {
    "x-portal-roles".to_string()
}

fn default_admin_role() -> String {
    "Admin".to_string()
}

/// Hypervisor (Proxmox VE) API configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProxmoxConfig {
    /// Base URL of the cluster, e.g. `https://pve.example.com:8006`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API token id, e.g. `portal@pve!sync`.
    #[serde(default)]
    pub token_id: Option<String>,

    /// API token secret.
    #[serde(default)]
    pub token_secret: Option<String>,

    /// Account used to obtain console login tickets.
    #[serde(default)]
    pub console_username: Option<String>,

    /// Password for `console_username`.
    #[serde(default)]
    pub console_password: Option<String>,

    /// Accept self-signed hypervisor certificates. Lab clusters only.
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_proxmox_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts for transient failures on idempotent reads.
    #[serde(default = "default_proxmox_max_retries")]
    pub max_retries: u32,
}

impl fmt::Debug for ProxmoxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxmoxConfig")
            .field("base_url", &self.base_url)
            .field("token_id", &self.token_id)
            .field(
                "token_secret",
                &self.token_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("console_username", &self.console_username)
            .field(
                "console_password",
                &self.console_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for ProxmoxConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_id: None,
            token_secret: None,
            console_username: None,
            console_password: None,
            accept_invalid_certs: false,
            timeout_secs: default_proxmox_timeout_secs(),
            max_retries: default_proxmox_max_retries(),
        }
    }
}

fn default_base_url() -> String {
    "https://localhost:8006".to_string()
}

fn default_proxmox_timeout_secs() -> u64 {
    30
}

fn default_proxmox_max_retries() -> u32 {
    2
}

/// Console session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConsoleConfig {
    /// Lifetime of an unconsumed console session token, in seconds.
    #[serde(default = "default_session_lifetime_secs")]
    pub session_lifetime_secs: u64,

    /// Console and power requests allowed per user per window.
    #[serde(default = "default_rate_limit_max_attempts")]
    pub rate_limit_max_attempts: u32,

    /// Length of the rate limit window, in seconds.
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            session_lifetime_secs: default_session_lifetime_secs(),
            rate_limit_max_attempts: default_rate_limit_max_attempts(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
        }
    }
}

fn default_session_lifetime_secs() -> u64 {
    300
}

fn default_rate_limit_max_attempts() -> u32 {
    5
}

fn default_rate_limit_window_secs() -> u64 {
    300
}

/// Inventory reconciliation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Run the periodic reconciliation loop.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay between the end of one pass and the start of the next, in seconds.
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,

    /// Days a VM stays disabled before it is tombstoned and deleted remotely.
    #[serde(default = "default_delete_grace_days")]
    pub delete_grace_days: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sync_interval_secs(),
            delete_grace_days: default_delete_grace_days(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sync_interval_secs() -> u64 {
    3600
}

fn default_delete_grace_days() -> u32 {
    30
}

/// Audit event retention configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Run the periodic retention cleanup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Age in days after which security events are deleted.
    #[serde(default = "default_security_event_days")]
    pub security_event_days: u32,

    /// Hours between cleanup runs.
    #[serde(default = "default_retention_interval_hours")]
    pub interval_hours: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            security_event_days: default_security_event_days(),
            interval_hours: default_retention_interval_hours(),
        }
    }
}

fn default_security_event_days() -> u32 {
    365
}

fn default_retention_interval_hours() -> u64 {
    24
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("vmportal").join("vmportal.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("vmportal.db"))
        .to_string_lossy()
        .into_owned()
}
