// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the VmPortal configuration system.

use vmportal_config::diagnostic::ConfigError;
use vmportal_config::model::PortalConfig;
use vmportal_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

#[test]
fn valid_toml_deserializes_into_portal_config() {
    let toml = r#"
[portal]
name = "lab-portal"
log_level = "debug"

[server]
bind_address = "0.0.0.0"
port = 9000
allowed_origins = ["https://portal.example.com"]

[auth]
proxy_secret = "front-door"
admin_role = "PortalAdmins"

[proxmox]
base_url = "https://pve.example.com:8006"
token_id = "portal@pve!sync"
token_secret = "abc"
console_username = "console@pve"
console_password = "pw"
accept_invalid_certs = true

[console]
session_lifetime_secs = 120

[sync]
interval_secs = 600
delete_grace_days = 14

[retention]
security_event_days = 90

[storage]
database_path = "/tmp/vmportal-test.db"
wal_mode = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.portal.name, "lab-portal");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.auth.proxy_secret.as_deref(), Some("front-door"));
    assert_eq!(config.auth.admin_role, "PortalAdmins");
    assert_eq!(config.auth.user_header, "x-portal-user");
    assert_eq!(config.proxmox.token_id.as_deref(), Some("portal@pve!sync"));
    assert!(config.proxmox.accept_invalid_certs);
    assert_eq!(config.console.session_lifetime_secs, 120);
    assert_eq!(config.console.rate_limit_max_attempts, 5);
    assert_eq!(config.sync.interval_secs, 600);
    assert_eq!(config.sync.delete_grace_days, 14);
    assert_eq!(config.retention.security_event_days, 90);
    assert_eq!(config.retention.interval_hours, 24);
    assert!(!config.storage.wal_mode);
}

#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML should deserialize");
    assert_eq!(config.console.session_lifetime_secs, 300);
    assert_eq!(config.sync.interval_secs, 3600);
    assert_eq!(config.sync.delete_grace_days, 30);
    assert_eq!(config.retention.security_event_days, 365);
    assert_eq!(config.proxmox.timeout_secs, 30);
    assert_eq!(config.proxmox.max_retries, 2);
    assert!(config.auth.proxy_secret.is_none());
}

#[test]
fn unknown_field_produces_suggestion() {
    let toml = r#"
[sync]
intervl_secs = 60
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    let found = errors.iter().any(|e| {
        matches!(
            e,
            ConfigError::UnknownKey { key, suggestion, .. }
                if key == "intervl_secs" && suggestion.as_deref() == Some("interval_secs")
        )
    });
    assert!(found, "expected an UnknownKey with suggestion, got: {errors:?}");
}

#[test]
fn wrong_type_produces_invalid_type() {
    let toml = r#"
[server]
port = "eighty"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject wrong type");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. }))
    );
}

#[test]
fn validation_errors_surface_through_load() {
    let toml = r#"
[proxmox]
base_url = "not a url"
"#;

    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("base_url")))
    );
}

#[test]
fn debug_output_redacts_secrets() {
    let mut config = PortalConfig::default();
    config.proxmox.token_secret = Some("super-secret-token".to_string());
    config.auth.proxy_secret = Some("front-door-secret".to_string());
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("super-secret-token"));
    assert!(!rendered.contains("front-door-secret"));
}

#[test]
fn env_overrides_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "portal.toml",
            r#"
[proxmox]
base_url = "https://pve.example.com:8006"
console_username = "console@pve"
console_password = "from-file"
"#,
        )?;
        jail.set_env("VMPORTAL_PROXMOX_CONSOLE_PASSWORD", "from-env");
        jail.set_env("VMPORTAL_SYNC_INTERVAL_SECS", "120");

        let path = jail.directory().join("portal.toml");
        let config = load_and_validate_path(&path).expect("config should load");
        assert_eq!(config.proxmox.console_password.as_deref(), Some("from-env"));
        assert_eq!(config.proxmox.console_username.as_deref(), Some("console@pve"));
        assert_eq!(config.sync.interval_secs, 120);
        Ok(())
    });
}
