// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as parseable URLs, paired credentials, and non-zero intervals.

use crate::diagnostic::ConfigError;
use crate::model::PortalConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &PortalConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.portal.log_level.as_str()) {
        fail(format!(
            "portal.log_level `{}` must be one of {}",
            config.portal.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    let addr = config.server.bind_address.trim();
    if addr.is_empty() {
        fail("server.bind_address must not be empty".to_string());
    } else {
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "server.bind_address `{addr}` is not a valid IP address or hostname"
            ));
        }
    }

    match url::Url::parse(&config.proxmox.base_url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
            if parsed.host_str().is_none() {
                fail(format!(
                    "proxmox.base_url `{}` has no host",
                    config.proxmox.base_url
                ));
            }
        }
        Ok(parsed) => fail(format!(
            "proxmox.base_url must use http or https, got `{}`",
            parsed.scheme()
        )),
        Err(e) => fail(format!(
            "proxmox.base_url `{}` is not a valid URL: {e}",
            config.proxmox.base_url
        )),
    }

    if config.proxmox.token_id.is_some() != config.proxmox.token_secret.is_some() {
        fail("proxmox.token_id and proxmox.token_secret must be set together".to_string());
    }

    if config.proxmox.console_username.is_some() != config.proxmox.console_password.is_some() {
        fail(
            "proxmox.console_username and proxmox.console_password must be set together"
                .to_string(),
        );
    }

    if config.proxmox.timeout_secs == 0 || config.proxmox.timeout_secs > 300 {
        fail(format!(
            "proxmox.timeout_secs must be between 1 and 300, got {}",
            config.proxmox.timeout_secs
        ));
    }

    if config.proxmox.max_retries > 10 {
        fail(format!(
            "proxmox.max_retries must be at most 10, got {}",
            config.proxmox.max_retries
        ));
    }

    if config.console.session_lifetime_secs == 0 || config.console.session_lifetime_secs > 3600 {
        fail(format!(
            "console.session_lifetime_secs must be between 1 and 3600, got {}",
            config.console.session_lifetime_secs
        ));
    }

    if config.console.rate_limit_max_attempts == 0 {
        fail("console.rate_limit_max_attempts must be at least 1".to_string());
    }

    if config.console.rate_limit_window_secs == 0 {
        fail("console.rate_limit_window_secs must be at least 1".to_string());
    }

    if config.sync.interval_secs == 0 {
        fail("sync.interval_secs must be at least 1".to_string());
    }

    if config.sync.delete_grace_days == 0 {
        fail("sync.delete_grace_days must be at least 1".to_string());
    }

    if config.retention.security_event_days == 0 {
        fail("retention.security_event_days must be at least 1".to_string());
    }

    if config.retention.interval_hours == 0 {
        fail("retention.interval_hours must be at least 1".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
