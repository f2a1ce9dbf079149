// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./vmportal.toml` > `~/.config/vmportal/vmportal.toml` > `/etc/vmportal/vmportal.toml`
//! with environment variable overrides via `VMPORTAL_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::PortalConfig;

/// Top-level sections, used to turn `VMPORTAL_SECTION_KEY` into `section.key`.
const SECTIONS: &[&str] = &[
    "portal",
    "server",
    "auth",
    "proxmox",
    "console",
    "sync",
    "retention",
    "storage",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/vmportal/vmportal.toml` (system-wide)
/// 3. `~/.config/vmportal/vmportal.toml` (user XDG config)
/// 4. `./vmportal.toml` (local directory)
/// 5. `VMPORTAL_*` environment variables
pub fn load_config() -> Result<PortalConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit config content.
pub fn load_config_from_str(toml_content: &str) -> Result<PortalConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PortalConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<PortalConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PortalConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(PortalConfig::default()))
        .merge(Toml::file("/etc/vmportal/vmportal.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("vmportal/vmportal.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("vmportal.toml"))
        .merge(env_provider())
}

/// Environment provider mapping `VMPORTAL_PROXMOX_TOKEN_SECRET` to `proxmox.token_secret`.
///
/// Only the leading section name is split off; key names keep their underscores.
fn env_provider() -> Env {
    Env::prefixed("VMPORTAL_").map(|key| env_key_to_path(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name onto a dotted config path.
pub(crate) fn env_key_to_path(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
