// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Security plumbing for the VmPortal services.
//!
//! Provides TLS client construction for the hypervisor API and its VNC
//! WebSocket, secret redaction for log output, and a fixed-window rate
//! limiter for console and power requests.

pub mod rate_limit;
pub mod redact;
pub mod tls;

pub use rate_limit::RateLimiter;
pub use redact::{redact, RedactingWriter};
pub use tls::{build_hypervisor_client, upstream_ws_connector, validate_url};
