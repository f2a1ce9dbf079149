// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Browser-facing HTTP/WebSocket gateway.
//!
//! The gateway sits behind a trusted identity front-end. It issues console
//! sessions, bridges each redeemed session to the hypervisor's VNC WebSocket,
//! exposes power actions and the VM listing, and serves health and metrics.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod upstream;
pub mod ws;

pub use error::ApiError;
pub use server::{GatewayState, HealthState, router, start_server};
pub use upstream::UpstreamConsole;
