// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Console access for VmPortal.
//!
//! The [`ConsoleBroker`] mints short-lived, single-use session tokens backed
//! by hypervisor VNC grants. The [`relay`] pump then forwards frames between
//! the browser socket and the upstream VNC socket until either side ends.

pub mod broker;
pub mod relay;
pub mod store;

pub use broker::ConsoleBroker;
pub use relay::{CloseReason, EndReason, Frame, RelayOutcome, Side, Traffic, relay};
pub use store::MemorySessionStore;
