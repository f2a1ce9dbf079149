// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! All traits use `#[async_trait]` for dynamic dispatch compatibility so the
//! services can hold them as `Arc<dyn Trait>`.

pub mod adapter;
pub mod hypervisor;
pub mod session;
pub mod store;

pub use adapter::PortalAdapter;
pub use hypervisor::HypervisorClient;
pub use session::{SessionPredicate, SessionStore};
pub use store::PortalStore;
