// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for VmPortal integration tests.
//!
//! Provides mock collaborators and a small harness for fast, deterministic,
//! CI-runnable tests without a hypervisor or database.
//!
//! # Components
//!
//! - [`MockHypervisor`] - Scripted hypervisor with call recording and failure injection
//! - [`MemoryStore`] - In-memory `PortalStore` with atomic batch saves
//! - [`ManualClock`] - Clock that only moves when told to
//! - [`TestHarness`] - Bundles the three with seeding helpers

pub mod clock;
pub mod harness;
pub mod memory_store;
pub mod mock_hypervisor;

pub use clock::ManualClock;
pub use harness::TestHarness;
pub use memory_store::MemoryStore;
pub use mock_hypervisor::{DeleteBehavior, HypervisorCall, MockHypervisor, remote_vm};
