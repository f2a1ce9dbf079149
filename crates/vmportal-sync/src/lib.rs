// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inventory reconciliation and the periodic jobs that drive it.
//!
//! [`Reconciler`] brings local VM records in line with the hypervisor's
//! inventory in one all-or-nothing pass. [`run_periodic`] runs a job on a
//! fixed, non-overlapping schedule until cancelled. [`RetentionJob`] prunes
//! the audit trail.

pub mod reconcile;
pub mod retention;
pub mod runner;

pub use reconcile::{PassReport, Reconciler};
pub use retention::RetentionJob;
pub use runner::run_periodic;
