// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence collaborator for VM records, users, and audit events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::PortalError;
use crate::traits::adapter::PortalAdapter;
use crate::types::{SecurityEvent, User, VmRecord};

/// Keyed record store backing the portal.
#[async_trait]
pub trait PortalStore: PortalAdapter {
    /// Load all VM records, optionally including tombstoned ones.
    async fn list_vms(&self, include_deleted: bool) -> Result<Vec<VmRecord>, PortalError>;

    async fn get_vm(&self, id: Uuid) -> Result<Option<VmRecord>, PortalError>;

    /// Insert or update a batch of VM records. The batch commits atomically.
    async fn save_vms(&self, vms: &[VmRecord]) -> Result<(), PortalError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, PortalError>;

    async fn get_user_by_external_id(&self, external_id: &str)
    -> Result<Option<User>, PortalError>;

    async fn upsert_user(&self, user: &User) -> Result<(), PortalError>;

    async fn record_security_event(&self, event: &SecurityEvent) -> Result<(), PortalError>;

    /// Delete audit events that occurred strictly before `cutoff`. Returns the number removed.
    async fn delete_security_events_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, PortalError>;
}
