// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory `PortalStore` for tests.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use vmportal_core::{
    HealthStatus, PortalAdapter, PortalError, PortalStore, SecurityEvent, User, VmKey, VmRecord,
};

#[derive(Default)]
struct Tables {
    vms: BTreeMap<Uuid, VmRecord>,
    users: BTreeMap<Uuid, User>,
    events: Vec<SecurityEvent>,
    save_calls: usize,
    fail_saves: bool,
}

/// Map-backed store mirroring the SQLite constraints that matter to callers:
/// batches are all-or-nothing and at most one live record exists per key.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save_vms` fail without writing.
    pub async fn fail_saves(&self, fail: bool) {
        self.tables.lock().await.fail_saves = fail;
    }

    /// Number of `save_vms` calls that reached the store, failed ones included.
    pub async fn save_calls(&self) -> usize {
        self.tables.lock().await.save_calls
    }

    pub async fn security_events(&self) -> Vec<SecurityEvent> {
        self.tables.lock().await.events.clone()
    }

    /// Insert records directly, bypassing the batch bookkeeping.
    pub async fn seed_vms(&self, vms: impl IntoIterator<Item = VmRecord>) {
        let mut tables = self.tables.lock().await;
        for vm in vms {
            tables.vms.insert(vm.id, vm);
        }
    }
}

#[async_trait]
impl PortalAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn health_check(&self) -> Result<HealthStatus, PortalError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl PortalStore for MemoryStore {
    async fn list_vms(&self, include_deleted: bool) -> Result<Vec<VmRecord>, PortalError> {
        let tables = self.tables.lock().await;
        let mut vms: Vec<VmRecord> = tables
            .vms
            .values()
            .filter(|vm| include_deleted || !vm.is_deleted)
            .cloned()
            .collect();
        vms.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(vms)
    }

    async fn get_vm(&self, id: Uuid) -> Result<Option<VmRecord>, PortalError> {
        Ok(self.tables.lock().await.vms.get(&id).cloned())
    }

    async fn save_vms(&self, vms: &[VmRecord]) -> Result<(), PortalError> {
        let mut tables = self.tables.lock().await;
        tables.save_calls += 1;
        if tables.fail_saves {
            return Err(PortalError::Storage {
                source: "injected save failure".into(),
            });
        }

        let mut staged = tables.vms.clone();
        for vm in vms {
            staged.insert(vm.id, vm.clone());
        }
        let mut live = HashSet::<VmKey>::new();
        for vm in staged.values().filter(|vm| !vm.is_deleted) {
            if !live.insert(vm.key()) {
                return Err(PortalError::Storage {
                    source: format!("duplicate live VM key {}", vm.key()).into(),
                });
            }
        }
        tables.vms = staged;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, PortalError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn get_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<User>, PortalError> {
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .find(|u| u.external_id.eq_ignore_ascii_case(external_id))
            .cloned())
    }

    async fn upsert_user(&self, user: &User) -> Result<(), PortalError> {
        let mut tables = self.tables.lock().await;
        let mut user = user.clone();
        if let Some(existing) = tables.users.get(&user.id) {
            user.created_at = existing.created_at;
        }
        tables.users.insert(user.id, user);
        Ok(())
    }

    async fn record_security_event(&self, event: &SecurityEvent) -> Result<(), PortalError> {
        self.tables.lock().await.events.push(event.clone());
        Ok(())
    }

    async fn delete_security_events_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, PortalError> {
        let mut tables = self.tables.lock().await;
        let before = tables.events.len();
        tables.events.retain(|e| e.occurred_at >= cutoff);
        Ok((before - tables.events.len()) as u64)
    }
}
