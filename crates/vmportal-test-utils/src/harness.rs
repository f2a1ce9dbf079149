// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared wiring for tests that need a hypervisor, a store, and a clock.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use vmportal_core::{PortalStore, RemoteVm, User, UserRole, VmRecord};

use crate::clock::ManualClock;
use crate::memory_store::MemoryStore;
use crate::mock_hypervisor::MockHypervisor;

/// Mock collaborators plus seeding helpers.
pub struct TestHarness {
    pub hypervisor: Arc<MockHypervisor>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            hypervisor: Arc::new(MockHypervisor::new()),
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(ManualClock::default()),
        }
    }

    /// Start with the given remote inventory.
    pub fn with_inventory(inventory: Vec<RemoteVm>) -> Self {
        Self {
            hypervisor: Arc::new(MockHypervisor::with_inventory(inventory)),
            ..Self::new()
        }
    }

    /// Create and persist a user.
    pub async fn seed_user(&self, external_id: &str, role: UserRole) -> User {
        let user = User {
            id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            username: external_id.to_string(),
            email: format!("{external_id}@example.com"),
            display_name: external_id.to_string(),
            role,
            created_at: Utc::now(),
            is_active: true,
        };
        // MemoryStore never fails upserts.
        let _ = self.store.upsert_user(&user).await;
        user
    }

    /// Persist a VM record mirroring a remote entry, optionally owned.
    pub async fn seed_vm(&self, remote: &RemoteVm, owner: Option<&User>) -> VmRecord {
        let mut vm = VmRecord::new(remote.node.clone(), remote.vm_id, remote.name.clone());
        vm.status = remote.status;
        vm.cpu_cores = remote.cpu_cores;
        vm.memory_mib = remote.memory_mib;
        vm.disk_gib = remote.disk_gib;
        vm.owner_user_id = owner.map(|u| u.id);
        self.store.seed_vms([vm.clone()]).await;
        vm
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
