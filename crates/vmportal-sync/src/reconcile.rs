// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inventory reconciliation engine.
//!
//! Lifecycle of a local record (flags, not the VM's power state):
//!
//! ```text
//! Active   --absent remotely-->                    Disabled (disabled_at = now)
//! Disabled --past grace, owned by a real user-->   Deleted  (remote delete first)
//! Disabled --absent remotely, past grace-->        Deleted  (no remote call)
//! Deleted  terminal, never loaded again
//! ```
//!
//! A disabled record that reappears remotely stays disabled; recovery is a
//! manual operator decision.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use vmportal_core::{
    Clock, HypervisorClient, PortalError, PortalStore, RemoteVm, VmKey, VmRecord, VmStatus,
};

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Records newly disabled because they vanished from the inventory.
    pub disabled: usize,
    /// Records marked deleted.
    pub tombstoned: usize,
    /// Remote VMs with no local record.
    pub orphans: usize,
    /// Matched records whose attributes changed.
    pub updated: usize,
    /// Remote deletes that failed; those records were skipped this pass.
    pub delete_failures: usize,
}

impl PassReport {
    /// Local records written by the pass.
    pub fn mutations(&self) -> usize {
        self.disabled + self.tombstoned + self.updated
    }
}

/// Reconciles local VM records against the hypervisor inventory.
pub struct Reconciler {
    hypervisor: Arc<dyn HypervisorClient>,
    store: Arc<dyn PortalStore>,
    clock: Arc<dyn Clock>,
    grace: Duration,
}

impl Reconciler {
    pub fn new(
        hypervisor: Arc<dyn HypervisorClient>,
        store: Arc<dyn PortalStore>,
        clock: Arc<dyn Clock>,
        grace: Duration,
    ) -> Self {
        Self {
            hypervisor,
            store,
            clock,
            grace,
        }
    }

    /// Run one full pass and record its metrics.
    ///
    /// An inventory fetch failure aborts before anything is written. All
    /// mutations of a successful pass are committed in one batch.
    pub async fn run_pass(&self) -> Result<PassReport, PortalError> {
        let started = Instant::now();
        let result = self.reconcile().await;
        vmportal_prometheus::record_reconcile_pass(result.is_ok(), started.elapsed().as_secs_f64());

        if let Ok(report) = &result {
            vmportal_prometheus::record_reconcile_mutations("disabled", report.disabled as u64);
            vmportal_prometheus::record_reconcile_mutations("tombstoned", report.tombstoned as u64);
            vmportal_prometheus::record_reconcile_mutations("updated", report.updated as u64);
            info!(
                disabled = report.disabled,
                tombstoned = report.tombstoned,
                updated = report.updated,
                orphans = report.orphans,
                delete_failures = report.delete_failures,
                "VM inventory reconciliation completed"
            );
        }
        result
    }

    async fn reconcile(&self) -> Result<PassReport, PortalError> {
        debug!("starting VM inventory reconciliation");
        let now = self.clock.now();

        let mut local = self.store.list_vms(false).await?;
        let remote = self
            .hypervisor
            .list_vms()
            .await
            .map_err(|e| PortalError::InventoryFetch {
                source: Box::new(e),
            })?;
        let remote_index = index_remote(remote);

        let mut report = PassReport::default();
        let mut dirty: HashSet<Uuid> = HashSet::new();
        let mut skipped: HashSet<Uuid> = HashSet::new();
        let mut owners: HashMap<Uuid, bool> = HashMap::new();

        // Tombstone disabled records past grace, deleting them remotely first.
        for vm in local.iter_mut() {
            if !vm.is_disabled || vm.is_deleted || !self.past_grace(vm, now) {
                continue;
            }
            if !self.has_real_owner(vm, &mut owners).await? {
                continue;
            }
            match self.hypervisor.delete_vm(&vm.node, vm.vm_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(node = %vm.node, vm_id = vm.vm_id, "VM already gone on hypervisor");
                }
                Err(e) => {
                    let err = PortalError::VmDelete {
                        node: vm.node.clone(),
                        vm_id: vm.vm_id,
                        source: Box::new(e),
                    };
                    warn!(error = %err, "remote delete failed; skipping VM this pass");
                    report.delete_failures += 1;
                    skipped.insert(vm.id);
                    continue;
                }
            }
            tombstone(vm, now);
            warn!(node = %vm.node, vm_id = vm.vm_id, name = %vm.name, "disabled VM past grace period; marked deleted");
            report.tombstoned += 1;
            dirty.insert(vm.id);
        }

        // Presence: disable what vanished, tombstone what stayed gone too long.
        for vm in local.iter_mut() {
            if vm.is_deleted || skipped.contains(&vm.id) || remote_index.contains_key(&vm.key()) {
                continue;
            }
            if !vm.is_disabled {
                vm.is_disabled = true;
                vm.disabled_at = Some(now);
                warn!(node = %vm.node, vm_id = vm.vm_id, name = %vm.name, "VM missing from hypervisor; marked disabled");
                report.disabled += 1;
                dirty.insert(vm.id);
            } else if self.past_grace(vm, now) {
                tombstone(vm, now);
                warn!(node = %vm.node, vm_id = vm.vm_id, name = %vm.name, "VM missing past grace period; marked deleted");
                report.tombstoned += 1;
                dirty.insert(vm.id);
            }
        }

        // Orphans are reported only; ownership comes from provisioning.
        let local_keys: HashSet<VmKey> = local.iter().map(VmRecord::key).collect();
        for (key, remote_vm) in &remote_index {
            if !local_keys.contains(key) {
                warn!(node = %key.node, vm_id = key.vm_id, name = %remote_vm.name, "hypervisor VM not tracked locally");
                report.orphans += 1;
            }
        }

        // Attribute sync on records still live after the steps above.
        for vm in local.iter_mut() {
            if vm.is_deleted || skipped.contains(&vm.id) {
                continue;
            }
            let Some(remote_vm) = remote_index.get(&vm.key()) else {
                continue;
            };
            if sync_attributes(vm, remote_vm, now) {
                vm.last_synced_at = Some(now);
                report.updated += 1;
                dirty.insert(vm.id);
            }
        }

        let changed: Vec<VmRecord> = local.into_iter().filter(|vm| dirty.contains(&vm.id)).collect();
        if !changed.is_empty() {
            self.store.save_vms(&changed).await?;
        }
        Ok(report)
    }

    fn past_grace(&self, vm: &VmRecord, now: DateTime<Utc>) -> bool {
        vm.disabled_at
            .is_some_and(|disabled_at| now - disabled_at > self.grace)
    }

    /// True when the owner reference resolves to an existing user.
    async fn has_real_owner(
        &self,
        vm: &VmRecord,
        cache: &mut HashMap<Uuid, bool>,
    ) -> Result<bool, PortalError> {
        let Some(owner) = vm.owner_user_id else {
            return Ok(false);
        };
        if let Some(known) = cache.get(&owner) {
            return Ok(*known);
        }
        let exists = self.store.get_user(owner).await?.is_some();
        cache.insert(owner, exists);
        Ok(exists)
    }
}

fn index_remote(remote: Vec<RemoteVm>) -> HashMap<VmKey, RemoteVm> {
    let mut index = HashMap::with_capacity(remote.len());
    for vm in remote {
        let key = vm.key();
        if index.insert(key.clone(), vm).is_some() {
            warn!(vm = %key, "duplicate VM key in hypervisor inventory; keeping the last entry");
        }
    }
    index
}

fn tombstone(vm: &mut VmRecord, now: DateTime<Utc>) {
    vm.is_deleted = true;
    vm.deleted_at = Some(now);
}

/// Copy remote attributes onto `vm`. Returns whether anything changed.
///
/// Zero resource values and an `Unknown` status mean "not reported" and never
/// overwrite local data.
fn sync_attributes(vm: &mut VmRecord, remote: &RemoteVm, now: DateTime<Utc>) -> bool {
    let mut changed = false;

    let name = remote.name.trim();
    if !name.is_empty() && vm.name != remote.name {
        info!(node = %vm.node, vm_id = vm.vm_id, old = %vm.name, new = %remote.name, "updating VM name");
        vm.name = remote.name.clone();
        changed = true;
    }

    if remote.status != VmStatus::Unknown && remote.status != vm.status {
        if vm.status == VmStatus::Running {
            if let Some(since) = vm.last_status_change_at {
                let elapsed = (now - since).num_seconds();
                if elapsed > 0 {
                    vm.total_run_time_seconds =
                        vm.total_run_time_seconds.saturating_add(elapsed as u64);
                }
            }
        }
        debug!(node = %vm.node, vm_id = vm.vm_id, from = %vm.status, to = %remote.status, "VM status changed");
        vm.status = remote.status;
        vm.last_status_change_at = Some(now);
        changed = true;
    }

    if remote.cpu_cores > 0 && remote.cpu_cores != vm.cpu_cores {
        vm.cpu_cores = remote.cpu_cores;
        changed = true;
    }
    if remote.memory_mib > 0 && remote.memory_mib != vm.memory_mib {
        vm.memory_mib = remote.memory_mib;
        changed = true;
    }
    if remote.disk_gib > 0 && remote.disk_gib != vm.disk_gib {
        vm.disk_gib = remote.disk_gib;
        changed = true;
    }

    changed
}
