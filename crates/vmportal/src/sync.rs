// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vmportal sync`: one reconciliation pass against the live cluster.

use std::sync::Arc;

use vmportal_config::PortalConfig;
use vmportal_core::{Clock, HypervisorClient, PortalError, PortalStore, SystemClock};
use vmportal_proxmox::ProxmoxHypervisor;
use vmportal_storage::SqliteStore;
use vmportal_sync::{PassReport, Reconciler};

use crate::serve::init_tracing;

pub async fn run_sync(config: PortalConfig) -> Result<(), PortalError> {
    init_tracing(&config);

    let store = Arc::new(SqliteStore::new(config.storage.clone()));
    store.initialize().await?;

    let hypervisor: Arc<dyn HypervisorClient> =
        Arc::new(ProxmoxHypervisor::new(&config.proxmox)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let portal_store: Arc<dyn PortalStore> = store.clone();
    let reconciler = Reconciler::new(
        hypervisor,
        portal_store,
        clock,
        chrono::Duration::days(i64::from(config.sync.delete_grace_days)),
    );

    let result = reconciler.run_pass().await;
    store.close().await?;

    let report = result?;
    println!("{}", summary(&report));
    Ok(())
}

fn summary(report: &PassReport) -> String {
    format!(
        "sync complete: {} disabled, {} tombstoned, {} updated, {} orphaned, {} failed deletes",
        report.disabled, report.tombstoned, report.updated, report.orphans, report.delete_failures
    )
}
