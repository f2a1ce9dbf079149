// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contract of the hypervisor control-plane API.

use async_trait::async_trait;

use crate::error::PortalError;
use crate::traits::adapter::PortalAdapter;
use crate::types::{LoginTicket, RemoteVm, VmStatus, VncProxyTicket};

/// Authenticated access to the hypervisor cluster.
///
/// Every call except [`delete_vm`](HypervisorClient::delete_vm) is safe to
/// retry. `delete_vm` must report an already-removed VM as
/// [`PortalError::UpstreamNotFound`] so callers can treat double deletion as
/// success.
#[async_trait]
pub trait HypervisorClient: PortalAdapter {
    /// Current power state of one VM.
    async fn get_status(&self, node: &str, vm_id: u32) -> Result<VmStatus, PortalError>;

    async fn start_vm(&self, node: &str, vm_id: u32) -> Result<(), PortalError>;

    async fn stop_vm(&self, node: &str, vm_id: u32) -> Result<(), PortalError>;

    async fn shutdown_vm(&self, node: &str, vm_id: u32) -> Result<(), PortalError>;

    async fn reboot_vm(&self, node: &str, vm_id: u32) -> Result<(), PortalError>;

    /// The full cluster-wide VM inventory.
    async fn list_vms(&self) -> Result<Vec<RemoteVm>, PortalError>;

    /// Obtain a login ticket for console access.
    async fn login(&self) -> Result<LoginTicket, PortalError>;

    /// Mint a VNC proxy grant for one VM using a fresh login ticket.
    async fn create_vnc_proxy(
        &self,
        node: &str,
        vm_id: u32,
        login: &LoginTicket,
    ) -> Result<VncProxyTicket, PortalError>;

    /// Permanently remove a VM from the cluster.
    async fn delete_vm(&self, node: &str, vm_id: u32) -> Result<(), PortalError>;
}
