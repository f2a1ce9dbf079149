// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock hypervisor for deterministic testing.
//!
//! `MockHypervisor` implements `HypervisorClient` over an in-memory
//! inventory, records every call, and can be told to fail specific
//! operations.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use vmportal_core::{
    HealthStatus, HypervisorClient, LoginTicket, PortalAdapter, PortalError, PowerAction,
    RemoteVm, VmKey, VmStatus, VncProxyTicket,
};

/// What `delete_vm` should do for a given key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteBehavior {
    /// The hypervisor reports the VM as already gone.
    NotFound,
    /// Any other upstream failure with this message.
    Fail(String),
}

/// A recorded call against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HypervisorCall {
    ListVms,
    Login,
    VncProxy(VmKey),
    Delete(VmKey),
    Power(PowerAction, VmKey),
    Status(VmKey),
}

#[derive(Default)]
struct State {
    inventory: Vec<RemoteVm>,
    list_error: Option<String>,
    login_error: Option<String>,
    vnc_error: Option<String>,
    delete_behavior: HashMap<VmKey, DeleteBehavior>,
    calls: Vec<HypervisorCall>,
    next_vnc_port: u16,
}

/// A scripted hypervisor.
pub struct MockHypervisor {
    state: Mutex<State>,
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_vnc_port: 5900,
                ..State::default()
            }),
        }
    }

    /// Create a mock reporting the given inventory.
    pub fn with_inventory(inventory: Vec<RemoteVm>) -> Self {
        Self {
            state: Mutex::new(State {
                inventory,
                next_vnc_port: 5900,
                ..State::default()
            }),
        }
    }

    pub async fn set_inventory(&self, inventory: Vec<RemoteVm>) {
        self.state.lock().await.inventory = inventory;
    }

    /// Make `list_vms` fail until cleared with `None`.
    pub async fn fail_list(&self, message: Option<&str>) {
        self.state.lock().await.list_error = message.map(str::to_string);
    }

    pub async fn fail_login(&self, message: Option<&str>) {
        self.state.lock().await.login_error = message.map(str::to_string);
    }

    pub async fn fail_vnc_proxy(&self, message: Option<&str>) {
        self.state.lock().await.vnc_error = message.map(str::to_string);
    }

    pub async fn set_delete_behavior(&self, key: VmKey, behavior: DeleteBehavior) {
        self.state.lock().await.delete_behavior.insert(key, behavior);
    }

    /// All calls made so far, in order.
    pub async fn calls(&self) -> Vec<HypervisorCall> {
        self.state.lock().await.calls.clone()
    }

    /// Keys passed to `delete_vm`, in order.
    pub async fn deleted(&self) -> Vec<VmKey> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|c| match c {
                HypervisorCall::Delete(key) => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    async fn power(&self, action: PowerAction, node: &str, vm_id: u32) -> Result<(), PortalError> {
        let key = VmKey::new(node, vm_id);
        let mut state = self.state.lock().await;
        state.calls.push(HypervisorCall::Power(action, key.clone()));
        let target = match action {
            PowerAction::Start | PowerAction::Reboot => VmStatus::Running,
            PowerAction::Stop | PowerAction::Shutdown => VmStatus::Stopped,
        };
        match state.inventory.iter_mut().find(|vm| vm.key() == key) {
            Some(vm) => {
                vm.status = target;
                Ok(())
            }
            None => Err(PortalError::UpstreamNotFound {
                resource: key.to_string(),
            }),
        }
    }
}

impl Default for MockHypervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PortalAdapter for MockHypervisor {
    fn name(&self) -> &str {
        "mock-hypervisor"
    }

    async fn health_check(&self) -> Result<HealthStatus, PortalError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl HypervisorClient for MockHypervisor {
    async fn get_status(&self, node: &str, vm_id: u32) -> Result<VmStatus, PortalError> {
        let key = VmKey::new(node, vm_id);
        let mut state = self.state.lock().await;
        state.calls.push(HypervisorCall::Status(key.clone()));
        state
            .inventory
            .iter()
            .find(|vm| vm.key() == key)
            .map(|vm| vm.status)
            .ok_or_else(|| PortalError::UpstreamNotFound {
                resource: key.to_string(),
            })
    }

    async fn start_vm(&self, node: &str, vm_id: u32) -> Result<(), PortalError> {
        self.power(PowerAction::Start, node, vm_id).await
    }

    async fn stop_vm(&self, node: &str, vm_id: u32) -> Result<(), PortalError> {
        self.power(PowerAction::Stop, node, vm_id).await
    }

    async fn shutdown_vm(&self, node: &str, vm_id: u32) -> Result<(), PortalError> {
        self.power(PowerAction::Shutdown, node, vm_id).await
    }

    async fn reboot_vm(&self, node: &str, vm_id: u32) -> Result<(), PortalError> {
        self.power(PowerAction::Reboot, node, vm_id).await
    }

    async fn list_vms(&self) -> Result<Vec<RemoteVm>, PortalError> {
        let mut state = self.state.lock().await;
        state.calls.push(HypervisorCall::ListVms);
        match &state.list_error {
            Some(message) => Err(PortalError::upstream(message.clone())),
            None => Ok(state.inventory.clone()),
        }
    }

    async fn login(&self) -> Result<LoginTicket, PortalError> {
        let mut state = self.state.lock().await;
        state.calls.push(HypervisorCall::Login);
        match &state.login_error {
            Some(message) => Err(PortalError::upstream(message.clone())),
            None => Ok(LoginTicket {
                ticket: "PVE:console@pve:0000ABCD::bW9jaw==".to_string(),
                csrf_token: "0000ABCD:mockcsrf".to_string(),
            }),
        }
    }

    async fn create_vnc_proxy(
        &self,
        node: &str,
        vm_id: u32,
        _login: &LoginTicket,
    ) -> Result<VncProxyTicket, PortalError> {
        let key = VmKey::new(node, vm_id);
        let mut state = self.state.lock().await;
        state.calls.push(HypervisorCall::VncProxy(key.clone()));
        if let Some(message) = &state.vnc_error {
            return Err(PortalError::upstream(message.clone()));
        }
        let port = state.next_vnc_port;
        state.next_vnc_port = state.next_vnc_port.wrapping_add(1);
        Ok(VncProxyTicket {
            port,
            ticket: format!("PVEVNC:{port:08X}::dm5j"),
        })
    }

    async fn delete_vm(&self, node: &str, vm_id: u32) -> Result<(), PortalError> {
        let key = VmKey::new(node, vm_id);
        let mut state = self.state.lock().await;
        state.calls.push(HypervisorCall::Delete(key.clone()));
        match state.delete_behavior.get(&key).cloned() {
            Some(DeleteBehavior::NotFound) => Err(PortalError::UpstreamNotFound {
                resource: key.to_string(),
            }),
            Some(DeleteBehavior::Fail(message)) => Err(PortalError::upstream(message)),
            None => {
                state.inventory.retain(|vm| vm.key() != key);
                Ok(())
            }
        }
    }
}

/// Shorthand for a remote inventory entry.
pub fn remote_vm(node: &str, vm_id: u32, name: &str, status: VmStatus) -> RemoteVm {
    RemoteVm {
        node: node.to_string(),
        vm_id,
        name: name.to_string(),
        status,
        tags: Default::default(),
        cpu_cores: 2,
        memory_mib: 4096,
        disk_gib: 32,
    }
}
