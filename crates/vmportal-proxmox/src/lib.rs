// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Proxmox VE hypervisor client for VmPortal.
//!
//! This crate implements [`HypervisorClient`] over the Proxmox VE JSON API:
//! inventory listing, power actions, console login and VNC proxy issuance,
//! and VM deletion with a distinguishable not-found outcome.

pub mod client;
pub mod types;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info};
use vmportal_config::model::ProxmoxConfig;
use vmportal_core::traits::{HypervisorClient, PortalAdapter};
use vmportal_core::{HealthStatus, LoginTicket, PortalError, RemoteVm, VmStatus, VncProxyTicket};

use crate::client::{ApiFailure, ApiRequest, ProxmoxClient};
use crate::types::{ClusterResource, StatusData, TicketData, VncProxyData};

/// Proxmox VE implementation of [`HypervisorClient`].
pub struct ProxmoxHypervisor {
    client: ProxmoxClient,
    console_credentials: Option<(String, String)>,
}

impl ProxmoxHypervisor {
    /// Creates the hypervisor client from configuration.
    pub fn new(config: &ProxmoxConfig) -> Result<Self, PortalError> {
        vmportal_security::validate_url(&config.base_url)?;
        let client = ProxmoxClient::new(config)?;

        let console_credentials = match (&config.console_username, &config.console_password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };

        info!(
            base_url = config.base_url,
            console_enabled = console_credentials.is_some(),
            "hypervisor client initialized"
        );

        Ok(Self {
            client,
            console_credentials,
        })
    }

    /// Creates a hypervisor around an existing transport (for testing).
    #[cfg(test)]
    fn with_client(client: ProxmoxClient, console_credentials: Option<(String, String)>) -> Self {
        Self {
            client,
            console_credentials,
        }
    }

    async fn power(&self, node: &str, vm_id: u32, action: &str) -> Result<(), PortalError> {
        let path = format!("nodes/{node}/qemu/{vm_id}/status/{action}");
        debug!(node, vm_id, action, "issuing power action");
        self.client
            .call_unit(ApiRequest::post(&path))
            .await
            .map_err(|f| f.error)
    }
}

/// A delete of an absent VM reports 404, or 500 with a "does not exist" message.
fn is_missing_vm(failure: &ApiFailure) -> bool {
    match failure.status {
        Some(StatusCode::NOT_FOUND) => true,
        Some(StatusCode::INTERNAL_SERVER_ERROR) => {
            failure.body.to_ascii_lowercase().contains("does not exist")
        }
        _ => false,
    }
}

#[async_trait]
impl PortalAdapter for ProxmoxHypervisor {
    fn name(&self) -> &str {
        "proxmox"
    }

    async fn health_check(&self) -> Result<HealthStatus, PortalError> {
        match self
            .client
            .call::<serde_json::Value>(ApiRequest::get("version").no_retry())
            .await
        {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(failure) => Ok(HealthStatus::Unhealthy(failure.error.to_string())),
        }
    }
}

#[async_trait]
impl HypervisorClient for ProxmoxHypervisor {
    async fn get_status(&self, node: &str, vm_id: u32) -> Result<VmStatus, PortalError> {
        let path = format!("nodes/{node}/qemu/{vm_id}/status/current");
        let data: StatusData = self
            .client
            .call(ApiRequest::get(&path))
            .await
            .map_err(|f| f.error)?;
        Ok(VmStatus::from_hypervisor(
            data.status.as_deref().unwrap_or_default(),
        ))
    }

    async fn start_vm(&self, node: &str, vm_id: u32) -> Result<(), PortalError> {
        self.power(node, vm_id, "start").await
    }

    async fn stop_vm(&self, node: &str, vm_id: u32) -> Result<(), PortalError> {
        self.power(node, vm_id, "stop").await
    }

    async fn shutdown_vm(&self, node: &str, vm_id: u32) -> Result<(), PortalError> {
        self.power(node, vm_id, "shutdown").await
    }

    async fn reboot_vm(&self, node: &str, vm_id: u32) -> Result<(), PortalError> {
        self.power(node, vm_id, "reboot").await
    }

    async fn list_vms(&self) -> Result<Vec<RemoteVm>, PortalError> {
        let resources: Vec<ClusterResource> = self
            .client
            .call(ApiRequest::get("cluster/resources?type=vm"))
            .await
            .map_err(|f| f.error)?;
        let vms: Vec<RemoteVm> = resources
            .into_iter()
            .filter_map(ClusterResource::into_remote_vm)
            .collect();
        debug!(count = vms.len(), "fetched cluster inventory");
        Ok(vms)
    }

    async fn login(&self) -> Result<LoginTicket, PortalError> {
        let (username, password) = self.console_credentials.as_ref().ok_or_else(|| {
            PortalError::Config("proxmox console credentials are not configured".to_string())
        })?;
        let data: TicketData = self
            .client
            .call(
                ApiRequest::post("access/ticket")
                    .form(vec![("username", username.as_str()), ("password", password.as_str())]),
            )
            .await
            .map_err(|f| f.error)?;
        Ok(data.into())
    }

    async fn create_vnc_proxy(
        &self,
        node: &str,
        vm_id: u32,
        login: &LoginTicket,
    ) -> Result<VncProxyTicket, PortalError> {
        let path = format!("nodes/{node}/qemu/{vm_id}/vncproxy");
        let data: VncProxyData = self
            .client
            .call(
                ApiRequest::post(&path)
                    .form(vec![("websocket", "1")])
                    .with_login(login),
            )
            .await
            .map_err(|f| f.error)?;
        data.into_ticket()
            .ok_or_else(|| PortalError::upstream("vncproxy response carried an invalid port"))
    }

    async fn delete_vm(&self, node: &str, vm_id: u32) -> Result<(), PortalError> {
        let path = format!("nodes/{node}/qemu/{vm_id}");
        match self.client.call_unit(ApiRequest::delete(&path)).await {
            Ok(()) => {
                info!(node, vm_id, "deleted VM on hypervisor");
                Ok(())
            }
            Err(failure) if is_missing_vm(&failure) => Err(PortalError::UpstreamNotFound {
                resource: format!("{node}/{vm_id}"),
            }),
            Err(failure) => Err(failure.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hypervisor(server: &MockServer) -> ProxmoxHypervisor {
        let config = ProxmoxConfig {
            token_id: Some("portal@pve!sync".into()),
            token_secret: Some("tok".into()),
            ..ProxmoxConfig::default()
        };
        let client = ProxmoxClient::new(&config)
            .unwrap()
            .with_base_url(&server.uri());
        ProxmoxHypervisor::with_client(
            client,
            Some(("console@pve".into(), "pw".into())),
        )
    }

    #[tokio::test]
    async fn list_vms_filters_qemu_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api2/json/cluster/resources"))
            .and(query_param("type", "vm"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"type": "qemu", "node": "pve1", "vmid": 100, "name": "web", "status": "running",
                     "maxcpu": 2, "maxmem": 2147483648u64, "maxdisk": 34359738368u64},
                    {"type": "lxc", "node": "pve1", "vmid": 200, "name": "ct", "status": "running"},
                    {"type": "qemu", "node": "pve2", "vmid": 101, "name": "db", "status": "stopped",
                     "tags": "prod;db"}
                ]
            })))
            .mount(&server)
            .await;

        let vms = hypervisor(&server).list_vms().await.unwrap();
        assert_eq!(vms.len(), 2);
        assert_eq!(vms[0].memory_mib, 2048);
        assert_eq!(vms[0].disk_gib, 32);
        assert_eq!(vms[1].status, VmStatus::Stopped);
        assert!(vms[1].tags.contains("prod"));
    }

    #[tokio::test]
    async fn login_and_vnc_proxy_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api2/json/access/ticket"))
            .and(body_string_contains("username=console%40pve"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"ticket": "PVE:console@pve:AA::sig", "CSRFPreventionToken": "AA:csrf"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api2/json/nodes/pve1/qemu/100/vncproxy"))
            .and(header("cookie", "PVEAuthCookie=PVE:console@pve:AA::sig"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"port": "5900", "ticket": "PVEVNC:BB::sig", "user": "console@pve"}
            })))
            .mount(&server)
            .await;

        let pve = hypervisor(&server);
        let login = pve.login().await.unwrap();
        assert_eq!(login.csrf_token, "AA:csrf");
        let vnc = pve.create_vnc_proxy("pve1", 100, &login).await.unwrap();
        assert_eq!(vnc.port, 5900);
        assert_eq!(vnc.ticket, "PVEVNC:BB::sig");
    }

    #[tokio::test]
    async fn vnc_proxy_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api2/json/nodes/pve1/qemu/100/vncproxy"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let login = LoginTicket {
            ticket: "t".into(),
            csrf_token: "c".into(),
        };
        let err = hypervisor(&server)
            .create_vnc_proxy("pve1", 100, &login)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Upstream { .. }));
    }

    #[tokio::test]
    async fn login_without_credentials_is_config_error() {
        let server = MockServer::start().await;
        let config = ProxmoxConfig::default();
        let client = ProxmoxClient::new(&config)
            .unwrap()
            .with_base_url(&server.uri());
        let pve = ProxmoxHypervisor::with_client(client, None);
        assert!(matches!(pve.login().await, Err(PortalError::Config(_))));
    }

    #[tokio::test]
    async fn delete_maps_missing_vm_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api2/json/nodes/pve1/qemu/100"))
            .respond_with(ResponseTemplate::new(500).set_body_string(
                "Configuration file 'nodes/pve1/qemu-server/100.conf' does not exist",
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api2/json/nodes/pve1/qemu/101"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api2/json/nodes/pve1/qemu/102"))
            .respond_with(ResponseTemplate::new(500).set_body_string("storage locked"))
            .expect(1)
            .mount(&server)
            .await;

        let pve = hypervisor(&server);
        assert!(pve.delete_vm("pve1", 100).await.unwrap_err().is_not_found());
        assert!(pve.delete_vm("pve1", 101).await.unwrap_err().is_not_found());
        let other = pve.delete_vm("pve1", 102).await.unwrap_err();
        assert!(!other.is_not_found());
    }

    #[tokio::test]
    async fn status_and_power_actions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes/pve1/qemu/100/status/current"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"status": "paused", "qmpstatus": "paused"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api2/json/nodes/pve1/qemu/100/status/reboot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": "UPID:pve1:0001:reboot"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let pve = hypervisor(&server);
        assert_eq!(pve.get_status("pve1", 100).await.unwrap(), VmStatus::Paused);
        pve.reboot_vm("pve1", 100).await.unwrap();
    }

    #[tokio::test]
    async fn power_action_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api2/json/nodes/pve1/qemu/100/status/reboot"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let err = hypervisor(&server).reboot_vm("pve1", 100).await.unwrap_err();
        assert!(matches!(err, PortalError::Upstream { .. }));
    }

    #[tokio::test]
    async fn health_check_reports_unhealthy_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api2/json/version"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let status = hypervisor(&server).health_check().await.unwrap();
        assert!(matches!(status, HealthStatus::Unhealthy(_)));
    }
}
