// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Proxmox VE JSON API response types.

use std::collections::BTreeSet;

use serde::Deserialize;
use vmportal_core::{LoginTicket, RemoteVm, VmStatus, VncProxyTicket};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;

/// Every Proxmox response wraps its payload in `{"data": ...}`.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: T,
}

/// Payload of `POST access/ticket`.
#[derive(Debug, Deserialize)]
pub struct TicketData {
    pub ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    pub csrf_token: String,
}

impl From<TicketData> for LoginTicket {
    fn from(data: TicketData) -> Self {
        Self {
            ticket: data.ticket,
            csrf_token: data.csrf_token,
        }
    }
}

/// Proxmox reports some numeric fields as strings depending on version.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(u64),
    Text(String),
}

impl NumberOrString {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Payload of `POST nodes/{node}/qemu/{vmid}/vncproxy`.
#[derive(Debug, Deserialize)]
pub struct VncProxyData {
    pub port: NumberOrString,
    pub ticket: String,
}

impl VncProxyData {
    /// Returns `None` when the port is missing or out of range.
    pub fn into_ticket(self) -> Option<VncProxyTicket> {
        let port = self.port.as_u64().and_then(|p| u16::try_from(p).ok())?;
        Some(VncProxyTicket {
            port,
            ticket: self.ticket,
        })
    }
}

/// Payload of `GET nodes/{node}/qemu/{vmid}/status/current`.
#[derive(Debug, Deserialize)]
pub struct StatusData {
    #[serde(default)]
    pub status: Option<String>,
}

/// One entry of `GET cluster/resources?type=vm`.
#[derive(Debug, Deserialize)]
pub struct ClusterResource {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub vmid: Option<NumberOrString>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub maxcpu: Option<f64>,
    #[serde(default)]
    pub maxmem: Option<u64>,
    #[serde(default)]
    pub maxdisk: Option<u64>,
}

impl ClusterResource {
    /// Converts a QEMU resource entry; containers and malformed rows yield `None`.
    pub fn into_remote_vm(self) -> Option<RemoteVm> {
        if self.kind.as_deref() != Some("qemu") {
            return None;
        }
        let node = self.node.filter(|n| !n.trim().is_empty())?;
        let vm_id = self
            .vmid
            .as_ref()
            .and_then(NumberOrString::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)?;

        let tags: BTreeSet<String> = self
            .tags
            .as_deref()
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        Some(RemoteVm {
            node,
            vm_id,
            name: self.name.unwrap_or_default(),
            status: VmStatus::from_hypervisor(self.status.as_deref().unwrap_or_default()),
            tags,
            cpu_cores: self
                .maxcpu
                .filter(|c| c.is_finite() && *c > 0.0)
                .map(|c| c.round() as u32)
                .unwrap_or(0),
            memory_mib: self.maxmem.unwrap_or(0) / MIB,
            disk_gib: self.maxdisk.unwrap_or(0) / GIB,
        })
    }
}
