// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics for VmPortal.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. Metrics are
//! rendered as Prometheus text via [`PrometheusAdapter::render`], which the
//! gateway exposes on `/metrics`.

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use vmportal_core::traits::PortalAdapter;
use vmportal_core::{HealthStatus, PortalError};

pub use recording::{
    adjust_active_relays, record_console_session, record_hypervisor_request,
    record_reconcile_mutations, record_reconcile_pass, record_relay_traffic,
    record_security_events_pruned, register_metrics,
};

/// Prometheus metrics adapter.
///
/// Installs the Prometheus recorder and exposes a handle for rendering
/// metrics in Prometheus text format.
#[derive(Clone)]
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Installs the Prometheus recorder globally.
    ///
    /// Only one recorder can be installed per process; a second call fails.
    pub fn new() -> Result<Self, PortalError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            PortalError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Wraps an existing handle (for tests using a local recorder).
    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PortalAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    async fn health_check(&self) -> Result<HealthStatus, PortalError> {
        Ok(HealthStatus::Healthy)
    }
}
