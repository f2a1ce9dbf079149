// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base trait shared by every external collaborator.

use async_trait::async_trait;

use crate::error::PortalError;
use crate::types::HealthStatus;

/// Identity and health reporting for a collaborator (hypervisor API, store).
#[async_trait]
pub trait PortalAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this collaborator instance.
    fn name(&self) -> &str;

    /// Performs a health check and returns the collaborator's current status.
    async fn health_check(&self) -> Result<HealthStatus, PortalError>;
}
