// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audit trail retention.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info};
use vmportal_core::{Clock, PortalError, PortalStore};

/// Deletes security events older than the retention window.
pub struct RetentionJob {
    store: Arc<dyn PortalStore>,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl RetentionJob {
    pub fn new(store: Arc<dyn PortalStore>, clock: Arc<dyn Clock>, retention: Duration) -> Self {
        Self {
            store,
            clock,
            retention,
        }
    }

    /// Prune once. Returns the number of events removed.
    pub async fn run_once(&self) -> Result<u64, PortalError> {
        let cutoff = self.clock.now() - self.retention;
        let pruned = self.store.delete_security_events_before(cutoff).await?;
        vmportal_prometheus::record_security_events_pruned(pruned);
        if pruned > 0 {
            info!(pruned, %cutoff, "pruned expired security events");
        } else {
            debug!(%cutoff, "no security events past retention");
        }
        Ok(pruned)
    }
}
