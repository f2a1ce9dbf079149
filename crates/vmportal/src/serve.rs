// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vmportal serve`: wire the adapters together and run until shutdown.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vmportal_config::PortalConfig;
use vmportal_console::{ConsoleBroker, MemorySessionStore};
use vmportal_core::{
    Clock, HypervisorClient, PortalError, PortalStore, SessionStore, SystemClock,
};
use vmportal_gateway::{GatewayState, HealthState, UpstreamConsole};
use vmportal_prometheus::PrometheusAdapter;
use vmportal_proxmox::ProxmoxHypervisor;
use vmportal_security::{RateLimiter, RedactingWriter};
use vmportal_storage::SqliteStore;
use vmportal_sync::{Reconciler, RetentionJob, run_periodic};

use crate::shutdown;

/// How often expired console sessions and rate-limit windows are dropped.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound on waiting for background jobs once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Secrets from the configuration that must never reach the log output.
pub(crate) fn configured_secrets(config: &PortalConfig) -> Vec<String> {
    [
        &config.auth.proxy_secret,
        &config.proxmox.token_secret,
        &config.proxmox.console_password,
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.is_empty())
    .cloned()
    .collect()
}

/// Initialize tracing with an env filter and a redacting stderr writer.
pub(crate) fn init_tracing(config: &PortalConfig) {
    let secrets = Arc::new(RwLock::new(Vec::new()));
    for secret in configured_secrets(config) {
        RedactingWriter::<std::io::Stderr>::add_secret(&secrets, secret);
    }

    let log_level = &config.portal.log_level;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vmportal={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(move || RedactingWriter::new(std::io::stderr(), secrets.clone()))
        .init();
}

/// Runs the gateway and the background jobs until a shutdown signal arrives.
pub async fn run_serve(config: PortalConfig) -> Result<(), PortalError> {
    init_tracing(&config);
    info!(name = %config.portal.name, "starting vmportal");

    let prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>> =
        match PrometheusAdapter::new() {
            Ok(adapter) => {
                info!("prometheus metrics recorder installed");
                Some(Arc::new(move || adapter.render()))
            }
            Err(e) => {
                warn!(error = %e, "metrics disabled");
                None
            }
        };

    let store = Arc::new(SqliteStore::new(config.storage.clone()));
    store.initialize().await?;
    info!(path = %config.storage.database_path, "storage initialized");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let hypervisor: Arc<dyn HypervisorClient> =
        Arc::new(ProxmoxHypervisor::new(&config.proxmox)?);
    let sessions = Arc::new(MemorySessionStore::new());
    let broker = Arc::new(ConsoleBroker::new(
        hypervisor.clone(),
        sessions.clone(),
        clock.clone(),
        seconds(config.console.session_lifetime_secs),
    ));
    let limiter = Arc::new(RateLimiter::new(
        config.console.rate_limit_max_attempts,
        seconds(config.console.rate_limit_window_secs),
        clock.clone(),
    ));
    let upstream = Arc::new(UpstreamConsole::new(
        &config.proxmox.base_url,
        config.proxmox.accept_invalid_certs,
        Duration::from_secs(config.proxmox.timeout_secs),
    )?);

    let cancel = shutdown::install_signal_handler();
    let portal_store: Arc<dyn PortalStore> = store.clone();

    let mut jobs: Vec<JoinHandle<()>> = Vec::new();
    if config.sync.enabled {
        let reconciler = Arc::new(Reconciler::new(
            hypervisor.clone(),
            portal_store.clone(),
            clock.clone(),
            chrono::Duration::days(i64::from(config.sync.delete_grace_days)),
        ));
        jobs.push(tokio::spawn(run_periodic(
            "inventory-sync",
            Duration::from_secs(config.sync.interval_secs),
            cancel.clone(),
            move || {
                let reconciler = reconciler.clone();
                async move { reconciler.run_pass().await.map(|_| ()) }
            },
        )));
    } else {
        info!("inventory sync disabled");
    }

    if config.retention.enabled {
        let retention = Arc::new(RetentionJob::new(
            portal_store.clone(),
            clock.clone(),
            chrono::Duration::days(i64::from(config.retention.security_event_days)),
        ));
        jobs.push(tokio::spawn(run_periodic(
            "security-event-retention",
            Duration::from_secs(config.retention.interval_hours.saturating_mul(3600)),
            cancel.clone(),
            move || {
                let retention = retention.clone();
                async move { retention.run_once().await.map(|_| ()) }
            },
        )));
    }

    jobs.push(spawn_housekeeping(
        sessions,
        limiter.clone(),
        clock.clone(),
        cancel.clone(),
    ));

    let state = GatewayState {
        broker,
        hypervisor,
        store: portal_store,
        clock,
        limiter,
        upstream,
        auth: config.auth.clone(),
        health: HealthState {
            start_time: Instant::now(),
            prometheus_render,
        },
        shutdown: cancel.clone(),
    };

    let result = vmportal_gateway::start_server(&config.server, state).await;
    if let Err(e) = &result {
        warn!(error = %e, "gateway exited with error");
    }

    // Stop the jobs even when the server exited on its own.
    cancel.cancel();
    shutdown::drain_tasks(jobs, DRAIN_TIMEOUT).await;

    store.close().await?;
    info!("vmportal stopped");
    result
}

fn spawn_housekeeping(
    sessions: Arc<MemorySessionStore>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_periodic(
        "housekeeping",
        HOUSEKEEPING_INTERVAL,
        cancel,
        move || {
            let sessions = sessions.clone();
            let limiter = limiter.clone();
            let now = clock.now();
            async move {
                let expired = sessions.purge_expired(now).await?;
                let windows = limiter.purge_expired();
                if expired > 0 || windows > 0 {
                    tracing::debug!(expired, windows, "housekeeping purged stale entries");
                }
                Ok(())
            }
        },
    ))
}

fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
