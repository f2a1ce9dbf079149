// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder collects these
//! metrics; without a recorder the calls are no-ops.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all VmPortal metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "vmportal_console_sessions_total",
        "Console session lifecycle events by outcome"
    );
    describe_gauge!("vmportal_console_relays_active", "Console relays currently pumping");
    describe_counter!(
        "vmportal_console_relay_frames_total",
        "Frames forwarded by console relays"
    );
    describe_counter!(
        "vmportal_console_relay_bytes_total",
        "Payload bytes forwarded by console relays"
    );
    describe_counter!(
        "vmportal_reconcile_passes_total",
        "Inventory reconciliation passes by outcome"
    );
    describe_counter!(
        "vmportal_reconcile_mutations_total",
        "VM record mutations applied by reconciliation"
    );
    describe_histogram!(
        "vmportal_reconcile_duration_seconds",
        "Wall time of one reconciliation pass"
    );
    describe_counter!(
        "vmportal_security_events_pruned_total",
        "Security events removed by retention"
    );
    describe_counter!(
        "vmportal_hypervisor_requests_total",
        "Hypervisor API requests by method and outcome"
    );
}

fn outcome(ok: bool) -> &'static str {
    if ok { "ok" } else { "error" }
}

/// Record a console session lifecycle event (`created`, `consumed`, `rejected`, `failed`).
pub fn record_console_session(event: &'static str) {
    metrics::counter!("vmportal_console_sessions_total", "event" => event).increment(1);
}

/// Adjust the active relay gauge by `delta` (+1 on start, -1 on end).
pub fn adjust_active_relays(delta: f64) {
    metrics::gauge!("vmportal_console_relays_active").increment(delta);
}

/// Record frames and bytes forwarded in one direction of a relay.
pub fn record_relay_traffic(direction: &'static str, frames: u64, bytes: u64) {
    metrics::counter!("vmportal_console_relay_frames_total", "direction" => direction)
        .increment(frames);
    metrics::counter!("vmportal_console_relay_bytes_total", "direction" => direction)
        .increment(bytes);
}

/// Record the outcome of one reconciliation pass.
pub fn record_reconcile_pass(ok: bool, seconds: f64) {
    metrics::counter!("vmportal_reconcile_passes_total", "outcome" => outcome(ok)).increment(1);
    metrics::histogram!("vmportal_reconcile_duration_seconds").record(seconds);
}

/// Record mutations of one kind (`disabled`, `tombstoned`, `updated`).
pub fn record_reconcile_mutations(kind: &'static str, count: u64) {
    if count > 0 {
        metrics::counter!("vmportal_reconcile_mutations_total", "kind" => kind).increment(count);
    }
}

/// Record security events removed by the retention job.
pub fn record_security_events_pruned(count: u64) {
    metrics::counter!("vmportal_security_events_pruned_total").increment(count);
}

/// Record one hypervisor API request.
pub fn record_hypervisor_request(method: &str, ok: bool) {
    metrics::counter!(
        "vmportal_hypervisor_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome(ok)
    )
    .increment(1);
}
