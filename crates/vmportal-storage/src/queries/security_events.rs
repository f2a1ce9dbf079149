// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audit trail queries.

use chrono::{DateTime, Utc};
use rusqlite::params;
use vmportal_core::{PortalError, SecurityEvent};

use super::format_ts;
use crate::database::{Database, map_tr_err};

/// Append one audit event.
pub async fn record_security_event(db: &Database, event: &SecurityEvent) -> Result<(), PortalError> {
    let event = event.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO security_events \
                 (id, event_type, user_id, ip_address, user_agent, details, occurred_at, severity) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    event.id.to_string(),
                    event.event_type,
                    event.user_id.map(|id| id.to_string()),
                    event.ip_address,
                    event.user_agent,
                    event.details,
                    format_ts(event.occurred_at),
                    event.severity.to_string(),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete events that occurred strictly before `cutoff`.
pub async fn delete_before(db: &Database, cutoff: DateTime<Utc>) -> Result<u64, PortalError> {
    let cutoff = format_ts(cutoff);
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM security_events WHERE occurred_at < ?1",
                params![cutoff],
            )
        })
        .await
        .map(|n| n as u64)
        .map_err(map_tr_err)
}

/// Number of stored events. Used by health reporting and tests.
pub async fn count(db: &Database) -> Result<u64, PortalError> {
    db.connection()
        .call(|conn| -> Result<i64, rusqlite::Error> {
            conn.query_row("SELECT COUNT(*) FROM security_events", [], |row| row.get(0))
        })
        .await
        .map(|n| n.max(0) as u64)
        .map_err(map_tr_err)
}
