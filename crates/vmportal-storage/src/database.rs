// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};
use vmportal_core::PortalError;

use crate::migrations::run_migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the portal database.
///
/// Wraps the single `tokio_rusqlite::Connection` every query module goes through.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path`, apply PRAGMAs and
    /// run pending migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, PortalError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| PortalError::Storage {
                    source: Box::new(e),
                })?;
            }
        }

        // Schema setup happens on a short-lived blocking connection so refinery
        // can borrow it mutably; the long-lived handle is opened afterwards.
        let setup_path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), PortalError> {
            let mut conn = rusqlite::Connection::open(&setup_path).map_err(storage_err)?;
            apply_pragmas(&conn, wal_mode).map_err(storage_err)?;
            run_migrations(&mut conn)
        })
        .await
        .map_err(|e| PortalError::Internal(format!("migration task panicked: {e}")))??;
        debug!(path, "migrations applied");

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| PortalError::Storage {
                source: Box::new(e),
            })?;
        conn.call(move |conn| -> Result<(), rusqlite::Error> { apply_pragmas(conn, wal_mode) })
            .await
            .map_err(map_tr_err)?;

        info!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The shared async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL so the main database file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), PortalError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

fn apply_pragmas(conn: &rusqlite::Connection, wal_mode: bool) -> Result<(), rusqlite::Error> {
    if wal_mode {
        // journal_mode returns a row, so it cannot go through execute_batch.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    }
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

fn storage_err(e: rusqlite::Error) -> PortalError {
    PortalError::Storage {
        source: Box::new(e),
    }
}

pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> PortalError {
    PortalError::Storage {
        source: Box::new(e),
    }
}
