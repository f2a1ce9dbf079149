// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the `PortalStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

use vmportal_config::model::StorageConfig;
use vmportal_core::{HealthStatus, PortalAdapter, PortalError, PortalStore, SecurityEvent, User, VmRecord};

use crate::database::Database;
use crate::queries;

/// SQLite-backed portal store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is opened by [`SqliteStore::initialize`].
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// The database connection is not opened until [`SqliteStore::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Open the database and run migrations. Fails if called twice.
    pub async fn initialize(&self) -> Result<(), PortalError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| PortalError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    /// Checkpoint the WAL before shutdown.
    pub async fn close(&self) -> Result<(), PortalError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("WAL checkpoint complete");
        }
        Ok(())
    }

    fn db(&self) -> Result<&Database, PortalError> {
        self.db.get().ok_or_else(|| PortalError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PortalAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn health_check(&self) -> Result<HealthStatus, PortalError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl PortalStore for SqliteStore {
    async fn list_vms(&self, include_deleted: bool) -> Result<Vec<VmRecord>, PortalError> {
        queries::vms::list_vms(self.db()?, include_deleted).await
    }

    async fn get_vm(&self, id: Uuid) -> Result<Option<VmRecord>, PortalError> {
        queries::vms::get_vm(self.db()?, id).await
    }

    async fn save_vms(&self, vms: &[VmRecord]) -> Result<(), PortalError> {
        queries::vms::save_vms(self.db()?, vms).await
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, PortalError> {
        queries::users::get_user(self.db()?, id).await
    }

    async fn get_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<User>, PortalError> {
        queries::users::get_user_by_external_id(self.db()?, external_id).await
    }

    async fn upsert_user(&self, user: &User) -> Result<(), PortalError> {
        queries::users::upsert_user(self.db()?, user).await
    }

    async fn record_security_event(&self, event: &SecurityEvent) -> Result<(), PortalError> {
        queries::security_events::record_security_event(self.db()?, event).await
    }

    async fn delete_security_events_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, PortalError> {
        queries::security_events::delete_before(self.db()?, cutoff).await
    }
}
