// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage capability for ephemeral console sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PortalError;
use crate::types::ConsoleSession;

/// Predicate evaluated atomically against a stored session.
pub type SessionPredicate<'a> = &'a (dyn Fn(&ConsoleSession) -> bool + Send + Sync);

/// Thread-safe keyed store for console sessions.
///
/// Each session carries its own absolute expiry; implementations may use it
/// as a TTL. All per-token operations must be atomic.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn put(&self, session: ConsoleSession) -> Result<(), PortalError>;

    async fn get(&self, token: &str) -> Result<Option<ConsoleSession>, PortalError>;

    /// Remove and return the session, if present.
    async fn remove(&self, token: &str) -> Result<Option<ConsoleSession>, PortalError>;

    /// Remove and return the session only if `predicate` holds for it.
    /// Returns `None` when the token is absent or the predicate rejected it.
    async fn remove_if(
        &self,
        token: &str,
        predicate: SessionPredicate<'_>,
    ) -> Result<Option<ConsoleSession>, PortalError>;

    /// Drop every session that has expired at `now`. Returns the number dropped.
    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, PortalError> {
        Ok(0)
    }
}
