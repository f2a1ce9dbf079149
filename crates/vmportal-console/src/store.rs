// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process session store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use vmportal_core::{ConsoleSession, PortalError, SessionPredicate, SessionStore};

/// `SessionStore` on a sharded concurrent map.
///
/// `remove_if` holds the shard lock while evaluating the predicate, so two
/// concurrent removals of the same token can never both succeed.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, ConsoleSession>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, session: ConsoleSession) -> Result<(), PortalError> {
        self.sessions.insert(session.token.clone(), session);
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<ConsoleSession>, PortalError> {
        Ok(self.sessions.get(token).map(|entry| entry.value().clone()))
    }

    async fn remove(&self, token: &str) -> Result<Option<ConsoleSession>, PortalError> {
        Ok(self.sessions.remove(token).map(|(_, session)| session))
    }

    async fn remove_if(
        &self,
        token: &str,
        predicate: SessionPredicate<'_>,
    ) -> Result<Option<ConsoleSession>, PortalError> {
        Ok(self
            .sessions
            .remove_if(token, |_, session| predicate(session))
            .map(|(_, session)| session))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, PortalError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired_at(now));
        Ok(before.saturating_sub(self.sessions.len()))
    }
}
