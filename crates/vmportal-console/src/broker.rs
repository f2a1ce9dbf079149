// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Console session broker.
//!
//! A session binds a random bearer token to one VNC grant. Tokens are
//! single use: [`ConsoleBroker::consume_session`] removes the entry in the
//! same step that checks ownership and expiry.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};
use vmportal_core::{Clock, ConsoleSession, HypervisorClient, PortalError, Principal, SessionStore};

/// 128 bits of randomness, hex encoded to 32 characters.
const TOKEN_BYTES: usize = 16;

/// Issues and redeems console sessions.
pub struct ConsoleBroker {
    hypervisor: Arc<dyn HypervisorClient>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
}

impl ConsoleBroker {
    pub fn new(
        hypervisor: Arc<dyn HypervisorClient>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        lifetime: Duration,
    ) -> Self {
        Self {
            hypervisor,
            store,
            clock,
            lifetime,
        }
    }

    /// How long a new session stays redeemable.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Obtain a VNC grant for `node`/`vm_id` and store it under a fresh token.
    ///
    /// Nothing is stored when either hypervisor call fails.
    pub async fn create_session(
        &self,
        node: &str,
        vm_id: u32,
        owner_external_id: &str,
    ) -> Result<String, PortalError> {
        let login = self
            .hypervisor
            .login()
            .await
            .map_err(|e| as_upstream("console login failed", e))?;
        let grant = self
            .hypervisor
            .create_vnc_proxy(node, vm_id, &login)
            .await
            .map_err(|e| as_upstream("VNC proxy request failed", e))?;

        let now = self.clock.now();
        match self.store.purge_expired(now).await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "purged expired console sessions"),
            Err(e) => warn!(error = %e, "failed to purge expired console sessions"),
        }

        let token = new_token();
        let session = ConsoleSession {
            token: token.clone(),
            node: node.to_string(),
            vm_id,
            port: grant.port,
            vnc_ticket: grant.ticket,
            login_ticket: login.ticket,
            owner_external_id: owner_external_id.to_string(),
            expires_at: now + self.lifetime,
        };
        self.store.put(session).await?;

        vmportal_prometheus::record_console_session("created");
        info!(node, vm_id, owner = owner_external_id, "console session created");
        Ok(token)
    }

    /// Look up a live session. Expired entries are evicted on the way.
    pub async fn get_session(&self, token: &str) -> Result<Option<ConsoleSession>, PortalError> {
        if token.trim().is_empty() {
            return Ok(None);
        }
        let Some(session) = self.store.get(token).await? else {
            return Ok(None);
        };
        if session.is_expired_at(self.clock.now()) {
            self.store.remove(token).await?;
            vmportal_prometheus::record_console_session("expired");
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Drop a session whether or not it exists.
    pub async fn invalidate_session(&self, token: &str) -> Result<(), PortalError> {
        if token.trim().is_empty() {
            return Ok(());
        }
        self.store.remove(token).await?;
        Ok(())
    }

    /// Redeem a session for `principal`, removing it atomically.
    ///
    /// Of any number of concurrent callers presenting the same token, at most
    /// one receives the session. An absent, expired or already consumed token
    /// is [`PortalError::SessionNotFound`]; a live session presented by a
    /// non-owner is [`PortalError::SessionForbidden`] and stays redeemable.
    pub async fn consume_session(
        &self,
        token: &str,
        principal: &Principal,
    ) -> Result<ConsoleSession, PortalError> {
        if token.trim().is_empty() {
            return Err(PortalError::SessionNotFound);
        }

        let now = self.clock.now();
        let redeemable =
            |session: &ConsoleSession| !session.is_expired_at(now) && session.is_accessible_by(principal);
        if let Some(session) = self.store.remove_if(token, &redeemable).await? {
            vmportal_prometheus::record_console_session("consumed");
            debug!(node = %session.node, vm_id = session.vm_id, "console session consumed");
            return Ok(session);
        }

        // The predicate rejected it or it is gone; work out which.
        match self.store.get(token).await? {
            Some(session) if session.is_expired_at(now) => {
                self.store.remove(token).await?;
                vmportal_prometheus::record_console_session("expired");
                Err(PortalError::SessionNotFound)
            }
            Some(session) => {
                vmportal_prometheus::record_console_session("rejected");
                warn!(
                    node = %session.node,
                    vm_id = session.vm_id,
                    caller = %principal.external_id,
                    "console session presented by non-owner"
                );
                Err(PortalError::SessionForbidden)
            }
            None => Err(PortalError::SessionNotFound),
        }
    }
}

fn new_token() -> String {
    hex::encode(rand::random::<[u8; TOKEN_BYTES]>())
}

fn as_upstream(context: &str, err: PortalError) -> PortalError {
    match err {
        PortalError::Upstream { .. } => err,
        other => PortalError::Upstream {
            message: format!("{context}: {other}"),
            source: Some(Box::new(other)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySessionStore;
    use vmportal_core::VmKey;
    use vmportal_test_utils::{HypervisorCall, ManualClock, MockHypervisor};

    struct Fixture {
        broker: Arc<ConsoleBroker>,
        hypervisor: Arc<MockHypervisor>,
        store: Arc<MemorySessionStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let hypervisor = Arc::new(MockHypervisor::new());
        let store = Arc::new(MemorySessionStore::new());
        let clock = Arc::new(ManualClock::default());
        let broker = Arc::new(ConsoleBroker::new(
            hypervisor.clone(),
            store.clone(),
            clock.clone(),
            Duration::minutes(5),
        ));
        Fixture {
            broker,
            hypervisor,
            store,
            clock,
        }
    }

    fn alice() -> Principal {
        Principal {
            external_id: "alice".to_string(),
            is_admin: false,
        }
    }

    #[tokio::test]
    async fn create_then_get_returns_session() {
        let f = fixture();
        let token = f.broker.create_session("pve1", 100, "alice").await.unwrap();
        assert_eq!(token.len(), TOKEN_BYTES * 2);

        let session = f.broker.get_session(&token).await.unwrap().unwrap();
        assert_eq!(session.node, "pve1");
        assert_eq!(session.vm_id, 100);
        assert_eq!(session.port, 5900);
        assert_eq!(session.expires_at, f.clock.now() + Duration::minutes(5));
        assert_eq!(session.token, token);
        assert_eq!(session.owner_external_id, "alice");
        assert_eq!(session.vnc_ticket, "PVEVNC:0000170C::dm5j");
        assert_eq!(session.login_ticket, "PVE:console@pve:0000ABCD::bW9jaw==");
    }

    #[tokio::test]
    async fn tokens_are_unique() {
        let f = fixture();
        let a = f.broker.create_session("pve1", 100, "alice").await.unwrap();
        let b = f.broker.create_session("pve1", 100, "alice").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn upstream_failure_stores_nothing() {
        let f = fixture();
        f.hypervisor.fail_vnc_proxy(Some("vm locked")).await;
        let err = f.broker.create_session("pve1", 100, "alice").await.unwrap_err();
        assert!(matches!(err, PortalError::Upstream { .. }));
        assert!(f.store.is_empty());

        f.hypervisor.fail_vnc_proxy(None).await;
        f.hypervisor.fail_login(Some("bad credentials")).await;
        assert!(f.broker.create_session("pve1", 100, "alice").await.is_err());
        assert!(f.store.is_empty());
        assert_eq!(
            f.hypervisor.calls().await,
            vec![
                HypervisorCall::Login,
                HypervisorCall::VncProxy(VmKey::new("pve1", 100)),
                HypervisorCall::Login,
            ]
        );
    }

    #[tokio::test]
    async fn expired_session_is_absent_and_evicted() {
        let f = fixture();
        let token = f.broker.create_session("pve1", 100, "alice").await.unwrap();
        f.clock.advance(Duration::minutes(5));
        assert!(f.broker.get_session(&token).await.unwrap().is_none());
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn blank_token_is_absent() {
        let f = fixture();
        assert!(f.broker.get_session("  ").await.unwrap().is_none());
        assert!(matches!(
            f.broker.consume_session("", &alice()).await,
            Err(PortalError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn invalidate_is_idempotent() {
        let f = fixture();
        let token = f.broker.create_session("pve1", 100, "alice").await.unwrap();
        f.broker.invalidate_session(&token).await.unwrap();
        f.broker.invalidate_session(&token).await.unwrap();
        assert!(f.broker.get_session(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn consume_is_single_use() {
        let f = fixture();
        let token = f.broker.create_session("pve1", 100, "Alice").await.unwrap();

        let session = f.broker.consume_session(&token, &alice()).await.unwrap();
        assert_eq!(session.vm_id, 100);
        assert!(matches!(
            f.broker.consume_session(&token, &alice()).await,
            Err(PortalError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn non_owner_is_forbidden_and_session_survives() {
        let f = fixture();
        let token = f.broker.create_session("pve1", 100, "alice").await.unwrap();
        let mallory = Principal {
            external_id: "mallory".to_string(),
            is_admin: false,
        };
        assert!(matches!(
            f.broker.consume_session(&token, &mallory).await,
            Err(PortalError::SessionForbidden)
        ));
        assert!(f.broker.consume_session(&token, &alice()).await.is_ok());
    }

    #[tokio::test]
    async fn admin_bypasses_ownership() {
        let f = fixture();
        let token = f.broker.create_session("pve1", 100, "alice").await.unwrap();
        let admin = Principal {
            external_id: "root".to_string(),
            is_admin: true,
        };
        assert!(f.broker.consume_session(&token, &admin).await.is_ok());
    }

    #[tokio::test]
    async fn expired_consume_is_not_found() {
        let f = fixture();
        let token = f.broker.create_session("pve1", 100, "alice").await.unwrap();
        f.clock.advance(Duration::minutes(6));
        assert!(matches!(
            f.broker.consume_session(&token, &alice()).await,
            Err(PortalError::SessionNotFound)
        ));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn create_purges_expired_entries() {
        let f = fixture();
        f.broker.create_session("pve1", 100, "alice").await.unwrap();
        f.clock.advance(Duration::minutes(10));
        f.broker.create_session("pve1", 101, "alice").await.unwrap();
        assert_eq!(f.store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers_have_one_winner() {
        let f = fixture();
        let token = f.broker.create_session("pve1", 100, "alice").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let broker = f.broker.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                broker.consume_session(&token, &alice()).await.is_ok()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
