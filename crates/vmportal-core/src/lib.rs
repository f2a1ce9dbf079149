// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the VmPortal services.
//!
//! This crate provides the error taxonomy, domain types, and collaborator
//! traits (hypervisor API, persistence, session store, clock) used throughout
//! the workspace. Concrete collaborators implement the traits defined here.

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use error::PortalError;
pub use types::{
    ConsoleSession, HealthStatus, LoginTicket, PowerAction, Principal, RemoteVm, SecurityEvent,
    Severity, User, UserRole, VmKey, VmRecord, VmStatus, VncProxyTicket,
};

pub use traits::{HypervisorClient, PortalAdapter, PortalStore, SessionPredicate, SessionStore};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::str::FromStr;

    fn session(owner: &str) -> ConsoleSession {
        ConsoleSession {
            token: "0123456789abcdef0123456789abcdef".into(),
            node: "pve1".into(),
            vm_id: 100,
            port: 5900,
            vnc_ticket: "PVEVNC:secret".into(),
            login_ticket: "PVE:root@pam:secret".into(),
            owner_external_id: owner.into(),
            expires_at: Utc.with_ymd_and_hms(2026, 1, 1, 12, 5, 0).unwrap(),
        }
    }

    #[test]
    fn hypervisor_status_mapping() {
        assert_eq!(VmStatus::from_hypervisor("running"), VmStatus::Running);
        assert_eq!(VmStatus::from_hypervisor("Stopped"), VmStatus::Stopped);
        assert_eq!(VmStatus::from_hypervisor("paused"), VmStatus::Paused);
        assert_eq!(VmStatus::from_hypervisor("prelaunch"), VmStatus::Unknown);
        assert_eq!(VmStatus::from_hypervisor(""), VmStatus::Unknown);
    }

    #[test]
    fn vm_status_display_round_trip() {
        for status in [
            VmStatus::Running,
            VmStatus::Stopped,
            VmStatus::Paused,
            VmStatus::Unknown,
        ] {
            let parsed = VmStatus::from_str(&status.to_string()).expect("should parse back");
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn power_action_parses_lowercase() {
        assert_eq!(PowerAction::from_str("reboot").unwrap(), PowerAction::Reboot);
        assert_eq!(PowerAction::Shutdown.to_string(), "shutdown");
        assert!(PowerAction::from_str("destroy").is_err());
    }

    #[test]
    fn session_expiry_is_exclusive() {
        let s = session("alice");
        assert!(!s.is_expired_at(s.expires_at - Duration::seconds(1)));
        assert!(s.is_expired_at(s.expires_at));
    }

    #[test]
    fn session_owner_check_ignores_case_and_admin_bypasses() {
        let s = session("Alice@Corp");
        let owner = Principal {
            external_id: "alice@corp".into(),
            is_admin: false,
        };
        let other = Principal {
            external_id: "bob@corp".into(),
            is_admin: false,
        };
        let admin = Principal {
            external_id: "root@corp".into(),
            is_admin: true,
        };
        assert!(s.is_accessible_by(&owner));
        assert!(!s.is_accessible_by(&other));
        assert!(s.is_accessible_by(&admin));
    }

    #[test]
    fn debug_output_hides_tickets() {
        let rendered = format!("{:?}", session("alice"));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("pve1"));

        let login = LoginTicket {
            ticket: "PVE:secret".into(),
            csrf_token: "csrf-secret".into(),
        };
        assert!(!format!("{login:?}").contains("secret"));
    }

    #[test]
    fn vm_record_link_check() {
        assert!(VmRecord::new("pve1", 100, "web").is_linked());
        assert!(!VmRecord::new("pve1", 0, "draft").is_linked());
        assert!(!VmRecord::new("  ", 100, "draft").is_linked());
    }

    #[test]
    fn not_found_is_distinguishable() {
        let gone = PortalError::UpstreamNotFound {
            resource: "pve1/100".into(),
        };
        assert!(gone.is_not_found());
        assert!(!PortalError::upstream("boom").is_not_found());
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_hypervisor<T: HypervisorClient>() {}
        fn _assert_store<T: PortalStore>() {}
        fn _assert_session_store<T: SessionStore>() {}
        fn _assert_clock<T: Clock>() {}
        _assert_clock::<SystemClock>();
    }
}
