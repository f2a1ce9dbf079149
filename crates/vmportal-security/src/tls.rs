// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TLS setup for outbound hypervisor connections.
//!
//! Both the REST client and the upstream VNC WebSocket enforce TLS 1.2+ and
//! verify certificates against the webpki roots, unless the operator opted
//! into accepting self-signed certificates for a lab cluster.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_tungstenite::Connector;
use tracing::{error, warn};
use vmportal_core::PortalError;

/// Build the reqwest client used for hypervisor API calls.
///
/// - Minimum TLS 1.2.
/// - Bounded per-request timeout.
/// - `default_headers` carries the API token header.
pub fn build_hypervisor_client(
    timeout: Duration,
    accept_invalid_certs: bool,
    default_headers: HeaderMap,
) -> Result<reqwest::Client, PortalError> {
    if accept_invalid_certs {
        warn!("hypervisor certificate verification is disabled");
    }

    reqwest::Client::builder()
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .default_headers(default_headers)
        .timeout(timeout)
        .build()
        .map_err(|e| {
            error!("failed to build hypervisor HTTP client: {e}");
            PortalError::Config(format!("failed to build hypervisor HTTP client: {e}"))
        })
}

/// Build the TLS connector for the upstream VNC WebSocket.
pub fn upstream_ws_connector(accept_invalid_certs: bool) -> Result<Connector, PortalError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| PortalError::Config(format!("invalid TLS protocol configuration: {e}")))?;

    let config = if accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
            .with_no_client_auth()
    } else {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    Ok(Connector::Rustls(Arc::new(config)))
}

/// Certificate verifier that accepts any server certificate but still checks
/// handshake signatures, so the session keys are bound to the presented cert.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Validate the hypervisor base URL.
///
/// Localhost may use plain HTTP (test doubles, SSH tunnels); remote hosts must use HTTPS.
pub fn validate_url(url: &str) -> Result<(), PortalError> {
    let parsed =
        url::Url::parse(url).map_err(|e| PortalError::Config(format!("invalid URL: {e}")))?;

    let host = parsed.host_str().unwrap_or("");
    if is_localhost(host) {
        return Ok(());
    }

    if parsed.scheme() != "https" {
        error!(url = %url, "TLS required for remote hypervisor");
        return Err(PortalError::Config(
            "TLS required for remote hypervisor connections, use https".to_string(),
        ));
    }

    Ok(())
}

/// Check if an address refers to localhost.
pub fn is_localhost(addr: &str) -> bool {
    matches!(addr, "127.0.0.1" | "::1" | "localhost" | "[::1]") || addr.starts_with("127.")
}
