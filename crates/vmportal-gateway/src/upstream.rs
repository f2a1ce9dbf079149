// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound connection to the hypervisor's VNC WebSocket.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{COOKIE, ORIGIN};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use url::Url;
use vmportal_core::{ConsoleSession, PortalError};

/// Connected upstream console socket.
pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens VNC WebSocket connections against one hypervisor endpoint.
///
/// Connections are never retried: a VNC ticket is only good for one attempt.
pub struct UpstreamConsole {
    base_url: Url,
    origin: String,
    connector: Connector,
    connect_timeout: Duration,
}

impl UpstreamConsole {
    pub fn new(
        base_url: &str,
        accept_invalid_certs: bool,
        connect_timeout: Duration,
    ) -> Result<Self, PortalError> {
        let origin = base_url.trim_end_matches('/');
        let parsed = Url::parse(origin)
            .map_err(|e| PortalError::Config(format!("invalid hypervisor base URL: {e}")))?;
        let connector = vmportal_security::upstream_ws_connector(accept_invalid_certs)?;
        Ok(Self {
            base_url: parsed,
            origin: origin.to_string(),
            connector,
            connect_timeout,
        })
    }

    /// `wss://{host}/api2/json/nodes/{node}/qemu/{vmid}/vncwebsocket?port=..&vncticket=..`,
    /// or `ws://` when the API itself is plain HTTP.
    pub fn console_url(&self, session: &ConsoleSession) -> Result<Url, PortalError> {
        let mut url = self.base_url.clone();
        let scheme = if url.scheme().eq_ignore_ascii_case("https") {
            "wss"
        } else {
            "ws"
        };
        url.set_scheme(scheme)
            .map_err(|()| PortalError::Config(format!("cannot use {scheme} with the hypervisor base URL")))?;

        let vm_id = session.vm_id.to_string();
        url.path_segments_mut()
            .map_err(|()| PortalError::Config("hypervisor base URL cannot carry a path".into()))?
            .clear()
            .extend([
                "api2",
                "json",
                "nodes",
                session.node.as_str(),
                "qemu",
                vm_id.as_str(),
                "vncwebsocket",
            ]);
        url.query_pairs_mut()
            .clear()
            .append_pair("port", &session.port.to_string())
            .append_pair("vncticket", &session.vnc_ticket);
        url.set_fragment(None);
        Ok(url)
    }

    /// Connect using the session's login ticket as `PVEAuthCookie`.
    pub async fn connect(&self, session: &ConsoleSession) -> Result<UpstreamSocket, PortalError> {
        let url = self.console_url(session)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| connect_error("invalid VNC WebSocket request", e))?;

        let cookie = HeaderValue::from_str(&format!("PVEAuthCookie={}", session.login_ticket))
            .map_err(|e| connect_error("login ticket is not a valid header value", e))?;
        let origin = HeaderValue::from_str(&self.origin)
            .map_err(|e| connect_error("base URL is not a valid origin header", e))?;
        request.headers_mut().insert(COOKIE, cookie);
        request.headers_mut().insert(ORIGIN, origin);

        let connect =
            connect_async_tls_with_config(request, None, false, Some(self.connector.clone()));
        let (socket, _response) = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| PortalError::Timeout {
                duration: self.connect_timeout,
            })?
            .map_err(|e| connect_error("VNC WebSocket connect failed", e))?;

        tracing::debug!(node = %session.node, vm_id = session.vm_id, "upstream console connected");
        Ok(socket)
    }
}

fn connect_error(
    context: &str,
    err: impl std::error::Error + Send + Sync + 'static,
) -> PortalError {
    PortalError::Upstream {
        message: format!("{context}: {err}"),
        source: Some(Box::new(err)),
    }
}
