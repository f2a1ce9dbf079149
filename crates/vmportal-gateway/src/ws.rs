// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Console WebSocket endpoint.
//!
//! `GET /ws/console/{session_id}` redeems a console session exactly once,
//! connects to the hypervisor's VNC WebSocket, and only then upgrades the
//! browser connection and relays frames both ways until either side closes
//! or the process shuts down.

use axum::{
    extract::{
        Extension, Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamCloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{info, warn};
use vmportal_console::{CloseReason, Frame, relay};
use vmportal_core::{PortalError, Principal};

use crate::server::GatewayState;
use crate::upstream::UpstreamSocket;

/// WebSocket upgrade handler for console sessions.
pub async fn console_ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Path(session_id): Path<String>,
    Extension(principal): Extension<Principal>,
    State(state): State<GatewayState>,
) -> Response {
    let Ok(ws) = ws else {
        return (StatusCode::BAD_REQUEST, "WebSocket request expected.").into_response();
    };

    let session = match state.broker.consume_session(&session_id, &principal).await {
        Ok(session) => session,
        Err(PortalError::SessionNotFound) => {
            return (StatusCode::NOT_FOUND, "Console session not found or expired.").into_response();
        }
        Err(PortalError::SessionForbidden) => {
            return (StatusCode::FORBIDDEN, "Forbidden: not session owner.").into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "console session lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let upstream = match state.upstream.connect(&session).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!(node = %session.node, vm_id = session.vm_id, error = %e, "upstream console connect failed");
            return (StatusCode::BAD_GATEWAY, "Failed to connect to console.").into_response();
        }
    };

    let cancel = state.shutdown.child_token();
    let node = session.node.clone();
    let vm_id = session.vm_id;
    ws.on_failed_upgrade(move |e| warn!(error = %e, "browser WebSocket upgrade failed"))
        .on_upgrade(move |socket| async move {
            info!(%node, vm_id, user = %principal.external_id, "console relay started");
            let outcome = relay(browser_transport(socket), upstream_transport(upstream), cancel).await;
            info!(
                %node,
                vm_id,
                ended_by = ?outcome.ended_by,
                reason = ?outcome.reason,
                browser_frames = outcome.a_to_b.frames,
                upstream_frames = outcome.b_to_a.frames,
                "console relay finished"
            );
        })
}

/// Browser socket as a frame transport.
fn browser_transport(
    socket: WebSocket,
) -> impl Stream<Item = Result<Frame, axum::Error>> + Sink<Frame, Error = axum::Error> {
    socket
        .with(|frame: Frame| future::ready(Ok::<_, axum::Error>(to_browser(frame))))
        .map(|msg| msg.map(from_browser))
}

/// Hypervisor socket as a frame transport.
fn upstream_transport(
    socket: UpstreamSocket,
) -> impl Stream<Item = Result<Frame, tokio_tungstenite::tungstenite::Error>>
+ Sink<Frame, Error = tokio_tungstenite::tungstenite::Error> {
    socket
        .with(|frame: Frame| {
            future::ready(Ok::<_, tokio_tungstenite::tungstenite::Error>(to_upstream(frame)))
        })
        .map(|msg| msg.map(from_upstream))
}

fn from_browser(msg: Message) -> Frame {
    match msg {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(data) => Frame::Binary(data),
        Message::Ping(data) => Frame::Ping(data),
        Message::Pong(data) => Frame::Pong(data),
        Message::Close(frame) => Frame::Close(frame.map(|f| CloseReason {
            code: f.code,
            reason: f.reason.as_str().to_owned(),
        })),
    }
}

fn to_browser(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data),
        Frame::Ping(data) => Message::Ping(data),
        Frame::Pong(data) => Message::Pong(data),
        Frame::Close(reason) => Message::Close(reason.map(|r| CloseFrame {
            code: r.code,
            reason: r.reason.into(),
        })),
    }
}

fn from_upstream(msg: UpstreamMessage) -> Frame {
    match msg {
        UpstreamMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
        UpstreamMessage::Binary(data) => Frame::Binary(data),
        UpstreamMessage::Ping(data) => Frame::Ping(data),
        UpstreamMessage::Pong(data) => Frame::Pong(data),
        UpstreamMessage::Close(frame) => Frame::Close(frame.map(|f| CloseReason {
            code: u16::from(f.code),
            reason: f.reason.as_str().to_owned(),
        })),
        // Raw frames only surface when reading with frame-level access; treat as data.
        UpstreamMessage::Frame(raw) => Frame::Binary(Bytes::copy_from_slice(raw.payload())),
    }
}

fn to_upstream(frame: Frame) -> UpstreamMessage {
    match frame {
        Frame::Text(text) => UpstreamMessage::Text(text.into()),
        Frame::Binary(data) => UpstreamMessage::Binary(data),
        Frame::Ping(data) => UpstreamMessage::Ping(data),
        Frame::Pong(data) => UpstreamMessage::Pong(data),
        Frame::Close(reason) => UpstreamMessage::Close(reason.map(|r| UpstreamCloseFrame {
            code: CloseCode::from(r.code),
            reason: r.reason.into(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use axum::body::Body;
    use axum::http::Request;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::handshake::server::{
        Request as HandshakeRequest, Response as HandshakeResponse,
    };
    use tower::ServiceExt;
    use vmportal_test_utils::TestHarness;

    use crate::server::{router, test_state};

    #[test]
    fn close_reason_survives_both_mappings() {
        let frame = Frame::Close(Some(CloseReason {
            code: 4001,
            reason: "bye".into(),
        }));
        assert_eq!(from_browser(to_browser(frame.clone())), frame);
        assert_eq!(from_upstream(to_upstream(frame.clone())), frame);
    }

    /// Accepts one connection, reports its handshake, echoes data frames.
    async fn spawn_echo_upstream() -> (SocketAddr, oneshot::Receiver<(String, Option<String>)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = move |req: &HandshakeRequest, resp: HandshakeResponse| {
                let cookie = req
                    .headers()
                    .get("cookie")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let _ = tx.send((req.uri().to_string(), cookie));
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
                if (msg.is_text() || msg.is_binary()) && ws.send(msg).await.is_err() {
                    break;
                }
            }
        });
        (addr, rx)
    }

    async fn spawn_gateway(state: GatewayState) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state, &[]);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client_request(
        gateway: SocketAddr,
        token: &str,
        user: &str,
    ) -> tokio_tungstenite::tungstenite::handshake::client::Request {
        let mut request = format!("ws://{gateway}/ws/console/{token}")
            .into_client_request()
            .unwrap();
        let headers = request.headers_mut();
        headers.insert("authorization", "Bearer test-secret".parse().unwrap());
        headers.insert("x-portal-user", user.parse().unwrap());
        request
    }

    fn rejected_status(err: tokio_tungstenite::tungstenite::Error) -> StatusCode {
        match err {
            tokio_tungstenite::tungstenite::Error::Http(response) => response.status(),
            other => panic!("expected HTTP rejection, got {other}"),
        }
    }

    #[tokio::test]
    async fn plain_request_is_rejected() {
        let h = TestHarness::new();
        let app = router(test_state(&h, "http://127.0.0.1:1"), &[]);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/ws/console/whatever")
                    .header("authorization", "Bearer test-secret")
                    .header("x-portal-user", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"WebSocket request expected.");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn relays_frames_and_session_is_single_use() {
        let (upstream_addr, handshake) = spawn_echo_upstream().await;
        let h = TestHarness::new();
        let state = test_state(&h, &format!("http://{upstream_addr}"));
        let token = state.broker.create_session("pve1", 100, "alice").await.unwrap();
        let gateway = spawn_gateway(state).await;

        let (mut client, _) = tokio_tungstenite::connect_async(client_request(gateway, &token, "alice"))
            .await
            .unwrap();

        let (uri, cookie) = handshake.await.unwrap();
        assert!(uri.starts_with("/api2/json/nodes/pve1/qemu/100/vncwebsocket?port=5900&vncticket="));
        assert!(cookie.unwrap().starts_with("PVEAuthCookie=PVE:"));

        client.send(UpstreamMessage::Text("hello".into())).await.unwrap();
        assert_eq!(client.next().await.unwrap().unwrap(), UpstreamMessage::Text("hello".into()));
        client
            .send(UpstreamMessage::Binary(Bytes::from_static(b"RFB 003.008\n")))
            .await
            .unwrap();
        assert_eq!(
            client.next().await.unwrap().unwrap(),
            UpstreamMessage::Binary(Bytes::from_static(b"RFB 003.008\n"))
        );
        client.close(None).await.unwrap();

        let err = tokio_tungstenite::connect_async(client_request(gateway, &token, "alice"))
            .await
            .unwrap_err();
        assert_eq!(rejected_status(err), StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn non_owner_is_forbidden() {
        let h = TestHarness::new();
        let state = test_state(&h, "http://127.0.0.1:1");
        let token = state.broker.create_session("pve1", 100, "alice").await.unwrap();
        let broker = state.broker.clone();
        let gateway = spawn_gateway(state).await;

        let err = tokio_tungstenite::connect_async(client_request(gateway, &token, "mallory"))
            .await
            .unwrap_err();
        assert_eq!(rejected_status(err), StatusCode::FORBIDDEN);
        assert!(broker.get_session(&token).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unreachable_upstream_is_bad_gateway() {
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = closed.local_addr().unwrap();
        drop(closed);

        let h = TestHarness::new();
        let state = test_state(&h, &format!("http://{dead_addr}"));
        let token = state.broker.create_session("pve1", 100, "alice").await.unwrap();
        let gateway = spawn_gateway(state).await;

        let err = tokio_tungstenite::connect_async(client_request(gateway, &token, "alice"))
            .await
            .unwrap_err();
        assert_eq!(rejected_status(err), StatusCode::BAD_GATEWAY);
    }
}
