// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bidirectional WebSocket relay pump.
//!
//! Forwards frames between two message-oriented duplex transports, keeping
//! message type and boundaries intact. The relay ends as soon as either
//! direction stops: the other direction is cancelled and awaited, then both
//! sides are closed best-effort.
//!
//! The pump is transport agnostic. Callers adapt their sockets into
//! `Stream<Item = Result<Frame, _>> + Sink<Frame>`.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vmportal_core::PortalError;

/// Upper bound on the closing handshake of each side once the relay ends.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Close code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

/// One WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseReason>),
}

impl Frame {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) | Self::Ping(data) | Self::Pong(data) => data.len(),
            Self::Close(reason) => reason.as_ref().map_or(0, |r| r.reason.len() + 2),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which transport a direction reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl Side {
    fn direction(self) -> &'static str {
        match self {
            Self::A => "a_to_b",
            Self::B => "b_to_a",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("a"),
            Self::B => f.write_str("b"),
        }
    }
}

/// How the relay came to an end.
#[derive(Debug)]
pub enum EndReason {
    /// A close frame was read and forwarded.
    Closed(Option<CloseReason>),
    /// The source stream ended without a close frame.
    EndOfStream,
    /// Reading from the source or writing to the destination failed.
    Transport(PortalError),
    /// The caller's cancellation token fired.
    Cancelled,
}

/// Frames and payload bytes forwarded in one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Traffic {
    pub frames: u64,
    pub bytes: u64,
}

/// Result of a finished relay.
#[derive(Debug)]
pub struct RelayOutcome {
    /// The side whose direction finished first; `None` on external cancellation.
    pub ended_by: Option<Side>,
    pub reason: EndReason,
    pub a_to_b: Traffic,
    pub b_to_a: Traffic,
}

struct PumpReport {
    reason: EndReason,
    traffic: Traffic,
}

/// Relay frames between `a` and `b` until one direction ends or `cancel` fires.
///
/// Never returns before both directions have stopped and both sides have been
/// asked to close.
pub async fn relay<A, B, RA, WA, RB, WB>(a: A, b: B, cancel: CancellationToken) -> RelayOutcome
where
    A: Stream<Item = Result<Frame, RA>> + Sink<Frame, Error = WA>,
    B: Stream<Item = Result<Frame, RB>> + Sink<Frame, Error = WB>,
    RA: fmt::Display,
    WA: fmt::Display,
    RB: fmt::Display,
    WB: fmt::Display,
{
    let (mut a_sink, mut a_stream) = a.split();
    let (mut b_sink, mut b_stream) = b.split();

    vmportal_prometheus::adjust_active_relays(1.0);
    let pumps = cancel.child_token();

    let (ended_by, first, second) = {
        let a_to_b = pump(Side::A, &mut a_stream, &mut b_sink, pumps.clone());
        let b_to_a = pump(Side::B, &mut b_stream, &mut a_sink, pumps.clone());
        tokio::pin!(a_to_b, b_to_a);

        tokio::select! {
            report = &mut a_to_b => {
                pumps.cancel();
                (Side::A, report, b_to_a.await)
            }
            report = &mut b_to_a => {
                pumps.cancel();
                (Side::B, report, a_to_b.await)
            }
        }
    };

    let _ = futures::future::join(
        tokio::time::timeout(CLOSE_TIMEOUT, a_sink.close()),
        tokio::time::timeout(CLOSE_TIMEOUT, b_sink.close()),
    )
    .await;
    vmportal_prometheus::adjust_active_relays(-1.0);

    let (a_report, b_report) = match ended_by {
        Side::A => (first, second),
        Side::B => (second, first),
    };
    vmportal_prometheus::record_relay_traffic(
        Side::A.direction(),
        a_report.traffic.frames,
        a_report.traffic.bytes,
    );
    vmportal_prometheus::record_relay_traffic(
        Side::B.direction(),
        b_report.traffic.frames,
        b_report.traffic.bytes,
    );

    let winner = match ended_by {
        Side::A => a_report.reason,
        Side::B => b_report.reason,
    };
    // Only the external token can stop the first pump; `pumps` is cancelled
    // after a winner exists.
    let (ended_by, reason) = match winner {
        EndReason::Cancelled => (None, EndReason::Cancelled),
        other => (Some(ended_by), other),
    };

    info!(
        ended_by = ?ended_by,
        reason = ?reason,
        a_to_b_frames = a_report.traffic.frames,
        b_to_a_frames = b_report.traffic.frames,
        "console relay finished"
    );

    RelayOutcome {
        ended_by,
        reason,
        a_to_b: a_report.traffic,
        b_to_a: b_report.traffic,
    }
}

/// Copy frames from `source` to `sink` until the source ends, a close frame
/// passes through, an I/O error occurs, or `cancel` fires.
async fn pump<S, D, R, W>(
    from: Side,
    source: &mut S,
    sink: &mut D,
    cancel: CancellationToken,
) -> PumpReport
where
    S: Stream<Item = Result<Frame, R>> + Unpin,
    D: Sink<Frame, Error = W> + Unpin,
    R: fmt::Display,
    W: fmt::Display,
{
    let mut traffic = Traffic::default();
    let finish = |reason: EndReason, traffic: Traffic| PumpReport { reason, traffic };

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return finish(EndReason::Cancelled, traffic),
            next = source.next() => next,
        };

        let frame = match next {
            None => {
                debug!(side = %from, "relay source ended");
                return finish(EndReason::EndOfStream, traffic);
            }
            Some(Err(e)) => {
                debug!(side = %from, error = %e, "relay read failed");
                return finish(transport_error("read", from, e), traffic);
            }
            Some(Ok(frame)) => frame,
        };

        let close = match &frame {
            Frame::Close(reason) => Some(reason.clone()),
            _ => None,
        };
        let size = frame.len() as u64;

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return finish(EndReason::Cancelled, traffic),
            sent = sink.send(frame) => sent,
        };
        if let Err(e) = sent {
            debug!(side = %from, error = %e, "relay write failed");
            return finish(transport_error("write", from, e), traffic);
        }
        traffic.frames += 1;
        traffic.bytes += size;

        if let Some(reason) = close {
            return finish(EndReason::Closed(reason), traffic);
        }
    }
}

fn transport_error(op: &str, from: Side, err: impl fmt::Display) -> EndReason {
    EndReason::Transport(PortalError::RelayTransport {
        message: format!("{op} failed on {} direction: {err}", from.direction()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use futures::channel::mpsc;

    /// One end of an in-memory duplex: frames written to it appear on the
    /// peer's stream.
    struct Duplex {
        incoming: mpsc::UnboundedReceiver<Result<Frame, String>>,
        outgoing: mpsc::UnboundedSender<Frame>,
    }

    impl Stream for Duplex {
        type Item = Result<Frame, String>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Pin::new(&mut self.incoming).poll_next(cx)
        }
    }

    impl Sink<Frame> for Duplex {
        type Error = String;

        fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            Pin::new(&mut self.outgoing)
                .poll_ready(cx)
                .map_err(|e| e.to_string())
        }

        fn start_send(mut self: Pin<&mut Self>, item: Frame) -> Result<(), String> {
            Pin::new(&mut self.outgoing)
                .start_send(item)
                .map_err(|e| e.to_string())
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            Pin::new(&mut self.outgoing)
                .poll_flush(cx)
                .map_err(|e| e.to_string())
        }

        fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            Pin::new(&mut self.outgoing)
                .poll_close(cx)
                .map_err(|e| e.to_string())
        }
    }

    /// The test's view of one side: inject frames the relay will read, and
    /// observe frames the relay wrote.
    struct Peer {
        inject: mpsc::UnboundedSender<Result<Frame, String>>,
        observe: mpsc::UnboundedReceiver<Frame>,
    }

    fn endpoint() -> (Duplex, Peer) {
        let (inject, incoming) = mpsc::unbounded();
        let (outgoing, observe) = mpsc::unbounded();
        (Duplex { incoming, outgoing }, Peer { inject, observe })
    }

    fn spawn_relay(
        cancel: CancellationToken,
    ) -> (tokio::task::JoinHandle<RelayOutcome>, Peer, Peer) {
        let (a, peer_a) = endpoint();
        let (b, peer_b) = endpoint();
        let handle = tokio::spawn(relay(a, b, cancel));
        (handle, peer_a, peer_b)
    }

    #[tokio::test]
    async fn forwards_both_directions_preserving_type_and_boundaries() {
        let (handle, mut peer_a, mut peer_b) = spawn_relay(CancellationToken::new());

        peer_a.inject.unbounded_send(Ok(Frame::Binary(Bytes::from_static(b"RFB 003.008\n")))).unwrap();
        peer_a.inject.unbounded_send(Ok(Frame::Text("hello".into()))).unwrap();
        peer_b.inject.unbounded_send(Ok(Frame::Binary(Bytes::from_static(&[1, 2, 3])))).unwrap();

        assert_eq!(
            peer_b.observe.next().await,
            Some(Frame::Binary(Bytes::from_static(b"RFB 003.008\n")))
        );
        assert_eq!(peer_b.observe.next().await, Some(Frame::Text("hello".into())));
        assert_eq!(
            peer_a.observe.next().await,
            Some(Frame::Binary(Bytes::from_static(&[1, 2, 3])))
        );

        let close = CloseReason {
            code: 1000,
            reason: "bye".into(),
        };
        peer_a.inject.unbounded_send(Ok(Frame::Close(Some(close.clone())))).unwrap();
        assert_eq!(peer_b.observe.next().await, Some(Frame::Close(Some(close.clone()))));

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.ended_by, Some(Side::A));
        assert!(matches!(outcome.reason, EndReason::Closed(Some(ref r)) if *r == close));
        assert_eq!(outcome.a_to_b.frames, 3);
        assert_eq!(outcome.b_to_a.frames, 1);
        assert_eq!(outcome.b_to_a.bytes, 3);
    }

    #[tokio::test]
    async fn end_of_stream_on_b_ends_relay_and_closes_a() {
        let (handle, mut peer_a, peer_b) = spawn_relay(CancellationToken::new());
        drop(peer_b.inject);

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.ended_by, Some(Side::B));
        assert!(matches!(outcome.reason, EndReason::EndOfStream));
        // A's sink was closed, so its observer sees the end of the channel.
        assert_eq!(peer_a.observe.next().await, None);
    }

    #[tokio::test]
    async fn read_error_ends_relay_with_transport_error() {
        let (handle, _peer_a, peer_b) = spawn_relay(CancellationToken::new());
        peer_b.inject.unbounded_send(Err("connection reset".to_string())).unwrap();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.ended_by, Some(Side::B));
        match outcome.reason {
            EndReason::Transport(PortalError::RelayTransport { message }) => {
                assert!(message.contains("connection reset"));
            }
            other => panic!("unexpected reason: {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_error_ends_relay() {
        let (handle, peer_a, peer_b) = spawn_relay(CancellationToken::new());
        // B's observer is gone, so writing to B fails.
        drop(peer_b.observe);
        peer_a.inject.unbounded_send(Ok(Frame::Text("lost".into()))).unwrap();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.ended_by, Some(Side::A));
        assert!(matches!(outcome.reason, EndReason::Transport(_)));
        assert_eq!(outcome.a_to_b.frames, 0);
        drop(peer_b.inject);
    }

    #[tokio::test]
    async fn external_cancellation_tears_down_both_directions() {
        let cancel = CancellationToken::new();
        let (handle, mut peer_a, mut peer_b) = spawn_relay(cancel.clone());

        peer_a.inject.unbounded_send(Ok(Frame::Ping(Bytes::from_static(b"p")))).unwrap();
        assert_eq!(peer_b.observe.next().await, Some(Frame::Ping(Bytes::from_static(b"p"))));

        cancel.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("relay should stop promptly")
            .unwrap();
        assert_eq!(outcome.ended_by, None);
        assert!(matches!(outcome.reason, EndReason::Cancelled));
        assert_eq!(peer_a.observe.next().await, None);
        assert_eq!(peer_b.observe.next().await, None);
    }

    /// Sink wrapper that fires the external token while the relay closes it.
    struct CancelOnClose {
        inner: Duplex,
        cancel: CancellationToken,
    }

    impl Stream for CancelOnClose {
        type Item = Result<Frame, String>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Pin::new(&mut self.inner).poll_next(cx)
        }
    }

    impl Sink<Frame> for CancelOnClose {
        type Error = String;

        fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            Pin::new(&mut self.inner).poll_ready(cx)
        }

        fn start_send(mut self: Pin<&mut Self>, item: Frame) -> Result<(), String> {
            Pin::new(&mut self.inner).start_send(item)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            self.cancel.cancel();
            Pin::new(&mut self.inner).poll_close(cx)
        }
    }

    #[tokio::test]
    async fn cancel_after_a_genuine_close_keeps_the_close_reason() {
        let cancel = CancellationToken::new();
        let (a, peer_a) = endpoint();
        let (b, peer_b) = endpoint();
        let a = CancelOnClose {
            inner: a,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(relay(a, b, cancel.clone()));

        peer_b.inject.unbounded_send(Ok(Frame::Close(None))).unwrap();

        let outcome = handle.await.unwrap();
        assert!(cancel.is_cancelled());
        assert_eq!(outcome.ended_by, Some(Side::B));
        assert!(matches!(outcome.reason, EndReason::Closed(None)));
        drop(peer_a);
    }

    #[tokio::test]
    async fn end_of_stream_then_shutdown_is_not_reported_as_cancelled() {
        let cancel = CancellationToken::new();
        let (a, peer_a) = endpoint();
        let (b, peer_b) = endpoint();
        let a = CancelOnClose {
            inner: a,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(relay(a, b, cancel.clone()));
        drop(peer_b.inject);

        let outcome = handle.await.unwrap();
        assert!(cancel.is_cancelled());
        assert_eq!(outcome.ended_by, Some(Side::B));
        assert!(matches!(outcome.reason, EndReason::EndOfStream));
        drop(peer_a);
    }

    #[test]
    fn frame_len_counts_payload() {
        assert_eq!(Frame::Text("abc".into()).len(), 3);
        assert_eq!(Frame::Close(None).len(), 0);
        assert!(Frame::Pong(Bytes::new()).is_empty());
        assert_eq!(
            Frame::Close(Some(CloseReason {
                code: 1001,
                reason: "gone".into()
            }))
            .len(),
            6
        );
    }
}
