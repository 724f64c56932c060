//! Per-connection session
//!
//! A session drives one accepted WebSocket through
//! `Accepting -> Registered -> Relaying -> Closing -> Closed`.
//! The relay loop races the subscriber's mailbox against the read side closing and
//! against an eviction request raised by a publisher. Whatever ends the loop, teardown
//! deregisters the subscriber and announces the departure before the socket is released.

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream, StreamExt};
use futures_util::SinkExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;
use warp::ws::{Message, WebSocket};

use crate::core::envelope::{ChatMessage, ClientFrame, Envelope, Peer, RoomId, SubscriberId};
use crate::core::hub::SharedHub;
use crate::core::matchmaking::Matchmaker;
use crate::core::subscriber::{CloseRequest, ConnectionCell, OverflowCallback, Subscriber};

type WsSink = SplitSink<WebSocket, Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepting,
    Registered,
    Relaying,
    Closing,
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The read side closed; a normal termination
    PeerClosed,
    /// A publisher found the mailbox full
    Evicted(CloseRequest),
    WriteFailed(String),
    WriteTimeout,
    /// Registration never completed
    Aborted(String),
}

impl SessionOutcome {
    pub fn is_normal(&self) -> bool {
        matches!(self, SessionOutcome::PeerClosed)
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed"),
            Self::Evicted(request) => write!(f, "evicted ({}): {}", request.code, request.reason),
            Self::WriteFailed(msg) => write!(f, "write failed: {}", msg),
            Self::WriteTimeout => write!(f, "write timed out"),
            Self::Aborted(msg) => write!(f, "aborted before relay: {}", msg),
        }
    }
}

pub struct Session {
    hub: SharedHub,
    matchmaker: Arc<Matchmaker>,
    room_id: RoomId,
    write_timeout: Duration,
    state: SessionState,
    id: Option<SubscriberId>,
    /// WELCOME enqueued on the mailbox but not yet written to the socket
    pending_welcome: Option<Bytes>,
}

impl Session {
    pub fn new(
        hub: SharedHub,
        matchmaker: Arc<Matchmaker>,
        room_id: impl Into<RoomId>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            hub,
            matchmaker,
            room_id: room_id.into(),
            write_timeout,
            state: SessionState::Accepting,
            id: None,
            pending_welcome: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        log::debug!(
            "Session {:?}: {:?} -> {:?}",
            self.id,
            self.state,
            next
        );
        self.state = next;
    }

    /// Drive an upgraded socket until it closes
    pub async fn run(mut self, socket: WebSocket) -> SessionOutcome {
        let (mut sink, stream) = socket.split();

        let cell = Arc::new(ConnectionCell::new());
        let evictor = cell.clone();
        let on_overflow: OverflowCallback = Arc::new(move || {
            evictor.close(CloseRequest::slow_consumer());
        });

        let (subscriber, mut mailbox) = match self.hub.registry().allocate(on_overflow) {
            Ok(allocated) => allocated,
            Err(e) => {
                log::error!("Failed to allocate subscriber: {}", e);
                self.transition(SessionState::Closed);
                return SessionOutcome::Aborted(e.to_string());
            }
        };
        let id = subscriber.id();
        self.id = Some(id);
        let guard = TeardownGuard::new(
            self.hub.clone(),
            self.matchmaker.clone(),
            subscriber.clone(),
        );

        let (evict_tx, mut evict_rx) = oneshot::channel();
        if cell.attach(evict_tx).is_err() {
            return self
                .finish(guard, sink, SessionOutcome::Evicted(CloseRequest::slow_consumer()))
                .await;
        }

        let roster = match self.hub.join(&self.room_id, &subscriber) {
            Ok(roster) => roster,
            Err(e) => {
                log::error!("Failed to register subscriber {}: {}", id, e);
                return self
                    .finish(guard, sink, SessionOutcome::Aborted(e.to_string()))
                    .await;
            }
        };
        self.transition(SessionState::Registered);

        if let Err(outcome) = self.send_welcome(&subscriber, roster, &mut sink).await {
            return self.finish(guard, sink, outcome).await;
        }
        if let Err(e) = self.hub.publish(&self.room_id, &Envelope::peer_join(id)).await {
            log::error!("Failed to announce subscriber {}: {}", id, e);
        }

        let (closed_tx, mut read_closed) = oneshot::channel();
        let reader = tokio::spawn(read_frames(
            stream,
            self.hub.clone(),
            self.matchmaker.clone(),
            subscriber.clone(),
            closed_tx,
        ));

        self.transition(SessionState::Relaying);
        let outcome = loop {
            tokio::select! {
                _ = &mut read_closed => break SessionOutcome::PeerClosed,
                request = &mut evict_rx => {
                    break SessionOutcome::Evicted(
                        request.unwrap_or_else(|_| CloseRequest::slow_consumer()),
                    );
                }
                next = mailbox.recv() => {
                    let Some(payload) = next else {
                        break SessionOutcome::PeerClosed;
                    };
                    let is_welcome = self.pending_welcome.as_ref() == Some(&payload);
                    // closing the read side abandons an in-flight write
                    tokio::select! {
                        _ = &mut read_closed => break SessionOutcome::PeerClosed,
                        written = write_frame(&mut sink, payload, self.write_timeout) => {
                            if let Err(outcome) = written {
                                break outcome;
                            }
                            if is_welcome {
                                self.pending_welcome = None;
                            }
                        }
                    }
                }
            }
        };

        reader.abort();
        self.finish(guard, sink, outcome).await
    }

    /// WELCOME goes through the mailbox when it fits, otherwise straight to the socket
    async fn send_welcome(
        &mut self,
        subscriber: &Subscriber,
        roster: Vec<Peer>,
        sink: &mut WsSink,
    ) -> Result<(), SessionOutcome> {
        let welcome = Envelope::Welcome {
            id: subscriber.id(),
            peers: roster,
        };
        let payload = welcome
            .to_bytes()
            .map_err(|e| SessionOutcome::Aborted(e.to_string()))?;

        match subscriber.offer(payload.clone()) {
            Ok(()) => {
                self.pending_welcome = Some(payload);
                Ok(())
            }
            Err(payload) => {
                log::debug!(
                    "Mailbox full for subscriber {}, writing WELCOME directly",
                    subscriber.id()
                );
                write_frame(sink, payload, self.write_timeout).await
            }
        }
    }

    async fn finish(
        &mut self,
        guard: TeardownGuard,
        mut sink: WsSink,
        outcome: SessionOutcome,
    ) -> SessionOutcome {
        self.transition(SessionState::Closing);
        guard.run().await;

        // an eviction can win the race against the queued WELCOME
        if let (SessionOutcome::Evicted(_), Some(welcome)) =
            (&outcome, self.pending_welcome.take())
        {
            if let Err(e) = write_frame(&mut sink, welcome, self.write_timeout).await {
                log::debug!("Failed to write WELCOME before eviction: {}", e);
            }
        }

        let close = match &outcome {
            SessionOutcome::Evicted(request) => {
                Some(Message::close_with(request.code, request.reason.clone()))
            }
            SessionOutcome::Aborted(_) => Some(Message::close()),
            _ => None,
        };
        if let Some(frame) = close {
            if let Ok(Err(e)) = timeout(self.write_timeout, sink.send(frame)).await {
                log::debug!("Failed to send close frame: {}", e);
            }
        }
        let _ = timeout(self.write_timeout, sink.close()).await;

        self.transition(SessionState::Closed);
        let id = self.id.map_or_else(|| "-".to_string(), |id| id.to_string());
        match &outcome {
            SessionOutcome::PeerClosed => log::info!("Subscriber {} disconnected", id),
            other => log::warn!("Subscriber {} session ended: {}", id, other),
        }
        outcome
    }
}

fn frame_for(payload: Bytes) -> Message {
    match std::str::from_utf8(&payload) {
        Ok(text) => Message::text(text),
        Err(_) => Message::binary(payload.to_vec()),
    }
}

async fn write_frame(
    sink: &mut WsSink,
    payload: Bytes,
    limit: Duration,
) -> Result<(), SessionOutcome> {
    match timeout(limit, sink.send(frame_for(payload))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SessionOutcome::WriteFailed(e.to_string())),
        Err(_) => Err(SessionOutcome::WriteTimeout),
    }
}

/// Read side of a session. Completing `closed` is the relay loop's cancellation signal.
async fn read_frames(
    mut stream: SplitStream<WebSocket>,
    hub: SharedHub,
    matchmaker: Arc<Matchmaker>,
    subscriber: Arc<Subscriber>,
    closed: oneshot::Sender<()>,
) {
    while let Some(result) = stream.next().await {
        match result {
            Ok(msg) if msg.is_close() => break,
            Ok(msg) => {
                if let Ok(text) = msg.to_str() {
                    handle_frame(text, &hub, &matchmaker, &subscriber).await;
                }
            }
            Err(e) => {
                log::warn!("WebSocket read error for subscriber {}: {}", subscriber.id(), e);
                break;
            }
        }
    }
    let _ = closed.send(());
}

async fn handle_frame(text: &str, hub: &SharedHub, matchmaker: &Arc<Matchmaker>, subscriber: &Subscriber) {
    let id = subscriber.id();
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("Ignoring malformed frame from subscriber {}: {}", id, e);
            return;
        }
    };

    match frame {
        ClientFrame::ChatMessage { message } => {
            let room = match subscriber.current_room() {
                Ok(Some(room)) => room,
                Ok(None) => return,
                Err(e) => {
                    log::error!("Failed to read membership of {}: {}", id, e);
                    return;
                }
            };
            let chat = ChatMessage {
                sender_id: id,
                message,
                lobby_id: room.clone(),
                timestamp: None,
            }
            .stamped();
            if let Err(e) = hub.publish(&room, &Envelope::ChatMessage(chat)).await {
                log::error!("Failed to relay chat from {}: {}", id, e);
            }
        }
        ClientFrame::QueueJoin => {
            if let Err(e) = matchmaker.join_queue(id) {
                log::warn!("Queue join from {} rejected: {}", id, e);
            }
        }
        ClientFrame::LobbyJoin { lobby_id } => {
            if let Err(e) = hub.switch_room(id, &lobby_id).await {
                log::warn!("Lobby switch for {} failed: {}", id, e);
            }
        }
    }
}

/// Runs teardown once. If the session future is dropped before `run` is reached,
/// teardown is spawned from `Drop` instead.
struct TeardownGuard {
    hub: SharedHub,
    matchmaker: Arc<Matchmaker>,
    subscriber: Option<Arc<Subscriber>>,
}

impl TeardownGuard {
    fn new(hub: SharedHub, matchmaker: Arc<Matchmaker>, subscriber: Arc<Subscriber>) -> Self {
        Self {
            hub,
            matchmaker,
            subscriber: Some(subscriber),
        }
    }

    async fn run(mut self) {
        if let Some(subscriber) = self.subscriber.take() {
            teardown(&self.hub, &self.matchmaker, &subscriber).await;
        }
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        let Some(subscriber) = self.subscriber.take() else {
            return;
        };
        let hub = self.hub.clone();
        let matchmaker = self.matchmaker.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    teardown(&hub, &matchmaker, &subscriber).await;
                });
            }
            Err(_) => log::error!(
                "No runtime available to tear down subscriber {}",
                subscriber.id()
            ),
        }
    }
}

async fn teardown(hub: &SharedHub, matchmaker: &Matchmaker, subscriber: &Subscriber) {
    matchmaker.withdraw(subscriber.id());
    if let Err(e) = hub.leave(subscriber).await {
        log::error!("Failed to tear down subscriber {}: {}", subscriber.id(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_payload_becomes_text_frame() {
        let frame = frame_for(Bytes::from_static(br#"{"type":"PEER_JOIN"}"#));
        assert!(frame.is_text());
        assert_eq!(frame.to_str().unwrap(), r#"{"type":"PEER_JOIN"}"#);
    }

    #[test]
    fn test_non_utf8_payload_becomes_binary_frame() {
        let frame = frame_for(Bytes::from_static(&[0xff, 0xfe, 0x00]));
        assert!(frame.is_binary());
        assert_eq!(frame.as_bytes(), &[0xffu8, 0xfe, 0x00][..]);
    }

    #[test]
    fn test_only_peer_close_is_normal() {
        assert!(SessionOutcome::PeerClosed.is_normal());
        assert!(!SessionOutcome::WriteTimeout.is_normal());
        assert!(!SessionOutcome::Evicted(CloseRequest::slow_consumer()).is_normal());
    }
}
