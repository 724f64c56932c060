//! Envelope types exchanged over the hub

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::constants::GLOBAL_ROOM_ID;
use crate::error::Result;

/// Subscriber identity, allocated monotonically from 0
pub type SubscriberId = u64;

/// Room identifier
pub type RoomId = String;

/// Presence state carried in roster entries and peer events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerState {
    Joined,
    Left,
}

/// Roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: SubscriberId,
    pub state: PeerState,
}

/// Chat message published into a lobby
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender_id: SubscriberId,
    pub message: String,
    #[serde(default = "default_lobby")]
    pub lobby_id: RoomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

fn default_lobby() -> RoomId {
    GLOBAL_ROOM_ID.to_string()
}

impl ChatMessage {
    /// Fill in a server-side timestamp when the sender left it out
    pub fn stamped(mut self) -> Self {
        if self.timestamp.map_or(true, |ts| ts == 0) {
            self.timestamp = Some(chrono::Utc::now().timestamp());
        }
        if self.lobby_id.is_empty() {
            self.lobby_id = default_lobby();
        }
        self
    }
}

/// Server-to-client envelopes. Serialized once, then shared by every recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Envelope {
    /// Sent to a subscriber right after registration
    Welcome { id: SubscriberId, peers: Vec<Peer> },

    PeerJoin { id: SubscriberId, state: PeerState },

    PeerLeave { id: SubscriberId, state: PeerState },

    ChatMessage(ChatMessage),

    LobbyJoin {
        user_id: SubscriberId,
        lobby_id: RoomId,
    },

    LobbyLeave {
        user_id: SubscriberId,
        lobby_id: RoomId,
    },

    LobbyInfo {
        id: RoomId,
        name: String,
        num_users: usize,
    },

    MatchResult {
        winner_id: SubscriberId,
        loser_id: SubscriberId,
    },
}

impl Envelope {
    pub fn peer_join(id: SubscriberId) -> Self {
        Envelope::PeerJoin {
            id,
            state: PeerState::Joined,
        }
    }

    pub fn peer_leave(id: SubscriberId) -> Self {
        Envelope::PeerLeave {
            id,
            state: PeerState::Left,
        }
    }

    /// Wire name of the envelope type
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Welcome { .. } => "WELCOME",
            Envelope::PeerJoin { .. } => "PEER_JOIN",
            Envelope::PeerLeave { .. } => "PEER_LEAVE",
            Envelope::ChatMessage(_) => "CHAT_MESSAGE",
            Envelope::LobbyJoin { .. } => "LOBBY_JOIN",
            Envelope::LobbyLeave { .. } => "LOBBY_LEAVE",
            Envelope::LobbyInfo { .. } => "LOBBY_INFO",
            Envelope::MatchResult { .. } => "MATCH_RESULT",
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Frames a connected client may send in-band
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientFrame {
    ChatMessage { message: String },
    QueueJoin,
    LobbyJoin { lobby_id: RoomId },
}

/// Body of the queue-join endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJoinRequest {
    pub user_id: SubscriberId,
}

/// Body of the lobby-join endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyJoinRequest {
    pub user_id: SubscriberId,
    pub lobby_id: RoomId,
}
