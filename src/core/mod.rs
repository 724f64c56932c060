//! Hub machinery: subscribers, rooms, publishing, sessions and matchmaking

pub mod envelope;
pub mod hub;
pub mod matchmaking;
pub mod rate_limiter;
pub mod registry;
pub mod room;
pub mod session;
pub mod subscriber;

// Re-export main components for convenience
pub use envelope::{ChatMessage, ClientFrame, Envelope, Peer, PeerState, RoomId, SubscriberId};
pub use hub::{Hub, SharedHub};
pub use matchmaking::{MatchOutcome, Matchmaker, MatchmakingQueue, RandomWinner, WinnerPolicy};
pub use rate_limiter::RateLimiter;
pub use registry::Registry;
pub use room::{PublishReport, Room};
pub use session::{Session, SessionOutcome, SessionState};
pub use subscriber::{CloseRequest, ConnectionCell, Delivery, Subscriber};
