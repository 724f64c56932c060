// Listener defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3030;

// Route segments
pub const WS_PATH: &str = "ws";
pub const GLOBAL_ROOM_ID: &str = "global";
pub const GLOBAL_ROOM_NAME: &str = "Global Lobby";

// Backpressure and publish policy
pub const DEFAULT_MAILBOX_CAPACITY: usize = 12;
pub const DEFAULT_PUBLISH_BURST: u32 = 8;
pub const DEFAULT_PUBLISH_REFILL_MS: u64 = 100;
pub const DEFAULT_PUBLISH_WAIT_SECS: u64 = 10;
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MAX_BODY_BYTES: u64 = 8192;

// Matchmaking
pub const DEFAULT_MATCH_SETTLE_SECS: u64 = 6;
pub const DEFAULT_SYSTEM_OWNER_ID: &str = "00000000-0000-0000-0000-000000000000";

// WebSocket close codes
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
pub const SLOW_CONSUMER_REASON: &str = "Connection is too slow to keep up with messages";
