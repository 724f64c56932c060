use std::error::Error;
use std::fmt;
use std::sync::PoisonError;

#[derive(Debug)]
pub enum HubError {
    // Lock errors
    LockPoisoned(String),

    // Connection errors
    ConnectionError(String),
    ConnectionClosed,

    // Message errors
    MessageParseError(String),
    RateLimited,

    // Room and subscriber errors
    RoomNotFound(String),
    SubscriberNotFound(u64),

    // Matchmaking errors
    AlreadyQueued(u64),

    // Auth errors
    AuthError(String),
    Unauthorized,

    // Storage errors
    StorageError(String),

    // Configuration errors
    ConfigError(String),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LockPoisoned(msg) => write!(f, "Lock error: {}", msg),
            Self::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::MessageParseError(msg) => write!(f, "Message parse error: {}", msg),
            Self::RateLimited => write!(f, "Timed out waiting for a publish token"),
            Self::RoomNotFound(id) => write!(f, "Room not found: {}", id),
            Self::SubscriberNotFound(id) => write!(f, "Subscriber not found: {}", id),
            Self::AlreadyQueued(id) => write!(f, "Subscriber {} is already queued", id),
            Self::AuthError(msg) => write!(f, "Authentication error: {}", msg),
            Self::Unauthorized => write!(f, "Unauthorized access"),
            Self::StorageError(msg) => write!(f, "Storage error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for HubError {}

// Poisoned std mutexes surface as a regular error instead of a panic
impl<T> From<PoisonError<T>> for HubError {
    fn from(err: PoisonError<T>) -> Self {
        HubError::LockPoisoned(format!("Mutex poisoned: {}", err))
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::MessageParseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_poisoned_mutex_converts() {
        let lock = Arc::new(Mutex::new(0u32));
        let poisoner = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        let err: HubError = lock.lock().unwrap_err().into();
        assert!(matches!(err, HubError::LockPoisoned(_)));
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            HubError::RoomNotFound("arena".to_string()).to_string(),
            "Room not found: arena"
        );
        assert_eq!(
            HubError::AlreadyQueued(4).to_string(),
            "Subscriber 4 is already queued"
        );
    }
}
