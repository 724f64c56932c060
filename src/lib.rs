//! Showdown Hub - a real-time fan-out hub for lobbies and matchmaking
//!
//! Connections subscribe over WebSocket, are grouped into rooms, and receive every
//! envelope published into their room. Consumers that cannot keep up are evicted
//! instead of slowing down publishers.

pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod storage;

// Re-export main components
pub use config::ServerConfig;
pub use constants::*;
pub use error::{HubError, Result};
