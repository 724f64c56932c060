#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use warp::test::WsClient;

use showdown_hub::auth::SharedIdentityProvider;
use showdown_hub::config::ServerConfig;
use showdown_hub::core::Envelope;
use showdown_hub::handlers::{routes, AppState};
use showdown_hub::storage::MemoryRecordStore;

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

// Generous publish budget so tests never wait on the limiter
pub fn test_config() -> ServerConfig {
    ServerConfig {
        publish_burst: 1000,
        publish_refill_interval: Duration::from_millis(1),
        match_settle_delay: Duration::from_millis(10),
        ..ServerConfig::default()
    }
}

pub fn test_state() -> (AppState, MemoryRecordStore) {
    test_state_with(test_config(), None)
}

pub fn test_state_with(
    config: ServerConfig,
    identity: Option<SharedIdentityProvider>,
) -> (AppState, MemoryRecordStore) {
    let store = MemoryRecordStore::new();
    let state = AppState::new(config, Arc::new(store.clone()), identity);
    (state, store)
}

pub async fn connect(state: &AppState, path: &str) -> WsClient {
    warp::test::ws()
        .path(path)
        .handshake(routes(state.clone()))
        .await
        .expect("websocket handshake")
}

pub async fn next_envelope(client: &mut WsClient) -> Envelope {
    let msg = tokio::time::timeout(RECV_TIMEOUT, client.recv())
        .await
        .expect("timed out waiting for an envelope")
        .expect("websocket error");
    Envelope::from_slice(msg.as_bytes()).expect("valid envelope")
}

pub async fn expect_silence(client: &mut WsClient, wait: Duration) {
    let result = tokio::time::timeout(wait, client.recv()).await;
    assert!(result.is_err(), "unexpected frame: {:?}", result);
}

/// Poll a condition until it holds or the receive timeout elapses
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Collect envelopes until the server closes the connection
pub async fn read_until_closed(client: &mut WsClient) -> Vec<Envelope> {
    let mut seen = Vec::new();
    loop {
        let msg = match tokio::time::timeout(RECV_TIMEOUT, client.recv())
            .await
            .expect("timed out waiting for the server to close")
        {
            Ok(msg) => msg,
            Err(_) => return seen,
        };
        if msg.is_close() {
            return seen;
        }
        if msg.is_text() || msg.is_binary() {
            seen.push(Envelope::from_slice(msg.as_bytes()).expect("valid envelope"));
        }
    }
}
