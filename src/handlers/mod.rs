//! Request handlers and the route tree

pub mod auth;
pub mod publish;
pub mod rejection;
pub mod websocket;

use std::convert::Infallible;
use std::sync::Arc;
use warp::http::Method;
use warp::{Filter, Reply};

use crate::auth::SharedIdentityProvider;
use crate::config::ServerConfig;
use crate::constants::WS_PATH;
use crate::core::hub::{Hub, SharedHub};
use crate::core::matchmaking::Matchmaker;
use crate::storage::SharedRecordStore;

pub use rejection::handle_rejection;
pub use websocket::handle_ws_client;

/// Everything a request handler can reach
#[derive(Clone)]
pub struct AppState {
    pub hub: SharedHub,
    pub matchmaker: Arc<Matchmaker>,
    pub identity: Option<SharedIdentityProvider>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        store: SharedRecordStore,
        identity: Option<SharedIdentityProvider>,
    ) -> Self {
        let hub = Arc::new(Hub::from_config(&config));
        let matchmaker = Arc::new(Matchmaker::new(hub.clone(), store, &config));
        Self {
            hub,
            matchmaker,
            identity,
            config: Arc::new(config),
        }
    }
}

pub fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Full route tree served by the binary
pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let max_body = state.config.max_body_bytes;

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| "OK");

    let subscribe = warp::path(WS_PATH)
        .and(warp::path("subscribe"))
        .and(warp::path::end())
        .and(warp::ws())
        .and(warp::query::<websocket::RoomQuery>())
        .and(with_state(state.clone()))
        .map(websocket::handle_subscribe);

    let publish = warp::path(WS_PATH)
        .and(warp::path("publish"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::query::<websocket::RoomQuery>())
        .and(warp::body::content_length_limit(max_body))
        .and(auth::with_identity(state.clone()))
        .and(warp::body::bytes())
        .and(with_state(state.clone()))
        .and_then(publish::handle_publish);

    let chat = warp::path(WS_PATH)
        .and(warp::path("chat"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(max_body))
        .and(auth::with_identity(state.clone()))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(publish::handle_chat);

    let queue_join = warp::path(WS_PATH)
        .and(warp::path!("queue" / "join"))
        .and(warp::post())
        .and(warp::body::content_length_limit(max_body))
        .and(auth::with_identity(state.clone()))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(publish::handle_queue_join);

    let lobby_join = warp::path(WS_PATH)
        .and(warp::path!("lobby" / "join"))
        .and(warp::post())
        .and(warp::body::content_length_limit(max_body))
        .and(auth::with_identity(state.clone()))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(publish::handle_lobby_join);

    let lobbies = warp::path(WS_PATH)
        .and(warp::path("lobbies"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state))
        .and_then(publish::handle_lobbies);

    // Browser clients call these cross-origin
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(vec!["content-type", "authorization"]);

    let browser_api = chat.or(queue_join).or(lobby_join).or(lobbies).with(cors);

    health
        .or(subscribe)
        .or(publish)
        .or(browser_api)
        .recover(handle_rejection)
}
