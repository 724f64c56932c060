use serde::Deserialize;
use warp::ws::{WebSocket, Ws};
use warp::Reply;

use crate::constants::GLOBAL_ROOM_ID;
use crate::core::session::Session;
use crate::handlers::AppState;

/// Optional `?room=` selector shared by the subscribe and publish routes
#[derive(Debug, Default, Deserialize)]
pub struct RoomQuery {
    pub room: Option<String>,
}

impl RoomQuery {
    pub fn room_or_global(self) -> String {
        self.room
            .filter(|room| !room.is_empty())
            .unwrap_or_else(|| GLOBAL_ROOM_ID.to_string())
    }
}

// Upgrade the request and hand the socket to a session
pub fn handle_subscribe(ws: Ws, query: RoomQuery, state: AppState) -> impl Reply {
    let room = query.room_or_global();
    log::info!("New websocket connection for room '{}'", room);
    ws.on_upgrade(move |socket| handle_ws_client(socket, room, state))
}

pub async fn handle_ws_client(socket: WebSocket, room: String, state: AppState) {
    let session = Session::new(
        state.hub.clone(),
        state.matchmaker.clone(),
        room,
        state.config.write_timeout,
    );
    let outcome = session.run(socket).await;
    log::debug!(
        "Session closed ({}); {} subscribers remain",
        outcome,
        state.hub.subscriber_count().unwrap_or_default()
    );
}
