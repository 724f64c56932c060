//! HTTP side channel into the hub
//!
//! Mutating endpoints answer `202 Accepted` as soon as the request is validated; rate
//! limiting and fan-out run on a spawned task bounded by the publish wait timeout.

use bytes::Bytes;
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use crate::auth::Identity;
use crate::core::envelope::{ChatMessage, Envelope, LobbyJoinRequest, QueueJoinRequest};
use crate::error::HubError;
use crate::handlers::rejection::ApiError;
use crate::handlers::websocket::RoomQuery;
use crate::handlers::AppState;

fn accepted() -> impl Reply {
    warp::reply::with_status(warp::reply(), StatusCode::ACCEPTED)
}

fn spawn_publish(state: &AppState, room: String, payload: Bytes) {
    let hub = state.hub.clone();
    let wait = state.config.publish_wait_timeout;
    tokio::spawn(async move {
        match tokio::time::timeout(wait, hub.publish_bytes(&room, payload)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => log::error!("Publish to room '{}' failed: {}", room, e),
            Err(_) => log::warn!(
                "Publish to room '{}' abandoned: {}",
                room,
                HubError::RateLimited
            ),
        }
    });
}

/// Raw body published verbatim into `?room=` (global by default)
pub async fn handle_publish(
    query: RoomQuery,
    identity: Option<Identity>,
    body: Bytes,
    state: AppState,
) -> std::result::Result<impl Reply, Rejection> {
    let room = query.room_or_global();
    log::debug!(
        "Publish of {} bytes to room '{}' from {}",
        body.len(),
        room,
        identity.as_ref().map_or("anonymous", |id| id.user_id.as_str())
    );
    spawn_publish(&state, room, body);
    Ok(accepted())
}

pub async fn handle_chat(
    identity: Option<Identity>,
    chat: ChatMessage,
    state: AppState,
) -> std::result::Result<impl Reply, Rejection> {
    let chat = chat.stamped();
    log::info!(
        "Chat from {} to lobby '{}'{}",
        chat.sender_id,
        chat.lobby_id,
        identity.map_or(String::new(), |id| format!(" (user {})", id.user_id))
    );

    let room = chat.lobby_id.clone();
    let payload = Envelope::ChatMessage(chat)
        .to_bytes()
        .map_err(ApiError::reject)?;
    spawn_publish(&state, room, payload);
    Ok(accepted())
}

pub async fn handle_queue_join(
    _identity: Option<Identity>,
    request: QueueJoinRequest,
    state: AppState,
) -> std::result::Result<impl Reply, Rejection> {
    state
        .matchmaker
        .join_queue(request.user_id)
        .map_err(ApiError::reject)?;
    Ok(accepted())
}

pub async fn handle_lobby_join(
    _identity: Option<Identity>,
    request: LobbyJoinRequest,
    state: AppState,
) -> std::result::Result<impl Reply, Rejection> {
    let LobbyJoinRequest { user_id, lobby_id } = request;
    if lobby_id.is_empty() {
        return Err(ApiError::reject(HubError::RoomNotFound(lobby_id)));
    }
    if state
        .hub
        .registry()
        .get(user_id)
        .map_err(ApiError::reject)?
        .is_none()
    {
        return Err(ApiError::reject(HubError::SubscriberNotFound(user_id)));
    }

    let hub = state.hub.clone();
    let wait = state.config.publish_wait_timeout;
    tokio::spawn(async move {
        match tokio::time::timeout(wait, hub.switch_room(user_id, &lobby_id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Lobby switch for {} failed: {}", user_id, e),
            Err(_) => log::warn!("Lobby switch announcements for {} timed out", user_id),
        }
    });
    Ok(accepted())
}

pub async fn handle_lobbies(state: AppState) -> std::result::Result<impl Reply, Rejection> {
    let lobbies = state.hub.list_rooms().map_err(ApiError::reject)?;
    Ok(warp::reply::json(&lobbies))
}
