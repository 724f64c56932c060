//! Broadcast hub that ties the registry, rooms and the publish limiter together

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::config::ServerConfig;
use crate::constants::{GLOBAL_ROOM_ID, GLOBAL_ROOM_NAME};
use crate::core::envelope::{Envelope, Peer, RoomId, SubscriberId};
use crate::core::rate_limiter::RateLimiter;
use crate::core::registry::Registry;
use crate::core::room::{PublishReport, Room};
use crate::core::subscriber::{Membership, Subscriber};
use crate::error::{HubError, Result};

pub struct Hub {
    registry: Registry,
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
    global: Arc<Room>,
    limiter: RateLimiter,
}

impl Hub {
    /// Create a hub with only the global room
    pub fn new(mailbox_capacity: usize, publish_burst: u32, refill_interval: Duration) -> Self {
        let global = Arc::new(Room::new(GLOBAL_ROOM_ID, GLOBAL_ROOM_NAME));
        let mut rooms = HashMap::new();
        rooms.insert(GLOBAL_ROOM_ID.to_string(), global.clone());

        Self {
            registry: Registry::new(mailbox_capacity),
            rooms: RwLock::new(rooms),
            global,
            limiter: RateLimiter::new(publish_burst, refill_interval),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.mailbox_capacity,
            config.publish_burst,
            config.publish_refill_interval,
        )
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn global_room(&self) -> &Arc<Room> {
        &self.global
    }

    pub fn room(&self, room_id: &str) -> Result<Option<Arc<Room>>> {
        Ok(self.rooms.read()?.get(room_id).cloned())
    }

    /// Look up a room, creating it on first reference
    pub fn room_or_create(&self, room_id: &str) -> Result<Arc<Room>> {
        if let Some(room) = self.room(room_id)? {
            return Ok(room);
        }
        let mut rooms = self.rooms.write()?;
        let room = rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                log::info!("Created room '{}'", room_id);
                Arc::new(Room::new(room_id, room_id))
            })
            .clone();
        Ok(room)
    }

    /// LOBBY_INFO for every room, ordered by id
    pub fn list_rooms(&self) -> Result<Vec<Envelope>> {
        let rooms: Vec<Arc<Room>> = self.rooms.read()?.values().cloned().collect();
        let mut infos = Vec::with_capacity(rooms.len());
        for room in rooms {
            infos.push(Envelope::LobbyInfo {
                id: room.id().to_string(),
                name: room.name().to_string(),
                num_users: room.member_count()?,
            });
        }
        infos.sort_by(|a, b| match (a, b) {
            (Envelope::LobbyInfo { id: a, .. }, Envelope::LobbyInfo { id: b, .. }) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        });
        Ok(infos)
    }

    /// Serialize and publish an envelope into a room
    pub async fn publish(&self, room_id: &str, envelope: &Envelope) -> Result<PublishReport> {
        let payload = envelope.to_bytes()?;
        log::trace!("Publishing {} to room '{}'", envelope.kind(), room_id);
        self.publish_bytes(room_id, payload).await
    }

    /// Publish an envelope into the global room
    pub async fn broadcast(&self, envelope: &Envelope) -> Result<PublishReport> {
        self.publish(GLOBAL_ROOM_ID, envelope).await
    }

    /// Rate-limited, non-blocking fan-out of a payload to every member of a room.
    /// Members that cannot take the payload are handed to their overflow callback.
    pub async fn publish_bytes(&self, room_id: &str, payload: Bytes) -> Result<PublishReport> {
        self.limiter.acquire().await;

        let room = match self.room(room_id)? {
            Some(room) => room,
            None => {
                log::warn!("Publish to unknown room '{}' dropped", room_id);
                return Ok(PublishReport::default());
            }
        };

        let report = room.fan_out(&payload)?;
        log::debug!(
            "Message sent to {}/{} subscribers in room '{}'",
            report.delivered,
            report.members,
            room_id
        );
        Ok(report)
    }

    /// Register a fresh subscriber into a room.
    /// Returns the roster of members that were already there.
    pub fn join(&self, room_id: &str, subscriber: &Arc<Subscriber>) -> Result<Vec<Peer>> {
        let mut membership = subscriber.membership()?;
        match &*membership {
            Membership::Unassigned => {}
            Membership::Member(current) => {
                return Err(HubError::ConnectionError(format!(
                    "subscriber {} is already in room '{}'",
                    subscriber.id(),
                    current
                )))
            }
            Membership::Departed => return Err(HubError::ConnectionClosed),
        }

        let room = self.room_or_create(room_id)?;
        let roster = self.registry.register(&room, subscriber)?;
        *membership = Membership::Member(room.id().to_string());

        log::info!(
            "Subscriber {} joined room '{}' ({} members)",
            subscriber.id(),
            room.id(),
            roster.len() + 1
        );
        Ok(roster)
    }

    /// Move a live subscriber into another room, announcing the move on both sides
    pub async fn switch_room(&self, id: SubscriberId, target: &str) -> Result<()> {
        if target.is_empty() {
            return Err(HubError::RoomNotFound(String::new()));
        }
        let subscriber = self
            .registry
            .get(id)?
            .ok_or(HubError::SubscriberNotFound(id))?;

        let previous = {
            let mut membership = subscriber.membership()?;
            let previous = match &*membership {
                Membership::Member(current) if current == target => return Ok(()),
                Membership::Member(current) => current.clone(),
                Membership::Unassigned | Membership::Departed => {
                    return Err(HubError::SubscriberNotFound(id))
                }
            };

            if let Some(old_room) = self.room(&previous)? {
                self.registry.deregister(&old_room, id)?;
            }
            let new_room = self.room_or_create(target)?;
            self.registry.register(&new_room, &subscriber)?;
            *membership = Membership::Member(target.to_string());
            previous
        };

        log::info!("Subscriber {} moved from '{}' to '{}'", id, previous, target);

        self.publish(
            &previous,
            &Envelope::LobbyLeave {
                user_id: id,
                lobby_id: previous.clone(),
            },
        )
        .await?;
        self.publish(
            target,
            &Envelope::LobbyJoin {
                user_id: id,
                lobby_id: target.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    /// Deregister a departing subscriber and announce the departure to the room it left.
    /// After this returns the subscriber is in no room and can no longer rejoin.
    pub async fn leave(&self, subscriber: &Subscriber) -> Result<Option<RoomId>> {
        let id = subscriber.id();
        let left = {
            let mut membership = subscriber.membership()?;
            let previous = std::mem::replace(&mut *membership, Membership::Departed);
            match previous {
                Membership::Member(room_id) => {
                    if let Some(room) = self.room(&room_id)? {
                        self.registry.deregister(&room, id)?;
                    }
                    Some(room_id)
                }
                Membership::Unassigned | Membership::Departed => None,
            }
        };
        self.registry.release(id)?;

        if let Some(room_id) = &left {
            log::info!("Subscriber {} left room '{}'", id, room_id);
            self.publish(room_id, &Envelope::peer_leave(id)).await?;
            self.publish(
                room_id,
                &Envelope::LobbyLeave {
                    user_id: id,
                    lobby_id: room_id.clone(),
                },
            )
            .await?;
        }
        Ok(left)
    }

    pub fn subscriber_count(&self) -> Result<usize> {
        self.registry.live_count()
    }
}

// Shared reference to the hub
pub type SharedHub = Arc<Hub>;
