use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::envelope::{Peer, PeerState, SubscriberId};
use crate::core::subscriber::{Delivery, Subscriber};
use crate::error::Result;

/// Result of fanning one payload out to a room
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Members present when the room lock was taken
    pub members: usize,
    pub delivered: usize,
    /// Members whose mailbox was full; their overflow callback fired
    pub overflowed: usize,
}

/// A named membership set guarded by its own lock
pub struct Room {
    id: String,
    name: String,
    members: Mutex<HashMap<SubscriberId, Arc<Subscriber>>>,
}

impl Room {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            members: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert a member and return the roster as it stood just before, under one lock
    pub fn admit(&self, subscriber: Arc<Subscriber>) -> Result<Vec<Peer>> {
        let mut members = self.members.lock()?;
        let roster = roster_of(&members);
        members.insert(subscriber.id(), subscriber);
        Ok(roster)
    }

    /// Remove a member; absent ids are a no-op
    pub fn remove(&self, id: SubscriberId) -> Result<bool> {
        Ok(self.members.lock()?.remove(&id).is_some())
    }

    /// Point-in-time roster ordered by id
    pub fn snapshot(&self) -> Result<Vec<Peer>> {
        let members = self.members.lock()?;
        Ok(roster_of(&members))
    }

    /// Non-blocking delivery to every current member while holding the room lock.
    /// Full mailboxes get their overflow callback instead of the payload.
    pub fn fan_out(&self, payload: &Bytes) -> Result<PublishReport> {
        let members = self.members.lock()?;
        let mut report = PublishReport {
            members: members.len(),
            ..PublishReport::default()
        };

        for subscriber in members.values() {
            match subscriber.deliver(payload.clone()) {
                Delivery::Enqueued => report.delivered += 1,
                Delivery::Overflowed => {
                    log::warn!(
                        "Subscriber {} mailbox full in room '{}', closing slow consumer",
                        subscriber.id(),
                        self.id
                    );
                    report.overflowed += 1;
                }
                Delivery::Closed => {
                    log::trace!("Subscriber {} mailbox already closed", subscriber.id());
                }
            }
        }

        Ok(report)
    }

    pub fn has_member(&self, id: SubscriberId) -> Result<bool> {
        Ok(self.members.lock()?.contains_key(&id))
    }

    pub fn member_count(&self) -> Result<usize> {
        Ok(self.members.lock()?.len())
    }

    pub fn member_ids(&self) -> Result<Vec<SubscriberId>> {
        let mut ids: Vec<SubscriberId> = self.members.lock()?.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

fn roster_of(members: &HashMap<SubscriberId, Arc<Subscriber>>) -> Vec<Peer> {
    let mut roster: Vec<Peer> = members
        .keys()
        .map(|&id| Peer {
            id,
            state: PeerState::Joined,
        })
        .collect();
    roster.sort_unstable_by_key(|peer| peer.id);
    roster
}
