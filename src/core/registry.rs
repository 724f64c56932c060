//! Subscriber registry
//! Allocates subscriber ids and tracks which subscribers are alive.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::core::envelope::{Peer, SubscriberId};
use crate::core::room::Room;
use crate::core::subscriber::{OverflowCallback, Subscriber};
use crate::error::Result;

pub struct Registry {
    next_id: Mutex<SubscriberId>,
    live: Mutex<HashMap<SubscriberId, Arc<Subscriber>>>,
    mailbox_capacity: usize,
}

impl Registry {
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            next_id: Mutex::new(0),
            live: Mutex::new(HashMap::new()),
            mailbox_capacity,
        }
    }

    /// Create a subscriber with the next id and a fresh bounded mailbox.
    /// Ids are strictly increasing and never reused.
    pub fn allocate(
        &self,
        on_overflow: OverflowCallback,
    ) -> Result<(Arc<Subscriber>, mpsc::Receiver<Bytes>)> {
        let id = {
            let mut next = self.next_id.lock()?;
            let id = *next;
            *next += 1;
            id
        };

        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        let subscriber = Arc::new(Subscriber::new(id, tx, on_overflow));
        self.live.lock()?.insert(id, subscriber.clone());

        log::info!("Assigned new subscriber id={}", id);
        Ok((subscriber, rx))
    }

    /// Add a subscriber to a room's member set, returning the roster it joined
    pub fn register(&self, room: &Room, subscriber: &Arc<Subscriber>) -> Result<Vec<Peer>> {
        let roster = room.admit(subscriber.clone())?;
        log::debug!(
            "Subscriber {} registered in room '{}' ({} already present)",
            subscriber.id(),
            room.id(),
            roster.len()
        );
        Ok(roster)
    }

    /// Remove a subscriber from a room's member set. Removing an absent id is a no-op.
    pub fn deregister(&self, room: &Room, id: SubscriberId) -> Result<()> {
        if room.remove(id)? {
            log::debug!("Subscriber {} deregistered from room '{}'", id, room.id());
        }
        Ok(())
    }

    /// Point-in-time roster of a room
    pub fn snapshot(&self, room: &Room) -> Result<Vec<Peer>> {
        room.snapshot()
    }

    /// Look up a live subscriber
    pub fn get(&self, id: SubscriberId) -> Result<Option<Arc<Subscriber>>> {
        Ok(self.live.lock()?.get(&id).cloned())
    }

    /// Forget a subscriber once its session has torn down
    pub fn release(&self, id: SubscriberId) -> Result<()> {
        self.live.lock()?.remove(&id);
        Ok(())
    }

    pub fn live_count(&self) -> Result<usize> {
        Ok(self.live.lock()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_start_at_zero_and_increase() {
        let registry = Registry::new(4);
        let (a, _ra) = registry.allocate(Arc::new(|| {})).unwrap();
        let (b, _rb) = registry.allocate(Arc::new(|| {})).unwrap();
        assert_eq!(a.id(), 0);
        assert_eq!(b.id(), 1);
    }

    #[test]
    fn test_ids_not_reused_after_release() {
        let registry = Registry::new(4);
        let (a, _ra) = registry.allocate(Arc::new(|| {})).unwrap();
        registry.release(a.id()).unwrap();
        let (b, _rb) = registry.allocate(Arc::new(|| {})).unwrap();
        assert_eq!(b.id(), 1);
        assert!(registry.get(a.id()).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_allocation_is_gap_free() {
        let registry = Arc::new(Registry::new(1));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| registry.allocate(Arc::new(|| {})).unwrap().0.id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: HashSet<SubscriberId> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(ids.len(), 400);
        assert_eq!(ids, (0..400).collect::<HashSet<_>>());
    }

    #[test]
    fn test_register_deregister_snapshot() {
        let registry = Registry::new(4);
        let room = Room::new("global", "Global Lobby");
        let (a, _ra) = registry.allocate(Arc::new(|| {})).unwrap();
        let (b, _rb) = registry.allocate(Arc::new(|| {})).unwrap();

        registry.register(&room, &a).unwrap();
        let roster = registry.register(&room, &b).unwrap();
        assert_eq!(roster.iter().map(|p| p.id).collect::<Vec<_>>(), vec![0]);

        registry.deregister(&room, a.id()).unwrap();
        registry.deregister(&room, a.id()).unwrap();

        let snapshot = registry.snapshot(&room).unwrap();
        assert_eq!(snapshot.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1]);
    }
}
