//! Matchmaking queue
//! Players wait in FIFO order and are paired two at a time. Each pair is resolved on
//! its own task: the result is broadcast, persisted, and the players settle back.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::ServerConfig;
use crate::core::envelope::{Envelope, SubscriberId};
use crate::core::hub::SharedHub;
use crate::error::{HubError, Result};
use crate::storage::{ItemRecord, SharedRecordStore};

/// Winner and loser of a resolved match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    pub winner: SubscriberId,
    pub loser: SubscriberId,
}

/// Decides who wins a pairing
pub trait WinnerPolicy: Send + Sync {
    fn decide(&self, first: SubscriberId, second: SubscriberId) -> MatchOutcome;
}

/// Coin flip between the two players. Placeholder until real match logic exists.
pub struct RandomWinner;

impl WinnerPolicy for RandomWinner {
    fn decide(&self, first: SubscriberId, second: SubscriberId) -> MatchOutcome {
        if rand::random::<bool>() {
            MatchOutcome {
                winner: first,
                loser: second,
            }
        } else {
            MatchOutcome {
                winner: second,
                loser: first,
            }
        }
    }
}

/// FIFO of waiting subscriber ids with its own lock
#[derive(Default)]
pub struct MatchmakingQueue {
    waiting: Mutex<VecDeque<SubscriberId>>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail. When two or more are waiting, the two oldest are
    /// removed and returned as a pair.
    pub fn join(&self, id: SubscriberId) -> Result<Option<(SubscriberId, SubscriberId)>> {
        let mut waiting = self.waiting.lock()?;
        if waiting.contains(&id) {
            return Err(HubError::AlreadyQueued(id));
        }
        waiting.push_back(id);
        log::info!("User {} joined queue. Queue size: {}", id, waiting.len());

        if waiting.len() < 2 {
            return Ok(None);
        }
        match (waiting.pop_front(), waiting.pop_front()) {
            (Some(first), Some(second)) => Ok(Some((first, second))),
            _ => Ok(None),
        }
    }

    /// Drop a waiting id, e.g. when its connection goes away
    pub fn withdraw(&self, id: SubscriberId) -> Result<bool> {
        let mut waiting = self.waiting.lock()?;
        let before = waiting.len();
        waiting.retain(|&queued| queued != id);
        Ok(waiting.len() != before)
    }

    pub fn waiting(&self) -> Result<Vec<SubscriberId>> {
        Ok(self.waiting.lock()?.iter().copied().collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.waiting.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.waiting.lock()?.is_empty())
    }
}

/// Queue plus match resolution on top of the hub
pub struct Matchmaker {
    queue: MatchmakingQueue,
    hub: SharedHub,
    store: SharedRecordStore,
    policy: Arc<dyn WinnerPolicy>,
    settle_delay: Duration,
    system_owner_id: String,
}

impl Matchmaker {
    pub fn new(hub: SharedHub, store: SharedRecordStore, config: &ServerConfig) -> Self {
        Self {
            queue: MatchmakingQueue::new(),
            hub,
            store,
            policy: Arc::new(RandomWinner),
            settle_delay: config.match_settle_delay,
            system_owner_id: config.system_owner_id.clone(),
        }
    }

    /// Replace the winner policy
    pub fn with_policy(mut self, policy: Arc<dyn WinnerPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn queue(&self) -> &MatchmakingQueue {
        &self.queue
    }

    /// Enqueue an id; a completed pair is resolved on a separate task so the
    /// caller never waits on the match.
    pub fn join_queue(self: &Arc<Self>, id: SubscriberId) -> Result<Option<(SubscriberId, SubscriberId)>> {
        let pair = self.queue.join(id)?;

        if let Some((first, second)) = pair {
            log::info!("User {} and User {} were matched", first, second);
            let matchmaker = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = matchmaker.resolve(first, second).await {
                    log::error!("Failed to resolve match {} vs {}: {}", first, second, e);
                }
            });
        }

        Ok(pair)
    }

    /// Remove a disconnected subscriber from the queue
    pub fn withdraw(&self, id: SubscriberId) {
        match self.queue.withdraw(id) {
            Ok(true) => log::info!("User {} left the matchmaking queue", id),
            Ok(false) => {}
            Err(e) => log::error!("Failed to withdraw {} from queue: {}", id, e),
        }
    }

    /// Decide, announce and persist one match, then wait out the settle delay.
    /// Persistence runs detached; its failure is logged and never undoes the broadcast.
    pub async fn resolve(&self, first: SubscriberId, second: SubscriberId) -> Result<MatchOutcome> {
        let outcome = self.policy.decide(first, second);
        log::info!(
            "Match result: User {} wins against User {}",
            outcome.winner,
            outcome.loser
        );

        self.hub
            .broadcast(&Envelope::MatchResult {
                winner_id: outcome.winner,
                loser_id: outcome.loser,
            })
            .await?;

        let store = Arc::clone(&self.store);
        let record = ItemRecord::match_result(outcome.winner, &self.system_owner_id);
        tokio::spawn(async move {
            let title = record.title.clone();
            match store.insert_item(record).await {
                Ok(()) => log::info!(
                    "Match result stored via {}: title={}, winner={}",
                    store.backend_name(),
                    title,
                    outcome.winner
                ),
                Err(e) => log::error!("Failed to store match result: {}", e),
            }
        });

        tokio::time::sleep(self.settle_delay).await;
        log::info!("Returning players {} and {} to the general pool", first, second);

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_two_oldest() {
        let queue = MatchmakingQueue::new();
        assert_eq!(queue.join(10).unwrap(), None);
        assert_eq!(queue.join(11).unwrap(), Some((10, 11)));
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_third_waits_for_fourth() {
        let queue = MatchmakingQueue::new();
        queue.join(1).unwrap();
        queue.join(2).unwrap();
        assert_eq!(queue.join(3).unwrap(), None);
        assert_eq!(queue.waiting().unwrap(), vec![3]);
        assert_eq!(queue.join(4).unwrap(), Some((3, 4)));
    }

    #[test]
    fn test_duplicate_join_rejected() {
        let queue = MatchmakingQueue::new();
        queue.join(1).unwrap();
        assert!(matches!(queue.join(1), Err(HubError::AlreadyQueued(1))));
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn test_withdraw_removes_once() {
        let queue = MatchmakingQueue::new();
        queue.join(1).unwrap();
        assert!(queue.withdraw(1).unwrap());
        assert!(!queue.withdraw(1).unwrap());
        assert_eq!(queue.join(2).unwrap(), None);
    }

    #[test]
    fn test_random_winner_picks_one_of_the_pair() {
        for _ in 0..32 {
            let outcome = RandomWinner.decide(4, 9);
            assert_ne!(outcome.winner, outcome.loser);
            assert!([4, 9].contains(&outcome.winner));
            assert!([4, 9].contains(&outcome.loser));
        }
    }
}
