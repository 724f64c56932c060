use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use showdown_hub::config::ServerConfig;
use showdown_hub::constants::{CLOSE_POLICY_VIOLATION, GLOBAL_ROOM_ID};
use showdown_hub::core::{
    ChatMessage, CloseRequest, ConnectionCell, Envelope, Hub, Matchmaker, Peer, PeerState,
    PublishReport,
};
use showdown_hub::error::{HubError, Result};
use showdown_hub::storage::{ItemRecord, MemoryRecordStore, RecordStore};

fn fast_hub(mailbox_capacity: usize) -> Arc<Hub> {
    Arc::new(Hub::new(mailbox_capacity, 1000, Duration::from_millis(1)))
}

fn quick_config() -> ServerConfig {
    ServerConfig {
        match_settle_delay: Duration::from_millis(5),
        ..ServerConfig::default()
    }
}

#[tokio::test]
async fn test_concurrent_allocation_is_dense_and_unique() {
    let hub = fast_hub(4);
    let mut handles = Vec::new();
    for _ in 0..16 {
        let hub = hub.clone();
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for _ in 0..25 {
                let (subscriber, _rx) = hub.registry().allocate(Arc::new(|| {})).unwrap();
                ids.push(subscriber.id());
            }
            ids
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    let unique: HashSet<u64> = all.iter().copied().collect();
    assert_eq!(unique.len(), 400);
    assert_eq!(unique, (0..400).collect::<HashSet<u64>>());
}

#[tokio::test]
async fn test_publish_to_empty_room_is_noop() {
    let hub = fast_hub(4);
    let report = hub.broadcast(&Envelope::peer_join(3)).await.unwrap();
    assert_eq!(report, PublishReport::default());
}

#[tokio::test]
async fn test_full_mailbox_overflows_once_per_publish() {
    let hub = fast_hub(1);
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let (slow, _slow_rx) = hub
        .registry()
        .allocate(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    let (fast, mut fast_rx) = hub.registry().allocate(Arc::new(|| {})).unwrap();
    hub.join(GLOBAL_ROOM_ID, &slow).unwrap();
    hub.join(GLOBAL_ROOM_ID, &fast).unwrap();

    let first = hub.broadcast(&Envelope::peer_join(10)).await.unwrap();
    assert_eq!(first.delivered, 2);
    assert!(fast_rx.try_recv().is_ok());

    for round in 1..=3 {
        let report = tokio::time::timeout(
            Duration::from_secs(1),
            hub.broadcast(&Envelope::peer_join(10 + round)),
        )
        .await
        .expect("publish must not block on a slow consumer")
        .unwrap();
        assert_eq!(report.overflowed, 1);
        assert_eq!(fired.load(Ordering::SeqCst), round as usize);
        assert!(fast_rx.try_recv().is_ok());
    }
}

#[tokio::test]
async fn test_overflow_closes_connection_then_teardown_removes() {
    let hub = fast_hub(1);
    let cell = Arc::new(ConnectionCell::new());
    let evictor = cell.clone();
    let (slow, _slow_rx) = hub
        .registry()
        .allocate(Arc::new(move || {
            evictor.close(CloseRequest::slow_consumer());
        }))
        .unwrap();
    let (close_tx, close_rx) = oneshot::channel();
    cell.attach(close_tx).unwrap();
    hub.join(GLOBAL_ROOM_ID, &slow).unwrap();

    hub.broadcast(&Envelope::peer_join(1)).await.unwrap();
    hub.broadcast(&Envelope::peer_join(2)).await.unwrap();

    let request = close_rx.await.unwrap();
    assert_eq!(request.code, CLOSE_POLICY_VIOLATION);
    assert!(cell.is_closed());

    // Eviction does not remove membership by itself
    assert!(hub.global_room().has_member(slow.id()).unwrap());

    hub.leave(&slow).await.unwrap();
    assert!(!hub.global_room().has_member(slow.id()).unwrap());
    assert_eq!(hub.subscriber_count().unwrap(), 0);
}

#[tokio::test]
async fn test_roster_snapshot_excludes_newcomer() {
    let hub = fast_hub(4);
    let mut subscribers = Vec::new();
    for _ in 0..3 {
        let (subscriber, rx) = hub.registry().allocate(Arc::new(|| {})).unwrap();
        subscribers.push((subscriber, rx));
    }

    hub.join(GLOBAL_ROOM_ID, &subscribers[0].0).unwrap();
    hub.join(GLOBAL_ROOM_ID, &subscribers[1].0).unwrap();
    let roster = hub.join(GLOBAL_ROOM_ID, &subscribers[2].0).unwrap();

    assert_eq!(
        roster,
        vec![
            Peer {
                id: 0,
                state: PeerState::Joined
            },
            Peer {
                id: 1,
                state: PeerState::Joined
            },
        ]
    );
}

#[tokio::test]
async fn test_publish_waits_for_tokens() {
    let hub = Hub::new(4, 1, Duration::from_millis(50));
    let start = tokio::time::Instant::now();
    hub.broadcast(&Envelope::peer_join(1)).await.unwrap();
    hub.broadcast(&Envelope::peer_join(2)).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(40));

    let limited = hub.limiter().acquire_within(Duration::from_millis(5)).await;
    assert!(matches!(limited, Err(HubError::RateLimited)));
}

#[tokio::test]
async fn test_match_result_broadcast_and_persisted() {
    let hub = fast_hub(4);
    let store = MemoryRecordStore::new();
    let config = quick_config();
    let matchmaker = Arc::new(Matchmaker::new(hub.clone(), Arc::new(store.clone()), &config));

    let (player, mut rx) = hub.registry().allocate(Arc::new(|| {})).unwrap();
    hub.join(GLOBAL_ROOM_ID, &player).unwrap();

    let outcome = matchmaker.resolve(3, 8).await.unwrap();
    let mut pair = [outcome.winner, outcome.loser];
    pair.sort();
    assert_eq!(pair, [3, 8]);

    let seen = Envelope::from_slice(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(
        seen,
        Envelope::MatchResult {
            winner_id: outcome.winner,
            loser_id: outcome.loser
        }
    );

    for _ in 0..100 {
        if !store.is_empty().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let items = store.items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].description, outcome.winner.to_string());
    assert_eq!(items[0].owner_id, config.system_owner_id);
}

struct FailingStore;

#[async_trait]
impl RecordStore for FailingStore {
    async fn insert_item(&self, _item: ItemRecord) -> Result<()> {
        Err(HubError::StorageError("store offline".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

#[tokio::test]
async fn test_persistence_failure_does_not_undo_broadcast() {
    let hub = fast_hub(4);
    let matchmaker = Arc::new(Matchmaker::new(
        hub.clone(),
        Arc::new(FailingStore),
        &quick_config(),
    ));
    let (player, mut rx) = hub.registry().allocate(Arc::new(|| {})).unwrap();
    hub.join(GLOBAL_ROOM_ID, &player).unwrap();

    let outcome = matchmaker.resolve(1, 2).await.unwrap();
    let seen = Envelope::from_slice(&rx.try_recv().unwrap()).unwrap();
    assert!(matches!(seen, Envelope::MatchResult { winner_id, .. } if winner_id == outcome.winner));
}

#[tokio::test]
async fn test_join_queue_pairs_fifo_and_keeps_third() {
    let hub = fast_hub(4);
    let matchmaker = Arc::new(Matchmaker::new(
        hub,
        Arc::new(MemoryRecordStore::new()),
        &quick_config(),
    ));

    assert_eq!(matchmaker.join_queue(100).unwrap(), None);
    assert_eq!(matchmaker.join_queue(200).unwrap(), Some((100, 200)));
    assert_eq!(matchmaker.join_queue(300).unwrap(), None);
    assert_eq!(matchmaker.queue().waiting().unwrap(), vec![300]);
    assert!(matches!(
        matchmaker.join_queue(300),
        Err(HubError::AlreadyQueued(300))
    ));
}

#[test]
fn test_every_envelope_round_trips() {
    let envelopes = vec![
        Envelope::Welcome {
            id: 2,
            peers: vec![Peer {
                id: 0,
                state: PeerState::Joined,
            }],
        },
        Envelope::peer_join(4),
        Envelope::peer_leave(4),
        Envelope::ChatMessage(ChatMessage {
            sender_id: 1,
            message: "glhf".to_string(),
            lobby_id: "arena".to_string(),
            timestamp: Some(1_700_000_000),
        }),
        Envelope::ChatMessage(ChatMessage {
            sender_id: 1,
            message: String::new(),
            lobby_id: GLOBAL_ROOM_ID.to_string(),
            timestamp: None,
        }),
        Envelope::LobbyJoin {
            user_id: 3,
            lobby_id: "arena".to_string(),
        },
        Envelope::LobbyLeave {
            user_id: 3,
            lobby_id: GLOBAL_ROOM_ID.to_string(),
        },
        Envelope::LobbyInfo {
            id: "arena".to_string(),
            name: "Arena".to_string(),
            num_users: 12,
        },
        Envelope::MatchResult {
            winner_id: 5,
            loser_id: 6,
        },
    ];

    for envelope in envelopes {
        let bytes: Bytes = envelope.to_bytes().unwrap();
        assert_eq!(Envelope::from_slice(&bytes).unwrap(), envelope);
    }
}
