//! Integration tests for wake sessions running under the coordinator.
//!
//! Timing tests run in paused tokio time, so a 30 × 10 s poll budget
//! completes instantly and elapsed times are exact.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use wol_core::{Notification, SessionId, WakeEvent};
use wold::registry::{spawn_registry, TargetStore};
use wold::wake::WakeMany;

use common::{config, coordinator, target, FakeNetwork, RecordingSender};

/// Collects notifications until `sessions` terminal events arrived.
async fn collect(
    rx: &mut mpsc::UnboundedReceiver<Notification>,
    sessions: usize,
) -> Vec<(Instant, Notification)> {
    let mut seen = Vec::new();
    let mut terminal = 0;
    while terminal < sessions {
        let n = rx.recv().await.expect("notifier closed early");
        if n.event.is_terminal() {
            terminal += 1;
        }
        seen.push((Instant::now(), n));
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn test_sessions_do_not_delay_each_other() {
    let network = Arc::new(
        FakeNetwork::new()
            // Offline at entry, answers the first poll
            .host("10.0.0.1", 1),
    );
    let sender = Arc::new(RecordingSender::default());
    let coordinator = coordinator(
        config(30, Duration::from_secs(10)),
        Arc::clone(&network),
        Arc::clone(&sender),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let start = Instant::now();
    let WakeMany::Started(started) = coordinator.wake_many(
        vec![
            target("quick", "00:11:22:33:44:01", "10.0.0.1"),
            target("never", "00:11:22:33:44:02", "10.0.0.2"),
        ],
        Arc::new(tx),
    ) else {
        panic!("expected sessions");
    };
    let ids: HashMap<String, SessionId> = started.into_iter().map(|(id, name)| (name, id)).collect();

    let events = collect(&mut rx, 2).await;

    let (online_at, online) = events
        .iter()
        .find(|(_, n)| matches!(n.event, WakeEvent::Online { .. }))
        .expect("quick target comes online");
    assert_eq!(online.session_id, ids["quick"]);
    assert_eq!(online_at.duration_since(start), Duration::from_secs(10));

    let (exhausted_at, exhausted) = events.last().unwrap();
    assert_eq!(exhausted.session_id, ids["never"]);
    assert_eq!(
        exhausted.event,
        WakeEvent::Exhausted {
            name: "never".to_string(),
            attempts: 30
        }
    );
    assert_eq!(exhausted_at.duration_since(start), Duration::from_secs(300));

    // quick: 1 send. never: 1 initial send + resends at 3, 6, ..., 30
    assert_eq!(sender.sent().len(), 1 + 1 + 10);
    assert_eq!(network.probe_count("10.0.0.2"), 31);
}

#[tokio::test(start_paused = true)]
async fn test_notifications_ordered_within_each_session() {
    let network = Arc::new(
        FakeNetwork::new()
            .host("10.0.0.1", 0)
            .host("10.0.0.2", 4)
            .host("10.0.0.3", 2),
    );
    let coordinator = coordinator(
        config(5, Duration::from_secs(1)),
        network,
        Arc::new(RecordingSender::default()),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    coordinator.wake_many(
        vec![
            target("a", "00:11:22:33:44:01", "10.0.0.1"),
            target("b", "00:11:22:33:44:02", "10.0.0.2"),
            target("c", "00:11:22:33:44:03", "10.0.0.3"),
            target("d", "00:11:22:33:44:04", "10.0.0.4"),
        ],
        Arc::new(tx),
    );

    let events = collect(&mut rx, 4).await;

    let mut by_session: HashMap<SessionId, Vec<WakeEvent>> = HashMap::new();
    for (_, n) in events {
        by_session.entry(n.session_id).or_default().push(n.event);
    }
    assert_eq!(by_session.len(), 4);

    for events in by_session.values() {
        assert!(matches!(
            events[0],
            WakeEvent::AlreadyOnline { .. } | WakeEvent::PacketSent { .. } | WakeEvent::SendFailed { .. }
        ));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.last().unwrap().is_terminal());
    }

    let terminal: HashMap<&str, &WakeEvent> = by_session
        .values()
        .map(|events| {
            let last = events.last().unwrap();
            (last.name(), last)
        })
        .collect();
    assert!(matches!(terminal["a"], WakeEvent::AlreadyOnline { .. }));
    assert!(matches!(terminal["b"], WakeEvent::Online { attempts: 4, .. }));
    assert!(matches!(terminal["c"], WakeEvent::Online { attempts: 2, .. }));
    assert!(matches!(terminal["d"], WakeEvent::Exhausted { attempts: 5, .. }));
}

#[tokio::test]
async fn test_session_uses_snapshot_taken_at_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let registry = spawn_registry(TargetStore::new(dir.path().join("computers.json")))
        .await
        .unwrap();
    registry
        .upsert(target("pc", "00:11:22:33:44:55", "10.0.0.7"))
        .await
        .unwrap();

    let network = Arc::new(FakeNetwork::new());
    let sender = Arc::new(RecordingSender::default());
    let coordinator = coordinator(
        config(3, Duration::from_millis(20)),
        Arc::clone(&network),
        Arc::clone(&sender),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let pc = registry.get("pc").await.unwrap();
    coordinator.wake_one(pc, Arc::new(tx));

    // Edit the registry while the session is running
    registry
        .upsert(target("pc", "AA:BB:CC:DD:EE:FF", "10.0.0.8"))
        .await
        .unwrap();

    let events = collect(&mut rx, 1).await;
    assert!(matches!(
        events.last().unwrap().1.event,
        WakeEvent::Exhausted { attempts: 3, .. }
    ));

    assert_eq!(network.probe_count("10.0.0.7"), 4);
    assert_eq!(network.probe_count("10.0.0.8"), 0);
    assert!(sender
        .sent()
        .iter()
        .all(|mac| mac.to_string() == "00:11:22:33:44:55"));
}

#[tokio::test(start_paused = true)]
async fn test_wake_same_target_twice_runs_two_sessions() {
    let network = Arc::new(FakeNetwork::new());
    let sender = Arc::new(RecordingSender::default());
    let coordinator = coordinator(
        config(2, Duration::from_secs(5)),
        Arc::clone(&network),
        Arc::clone(&sender),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let requester: Arc<dyn wold::wake::Notifier> = Arc::new(tx);
    let pc = target("pc", "00:11:22:33:44:55", "10.0.0.9");
    let first = coordinator.wake_one(pc.clone(), Arc::clone(&requester));
    let second = coordinator.wake_one(pc, requester);

    let events = collect(&mut rx, 2).await;
    let terminal: Vec<SessionId> = events
        .iter()
        .filter(|(_, n)| n.event.is_terminal())
        .map(|(_, n)| n.session_id)
        .collect();

    assert_eq!(terminal.len(), 2);
    assert!(terminal.contains(&first));
    assert!(terminal.contains(&second));
    // Each session: entry probe + 2 polls
    assert_eq!(network.probe_count("10.0.0.9"), 6);
    assert_eq!(sender.sent().len(), 2);
}
