//! End-to-end games played over the in-memory broker.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use peril::prelude::*;
use peril::WAR_QUEUE;
use peril_broker::{MemoryConnection, Resolution};
use peril_game::{spawn_game_with_dice, DiceRoller};
use peril_protocol::routing::{EXCHANGE_PERIL_TOPIC, QUEUE_PERIL_DLQ};

// =========================================================================
// Helpers
// =========================================================================

/// Collects archived logs in memory.
#[derive(Clone, Default)]
struct MemorySink {
    logs: Arc<Mutex<Vec<GameLog>>>,
}

impl MemorySink {
    fn logs(&self) -> Vec<GameLog> {
        self.logs.lock().unwrap().clone()
    }
}

impl LogSink for MemorySink {
    async fn write(&self, log: &GameLog) -> io::Result<()> {
        self.logs.lock().unwrap().push(log.clone());
        Ok(())
    }
}

/// Fails the first write, then behaves like `MemorySink`.
#[derive(Clone, Default)]
struct FlakySink {
    failed: Arc<AtomicBool>,
    inner: MemorySink,
}

impl LogSink for FlakySink {
    async fn write(&self, log: &GameLog) -> io::Result<()> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(io::Error::other("disk full"));
        }
        self.inner.write(log).await
    }
}

struct Game {
    broker: MemoryBroker,
    conn: MemoryConnection,
    config: PerilConfig,
}

impl Game {
    fn new() -> Self {
        let broker = MemoryBroker::new();
        let conn = broker.connect();
        Self {
            broker,
            conn,
            config: PerilConfig::default(),
        }
    }

    async fn server<S: LogSink>(&self, sink: S) -> PerilServer<MemoryConnection> {
        PerilServer::start(&self.conn, &self.config, sink).await.unwrap()
    }

    async fn client_with_ties(&self, name: &str) -> PerilClient<MemoryConnection> {
        let state = GameState::new(name).unwrap();
        let game = spawn_game_with_dice(state, 8, Box::new(|_| Box::new(AllTies)));
        PerilClient::start_with_game(&self.broker.connect(), &self.config, game)
            .await
            .unwrap()
    }

    async fn client(&self, name: &str) -> PerilClient<MemoryConnection> {
        PerilClient::start(&self.broker.connect(), &self.config, name)
            .await
            .unwrap()
    }
}

/// Polls `cond` until it holds or two seconds pass.
async fn eventually<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if cond().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Every roll ties, so every fought war is a draw.
struct AllTies;

impl DiceRoller for AllTies {
    fn roll(&mut self) -> u8 {
        4
    }
}

/// Who holds `territory` and with how many units, as `state` sees it.
fn holder(state: &GameState, territory: &str) -> Option<(String, u32)> {
    match state.units_in(territory) {
        Some(units) => Some((state.username().to_string(), units)),
        None => state
            .world()
            .get(territory)
            .map(|h| (h.owner.clone(), h.units)),
    }
}

fn snapshot(name: &str, holdings: &[(&str, u32)]) -> PlayerSnapshot {
    let mut s = PlayerSnapshot::new(name);
    for (t, u) in holdings {
        s.territories.insert((*t).to_string(), *u);
    }
    s
}

// =========================================================================
// Startup
// =========================================================================

#[tokio::test]
async fn test_server_declares_topology_and_log_queue() {
    let game = Game::new();
    let server = game.server(MemorySink::default()).await;
    assert!(game.broker.has_queue("game_logs"));
    assert!(game.broker.has_queue(QUEUE_PERIL_DLQ));
    // Nobody is bound to "pause" yet, so the initial broadcast is dropped.
    assert_eq!(game.broker.dropped_count(), 1);
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_client_declares_its_queues() {
    let game = Game::new();
    let alice = game.client("alice").await;
    assert!(game.broker.has_queue("pause.alice"));
    assert!(game.broker.has_queue("army_moves.alice"));
    assert!(game.broker.has_queue(WAR_QUEUE));
    assert!(game.broker.has_queue("war_results.alice"));
    alice.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_username_is_rejected() {
    let game = Game::new();
    let err = PerilClient::start(&game.broker.connect(), &game.config, "a.b")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, PerilError::Game(GameError::InvalidUsername(_))));
    assert!(!game.broker.has_queue("pause.a.b"));
}

// =========================================================================
// Pause
// =========================================================================

#[tokio::test]
async fn test_pause_and_resume_reach_every_client() {
    let game = Game::new();
    let server = game.server(MemorySink::default()).await;
    let alice = game.client("alice").await;
    let bob = game.client("bob").await;

    server.pause().await.unwrap();
    eventually(|| async {
        alice.status().await.unwrap().is_paused() && bob.status().await.unwrap().is_paused()
    })
    .await;
    let err = alice.spawn("gaul", 1).await.unwrap_err();
    assert!(matches!(err, PerilError::Game(GameError::Paused)));

    server.resume().await.unwrap();
    eventually(|| async { !alice.status().await.unwrap().is_paused() }).await;
    alice.spawn("gaul", 1).await.unwrap();

    assert!(game.broker.resolutions("pause.alice").iter().all(|r| *r == Resolution::Ack));
}

// =========================================================================
// Moves and wars
// =========================================================================

#[tokio::test]
async fn test_safe_move_is_seen_by_others() {
    let game = Game::new();
    let alice = game.client("alice").await;
    let bob = game.client("bob").await;

    alice.spawn("rome", 5).await.unwrap();
    alice.move_units("rome", vec!["gaul".into()], 3).await.unwrap();

    eventually(|| async {
        bob.status().await.unwrap().owner_of("gaul") == Some("alice")
    })
    .await;
    let bob_view = bob.status().await.unwrap();
    assert_eq!(bob_view.world()["gaul"].units, 3);
    eventually(|| async { !game.broker.resolutions("army_moves.bob").is_empty() }).await;
    assert_eq!(game.broker.resolutions("army_moves.bob"), vec![Resolution::Ack]);
}

#[tokio::test]
async fn test_own_move_echo_is_discarded() {
    let game = Game::new();
    let alice = game.client("alice").await;
    alice.spawn("rome", 5).await.unwrap();
    alice.move_units("rome", vec!["gaul".into()], 3).await.unwrap();

    eventually(|| async { game.broker.resolutions("army_moves.alice").len() == 1 }).await;
    assert_eq!(
        game.broker.resolutions("army_moves.alice"),
        vec![Resolution::NackDiscard]
    );
    let state = alice.status().await.unwrap();
    assert_eq!(state.units_in("rome"), Some(2));
    assert_eq!(state.units_in("gaul"), Some(3));
}

#[tokio::test]
async fn test_war_produces_exactly_one_game_log() {
    let game = Game::new();
    let sink = MemorySink::default();
    let server = game.server(sink.clone()).await;
    let alice = game.client("alice").await;
    let bob = game.client("bob").await;

    bob.spawn("gaul", 5).await.unwrap();
    alice.spawn("rome", 5).await.unwrap();
    alice.move_units("rome", vec!["gaul".into()], 3).await.unwrap();

    eventually(|| async { sink.logs().len() == 1 }).await;
    // Give a duplicate a chance to show up.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let logs = sink.logs();
    assert_eq!(logs.len(), 1);
    let message = &logs[0].message;
    assert!(
        message == "alice won a war against bob"
            || message == "bob won a war against alice"
            || message == "A war between alice and bob resulted in a draw",
        "unexpected log {message:?}"
    );
    assert!(logs[0].username == "alice" || logs[0].username == "bob");

    // Bob declared the war, one client resolved it, the server archived it.
    assert_eq!(game.broker.resolutions("army_moves.bob"), vec![Resolution::Ack]);
    assert!(game.broker.resolutions(WAR_QUEUE).contains(&Resolution::Ack));
    let archived: Vec<_> = game
        .broker
        .ledger()
        .into_iter()
        .filter(|r| r.queue == "game_logs")
        .collect();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].routing_key, "game_logs.alice");
    assert_eq!(archived[0].resolution, Resolution::Ack);

    alice.shutdown().await.unwrap();
    bob.shutdown().await.unwrap();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_both_sides_agree_after_war() {
    let game = Game::new();
    let sink = MemorySink::default();
    let _server = game.server(sink.clone()).await;
    let alice = game.client("alice").await;
    let bob = game.client("bob").await;

    bob.spawn("gaul", 5).await.unwrap();
    alice.spawn("rome", 5).await.unwrap();
    alice.move_units("rome", vec!["gaul".into()], 3).await.unwrap();

    eventually(|| async { sink.logs().len() == 1 }).await;
    eventually(|| async {
        let a = alice.status().await.unwrap();
        let b = bob.status().await.unwrap();
        holder(&a, "gaul").is_some() && holder(&a, "gaul") == holder(&b, "gaul")
    })
    .await;
    let forwarded = || {
        game.broker
            .ledger()
            .into_iter()
            .filter(|r| r.queue.starts_with("war_results."))
            .collect::<Vec<_>>()
    };
    eventually(|| async { !forwarded().is_empty() }).await;
    let forwarded = forwarded();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].resolution, Resolution::Ack);
    assert_eq!(sink.logs().len(), 1);

    alice.shutdown().await.unwrap();
    bob.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_draw_is_applied_by_both_sides() {
    let game = Game::new();
    let sink = MemorySink::default();
    let _server = game.server(sink.clone()).await;
    let alice = game.client_with_ties("alice").await;
    let bob = game.client_with_ties("bob").await;

    bob.spawn("gaul", 5).await.unwrap();
    alice.spawn("rome", 5).await.unwrap();
    alice.move_units("rome", vec!["gaul".into()], 3).await.unwrap();

    eventually(|| async { sink.logs().len() == 1 }).await;
    assert_eq!(
        sink.logs()[0].message,
        "A war between alice and bob resulted in a draw"
    );
    let expected = Some(("bob".to_string(), 0));
    eventually(|| async {
        holder(&alice.status().await.unwrap(), "gaul") == expected
            && holder(&bob.status().await.unwrap(), "gaul") == expected
    })
    .await;

    // A later move by alice does not undo the result on bob's side.
    alice.move_units("rome", vec!["iberia".into()], 1).await.unwrap();
    eventually(|| async {
        bob.status().await.unwrap().owner_of("iberia") == Some("alice")
    })
    .await;
    assert_eq!(bob.status().await.unwrap().units_in("gaul"), Some(0));

    alice.shutdown().await.unwrap();
    bob.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_uninvolved_client_requeues_war() {
    let game = Game::new();
    let sink = MemorySink::default();
    let _server = game.server(sink.clone()).await;
    let carol = game.client("carol").await;

    let publisher = Publisher::new(game.conn.open_channel().await.unwrap(), Encoding::Json);
    let war = RecognitionOfWar {
        attacker: snapshot("alice", &[("gaul", 3)]),
        defender: snapshot("bob", &[("gaul", 5)]),
        seed: 11,
    };
    publisher.publish(EXCHANGE_PERIL_TOPIC, "war.bob", &war).await.unwrap();

    eventually(|| async { game.broker.resolutions(WAR_QUEUE).len() >= 2 }).await;
    assert!(
        game.broker
            .resolutions(WAR_QUEUE)
            .iter()
            .all(|r| *r == Resolution::NackRequeue)
    );
    assert!(sink.logs().is_empty());
    assert!(carol.status().await.unwrap().world().is_empty());

    // An involved player joins and picks it up.
    let bob = game.client("bob").await;
    eventually(|| async { sink.logs().len() == 1 }).await;
    assert_eq!(sink.logs()[0].username, "bob");
    eventually(|| async { game.broker.resolutions(WAR_QUEUE).contains(&Resolution::Ack) }).await;

    carol.shutdown().await.unwrap();
    bob.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_war_without_units_is_discarded() {
    let game = Game::new();
    let sink = MemorySink::default();
    let _server = game.server(sink.clone()).await;
    let bob = game.client("bob").await;

    let publisher = Publisher::new(game.conn.open_channel().await.unwrap(), Encoding::Json);
    let war = RecognitionOfWar {
        attacker: snapshot("alice", &[("rome", 3)]),
        defender: snapshot("bob", &[("gaul", 5)]),
        seed: 3,
    };
    publisher.publish(EXCHANGE_PERIL_TOPIC, "war.bob", &war).await.unwrap();

    eventually(|| async { game.broker.resolutions(WAR_QUEUE).len() == 1 }).await;
    assert_eq!(game.broker.resolutions(WAR_QUEUE), vec![Resolution::NackDiscard]);
    assert_eq!(game.broker.queue_depth(QUEUE_PERIL_DLQ), Some(1));
    assert!(sink.logs().is_empty());
    bob.shutdown().await.unwrap();
}

// =========================================================================
// Archival
// =========================================================================

#[tokio::test]
async fn test_sink_failure_requeues_game_log() {
    let game = Game::new();
    let sink = FlakySink::default();
    let server = game.server(sink.clone()).await;

    let publisher = Publisher::new(game.conn.open_channel().await.unwrap(), Encoding::Binary);
    let log = GameLog {
        current_time: chrono::Utc::now(),
        message: "alice won a war against bob".into(),
        username: "alice".into(),
    };
    publisher.publish(EXCHANGE_PERIL_TOPIC, "game_logs.alice", &log).await.unwrap();

    eventually(|| async { game.broker.resolutions("game_logs").len() == 2 }).await;
    assert_eq!(
        game.broker.resolutions("game_logs"),
        vec![Resolution::NackRequeue, Resolution::Ack]
    );
    assert_eq!(sink.inner.logs(), vec![log]);
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_consuming_shared_war_queue() {
    let game = Game::new();
    let alice = game.client("alice").await;
    alice.shutdown().await.unwrap();

    // Nothing consumes alice's queues any more.
    let publisher = Publisher::new(game.conn.open_channel().await.unwrap(), Encoding::Json);
    publisher
        .publish(EXCHANGE_PERIL_TOPIC, "war.bob", &RecognitionOfWar {
            attacker: snapshot("alice", &[]),
            defender: snapshot("bob", &[]),
            seed: 0,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(game.broker.queue_depth(WAR_QUEUE), Some(1));
    assert!(game.broker.resolutions(WAR_QUEUE).is_empty());
}
