//! Integration tests for the in-memory broker and the topology declarator.

use peril_broker::{
    declare_and_bind, declare_peril_topology, Broker, BrokerChannel, Delivery, DeliveryStream,
    Durability, MemoryBroker, MemoryChannel, Prefetch, Resolution, TopologyError,
};
use peril_protocol::routing::{
    EXCHANGE_PERIL_DIRECT, EXCHANGE_PERIL_DLX, EXCHANGE_PERIL_TOPIC, QUEUE_PERIL_DLQ,
};

// =========================================================================
// Helpers
// =========================================================================

async fn setup() -> (MemoryBroker, MemoryChannel) {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();
    declare_peril_topology(&ch).await.unwrap();
    (broker, ch)
}

// =========================================================================
// Topology
// =========================================================================

#[tokio::test]
async fn test_declare_and_bind_creates_queue() {
    let (broker, ch) = setup().await;
    let info = declare_and_bind(
        &ch,
        EXCHANGE_PERIL_TOPIC,
        "game_logs",
        "game_logs.*",
        Durability::Durable,
    )
    .await
    .unwrap();
    assert_eq!(info.name, "game_logs");
    assert!(broker.has_queue("game_logs"));
}

#[tokio::test]
async fn test_redeclare_with_other_durability_fails() {
    let (_broker, ch) = setup().await;
    declare_and_bind(&ch, EXCHANGE_PERIL_TOPIC, "war", "war.*", Durability::Durable)
        .await
        .unwrap();
    let err = declare_and_bind(&ch, EXCHANGE_PERIL_TOPIC, "war", "war.*", Durability::Transient)
        .await
        .unwrap_err();
    assert!(matches!(err, TopologyError::DurabilityMismatch { .. }));
}

#[tokio::test]
async fn test_bind_to_missing_exchange_fails() {
    let broker = MemoryBroker::new();
    let ch = broker.connect().open_channel().await.unwrap();
    let err = declare_and_bind(&ch, "nope", "q", "k", Durability::Durable)
        .await
        .unwrap_err();
    assert!(matches!(err, TopologyError::Bind { .. }));
}

#[tokio::test]
async fn test_transient_queue_is_exclusive_and_auto_deleted() {
    let broker = MemoryBroker::new();
    let alice = broker.connect();
    let bob = broker.connect();
    let ch = alice.open_channel().await.unwrap();
    declare_peril_topology(&ch).await.unwrap();
    declare_and_bind(&ch, EXCHANGE_PERIL_DIRECT, "pause.alice", "pause", Durability::Transient)
        .await
        .unwrap();

    let other = bob.open_channel().await.unwrap();
    let err = declare_and_bind(
        &other,
        EXCHANGE_PERIL_DIRECT,
        "pause.alice",
        "pause",
        Durability::Transient,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, TopologyError::Locked { .. }));

    alice.close();
    assert!(!broker.has_queue("pause.alice"));
}

// =========================================================================
// Routing
// =========================================================================

#[tokio::test]
async fn test_topic_routing_with_wildcard() {
    let (broker, ch) = setup().await;
    declare_and_bind(&ch, EXCHANGE_PERIL_TOPIC, "moves", "army_moves.*", Durability::Durable)
        .await
        .unwrap();

    ch.publish(EXCHANGE_PERIL_TOPIC, "army_moves.alice", "application/json", b"1")
        .await
        .unwrap();
    ch.publish(EXCHANGE_PERIL_TOPIC, "war.alice", "application/json", b"2")
        .await
        .unwrap();

    assert_eq!(broker.queue_depth("moves"), Some(1));
    assert_eq!(broker.dropped_count(), 1);
}

#[tokio::test]
async fn test_direct_exchange_fans_out_to_every_bound_queue() {
    let (broker, ch) = setup().await;
    for q in ["pause.alice", "pause.bob"] {
        declare_and_bind(&ch, EXCHANGE_PERIL_DIRECT, q, "pause", Durability::Transient)
            .await
            .unwrap();
    }
    ch.publish(EXCHANGE_PERIL_DIRECT, "pause", "application/json", b"{}")
        .await
        .unwrap();
    assert_eq!(broker.queue_depth("pause.alice"), Some(1));
    assert_eq!(broker.queue_depth("pause.bob"), Some(1));
}

#[tokio::test]
async fn test_publish_to_unknown_exchange_is_transport_error() {
    let broker = MemoryBroker::new();
    let ch = broker.connect().open_channel().await.unwrap();
    assert!(ch.publish("missing", "k", "application/json", b"").await.is_err());
}

// =========================================================================
// Acknowledgment
// =========================================================================

#[tokio::test]
async fn test_ack_removes_message() {
    let (broker, ch) = setup().await;
    declare_and_bind(&ch, EXCHANGE_PERIL_TOPIC, "q", "k.*", Durability::Durable)
        .await
        .unwrap();
    ch.publish(EXCHANGE_PERIL_TOPIC, "k.a", "application/json", b"x")
        .await
        .unwrap();

    let mut stream = ch.consume("q").await.unwrap();
    let d = stream.next().await.unwrap().unwrap();
    assert_eq!(d.body(), b"x");
    assert_eq!(d.content_type(), Some("application/json"));
    assert_eq!(d.routing_key(), "k.a");
    d.ack().await.unwrap();

    assert_eq!(broker.queue_depth("q"), Some(0));
    assert_eq!(broker.unacked_count(), 0);
    assert_eq!(broker.resolutions("q"), vec![Resolution::Ack]);
}

#[tokio::test]
async fn test_nack_requeue_redelivers_flagged() {
    let (broker, ch) = setup().await;
    declare_and_bind(&ch, EXCHANGE_PERIL_TOPIC, "q", "k.*", Durability::Durable)
        .await
        .unwrap();
    ch.publish(EXCHANGE_PERIL_TOPIC, "k.a", "application/json", b"x")
        .await
        .unwrap();

    let mut stream = ch.consume("q").await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert!(!first.redelivered());
    first.nack(true).await.unwrap();

    let second = stream.next().await.unwrap().unwrap();
    assert!(second.redelivered());
    assert_eq!(second.body(), b"x");
    second.ack().await.unwrap();
    assert_eq!(
        broker.resolutions("q"),
        vec![Resolution::NackRequeue, Resolution::Ack]
    );
}

#[tokio::test]
async fn test_nack_discard_dead_letters() {
    let (broker, ch) = setup().await;
    declare_and_bind(&ch, EXCHANGE_PERIL_TOPIC, "q", "k.*", Durability::Durable)
        .await
        .unwrap();
    ch.publish(EXCHANGE_PERIL_TOPIC, "k.a", "application/json", b"bad")
        .await
        .unwrap();

    let mut stream = ch.consume("q").await.unwrap();
    stream.next().await.unwrap().unwrap().nack(false).await.unwrap();

    assert_eq!(broker.queue_depth("q"), Some(0));
    let dead = broker.peek(QUEUE_PERIL_DLQ);
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].body, b"bad");
    assert_eq!(dead[0].exchange, EXCHANGE_PERIL_DLX);
    assert_eq!(dead[0].routing_key, "k.a");
}

#[tokio::test]
async fn test_prefetch_limits_outstanding_deliveries() {
    let (broker, ch) = setup().await;
    declare_and_bind(&ch, EXCHANGE_PERIL_TOPIC, "q", "k.*", Durability::Durable)
        .await
        .unwrap();
    ch.set_prefetch(Prefetch {
        count: 2,
        ..Prefetch::default()
    })
    .await
    .unwrap();
    for i in 0..5u8 {
        ch.publish(EXCHANGE_PERIL_TOPIC, "k.a", "application/json", &[i])
            .await
            .unwrap();
    }

    let mut stream = ch.consume("q").await.unwrap();
    assert_eq!(broker.unacked_count(), 2);
    assert_eq!(broker.queue_depth("q"), Some(3));

    let d = stream.next().await.unwrap().unwrap();
    assert_eq!(d.body(), &[0]);
    d.ack().await.unwrap();
    assert_eq!(broker.unacked_count(), 2);
    assert_eq!(broker.queue_depth("q"), Some(2));
}

#[tokio::test]
async fn test_prefetch_byte_ceiling_limits_outstanding_deliveries() {
    let (broker, ch) = setup().await;
    declare_and_bind(&ch, EXCHANGE_PERIL_TOPIC, "q", "k.*", Durability::Durable)
        .await
        .unwrap();
    ch.set_prefetch(Prefetch {
        count: 10,
        size: 10,
        global: false,
    })
    .await
    .unwrap();
    for _ in 0..3 {
        ch.publish(EXCHANGE_PERIL_TOPIC, "k.a", "application/json", &[0; 4])
            .await
            .unwrap();
    }
    ch.publish(EXCHANGE_PERIL_TOPIC, "k.a", "application/json", &[1; 32])
        .await
        .unwrap();

    let mut stream = ch.consume("q").await.unwrap();
    // 4 + 4 fits under 10 bytes, a third 4-byte message does not.
    assert_eq!(broker.unacked_count(), 2);
    assert_eq!(broker.queue_depth("q"), Some(2));

    for _ in 0..3 {
        stream.next().await.unwrap().unwrap().ack().await.unwrap();
    }
    // Bigger than the ceiling, but nothing else is outstanding.
    let big = stream.next().await.unwrap().unwrap();
    assert_eq!(big.body().len(), 32);
    assert_eq!(broker.queue_depth("q"), Some(0));
}

#[tokio::test]
async fn test_global_prefetch_is_shared_across_channel() {
    let (broker, ch) = setup().await;
    for (queue, key) in [("a", "a.*"), ("b", "b.*")] {
        declare_and_bind(&ch, EXCHANGE_PERIL_TOPIC, queue, key, Durability::Durable)
            .await
            .unwrap();
    }
    ch.set_prefetch(Prefetch {
        count: 1,
        size: 0,
        global: true,
    })
    .await
    .unwrap();
    for key in ["a.x", "b.x"] {
        ch.publish(EXCHANGE_PERIL_TOPIC, key, "application/json", b"1")
            .await
            .unwrap();
    }

    let mut from_a = ch.consume("a").await.unwrap();
    let _from_b = ch.consume("b").await.unwrap();
    assert_eq!(broker.unacked_count(), 1);
    assert_eq!(broker.queue_depth("b"), Some(1));

    // Freeing the channel's only slot lets queue b deliver.
    from_a.next().await.unwrap().unwrap().ack().await.unwrap();
    assert_eq!(broker.unacked_count(), 1);
    assert_eq!(broker.queue_depth("b"), Some(0));
}

#[tokio::test]
async fn test_double_resolution_is_rejected_by_broker() {
    // The trait makes double-acking impossible; the broker still rejects
    // stale tags, e.g. after the channel was closed underneath a delivery.
    let (broker, ch) = setup().await;
    declare_and_bind(&ch, EXCHANGE_PERIL_TOPIC, "q", "k.*", Durability::Durable)
        .await
        .unwrap();
    ch.publish(EXCHANGE_PERIL_TOPIC, "k.a", "application/json", b"x")
        .await
        .unwrap();
    let mut stream = ch.consume("q").await.unwrap();
    let d = stream.next().await.unwrap().unwrap();
    ch.close().await.unwrap();

    assert!(d.ack().await.is_err());
    // Closing the channel returned the message to the queue.
    assert_eq!(broker.queue_depth("q"), Some(1));
    assert!(broker.peek("q")[0].redelivered);
}

#[tokio::test]
async fn test_round_robin_between_consumers() {
    let (broker, ch) = setup().await;
    declare_and_bind(&ch, EXCHANGE_PERIL_TOPIC, "war", "war.*", Durability::Durable)
        .await
        .unwrap();
    let other = broker.connect().open_channel().await.unwrap();

    let mut a = ch.consume("war").await.unwrap();
    let mut b = other.consume("war").await.unwrap();
    for body in [b"1", b"2"] {
        ch.publish(EXCHANGE_PERIL_TOPIC, "war.x", "application/json", body)
            .await
            .unwrap();
    }
    let from_a = a.next().await.unwrap().unwrap();
    let from_b = b.next().await.unwrap().unwrap();
    assert_eq!(from_a.body(), b"1");
    assert_eq!(from_b.body(), b"2");
}
