//! Block subscriber behaviour over the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use gamesync_runtime::{
    BlockListener, BlockNotification, BlockSubscriber, MemoryTransport, NotificationPublisher,
    SubscriberConfig,
};
use gamesync_types::BlockEventKind;

const ENDPOINT: &str = "memory://subscriber-test";
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Forwards every notification, tagged with the listener's name.
struct Recorder {
    name: &'static str,
    tx: mpsc::UnboundedSender<(&'static str, BlockNotification)>,
}

#[async_trait]
impl BlockListener for Recorder {
    async fn block_attach(&mut self, notification: &BlockNotification) {
        assert_eq!(notification.kind, BlockEventKind::Attach);
        let _ = self.tx.send((self.name, notification.clone()));
    }

    async fn block_detach(&mut self, notification: &BlockNotification) {
        assert_eq!(notification.kind, BlockEventKind::Detach);
        let _ = self.tx.send((self.name, notification.clone()));
    }
}

struct Fixture {
    subscriber: BlockSubscriber,
    publisher: NotificationPublisher,
    tx: mpsc::UnboundedSender<(&'static str, BlockNotification)>,
    rx: mpsc::UnboundedReceiver<(&'static str, BlockNotification)>,
}

impl Fixture {
    fn new(config: SubscriberConfig) -> Self {
        let transport = MemoryTransport::new();
        let mut subscriber = BlockSubscriber::new(Arc::new(transport.clone()), config);
        subscriber.set_endpoint(ENDPOINT);
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            subscriber,
            publisher: transport.publisher(ENDPOINT),
            tx,
            rx,
        }
    }

    fn listen(&mut self, game_id: &str, name: &'static str) {
        self.subscriber.add_listener(
            game_id,
            Box::new(Recorder {
                name,
                tx: self.tx.clone(),
            }),
        );
    }

    async fn next(&mut self) -> (&'static str, BlockNotification) {
        tokio::time::timeout(RECV_TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for a notification")
            .expect("listener channel closed")
    }

    /// Let the worker drain everything published so far.
    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_listener_receives_decoded_notifications() {
    let mut fx = Fixture::new(SubscriberConfig::default());
    fx.listen("game", "main");
    fx.subscriber.start().unwrap();

    let payload = json!({"block": {"height": 1}, "moves": [{"name": "domob"}]});
    fx.publisher
        .publish_with_seq(BlockEventKind::Attach, "game", &payload, 42)
        .unwrap();
    fx.publisher
        .publish_with_seq(BlockEventKind::Detach, "game", &json!({"x": 1}), 7)
        .unwrap();

    let (_, attach) = fx.next().await;
    assert_eq!(attach.game_id, "game");
    assert_eq!(attach.kind, BlockEventKind::Attach);
    assert_eq!(attach.payload, payload);
    assert_eq!(attach.seq, 42);
    assert!(!attach.seq_mismatch);

    let (_, detach) = fx.next().await;
    assert_eq!(detach.kind, BlockEventKind::Detach);
    assert_eq!(detach.payload, json!({"x": 1}));
    assert_eq!(detach.seq, 7);

    fx.subscriber.stop().await;
}

#[tokio::test]
async fn test_sequence_decoded_little_endian() {
    let mut fx = Fixture::new(SubscriberConfig::default());
    fx.listen("game", "main");
    fx.subscriber.start().unwrap();

    fx.publisher
        .publish_raw(vec![
            b"game-block-attach json game".to_vec(),
            b"{}".to_vec(),
            vec![42, 1, 0, 5],
        ])
        .unwrap();

    let (_, notification) = fx.next().await;
    assert_eq!(notification.seq, 42 + 0x0500_0100);
    fx.subscriber.stop().await;
}

#[tokio::test]
async fn test_unregistered_topics_are_ignored() {
    let mut fx = Fixture::new(SubscriberConfig::default());
    fx.listen("game", "main");
    fx.subscriber.start().unwrap();

    // Another game, a game whose id merely starts with ours, and a foreign
    // topic; none of them reaches the listener.
    fx.publisher
        .publish(BlockEventKind::Attach, "other", &json!({}))
        .unwrap();
    fx.publisher
        .publish(BlockEventKind::Attach, "gamex", &json!({}))
        .unwrap();
    fx.publisher
        .publish_raw(vec![b"hashblock".to_vec(), vec![], vec![0; 4]])
        .unwrap();
    fx.publisher
        .publish(BlockEventKind::Attach, "game", &json!({"ok": true}))
        .unwrap();

    let (_, notification) = fx.next().await;
    assert_eq!(notification.payload, json!({"ok": true}));

    fx.subscriber.stop().await;
    assert!(fx.rx.try_recv().is_err());
}

#[tokio::test]
async fn test_sequence_gaps_are_flagged() {
    let mut fx = Fixture::new(SubscriberConfig::default());
    fx.listen("game", "main");
    fx.subscriber.start().unwrap();

    let payload = json!({});
    fx.publisher
        .publish(BlockEventKind::Attach, "game", &payload)
        .unwrap();
    fx.publisher
        .publish(BlockEventKind::Attach, "game", &payload)
        .unwrap();
    fx.publisher.skip(BlockEventKind::Attach, "game", 1).unwrap();
    fx.publisher
        .publish(BlockEventKind::Attach, "game", &payload)
        .unwrap();
    fx.publisher
        .publish(BlockEventKind::Attach, "game", &payload)
        .unwrap();

    let mut flags = Vec::new();
    for _ in 0..4 {
        let (_, notification) = fx.next().await;
        flags.push((notification.seq, notification.seq_mismatch));
    }
    assert_eq!(flags, vec![(0, false), (1, false), (3, true), (4, false)]);

    fx.subscriber.stop().await;
    assert_eq!(
        fx.subscriber
            .last_sequence("game", BlockEventKind::Attach),
        Some(4)
    );
    assert_eq!(
        fx.subscriber
            .last_sequence("game", BlockEventKind::Detach),
        None
    );
}

#[tokio::test]
async fn test_two_games_have_independent_sequences() {
    let mut fx = Fixture::new(SubscriberConfig::default());
    fx.listen("a", "a");
    fx.listen("b", "b");
    fx.subscriber.start().unwrap();

    for _ in 0..3 {
        for game in ["a", "b"] {
            fx.publisher
                .publish(BlockEventKind::Attach, game, &json!({}))
                .unwrap();
        }
    }

    let mut received = Vec::new();
    for _ in 0..6 {
        let (name, notification) = fx.next().await;
        assert_eq!(name, notification.game_id);
        assert!(!notification.seq_mismatch);
        received.push((name, notification.seq));
    }
    assert_eq!(
        received,
        vec![("a", 0), ("b", 0), ("a", 1), ("b", 1), ("a", 2), ("b", 2)]
    );

    fx.subscriber.stop().await;
}

#[tokio::test]
async fn test_multiple_listeners_after_restart() {
    let mut fx = Fixture::new(SubscriberConfig::default());
    fx.listen("game", "first");
    fx.subscriber.start().unwrap();

    fx.publisher
        .publish(BlockEventKind::Attach, "game", &json!({}))
        .unwrap();
    assert_eq!(fx.next().await.0, "first");

    fx.subscriber.stop().await;
    fx.listen("game", "second");
    fx.listen("other", "other");
    fx.subscriber.start().unwrap();

    fx.publisher
        .publish(BlockEventKind::Attach, "game", &json!({}))
        .unwrap();
    fx.publisher
        .publish(BlockEventKind::Detach, "other", &json!({}))
        .unwrap();

    let (first, n1) = fx.next().await;
    let (second, n2) = fx.next().await;
    assert_eq!((first, second), ("first", "second"));
    assert_eq!(n1, n2);
    // Sequence state survived the restart.
    assert_eq!(n1.seq, 1);
    assert!(!n1.seq_mismatch);

    let (other, n3) = fx.next().await;
    assert_eq!(other, "other");
    assert_eq!(n3.kind, BlockEventKind::Detach);

    fx.subscriber.stop().await;
}

#[tokio::test]
async fn test_stop_while_waiting_for_messages() {
    let mut fx = Fixture::new(SubscriberConfig::default());
    fx.listen("game", "main");
    fx.subscriber.start().unwrap();
    fx.settle().await;

    tokio::time::timeout(RECV_TIMEOUT, fx.subscriber.stop())
        .await
        .expect("stop should not wait for a message");
    assert!(!fx.subscriber.is_running());
}

#[tokio::test]
async fn test_suppressed_dispatch_still_tracks_sequences() {
    let mut fx = Fixture::new(SubscriberConfig {
        suppress_dispatch: true,
    });
    fx.listen("game", "main");
    fx.subscriber.start().unwrap();

    for _ in 0..3 {
        fx.publisher
            .publish(BlockEventKind::Attach, "game", &json!({}))
            .unwrap();
    }
    fx.settle().await;
    fx.subscriber.stop().await;

    assert!(fx.rx.try_recv().is_err());
    assert_eq!(
        fx.subscriber
            .last_sequence("game", BlockEventKind::Attach),
        Some(2)
    );
}

#[tokio::test]
#[should_panic(expected = "error parsing notification payload")]
async fn test_invalid_json_is_fatal() {
    let mut fx = Fixture::new(SubscriberConfig::default());
    fx.listen("game", "main");
    fx.subscriber.start().unwrap();

    fx.publisher
        .publish_raw(vec![
            b"game-block-attach json game".to_vec(),
            b"{invalid".to_vec(),
            vec![0; 4],
        ])
        .unwrap();
    fx.settle().await;
    fx.subscriber.stop().await;
}

#[tokio::test]
#[should_panic(expected = "expected exactly three message parts")]
async fn test_missing_frame_is_fatal() {
    let mut fx = Fixture::new(SubscriberConfig::default());
    fx.listen("game", "main");
    fx.subscriber.start().unwrap();

    fx.publisher
        .publish_raw(vec![b"game-block-attach json game".to_vec(), b"{}".to_vec()])
        .unwrap();
    fx.settle().await;
    fx.subscriber.stop().await;
}

#[tokio::test]
#[should_panic(expected = "sequence number should have size 4")]
async fn test_wrong_sequence_size_is_fatal() {
    let mut fx = Fixture::new(SubscriberConfig::default());
    fx.listen("game", "main");
    fx.subscriber.start().unwrap();

    fx.publisher
        .publish_raw(vec![
            b"game-block-attach json game".to_vec(),
            b"{}".to_vec(),
            vec![0; 8],
        ])
        .unwrap();
    fx.settle().await;
    fx.subscriber.stop().await;
}

#[tokio::test]
#[should_panic(expected = "running subscriber")]
async fn test_add_listener_while_running_panics() {
    let mut fx = Fixture::new(SubscriberConfig::default());
    fx.subscriber.start().unwrap();
    fx.listen("game", "main");
}
