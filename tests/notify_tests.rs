use std::time::Duration;
use terramark_engine::NotificationHub;

#[tokio::test]
async fn test_immediate_delivery_to_attached_listener() {
    let hub = NotificationHub::new(32);
    let mut rx = hub.subscribe("session-1");

    hub.notify("session-1", r#"{"type":"image_ready","image_id":"img-1"}"#);
    let message = rx.recv().await.unwrap();
    let doc: serde_json::Value = serde_json::from_str(&message).unwrap();
    assert_eq!(doc["type"], "image_ready");
}

#[tokio::test]
async fn test_queued_messages_flush_in_order_on_subscribe() {
    let hub = NotificationHub::new(32);
    for i in 0..5 {
        hub.notify("session-1", format!("msg-{}", i));
    }
    assert_eq!(hub.pending_count("session-1"), 5);

    let mut rx = hub.subscribe("session-1");
    for i in 0..5 {
        assert_eq!(rx.recv().await.unwrap(), format!("msg-{}", i));
    }
    assert_eq!(hub.pending_count("session-1"), 0);

    // New messages keep flowing through the now-attached listener
    hub.notify("session-1", "live");
    assert_eq!(rx.recv().await.unwrap(), "live");
}

#[tokio::test]
async fn test_backlog_bound_drops_oldest_first() {
    let hub = NotificationHub::new(3);
    for i in 0..10 {
        hub.notify("session-1", format!("msg-{}", i));
    }
    assert_eq!(hub.pending_count("session-1"), 3);

    let mut rx = hub.subscribe("session-1");
    assert_eq!(rx.recv().await.unwrap(), "msg-7");
    assert_eq!(rx.recv().await.unwrap(), "msg-8");
    assert_eq!(rx.recv().await.unwrap(), "msg-9");
}

#[tokio::test]
async fn test_per_session_channels_are_independent() {
    let hub = NotificationHub::new(32);
    let mut rx_a = hub.subscribe("session-a");
    hub.notify("session-a", "for a");
    hub.notify("session-b", "for b");

    assert_eq!(rx_a.recv().await.unwrap(), "for a");
    assert_eq!(hub.pending_count("session-b"), 1);
    assert_eq!(hub.pending_count("session-a"), 0);

    let mut rx_b = hub.subscribe("session-b");
    assert_eq!(rx_b.recv().await.unwrap(), "for b");
}

#[tokio::test]
async fn test_unsubscribe_then_notify_queues_again() {
    let hub = NotificationHub::new(32);
    let mut rx = hub.subscribe("session-1");
    hub.notify("session-1", "one");
    assert_eq!(rx.recv().await.unwrap(), "one");

    hub.unsubscribe("session-1");
    hub.notify("session-1", "two");
    assert_eq!(hub.pending_count("session-1"), 1);

    let mut rx = hub.subscribe("session-1");
    assert_eq!(rx.recv().await.unwrap(), "two");
}

#[tokio::test]
async fn test_notify_survives_dropped_receiver() {
    let hub = NotificationHub::new(32);
    let rx = hub.subscribe("session-1");
    drop(rx);

    // No listener anymore; the hub falls back to queueing
    hub.notify("session-1", "orphaned");
    assert_eq!(hub.pending_count("session-1"), 1);

    let mut rx = hub.subscribe("session-1");
    let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message, "orphaned");
}
