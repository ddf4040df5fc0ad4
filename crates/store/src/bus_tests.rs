// SPDX-License-Identifier: MIT

use super::*;
use wsi_core::EntityKind;

fn ev(n: u32) -> Event {
    Event { entity_kind: EntityKind::Job, entity_id: "job-1".into(), state: "running".into(), progress: n as f64 / 10.0, tiles_done: n, tiles_total: 10, reason: None, at_epoch_ms: n as u64 }
}

#[tokio::test]
async fn subscriber_receives_events_in_publish_order() {
    let bus = EventBus::new(DEFAULT_BUFFER);
    let mut sub = bus.subscribe("job-1");
    bus.publish("job-1", ev(1));
    bus.publish("job-1", ev(2));
    bus.publish("job-1", ev(3));

    assert_eq!(sub.recv().await.unwrap().tiles_done, 1);
    assert_eq!(sub.recv().await.unwrap().tiles_done, 2);
    assert_eq!(sub.recv().await.unwrap().tiles_done, 3);
}

#[tokio::test]
async fn publish_with_no_subscribers_does_not_panic_or_block() {
    let bus = EventBus::new(DEFAULT_BUFFER);
    bus.publish("job-none", ev(1));
}

#[tokio::test]
async fn distinct_entities_do_not_cross_streams() {
    let bus = EventBus::new(DEFAULT_BUFFER);
    let mut sub_a = bus.subscribe("job-a");
    let mut sub_b = bus.subscribe("job-b");
    bus.publish("job-a", ev(1));

    assert_eq!(sub_a.recv().await.unwrap().tiles_done, 1);
    assert!(tokio::time::timeout(std::time::Duration::from_millis(20), sub_b.recv()).await.is_err());
}

#[tokio::test]
async fn slow_subscriber_lags_instead_of_blocking_publisher() {
    let bus = EventBus::new(2);
    let mut sub = bus.subscribe("job-1");
    // Overflow the tiny buffer; publish must never block regardless of capacity.
    for n in 0..10 {
        bus.publish("job-1", ev(n));
    }
    // The lagging subscriber still eventually gets *some* later event rather
    // than hanging forever.
    let got = tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv()).await;
    assert!(got.is_ok());
}

#[tokio::test]
async fn multiple_subscribers_each_get_every_event() {
    let bus = EventBus::new(DEFAULT_BUFFER);
    let mut a = bus.subscribe("job-1");
    let mut b = bus.subscribe("job-1");
    bus.publish("job-1", ev(7));
    assert_eq!(a.recv().await.unwrap().tiles_done, 7);
    assert_eq!(b.recv().await.unwrap().tiles_done, 7);
}
