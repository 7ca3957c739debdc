//! Supervisor feed through the dispatcher into the store and notifications.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedTransport, watch_list};
use polymarket_ingest::application::ports::{BookStorePort, IngestionControl, NotificationPort};
use polymarket_ingest::application::services::EventDispatcher;
use polymarket_ingest::domain::book::EventKind;
use polymarket_ingest::domain::subscription::DesiredSet;
use polymarket_ingest::infrastructure::broadcast::NotificationHub;
use polymarket_ingest::infrastructure::polymarket::{Supervisor, SupervisorConfig};
use polymarket_ingest::infrastructure::store::InMemoryBookStore;
use polymarket_ingest::ConnectionState;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn book_events_are_stored_and_deltas_published() {
    let (transport, script) = ScriptedTransport::new();
    let (feed_tx, feed_rx) = mpsc::channel(1024);
    let cancel = CancellationToken::new();
    let (supervisor, handle) = Supervisor::new(
        transport,
        watch_list(&[]),
        SupervisorConfig::default(),
        feed_tx,
        cancel.clone(),
    );
    let status = handle.status();

    let store = Arc::new(InMemoryBookStore::new());
    let hub = Arc::new(NotificationHub::with_defaults());
    let mut notifications = hub.subscribe();
    let dispatcher = EventDispatcher::new(
        Arc::clone(&store) as Arc<dyn BookStorePort>,
        Arc::clone(&hub) as Arc<dyn NotificationPort>,
    );

    tokio::spawn(supervisor.run());
    let dispatch_task = tokio::spawn(dispatcher.run(feed_rx, cancel.clone()));

    handle.activate(DesiredSet::from_ids(["X"])).await.unwrap();
    while status.state() != ConnectionState::Listening {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    script.deliver_json(json!([
        {
            "event_type": "book",
            "asset_id": "X",
            "market": "0xabc",
            "bids": [{"price": "0.40", "size": "100"}],
            "asks": [{"price": "0.42", "size": "100"}]
        },
        {
            "event_type": "price_change",
            "asset_id": "X",
            "market": "0xabc",
            "changes": [{"side": "BUY", "price": "0.41", "size": "5"}]
        }
    ]));

    let notification = notifications.recv().await.unwrap();
    assert_eq!(notification.topic, "markets.X");
    assert_eq!(notification.payload.event_type, "price_change");
    assert_eq!(notification.payload.data["market"], "0xabc");

    let records = store.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].event.kind, EventKind::Book);
    assert_eq!(records[1].event.kind, EventKind::PriceChange);
    assert_eq!(records[0].market_id.as_deref(), Some("0xabc"));

    cancel.cancel();
    let stats = dispatch_task.await.unwrap();
    assert_eq!(stats.events, 2);
    assert_eq!(stats.published, 1);
    assert_eq!(stats.store_failures, 0);
}
