mod support;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;

use support::venue::ScriptedVenue;
use support::wait_for;
use tradewire::adapter::outbound::jsonl::JsonLinesStore;
use tradewire::application::recorder::Recorder;
use tradewire::application::{EventBus, Gateway};
use tradewire::domain::{OrderSide, OrderSpec, TopicKind, Venue};
use tradewire::port::{Collection, EventBridge, RecordStore};
use tradewire::testkit::bridge::RecordingBridge;
use tradewire::testkit::config;
use tradewire::testkit::domain::{fill_report, instrument};
use tradewire::testkit::session::{order_frame, trade_frame};

#[tokio::test]
async fn bridge_receives_published_subjects() {
    let bridge = Arc::new(RecordingBridge::new());
    let shared: Arc<dyn EventBridge> = bridge.clone();
    let gateway = Gateway::new(
        EventBus::with_bridge(64, 64, shared),
        config::reconnection(),
        config::orders(),
    );
    let venue = ScriptedVenue::new(Venue::Binance);
    venue.start(&gateway).await;
    let _stream = gateway
        .subscribe_market_data(Venue::Binance, instrument("ETH/USDT"), &[TopicKind::Trades])
        .await
        .unwrap();

    venue.public.push_frame(trade_frame(Venue::Binance, "ETH/USDT"));
    wait_for("bridged trade", || {
        bridge
            .subjects()
            .iter()
            .any(|subject| subject == "binance.trades.ETH/USDT")
    })
    .await;
    assert!(bridge
        .subjects()
        .iter()
        .any(|subject| subject == "binance.connection.all"));

    gateway.stop_all().await;
}

#[tokio::test]
async fn failing_bridge_does_not_block_subscribers() {
    let bridge = Arc::new(RecordingBridge::failing());
    let shared: Arc<dyn EventBridge> = bridge.clone();
    let gateway = Gateway::new(
        EventBus::with_bridge(64, 64, shared),
        config::reconnection(),
        config::orders(),
    );
    let venue = ScriptedVenue::new(Venue::Binance);
    venue.start(&gateway).await;
    let mut stream = gateway
        .subscribe_market_data(Venue::Binance, instrument("ETH/USDT"), &[TopicKind::Trades])
        .await
        .unwrap();

    venue.public.push_frame(trade_frame(Venue::Binance, "ETH/USDT"));
    let delivery = stream.recv().await.unwrap();
    assert_eq!(delivery.event().unwrap().sequence, 1);
    wait_for("bridge failures counted", || gateway.bus_stats().bridge_failures > 0).await;

    gateway.stop_all().await;
}

#[tokio::test]
async fn orders_and_events_are_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonLinesStore::open(dir.path()).await.unwrap());
    let shared: Arc<dyn RecordStore> = store.clone();
    let (recorder, _task) = Recorder::spawn(shared, 256);
    let gateway = support::gateway(64).with_recorder(recorder);
    let venue = ScriptedVenue::new(Venue::Binance);
    venue.start(&gateway).await;

    let spec = OrderSpec::limit(
        Venue::Binance,
        instrument("BTC/USDT"),
        OrderSide::Sell,
        dec!(2),
        dec!(99),
    );
    let handle = gateway.submit_order(spec).await.unwrap();
    let order = gateway.order(&handle).unwrap();
    venue.private.push_frame(order_frame(
        Venue::Binance,
        &fill_report(&order, dec!(2), Some(dec!(99)), Some(dec!(99))),
    ));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let orders = store.recent(Collection::Orders, 10).await.unwrap();
        let filled = orders
            .last()
            .is_some_and(|record| record["filled_quantity"] == serde_json::json!("2"));
        if filled {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "fill never recorded");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let orders = store.recent(Collection::Orders, 10).await.unwrap();
    assert!(orders.len() >= 3, "expected submit, ack and fill records");
    let events = store.recent(Collection::Events, 100).await.unwrap();
    assert!(!events.is_empty());

    gateway.stop_all().await;
}
