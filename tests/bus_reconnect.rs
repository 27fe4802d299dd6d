//! Интеграционные тесты клиента шины поверх брокера в памяти:
//! переподключение, восстановление подписок, heart-beat.

use std::time::Duration;

use noticelink::{
    bus::{BusClient, BusConfig, ConnectionState, MemoryBroker, ReconnectPolicy},
    BusError, StatusCode,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(2);

fn config() -> BusConfig {
    BusConfig::default()
        .with_heartbeat(Duration::ZERO, Duration::ZERO)
        .with_reconnect(ReconnectPolicy::Fixed(Duration::from_millis(20)))
        .with_connect_timeout(Duration::from_secs(1))
}

fn collector() -> (
    impl Fn(Value) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Value>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (move |v: Value| drop(tx.send(v)), rx)
}

/// Тест проверяет, что после обрыва клиент переподключается и восстанавливает
/// подписку, а сообщения снова доходят до обработчика.
#[tokio::test]
async fn test_reconnect_restores_subscriptions() {
    let broker = MemoryBroker::new();
    let client = BusClient::new(config(), broker.clone());
    let (handler, mut rx) = collector();
    let _sub = client.subscribe_json("/topic/notice.user-1", handler);

    client.connect().await.unwrap();
    assert!(broker.wait_for_subscriptions("/topic/notice.user-1", 1, WAIT).await);
    assert_eq!(broker.open_count(), 1);

    broker.drop_all();
    assert_eq!(broker.subscription_count("/topic/notice.user-1"), 0);
    assert!(broker.wait_for_subscriptions("/topic/notice.user-1", 1, WAIT).await);
    assert_eq!(broker.open_count(), 2);
    client.wait_for_state(ConnectionState::Connected).await;
    assert_eq!(client.live_topics(), vec!["/topic/notice.user-1"]);

    assert_eq!(broker.publish_json("/topic/notice.user-1", &json!({"id": 5})), 1);
    let got = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(got["id"], 5);

    client.shutdown().await;
}

/// Тест проверяет, что отписка во время обрыва не восстанавливается после
/// переподключения.
#[tokio::test]
async fn test_unsubscribe_while_disconnected() {
    let broker = MemoryBroker::new();
    let client = BusClient::new(config(), broker.clone());
    let (keep_handler, _keep_rx) = collector();
    let (drop_handler, _drop_rx) = collector();
    let _keep = client.subscribe_json("/topic/keep", keep_handler);
    let gone = client.subscribe_json("/topic/gone", drop_handler);

    client.connect().await.unwrap();
    assert!(broker.wait_for_subscriptions("/topic/gone", 1, WAIT).await);

    broker.drop_all();
    gone.unsubscribe();
    assert!(!gone.is_active());

    assert!(broker.wait_for_subscriptions("/topic/keep", 1, WAIT).await);
    assert_eq!(broker.subscription_count("/topic/gone"), 0);
    assert_eq!(client.desired_topics(), vec!["/topic/keep"]);

    client.shutdown().await;
}

/// Тест проверяет, что сообщение с телом не-JSON не мешает следующему.
#[tokio::test]
async fn test_malformed_body_then_valid_message() {
    let broker = MemoryBroker::new();
    let client = BusClient::new(config(), broker.clone());
    let (handler, mut rx) = collector();
    let _sub = client.subscribe_json("/user/queue/notice", handler);

    client.connect().await.unwrap();
    assert!(broker.wait_for_subscriptions("/user/queue/notice", 1, WAIT).await);

    assert_eq!(broker.publish("/user/queue/notice", "not json at all"), 1);
    assert_eq!(broker.publish("/user/queue/notice", "{\"id\": 9}"), 1);

    let got = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(got["id"], 9);
    assert!(rx.try_recv().is_err());
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(broker.open_count(), 1);

    client.shutdown().await;
}

/// Тест проверяет, что испорченный кадр рвёт сессию, после чего клиент
/// переподключается и продолжает доставку.
#[tokio::test]
async fn test_garbled_frame_forces_reconnect() {
    let broker = MemoryBroker::new();
    let client = BusClient::new(config(), broker.clone());
    let (handler, mut rx) = collector();
    let _sub = client.subscribe_json("/topic/t", handler);

    client.connect().await.unwrap();
    assert!(broker.wait_for_subscriptions("/topic/t", 1, WAIT).await);

    broker.send_raw("NOT-A-COMMAND\n\n\0");
    assert!(broker.wait_until(WAIT, |b| b.open_count() == 2).await);
    assert!(broker.wait_for_subscriptions("/topic/t", 1, WAIT).await);

    broker.publish_json("/topic/t", &json!({"ok": true}));
    let got = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(got["ok"], true);

    client.shutdown().await;
}

/// Тест проверяет отправку heart-beat и разрыв по тишине брокера.
#[tokio::test(start_paused = true)]
async fn test_heartbeat_sent_and_silence_detected() {
    let broker = MemoryBroker::new();
    broker.set_server_heart_beat("50,50");
    let config = BusConfig::default()
        .with_heartbeat(Duration::from_millis(100), Duration::from_millis(100))
        .with_reconnect(ReconnectPolicy::Fixed(Duration::from_millis(500)));
    let client = BusClient::new(config, broker.clone());

    client.connect().await.unwrap();
    assert!(broker.wait_until(WAIT, |b| b.heartbeats_received() >= 1).await);

    // брокер молчит: через 2 интервала клиент считает соединение мёртвым
    assert!(broker.wait_until(WAIT, |b| b.open_count() == 2).await);
    client.wait_for_state(ConnectionState::Connected).await;

    client.shutdown().await;
}

/// Тест проверяет исход `connect()` при отключённых повторах и недоступном
/// брокере.
#[tokio::test]
async fn test_connect_failure_without_retry() {
    let broker = MemoryBroker::new();
    broker.refuse_next(1);
    let client = BusClient::new(
        config().with_reconnect(ReconnectPolicy::Disabled),
        broker.clone(),
    );

    let err = client.connect().await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::ConnectionFailed);
    assert!(matches!(
        err.downcast_ref::<BusError>(),
        Some(BusError::ConnectionFailed { .. })
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

/// Тест проверяет, что после shutdown клиент не подключается снова.
#[tokio::test]
async fn test_shutdown_is_final() {
    let broker = MemoryBroker::new();
    let client = BusClient::new(config(), broker.clone());
    client.connect().await.unwrap();
    client.shutdown().await;
    assert!(broker.wait_until(WAIT, |b| b.active_sessions() == 0).await);

    let err = client.connect().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BusError>(),
        Some(BusError::Shutdown)
    ));
    assert_eq!(broker.open_count(), 1);
}
