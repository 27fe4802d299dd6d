//! Интеграционные тесты: push-событие проходит через ретранслятор до
//! страниц, клик возвращает пользователя в приложение, живая лента
//! наполняет доску уведомлений.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use noticelink::{
    bus::{BusClient, BusConfig, MemoryBroker},
    notice::{normalize_unread_count, user_topic, USER_QUEUE},
    relay::{NotificationData, NotificationRequest},
    ClickOutcome, NoticeBoard, NoticeFeed, NoticeKind, NotificationRelay, Notifier, PageEvent,
    PageRegistry, PageRoute, PageSignal, RelayError, RelayOptions,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

#[derive(Clone, Default)]
struct Recorder {
    shown: Arc<Mutex<Vec<NotificationRequest>>>,
}

#[async_trait]
impl Notifier for Recorder {
    async fn show(
        &self,
        request: &NotificationRequest,
    ) -> Result<(), RelayError> {
        self.shown.lock().push(request.clone());
        Ok(())
    }

    async fn close(
        &self,
        _tag: Option<&str>,
    ) -> Result<(), RelayError> {
        Ok(())
    }
}

/// Тест проверяет путь push -> страница -> доска: страница применяет
/// полученное уведомление к своей доске.
#[tokio::test]
async fn test_push_reaches_page_board() {
    let recorder = Recorder::default();
    let relay =
        NotificationRelay::new(RelayOptions::default(), recorder.clone(), PageRegistry::new());
    let mut page = relay.pages().open_page(Some("/notifications"));
    let mut board = NoticeBoard::new();

    let raw = json!({
        "type": "MESSAGE",
        "title": "Anna",
        "body": "See you at 7",
        "threadId": "12",
        "fromUserId": 3
    })
    .to_string();
    let request = relay.on_push_received(Some(raw.as_bytes())).await;
    assert_eq!(request.tag.as_deref(), Some("thread-12"));
    assert_eq!(request.data.url, "/messages?thread=12");

    while let Some(event) = page.try_recv() {
        match event {
            PageEvent::Signal(PageSignal::NoticeChanged { notice: Some(n) }) => board.prepend(n),
            PageEvent::Signal(PageSignal::UnreadChanged) => {
                board.set_unread(normalize_unread_count(&json!({"count": 1})))
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(board.items().len(), 1);
    assert_eq!(board.items()[0].kind, NoticeKind::Message);
    assert_eq!(board.items()[0].thread_id, Some(12));
    assert_eq!(board.unread(), 1);
    assert_eq!(recorder.shown.lock().len(), 1);
}

/// Тест проверяет, что клик пропускает закрытую страницу и фокусирует
/// следующую живую.
#[tokio::test]
async fn test_click_skips_closed_page() {
    let relay =
        NotificationRelay::new(RelayOptions::default(), Recorder::default(), PageRegistry::new());
    let closed = relay.pages().open_page(None);
    let mut alive = relay.pages().open_page(None);
    drop(closed);

    let data = NotificationData {
        url: "/messages?thread=5".into(),
        thread_id: Some("5".into()),
        kind: "MESSAGE".into(),
    };
    let outcome = relay.on_notification_clicked(&data).await;
    assert_eq!(
        outcome,
        ClickOutcome::FocusedExisting {
            page: alive.id().to_string()
        }
    );
    assert_eq!(
        alive.try_recv(),
        Some(
            PageRoute::OpenThread {
                thread_id: "5".into()
            }
            .into()
        )
    );
    assert_eq!(alive.focus_count(), 1);
}

/// Тест проверяет живую ленту поверх брокера: оба топика наполняют доску,
/// а после остановки сообщения больше не принимаются.
#[tokio::test]
async fn test_live_feed_over_memory_broker() {
    let broker = MemoryBroker::new();
    let config = BusConfig::default().with_heartbeat(Duration::ZERO, Duration::ZERO);
    let client = BusClient::new(config, broker.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut feed = NoticeFeed::new(client.clone(), tx);

    feed.start_live(Some(42)).await;
    let wait = Duration::from_secs(2);
    assert!(broker.wait_for_subscriptions(USER_QUEUE, 1, wait).await);
    assert!(broker.wait_for_subscriptions(&user_topic(42), 1, wait).await);

    broker.publish_json(USER_QUEUE, &json!({"id": 1, "type": "MATCH_REQUESTED"}));
    broker.publish_json(&user_topic(42), &json!({"id": 2, "type": "match_declined"}));
    for _ in 0..2 {
        tokio::time::timeout(wait, rx.recv()).await.unwrap().unwrap();
    }

    let board = feed.board();
    let ids: Vec<u64> = board.lock().items().iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![2, 1]);
    assert_eq!(board.lock().items()[0].kind, NoticeKind::MatchDeclined);

    feed.stop_live();
    assert!(broker.wait_for_subscriptions(USER_QUEUE, 0, wait).await);
    assert!(client.desired_topics().is_empty());
    client.shutdown().await;
}

/// Тест проверяет разные формы ответа счётчика непрочитанного.
#[test]
fn test_unread_shapes() {
    assert_eq!(normalize_unread_count(&json!({"count": 4})), 4);
    assert_eq!(normalize_unread_count(&json!({"unread": 2})), 2);
    assert_eq!(
        normalize_unread_count(&json!([{"unread": 1}, {"unread": 3}, {}])),
        4
    );
    assert_eq!(normalize_unread_count(&json!("oops")), 0);
}
