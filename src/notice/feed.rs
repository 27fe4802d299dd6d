//! Живая лента уведомлений страницы.
//!
//! Подписывает приватную очередь сессии и пользовательский топик, приводит
//! каждое сообщение к [`Notice`], кладёт его на доску и сообщает странице
//! сигналом [`PageSignal::NoticeChanged`].

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{Notice, NoticeBoard, PageEvent, PageSignal};
use crate::bus::{BusClient, SubscriptionHandle};

/// Приватная очередь уведомлений текущей сессии.
pub const USER_QUEUE: &str = "/user/queue/notice";

/// Пользовательский топик уведомлений.
pub fn user_topic(user_id: u64) -> String {
    format!("/topic/notice.user-{user_id}")
}

pub struct NoticeFeed {
    client: BusClient,
    board: Arc<Mutex<NoticeBoard>>,
    signals: mpsc::UnboundedSender<PageEvent>,
    queue: Option<SubscriptionHandle>,
    user: Option<SubscriptionHandle>,
}

impl NoticeFeed {
    pub fn new(
        client: BusClient,
        signals: mpsc::UnboundedSender<PageEvent>,
    ) -> Self {
        Self {
            client,
            board: Arc::new(Mutex::new(NoticeBoard::new())),
            signals,
            queue: None,
            user: None,
        }
    }

    /// Доска уведомлений, которую наполняет лента.
    pub fn board(&self) -> Arc<Mutex<NoticeBoard>> {
        self.board.clone()
    }

    pub fn is_live(&self) -> bool {
        self.queue.is_some()
    }

    /// Включает живые обновления. Повторный вызов ничего не делает.
    ///
    /// Неудачное подключение не мешает подпискам: они отложены и
    /// восстановятся при первом успешном подключении, а push всё равно
    /// подтолкнёт страницу.
    pub async fn start_live(
        &mut self,
        user_id: Option<u64>,
    ) {
        if self.is_live() {
            return;
        }
        if let Err(e) = self.client.connect().await {
            debug!(error = %e, "Bus not connected yet, notice subscriptions deferred");
        }

        self.queue = Some(self.subscribe(USER_QUEUE));
        if let Some(id) = user_id {
            self.user = Some(self.subscribe(&user_topic(id)));
        }
        info!(?user_id, "Live notices started");
    }

    /// Снимает обе подписки.
    pub fn stop_live(&mut self) {
        for handle in [self.queue.take(), self.user.take()].into_iter().flatten() {
            handle.unsubscribe();
        }
        info!("Live notices stopped");
    }

    fn subscribe(
        &self,
        topic: &str,
    ) -> SubscriptionHandle {
        let board = self.board.clone();
        let signals = self.signals.clone();
        self.client.subscribe_json(topic, move |raw| {
            if raw.is_null() {
                return;
            }
            let notice = Notice::normalize(&raw);
            debug!(id = notice.id, kind = %notice.kind, "Notice received");
            board.lock().prepend(notice.clone());
            let _ = signals.send(PageSignal::notice_changed(notice).into());
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::bus::{BusConfig, MemoryBroker};

    /// Тест проверяет подписку на оба топика и доставку сигнала.
    #[tokio::test]
    async fn test_start_live_and_receive() {
        let broker = MemoryBroker::new();
        let config = BusConfig::default().with_heartbeat(Duration::ZERO, Duration::ZERO);
        let client = BusClient::new(config, broker.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut feed = NoticeFeed::new(client.clone(), tx);

        feed.start_live(Some(7)).await;
        feed.start_live(Some(7)).await;
        assert!(feed.is_live());
        assert_eq!(
            client.desired_topics(),
            vec!["/topic/notice.user-7", USER_QUEUE]
        );
        assert!(
            broker
                .wait_for_subscriptions(&user_topic(7), 1, Duration::from_secs(1))
                .await
        );

        broker.publish_json(&user_topic(7), &json!({"id": 3, "type": "MATCH_ACCEPTED"}));
        let event = rx.recv().await.unwrap();
        match event {
            PageEvent::Signal(PageSignal::NoticeChanged { notice: Some(n) }) => {
                assert_eq!(n.id, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(feed.board().lock().unread(), 1);

        feed.stop_live();
        assert!(!feed.is_live());
        assert!(client.desired_topics().is_empty());
        client.shutdown().await;
    }
}
