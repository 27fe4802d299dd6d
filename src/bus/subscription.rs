use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use super::client::WeakCore;

/// Владение желаемой подпиской, возвращаемое `BusClient::subscribe_json`.
///
/// Уничтожение хэндла подписку НЕ снимает: желаемые подписки живут, пока
/// их явно не отменят через [`SubscriptionHandle::unsubscribe`].
#[must_use = "dropping the handle keeps the subscription; call unsubscribe() to cancel it"]
pub struct SubscriptionHandle {
    core: WeakCore,
    topic: String,
    handle_id: u64,
    released: AtomicBool,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        core: WeakCore,
        topic: &str,
        handle_id: u64,
    ) -> Self {
        Self {
            core,
            topic: topic.to_string(),
            handle_id,
            released: AtomicBool::new(false),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Отменяет подписку: убирает её из желаемых и, если она живая,
    /// отправляет UNSUBSCRIBE.
    ///
    /// Повторный вызов ничего не делает. Безопасен в любой момент, в том
    /// числе во время переподключения и после остановки клиента. Если топик
    /// с тех пор был перерегистрирован другим вызовом, новая подписка не
    /// затрагивается.
    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(core) = self.core.upgrade() {
            core.release(&self.topic, self.handle_id);
        }
    }

    /// Не вызывался ли ещё `unsubscribe`.
    pub fn is_active(&self) -> bool {
        !self.released.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::bus::{memory::MemoryBroker, BusClient, BusConfig};

    fn config() -> BusConfig {
        BusConfig::default().with_heartbeat(Duration::ZERO, Duration::ZERO)
    }

    /// Тест проверяет, что двойная отписка равна одинарной.
    #[tokio::test]
    async fn test_double_unsubscribe() {
        let broker = MemoryBroker::new();
        let client = BusClient::new(config(), broker.clone());
        let handle = client.subscribe_json("/topic/a", |_| {});
        client.connect().await.unwrap();
        assert!(
            broker
                .wait_for_subscriptions("/topic/a", 1, Duration::from_secs(1))
                .await
        );

        handle.unsubscribe();
        handle.unsubscribe();
        assert!(!handle.is_active());
        assert!(client.desired_topics().is_empty());
        assert!(client.live_topics().is_empty());
        assert!(
            broker
                .wait_for_subscriptions("/topic/a", 0, Duration::from_secs(1))
                .await
        );
        client.shutdown().await;
    }

    /// Тест проверяет, что устаревший хэндл не снимает новую подписку.
    #[tokio::test]
    async fn test_stale_handle_keeps_new_subscription() {
        let client = BusClient::new(config(), MemoryBroker::new());
        let first = client.subscribe_json("/topic/a", |_| {});
        let second = client.subscribe_json("/topic/a", |_| {});
        first.unsubscribe();
        assert_eq!(client.desired_topics(), vec!["/topic/a"]);
        second.unsubscribe();
        assert!(client.desired_topics().is_empty());
        client.shutdown().await;
    }

    /// Тест проверяет отписку после уничтожения клиента.
    #[tokio::test]
    async fn test_unsubscribe_after_client_dropped() {
        let client = BusClient::new(config(), MemoryBroker::new());
        let handle = client.subscribe_json("/topic/a", |_| {});
        drop(client);
        handle.unsubscribe();
        assert!(!handle.is_active());
    }
}
