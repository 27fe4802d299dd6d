//! Реестр подписок: желаемые (desired) и живые (live).
//!
//! Желаемые подписки — источник истины: что должно быть подписано, пока
//! вызывающий код сам не отпишется. Живые существуют только при открытом
//! соединении и всегда являются подмножеством желаемых. При обрыве живые
//! очищаются целиком, при каждом успешном подключении строятся заново из
//! желаемых.
//!
//! Реестр синхронный и ничего не отправляет сам: методы возвращают кадры,
//! которые клиент должен передать в транспорт.

use std::{collections::HashMap, fmt, sync::Arc};

use serde_json::Value;

use super::stomp::Frame;

/// Обработчик JSON-сообщений топика.
pub type Handler = Arc<dyn Fn(Value) + Send + Sync>;

struct Desired {
    handle_id: u64,
    handler: Handler,
}

struct Live {
    stomp_id: String,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    desired: HashMap<String, Desired>,
    live: HashMap<String, Live>,
    /// STOMP id подписки -> топик
    by_stomp_id: HashMap<String, String>,
    next_id: u64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Записывает желаемую подписку и возвращает id её владельца.
    ///
    /// Повторная регистрация того же топика заменяет обработчик; живая
    /// подписка, если есть, сохраняется.
    pub fn register(
        &mut self,
        topic: &str,
        handler: Handler,
    ) -> u64 {
        let handle_id = self.bump();
        self.desired
            .insert(topic.to_string(), Desired { handle_id, handler });
        handle_id
    }

    /// Делает желаемую подписку живой. Возвращает кадр SUBSCRIBE или `None`,
    /// если топик не желаемый или уже живой.
    pub fn activate(
        &mut self,
        topic: &str,
    ) -> Option<Frame> {
        if !self.desired.contains_key(topic) || self.live.contains_key(topic) {
            return None;
        }
        let stomp_id = format!("sub-{}", self.bump());
        self.by_stomp_id.insert(stomp_id.clone(), topic.to_string());
        let frame = Frame::subscribe(&stomp_id, topic);
        self.live.insert(topic.to_string(), Live { stomp_id });
        Some(frame)
    }

    /// Удаляет желаемую подписку, если она всё ещё принадлежит `handle_id`.
    ///
    /// Возвращает `None`, если удалять нечего (уже отписан или топик
    /// перерегистрирован), иначе `Some` с кадром UNSUBSCRIBE, когда была
    /// живая подписка.
    pub fn remove(
        &mut self,
        topic: &str,
        handle_id: u64,
    ) -> Option<Option<Frame>> {
        match self.desired.get(topic) {
            Some(d) if d.handle_id == handle_id => {}
            _ => return None,
        }
        self.desired.remove(topic);
        let frame = self.live.remove(topic).map(|live| {
            self.by_stomp_id.remove(&live.stomp_id);
            Frame::unsubscribe(&live.stomp_id)
        });
        Some(frame)
    }

    /// Кадры SUBSCRIBE для всех желаемых топиков, которые ещё не живые.
    pub fn resubscribe_all(&mut self) -> Vec<Frame> {
        let mut topics: Vec<String> = self.desired.keys().cloned().collect();
        topics.sort();
        topics
            .iter()
            .filter_map(|topic| self.activate(topic))
            .collect()
    }

    /// Забывает все живые подписки (соединение потеряно).
    pub fn clear_live(&mut self) {
        self.live.clear();
        self.by_stomp_id.clear();
    }

    /// Находит топик и текущий обработчик по STOMP id подписки.
    pub fn route(
        &self,
        stomp_id: &str,
    ) -> Option<(String, Handler)> {
        let topic = self.by_stomp_id.get(stomp_id)?;
        let desired = self.desired.get(topic)?;
        Some((topic.clone(), desired.handler.clone()))
    }

    pub fn is_desired(
        &self,
        topic: &str,
    ) -> bool {
        self.desired.contains_key(topic)
    }

    pub fn desired_topics(&self) -> Vec<String> {
        sorted(self.desired.keys())
    }

    pub fn live_topics(&self) -> Vec<String> {
        sorted(self.live.keys())
    }

    fn bump(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn sorted<'a>(keys: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut out: Vec<String> = keys.cloned().collect();
    out.sort();
    out
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("desired", &self.desired_topics())
            .field("live", &self.live_topics())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::bus::stomp::Command;

    fn noop() -> Handler {
        Arc::new(|_| {})
    }

    /// Тест проверяет, что live всегда подмножество desired.
    #[test]
    fn test_live_is_subset_of_desired() {
        let mut reg = SubscriptionRegistry::new();
        assert!(reg.activate("/topic/a").is_none());

        let id = reg.register("/topic/a", noop());
        let frame = reg.activate("/topic/a").unwrap();
        assert_eq!(frame.command, Command::Subscribe);
        assert_eq!(frame.get("destination"), Some("/topic/a"));
        assert!(reg.activate("/topic/a").is_none());

        let unsub = reg.remove("/topic/a", id).unwrap().unwrap();
        assert_eq!(unsub.command, Command::Unsubscribe);
        assert_eq!(unsub.get("id"), frame.get("id"));
        assert!(reg.desired_topics().is_empty());
        assert!(reg.live_topics().is_empty());
    }

    /// Тест проверяет повторную отписку и отписку устаревшим владельцем.
    #[test]
    fn test_remove_is_idempotent_and_owner_checked() {
        let mut reg = SubscriptionRegistry::new();
        let old = reg.register("/topic/a", noop());
        let new = reg.register("/topic/a", noop());

        assert!(reg.remove("/topic/a", old).is_none());
        assert!(reg.is_desired("/topic/a"));

        assert_eq!(reg.remove("/topic/a", new), Some(None));
        assert!(reg.remove("/topic/a", new).is_none());
    }

    /// Тест проверяет цикл обрыв -> переподключение.
    #[test]
    fn test_clear_and_resubscribe() {
        let mut reg = SubscriptionRegistry::new();
        reg.register("/topic/b", noop());
        reg.register("/topic/a", noop());
        assert_eq!(reg.resubscribe_all().len(), 2);

        reg.clear_live();
        assert!(reg.live_topics().is_empty());
        assert_eq!(reg.desired_topics(), vec!["/topic/a", "/topic/b"]);

        let frames = reg.resubscribe_all();
        assert_eq!(frames.len(), 2);
        assert_eq!(reg.live_topics(), reg.desired_topics());
        // после переподключения id подписок новые
        assert!(reg.route("sub-2").is_none());
    }

    /// Тест проверяет, что замена обработчика действует на живую подписку.
    #[test]
    fn test_route_uses_current_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut reg = SubscriptionRegistry::new();
        reg.register("/topic/a", noop());
        let frame = reg.activate("/topic/a").unwrap();
        let stomp_id = frame.get("id").unwrap().to_string();

        let counter = hits.clone();
        reg.register(
            "/topic/a",
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(reg.activate("/topic/a").is_none());

        let (topic, handler) = reg.route(&stomp_id).unwrap();
        assert_eq!(topic, "/topic/a");
        handler(Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
