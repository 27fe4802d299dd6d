//! Ретранслятор уведомлений.
//!
//! Живёт независимо от открытых страниц. Превращает push-событие в
//! системное уведомление и в сигнал обновления для каждой открытой
//! страницы, а клик по уведомлению направляет обратно в приложение.
//! Ни одна ошибка не выходит за пределы обработчиков: худший исход — "нет
//! уведомления и нет сигнала".

use std::sync::Arc;

use noticelink_error::StackError;
use tracing::{debug, info, warn};

use super::{
    click_target, NotificationData, NotificationRequest, Notifier, PageRegistry, PushPayload,
    RelayOptions,
};
use crate::notice::{Notice, PageRoute, PageSignal};

/// Исход обработки клика.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Существующая страница получила маршрут и фокус.
    FocusedExisting { page: String },
    /// Открытых страниц не было, открыта новая.
    OpenedNew { page: String, url: String },
    Failed,
}

pub struct NotificationRelay {
    options: RelayOptions,
    notifier: Arc<dyn Notifier>,
    pages: PageRegistry,
}

impl NotificationRelay {
    pub fn new(
        options: RelayOptions,
        notifier: impl Notifier,
        pages: PageRegistry,
    ) -> Self {
        Self {
            options,
            notifier: Arc::new(notifier),
            pages,
        }
    }

    pub fn pages(&self) -> &PageRegistry {
        &self.pages
    }

    pub fn options(&self) -> &RelayOptions {
        &self.options
    }

    /// Обрабатывает push-событие.
    ///
    /// Показ уведомления и рассылка обоих сигналов идут параллельно: часть
    /// страниц слушает только один из них. Ошибка платформы уведомлений
    /// логируется и не мешает рассылке. Возвращает запрошенное уведомление.
    pub async fn on_push_received(
        &self,
        raw: Option<&[u8]>,
    ) -> NotificationRequest {
        let payload = PushPayload::parse(raw);
        let request = payload.to_request(&self.options);
        let notice = Notice::from_push(&payload);

        let show = async {
            if let Err(e) = self.notifier.show(&request).await {
                let e = StackError::from(e);
                warn!(error = %e, code = %e.status_code(), "Notification not shown");
            }
        };
        let notice_changed = async {
            self.pages
                .broadcast(PageSignal::notice_changed(notice).into())
        };
        let unread_changed = async { self.pages.broadcast(PageSignal::UnreadChanged.into()) };

        let ((), notice_pages, unread_pages) = tokio::join!(show, notice_changed, unread_changed);
        info!(
            title = %request.title,
            tag = request.tag.as_deref(),
            notice_pages,
            unread_pages,
            "Push relayed"
        );
        request
    }

    /// Обрабатывает клик по уведомлению.
    ///
    /// Первая живая страница получает подсказку маршрута (тред или адрес)
    /// и фокус; остальные не трогаются. Если страниц нет, открывается одна
    /// новая по адресу перехода.
    pub async fn on_notification_clicked(
        &self,
        data: &NotificationData,
    ) -> ClickOutcome {
        let thread_id = data.thread_id.as_deref().filter(|t| !t.is_empty());
        let tag = thread_id.map(|t| format!("thread-{t}"));
        if let Err(e) = self.notifier.close(tag.as_deref()).await {
            debug!(error = %e, "Failed to close notification");
        }

        let target = click_target(Some(&data.url), thread_id, &self.options);
        let route = match thread_id {
            Some(t) => PageRoute::OpenThread {
                thread_id: t.to_string(),
            },
            None => PageRoute::OpenUrl {
                url: target.clone(),
            },
        };

        for page in self.pages.pages() {
            if let Err(e) = self.pages.post(&page, route.clone().into()) {
                debug!(error = %e, "Page closed before routing, trying next");
                continue;
            }
            return match self.pages.focus(&page) {
                Ok(()) => {
                    info!(page = %page, ?route, "Routed click to open page");
                    ClickOutcome::FocusedExisting { page }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to focus page");
                    ClickOutcome::Failed
                }
            };
        }

        match self.pages.open_window(&target) {
            Ok(page) => {
                info!(page = %page, url = %target, "Opened new page for click");
                ClickOutcome::OpenedNew { page, url: target }
            }
            Err(e) => {
                warn!(error = %e, "Failed to open page");
                ClickOutcome::Failed
            }
        }
    }

    /// Push, пришедший, пока страница на переднем плане.
    ///
    /// Всегда подталкивает счётчик непрочитанного. Уведомление
    /// показывается, только если страница скрыта. Возвращает, было ли
    /// запрошено уведомление.
    pub async fn on_foreground_push(
        &self,
        raw: Option<&[u8]>,
        page_hidden: bool,
    ) -> bool {
        self.pages.broadcast(PageSignal::UnreadChanged.into());
        if !page_hidden {
            return false;
        }

        let payload = PushPayload::parse(raw);
        let mut request = payload.to_request(&self.options);
        request.title = non_empty(payload.as_value().get("title"))
            .unwrap_or_else(|| "New message".to_string());
        request.body = non_empty(payload.as_value().get("body")).unwrap_or_default();

        match self.notifier.show(&request).await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Foreground notification not shown");
                false
            }
        }
    }
}

fn non_empty(v: Option<&serde_json::Value>) -> Option<String> {
    v.and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use noticelink_error::RelayError;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::notice::PageEvent;

    /// Платформа уведомлений, запоминающая вызовы.
    #[derive(Clone, Default)]
    struct Recorder {
        shown: Arc<Mutex<Vec<NotificationRequest>>>,
        closed: Arc<Mutex<Vec<Option<String>>>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn show(
            &self,
            request: &NotificationRequest,
        ) -> Result<(), RelayError> {
            if self.fail {
                return Err(RelayError::NotificationFailed {
                    reason: "permission denied".into(),
                });
            }
            self.shown.lock().push(request.clone());
            Ok(())
        }

        async fn close(
            &self,
            tag: Option<&str>,
        ) -> Result<(), RelayError> {
            self.closed.lock().push(tag.map(str::to_string));
            Ok(())
        }
    }

    fn relay(recorder: Recorder) -> NotificationRelay {
        NotificationRelay::new(RelayOptions::default(), recorder, PageRegistry::new())
    }

    fn raw(v: serde_json::Value) -> Vec<u8> {
        v.to_string().into_bytes()
    }

    /// Тест проверяет показ и рассылку обоих сигналов.
    #[tokio::test]
    async fn test_push_shows_and_broadcasts() {
        let recorder = Recorder::default();
        let relay = relay(recorder.clone());
        let mut page = relay.pages().open_page(Some("/"));

        let data = raw(json!({"type": "MATCH_ACCEPTED", "threadId": 42}));
        let req = relay.on_push_received(Some(&data)).await;
        assert_eq!(req.title, "Match accepted");
        assert_eq!(recorder.shown.lock().len(), 1);

        let mut kinds = Vec::new();
        while let Some(event) = page.try_recv() {
            kinds.push(event);
        }
        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains(&PageSignal::UnreadChanged.into()));
        assert!(kinds.iter().any(|e| matches!(
            e,
            PageEvent::Signal(PageSignal::NoticeChanged { notice: Some(n) })
                if n.thread_id == Some(42)
        )));
    }

    /// Тест проверяет, что отказ платформы не мешает сигналам.
    #[tokio::test]
    async fn test_notifier_failure_is_swallowed() {
        let relay = relay(Recorder {
            fail: true,
            ..Recorder::default()
        });
        let mut page = relay.pages().open_page(None);
        relay.on_push_received(None).await;
        assert!(page.try_recv().is_some());
        assert!(page.try_recv().is_some());
    }

    /// Тест проверяет клик без открытых страниц.
    #[tokio::test]
    async fn test_click_opens_new_page() {
        let recorder = Recorder::default();
        let relay = relay(recorder.clone());
        let mut opened = relay.pages().take_opened().unwrap();

        let data = NotificationData {
            url: "/messages?thread=42".into(),
            thread_id: Some("42".into()),
            kind: "MESSAGE".into(),
        };
        let outcome = relay.on_notification_clicked(&data).await;
        let ClickOutcome::OpenedNew { url, .. } = &outcome else {
            panic!("unexpected {outcome:?}");
        };
        assert_eq!(url, "/messages?thread=42");
        assert_eq!(opened.try_recv().unwrap().url(), Some("/messages?thread=42"));
        assert_eq!(recorder.closed.lock().as_slice(), &[Some("thread-42".to_string())]);
    }

    /// Тест проверяет, что фокус получает только первая страница.
    #[tokio::test]
    async fn test_click_focuses_first_page_only() {
        let relay = relay(Recorder::default());
        let mut first = relay.pages().open_page(None);
        let mut second = relay.pages().open_page(None);

        let data = NotificationData {
            url: "/custom".into(),
            thread_id: None,
            kind: String::new(),
        };
        let outcome = relay.on_notification_clicked(&data).await;
        assert_eq!(
            outcome,
            ClickOutcome::FocusedExisting {
                page: first.id().to_string()
            }
        );
        assert_eq!(first.focus_count(), 1);
        assert_eq!(second.focus_count(), 0);
        assert_eq!(
            first.try_recv(),
            Some(PageRoute::OpenUrl { url: "/custom".into() }.into())
        );
        assert_eq!(second.try_recv(), None);
        assert_eq!(relay.pages().len(), 2);
    }

    /// Тест проверяет foreground-вариант.
    #[tokio::test]
    async fn test_foreground_push() {
        let recorder = Recorder::default();
        let relay = relay(recorder.clone());
        let mut page = relay.pages().open_page(None);

        let data = raw(json!({"type": "MESSAGE"}));
        assert!(!relay.on_foreground_push(Some(&data), false).await);
        assert_eq!(page.try_recv(), Some(PageSignal::UnreadChanged.into()));
        assert!(recorder.shown.lock().is_empty());

        assert!(relay.on_foreground_push(Some(&data), true).await);
        let shown = recorder.shown.lock();
        assert_eq!(shown[0].title, "New message");
        assert_eq!(shown[0].body, "");
    }
}
