//! Типизированный словарь сообщений для открытых страниц.
//!
//! Сигналы ничего не гарантируют о полезной нагрузке: страница, получив
//! сигнал, сама перечитывает актуальное состояние. Поэтому дубликаты и
//! сигналы, пришедшие не по порядку (шина и push независимы), безопасны.

use serde::{Deserialize, Serialize};

use super::Notice;

/// Сигнал "обновись" для страницы.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PageSignal {
    /// Счётчики непрочитанного могли измениться.
    UnreadChanged,
    /// Могло появиться новое уведомление; список и счётчик стоит обновить.
    NoticeChanged {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notice: Option<Notice>,
    },
}

/// Подсказка маршрутизации после клика по уведомлению.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PageRoute {
    #[serde(rename_all = "camelCase")]
    OpenThread { thread_id: String },
    OpenUrl { url: String },
}

/// Всё, что фоновый контекст отправляет странице.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageEvent {
    Signal(PageSignal),
    Route(PageRoute),
}

impl PageSignal {
    pub fn notice_changed(notice: Notice) -> Self {
        Self::NoticeChanged {
            notice: Some(notice),
        }
    }
}

impl From<PageSignal> for PageEvent {
    fn from(signal: PageSignal) -> Self {
        Self::Signal(signal)
    }
}

impl From<PageRoute> for PageEvent {
    fn from(route: PageRoute) -> Self {
        Self::Route(route)
    }
}
