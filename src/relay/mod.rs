//! Ретранслятор push-уведомлений и канал до открытых страниц.

pub mod handler;
pub mod notifier;
pub mod pages;
pub mod push;

pub use handler::{ClickOutcome, NotificationRelay};
pub use notifier::{Notifier, TracingNotifier};
pub use pages::{PageHandle, PageRegistry};
pub use push::{
    click_target, fallback_body, fallback_title, NotificationData, NotificationRequest,
    PushPayload,
};

/// Оформление уведомлений и адреса перехода.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOptions {
    pub icon: String,
    pub badge: String,
    /// Куда вести, если нет ни адреса, ни треда.
    pub default_path: String,
    /// Страница сообщений; тред передаётся параметром `thread`.
    pub messages_path: String,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            icon: "/icons/icon-192.png".to_string(),
            badge: "/icons/badge-72.png".to_string(),
            default_path: "/notifications".to_string(),
            messages_path: "/messages".to_string(),
        }
    }
}
