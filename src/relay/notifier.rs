use async_trait::async_trait;
use noticelink_error::RelayError;
use tracing::info;

use super::NotificationRequest;

/// Платформа, показывающая системные уведомления.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Показывает уведомление. Уведомление с тем же тегом заменяет
    /// предыдущее.
    async fn show(
        &self,
        request: &NotificationRequest,
    ) -> Result<(), RelayError>;

    /// Закрывает уведомление с тегом `tag` (или последнее без тега).
    async fn close(
        &self,
        tag: Option<&str>,
    ) -> Result<(), RelayError>;
}

/// Уведомления в лог. Используется CLI и там, где нет настоящей платформы.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn show(
        &self,
        request: &NotificationRequest,
    ) -> Result<(), RelayError> {
        info!(
            title = %request.title,
            body = %request.body,
            tag = request.tag.as_deref(),
            renotify = request.renotify,
            url = %request.data.url,
            "Notification shown"
        );
        Ok(())
    }

    async fn close(
        &self,
        tag: Option<&str>,
    ) -> Result<(), RelayError> {
        info!(tag, "Notification closed");
        Ok(())
    }
}
