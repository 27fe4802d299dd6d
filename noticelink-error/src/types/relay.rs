use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки ретранслятора уведомлений.
///
/// Ни одна из них не прерывает обработку события: ретранслятор логирует
/// ошибку и продолжает рассылку сигналов страницам.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Платформа отказала в показе уведомления
    NotificationFailed { reason: String },
    /// Страница закрыта, сообщение не доставлено
    PageClosed { page_id: String },
    /// Не удалось открыть новую страницу
    PageOpenFailed { url: String, reason: String },
}

impl std::fmt::Display for RelayError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::NotificationFailed { reason } => {
                write!(f, "Failed to show notification: {reason}")
            }
            Self::PageClosed { page_id } => write!(f, "Page {page_id} is closed"),
            Self::PageOpenFailed { url, reason } => {
                write!(f, "Failed to open page at {url}: {reason}")
            }
        }
    }
}

impl std::error::Error for RelayError {}

impl ErrorExt for RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotificationFailed { .. } => StatusCode::NotificationFailed,
            Self::PageClosed { .. } => StatusCode::PageClosed,
            Self::PageOpenFailed { .. } => StatusCode::PageOpenFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
