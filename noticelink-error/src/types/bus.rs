use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки клиента шины сообщений (транспорт + протокол STOMP).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Не удалось открыть транспорт
    ConnectionFailed { endpoint: String, reason: String },
    /// Брокер не подтвердил подключение за отведённое время
    ConnectTimeout,
    /// Брокер отклонил рукопожатие кадром ERROR
    Rejected { message: String },
    /// Транспорт закрыт
    ConnectionClosed,
    /// Операция требует живого соединения
    NotConnected,
    /// Брокер молчит дольше допустимого интервала heart-beat
    HeartbeatTimeout { silent_ms: u64 },
    /// Нарушение протокола STOMP
    Protocol { reason: String },
    /// Неизвестная команда кадра
    InvalidCommand { command: String },
    /// Некорректная строка заголовка
    InvalidHeader { line: String },
    /// Недопустимая escape-последовательность в заголовке
    InvalidEscape { sequence: String },
    /// Кадр превышает допустимый размер
    FrameTooLarge { size: usize, max: usize },
    /// Некорректный адрес точки подключения
    InvalidEndpoint { url: String, reason: String },
    /// Клиент остановлен
    Shutdown,
}

impl std::fmt::Display for BusError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed { endpoint, reason } => {
                write!(f, "Failed to connect to {endpoint}: {reason}")
            }
            Self::ConnectTimeout => write!(f, "Timed out waiting for the bus connection"),
            Self::Rejected { message } => write!(f, "Broker rejected the connection: {message}"),
            Self::ConnectionClosed => write!(f, "Bus connection closed"),
            Self::NotConnected => write!(f, "Bus is not connected"),
            Self::HeartbeatTimeout { silent_ms } => {
                write!(f, "No heartbeat from broker for {silent_ms} ms")
            }
            Self::Protocol { reason } => write!(f, "STOMP protocol error: {reason}"),
            Self::InvalidCommand { command } => write!(f, "Unknown STOMP command: {command}"),
            Self::InvalidHeader { line } => write!(f, "Malformed STOMP header: {line:?}"),
            Self::InvalidEscape { sequence } => {
                write!(f, "Invalid escape sequence in header: {sequence:?}")
            }
            Self::FrameTooLarge { size, max } => {
                write!(f, "STOMP frame too large: {size} bytes (max {max})")
            }
            Self::InvalidEndpoint { url, reason } => {
                write!(f, "Invalid bus endpoint '{url}': {reason}")
            }
            Self::Shutdown => write!(f, "Bus client has been shut down"),
        }
    }
}

impl std::error::Error for BusError {}

impl ErrorExt for BusError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ConnectionFailed { .. } => StatusCode::ConnectionFailed,
            Self::ConnectTimeout => StatusCode::Timeout,
            Self::Rejected { .. } => StatusCode::ConnectionRejected,
            Self::ConnectionClosed => StatusCode::ConnectionClosed,
            Self::NotConnected | Self::Shutdown => StatusCode::NotConnected,
            Self::HeartbeatTimeout { .. } => StatusCode::HeartbeatTimeout,
            Self::Protocol { .. } => StatusCode::InvalidFrame,
            Self::InvalidCommand { .. } => StatusCode::InvalidCommand,
            Self::InvalidHeader { .. } => StatusCode::InvalidHeader,
            Self::InvalidEscape { .. } => StatusCode::InvalidEscape,
            Self::FrameTooLarge { .. } => StatusCode::SizeLimit,
            Self::InvalidEndpoint { .. } => StatusCode::InvalidConfig,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
