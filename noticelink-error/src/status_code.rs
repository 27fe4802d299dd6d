use std::fmt;

/// Коды статуса для категоризации ошибок.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки данных
/// - 6xxx: Сеть / транспорт шины
/// - 8xxx: Протокольные ошибки (STOMP)
/// - 9xxx: Ретранслятор уведомлений
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,
    InvalidConfig = 1005,

    // === 2xxx: Ошибки данных ===
    NotFound = 2000,
    InvalidData = 2001,

    // === 6xxx: Сеть/транспорт ===
    Io = 6000,
    ConnectionClosed = 6001,
    Timeout = 6002,
    ConnectionFailed = 6003,
    ConnectionRejected = 6004,
    NotConnected = 6005,
    HeartbeatTimeout = 6006,

    // === 8xxx: Протокол ===
    InvalidFrame = 8000,
    InvalidCommand = 8001,
    InvalidHeader = 8002,
    InvalidEscape = 8003,
    SizeLimit = 8004,
    ParseError = 8005,
    EncodingError = 8006,
    DecodingError = 8007,

    // === 9xxx: Ретранслятор ===
    NotificationFailed = 9000,
    PageClosed = 9001,
    PageOpenFailed = 9002,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Возвращает `true`, если после ошибки с этим кодом соединение с шиной
    /// имеет смысл переустановить.
    ///
    /// Сбои транспорта и испорченный поток кадров лечатся новым
    /// соединением. Отказ брокера в рукопожатии и ошибки конфигурации
    /// повтором не исправить.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionRejected | Self::NotConnected => false,
            _ => self.is_transport_error() || self.is_protocol_error(),
        }
    }

    /// Ошибка протокола или парсинга (диапазон 8xxx).
    pub fn is_protocol_error(&self) -> bool {
        (8000..=8999).contains(&self.code())
    }

    /// Ошибка сети или транспорта (диапазон 6xxx).
    pub fn is_transport_error(&self) -> bool {
        (6000..=6999).contains(&self.code())
    }

    /// Рекомендуемый уровень логирования для данного кода.
    ///
    /// Транспортные сбои ожидаемы (переподключение штатное), поэтому они не
    /// поднимаются выше `Warn`.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::NotFound | Self::InvalidData | Self::ParseError => LogLevel::Debug,
            Self::ConnectionClosed | Self::NotConnected | Self::PageClosed => LogLevel::Info,
            Self::Timeout
            | Self::Io
            | Self::ConnectionFailed
            | Self::ConnectionRejected
            | Self::HeartbeatTimeout
            | Self::NotificationFailed
            | Self::PageOpenFailed => LogLevel::Warn,
            Self::Internal | Self::InvalidConfig => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, какие коды лечатся переподключением.
    #[test]
    fn test_retryable_codes() {
        assert!(StatusCode::HeartbeatTimeout.is_retryable());
        assert!(StatusCode::Timeout.is_retryable());
        assert!(StatusCode::InvalidFrame.is_retryable());
        assert!(!StatusCode::ConnectionRejected.is_retryable());
        assert!(!StatusCode::NotConnected.is_retryable());
        assert!(!StatusCode::InvalidConfig.is_retryable());
        assert!(!StatusCode::NotificationFailed.is_retryable());
    }

    /// Тест проверяет диапазонные предикаты и числовой код.
    #[test]
    fn test_ranges() {
        assert!(StatusCode::InvalidEscape.is_protocol_error());
        assert!(!StatusCode::InvalidEscape.is_transport_error());
        assert!(StatusCode::NotConnected.is_transport_error());
        assert_eq!(u32::from(StatusCode::PageClosed), 9001);
    }

    /// Тест проверяет, что сетевые сбои не логируются как ошибки.
    #[test]
    fn test_transport_failures_are_not_error_level() {
        assert_eq!(StatusCode::ConnectionFailed.log_level(), LogLevel::Warn);
        assert_eq!(StatusCode::ConnectionClosed.log_level(), LogLevel::Info);
        assert_eq!(StatusCode::Internal.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusCode::Timeout.to_string(), "Timeout (6002)");
    }
}
