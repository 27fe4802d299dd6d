use std::time::Duration;

use crate::bus::stomp::DEFAULT_MAX_FRAME_SIZE;

/// Политика повторного подключения после обрыва.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Переподключаться с фиксированной задержкой.
    Fixed(Duration),
    /// Одна попытка, без повторов.
    Disabled,
}

/// Параметры клиента шины.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Базовый HTTP-адрес бэкенда, например `http://localhost:8080`.
    pub base_url: String,
    /// Путь точки подключения (`/ws`).
    pub endpoint: String,
    /// Использовать ли raw-websocket путь SockJS (`/ws/websocket`).
    pub sockjs: bool,
    pub reconnect: ReconnectPolicy,
    /// Сколько `connect()` ждёт исхода попытки.
    pub connect_timeout: Duration,
    /// Предлагаемый интервал исходящих heart-beat (0 — отключено).
    pub heartbeat_outgoing: Duration,
    /// Желаемый интервал входящих heart-beat (0 — отключено).
    pub heartbeat_incoming: Duration,
    pub max_frame_size: usize,
    /// Дополнительные заголовки CONNECT (например, `Authorization`).
    pub connect_headers: Vec<(String, String)>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl BusConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Полный адрес точки подключения: `base_url` + `endpoint`.
    pub fn endpoint_address(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint
        )
    }

    /// Интервалы heart-beat для заголовка CONNECT, в миллисекундах.
    pub fn heart_beat_millis(&self) -> (u64, u64) {
        (
            self.heartbeat_outgoing.as_millis() as u64,
            self.heartbeat_incoming.as_millis() as u64,
        )
    }

    pub fn with_reconnect(
        mut self,
        policy: ReconnectPolicy,
    ) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_heartbeat(
        mut self,
        outgoing: Duration,
        incoming: Duration,
    ) -> Self {
        self.heartbeat_outgoing = outgoing;
        self.heartbeat_incoming = incoming;
        self
    }

    pub fn with_connect_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_connect_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.connect_headers.push((name.into(), value.into()));
        self
    }
}

impl ReconnectPolicy {
    /// Задержка перед следующей попыткой или `None`, если повторов нет.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::Fixed(d) => Some(*d),
            Self::Disabled => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            endpoint: "/ws".to_string(),
            sockjs: true,
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            heartbeat_outgoing: Duration::from_millis(10_000),
            heartbeat_incoming: Duration::from_millis(10_000),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_headers: Vec::new(),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed(Duration::from_millis(2000))
    }
}
