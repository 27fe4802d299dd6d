use std::{path::Path, time::Duration};

use config::{Config, Environment, File};
use noticelink_error::ConfigError;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    bus::{stomp::DEFAULT_MAX_FRAME_SIZE, BusConfig, ReconnectPolicy},
    logging::LoggingConfig,
    relay::RelayOptions,
};

/// Файл настроек, который читается, если путь не указан явно.
pub const DEFAULT_CONFIG_FILE: &str = "noticelink.toml";

/// Настройки приложения.
///
/// Источники по возрастанию приоритета: значения по умолчанию, файл
/// (`noticelink.toml`), переменные окружения `NOTICELINK__<SECTION>__<KEY>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub bus: BusSettings,
    pub relay: RelaySettings,
    pub logging: LoggingConfig,
}

/// Раздел `[bus]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusSettings {
    pub base_url: String,
    pub endpoint: String,
    pub sockjs: bool,
    /// Задержка перед переподключением; 0 отключает повторы.
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub heartbeat_outgoing_ms: u64,
    pub heartbeat_incoming_ms: u64,
    pub max_frame_size: usize,
    /// Токен для заголовка `Authorization` в CONNECT.
    pub auth_token: Option<String>,
}

/// Раздел `[relay]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelaySettings {
    pub icon: String,
    pub badge: String,
    pub default_path: String,
    pub messages_path: String,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Settings {
    /// Загружает настройки. Явно указанный файл обязан существовать,
    /// файл по умолчанию читается, только если он есть.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let cfg = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("NOTICELINK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let settings: Self = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bus.validate()?;
        self.relay.validate()?;
        self.logging.validate()
    }

    pub fn bus_config(&self) -> BusConfig {
        self.bus.to_bus_config()
    }

    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            icon: self.relay.icon.clone(),
            badge: self.relay.badge.clone(),
            default_path: self.relay.default_path.clone(),
            messages_path: self.relay.messages_path.clone(),
        }
    }
}

impl BusSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| invalid("bus.base_url", e))?;
        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(invalid(
                "bus.base_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if !self.endpoint.starts_with('/') {
            return Err(invalid("bus.endpoint", "must start with '/'"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(invalid("bus.connect_timeout_ms", "must be positive"));
        }
        if self.max_frame_size == 0 {
            return Err(invalid("bus.max_frame_size", "must be positive"));
        }
        Ok(())
    }

    pub fn to_bus_config(&self) -> BusConfig {
        let reconnect = match self.reconnect_delay_ms {
            0 => ReconnectPolicy::Disabled,
            ms => ReconnectPolicy::Fixed(Duration::from_millis(ms)),
        };
        let mut config = BusConfig {
            base_url: self.base_url.clone(),
            endpoint: self.endpoint.clone(),
            sockjs: self.sockjs,
            reconnect,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            heartbeat_outgoing: Duration::from_millis(self.heartbeat_outgoing_ms),
            heartbeat_incoming: Duration::from_millis(self.heartbeat_incoming_ms),
            max_frame_size: self.max_frame_size,
            connect_headers: Vec::new(),
        };
        if let Some(token) = self.auth_token.as_deref().filter(|t| !t.is_empty()) {
            config = config.with_connect_header("Authorization", format!("Bearer {token}"));
        }
        config
    }
}

impl RelaySettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, path) in [
            ("relay.default_path", &self.default_path),
            ("relay.messages_path", &self.messages_path),
        ] {
            if !path.starts_with('/') {
                return Err(invalid(key, "must start with '/'"));
            }
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние методы и функции
////////////////////////////////////////////////////////////////////////////////

fn invalid(
    key: &str,
    reason: impl ToString,
) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for BusSettings {
    fn default() -> Self {
        let bus = BusConfig::default();
        Self {
            base_url: bus.base_url,
            endpoint: bus.endpoint,
            sockjs: bus.sockjs,
            reconnect_delay_ms: bus.reconnect.delay().map_or(0, |d| d.as_millis() as u64),
            connect_timeout_ms: bus.connect_timeout.as_millis() as u64,
            heartbeat_outgoing_ms: bus.heartbeat_outgoing.as_millis() as u64,
            heartbeat_incoming_ms: bus.heartbeat_incoming.as_millis() as u64,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            auth_token: None,
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        let relay = RelayOptions::default();
        Self {
            icon: relay.icon,
            badge: relay.badge,
            default_path: relay.default_path,
            messages_path: relay.messages_path,
        }
    }
}
