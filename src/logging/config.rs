use std::{env, fs, path::PathBuf};

use noticelink_error::ConfigError;
use serde::{Deserialize, Serialize};

/// Формат вывода логов.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень по умолчанию (`trace`..`error`) или полная директива
    /// `EnvFilter`.
    pub level: String,
    pub format: LogFormat,
    pub console_enabled: bool,
    pub with_ansi: bool,
    pub with_target: bool,
    /// Писать ли в файл с ежедневной ротацией.
    pub file_enabled: bool,
    pub log_dir: PathBuf,
    pub file_name: String,
    /// Формат файла; текстовый по умолчанию, `json` удобен для сборщиков.
    pub file_format: LogFormat,
}

impl LoggingConfig {
    /// Применяет переопределения из переменных `NOTICELINK_LOG_*`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("NOTICELINK_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(format) = env::var("NOTICELINK_LOG_FORMAT") {
            match format.to_ascii_lowercase().as_str() {
                "pretty" => self.format = LogFormat::Pretty,
                "compact" => self.format = LogFormat::Compact,
                "json" => self.format = LogFormat::Json,
                other => eprintln!("Ignoring unknown NOTICELINK_LOG_FORMAT '{other}'"),
            }
        }
        if let Ok(dir) = env::var("NOTICELINK_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
            self.file_enabled = true;
        }
        if let Ok(value) = env::var("NOTICELINK_LOG_FILE") {
            self.file_enabled = matches!(value.as_str(), "1" | "true" | "yes" | "on");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.file_enabled && self.file_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "logging.file_name".to_string(),
                reason: "must not be empty when file logging is enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Создаёт каталог логов, если запись в файл включена.
    pub fn ensure_log_dir(&self) -> Result<(), ConfigError> {
        if !self.file_enabled {
            return Ok(());
        }
        fs::create_dir_all(&self.log_dir).map_err(|e| ConfigError::InvalidValue {
            key: "logging.log_dir".to_string(),
            reason: format!("cannot create {}: {e}", self.log_dir.display()),
        })
    }

    /// Директива `EnvFilter`. Уровень вида `debug` дополняется тишиной для
    /// шумных зависимостей; полная директива используется как есть.
    pub fn build_filter_directive(&self) -> String {
        let level = self.level.trim();
        if level.contains('=') || level.contains(',') {
            return level.to_string();
        }
        format!("{level},tungstenite=warn,tokio_tungstenite=warn")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            console_enabled: true,
            with_ansi: true,
            with_target: true,
            file_enabled: false,
            log_dir: PathBuf::from("logs"),
            file_name: "noticelink.log".to_string(),
            file_format: LogFormat::Compact,
        }
    }
}
