use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::relay::PushPayload;

/// Тип уведомления.
///
/// На проводе записывается в SCREAMING_SNAKE_CASE (`MATCH_ACCEPTED`).
/// Любое нераспознанное значение превращается в [`NoticeKind::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoticeKind {
    Message,
    MatchRequested,
    MatchAccepted,
    MatchDeclined,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Нормализованное уведомление пользователя.
///
/// Оба пути доставки (шина и push) приводятся к этой форме до того, как
/// уведомление попадёт в состояние страницы.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: NoticeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_request_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Время создания в RFC 3339.
    pub created_at: String,
    #[serde(default)]
    pub read: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl NoticeKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "MESSAGE",
            Self::MatchRequested => "MATCH_REQUESTED",
            Self::MatchAccepted => "MATCH_ACCEPTED",
            Self::MatchDeclined => "MATCH_DECLINED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Разбирает тип без учёта регистра.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "MESSAGE" => Self::Message,
            "MATCH_REQUESTED" => Self::MatchRequested,
            "MATCH_ACCEPTED" => Self::MatchAccepted,
            "MATCH_DECLINED" => Self::MatchDeclined,
            _ => Self::Unknown,
        }
    }
}

impl Notice {
    /// Приводит произвольный JSON к [`Notice`]. Никогда не падает.
    ///
    /// - нет `id` -> текущее время в миллисекундах;
    /// - нет или неизвестен `type` -> `Unknown`;
    /// - числовые поля принимают числа и числовые строки;
    /// - нет `createdAt` -> текущее время (число трактуется как epoch ms);
    /// - нет `read` -> `false`.
    pub fn normalize(raw: &Value) -> Self {
        let field = |name: &str| raw.get(name).filter(|v| !v.is_null());

        Self {
            id: field("id").and_then(as_u64).unwrap_or_else(now_millis),
            kind: field("type")
                .and_then(Value::as_str)
                .map(NoticeKind::parse)
                .unwrap_or_default(),
            from_user_id: field("fromUserId").and_then(as_u64),
            from_name: field("fromName").and_then(as_text),
            thread_id: field("threadId").and_then(as_u64),
            match_request_id: field("matchRequestId").and_then(as_u64),
            target_user_id: field("targetUserId").and_then(as_u64),
            title: field("title").and_then(as_text),
            body: field("body").and_then(as_text),
            created_at: field("createdAt")
                .and_then(as_timestamp)
                .unwrap_or_else(now_rfc3339),
            read: field("read").map(truthy).unwrap_or(false),
        }
    }

    /// Уведомление из push-события.
    pub fn from_push(payload: &PushPayload) -> Self {
        Self::normalize(payload.as_value())
    }

    /// Разобранное время создания, если строка корректна.
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.created_at).ok()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние методы и функции
////////////////////////////////////////////////////////////////////////////////

/// Число или числовая строка -> u64.
pub(crate) fn as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_timestamp(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
        _ => None,
    }
}

/// Истинность значения в духе JSON-клиентов: пустые и нулевые значения
/// ложны.
fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for NoticeKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
