//! Разбор push-события и построение системного уведомления.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::debug;

use super::RelayOptions;
use crate::notice::NoticeKind;

/// Символы, которые кодируются в компоненте URI (как `encodeURIComponent`).
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Полезная нагрузка push-события: всегда JSON-объект.
///
/// Ожидаемые поля `{type, title, body, threadId, url}` необязательны; у
/// каждого есть значение по умолчанию.
#[derive(Debug, Clone, PartialEq)]
pub struct PushPayload(Value);

/// Данные, прикреплённые к уведомлению и возвращаемые при клике.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Запрос на показ системного уведомления.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Уведомления с одинаковым тегом заменяют друг друга.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Повторно оповещать пользователя при замене.
    #[serde(default)]
    pub renotify: bool,
    pub data: NotificationData,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl PushPayload {
    /// Разбирает сырые данные события. Отсутствующие данные, не UTF-8, не
    /// JSON и JSON не-объект дают пустой объект.
    pub fn parse(raw: Option<&[u8]>) -> Self {
        let Some(bytes) = raw else {
            return Self::empty();
        };
        match serde_json::from_slice::<Value>(bytes) {
            Ok(v @ Value::Object(_)) => Self(v),
            Ok(other) => {
                debug!(kind = json_kind(&other), "Push payload is not an object");
                Self::empty()
            }
            Err(e) => {
                debug!(error = %e, "Push payload is not valid JSON");
                Self::empty()
            }
        }
    }

    pub fn empty() -> Self {
        Self(Value::Object(Map::new()))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Исходное значение `type` (пустая строка, если его нет).
    pub fn kind_raw(&self) -> String {
        self.text("type").unwrap_or_default()
    }

    pub fn kind(&self) -> NoticeKind {
        NoticeKind::parse(&self.kind_raw())
    }

    /// Заголовок: явный `title` или значение из таблицы по типу.
    pub fn title(&self) -> String {
        self.text("title")
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback_title(self.kind()).to_string())
    }

    /// Текст: явный `body` или значение из таблицы по типу.
    pub fn body(&self) -> String {
        self.text("body")
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback_body(self.kind()).to_string())
    }

    /// Идентификатор треда строкой. Пустая строка и ноль означают его
    /// отсутствие.
    pub fn thread_id(&self) -> Option<String> {
        match self.0.get("threadId")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(number_text(n)),
            _ => None,
        }
    }

    /// Явный адрес перехода (обрезанный, непустой).
    pub fn url(&self) -> Option<String> {
        match self.0.get("url")? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    pub fn click_target(
        &self,
        options: &RelayOptions,
    ) -> String {
        click_target(
            self.url().as_deref(),
            self.thread_id().as_deref(),
            options,
        )
    }

    /// Собирает запрос на показ уведомления.
    pub fn to_request(
        &self,
        options: &RelayOptions,
    ) -> NotificationRequest {
        let thread_id = self.thread_id();
        NotificationRequest {
            title: self.title(),
            body: self.body(),
            icon: options.icon.clone(),
            badge: options.badge.clone(),
            tag: thread_id.as_ref().map(|id| format!("thread-{id}")),
            renotify: thread_id.is_some(),
            data: NotificationData {
                url: self.click_target(options),
                thread_id,
                kind: self.kind_raw(),
            },
        }
    }

    fn text(
        &self,
        name: &str,
    ) -> Option<String> {
        match self.0.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(number_text(n)),
            Value::Bool(true) => Some("true".to_string()),
            _ => None,
        }
    }
}

/// Куда вести пользователя по клику.
///
/// Приоритет: явный `url` -> страница сообщений с тредом -> страница по
/// умолчанию.
pub fn click_target(
    url: Option<&str>,
    thread_id: Option<&str>,
    options: &RelayOptions,
) -> String {
    if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
        return url.to_string();
    }
    if let Some(thread) = thread_id.filter(|t| !t.is_empty()) {
        return format!(
            "{}?thread={}",
            options.messages_path,
            utf8_percent_encode(thread, URI_COMPONENT)
        );
    }
    options.default_path.clone()
}

pub fn fallback_title(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::MatchRequested => "New match request",
        NoticeKind::MatchAccepted => "Match accepted",
        NoticeKind::MatchDeclined => "Match declined",
        NoticeKind::Message => "New message",
        NoticeKind::Unknown => "Notification",
    }
}

pub fn fallback_body(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::MatchAccepted => "They accepted your request. You can start chatting!",
        NoticeKind::MatchRequested => "Review the request and accept or decline.",
        _ => "You have a new notification.",
    }
}

/// Число строкой: целое значение с плавающей точкой печатается без `.0`,
/// чтобы `42` и `42.0` давали один и тот же тред.
fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for PushPayload {
    fn default() -> Self {
        Self::empty()
    }
}
