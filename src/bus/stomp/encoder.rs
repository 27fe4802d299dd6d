//! Энкодер кадров STOMP.
//!
//! Кадр сериализуется как `COMMAND\nname:value\n...\n\nbody\0`. Для всех
//! команд, кроме CONNECT/CONNECTED, заголовки экранируются (`\\`, `\n`, `\r`,
//! `\c`). Если тело непустое и `content-length` не задан явно, он
//! добавляется автоматически.

use noticelink_error::BusError;

use super::frame::Frame;

/// Структура энкодера для кодирования кадров STOMP.
pub struct StompEncoder;

impl StompEncoder {
    pub fn encode(frame: &Frame) -> Result<String, BusError> {
        let escape = frame.command.escapes_headers();
        let mut out = String::with_capacity(64 + frame.body.len());

        out.push_str(frame.command.as_str());
        out.push('\n');

        for (name, value) in &frame.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                Self::validate_raw_header(name, value)?;
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }

        if !frame.body.is_empty() && frame.get("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&frame.body.len().to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&frame.body);
        out.push('\0');
        Ok(out)
    }

    /// Без экранирования заголовок не может содержать перевод строки, а
    /// имя — двоеточие.
    fn validate_raw_header(
        name: &str,
        value: &str,
    ) -> Result<(), BusError> {
        let bad_name = name.is_empty() || name.contains([':', '\n', '\r']);
        let bad_value = value.contains(['\n', '\r']);
        if bad_name || bad_value {
            return Err(BusError::InvalidHeader {
                line: format!("{name}:{value}"),
            });
        }
        Ok(())
    }
}

/// Экранирует значение заголовка по правилам STOMP 1.2.
pub fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}
