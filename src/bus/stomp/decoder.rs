//! Инкрементальный декодер кадров STOMP.
//!
//! Транспорт может разрезать кадр на несколько сообщений или, наоборот,
//! склеить несколько кадров в одно. Декодер накапливает текст во внутреннем
//! буфере и отдаёт по одному элементу [`Incoming`] за вызов `decode`.

use noticelink_error::BusError;
use tracing::trace;

use super::frame::{Command, Frame, Incoming};

/// Максимальный размер кадра по умолчанию (1mb).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

pub struct StompDecoder {
    buf: String,
    max_frame_size: usize,
}

/// Разобранная "шапка" кадра: команда, заголовки и смещение начала тела.
struct Head {
    command: Command,
    headers: Vec<(String, String)>,
    body_start: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StompDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: String::new(),
            max_frame_size,
        }
    }

    /// Добавляет очередной фрагмент текста в буфер.
    pub fn feed(
        &mut self,
        chunk: &str,
    ) -> Result<(), BusError> {
        self.buf.push_str(chunk);
        self.check_size()
    }

    /// Пытается извлечь следующий элемент из буфера.
    ///
    /// # Возвращает
    /// - `Ok(Some(Incoming::Heartbeat))` для пустой строки между кадрами
    /// - `Ok(Some(Incoming::Frame(_)))` для полного кадра
    /// - `Ok(None)` если данных пока недостаточно
    /// - `Err(BusError)` при нарушении протокола; буфер при этом очищается,
    ///   так как границу следующего кадра уже не восстановить
    pub fn decode(&mut self) -> Result<Option<Incoming>, BusError> {
        match self.try_decode() {
            Err(e) => {
                self.buf.clear();
                Err(e)
            }
            ok => ok,
        }
    }

    /// Подаёт фрагмент и сразу извлекает всё, что удалось разобрать.
    pub fn decode_all(
        &mut self,
        chunk: &str,
    ) -> Result<Vec<Incoming>, BusError> {
        self.feed(chunk)?;
        let mut out = Vec::new();
        while let Some(item) = self.decode()? {
            out.push(item);
        }
        Ok(out)
    }

    /// Количество ещё не разобранных байт.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Сбрасывает буфер (например, при смене соединения).
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    fn try_decode(&mut self) -> Result<Option<Incoming>, BusError> {
        if self.buf.starts_with('\n') {
            self.buf.drain(..1);
            return Ok(Some(Incoming::Heartbeat));
        }
        if self.buf.starts_with("\r\n") {
            self.buf.drain(..2);
            return Ok(Some(Incoming::Heartbeat));
        }
        if self.buf.is_empty() || self.buf == "\r" {
            return Ok(None);
        }

        let Some(head) = self.parse_head()? else {
            return self.incomplete();
        };

        let content_length = match lookup(&head.headers, "content-length") {
            Some(raw) => Some(raw.trim().parse::<usize>().map_err(|_| BusError::Protocol {
                reason: format!("invalid content-length: {raw:?}"),
            })?),
            None => None,
        };

        let body_end = match content_length {
            Some(len) => {
                if len > self.max_frame_size {
                    return Err(BusError::FrameTooLarge {
                        size: len,
                        max: self.max_frame_size,
                    });
                }
                let end = head.body_start + len;
                if self.buf.len() <= end {
                    return self.incomplete();
                }
                if !self.buf.is_char_boundary(end) || self.buf.as_bytes()[end] != 0 {
                    return Err(BusError::Protocol {
                        reason: "frame body is not terminated by NUL at content-length".into(),
                    });
                }
                end
            }
            None => match self.buf[head.body_start..].find('\0') {
                Some(offset) => head.body_start + offset,
                None => return self.incomplete(),
            },
        };

        let body = self.buf[head.body_start..body_end].to_string();
        self.buf.drain(..=body_end);

        trace!(command = %head.command, body_len = body.len(), "STOMP frame decoded");

        Ok(Some(Incoming::Frame(Frame {
            command: head.command,
            headers: head.headers,
            body,
        })))
    }

    /// Разбирает строку команды и заголовки. `None` — шапка ещё не пришла
    /// целиком.
    fn parse_head(&self) -> Result<Option<Head>, BusError> {
        let mut pos = 0;

        let Some((line, next)) = read_line(&self.buf, pos) else {
            return Ok(None);
        };
        let command: Command = line.parse()?;
        pos = next;

        let mut headers = Vec::new();
        loop {
            let Some((line, next)) = read_line(&self.buf, pos) else {
                return Ok(None);
            };
            pos = next;
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(BusError::InvalidHeader {
                    line: line.to_string(),
                });
            };
            if command.escapes_headers() {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        Ok(Some(Head {
            command,
            headers,
            body_start: pos,
        }))
    }

    fn incomplete(&self) -> Result<Option<Incoming>, BusError> {
        self.check_size()?;
        Ok(None)
    }

    fn check_size(&self) -> Result<(), BusError> {
        if self.buf.len() > self.max_frame_size {
            return Err(BusError::FrameTooLarge {
                size: self.buf.len(),
                max: self.max_frame_size,
            });
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние методы и функции
////////////////////////////////////////////////////////////////////////////////

/// Читает строку начиная с `pos`. Возвращает строку без EOL (`\n` или `\r\n`)
/// и позицию сразу после него.
fn read_line(
    buf: &str,
    pos: usize,
) -> Option<(&str, usize)> {
    let rest = &buf[pos..];
    let idx = rest.find('\n')?;
    let line = rest[..idx].strip_suffix('\r').unwrap_or(&rest[..idx]);
    Some((line, pos + idx + 1))
}

fn lookup<'a>(
    headers: &'a [(String, String)],
    name: &str,
) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Обратное преобразование к [`escape_header`](super::escape_header).
pub fn unescape_header(raw: &str) -> Result<String, BusError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => {
                return Err(BusError::InvalidEscape {
                    sequence: format!("\\{other}"),
                })
            }
            None => {
                return Err(BusError::InvalidEscape {
                    sequence: "\\".to_string(),
                })
            }
        }
    }
    Ok(out)
}

impl Default for StompDecoder {
    fn default() -> Self {
        Self::new()
    }
}
