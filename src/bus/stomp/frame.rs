use std::{fmt, str::FromStr, time::Duration};

use noticelink_error::BusError;

/// Версии протокола, которые клиент предлагает брокеру.
pub const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

/// Команда кадра STOMP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // клиентские
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    // серверные
    Connected,
    Message,
    Receipt,
    Error,
}

/// Кадр STOMP.
///
/// Заголовки хранятся в порядке появления. При повторе имени значащим
/// считается первое вхождение.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Результат разбора входящего текста.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Пустая строка (EOL), которой стороны поддерживают соединение.
    Heartbeat,
    Frame(Frame),
}

/// Согласованные интервалы heart-beat.
///
/// `None` означает, что в этом направлении heart-beat не используется.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Heartbeat {
    /// Как часто клиент обязан отправлять heart-beat.
    pub outgoing: Option<Duration>,
    /// Как часто брокер обещал присылать heart-beat.
    pub incoming: Option<Duration>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Command {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Экранируются ли заголовки этой команды.
    ///
    /// STOMP 1.2 запрещает экранирование в CONNECT и CONNECTED, чтобы
    /// клиенты 1.0 могли их разобрать.
    pub const fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Добавляет заголовок (builder).
    pub fn header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Устанавливает тело кадра (builder).
    pub fn with_body(
        mut self,
        body: impl Into<String>,
    ) -> Self {
        self.body = body.into();
        self
    }

    /// Значение заголовка по имени (первое вхождение).
    pub fn get(
        &self,
        name: &str,
    ) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Кадр CONNECT с предлагаемыми интервалами heart-beat (в миллисекундах)
    /// и дополнительными заголовками (например, `Authorization`).
    pub fn connect(
        host: &str,
        heart_beat: (u64, u64),
        extra: &[(String, String)],
    ) -> Self {
        let mut frame = Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header("heart-beat", format!("{},{}", heart_beat.0, heart_beat.1));
        for (name, value) in extra {
            frame = frame.header(name.clone(), value.clone());
        }
        frame
    }

    pub fn subscribe(
        id: &str,
        destination: &str,
    ) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    pub fn disconnect(receipt: Option<&str>) -> Self {
        let frame = Frame::new(Command::Disconnect);
        match receipt {
            Some(r) => frame.header("receipt", r),
            None => frame,
        }
    }

    /// Текст ошибки брокера: заголовок `message`, иначе тело кадра.
    pub fn error_message(&self) -> String {
        match self.get("message") {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => self.body.trim().to_string(),
        }
    }
}

impl Heartbeat {
    /// Согласует heart-beat по правилам STOMP 1.2.
    ///
    /// `client` — то, что клиент отправил в CONNECT (cx, cy), `server` —
    /// значение заголовка `heart-beat` из CONNECTED (sx, sy). Отправлять
    /// нужно раз в max(cx, sy), ожидать — раз в max(sx, cy); ноль с любой
    /// стороны отключает направление.
    pub fn negotiate(
        client: (u64, u64),
        server: Option<&str>,
    ) -> Self {
        let (sx, sy) = server.and_then(parse_heart_beat).unwrap_or((0, 0));
        let (cx, cy) = client;

        let outgoing = (cx != 0 && sy != 0).then(|| Duration::from_millis(cx.max(sy)));
        let incoming = (sx != 0 && cy != 0).then(|| Duration::from_millis(sx.max(cy)));

        Self { outgoing, incoming }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние методы и функции
////////////////////////////////////////////////////////////////////////////////

/// Разбирает значение заголовка `heart-beat` вида `"10000,10000"`.
pub fn parse_heart_beat(value: &str) -> Option<(u64, u64)> {
    let (x, y) = value.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl FromStr for Command {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "CONNECTED" => Self::Connected,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => {
                return Err(BusError::InvalidCommand {
                    command: other.to_string(),
                })
            }
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
