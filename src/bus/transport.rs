//! Транспорт шины: канал текстовых сообщений до брокера.
//!
//! Клиент шины не знает, как устроено соединение. Он открывает
//! [`TransportLink`] и обменивается через него строками, в которых лежат
//! кадры STOMP. Закрытие входящего канала означает обрыв сокета.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use noticelink_error::{BusError, NoticeResult};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, trace, warn};
use url::Url;

/// Открытое соединение с брокером.
pub struct TransportLink {
    /// Исходящие текстовые сообщения.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Входящие сообщения; `None` — соединение закрыто.
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Способ установить соединение с брокером.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(
        &self,
        endpoint: &str,
    ) -> NoticeResult<TransportLink>;
}

/// Транспорт поверх WebSocket (tokio-tungstenite).
///
/// Брокер публикует точку подключения SockJS; вместо протокола фолбэков
/// используется её raw-websocket путь `<endpoint>/websocket`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    sockjs: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl WebSocketTransport {
    pub fn new(sockjs: bool) -> Self {
        Self { sockjs }
    }
}

/// Переводит HTTP-адрес точки подключения в адрес WebSocket.
///
/// `http://host:8080/ws` -> `ws://host:8080/ws/websocket` (при `sockjs`).
pub fn websocket_url(
    endpoint: &str,
    sockjs: bool,
) -> Result<Url, BusError> {
    let invalid = |reason: String| BusError::InvalidEndpoint {
        url: endpoint.to_string(),
        reason,
    };

    let mut url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid(format!("cannot switch scheme to '{scheme}'")))?;

    if sockjs {
        let path = format!("{}/websocket", url.path().trim_end_matches('/'));
        url.set_path(&path);
    }
    Ok(url)
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(
        &self,
        endpoint: &str,
    ) -> NoticeResult<TransportLink> {
        let url = websocket_url(endpoint, self.sockjs)?;
        debug!(url = %url, "Opening websocket");

        let (stream, _) =
            connect_async(url.as_str())
                .await
                .map_err(|e| BusError::ConnectionFailed {
                    endpoint: url.to_string(),
                    reason: e.to_string(),
                })?;
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        // Писатель завершается, когда клиент бросает outbound.
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    debug!(error = %e, "Websocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Читатель завершается вместе с сокетом; закрытие in_tx клиент
        // видит как обрыв.
        tokio::spawn(async move {
            while let Some(item) = source.next().await {
                let text = match item {
                    Ok(Message::Text(t)) => t.to_string(),
                    Ok(Message::Binary(b)) => match String::from_utf8(b.to_vec()) {
                        Ok(t) => t,
                        Err(_) => {
                            warn!("Dropping non UTF-8 binary websocket message");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "Websocket closed by peer");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(error = %e, "Websocket read failed");
                        break;
                    }
                };
                trace!(len = text.len(), "Websocket message received");
                if in_tx.send(text).is_err() {
                    break;
                }
            }
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
