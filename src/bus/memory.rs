//! Брокер STOMP в памяти процесса.
//!
//! Реализует [`Transport`], поэтому клиент шины работает с ним так же, как с
//! настоящим WebSocket. Используется в тестах.
//! Позволяет управлять поведением брокера: отказывать в открытии соединения,
//! отклонять рукопожатие кадром ERROR, рвать все соединения.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use noticelink_error::{BusError, NoticeResult};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{
    stomp::{Command, Frame, Incoming, StompDecoder, StompEncoder},
    transport::{Transport, TransportLink},
};

#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

#[derive(Default)]
struct BrokerInner {
    state: Mutex<BrokerState>,
    opens: AtomicUsize,
    heartbeats: AtomicUsize,
    next_session: AtomicU64,
    next_message: AtomicU64,
}

#[derive(Default)]
struct BrokerState {
    sessions: HashMap<u64, Session>,
    refuse: usize,
    reject: usize,
    server_heart_beat: Option<String>,
}

struct Session {
    to_client: mpsc::UnboundedSender<String>,
    /// id подписки -> destination
    subscriptions: HashMap<String, String>,
}

/// Снимок одной подписки на брокере.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSubscription {
    pub session: u64,
    pub id: String,
    pub destination: String,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Значение `heart-beat`, которое брокер вернёт в CONNECTED.
    /// По умолчанию `0,0`.
    pub fn set_server_heart_beat(
        &self,
        value: &str,
    ) {
        self.inner.state.lock().server_heart_beat = Some(value.to_string());
    }

    /// Следующие `n` попыток открыть соединение завершатся ошибкой.
    pub fn refuse_next(
        &self,
        n: usize,
    ) {
        self.inner.state.lock().refuse = n;
    }

    /// Следующие `n` рукопожатий будут отклонены кадром ERROR.
    pub fn reject_next(
        &self,
        n: usize,
    ) {
        self.inner.state.lock().reject = n;
    }

    /// Рвёт все текущие соединения.
    pub fn drop_all(&self) {
        let dropped = std::mem::take(&mut self.inner.state.lock().sessions);
        debug!(sessions = dropped.len(), "Memory broker dropped all sessions");
    }

    /// Рассылает MESSAGE всем подписчикам `destination`. Возвращает число
    /// доставленных кадров.
    pub fn publish(
        &self,
        destination: &str,
        body: &str,
    ) -> usize {
        let state = self.inner.state.lock();
        let mut delivered = 0;
        for session in state.sessions.values() {
            for (id, dest) in &session.subscriptions {
                if dest != destination {
                    continue;
                }
                let message_id = self.inner.next_message.fetch_add(1, Ordering::Relaxed);
                let frame = Frame::new(Command::Message)
                    .header("destination", destination)
                    .header("subscription", id.as_str())
                    .header("message-id", message_id.to_string())
                    .header("content-type", "application/json")
                    .with_body(body);
                if send_frame(&session.to_client, &frame) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub fn publish_json(
        &self,
        destination: &str,
        value: &Value,
    ) -> usize {
        self.publish(destination, &value.to_string())
    }

    /// Отправляет произвольный текст во все соединения как есть.
    pub fn send_raw(
        &self,
        text: &str,
    ) {
        for session in self.inner.state.lock().sessions.values() {
            let _ = session.to_client.send(text.to_string());
        }
    }

    pub fn subscriptions(&self) -> Vec<BrokerSubscription> {
        let state = self.inner.state.lock();
        let mut out: Vec<_> = state
            .sessions
            .iter()
            .flat_map(|(sid, s)| {
                s.subscriptions.iter().map(|(id, dest)| BrokerSubscription {
                    session: *sid,
                    id: id.clone(),
                    destination: dest.clone(),
                })
            })
            .collect();
        out.sort_by(|a, b| (a.session, &a.id).cmp(&(b.session, &b.id)));
        out
    }

    pub fn subscription_count(
        &self,
        destination: &str,
    ) -> usize {
        self.subscriptions()
            .iter()
            .filter(|s| s.destination == destination)
            .count()
    }

    /// Сколько раз открывалось соединение (включая отказы).
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn active_sessions(&self) -> usize {
        self.inner.state.lock().sessions.len()
    }

    pub fn heartbeats_received(&self) -> usize {
        self.inner.heartbeats.load(Ordering::SeqCst)
    }

    /// Ждёт, пока на `destination` не окажется ровно `count` подписок.
    /// Возвращает `false`, если этого не произошло за `within`.
    pub async fn wait_for_subscriptions(
        &self,
        destination: &str,
        count: usize,
        within: Duration,
    ) -> bool {
        self.wait_until(within, |b| b.subscription_count(destination) == count)
            .await
    }

    /// Опрашивает состояние брокера, пока условие не выполнится.
    pub async fn wait_until<F>(
        &self,
        within: Duration,
        cond: F,
    ) -> bool
    where
        F: Fn(&MemoryBroker) -> bool,
    {
        let step = Duration::from_millis(5);
        let mut waited = Duration::ZERO;
        loop {
            if cond(self) {
                return true;
            }
            if waited >= within {
                return false;
            }
            tokio::time::sleep(step).await;
            waited += step;
        }
    }

    fn handle(
        &self,
        session: u64,
        incoming: Incoming,
    ) -> bool {
        let frame = match incoming {
            Incoming::Heartbeat => {
                self.inner.heartbeats.fetch_add(1, Ordering::SeqCst);
                return true;
            }
            Incoming::Frame(f) => f,
        };
        trace!(session, command = %frame.command, "Memory broker received frame");

        let mut state = self.inner.state.lock();
        let server_heart_beat = state
            .server_heart_beat
            .clone()
            .unwrap_or_else(|| "0,0".to_string());
        let reject = state.reject > 0;
        if reject && matches!(frame.command, Command::Connect | Command::Stomp) {
            state.reject -= 1;
        }
        let Some(s) = state.sessions.get_mut(&session) else {
            return false;
        };

        match frame.command {
            Command::Connect | Command::Stomp if reject => {
                let error = Frame::new(Command::Error)
                    .header("message", "Access denied")
                    .with_body("handshake rejected by memory broker");
                send_frame(&s.to_client, &error);
                state.sessions.remove(&session);
                false
            }
            Command::Connect | Command::Stomp => {
                let connected = Frame::new(Command::Connected)
                    .header("version", "1.2")
                    .header("heart-beat", server_heart_beat);
                send_frame(&s.to_client, &connected);
                true
            }
            Command::Subscribe => {
                if let (Some(id), Some(dest)) = (frame.get("id"), frame.get("destination")) {
                    s.subscriptions.insert(id.to_string(), dest.to_string());
                }
                true
            }
            Command::Unsubscribe => {
                if let Some(id) = frame.get("id") {
                    s.subscriptions.remove(id);
                }
                true
            }
            Command::Disconnect => {
                if let Some(receipt) = frame.get("receipt") {
                    let reply = Frame::new(Command::Receipt).header("receipt-id", receipt);
                    send_frame(&s.to_client, &reply);
                }
                state.sessions.remove(&session);
                false
            }
            _ => true,
        }
    }
}

fn send_frame(
    tx: &mpsc::UnboundedSender<String>,
    frame: &Frame,
) -> bool {
    match StompEncoder::encode(frame) {
        Ok(text) => tx.send(text).is_ok(),
        Err(_) => false,
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl Transport for MemoryBroker {
    async fn open(
        &self,
        endpoint: &str,
    ) -> NoticeResult<TransportLink> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);

        let session = self.inner.next_session.fetch_add(1, Ordering::SeqCst);
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, mut from_client) = mpsc::unbounded_channel::<String>();
        {
            let mut state = self.inner.state.lock();
            if state.refuse > 0 {
                state.refuse -= 1;
                return Err(BusError::ConnectionFailed {
                    endpoint: endpoint.to_string(),
                    reason: "connection refused by memory broker".to_string(),
                }
                .into());
            }
            state.sessions.insert(
                session,
                Session {
                    to_client,
                    subscriptions: HashMap::new(),
                },
            );
        }

        let broker = self.clone();
        tokio::spawn(async move {
            let mut decoder = StompDecoder::new();
            'session: while let Some(text) = from_client.recv().await {
                let items = match decoder.decode_all(&text) {
                    Ok(items) => items,
                    Err(e) => {
                        debug!(session, error = %e, "Memory broker got a malformed frame");
                        break;
                    }
                };
                for item in items {
                    if !broker.handle(session, item) {
                        break 'session;
                    }
                }
            }
            broker.inner.state.lock().sessions.remove(&session);
        });

        Ok(TransportLink { outbound, inbound })
    }
}
