//! Клиент шины сообщений.
//!
//! Держит одно логическое соединение с брокером STOMP и переживает обрывы
//! транспорта: фоновый драйвер переподключается с фиксированной задержкой и
//! после каждого успешного подключения заново подписывает все желаемые
//! топики. Вызывающему коду не нужно ничего "возобновлять".

use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Weak},
};

use noticelink_error::{BusError, LogLevel, NoticeResult, ResultExt, StackError};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{interval_at, sleep, sleep_until, timeout, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::{
    config::BusConfig,
    registry::SubscriptionRegistry,
    stomp::{Command, Frame, Heartbeat, Incoming, StompDecoder, StompEncoder},
    subscription::SubscriptionHandle,
    transport::{Transport, TransportLink, WebSocketTransport},
};

/// Состояние соединения, видимое снаружи.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Клиент шины. Клоны разделяют одно соединение и один реестр подписок.
#[derive(Clone)]
pub struct BusClient {
    inner: Arc<Inner>,
}

/// Владелец драйвера: когда последний клон клиента уничтожен, драйвер
/// останавливается.
struct Inner {
    core: Arc<Core>,
}

/// Общее состояние клиента и драйвера.
pub(crate) struct Core {
    config: BusConfig,
    transport: Arc<dyn Transport>,
    shared: Mutex<Shared>,
    phase_tx: watch::Sender<Phase>,
    shutdown_tx: watch::Sender<bool>,
}

struct Shared {
    registry: SubscriptionRegistry,
    /// Исходящий канал текущей сессии, пока она подключена.
    session: Option<mpsc::UnboundedSender<String>>,
    driver: Option<JoinHandle<()>>,
}

/// Внутренняя фаза драйвера.
#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Connecting,
    Connected,
    /// Соединение потеряно, драйвер ждёт перед новой попыткой.
    Disconnected,
    /// Попытка закончилась ошибкой, которую нужно отдать вызывающим
    /// `connect()`: брокер отклонил рукопожатие или повторов не будет.
    Failed(StackError),
    Shutdown,
}

/// Установленная сессия STOMP.
struct Session {
    link: TransportLink,
    decoder: StompDecoder,
    heartbeat: Heartbeat,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl BusClient {
    pub fn new(
        config: BusConfig,
        transport: impl Transport,
    ) -> Self {
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(
        config: BusConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (phase_tx, _) = watch::channel(Phase::Idle);
        let (shutdown_tx, _) = watch::channel(false);
        let core = Arc::new(Core {
            config,
            transport,
            shared: Mutex::new(Shared {
                registry: SubscriptionRegistry::new(),
                session: None,
                driver: None,
            }),
            phase_tx,
            shutdown_tx,
        });
        Self {
            inner: Arc::new(Inner { core }),
        }
    }

    /// Клиент поверх WebSocket-транспорта.
    pub fn websocket(config: BusConfig) -> Self {
        let transport = WebSocketTransport::new(config.sockjs);
        Self::new(config, transport)
    }

    pub fn config(&self) -> &BusConfig {
        &self.core().config
    }

    /// Запускает (если нужно) фоновое подключение и ждёт его исхода.
    ///
    /// Все вызывающие, ожидающие одну и ту же попытку, получают один и тот
    /// же результат. Повторные вызовы не создают новых соединений. Если
    /// брокер отклонил рукопожатие, драйвер всё равно продолжит попытки
    /// после задержки; вызов, пришедший во время этой задержки, получит
    /// исход последней попытки.
    ///
    /// # Ошибки
    /// - `BusError::Rejected` — брокер ответил кадром ERROR;
    /// - `BusError::InvalidEndpoint` — адрес брокера не подходит транспорту;
    /// - `BusError::ConnectTimeout` — исход не получен за `connect_timeout`
    ///   (попытка продолжается в фоне);
    /// - `BusError::Shutdown` — клиент остановлен.
    pub async fn connect(&self) -> NoticeResult<()> {
        let core = self.core();
        let mut rx = core.phase_tx.subscribe();
        self.ensure_driver();

        let waited = timeout(
            core.config.connect_timeout,
            rx.wait_for(|p| matches!(p, Phase::Connected | Phase::Failed(_) | Phase::Shutdown)),
        )
        .await;

        let phase = match waited {
            Err(_) => return Err(BusError::ConnectTimeout.into()),
            Ok(Err(_)) => return Err(BusError::Shutdown.into()),
            Ok(Ok(phase)) => phase.clone(),
        };
        match phase {
            Phase::Connected => Ok(()),
            Phase::Failed(e) => Err(e),
            _ => Err(BusError::Shutdown.into()),
        }
    }

    /// Подписывает обработчик на JSON-сообщения топика.
    ///
    /// Желаемая подписка записывается сразу, независимо от состояния
    /// соединения. При открытом соединении живая подписка создаётся тут же,
    /// иначе при ближайшем подключении.
    pub fn subscribe_json<F>(
        &self,
        topic: &str,
        handler: F,
    ) -> SubscriptionHandle
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let core = self.core();
        let handle_id = {
            let mut shared = core.shared.lock();
            let handle_id = shared.registry.register(topic, Arc::new(handler));
            if let Some(tx) = shared.session.clone() {
                if let Some(frame) = shared.registry.activate(topic) {
                    send_frame(&tx, &frame);
                }
            }
            handle_id
        };
        debug!(topic, handle_id, "Subscription registered");

        self.ensure_driver();
        SubscriptionHandle::new(Arc::downgrade(core), topic, handle_id)
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(&*self.core().phase_tx.borrow())
    }

    /// Ждёт, пока соединение не перейдёт в состояние `target`.
    pub async fn wait_for_state(
        &self,
        target: ConnectionState,
    ) {
        let mut rx = self.core().phase_tx.subscribe();
        let _ = rx.wait_for(|p| ConnectionState::from(p) == target).await;
    }

    pub fn desired_topics(&self) -> Vec<String> {
        self.core().shared.lock().registry.desired_topics()
    }

    pub fn live_topics(&self) -> Vec<String> {
        self.core().shared.lock().registry.live_topics()
    }

    /// Останавливает драйвер: отправляет DISCONNECT, закрывает транспорт и
    /// больше не переподключается. Желаемые подписки сохраняются.
    pub async fn shutdown(&self) {
        let core = self.core();
        core.shutdown_tx.send_replace(true);
        core.phase_tx.send_replace(Phase::Shutdown);
        let driver = core.shared.lock().driver.take();
        if let Some(driver) = driver {
            let _ = driver.await;
        }
        info!("Bus client shut down");
    }

    fn core(&self) -> &Arc<Core> {
        &self.inner.core
    }

    /// Запускает драйвер, если он ещё не работает.
    fn ensure_driver(&self) {
        let core = self.core();
        if core.is_shut_down() {
            return;
        }
        let mut shared = core.shared.lock();
        if shared.driver.as_ref().is_some_and(|d| !d.is_finished()) {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("No tokio runtime available, bus connection not started");
            return;
        };
        core.phase_tx.send_replace(Phase::Connecting);
        shared.driver = Some(runtime.spawn(drive(core.clone())));
    }
}

impl Core {
    fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    fn set_phase(
        &self,
        phase: Phase,
    ) {
        if self.is_shut_down() && !matches!(phase, Phase::Shutdown) {
            return;
        }
        self.phase_tx.send_replace(phase);
    }

    /// Снимает желаемую подписку владельца `handle_id` и, если она была
    /// живой, отправляет UNSUBSCRIBE.
    pub(crate) fn release(
        &self,
        topic: &str,
        handle_id: u64,
    ) {
        let mut shared = self.shared.lock();
        let Some(frame) = shared.registry.remove(topic, handle_id) else {
            return;
        };
        debug!(topic, handle_id, "Subscription removed");
        if let (Some(frame), Some(tx)) = (frame, shared.session.as_ref()) {
            send_frame(tx, &frame);
        }
    }

    /// Открывает транспорт и выполняет рукопожатие CONNECT/CONNECTED.
    async fn establish(&self) -> NoticeResult<Session> {
        let endpoint = self.config.endpoint_address();
        let mut link = self
            .transport
            .open(&endpoint)
            .await
            .with_context(|| format!("opening bus transport to {endpoint}"))?;

        let host = Url::parse(&self.config.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "/".to_string());
        let offered = self.config.heart_beat_millis();
        let connect = Frame::connect(&host, offered, &self.config.connect_headers);
        let text = StompEncoder::encode(&connect)?;
        if link.outbound.send(text).is_err() {
            return Err(BusError::ConnectionClosed.into());
        }

        let mut decoder = StompDecoder::with_max_frame_size(self.config.max_frame_size);
        let handshake = async {
            loop {
                let Some(text) = link.inbound.recv().await else {
                    return Err(BusError::ConnectionClosed);
                };
                decoder.feed(&text)?;
                while let Some(item) = decoder.decode()? {
                    let Incoming::Frame(frame) = item else {
                        continue;
                    };
                    return match frame.command {
                        Command::Connected => Ok(frame),
                        Command::Error => Err(BusError::Rejected {
                            message: frame.error_message(),
                        }),
                        other => Err(BusError::Protocol {
                            reason: format!("unexpected {other} frame before CONNECTED"),
                        }),
                    };
                }
            }
        };
        let connected = timeout(self.config.connect_timeout, handshake)
            .await
            .map_err(|_| BusError::ConnectTimeout)??;

        let heartbeat = Heartbeat::negotiate(offered, connected.get("heart-beat"));
        debug!(
            version = connected.get("version").unwrap_or("1.0"),
            outgoing = ?heartbeat.outgoing,
            incoming = ?heartbeat.incoming,
            "STOMP session established"
        );

        Ok(Session {
            link,
            decoder,
            heartbeat,
        })
    }

    /// Публикует исходящий канал и восстанавливает все желаемые подписки.
    /// Кадры отправляются под блокировкой, чтобы параллельная отписка не
    /// обогнала свой SUBSCRIBE.
    fn on_connected(
        &self,
        outbound: &mpsc::UnboundedSender<String>,
    ) {
        let mut shared = self.shared.lock();
        shared.session = Some(outbound.clone());
        let frames = shared.registry.resubscribe_all();
        for frame in &frames {
            send_frame(outbound, frame);
        }
        if !frames.is_empty() {
            info!(count = frames.len(), "Resubscribed desired topics");
        }
    }

    fn on_disconnected(&self) {
        let mut shared = self.shared.lock();
        shared.session = None;
        shared.registry.clear_live();
    }

    /// Обслуживает сессию до её завершения и возвращает причину.
    async fn run_session(
        &self,
        session: Session,
        stop: &mut watch::Receiver<bool>,
    ) -> BusError {
        let Session {
            mut link,
            mut decoder,
            heartbeat,
        } = session;

        // кадры, пришедшие в одном сообщении с CONNECTED
        loop {
            match decoder.decode() {
                Ok(Some(item)) => {
                    if let Some(reason) = self.handle_incoming(item) {
                        return reason;
                    }
                }
                Ok(None) => break,
                Err(e) => return e,
            }
        }

        let mut ticker = heartbeat.outgoing.map(|period| {
            let mut t = interval_at(Instant::now() + period, period);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        });
        let mut last_seen = Instant::now();

        loop {
            let silence_deadline = heartbeat.incoming.map(|d| last_seen + d * 2);
            tokio::select! {
                msg = link.inbound.recv() => {
                    let Some(text) = msg else {
                        return BusError::ConnectionClosed;
                    };
                    last_seen = Instant::now();
                    if let Err(e) = decoder.feed(&text) {
                        return e;
                    }
                    loop {
                        match decoder.decode() {
                            Ok(Some(item)) => {
                                if let Some(reason) = self.handle_incoming(item) {
                                    return reason;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => return e,
                        }
                    }
                }
                _ = tick(&mut ticker) => {
                    trace!("Sending heartbeat");
                    if link.outbound.send("\n".to_string()).is_err() {
                        return BusError::ConnectionClosed;
                    }
                }
                _ = expire(silence_deadline) => {
                    return BusError::HeartbeatTimeout {
                        silent_ms: last_seen.elapsed().as_millis() as u64,
                    };
                }
                _ = stop.wait_for(|s| *s) => {
                    send_frame(&link.outbound, &Frame::disconnect(None));
                    return BusError::Shutdown;
                }
            }
        }
    }

    /// Обрабатывает входящий элемент. `Some` — сессию нужно завершить.
    fn handle_incoming(
        &self,
        item: Incoming,
    ) -> Option<BusError> {
        let frame = match item {
            Incoming::Heartbeat => {
                trace!("Heartbeat received");
                return None;
            }
            Incoming::Frame(frame) => frame,
        };
        match frame.command {
            Command::Message => self.dispatch(&frame),
            Command::Error => {
                let message = frame.error_message();
                warn!(message = %message, "Broker sent ERROR");
                return Some(BusError::Protocol {
                    reason: format!("broker error: {message}"),
                });
            }
            Command::Receipt => debug!(receipt = frame.get("receipt-id"), "Receipt received"),
            other => debug!(command = %other, "Ignoring unexpected frame"),
        }
        None
    }

    /// Доставляет MESSAGE обработчику подписки.
    fn dispatch(
        &self,
        frame: &Frame,
    ) {
        let Some(stomp_id) = frame.get("subscription") else {
            debug!("MESSAGE without subscription header");
            return;
        };
        let Some((topic, handler)) = self.shared.lock().registry.route(stomp_id) else {
            debug!(subscription = stomp_id, "MESSAGE for unknown subscription");
            return;
        };
        let value: Value = match serde_json::from_str(&frame.body) {
            Ok(v) => v,
            Err(e) => {
                debug!(topic = %topic, error = %e, "Dropping message with non-JSON body");
                return;
            }
        };
        if catch_unwind(AssertUnwindSafe(|| handler(value))).is_err() {
            error!(topic = %topic, "Subscription handler panicked");
        }
    }
}

/// Цикл драйвера: подключение, сессия, задержка, снова.
async fn drive(core: Arc<Core>) {
    let mut stop = core.shutdown_tx.subscribe();
    let endpoint = core.config.endpoint_address();
    let retry = core.config.reconnect.delay();
    let mut attempt: u64 = 0;

    loop {
        if core.is_shut_down() {
            break;
        }
        attempt += 1;
        core.set_phase(Phase::Connecting);
        debug!(attempt, endpoint = %endpoint, "Connecting to bus");

        let outcome = tokio::select! {
            r = core.establish() => r,
            _ = stop.wait_for(|s| *s) => break,
        };

        match outcome {
            Ok(session) => {
                info!(attempt, endpoint = %endpoint, "Bus connected");
                core.on_connected(&session.link.outbound);
                core.set_phase(Phase::Connected);

                let reason = core.run_session(session, &mut stop).await;
                core.on_disconnected();
                if matches!(reason, BusError::Shutdown) {
                    break;
                }
                warn!(error = %reason, "Bus connection lost");
                core.set_phase(match retry {
                    Some(_) => Phase::Disconnected,
                    None => Phase::Failed(reason.into()),
                });
            }
            Err(e) => {
                log_attempt_failure(attempt, &e);
                core.set_phase(if !e.is_retryable() || retry.is_none() {
                    Phase::Failed(e)
                } else {
                    Phase::Disconnected
                });
            }
        }

        let Some(delay) = retry else {
            break;
        };
        debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
        tokio::select! {
            _ = sleep(delay) => {}
            _ = stop.wait_for(|s| *s) => break,
        }
    }
    debug!("Bus driver stopped");
}

/// Логирует неудачную попытку на уровне, который подсказывает код ошибки.
fn log_attempt_failure(
    attempt: u64,
    e: &StackError,
) {
    let code = e.status_code();
    match e.log_level() {
        LogLevel::Error => error!(attempt, %code, error = %e, "Bus connection attempt failed"),
        LogLevel::Warn => warn!(attempt, %code, error = %e, "Bus connection attempt failed"),
        LogLevel::Info => info!(attempt, %code, error = %e, "Bus connection attempt failed"),
        LogLevel::Debug | LogLevel::Trace => {
            debug!(attempt, %code, error = %e, "Bus connection attempt failed")
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(d) => sleep_until(d).await,
        None => std::future::pending().await,
    }
}

fn send_frame(
    tx: &mpsc::UnboundedSender<String>,
    frame: &Frame,
) {
    match StompEncoder::encode(frame) {
        Ok(text) => {
            if tx.send(text).is_err() {
                debug!(command = %frame.command, "Session closed, frame not sent");
            }
        }
        Err(e) => warn!(command = %frame.command, error = %e, "Failed to encode frame"),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Drop for Inner {
    fn drop(&mut self) {
        self.core.shutdown_tx.send_replace(true);
        if let Some(driver) = self.core.shared.lock().driver.take() {
            driver.abort();
        }
    }
}

impl From<&Phase> for ConnectionState {
    fn from(phase: &Phase) -> Self {
        match phase {
            Phase::Connecting => Self::Connecting,
            Phase::Connected => Self::Connected,
            Phase::Idle | Phase::Disconnected | Phase::Failed(_) | Phase::Shutdown => {
                Self::Disconnected
            }
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

impl fmt::Debug for BusClient {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("BusClient")
            .field("endpoint", &self.config().endpoint_address())
            .field("state", &self.state())
            .finish()
    }
}

/// Слабая ссылка на ядро для подписок.
pub(crate) type WeakCore = Weak<Core>;
