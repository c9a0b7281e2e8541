// Venue connection module
pub mod listeners;

pub use listeners::{Listener, ListenerId, ListenerRegistry};

use crate::api::{InboundMessage, OutboundRequest, SymbolInfo};
use crate::error::ConnectionError;
use crate::execution::market_feed::{tradable_symbols, FeedUpdate, MarketFeed};
use crate::execution::DigitStore;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Ticks requested per symbol when (re)subscribing
pub const HISTORY_COUNT: usize = 1000;

pub const DEFAULT_ENDPOINT: &str = "wss://ws.derivws.com/websockets/v3?app_id=1089";

/// Transport and health settings
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Full WebSocket URL including the `app_id` query
    pub endpoint: String,
    /// Forwarded as-is in an `authorize` request when set
    pub api_token: Option<String>,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub backoff_multiplier: f64,
    /// Spread of the random jitter applied to each delay (0.2 = ±10%)
    pub jitter_factor: f64,
    pub connect_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_token: None,
            heartbeat_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Delay before reconnect attempt `attempt` (0-based)
///
/// `reconnect_delay * multiplier^attempt`, capped at `max_reconnect_delay`,
/// then spread by the jitter factor. Never below 100ms.
pub fn backoff_delay(attempt: u32, settings: &ConnectionSettings) -> Duration {
    let base = settings.reconnect_delay.as_secs_f64()
        * settings.backoff_multiplier.powi(attempt.min(32) as i32);
    let capped = base.min(settings.max_reconnect_delay.as_secs_f64());

    let spread = settings.jitter_factor.abs() * 0.5;
    let jitter = if spread > 0.0 {
        rand::thread_rng().gen_range(-spread..=spread)
    } else {
        0.0
    };

    Duration::from_secs_f64((capped * (1.0 + jitter)).max(0.1))
}

struct Inner {
    settings: ConnectionSettings,
    state: RwLock<ConnectionState>,
    manual_close: AtomicBool,
    attempts: AtomicU32,
    /// Generation of the newest session; older readers retire quietly
    session: AtomicU64,
    outbound: Mutex<Option<UnboundedSender<Message>>>,
    reconnect: Mutex<Option<JoinHandle<()>>>,
    listeners: ListenerRegistry,
    feed: Mutex<MarketFeed>,
    symbols: RwLock<Vec<String>>,
    currency: RwLock<String>,
}

/// One shared WebSocket session to the venue
///
/// Cloning yields another handle to the same session. Frames are decoded,
/// applied to the digit store, then fanned out to listeners in arrival
/// order. A close that was not requested schedules exactly one reconnect
/// with exponential backoff; a manual `connect` cancels it.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(settings: ConnectionSettings, store: DigitStore) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                state: RwLock::new(ConnectionState::Idle),
                manual_close: AtomicBool::new(false),
                attempts: AtomicU32::new(0),
                session: AtomicU64::new(0),
                outbound: Mutex::new(None),
                reconnect: Mutex::new(None),
                listeners: ListenerRegistry::new(),
                feed: Mutex::new(MarketFeed::new(store)),
                symbols: RwLock::new(Vec::new()),
                currency: RwLock::new("USD".to_string()),
            }),
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> ConnectionState {
        *self
            .inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }

    pub fn subscribe(&self) -> Listener {
        self.inner.listeners.register()
    }

    pub fn store(&self) -> DigitStore {
        self.lock_feed().store().clone()
    }

    /// Account currency from the last balance update, `USD` until known
    pub fn currency(&self) -> String {
        self.inner
            .currency
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Symbols subscribed on every (re)connect; empty means all continuous indices
    pub fn track(&self, symbols: Vec<String>) {
        *self
            .inner
            .symbols
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = symbols;
    }

    pub fn tracked_symbols(&self) -> Vec<String> {
        self.inner
            .symbols
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Open the session, cancelling any scheduled reconnect
    ///
    /// On failure a reconnect is still scheduled; the error is returned so
    /// the caller can report it.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        if let Some(pending) = self.lock_reconnect().take() {
            pending.abort();
            tracing::debug!("Cancelled pending reconnect");
        }
        if matches!(
            self.state(),
            ConnectionState::Open | ConnectionState::Connecting
        ) {
            self.inner.manual_close.store(false, Ordering::SeqCst);
            return Ok(());
        }

        // a session still closing is retired before the flag is cleared
        let session = self.begin_session();
        self.inner.manual_close.store(false, Ordering::SeqCst);
        self.establish(session).await
    }

    /// Close without reconnecting
    pub fn close(&self) {
        self.inner.manual_close.store(true, Ordering::SeqCst);
        if let Some(pending) = self.lock_reconnect().take() {
            pending.abort();
        }

        match self.state() {
            ConnectionState::Open => {
                self.set_state(ConnectionState::Closing);
                if let Some(tx) = self.lock_outbound().as_ref() {
                    let _ = tx.send(Message::Close(None));
                }
                tracing::info!("Closing connection");
            }
            ConnectionState::Closing | ConnectionState::Connecting => {}
            _ => self.set_state(ConnectionState::Closed),
        }
    }

    /// Queue a request; false when the transport is not open
    pub fn send(&self, request: &OutboundRequest) -> bool {
        if !self.is_open() {
            tracing::trace!(kind = request.kind(), "Dropped request while not open");
            return false;
        }

        let payload = match request.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(kind = request.kind(), "Failed to encode request: {}", e);
                return false;
            }
        };

        match self.lock_outbound().as_ref() {
            Some(tx) => tx.send(Message::Text(payload)).is_ok(),
            None => false,
        }
    }

    /// Drop any tick streams and re-request history plus live ticks
    pub fn subscribe_symbols(&self, symbols: &[String]) -> usize {
        if symbols.is_empty() {
            return 0;
        }
        self.send(&OutboundRequest::forget_all_ticks());
        let sent = symbols
            .iter()
            .filter(|symbol| self.send(&OutboundRequest::ticks_history(symbol, HISTORY_COUNT, true)))
            .count();
        tracing::info!(symbols = sent, "📡 Subscribed to tick streams");
        sent
    }

    fn begin_session(&self) -> u64 {
        self.inner.session.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, session: u64) -> bool {
        self.inner.session.load(Ordering::SeqCst) == session
    }

    async fn establish(&self, session: u64) -> Result<(), ConnectionError> {
        self.set_state(ConnectionState::Connecting);
        tracing::info!(endpoint = %self.inner.settings.endpoint, session, "🔌 Connecting");

        match self.dial().await {
            Ok(_) if self.inner.manual_close.load(Ordering::SeqCst) => {
                tracing::info!("Closed while connecting, dropping session");
                self.set_state(ConnectionState::Closed);
                Ok(())
            }
            Ok(stream) => {
                self.start_session(stream, session);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Connection failed: {}", e);
                self.on_session_end(session, false);
                Err(e)
            }
        }
    }

    async fn dial(&self) -> Result<WsStream, ConnectionError> {
        let limit = self.inner.settings.connect_timeout;
        let (stream, _) = tokio::time::timeout(limit, connect_async(self.inner.settings.endpoint.as_str()))
            .await
            .map_err(|_| ConnectionError::Timeout(limit))??;
        Ok(stream)
    }

    fn start_session(&self, stream: WsStream, session: u64) {
        let (mut sink, mut reader) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *self.lock_outbound() = Some(tx);
        self.inner.attempts.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Open);
        tracing::info!("✅ Connected");

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    tracing::warn!("Write failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let heartbeat = {
            let manager = self.clone();
            tokio::spawn(async move { manager.heartbeat(session).await })
        };

        let manager = self.clone();
        tokio::spawn(async move {
            manager.bootstrap();
            manager
                .inner
                .listeners
                .broadcast(Arc::new(InboundMessage::Connected));

            while let Some(frame) = reader.next().await {
                if !manager.is_current(session) {
                    break;
                }
                match frame {
                    Ok(Message::Text(text)) => manager.dispatch(&text),
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "Close frame received");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Read failed: {}", e);
                        break;
                    }
                }
            }

            heartbeat.abort();
            writer.abort();
            manager.on_session_end(session, true);
        });
    }

    async fn heartbeat(&self, session: u64) {
        let mut ticker = tokio::time::interval(self.inner.settings.heartbeat_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !self.is_current(session) || !self.send(&OutboundRequest::ping()) {
                break;
            }
            tracing::trace!("Heartbeat sent");
        }
    }

    fn bootstrap(&self) {
        match self.inner.settings.api_token.as_deref() {
            Some(token) if !token.is_empty() => {
                self.send(&OutboundRequest::authorize(token));
            }
            _ => {
                self.send(&OutboundRequest::active_symbols());
            }
        }
    }

    fn dispatch(&self, text: &str) {
        let mut message = match InboundMessage::decode(text).map_err(ConnectionError::from) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("Skipping frame: {}", e);
                return;
            }
        };

        match &message {
            InboundMessage::Authorized(account) => {
                tracing::info!(loginid = ?account.loginid, "🔑 Authorized");
                if let Some(currency) = &account.currency {
                    self.set_currency(currency);
                }
                self.send(&OutboundRequest::balance());
                self.send(&OutboundRequest::active_symbols());
            }
            InboundMessage::Balance(update) => {
                if let Some(currency) = &update.currency {
                    self.set_currency(currency);
                }
                tracing::info!(balance = %update.balance, currency = ?update.currency, "💰 Balance");
            }
            InboundMessage::Error(error) if error.msg_type == "authorize" => {
                tracing::error!(code = %error.code, "Authorization failed: {}", error.message);
                self.send(&OutboundRequest::active_symbols());
            }
            _ => {}
        }

        let update = self.lock_feed().ingest(&mut message);
        if let (Some(FeedUpdate::Symbols { .. }), InboundMessage::ActiveSymbols(listing)) =
            (&update, &message)
        {
            self.subscribe_markets(listing);
        }

        self.inner.listeners.broadcast(Arc::new(message));
    }

    fn subscribe_markets(&self, listing: &[SymbolInfo]) {
        let mut symbols = self.tracked_symbols();
        if symbols.is_empty() {
            symbols = tradable_symbols(listing);
            tracing::info!(count = symbols.len(), "Tracking all continuous indices");
            self.track(symbols.clone());
        }
        self.subscribe_symbols(&symbols);
    }

    /// Ends a session; only the newest one may touch shared state
    fn on_session_end(&self, session: u64, was_open: bool) {
        if !self.is_current(session) {
            tracing::debug!(session, "Superseded session ended");
            return;
        }
        self.on_closed(was_open);
    }

    fn on_closed(&self, was_open: bool) {
        self.lock_outbound().take();
        self.set_state(ConnectionState::Closed);

        if was_open {
            tracing::warn!("Connection closed");
            self.inner
                .listeners
                .broadcast(Arc::new(InboundMessage::Disconnected));
        }

        if self.inner.manual_close.load(Ordering::SeqCst) {
            return;
        }
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&self) {
        let attempt = self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = backoff_delay(attempt, &self.inner.settings);
        tracing::warn!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "🔄 Reconnect scheduled"
        );

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.lock_reconnect().take();
            if manager.inner.manual_close.load(Ordering::SeqCst) {
                return;
            }
            // failures reschedule from inside `establish`
            let session = manager.begin_session();
            if let Err(e) = manager.establish(session).await {
                tracing::warn!(attempt = attempt + 1, "Reconnect attempt failed: {}", e);
            }
        });

        if let Some(previous) = self.lock_reconnect().replace(handle) {
            previous.abort();
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self
            .inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    fn set_currency(&self, currency: &str) {
        *self
            .inner
            .currency
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = currency.to_string();
    }

    fn lock_outbound(&self) -> MutexGuard<'_, Option<UnboundedSender<Message>>> {
        self.inner
            .outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_reconnect(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .reconnect
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_feed(&self) -> MutexGuard<'_, MarketFeed> {
        self.inner
            .feed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
