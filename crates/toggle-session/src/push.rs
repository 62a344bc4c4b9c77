//! Push channel over `/ws/flag-monitor`
//!
//! One background task owns the socket. Subscribers receive every decoded
//! [`PushEvent`] except keep-alive answers. The task:
//! - Sends a text `ping` on a fixed interval
//! - Reconnects after abnormal closes with linear backoff
//! - Stops on a normal close, exhausted reconnects, or [`PushChannel::close`]

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use toggle_core::PushEvent;

/// Path of the flag monitor socket
pub const FLAG_MONITOR_PATH: &str = "/ws/flag-monitor";

/// Close code that ends the channel without reconnecting
pub const NORMAL_CLOSE: u16 = 1000;

/// Reconnect backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Reconnects allowed before giving up
    pub max_attempts: u32,
    /// Delay unit; attempt `n` waits `n * base_delay`
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    /// Create default policy
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With attempt ceiling
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// With delay unit
    #[inline]
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Delay before reconnect `attempt` (1-based), `None` past the ceiling
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base_delay * attempt)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// Whether a close with this code should be followed by a reconnect
///
/// A missing code means the connection dropped without a close frame.
#[inline]
#[must_use]
pub fn should_reconnect(code: Option<u16>) -> bool {
    code != Some(NORMAL_CLOSE)
}

/// Push channel configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConfig {
    /// Socket URL
    pub url: String,
    /// Keep-alive period
    pub ping_interval: Duration,
    /// Backoff
    pub reconnect: ReconnectPolicy,
}

impl PushConfig {
    /// Configuration for an explicit socket URL
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ping_interval: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Derive the flag monitor URL from an HTTP base URL
    #[must_use]
    pub fn for_backend(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        Self::new(format!("{ws_base}{FLAG_MONITOR_PATH}"))
    }

    /// With keep-alive period
    #[inline]
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// With backoff
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// Subscriber handle key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Receiving end of a subscription
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<PushEvent>,
}

impl Subscription {
    /// Subscription id, for [`PushChannel::unsubscribe`]
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event; `None` once unsubscribed or the channel is gone
    pub async fn recv(&mut self) -> Option<PushEvent> {
        self.rx.recv().await
    }
}

type Subscribers = Arc<DashMap<SubscriptionId, mpsc::UnboundedSender<PushEvent>>>;

/// Owned socket connection with fan-out to subscribers
#[derive(Debug)]
pub struct PushChannel {
    subscribers: Subscribers,
    next_id: AtomicU64,
    connected: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PushChannel {
    /// Start the connection task
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn open(config: PushConfig) -> Self {
        let subscribers: Subscribers = Arc::new(DashMap::new());
        let connected = Arc::new(AtomicBool::new(false));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run(
            config,
            Arc::clone(&subscribers),
            Arc::clone(&connected),
            shutdown_rx,
        ));

        Self {
            subscribers,
            next_id: AtomicU64::new(1),
            connected,
            shutdown,
            task: Some(task),
        }
    }

    /// Register a subscriber
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(id, tx);
        Subscription { id, rx }
    }

    /// Drop a subscriber; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Registered subscribers
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether the socket is currently open
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Close with a normal close frame and wait for the task to end
    pub async fn close(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.subscribers.clear();
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum SessionEnd {
    Shutdown,
    Closed(Option<u16>),
}

async fn run(
    config: PushConfig,
    subscribers: Subscribers,
    connected: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt = 0u32;
    loop {
        if *shutdown.borrow() {
            return;
        }

        match tokio_tungstenite::connect_async(config.url.as_str()).await {
            Ok((socket, _)) => {
                tracing::info!(url = %config.url, "push channel connected");
                attempt = 0;
                connected.store(true, Ordering::SeqCst);
                let end = serve(socket, &config, &subscribers, &mut shutdown).await;
                connected.store(false, Ordering::SeqCst);

                match end {
                    SessionEnd::Shutdown => return,
                    SessionEnd::Closed(code) if !should_reconnect(code) => {
                        tracing::info!("push channel closed normally");
                        return;
                    }
                    SessionEnd::Closed(code) => {
                        tracing::warn!(?code, "push channel closed abnormally");
                    }
                }
            }
            Err(err) => tracing::warn!(url = %config.url, error = %err, "push channel connect failed"),
        }

        attempt += 1;
        let Some(delay) = config.reconnect.delay_for(attempt) else {
            tracing::error!(attempts = attempt - 1, "push channel giving up");
            return;
        };
        tracing::warn!(attempt, max = config.reconnect.max_attempts, ?delay, "reconnecting push channel");

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}

async fn serve<S>(
    socket: tokio_tungstenite::WebSocketStream<S>,
    config: &PushConfig,
    subscribers: &Subscribers,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = socket.split();
    let start = tokio::time::Instant::now() + config.ping_interval;
    let mut ping = tokio::time::interval_at(start, config.ping_interval);

    loop {
        tokio::select! {
            _ = ping.tick() => {
                if let Err(err) = sink.send(Message::Text("ping".to_string())).await {
                    tracing::warn!(error = %err, "push ping failed");
                    return SessionEnd::Closed(None);
                }
            }
            _ = shutdown.changed() => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client closing".into(),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                return SessionEnd::Shutdown;
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => dispatch(&text, subscribers),
                Some(Ok(Message::Close(frame))) => {
                    return SessionEnd::Closed(frame.map(|f| u16::from(f.code)));
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "push channel read failed");
                    return SessionEnd::Closed(None);
                }
                None => return SessionEnd::Closed(None),
            },
        }
    }
}

/// Decode one text frame and fan it out; pongs and garbage are dropped
fn dispatch(text: &str, subscribers: &Subscribers) {
    let event = match serde_json::from_str::<PushEvent>(text) {
        Ok(PushEvent::Pong) => return,
        Ok(event) => event,
        Err(err) => {
            tracing::debug!(error = %err, "ignoring undecodable push frame");
            return;
        }
    };
    tracing::debug!(?event, "push event");
    subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
}
