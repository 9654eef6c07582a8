// Client-side stream consumer.
// A StreamConsumer owns one long-lived `GET /realtime` subscription. Its session
// task walks Connecting -> Streaming -> (Disconnected -> Connecting)* and writes a
// ConsumerView into a watch slot after every snapshot and state transition.
// Presentation code reads the slot and never touches the transport. close() is terminal.

mod backoff;
mod sse;

pub use backoff::Backoff;
pub use sse::{LineTooLong, MAX_LINE_BYTES, SseDecoder};

use crate::config::ClientConfig;
use crate::models::Snapshot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Connecting,
    Streaming,
    Disconnected,
    Closed,
}

/// Why the stream is (or was last) unavailable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsumerError {
    #[error("connection error: {0}")]
    Transport(String),
    #[error("server responded with HTTP {0}")]
    Status(u16),
    #[error("server closed the stream")]
    ServerClosed,
    #[error("failed to parse data: {0}")]
    Decode(String),
    #[error("consumer is closed")]
    Closed,
}

/// What presentation code renders: latest data plus connection health.
#[derive(Debug, Clone)]
pub struct ConsumerView {
    /// Last successfully decoded snapshot; kept across disconnects.
    pub data: Option<Arc<Snapshot>>,
    /// True until the first snapshot (or first failure) of a session.
    pub loading: bool,
    pub error: Option<ConsumerError>,
    pub state: ConsumerState,
    pub received_at: Option<Instant>,
    /// Connection attempts started, across sessions.
    pub attempts: u64,
}

impl ConsumerView {
    fn initial() -> Self {
        Self {
            data: None,
            loading: true,
            error: None,
            state: ConsumerState::Connecting,
            received_at: None,
            attempts: 0,
        }
    }

    /// No snapshot has arrived within `max_age` (or none ever arrived).
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.received_at.is_none_or(|t| t.elapsed() > max_age)
    }

    /// Error screen only when there is nothing to show; otherwise stale data wins.
    pub fn shows_error(&self) -> bool {
        self.data.is_none() && self.error.is_some()
    }
}

struct Session {
    shutdown_tx: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

pub struct StreamConsumer {
    config: ClientConfig,
    http: reqwest::Client,
    view_tx: Arc<watch::Sender<ConsumerView>>,
    session: Mutex<Option<Session>>,
    closed: AtomicBool,
}

impl StreamConsumer {
    /// Builds the consumer and starts streaming. Must be called inside a tokio runtime.
    pub fn connect(config: ClientConfig) -> Result<Self, ConsumerError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| ConsumerError::Transport(e.to_string()))?;
        let (view_tx, _) = watch::channel(ConsumerView::initial());
        let consumer = Self {
            config,
            http,
            view_tx: Arc::new(view_tx),
            session: Mutex::new(None),
            closed: AtomicBool::new(false),
        };
        consumer.start_session()?;
        Ok(consumer)
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.view_tx.borrow().data.clone()
    }

    pub fn view(&self) -> ConsumerView {
        self.view_tx.borrow().clone()
    }

    pub fn state(&self) -> ConsumerState {
        self.view_tx.borrow().state
    }

    /// Receiver notified on every snapshot and state transition.
    pub fn watch(&self) -> watch::Receiver<ConsumerView> {
        self.view_tx.subscribe()
    }

    /// Tears down the current connection and opens a fresh one.
    /// Returns `ConsumerError::Closed` once `close()` has started, even mid-refresh.
    pub async fn refresh(&self) -> Result<(), ConsumerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConsumerError::Closed);
        }
        self.stop_session().await;
        self.start_session()
    }

    /// Terminal: cancels any in-flight attempt or wait and releases the transport.
    pub async fn close(&self) {
        let session = {
            let mut slot = self.session_slot();
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            slot.take()
        };
        if let Some(session) = session {
            session.stop().await;
        }
        self.view_tx.send_modify(|v| {
            v.state = ConsumerState::Closed;
            v.loading = false;
        });
        tracing::debug!(url = %self.config.url, "stream consumer closed");
    }

    fn session_slot(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // `closed` is checked and set under the session lock, so no session starts after close.
    fn start_session(&self) -> Result<(), ConsumerError> {
        let mut slot = self.session_slot();
        if self.closed.load(Ordering::Acquire) {
            return Err(ConsumerError::Closed);
        }
        self.view_tx.send_modify(|v| {
            v.loading = true;
            v.error = None;
            v.state = ConsumerState::Connecting;
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run_session(
            self.http.clone(),
            self.config.clone(),
            self.view_tx.clone(),
            shutdown_rx,
        ));
        if let Some(previous) = slot.replace(Session {
            shutdown_tx,
            handle,
        }) {
            let _ = previous.shutdown_tx.send(());
        }
        Ok(())
    }

    async fn stop_session(&self) {
        let session = self.session_slot().take();
        if let Some(session) = session {
            session.stop().await;
        }
    }
}

impl Session {
    async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "stream session task failed");
        }
    }
}

impl Drop for StreamConsumer {
    fn drop(&mut self) {
        let session = self
            .session
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(session) = session {
            let _ = session.shutdown_tx.send(());
        }
    }
}

/// Connect / stream / back off until shutdown. Dropping the sender also ends the session.
async fn run_session(
    http: reqwest::Client,
    config: ClientConfig,
    view: Arc<watch::Sender<ConsumerView>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut backoff = Backoff::new(config.reconnect_initial_ms, config.reconnect_max_ms);
    loop {
        view.send_modify(|v| {
            v.state = ConsumerState::Connecting;
            v.attempts += 1;
        });
        tracing::debug!(url = %config.url, "connecting to stream");

        let reason = tokio::select! {
            _ = &mut shutdown_rx => return,
            reason = stream_once(&http, &config.url, &view, &mut backoff) => reason,
        };

        let delay = backoff.next_delay();
        tracing::warn!(
            error = %reason,
            url = %config.url,
            retry_in_ms = delay.as_millis() as u64,
            "stream disconnected; reconnecting"
        );
        view.send_modify(|v| {
            v.state = ConsumerState::Disconnected;
            v.loading = false;
            v.error = Some(reason);
        });

        tokio::select! {
            _ = &mut shutdown_rx => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// One connection's lifetime. Only returns once the stream is unusable.
async fn stream_once(
    http: &reqwest::Client,
    url: &str,
    view: &watch::Sender<ConsumerView>,
    backoff: &mut Backoff,
) -> ConsumerError {
    let mut response = match http
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => return ConsumerError::Transport(e.to_string()),
    };
    if !response.status().is_success() {
        return ConsumerError::Status(response.status().as_u16());
    }
    view.send_modify(|v| v.state = ConsumerState::Streaming);
    tracing::info!(url, "stream connected");

    let mut decoder = SseDecoder::new();
    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return ConsumerError::ServerClosed,
            Err(e) => return ConsumerError::Transport(e.to_string()),
        };
        if let Err(e) = decoder.push(&chunk) {
            return ConsumerError::Decode(e.to_string());
        }
        while let Some(payload) = decoder.next_event() {
            let snapshot = match serde_json::from_str::<Snapshot>(&payload) {
                Ok(s) => s,
                Err(e) => return ConsumerError::Decode(e.to_string()),
            };
            backoff.reset();
            view.send_modify(|v| {
                v.data = Some(Arc::new(snapshot));
                v.loading = false;
                v.error = None;
                v.state = ConsumerState::Streaming;
                v.received_at = Some(Instant::now());
            });
        }
    }
}
