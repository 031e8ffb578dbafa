//! WebSocket session driving a [`Reconciler`].
//!
//! The session executes the reconciler's effects: requests go out over the
//! socket, deferred refreshes become detached timers feeding a channel. A
//! periodic tick runs the silence watchdog.
//!
//! Effects are parked in a session-owned queue and removed only once they
//! have been handed to the socket, so [`ClientSession::poll`] can be dropped
//! at any await point (e.g. inside `tokio::select!`) without losing requests.

use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tagfs_core::reconciler::{Effect, ReconcileError, Reconciler, ReconcilerConfig, Update};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, Message},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default gateway URL.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:3001";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: WsError,
    },

    #[error("Failed to send request: {0}")]
    Send(#[source] WsError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub reconciler: ReconcilerConfig,
    /// How often the silence watchdog runs
    pub silence_check: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            reconciler: ReconcilerConfig::default(),
            silence_check: Duration::from_secs(1),
        }
    }
}

/// Something observable happened on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// An incoming message was applied
    Response(Update),
    /// A deferred refresh fired and its LIST was sent
    RefreshIssued,
    /// The watchdog logged a silent backend
    Silence,
    /// The gateway closed the connection
    Closed,
}

/// A connected client session.
pub struct ClientSession {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    reconciler: Reconciler,
    /// Effects not yet executed, oldest first
    outbox: VecDeque<Effect>,
    refresh_tx: mpsc::UnboundedSender<()>,
    refresh_rx: mpsc::UnboundedReceiver<()>,
    watchdog: tokio::time::Interval,
    closed: bool,
}

impl ClientSession {
    /// Connect to the gateway and issue the initial LIST.
    pub async fn connect(config: ClientConfig) -> Result<Self, SessionError> {
        let session_id = Uuid::new_v4().to_string();
        let mut reconciler = Reconciler::new(config.reconciler, session_id);
        reconciler.connecting();

        let (ws, _) = connect_async(&config.url)
            .await
            .map_err(|source| SessionError::Connect {
                url: config.url.clone(),
                source,
            })?;
        info!("Connected to {} (session {})", config.url, reconciler.session_id());

        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let mut watchdog = tokio::time::interval(config.silence_check);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut session = Self {
            ws,
            reconciler,
            outbox: VecDeque::new(),
            refresh_tx,
            refresh_rx,
            watchdog,
            closed: false,
        };
        session.reconciler.connected();
        session.flush().await?;
        Ok(session)
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Run a reconciler command and send whatever it queued.
    pub async fn apply<T, F>(&mut self, command: F) -> Result<T, SessionError>
    where
        F: FnOnce(&mut Reconciler) -> Result<T, ReconcileError>,
    {
        let result = command(&mut self.reconciler)?;
        self.flush().await?;
        Ok(result)
    }

    /// Execute queued effects.
    ///
    /// An effect leaves the queue only after the socket accepted it; on error
    /// or cancellation the rest stays queued for the next call.
    async fn flush(&mut self) -> Result<(), SessionError> {
        self.outbox.extend(self.reconciler.drain_effects());

        while let Some(effect) = self.outbox.front() {
            match effect {
                Effect::Send(request) => {
                    let text = request.to_json();
                    self.ws
                        .feed(Message::Text(text))
                        .await
                        .map_err(SessionError::Send)?;
                }
                Effect::RefreshAfter(delay) => {
                    let delay = *delay;
                    let tx = self.refresh_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(());
                    });
                }
            }
            self.outbox.pop_front();
        }

        self.ws.flush().await.map_err(SessionError::Send)
    }

    /// Wait for the next session event.
    ///
    /// Cancel safe: anything left unsent by a dropped call goes out first on
    /// the next one.
    pub async fn poll(&mut self) -> Result<SessionEvent, SessionError> {
        if self.closed {
            return Ok(SessionEvent::Closed);
        }
        self.flush().await?;

        loop {
            tokio::select! {
                msg = self.ws.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
                        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Gateway closed the connection");
                            return Ok(self.mark_closed());
                        }
                        Some(Err(e)) => {
                            warn!("WebSocket error: {}", e);
                            return Ok(self.mark_closed());
                        }
                    };
                    let update = self.reconciler.handle_message(&text);
                    return Ok(SessionEvent::Response(update));
                }

                Some(()) = self.refresh_rx.recv() => {
                    self.reconciler.refresh()?;
                    self.flush().await?;
                    return Ok(SessionEvent::RefreshIssued);
                }

                _ = self.watchdog.tick() => {
                    if self.reconciler.check_silence(Instant::now()) {
                        return Ok(SessionEvent::Silence);
                    }
                }
            }
        }
    }

    fn mark_closed(&mut self) -> SessionEvent {
        self.closed = true;
        self.reconciler.disconnected();
        SessionEvent::Closed
    }

    /// Close the connection gracefully.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
        self.reconciler.disconnected();
    }
}
