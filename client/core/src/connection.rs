//! Connection Manager
//!
//! Drives a [`Transport`] through the connect / reconnect lifecycle:
//! scheduled backoff with a bounded retry budget, a single pending-frame
//! slot that survives reconnects, and a periodic keep-alive ping while
//! connected.
//!
//! The manager is pumped by calling [`ConnectionManager::next_inbound`] in
//! a loop; that call is cancel-safe, so callers may race it inside a
//! `select!` without losing reconnect progress.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::config::ClientConfig;
use crate::transport::{Transport, TransportError};

/// Wire frame for the periodic keep-alive
pub const PING_FRAME: &str = r#"{"command":"ping"}"#;

/// Lifecycle phase of the managed connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none in progress
    Disconnected,
    /// First connection attempt in flight
    Connecting,
    /// Transport is up
    Connected,
    /// Connection lost; retrying on the backoff schedule
    Reconnecting,
    /// Retry budget exhausted; only an explicit [`ConnectionManager::connect`]
    /// leaves this state
    Failed,
}

/// Observability events emitted as the connection changes phase
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connection attempt started
    Connecting,
    /// Transport came up
    Connected,
    /// Transport went down
    Disconnected,
    /// A retry was scheduled
    ReconnectScheduled {
        /// 1-based retry number
        attempt: u32,
        /// Wait before the attempt
        delay: Duration,
    },
    /// A scheduled retry attempt failed
    ReconnectFailed {
        /// 1-based retry number
        attempt: u32,
    },
    /// Retry budget exhausted
    Failed,
    /// A keep-alive ping was sent
    KeepAlivePing,
    /// The stashed pending frame was resent after a reconnect
    PendingFlushed,
}

/// Errors surfaced by the connection manager
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Underlying transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Every scheduled retry failed
    #[error("connection lost after {attempts} reconnect attempts")]
    RetriesExhausted {
        /// Retries performed before giving up
        attempts: u32,
    },

    /// Operation requires an established or recovering connection
    #[error("not connected")]
    NotConnected,
}

/// Outcome of one pump iteration while connected
enum Pumped {
    Frame(Result<String, TransportError>),
    Tick,
}

/// Connect / reconnect state machine over a [`Transport`]
pub struct ConnectionManager<T: Transport> {
    transport: T,
    config: ClientConfig,
    state: ConnectionState,
    /// Retries performed in the current outage
    attempts: u32,
    /// Earliest instant the next retry may run
    retry_at: Option<Instant>,
    /// Single pending-frame slot, last write wins
    pending: Option<String>,
    keep_alive: Option<Interval>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<ConnectionEvent>>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Wrap a transport with the given configuration
    #[must_use]
    pub fn new(transport: T, config: ClientConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            config,
            state: ConnectionState::Disconnected,
            attempts: 0,
            retry_at: None,
            pending: None,
            keep_alive: None,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Take the lifecycle event receiver; yields `None` after the first call
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ConnectionEvent>> {
        self.events_rx.take()
    }

    /// Current lifecycle phase
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Frame waiting in the pending slot, if any
    #[must_use]
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Establish the connection
    ///
    /// While a connect or scheduled reconnect is already in flight this
    /// returns immediately without a second dial. While connected it tears
    /// the existing connection down first, then dials fresh. From `Failed`
    /// it resets the retry budget and starts over. An initial dial failure
    /// does not error out; it enters the reconnect schedule, observable
    /// through [`ConnectionEvent`]s.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                tracing::debug!(state = ?self.state, "connect already in flight");
                return Ok(());
            }
            ConnectionState::Connected => {
                self.keep_alive = None;
                if let Err(e) = self.transport.disconnect().await {
                    tracing::debug!(error = %e, "disconnect before re-dial reported an error");
                }
                self.emit(ConnectionEvent::Disconnected);
            }
            ConnectionState::Disconnected | ConnectionState::Failed => {}
        }

        self.attempts = 0;
        self.state = ConnectionState::Connecting;
        self.emit(ConnectionEvent::Connecting);

        match self.dial().await {
            Ok(()) => {
                self.on_connected().await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "initial connect failed");
                self.schedule_retry();
                Ok(())
            }
        }
    }

    /// Tear the connection down
    ///
    /// Safe to call in any state, any number of times.
    pub async fn close(&mut self) {
        self.keep_alive = None;
        self.retry_at = None;
        self.pending = None;
        self.attempts = 0;
        let was_up = self.state != ConnectionState::Disconnected;
        self.state = ConnectionState::Disconnected;
        if let Err(e) = self.transport.disconnect().await {
            tracing::debug!(error = %e, "disconnect reported an error");
        }
        if was_up {
            self.emit(ConnectionEvent::Disconnected);
        }
    }

    /// Send a frame, stashing it in the pending slot on any failure
    ///
    /// While not connected the frame is stashed for the flush that follows
    /// the next successful dial and `NotConnected` is returned instead of
    /// blocking the caller. The slot holds one frame; a newer send replaces
    /// an unflushed older one.
    pub async fn send(&mut self, frame: &str) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Connected => match self.transport.send(frame).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    tracing::warn!(error = %e, "send failed, stashing frame and reconnecting");
                    self.stash(frame);
                    self.begin_reconnect();
                    Err(e.into())
                }
            },
            ConnectionState::Failed => {
                self.stash(frame);
                Err(ConnectionError::RetriesExhausted {
                    attempts: self.attempts,
                })
            }
            _ => {
                self.stash(frame);
                Err(ConnectionError::NotConnected)
            }
        }
    }

    /// Wait for the next inbound frame
    ///
    /// Also services the keep-alive timer and, after a drop, the backoff
    /// schedule. Cancel-safe: dropping the future mid-backoff keeps the
    /// retry deadline, and the next call resumes where it left off.
    pub async fn next_inbound(&mut self) -> Result<String, ConnectionError> {
        loop {
            match self.state {
                ConnectionState::Connected => match self.pump().await {
                    Pumped::Frame(Ok(frame)) => return Ok(frame),
                    Pumped::Frame(Err(e)) => {
                        tracing::warn!(error = %e, "connection dropped");
                        self.begin_reconnect();
                    }
                    Pumped::Tick => {
                        if let Err(e) = self.transport.send(PING_FRAME).await {
                            tracing::warn!(error = %e, "keep-alive ping failed");
                            self.begin_reconnect();
                        } else {
                            self.emit(ConnectionEvent::KeepAlivePing);
                        }
                    }
                },
                ConnectionState::Reconnecting => self.retry_once().await?,
                ConnectionState::Connecting => {
                    // connect() runs to completion before returning, so a
                    // pump should never observe this phase.
                    return Err(ConnectionError::NotConnected);
                }
                ConnectionState::Disconnected => return Err(ConnectionError::NotConnected),
                ConnectionState::Failed => {
                    return Err(ConnectionError::RetriesExhausted {
                        attempts: self.attempts,
                    })
                }
            }
        }
    }

    /// Race the transport against the keep-alive timer
    async fn pump(&mut self) -> Pumped {
        let Self {
            transport,
            keep_alive,
            ..
        } = self;
        match keep_alive {
            Some(interval) => tokio::select! {
                frame = transport.recv() => Pumped::Frame(frame),
                _ = interval.tick() => Pumped::Tick,
            },
            None => Pumped::Frame(transport.recv().await),
        }
    }

    /// Sleep out the current backoff, then dial once
    async fn retry_once(&mut self) -> Result<(), ConnectionError> {
        if let Some(deadline) = self.retry_at {
            tokio::time::sleep_until(deadline).await;
        }
        self.retry_at = None;

        match self.dial().await {
            Ok(()) => {
                self.on_connected().await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt = self.attempts, "reconnect attempt failed");
                self.emit(ConnectionEvent::ReconnectFailed {
                    attempt: self.attempts,
                });
                if self.attempts >= self.config.reconnect_attempts {
                    self.state = ConnectionState::Failed;
                    self.keep_alive = None;
                    self.emit(ConnectionEvent::Failed);
                    Err(ConnectionError::RetriesExhausted {
                        attempts: self.attempts,
                    })
                } else {
                    self.schedule_retry();
                    Ok(())
                }
            }
        }
    }

    /// One dial attempt, bounded by the configured connect timeout
    async fn dial(&mut self) -> Result<(), TransportError> {
        let limit = self.config.connect_timeout();
        match tokio::time::timeout(limit, self.transport.connect()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectionFailed(format!(
                "connect timed out after {limit:?}"
            ))),
        }
    }

    /// Enter the reconnect schedule after a detected drop
    fn begin_reconnect(&mut self) {
        self.keep_alive = None;
        self.attempts = 0;
        self.emit(ConnectionEvent::Disconnected);
        self.schedule_retry();
    }

    /// Arm the next retry on the backoff schedule, or fail outright when
    /// the budget is already spent (a budget of 0 disables automatic
    /// reconnects entirely)
    fn schedule_retry(&mut self) {
        if self.attempts >= self.config.reconnect_attempts {
            self.state = ConnectionState::Failed;
            self.keep_alive = None;
            self.retry_at = None;
            self.emit(ConnectionEvent::Failed);
            return;
        }
        let delay = self.config.reconnect_delay(self.attempts);
        self.attempts += 1;
        self.retry_at = Some(Instant::now() + delay);
        self.state = ConnectionState::Reconnecting;
        self.emit(ConnectionEvent::ReconnectScheduled {
            attempt: self.attempts,
            delay,
        });
    }

    async fn on_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        self.retry_at = None;
        if self.config.keep_alive {
            let period = self.config.keep_alive_interval();
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.keep_alive = Some(interval);
        }
        self.emit(ConnectionEvent::Connected);
        self.flush_pending().await;
    }

    /// Resend the stashed frame, if any
    async fn flush_pending(&mut self) {
        if let Some(frame) = self.pending.take() {
            match self.transport.send(&frame).await {
                Ok(()) => self.emit(ConnectionEvent::PendingFlushed),
                Err(e) => {
                    tracing::warn!(error = %e, "pending flush failed, keeping frame stashed");
                    self.pending = Some(frame);
                    self.begin_reconnect();
                }
            }
        }
    }

    fn stash(&mut self, frame: &str) {
        if let Some(old) = &self.pending {
            tracing::debug!(
                dropped_len = old.len(),
                "pending slot occupied, replacing older frame"
            );
        }
        self.pending = Some(frame.to_string());
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events_tx.send(event);
    }
}
