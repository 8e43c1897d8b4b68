//! Transport lifecycle: connect, keepalive and reconnect.
//!
//! `Closed → Connecting → Open → Closed`, with `Closing` in between when the
//! client itself asks to drop the connection. Every entry into `Closed` arms the
//! reconnect timer; every open arms the keepalive timer. The two are never armed
//! together.

use crate::protocol::{encode_record, Outbound, RecordError};
use crate::timer::{earliest, Timer};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_KEEPALIVE: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Closed,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a transport reports about the connection it was asked to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Opened,
    Message(String),
    Closed,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("transport failed to start: {0}")]
    Start(String),
    #[error("transport send failed: {0}")]
    Send(String),
}

/// A message-oriented, full-duplex connection factory.
///
/// `open` starts one connection attempt and returns its id; the outcome is
/// reported later as [`SocketEvent`]s tagged with that id.
pub trait Transport {
    fn open(&mut self) -> Result<ConnectionId, TransportError>;
    fn send(&mut self, text: String) -> Result<(), TransportError>;
    fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("dropped '{kind}' while connection is {state}")]
    Dropped {
        kind: &'static str,
        state: ConnectionState,
    },
    #[error(transparent)]
    Encode(#[from] RecordError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    current: Option<ConnectionId>,
    interval: Duration,
    keepalive: Timer,
    reconnect: Timer,
    last_error: Option<String>,
    dropped: u64,
    attempts: u64,
}

impl ConnectionManager {
    /// `interval` is both the keepalive period and the reconnect delay.
    pub fn new(interval: Duration) -> Self {
        Self {
            state: ConnectionState::Closed,
            current: None,
            interval,
            keepalive: Timer::default(),
            reconnect: Timer::default(),
            last_error: None,
            dropped: 0,
            attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn current(&self) -> Option<ConnectionId> {
        self.current
    }

    /// Events from any connection but the current one are leftovers.
    pub fn accepts(&self, id: ConnectionId) -> bool {
        self.current == Some(id)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn keepalive_deadline(&self) -> Option<Instant> {
        self.keepalive.deadline()
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect.deadline()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([self.keepalive.deadline(), self.reconnect.deadline()])
    }

    pub fn connect(&mut self, now: Instant, transport: &mut dyn Transport) -> bool {
        if self.state != ConnectionState::Closed {
            return false;
        }
        self.reconnect.cancel();
        self.attempts += 1;
        match transport.open() {
            Ok(id) => {
                info!(event = "connecting", conn = %id, attempt = self.attempts);
                self.state = ConnectionState::Connecting;
                self.current = Some(id);
                true
            }
            Err(err) => {
                warn!(event = "connect_error", error = %err);
                self.last_error = Some(err.to_string());
                self.reconnect.schedule_in(now, self.interval);
                false
            }
        }
    }

    pub fn on_open(&mut self, now: Instant) -> bool {
        if self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Open;
        self.last_error = None;
        self.reconnect.cancel();
        self.keepalive.schedule_in(now, self.interval);
        info!(event = "connection_open", conn = ?self.current);
        true
    }

    pub fn on_close(&mut self, now: Instant) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        info!(event = "connection_closed", conn = ?self.current, from = %self.state);
        self.state = ConnectionState::Closed;
        self.current = None;
        self.keepalive.cancel();
        self.reconnect.schedule_in(now, self.interval);
        true
    }

    /// Errors are diagnostics only; the close that follows drives the state.
    pub fn on_error(&mut self, message: String) {
        warn!(event = "transport_error", error = %message, state = %self.state);
        self.last_error = Some(message);
    }

    /// Client-initiated close; the transport's close signal finishes the cycle.
    pub fn close(&mut self, transport: &mut dyn Transport) -> bool {
        match self.state {
            ConnectionState::Open | ConnectionState::Connecting => {
                self.state = ConnectionState::Closing;
                self.keepalive.cancel();
                transport.close();
                true
            }
            ConnectionState::Closed | ConnectionState::Closing => false,
        }
    }

    pub fn send(
        &mut self,
        now: Instant,
        transport: &mut dyn Transport,
        record: &Outbound,
    ) -> Result<(), SendError> {
        if self.state != ConnectionState::Open {
            self.dropped += 1;
            debug!(event = "send_dropped", kind = record.kind(), state = %self.state);
            return Err(SendError::Dropped {
                kind: record.kind(),
                state: self.state,
            });
        }
        let text = encode_record(record)?;
        if let Err(err) = transport.send(text) {
            self.last_error = Some(err.to_string());
            return Err(err.into());
        }
        self.keepalive.schedule_in(now, self.interval);
        Ok(())
    }

    pub fn poll(&mut self, now: Instant, transport: &mut dyn Transport) {
        if self.reconnect.fire(now) {
            self.connect(now, transport);
        }
        if self.keepalive.fire(now) {
            if let Err(err) = self.send(now, transport, &Outbound::Ping) {
                debug!(event = "keepalive_failed", error = %err);
            }
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(DEFAULT_KEEPALIVE)
    }
}

/// The connection and its transport, borrowed together for sending.
pub struct Link<'a> {
    pub connection: &'a mut ConnectionManager,
    pub transport: &'a mut dyn Transport,
}

impl<'a> Link<'a> {
    pub fn new(connection: &'a mut ConnectionManager, transport: &'a mut dyn Transport) -> Self {
        Self {
            connection,
            transport,
        }
    }

    pub fn send(&mut self, now: Instant, record: &Outbound) -> Result<(), SendError> {
        self.connection.send(now, &mut *self.transport, record)
    }
}
