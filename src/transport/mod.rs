//! Request/response transport over one shared server connection.
//!
//! Every exchange with the device-control server follows the same shape: send one
//! request, optionally pause so the server can respond, read one reply, and check that
//! the reply carries the expected event. Replies that belong to another exchange, fail
//! to decode, or never arrive cost one attempt; the call gives up after
//! `max_attempts` and returns `None`.
//!
//! # Types
//!
//! - [`Transport`]: Cloneable handle to a connection guarded by a mutex
//! - [`Exchange`]: Exclusive, scoped use of the connection for one round trip
//! - [`RequestOptions`]: Attempt budget, per-attempt timeout and pre-read delay
//! - [`Link`]: The byte stream underneath (`TcpStream`, [`mock::MockLink`])
//!
//! # Concurrency
//!
//! Callers on any number of threads may share a `Transport`. The connection mutex is
//! held for one attempt at a time, so at most one request/reply pair is in flight on
//! the socket and replies arrive in the order the guard holders sent their requests.
//!
//! # Resynchronisation
//!
//! With length-prefixed framing a read that fails part-way through a frame leaves the
//! rest of that frame on the stream. The connection remembers this and discards
//! whatever is waiting before the next request is written, so the following reply
//! starts on a frame boundary.

pub mod codec;
pub mod link;
pub mod mock;

use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

pub use codec::{Event, Framing, Message, Reply};
pub use link::{DynLink, Link};

use crate::config::{ClientConfig, TransportConfig};
use crate::error::{AqError, AqResult};

/// Read timeout used while discarding the remains of an abandoned frame.
pub const RESYNC_TIMEOUT: Duration = Duration::from_millis(20);

/// Connection-level settings shared by every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    /// Frame format on the wire
    pub framing: Framing,
    /// Upper bound on one reply frame
    pub recv_buffer_bytes: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            framing: Framing::Raw,
            recv_buffer_bytes: 32 * 1024,
        }
    }
}

impl From<&TransportConfig> for TransportSettings {
    fn from(config: &TransportConfig) -> Self {
        Self {
            framing: config.framing,
            recv_buffer_bytes: config.recv_buffer_bytes,
        }
    }
}

/// Retry and pacing parameters for one call to [`Transport::send_and_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Total attempts before giving up (at least one attempt is always made)
    pub max_attempts: u32,
    /// Read timeout for each attempt
    pub timeout: Duration,
    /// Pause between sending and reading
    pub delay_before_recv: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            timeout: Duration::from_millis(500),
            delay_before_recv: Duration::ZERO,
        }
    }
}

impl RequestOptions {
    /// Options derived from the transport configuration, with no pre-read delay.
    #[must_use]
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            timeout: config.recv_timeout(),
            delay_before_recv: Duration::ZERO,
        }
    }

    /// Replace the attempt budget.
    #[must_use]
    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Replace the pause between send and read.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_before_recv = delay;
        self
    }
}

struct Connection {
    link: DynLink,
    // A reply was abandoned mid-frame; unread bytes may precede the next one
    desynced: bool,
}

/// Shared, mutex-guarded connection to the device-control server.
#[derive(Clone)]
pub struct Transport {
    connection: Arc<Mutex<Connection>>,
    settings: TransportSettings,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Connect to the server named in `config`.
    pub fn connect(config: &ClientConfig) -> AqResult<Self> {
        let address = config.server.address();
        let stream = link::connect_tcp(&address, config.server.connect_timeout())?;
        debug!(%address, "Connected to device-control server");
        Ok(Self::from_link(stream, TransportSettings::from(&config.transport)))
    }

    /// Wrap an already-open link.
    pub fn from_link<L: Link + 'static>(link: L, settings: TransportSettings) -> Self {
        Self {
            connection: Arc::new(Mutex::new(Connection {
                link: Box::new(link),
                desynced: false,
            })),
            settings,
        }
    }

    /// Connection-level settings.
    #[must_use]
    pub fn settings(&self) -> TransportSettings {
        self.settings
    }

    /// Take exclusive use of the connection; blocks while another exchange is in flight.
    pub fn acquire(&self) -> Exchange<'_> {
        Exchange {
            connection: self.connection.lock(),
            settings: self.settings,
        }
    }

    /// Send `message` until a reply carrying `expected` arrives.
    ///
    /// Returns the reply payload, or `None` once `options.max_attempts` attempts have
    /// failed. Failure is a normal outcome and is never reported as an error.
    pub fn send_and_wait(
        &self,
        message: &Message,
        expected: Event,
        options: &RequestOptions,
    ) -> Option<Value> {
        self.send_and_wait_for(message, expected, options, |_| true)
    }

    /// Like [`Transport::send_and_wait`], additionally requiring `accept` to approve the
    /// payload. A rejected payload is treated like a reply for another exchange.
    pub fn send_and_wait_for<F>(
        &self,
        message: &Message,
        expected: Event,
        options: &RequestOptions,
        mut accept: F,
    ) -> Option<Value>
    where
        F: FnMut(&Value) -> bool,
    {
        let attempts = options.max_attempts.max(1);
        for attempt in 1..=attempts {
            // The guard is released between attempts so other callers can interleave
            let result = self.acquire().round_trip(message, options);
            match result {
                Ok(reply) if reply.event != expected.as_str() => {
                    debug!(
                        event = %expected,
                        received = %reply.event,
                        attempt,
                        "Discarding reply for another exchange"
                    );
                }
                Ok(reply) => {
                    if accept(&reply.payload) {
                        return Some(reply.payload);
                    }
                    debug!(event = %expected, attempt, "Discarding reply addressed elsewhere");
                }
                Err(e) => {
                    debug!(event = %expected, attempt, error = %e, "Attempt failed");
                }
            }
        }
        warn!(
            request = %message.event(),
            event = %expected,
            attempts,
            "No matching reply; giving up"
        );
        None
    }
}

/// Exclusive use of the connection for one request/reply round trip.
pub struct Exchange<'a> {
    connection: MutexGuard<'a, Connection>,
    settings: TransportSettings,
}

impl Exchange<'_> {
    /// Send one request and read one reply.
    pub fn round_trip(&mut self, message: &Message, options: &RequestOptions) -> AqResult<Reply> {
        self.send(message, options.timeout)?;
        if !options.delay_before_recv.is_zero() {
            std::thread::sleep(options.delay_before_recv);
        }
        self.recv()
    }

    /// Write one request frame and set the read timeout for its reply.
    pub fn send(&mut self, message: &Message, timeout: Duration) -> AqResult<()> {
        let frame = message.to_frame(self.settings.framing)?;
        if self.connection.desynced {
            self.resync()?;
        }
        let link = &mut self.connection.link;
        link.set_read_timeout(Some(timeout))?;
        trace!(bytes = message.body().len(), event = %message.event(), "Sending request");
        link.write_all(&frame)?;
        link.flush()?;
        Ok(())
    }

    /// Read and decode one reply frame.
    pub fn recv(&mut self) -> AqResult<Reply> {
        let framing = self.settings.framing;
        let read = codec::read_frame(&mut *self.connection.link, framing, self.settings.recv_buffer_bytes);
        let body = match read {
            Ok(body) => body,
            Err(e) => {
                // Only an I/O failure can stop inside a length-prefixed frame
                if framing == Framing::LengthPrefixed && matches!(e, AqError::Io(_)) {
                    self.connection.desynced = true;
                }
                return Err(e);
            }
        };
        trace!(reply = %String::from_utf8_lossy(&body), "Received reply");
        codec::decode_reply(&body)
    }

    /// Whether unread bytes from an abandoned frame may still be on the stream.
    #[must_use]
    pub fn is_desynced(&self) -> bool {
        self.connection.desynced
    }

    // Drop everything the server has already sent.
    fn resync(&mut self) -> AqResult<()> {
        let link = &mut self.connection.link;
        link.set_read_timeout(Some(RESYNC_TIMEOUT))?;
        let dropped = codec::drain(&mut **link)?;
        debug!(dropped, "Discarded bytes of an abandoned reply");
        self.connection.desynced = false;
        Ok(())
    }
}
