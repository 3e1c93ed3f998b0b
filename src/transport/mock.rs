//! Mock link for testing
//!
//! `MockLink` stands in for the server socket so the transport, devices and PID
//! controllers can be exercised without a device-control server. It provides:
//! - A script of replies, consumed one per request
//! - Silence injection (the attempt times out)
//! - Raw byte injection (truncated frames, bytes arriving late)
//! - A log of every request frame for test verification
//!
//! # Example
//!
//! ```
//! use aqueduct::transport::{mock::MockLink, Event, Message, RequestOptions, Transport};
//! use serde_json::json;
//!
//! let link = MockLink::new();
//! let handle = link.handle();
//! handle.reply("get_device_live", json!({"v": 42}));
//!
//! let transport = Transport::from_link(link, Default::default());
//! let msg = Message::new(Event::GetDeviceLive, &json!({})).unwrap();
//! let payload = transport.send_and_wait(&msg, Event::GetDeviceLive, &RequestOptions::default());
//! assert_eq!(payload, Some(json!({"v": 42})));
//! assert_eq!(handle.sent().len(), 1);
//! ```

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use super::codec::{decode_reply, encode_frame, encode_reply, Framing, LENGTH_HEADER_BYTES};
use super::link::Link;

/// One scripted server response.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Bytes delivered to the next reads (framing is applied by the link).
    Frame(Vec<u8>),
    /// Bytes delivered exactly as given, without framing.
    Unframed(Vec<u8>),
    /// Nothing arrives; the attempt times out.
    Silence,
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<MockReply>,
    sent: Vec<Vec<u8>>,
    read_timeouts: Vec<Option<Duration>>,
    pending: VecDeque<u8>,
}

/// In-memory [`Link`] answering from a script.
#[derive(Debug)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
    framing: Framing,
    outgoing: Vec<u8>,
}

/// Shared control over a [`MockLink`] after it has been moved into a transport.
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    /// Create a mock link using raw framing
    #[must_use]
    pub fn new() -> Self {
        Self::with_framing(Framing::Raw)
    }

    /// Create a mock link speaking the given framing
    #[must_use]
    pub fn with_framing(framing: Framing) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            framing,
            outgoing: Vec::new(),
        }
    }

    /// Handle for scripting replies and inspecting traffic
    #[must_use]
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    // Pull the request body out of `outgoing` once a full frame has been written.
    fn take_request(&mut self) -> Option<Vec<u8>> {
        match self.framing {
            Framing::Raw => {
                if self.outgoing.is_empty() {
                    None
                } else {
                    Some(std::mem::take(&mut self.outgoing))
                }
            }
            Framing::LengthPrefixed => {
                if self.outgoing.len() < LENGTH_HEADER_BYTES {
                    return None;
                }
                let mut header = [0u8; LENGTH_HEADER_BYTES];
                header.copy_from_slice(&self.outgoing[..LENGTH_HEADER_BYTES]);
                let len = u32::from_be_bytes(header) as usize;
                if self.outgoing.len() < LENGTH_HEADER_BYTES + len {
                    return None;
                }
                let body = self.outgoing[LENGTH_HEADER_BYTES..LENGTH_HEADER_BYTES + len].to_vec();
                self.outgoing.drain(..LENGTH_HEADER_BYTES + len);
                Some(body)
            }
        }
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outgoing.extend_from_slice(buf);
        while let Some(request) = self.take_request() {
            let mut state = self.state.lock();
            state.sent.push(request);
            // A request beyond the end of the script behaves like a silent server
            match state.script.pop_front() {
                Some(MockReply::Frame(bytes)) => {
                    let frame = encode_frame(&bytes, self.framing)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
                    state.pending.extend(frame);
                }
                Some(MockReply::Unframed(bytes)) => state.pending.extend(bytes),
                Some(MockReply::Silence) | None => {}
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock read timed out"));
        }
        let n = buf.len().min(state.pending.len());
        for (slot, byte) in buf.iter_mut().zip(state.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Link for MockLink {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.state.lock().read_timeouts.push(timeout);
        Ok(())
    }
}

impl MockHandle {
    /// Queue a well-formed `[event, payload]` reply
    pub fn reply(&self, event: &str, payload: Value) {
        // Encoding a (str, Value) pair cannot fail
        let bytes = encode_reply(event, &payload).unwrap_or_default();
        self.reply_raw(bytes);
    }

    /// Queue arbitrary bytes as the next reply
    pub fn reply_raw(&self, bytes: impl Into<Vec<u8>>) {
        self.state.lock().script.push_back(MockReply::Frame(bytes.into()));
    }

    /// Queue bytes sent without framing as the next reply
    pub fn reply_unframed(&self, bytes: impl Into<Vec<u8>>) {
        self.state.lock().script.push_back(MockReply::Unframed(bytes.into()));
    }

    /// Make `bytes` readable now, without waiting for a request
    pub fn deliver(&self, bytes: &[u8]) {
        self.state.lock().pending.extend(bytes.iter().copied());
    }

    /// Bytes sent by the server but not read yet
    #[must_use]
    pub fn unread(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Queue a request that receives no answer
    pub fn silence(&self) {
        self.state.lock().script.push_back(MockReply::Silence);
    }

    /// Number of scripted replies not yet consumed
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.state.lock().script.len()
    }

    /// Raw request bodies written so far
    #[must_use]
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    /// Requests decoded as `(event, payload)`, skipping the outer command kind
    #[must_use]
    pub fn sent_events(&self) -> Vec<(String, Value)> {
        self.sent()
            .iter()
            .filter_map(|body| {
                let (_, inner): (Value, Value) = serde_json::from_slice(body).ok()?;
                let inner = serde_json::to_vec(&inner).ok()?;
                decode_reply(&inner).ok().map(|r| (r.event, r.payload))
            })
            .collect()
    }

    /// Read timeouts the transport configured, one per attempt
    #[must_use]
    pub fn read_timeouts(&self) -> Vec<Option<Duration>> {
        self.state.lock().read_timeouts.clone()
    }

    /// Clear the request log
    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replies_follow_requests() {
        let mut link = MockLink::new();
        let handle = link.handle();
        handle.reply("device_action", json!({"ok": true}));

        let mut buf = [0u8; 64];
        assert!(link.read(&mut buf).is_err());

        link.write_all(b"[\"socket_message\",[\"device_action\",{}]]").unwrap();
        let n = link.read(&mut buf).unwrap();
        let reply = decode_reply(&buf[..n]).unwrap();
        assert_eq!(reply.payload, json!({"ok": true}));
        assert_eq!(handle.sent_events()[0].0, "device_action");
    }

    #[test]
    fn silence_consumes_one_request() {
        let mut link = MockLink::new();
        let handle = link.handle();
        handle.silence();
        handle.reply("get_device", json!({}));

        link.write_all(b"[1]").unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(
            link.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::TimedOut
        );
        assert_eq!(handle.remaining(), 1);
    }

    #[test]
    fn length_prefixed_requests_are_split() {
        let mut link = MockLink::with_framing(Framing::LengthPrefixed);
        let handle = link.handle();

        let frame = encode_frame(b"[\"socket_message\",[\"get_device\",{}]]", Framing::LengthPrefixed).unwrap();
        // Header and body arriving in separate writes still form one request
        link.write_all(&frame[..2]).unwrap();
        assert!(handle.sent().is_empty());
        link.write_all(&frame[2..]).unwrap();
        assert_eq!(handle.sent().len(), 1);
    }

    #[test]
    fn delivered_bytes_are_read_before_replies() {
        let mut link = MockLink::new();
        let handle = link.handle();
        handle.deliver(b"late");
        handle.reply_unframed(b"raw".to_vec());

        link.write_all(b"[1]").unwrap();
        let mut buf = [0u8; 64];
        let n = link.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"lateraw");
        assert_eq!(handle.unread(), 0);
    }
}
