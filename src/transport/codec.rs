//! Wire envelope and frame encoding.
//!
//! Requests travel as `[outer_command_kind, [event_name, payload]]`; replies come back as
//! `[event_name, payload]`. Some server paths send the payload as a JSON-encoded string,
//! which is decoded a second time here so callers always see structured data.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::io::{self, Read};

use crate::error::{AqError, AqResult};

/// Size of the length header used by [`Framing::LengthPrefixed`].
pub const LENGTH_HEADER_BYTES: usize = 4;

/// How messages are delimited on the byte stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// One JSON document per write; a reply is whatever a single read returns.
    #[default]
    Raw,
    /// A u32 big-endian byte count precedes every JSON document.
    LengthPrefixed,
}

/// Outer command kind wrapping every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketCommand {
    /// Event-carrying message handled by the server's socket dispatcher.
    SocketMessage,
}

/// Event names understood by the device-control server.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    DeviceAction,
    GetDevice,
    GetDeviceLive,
    ClearDeviceRecordable,
    CreatePidControllers,
    PidControllersCreated,
    UpdatePidControllers,
    PidControllersUpdated,
    DeletePidControllers,
    PidControllersDeleted,
}

impl Event {
    /// Name carried on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Event::DeviceAction => "device_action",
            Event::GetDevice => "get_device",
            Event::GetDeviceLive => "get_device_live",
            Event::ClearDeviceRecordable => "clear_device_recordable",
            Event::CreatePidControllers => "create_pid_controllers",
            Event::PidControllersCreated => "pid_controllers_created",
            Event::UpdatePidControllers => "update_pid_controllers",
            Event::PidControllersUpdated => "pid_controllers_updated",
            Event::DeletePidControllers => "delete_pid_controllers",
            Event::PidControllersDeleted => "pid_controllers_deleted",
        }
    }

    /// The event the server answers this request with.
    #[must_use]
    pub fn reply(self) -> Event {
        match self {
            // Recordable data is cleared through the device-action handler
            Event::ClearDeviceRecordable => Event::DeviceAction,
            Event::CreatePidControllers => Event::PidControllersCreated,
            Event::UpdatePidControllers => Event::PidControllersUpdated,
            Event::DeletePidControllers => Event::PidControllersDeleted,
            other => other,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request ready for transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    event: Event,
    body: Vec<u8>,
}

impl Message {
    /// Wrap `payload` in the request envelope for `event`.
    pub fn new<P: Serialize + ?Sized>(event: Event, payload: &P) -> AqResult<Self> {
        let envelope = (SocketCommand::SocketMessage, (event.as_str(), payload));
        let body = serde_json::to_vec(&envelope)?;
        Ok(Self { event, body })
    }

    /// Event this request carries.
    #[must_use]
    pub fn event(&self) -> Event {
        self.event
    }

    /// Encoded JSON body, without framing.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body with framing applied.
    pub fn to_frame(&self, framing: Framing) -> AqResult<Vec<u8>> {
        encode_frame(&self.body, framing)
    }
}

/// A decoded `[event, payload]` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Event name reported by the server
    pub event: String,
    /// Structured payload
    pub payload: Value,
}

/// Length header for a body of `len` bytes.
pub fn frame_length(len: usize) -> AqResult<u32> {
    u32::try_from(len)
        .map_err(|_| AqError::Frame(format!("body of {len} bytes does not fit a length header")))
}

/// Apply `framing` to an encoded document.
pub fn encode_frame(body: &[u8], framing: Framing) -> AqResult<Vec<u8>> {
    match framing {
        Framing::Raw => Ok(body.to_vec()),
        Framing::LengthPrefixed => {
            let header = frame_length(body.len())?;
            let mut frame = Vec::with_capacity(LENGTH_HEADER_BYTES + body.len());
            frame.extend_from_slice(&header.to_be_bytes());
            frame.extend_from_slice(body);
            Ok(frame)
        }
    }
}

/// Read one frame from `reader`, never accepting more than `max_bytes` of body.
pub fn read_frame<R: Read + ?Sized>(
    reader: &mut R,
    framing: Framing,
    max_bytes: usize,
) -> AqResult<Vec<u8>> {
    match framing {
        Framing::Raw => {
            let mut buf = vec![0u8; max_bytes];
            let n = reader.read(&mut buf)?;
            if n == 0 {
                return Err(AqError::Frame("connection closed by server".to_string()));
            }
            buf.truncate(n);
            Ok(buf)
        }
        Framing::LengthPrefixed => {
            let mut header = [0u8; LENGTH_HEADER_BYTES];
            reader.read_exact(&mut header)?;
            let len = u32::from_be_bytes(header) as usize;
            if len > max_bytes {
                // Skip the body so the next header starts on a frame boundary
                io::copy(&mut Read::take(&mut *reader, len as u64), &mut io::sink())?;
                return Err(AqError::Frame(format!(
                    "frame of {len} bytes exceeds receive buffer of {max_bytes} bytes"
                )));
            }
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body)?;
            Ok(body)
        }
    }
}

/// Discard whatever the peer has already sent, until a read times out.
///
/// Returns the number of bytes dropped. A closed connection ends the drain.
pub fn drain<R: Read + ?Sized>(reader: &mut R) -> io::Result<usize> {
    let mut buf = [0u8; 4096];
    let mut dropped = 0;
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(dropped),
            Ok(n) => dropped += n,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Ok(dropped)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

/// Decode a reply document.
pub fn decode_reply(bytes: &[u8]) -> AqResult<Reply> {
    let (event, payload): (String, Value) = serde_json::from_slice(bytes)?;
    let payload = match payload {
        Value::String(inner) => serde_json::from_str(&inner)?,
        other => other,
    };
    Ok(Reply { event, payload })
}

/// Encode a reply document, as the server would. Used by [`MockLink`](super::mock::MockLink).
pub fn encode_reply(event: &str, payload: &Value) -> AqResult<Vec<u8>> {
    Ok(serde_json::to_vec(&(event, payload))?)
}
