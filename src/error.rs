//! Custom error types for the client runtime.
//!
//! This module defines the primary error type, `AqError`, for the whole crate, plus
//! `SyncError` for the PID synchronisation protocol.
//!
//! ## Error Hierarchy
//!
//! `AqError` consolidates the error sources that can reach a caller:
//!
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or type mismatches
//!   while extracting a `ClientConfig`.
//! - **`Configuration`**: Semantic errors in a configuration that parsed fine but holds
//!   values that are logically wrong (zero port, zero attempts).
//! - **`Io`** / **`Json`** / **`Frame`**: Connection setup and frame decoding failures. Inside
//!   `Transport` these are absorbed as failed attempts; they only escape from setup calls.
//! - **Usage errors** (`CommandIndexOutOfRange`, `ChannelIndexOutOfRange`,
//!   `SimulationUnsupported`): caller bugs, raised immediately.
//!
//! Transient network conditions never surface as an `AqError`: `Transport::send_and_wait`
//! returns `None` when the attempt budget is exhausted.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AqResult<T> = std::result::Result<T, AqError>;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum AqError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed frame: {0}")]
    Frame(String),

    #[error("Command index {index} is out of range for a device with {len} channels")]
    CommandIndexOutOfRange { index: usize, len: usize },

    #[error("Channel index {index} is out of range for a device with {len} channels")]
    ChannelIndexOutOfRange { index: usize, len: usize },

    #[error("Device '{0}' does not support simulated values")]
    SimulationUnsupported(String),

    #[error("Invalid device descriptor: {0}")]
    Descriptor(String),

    #[error("Logging initialization failed: {0}")]
    Logging(String),
}

impl From<figment::Error> for AqError {
    fn from(value: figment::Error) -> Self {
        AqError::Config(Box::new(value))
    }
}

impl AqError {
    /// Returns `true` for errors caused by calling the API incorrectly.
    ///
    /// These are never retried; the caller has to fix the call site.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            AqError::CommandIndexOutOfRange { .. }
                | AqError::ChannelIndexOutOfRange { .. }
                | AqError::SimulationUnsupported(_)
        )
    }
}

/// Failure of a PID controller lifecycle call (create, update, delete).
///
/// `NoResponse` and `Malformed` are the transient outcomes of an exchange with the
/// server; the remaining variants describe a controller used out of order.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The controller has not been bound to a session yet.
    #[error("PID controller is not assigned to a session")]
    NotAssigned,

    /// The controller has no server id; call `create()` first.
    #[error("PID controller is not registered with the server")]
    NotRegistered,

    /// `create()` was called on a controller that already has an id.
    #[error("PID controller is already registered with id {0}")]
    AlreadyRegistered(u64),

    /// The controller was deleted on the server; its id is no longer valid.
    #[error("PID controller {0} has been deleted")]
    Deleted(u64),

    /// A per-schedule change named a schedule the controller does not have.
    #[error("Schedule index {index} is out of range for a controller with {len} schedules")]
    NoSuchSchedule {
        /// Requested index.
        index: usize,
        /// Number of schedules.
        len: usize,
    },

    /// Every attempt ended without a matching reply.
    #[error("No response to '{event}' after {attempts} attempts")]
    NoResponse {
        /// Reply event that was awaited.
        event: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A matching reply arrived but its payload could not be interpreted.
    #[error("Malformed reply: {0}")]
    Malformed(String),
}

impl SyncError {
    /// Returns `true` when the failure came from the network exchange rather than misuse.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::NoResponse { .. } | SyncError::Malformed(_))
    }
}
