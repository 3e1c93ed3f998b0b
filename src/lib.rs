//! # Aqueduct Client Runtime
//!
//! Client-side runtime for laboratory instruments (pumps, valves, probes, balances)
//! that live behind a remote device-control server, plus the parameter model for
//! gain-scheduled PID controllers the server executes.
//!
//! ## Crate Structure
//!
//! - **`transport`**: One shared connection guarded by a mutex. `send_and_wait` sends a
//!   request and blocks for the correlated reply, retrying within an attempt budget and
//!   returning `None` when none arrives.
//! - **`device`**: `Device` entities addressed by (owner, device id), the per-channel
//!   `Command` model and the device-action envelope.
//! - **`pid`**: `Pid` parameters with gain schedules, `AccessorData` signal bindings and
//!   `PidController`, which keeps local parameters in step with the server.
//! - **`session`**: Owner identity plus shared transport; builds devices and controllers.
//! - **`config`**: `ClientConfig` loaded from TOML and `AQUEDUCT_` environment variables.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: `AqError` and `SyncError`.
//! - **`validation`**: Small validators used by configuration checks.
//!
//! ## Failure model
//!
//! Lost or unrelated replies are normal: they are retried inside the transport and
//! surface only as `None` once the budget is spent. Calls made incorrectly (a command
//! index past the channel count, simulation on a physical device) fail immediately
//! with an `AqError`.

pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod pid;
pub mod session;
pub mod transport;
pub mod validation;

pub use config::ClientConfig;
pub use device::{Device, DeviceDescriptor};
pub use error::{AqError, AqResult, SyncError};
pub use pid::{Pid, PidController};
pub use session::Session;
pub use transport::Transport;
