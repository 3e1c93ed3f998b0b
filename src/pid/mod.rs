//! Gain-scheduled PID controllers executed by the server.
//!
//! - [`accessor`]: which signal a controller reads and drives
//! - [`model`]: the serializable parameter model and schedule selection
//! - [`controller`]: create/update/delete synchronisation

pub mod accessor;
pub mod controller;
pub mod model;

pub use accessor::{AccessorData, AccessorKind};
pub use controller::{ControllerId, PidController, PidDefinition, Registration};
pub use model::{Controller, ControllerSchedule, GainUpdate, Interval, Limits, Pid, Schedule};
