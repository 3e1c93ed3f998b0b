//! Concrete commands for the common device kinds.
//!
//! Each command is a stateless value object; its wire form is the tuple the device
//! worker on the server unpacks, in that order.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::command::Command;

/// Pump operating mode.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum PumpMode {
    Continuous = 0,
    Finite = 1,
}

/// Pump rotation.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum PumpStatus {
    Stopped = 0,
    Clockwise = 1,
    CounterClockwise = 2,
}

/// Units a pump rate is expressed in.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum RateUnits {
    Rpm = 0,
    UlMin = 1,
    UlHr = 2,
    MlMin = 3,
    MlHr = 4,
}

/// Units bounding a finite pump run.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FiniteUnits {
    Steps = 0,
    Seconds = 1,
    Minutes = 2,
    Degrees = 3,
    Ml = 4,
    Ul = 5,
    Revolutions = 6,
}

macro_rules! wire_code {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl From<$ty> for u8 {
            fn from(value: $ty) -> u8 {
                value as u8
            }
        }

        impl TryFrom<u8> for $ty {
            type Error = String;

            fn try_from(code: u8) -> Result<Self, Self::Error> {
                [$($ty::$variant),+]
                    .into_iter()
                    .find(|v| *v as u8 == code)
                    .ok_or_else(|| format!("unknown {} code {code}", stringify!($ty)))
            }
        }
    };
}

wire_code!(PumpMode { Continuous, Finite });
wire_code!(PumpStatus { Stopped, Clockwise, CounterClockwise });
wire_code!(RateUnits { Rpm, UlMin, UlHr, MlMin, MlHr });
wire_code!(FiniteUnits { Steps, Seconds, Minutes, Degrees, Ml, Ul, Revolutions });

/// Start a pump channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartPump {
    /// Continuous or finite run
    pub mode: PumpMode,
    /// Rotation direction
    pub direction: PumpStatus,
    /// Units of `rate_value`
    pub rate_units: RateUnits,
    /// Target rate
    pub rate_value: f64,
    /// Run length for finite mode, `None` for a continuous run
    pub finite_value: Option<f64>,
    /// Units of `finite_value`
    pub finite_units: Option<FiniteUnits>,
}

impl StartPump {
    /// Continuous run at `rate_value` in `rate_units`
    #[must_use]
    pub fn continuous(direction: PumpStatus, rate_units: RateUnits, rate_value: f64) -> Self {
        Self {
            mode: PumpMode::Continuous,
            direction,
            rate_units,
            rate_value,
            finite_value: None,
            finite_units: None,
        }
    }

    /// Run for `finite_value` `finite_units`, then stop
    #[must_use]
    pub fn finite(
        direction: PumpStatus,
        rate_units: RateUnits,
        rate_value: f64,
        finite_value: f64,
        finite_units: FiniteUnits,
    ) -> Self {
        Self {
            mode: PumpMode::Finite,
            direction,
            rate_units,
            rate_value,
            finite_value: Some(finite_value),
            finite_units: Some(finite_units),
        }
    }
}

impl Command for StartPump {
    fn to_command(&self) -> Value {
        json!([
            u8::from(self.mode),
            u8::from(self.direction),
            u8::from(self.rate_units),
            self.rate_value,
            self.finite_value,
            self.finite_units.map(u8::from),
        ])
    }
}

/// Stop a pump channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopPump;

impl Command for StopPump {
    fn to_command(&self) -> Value {
        json!(0)
    }
}

/// Change the rate of a running pump channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangePumpSpeed {
    /// Units of `rate_value`
    pub rate_units: RateUnits,
    /// New rate
    pub rate_value: f64,
}

impl Command for ChangePumpSpeed {
    fn to_command(&self) -> Value {
        json!([u8::from(self.rate_units), self.rate_value])
    }
}

/// Move a valve to a fractional opening.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetValvePosition {
    /// Opening in `0.0..=1.0`
    pub pct_open: f64,
}

impl Command for SetValvePosition {
    fn to_command(&self) -> Value {
        json!(self.pct_open.clamp(0.0, 1.0))
    }
}

/// Zero a sensor channel (balance, pressure transducer).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tare;

impl Command for Tare {
    fn to_command(&self) -> Value {
        json!(1)
    }
}
