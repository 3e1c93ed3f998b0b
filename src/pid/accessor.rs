//! Signal references used to wire PID inputs and outputs.

use serde::{Deserialize, Serialize};

use crate::device::DeviceId;

/// Physical quantity a signal carries.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum AccessorKind {
    MassFlow = 0,
    Ph = 1,
    Pressure = 2,
    Temperature = 3,
    Weight = 4,
    PeristalticRate = 5,
    SyringeRate = 6,
    PeristalticStatus = 7,
    SyringeStatus = 8,
    Position = 9,
}

impl AccessorKind {
    const ALL: [AccessorKind; 10] = [
        AccessorKind::MassFlow,
        AccessorKind::Ph,
        AccessorKind::Pressure,
        AccessorKind::Temperature,
        AccessorKind::Weight,
        AccessorKind::PeristalticRate,
        AccessorKind::SyringeRate,
        AccessorKind::PeristalticStatus,
        AccessorKind::SyringeStatus,
        AccessorKind::Position,
    ];
}

impl From<AccessorKind> for u8 {
    fn from(kind: AccessorKind) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for AccessorKind {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        AccessorKind::ALL
            .get(usize::from(code))
            .copied()
            .ok_or_else(|| format!("unknown accessor kind {code}"))
    }
}

/// One scalar signal: kind, unit code, device and channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessorData {
    /// Quantity carried by the signal
    pub kind: AccessorKind,
    /// Device-specific unit code
    pub units: u32,
    /// Device owning the channel
    pub device_id: DeviceId,
    /// Channel index on that device
    pub index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kinds_use_integer_codes() {
        for (code, kind) in AccessorKind::ALL.iter().enumerate() {
            assert_eq!(u8::from(*kind) as usize, code);
        }
        assert!(AccessorKind::try_from(10).is_err());
    }

    #[test]
    fn serialized_shape() {
        let accessor = AccessorData {
            kind: AccessorKind::Weight,
            units: 0,
            device_id: 12,
            index: 1,
        };
        assert_eq!(
            serde_json::to_value(accessor).unwrap(),
            json!({"kind": 4, "units": 0, "device_id": 12, "index": 1})
        );
    }
}
