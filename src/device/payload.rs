//! Device-action envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::identity::{DeviceId, DeviceIdentity, UserId};

/// Action a device worker performs with the attached command body.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Start,
    Stop,
    ChangeSpeed,
    SetValvePosition,
    Tare,
    SetSimValues,
    UpdateRecord,
}

/// Simulated (value, rate of change, noise) for one channel; `None` leaves it unchanged.
pub type SimChannel = (Option<f64>, Option<f64>, Option<f64>);

/// The `command` field of a device action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandBody {
    /// Per-channel command array, `null` for untouched channels
    Channels {
        /// Wire form of each slot
        commands: Vec<Value>,
    },
    /// Simulation data, one entry per channel
    SimData(Vec<SimChannel>),
    /// No command body (sent as `null`)
    Empty,
}

/// Unit of transmission for a device action: `{user_id, device_id, action, command, record?}`.
///
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandPayload {
    user_id: UserId,
    device_id: DeviceId,
    action: Action,
    command: CommandBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<bool>,
}

impl CommandPayload {
    /// Bind a command body to a device.
    pub fn new(identity: &DeviceIdentity, action: Action, command: CommandBody, record: Option<bool>) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            device_id: identity.device_id,
            action,
            command,
            record,
        }
    }

    /// Addressed owner
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Addressed device
    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Requested action
    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    /// Command body
    #[must_use]
    pub fn command(&self) -> &CommandBody {
        &self.command
    }

    /// Whether the server should (stop) recording this device, if set
    #[must_use]
    pub fn record(&self) -> Option<bool> {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_flag_omitted_when_unset() {
        let id = DeviceIdentity::new("u", 2);
        let body = CommandBody::Channels {
            commands: vec![json!(1), Value::Null],
        };
        let payload = CommandPayload::new(&id, Action::Stop, body, None);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "user_id": "u",
                "device_id": 2,
                "action": "stop",
                "command": {"commands": [1, null]}
            })
        );
    }

    #[test]
    fn empty_body_and_record() {
        let id = DeviceIdentity::new(4u64, 9);
        let payload = CommandPayload::new(&id, Action::UpdateRecord, CommandBody::Empty, Some(true));
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["command"], Value::Null);
        assert_eq!(value["record"], json!(true));
    }

    #[test]
    fn sim_data_is_a_list_of_triples() {
        let id = DeviceIdentity::new("u", 1);
        let body = CommandBody::SimData(vec![(Some(2.0), None, Some(0.1)), (None, None, None)]);
        let payload = CommandPayload::new(&id, Action::SetSimValues, body, None);
        assert_eq!(
            serde_json::to_value(&payload).unwrap()["command"],
            json!([[2.0, null, 0.1], [null, null, null]])
        );
    }
}
