//! Owner and device identity.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Server-assigned device number.
pub type DeviceId = u64;

/// Owner identity assigned at connection setup.
///
/// The server issues either a numeric id or a string token, and echoes it back in the
/// same form, so both are kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    /// Numeric owner id
    Numeric(u64),
    /// Textual owner id
    Text(String),
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId::Text(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        UserId::Text(value)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        UserId::Numeric(value)
    }
}

impl FromStr for UserId {
    type Err = Infallible;

    /// Digits-only ids are numeric; anything else is kept as text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<u64>().map_or_else(|_| UserId::from(s), UserId::Numeric))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Numeric(id) => write!(f, "{id}"),
            UserId::Text(id) => f.write_str(id),
        }
    }
}

/// (owner, device) pair addressing one device on the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Owner of the session the device belongs to
    pub user_id: UserId,
    /// Device number
    pub device_id: DeviceId,
}

impl DeviceIdentity {
    /// Create an identity
    pub fn new(user_id: impl Into<UserId>, device_id: DeviceId) -> Self {
        Self {
            user_id: user_id.into(),
            device_id,
        }
    }

    /// Whether an object carrying `user_id` and `device_id` fields addresses this device.
    #[must_use]
    pub fn is_for_me(&self, section: &Value) -> bool {
        let device_matches = section.get("device_id").and_then(Value::as_u64) == Some(self.device_id);
        let user_matches = section
            .get("user_id")
            .and_then(|v| UserId::deserialize(v).ok())
            .is_some_and(|user| user == self.user_id);
        device_matches && user_matches
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_matching() {
        let id = DeviceIdentity::new("bench", 3);
        assert!(id.is_for_me(&json!({"user_id": "bench", "device_id": 3, "name": "PV"})));
        assert!(!id.is_for_me(&json!({"user_id": "bench", "device_id": 4})));
        assert!(!id.is_for_me(&json!({"user_id": "other", "device_id": 3})));
        assert!(!id.is_for_me(&json!({"device_id": 3})));
    }

    #[test]
    fn numeric_and_text_owners_differ() {
        let id = DeviceIdentity::new(7u64, 1);
        assert!(id.is_for_me(&json!({"user_id": 7, "device_id": 1})));
        assert!(!id.is_for_me(&json!({"user_id": "7", "device_id": 1})));
    }

    #[test]
    fn parsed_owner_ids() {
        assert_eq!("42".parse::<UserId>(), Ok(UserId::Numeric(42)));
        assert_eq!("bench".parse::<UserId>(), Ok(UserId::Text("bench".into())));
    }

    #[test]
    fn serializes_flat() {
        let id = DeviceIdentity::new(12u64, 5);
        assert_eq!(
            serde_json::to_value(&id).unwrap(),
            json!({"user_id": 12, "device_id": 5})
        );
    }
}
