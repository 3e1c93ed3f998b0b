//! Addressable devices on the device-control server.
//!
//! A [`Device`] is built once from discovery data ([`DeviceDescriptor`]) and lives for
//! the whole session. It reads snapshots of its state, dispatches per-channel commands
//! and, for simulated instruments, injects synthetic values.
//!
//! # Example
//!
//! ```no_run
//! use aqueduct::device::{kinds::StopPump, payload::Action};
//! # fn run(pump: &aqueduct::device::Device) -> aqueduct::error::AqResult<()> {
//! let mut commands = pump.make_commands();
//! pump.set_command(&mut commands, 0, StopPump)?;
//! pump.dispatch(Action::Stop, &commands, None);
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod identity;
pub mod kinds;
pub mod payload;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub use command::{Command, CommandArray};
pub use identity::{DeviceId, DeviceIdentity, UserId};
pub use payload::{Action, CommandBody, CommandPayload, SimChannel};

use crate::config::TransportConfig;
use crate::error::{AqError, AqResult};
use crate::pid::accessor::{AccessorData, AccessorKind};
use crate::transport::{Event, Message, RequestOptions, Transport};

/// Physical connection between the server and an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Interface {
    /// Simulated instrument inside the server
    Simulated = 0,
    /// Fieldbus (CAN)
    Bus = 1,
    /// Ethernet
    Network = 2,
    /// Serial line
    Serial = 3,
}

impl From<Interface> for u8 {
    fn from(value: Interface) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for Interface {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Interface::Simulated),
            1 => Ok(Interface::Bus),
            2 => Ok(Interface::Network),
            3 => Ok(Interface::Serial),
            other => Err(format!("unknown interface code {other}")),
        }
    }
}

/// Identity and shape of a device, as reported by device discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Owner and device number
    pub identity: DeviceIdentity,
    /// Display name
    pub name: String,
    /// Server-side device type tag
    pub kind: String,
    /// How the server reaches the instrument
    pub interface: Interface,
    /// Number of channels
    pub channel_count: usize,
    /// Whether synthetic values can be injected
    pub supports_simulation: bool,
}

#[derive(Deserialize)]
struct BaseSection {
    user_id: UserId,
    device_id: DeviceId,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    interface: Interface,
}

impl DeviceDescriptor {
    /// Parse one discovery entry of the form `{"base": {...}, "live": [...]}`.
    ///
    /// The channel count is the length of the live list. Simulation support is enabled
    /// for simulated interfaces and can be changed on the built [`Device`].
    pub fn from_setup_entry(entry: &Value) -> AqResult<Self> {
        let base = entry
            .get("base")
            .ok_or_else(|| AqError::Descriptor("missing 'base' section".to_string()))?;
        let base = BaseSection::deserialize(base)
            .map_err(|e| AqError::Descriptor(format!("invalid 'base' section: {e}")))?;
        let channel_count = entry
            .get("live")
            .and_then(Value::as_array)
            .map(Vec::len)
            .ok_or_else(|| AqError::Descriptor("missing 'live' list".to_string()))?;

        Ok(Self {
            identity: DeviceIdentity::new(base.user_id, base.device_id),
            name: base.name,
            kind: base.kind,
            interface: base.interface,
            channel_count,
            supports_simulation: base.interface == Interface::Simulated,
        })
    }
}

/// Full state of a device as returned by `get_device`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSnapshot {
    /// Identity and metadata section
    pub base: Value,
    /// Continuously changing per-channel readings
    pub live: Vec<Value>,
    /// Per-channel statistics
    pub stat: Vec<Value>,
    /// Per-channel static configuration
    pub config: Vec<Value>,
}

/// Addressing for requests that carry no action: `{user_id, device_id, action: null}`.
#[derive(Debug, Serialize)]
struct DeviceQuery<'a> {
    user_id: &'a UserId,
    device_id: DeviceId,
    action: Option<Action>,
}

/// A remote instrument with a fixed number of identical channels.
#[derive(Debug, Clone)]
pub struct Device {
    descriptor: DeviceDescriptor,
    transport: Transport,
    options: RequestOptions,
    socket_delay: Duration,
    command_delay: Duration,
}

impl Device {
    /// Bind a discovered device to the session transport.
    ///
    /// Simulated devices dispatch without delay; all others wait
    /// `config.command_delay()` between send and read.
    pub fn new(transport: Transport, descriptor: DeviceDescriptor, config: &TransportConfig) -> Self {
        let command_delay = match descriptor.interface {
            Interface::Simulated => Duration::ZERO,
            _ => config.command_delay(),
        };
        Self {
            descriptor,
            transport,
            options: RequestOptions::from_config(config),
            socket_delay: config.socket_delay(),
            command_delay,
        }
    }

    /// Descriptor the device was built from
    #[must_use]
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Owner and device number
    #[must_use]
    pub fn identity(&self) -> &DeviceIdentity {
        &self.descriptor.identity
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Server-side device type tag
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.descriptor.kind
    }

    /// Interface the server reaches the instrument through
    #[must_use]
    pub fn interface(&self) -> Interface {
        self.descriptor.interface
    }

    /// Number of channels
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptor.channel_count
    }

    /// Whether the device has no channels
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptor.channel_count == 0
    }

    /// Pause between sending a command and reading its acknowledgement
    #[must_use]
    pub fn command_delay(&self) -> Duration {
        self.command_delay
    }

    /// Change the dispatch delay
    pub fn set_command_delay(&mut self, delay: Duration) {
        self.command_delay = delay;
    }

    /// Whether synthetic values can be injected
    #[must_use]
    pub fn supports_simulation(&self) -> bool {
        self.descriptor.supports_simulation
    }

    /// Enable or disable simulation injection
    pub fn set_supports_simulation(&mut self, supported: bool) {
        self.descriptor.supports_simulation = supported;
    }

    /// Replace the retry parameters used for every request of this device
    pub fn set_request_options(&mut self, options: RequestOptions) {
        self.options = options;
    }

    fn query(&self) -> DeviceQuery<'_> {
        DeviceQuery {
            user_id: &self.identity().user_id,
            device_id: self.identity().device_id,
            action: None,
        }
    }

    fn message<P: Serialize + ?Sized>(&self, event: Event, payload: &P) -> Option<Message> {
        match Message::new(event, payload) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(device_id = self.identity().device_id, %event, error = %e, "Failed to encode request");
                None
            }
        }
    }

    /// Request a full snapshot.
    ///
    /// Replies whose embedded identity belongs to another device are discarded and
    /// retried within the same attempt budget. `None` when no matching reply arrives.
    pub fn get(&self) -> Option<DeviceSnapshot> {
        let message = self.message(Event::GetDevice, &self.query())?;
        let identity = self.identity();
        let mut payload = self.transport.send_and_wait_for(
            &message,
            Event::GetDevice,
            &self.options.with_delay(self.socket_delay),
            |p| {
                p.get("device")
                    .and_then(|device| device.get("base"))
                    .is_some_and(|base| identity.is_for_me(base))
            },
        )?;
        let device = payload.get_mut("device").map(Value::take).unwrap_or_default();
        match serde_json::from_value(device) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(device_id = identity.device_id, error = %e, "Malformed device snapshot");
                None
            }
        }
    }

    /// Request the live section only, one entry per channel.
    pub fn get_live(&self) -> Option<Vec<Value>> {
        let message = self.message(Event::GetDeviceLive, &self.query())?;
        let identity = self.identity();
        let mut payload = self.transport.send_and_wait_for(
            &message,
            Event::GetDeviceLive,
            &self.options.with_delay(self.socket_delay),
            |p| identity.is_for_me(p),
        )?;
        match payload.get_mut("live").map(Value::take).unwrap_or_default() {
            Value::Array(live) => Some(live),
            other => {
                warn!(device_id = identity.device_id, live = %other, "Live reply without a live list");
                None
            }
        }
    }

    /// Value of `key` in each channel's live entry, `null` where absent.
    pub fn extract_live_as_tuple(&self, key: &str) -> Option<Vec<Value>> {
        self.extract_live_as_tuple_with(key, Value::clone)
    }

    /// Like [`Device::extract_live_as_tuple`], converting each value with `cast`.
    pub fn extract_live_as_tuple_with<T>(&self, key: &str, cast: impl Fn(&Value) -> T) -> Option<Vec<T>> {
        let live = self.get_live()?;
        Some(
            (0..self.len())
                .map(|i| cast(channel_field(&live, i, key)))
                .collect(),
        )
    }

    /// Values of every key in `keys`, per channel.
    pub fn extract_live_as_tuple_of_tuples(&self, keys: &[&str]) -> Option<Vec<Vec<Value>>> {
        self.extract_live_as_tuple_of_tuples_with(keys, Value::clone)
    }

    /// Like [`Device::extract_live_as_tuple_of_tuples`], converting each value with `cast`.
    pub fn extract_live_as_tuple_of_tuples_with<T>(
        &self,
        keys: &[&str],
        cast: impl Fn(&Value) -> T,
    ) -> Option<Vec<Vec<T>>> {
        let live = self.get_live()?;
        Some(
            (0..self.len())
                .map(|i| keys.iter().map(|key| cast(channel_field(&live, i, key))).collect())
                .collect(),
        )
    }

    /// Every live entry deserialized as `T`.
    pub fn live_as<T: DeserializeOwned>(&self) -> Option<Vec<T>> {
        cast_section(self.identity(), "live", self.get_live()?)
    }

    /// Every stat entry deserialized as `T`.
    pub fn stat_as<T: DeserializeOwned>(&self) -> Option<Vec<T>> {
        cast_section(self.identity(), "stat", self.get()?.stat)
    }

    /// Every config entry deserialized as `T`.
    pub fn config_as<T: DeserializeOwned>(&self) -> Option<Vec<T>> {
        cast_section(self.identity(), "config", self.get()?.config)
    }

    /// An empty command array with one slot per channel.
    #[must_use]
    pub fn make_commands<C>(&self) -> CommandArray<C> {
        CommandArray::new(self.len())
    }

    /// Place `command` in slot `index` of `commands`.
    ///
    /// # Errors
    ///
    /// `CommandIndexOutOfRange` if `index` is not a channel of this device; `commands`
    /// is left unmodified.
    pub fn set_command<C>(&self, commands: &mut CommandArray<C>, index: usize, command: C) -> AqResult<()> {
        if index >= self.len() {
            return Err(AqError::CommandIndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        commands.set(index, command)
    }

    /// Build the envelope for an action on this device.
    #[must_use]
    pub fn to_payload(&self, action: Action, command: CommandBody, record: Option<bool>) -> CommandPayload {
        CommandPayload::new(self.identity(), action, command, record)
    }

    /// Send a device action and wait for its acknowledgement.
    pub fn send_command(&self, payload: &CommandPayload) -> Option<Value> {
        let message = self.message(Event::DeviceAction, payload)?;
        self.transport.send_and_wait(
            &message,
            Event::DeviceAction,
            &self.options.with_delay(self.command_delay),
        )
    }

    /// Send a command array as `action`.
    pub fn dispatch<C: Command>(&self, action: Action, commands: &CommandArray<C>, record: Option<bool>) -> Option<Value> {
        let body = CommandBody::Channels {
            commands: commands.to_wire(),
        };
        self.send_command(&self.to_payload(action, body, record))
    }

    /// Start or stop recording this device's data on the server.
    pub fn update_record(&self, record: bool) -> Option<Value> {
        self.send_command(&self.to_payload(Action::UpdateRecord, CommandBody::Empty, Some(record)))
    }

    /// Discard the data recorded for this device so far.
    pub fn clear_recorded(&self) -> Option<Value> {
        let message = self.message(Event::ClearDeviceRecordable, &self.query())?;
        self.transport.send_and_wait(
            &message,
            Event::ClearDeviceRecordable.reply(),
            &self.options.with_delay(self.command_delay),
        )
    }

    /// Inject simulated values, rates of change and noise.
    ///
    /// Each list is optional, and so is each entry: `None` leaves that channel's
    /// quantity unchanged and is sent as `null`. Every other entry is multiplied by
    /// `scale`. Entries beyond the channel count are ignored.
    ///
    /// # Errors
    ///
    /// `SimulationUnsupported` if the device does not accept synthetic values; nothing
    /// is sent.
    pub fn set_sim_data(
        &self,
        values: Option<&[Option<f64>]>,
        rates_of_change: Option<&[Option<f64>]>,
        noise: Option<&[Option<f64>]>,
        scale: f64,
    ) -> AqResult<Option<Value>> {
        if !self.supports_simulation() {
            return Err(AqError::SimulationUnsupported(self.name().to_string()));
        }
        let scaled = |list: Option<&[Option<f64>]>, i: usize| {
            list.and_then(|l| l.get(i).copied().flatten()).map(|v| v * scale)
        };
        let channels: Vec<SimChannel> = (0..self.len())
            .map(|i| (scaled(values, i), scaled(rates_of_change, i), scaled(noise, i)))
            .collect();
        debug!(device_id = self.identity().device_id, scale, "Injecting simulated data");
        Ok(self.send_command(&self.to_payload(Action::SetSimValues, CommandBody::SimData(channels), None)))
    }

    /// Inject simulated values only.
    pub fn set_sim_values(&self, values: &[Option<f64>], scale: f64) -> AqResult<Option<Value>> {
        self.set_sim_data(Some(values), None, None, scale)
    }

    /// Inject simulated rates of change only.
    pub fn set_sim_rates_of_change(&self, rates: &[Option<f64>], scale: f64) -> AqResult<Option<Value>> {
        self.set_sim_data(None, Some(rates), None, scale)
    }

    /// Inject simulated noise only.
    pub fn set_sim_noise(&self, noise: &[Option<f64>], scale: f64) -> AqResult<Option<Value>> {
        self.set_sim_data(None, None, Some(noise), scale)
    }

    /// Name one channel of this device as a PID input or output.
    ///
    /// # Errors
    ///
    /// `ChannelIndexOutOfRange` if `index` is not a channel of this device.
    pub fn accessor(&self, kind: AccessorKind, units: u32, index: usize) -> AqResult<AccessorData> {
        if index >= self.len() {
            return Err(AqError::ChannelIndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(AccessorData {
            kind,
            units,
            device_id: self.identity().device_id,
            index,
        })
    }
}

fn channel_field<'a>(live: &'a [Value], index: usize, key: &str) -> &'a Value {
    live.get(index).and_then(|entry| entry.get(key)).unwrap_or(&Value::Null)
}

fn cast_section<T: DeserializeOwned>(identity: &DeviceIdentity, section: &str, entries: Vec<Value>) -> Option<Vec<T>> {
    match entries
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
    {
        Ok(cast) => Some(cast),
        Err(e) => {
            warn!(device_id = identity.device_id, section, error = %e, "Failed to cast device section");
            None
        }
    }
}
