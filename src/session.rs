//! Client sessions.
//!
//! A [`Session`] is the owner identity assigned at connection setup plus the one
//! transport every device and PID controller of that owner shares. It builds
//! [`Device`]s from discovery data and hands out PID controllers already bound to the
//! connection.
//!
//! ## Persistence
//!
//! - **`save_controllers`**: Writes controller definitions (name, signals, parameters)
//!   to a JSON file.
//! - **`load_controllers`**: Reads them back. Loaded controllers are unregistered; call
//!   `create()` to recreate them on the server.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::config::ClientConfig;
use crate::device::{Device, DeviceDescriptor, UserId};
use crate::error::AqResult;
use crate::pid::{AccessorData, Pid, PidController, PidDefinition};
use crate::transport::{RequestOptions, Transport};

/// Owner identity and shared connection.
#[derive(Debug, Clone)]
pub struct Session {
    config: ClientConfig,
    user_id: UserId,
    transport: Transport,
}

impl Session {
    /// Validate `config` and connect to its server.
    pub fn connect(config: ClientConfig) -> AqResult<Self> {
        config.validate()?;
        let transport = Transport::connect(&config)?;
        let session = Self::from_transport(config, transport);
        info!(user_id = %session.user_id, address = %session.config.server.address(), "Session connected");
        Ok(session)
    }

    /// Use an existing transport (for example one over a `MockLink`).
    #[must_use]
    pub fn from_transport(config: ClientConfig, transport: Transport) -> Self {
        let user_id = config
            .server
            .user_id
            .parse()
            .unwrap_or_else(|never: std::convert::Infallible| match never {});
        Self {
            config,
            user_id,
            transport,
        }
    }

    /// Owner identity
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Configuration the session was built with
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Shared transport
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Bind a discovered device to this session's connection.
    #[must_use]
    pub fn device(&self, descriptor: DeviceDescriptor) -> Device {
        Device::new(self.transport.clone(), descriptor, &self.config.transport)
    }

    /// Build every device listed in discovery entries (`{"base": {...}, "live": [...]}`).
    ///
    /// Entries owned by another user are skipped.
    pub fn devices_from_setup(&self, entries: &[Value]) -> AqResult<Vec<Device>> {
        let mut devices = Vec::with_capacity(entries.len());
        for entry in entries {
            let descriptor = DeviceDescriptor::from_setup_entry(entry)?;
            if descriptor.identity.user_id == self.user_id {
                devices.push(self.device(descriptor));
            }
        }
        info!(count = devices.len(), "Devices discovered");
        Ok(devices)
    }

    /// Retry parameters for PID create/update/delete round trips.
    #[must_use]
    pub fn pid_options(&self) -> RequestOptions {
        RequestOptions::from_config(&self.config.transport).with_attempts(self.config.pid.sync_attempts)
    }

    /// Bind `controller` to this session's connection.
    pub fn assign(&self, controller: &mut PidController) {
        controller.assign(self.transport.clone(), self.pid_options());
    }

    /// A new controller bound to this session, not yet created on the server.
    #[must_use]
    pub fn pid_controller(&self, name: Option<&str>, input: AccessorData, output: AccessorData, pid: Pid) -> PidController {
        let mut controller = PidController::new(name.map(str::to_string), input, output, pid);
        self.assign(&mut controller);
        controller
    }
}

/// On-disk set of controller definitions.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerFile {
    /// Saved controllers
    pub controllers: Vec<PidDefinition>,
}

/// Saves controller definitions to a JSON file.
pub fn save_controllers(controllers: &[PidController], path: &Path) -> Result<()> {
    let file = ControllerFile {
        controllers: controllers.iter().map(|c| c.definition().clone()).collect(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Loads controller definitions from a JSON file.
pub fn load_controllers(path: &Path) -> Result<Vec<PidDefinition>> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file: ControllerFile = serde_json::from_str(&json)?;
    Ok(file.controllers)
}
