//! Server-synchronised PID controllers.
//!
//! A [`PidController`] is a configuration proxy: the server executes the loop and owns
//! the authoritative state. Each parameter change is computed on a copy of the local
//! [`Pid`], sent to the server, and the local state is replaced wholesale by the `Pid`
//! the server returns. When the exchange fails the local state stays exactly as it was
//! before the call.
//!
//! # Lifecycle
//!
//! ```text
//! new() -> assign() -> create() -> change_*/enable/disable/clear_integral ... -> delete()
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::accessor::AccessorData;
use super::model::{GainUpdate, Pid};
use crate::error::SyncError;
use crate::transport::{Event, Message, RequestOptions, Transport};

/// Server-assigned controller id.
pub type ControllerId = u64;

/// Everything needed to recreate a controller on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PidDefinition {
    /// Optional display name
    #[serde(default)]
    pub name: Option<String>,
    /// Process value signal
    pub input: AccessorData,
    /// Control output signal
    pub output: AccessorData,
    /// Controller parameters
    pub pid: Pid,
}

/// Where a controller stands with respect to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Not yet created on the server
    Unregistered,
    /// Created; the id addresses it
    Registered(ControllerId),
    /// Deleted; the id is no longer valid
    Deleted(ControllerId),
}

#[derive(Debug, Clone)]
struct Binding {
    transport: Transport,
    options: RequestOptions,
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    controllers: [&'a PidDefinition; 1],
}

#[derive(Serialize)]
struct UpdateEntry<'a> {
    id: ControllerId,
    pid: &'a Pid,
}

#[derive(Serialize)]
struct UpdateRequest<'a> {
    controllers: [UpdateEntry<'a>; 1],
}

#[derive(Serialize)]
struct DeleteRequest {
    ids: [ControllerId; 1],
}

/// A PID controller bound to an input and an output signal.
#[derive(Debug, Clone)]
pub struct PidController {
    definition: PidDefinition,
    registration: Registration,
    binding: Option<Binding>,
}

impl PidController {
    /// Create an unattached, unregistered controller.
    pub fn new(name: Option<String>, input: AccessorData, output: AccessorData, pid: Pid) -> Self {
        Self::from_definition(PidDefinition {
            name,
            input,
            output,
            pid,
        })
    }

    /// Create an unattached, unregistered controller from a saved definition.
    #[must_use]
    pub fn from_definition(definition: PidDefinition) -> Self {
        Self {
            definition,
            registration: Registration::Unregistered,
            binding: None,
        }
    }

    /// Bind the controller to a connection. No request is made.
    pub fn assign(&mut self, transport: Transport, options: RequestOptions) {
        self.binding = Some(Binding { transport, options });
    }

    /// Same as [`PidController::assign`].
    pub fn register(&mut self, transport: Transport, options: RequestOptions) {
        self.assign(transport, options);
    }

    /// Whether the controller is bound to a connection
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        self.binding.is_some()
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.definition.name.as_deref()
    }

    /// Process value signal
    #[must_use]
    pub fn input(&self) -> &AccessorData {
        &self.definition.input
    }

    /// Control output signal
    #[must_use]
    pub fn output(&self) -> &AccessorData {
        &self.definition.output
    }

    /// Current parameters (the server's, after any successful exchange)
    #[must_use]
    pub fn pid(&self) -> &Pid {
        &self.definition.pid
    }

    /// Edit parameters locally; the edits reach the server on the next synchronisation.
    pub fn pid_mut(&mut self) -> &mut Pid {
        &mut self.definition.pid
    }

    /// Name, signals and parameters
    #[must_use]
    pub fn definition(&self) -> &PidDefinition {
        &self.definition
    }

    /// Registration state
    #[must_use]
    pub fn registration(&self) -> Registration {
        self.registration
    }

    /// Server id, while registered
    #[must_use]
    pub fn id(&self) -> Option<ControllerId> {
        match self.registration {
            Registration::Registered(id) => Some(id),
            _ => None,
        }
    }

    fn binding(&self) -> Result<&Binding, SyncError> {
        self.binding.as_ref().ok_or(SyncError::NotAssigned)
    }

    fn registered_id(&self) -> Result<ControllerId, SyncError> {
        match self.registration {
            Registration::Registered(id) => Ok(id),
            Registration::Unregistered => Err(SyncError::NotRegistered),
            Registration::Deleted(id) => Err(SyncError::Deleted(id)),
        }
    }

    /// Create the controller on the server and record its id.
    pub fn create(&mut self) -> Result<ControllerId, SyncError> {
        if let Registration::Registered(id) = self.registration {
            return Err(SyncError::AlreadyRegistered(id));
        }
        let binding = self.binding()?;
        let request = CreateRequest {
            controllers: [&self.definition],
        };
        let name = self.definition.name.clone();
        let mut payload = exchange(binding, Event::CreatePidControllers, &request, |p| {
            created_entry(p, name.as_deref()).is_some()
        })
        .map_err(|e| {
            warn!(name = ?name, error = %e, "Failed to create PID controller");
            e
        })?;

        let entry = created_entry_mut(&mut payload, name.as_deref())
            .ok_or_else(|| SyncError::Malformed("created controller vanished".to_string()))?;
        let id = entry
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| SyncError::Malformed("created controller without id".to_string()))?;
        self.registration = Registration::Registered(id);

        match entry.get_mut("pid").map(Value::take) {
            Some(pid) => match serde_json::from_value::<Pid>(pid) {
                Ok(pid) => self.definition.pid = pid,
                Err(e) => warn!(controller_id = id, error = %e, "Server returned an unreadable PID state; keeping local copy"),
            },
            None => debug!(controller_id = id, "Create reply carried no PID state"),
        }
        info!(controller_id = id, name = ?self.definition.name, "Registered PID controller");
        Ok(id)
    }

    /// Push the current local parameters and adopt the server's reply.
    pub fn synchronize(&mut self) -> Result<&Pid, SyncError> {
        self.reconcile(|_| Ok(()))
    }

    /// Move the setpoint, optionally zeroing the integral term.
    pub fn change_setpoint(&mut self, setpoint: f64, clear_integral: bool) -> Result<&Pid, SyncError> {
        self.reconcile(|pid| {
            pid.setpoint = setpoint;
            if clear_integral {
                pid.integral_term = 0.0;
            }
            Ok(())
        })
    }

    /// Let the server drive the output.
    pub fn enable(&mut self) -> Result<&Pid, SyncError> {
        self.reconcile(|pid| {
            pid.enabled = true;
            Ok(())
        })
    }

    /// Stop driving the output. Safe to repeat.
    pub fn disable(&mut self) -> Result<&Pid, SyncError> {
        self.reconcile(|pid| {
            pid.enabled = false;
            Ok(())
        })
    }

    /// Zero the integral term.
    pub fn clear_integral(&mut self) -> Result<&Pid, SyncError> {
        self.reconcile(|pid| {
            pid.integral_term = 0.0;
            Ok(())
        })
    }

    /// Apply `update` to every schedule.
    pub fn change_parameters(&mut self, update: &GainUpdate) -> Result<&Pid, SyncError> {
        self.reconcile(|pid| {
            for schedule in &mut pid.schedule {
                schedule.change_parameters(update);
            }
            Ok(())
        })
    }

    /// Apply `update` to the schedule at `index`.
    pub fn change_schedule_parameters(&mut self, index: usize, update: &GainUpdate) -> Result<&Pid, SyncError> {
        self.reconcile(|pid| {
            let len = pid.schedule.len();
            let schedule = pid
                .schedule
                .get_mut(index)
                .ok_or(SyncError::NoSuchSchedule { index, len })?;
            schedule.change_parameters(update);
            Ok(())
        })
    }

    // Edit a copy, send it, and adopt whatever the server returns.
    fn reconcile<F>(&mut self, edit: F) -> Result<&Pid, SyncError>
    where
        F: FnOnce(&mut Pid) -> Result<(), SyncError>,
    {
        let id = self.registered_id()?;
        let binding = self.binding()?;
        let mut candidate = self.definition.pid.clone();
        edit(&mut candidate)?;

        let request = UpdateRequest {
            controllers: [UpdateEntry { id, pid: &candidate }],
        };
        let updated = exchange(binding, Event::UpdatePidControllers, &request, |p| {
            controller_entry(p, id).is_some()
        })
        .and_then(|mut payload| {
            let pid = controller_entry_mut(&mut payload, id)
                .and_then(|entry| entry.get_mut("pid"))
                .map(Value::take)
                .ok_or_else(|| SyncError::Malformed("updated controller without pid".to_string()))?;
            serde_json::from_value::<Pid>(pid).map_err(|e| SyncError::Malformed(e.to_string()))
        });

        match updated {
            Ok(pid) => {
                debug!(controller_id = id, enabled = pid.enabled, setpoint = pid.setpoint, "PID controller updated");
                self.definition.pid = pid;
                Ok(&self.definition.pid)
            }
            Err(e) => {
                warn!(controller_id = id, error = %e, "PID update not confirmed; local state unchanged");
                Err(e)
            }
        }
    }

    /// Remove the controller from the server. Its id is invalid afterwards.
    pub fn delete(&mut self) -> Result<(), SyncError> {
        let id = self.registered_id()?;
        let binding = self.binding()?;
        let request = DeleteRequest { ids: [id] };
        exchange(binding, Event::DeletePidControllers, &request, |p| {
            p.get("ids")
                .and_then(Value::as_array)
                .is_some_and(|ids| ids.iter().any(|v| v.as_u64() == Some(id)))
        })
        .map_err(|e| {
            warn!(controller_id = id, error = %e, "Failed to delete PID controller");
            e
        })?;
        self.registration = Registration::Deleted(id);
        info!(controller_id = id, "Deleted PID controller");
        Ok(())
    }
}

fn exchange<P, F>(binding: &Binding, event: Event, request: &P, accept: F) -> Result<Value, SyncError>
where
    P: Serialize,
    F: FnMut(&Value) -> bool,
{
    let message = Message::new(event, request).map_err(|e| SyncError::Malformed(e.to_string()))?;
    let expected = event.reply();
    binding
        .transport
        .send_and_wait_for(&message, expected, &binding.options, accept)
        .ok_or_else(|| SyncError::NoResponse {
            event: expected.to_string(),
            attempts: binding.options.max_attempts.max(1),
        })
}

fn entries(payload: &Value) -> impl Iterator<Item = &Value> {
    payload
        .get("controllers")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn controller_entry(payload: &Value, id: ControllerId) -> Option<&Value> {
    entries(payload).find(|entry| entry.get("id").and_then(Value::as_u64) == Some(id))
}

fn controller_entry_mut(payload: &mut Value, id: ControllerId) -> Option<&mut Value> {
    payload
        .get_mut("controllers")?
        .as_array_mut()?
        .iter_mut()
        .find(|entry| entry.get("id").and_then(Value::as_u64) == Some(id))
}

// A created entry carries an id; when the reply names the controller it must be ours.
fn is_created(entry: &Value, name: Option<&str>) -> bool {
    let has_id = entry.get("id").and_then(Value::as_u64).is_some();
    let name_matches = match (entry.get("name").and_then(Value::as_str), name) {
        (Some(reported), Some(ours)) => reported == ours,
        _ => true,
    };
    has_id && name_matches
}

fn created_entry<'a>(payload: &'a Value, name: Option<&str>) -> Option<&'a Value> {
    entries(payload).find(|entry| is_created(entry, name))
}

fn created_entry_mut<'a>(payload: &'a mut Value, name: Option<&str>) -> Option<&'a mut Value> {
    payload
        .get_mut("controllers")?
        .as_array_mut()?
        .iter_mut()
        .find(|entry| is_created(entry, name))
}
