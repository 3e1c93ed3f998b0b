//! Per-channel command model.
//!
//! A [`Command`] converts itself into the ordered tuple of primitives a device worker
//! expects. A [`CommandArray`] holds one optional command per channel; empty slots are
//! sent as `null` and leave that channel untouched.

use serde_json::Value;

use crate::error::{AqError, AqResult};

/// A typed instruction for one channel of a device.
pub trait Command {
    /// Wire form: a JSON scalar or an array of primitives in the order the device expects.
    fn to_command(&self) -> Value;
}

impl<C: Command + ?Sized> Command for &C {
    fn to_command(&self) -> Value {
        (**self).to_command()
    }
}

/// Fixed-size, index-addressed set of optional commands, one slot per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandArray<C> {
    slots: Vec<Option<C>>,
}

impl<C> CommandArray<C> {
    /// Create an array of `len` empty slots
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(len).collect(),
        }
    }

    /// Create an array with every slot filled by `make`
    pub fn filled(len: usize, mut make: impl FnMut(usize) -> C) -> Self {
        Self {
            slots: (0..len).map(|i| Some(make(i))).collect(),
        }
    }

    /// Number of slots (the device's channel count)
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the array has no slots
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Command in slot `index`, if any
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&C> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Place `command` in slot `index`.
    ///
    /// # Errors
    ///
    /// `CommandIndexOutOfRange` if `index >= len()`; the array is left unmodified.
    pub fn set(&mut self, index: usize, command: C) -> AqResult<()> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(AqError::CommandIndexOutOfRange { index, len })?;
        *slot = Some(command);
        Ok(())
    }

    /// Empty slot `index`, returning what it held
    pub fn clear(&mut self, index: usize) -> Option<C> {
        self.slots.get_mut(index).and_then(Option::take)
    }
}

impl<C: Command> CommandArray<C> {
    /// Wire form of every slot, `null` for empty ones
    #[must_use]
    pub fn to_wire(&self) -> Vec<Value> {
        self.slots
            .iter()
            .map(|slot| slot.as_ref().map_or(Value::Null, Command::to_command))
            .collect()
    }
}
