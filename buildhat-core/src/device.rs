//! Generic device state.
//!
//! [`DeviceState`] holds everything about one attached device that does not
//! need I/O: the active mode selection and per-channel subscriber counts.
//! Each mutating call returns the command lines the caller must write, in
//! order. Nothing here talks to the board directly.

use std::collections::HashMap;

use crate::devices::{Channel, Descriptor, DeviceKind, Reading, SetupStep};
use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::{command, event::Telemetry};

/// Combi slot used for all combi modes
pub const COMBI_SLOT: u8 = 0;

/// Currently selected telemetry mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModeSelection {
    #[default]
    None,
    Simple(u8),
    Combi(Vec<(u8, u8)>),
}

impl ModeSelection {
    /// Mode index used by `select` and `selonce`
    pub fn index(&self) -> Result<u8> {
        match self {
            ModeSelection::None => Err(Error::NotInSelectedMode),
            ModeSelection::Simple(mode) => Ok(*mode),
            ModeSelection::Combi(_) => Ok(COMBI_SLOT),
        }
    }
}

#[derive(Debug)]
pub struct DeviceState {
    port: Port,
    kind: DeviceKind,
    descriptor: &'static Descriptor,
    selection: ModeSelection,
    subscribers: HashMap<&'static str, usize>,
}

impl DeviceState {
    pub fn new(port: Port, kind: DeviceKind) -> Self {
        DeviceState {
            port,
            kind,
            descriptor: kind.descriptor(),
            selection: ModeSelection::None,
            subscribers: HashMap::new(),
        }
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn descriptor(&self) -> &'static Descriptor {
        self.descriptor
    }

    pub fn selection(&self) -> &ModeSelection {
        &self.selection
    }

    pub fn subscribers(&self, channel: &str) -> usize {
        self.subscribers.get(channel).copied().unwrap_or(0)
    }

    /// Add a subscriber to `channel`.
    ///
    /// Only the first subscriber produces a `select` command.
    pub fn subscribe(&mut self, channel: &str) -> Result<(&'static Channel, Option<String>)> {
        let channel = self.descriptor.channel(channel)?;
        let count = self.subscribers.entry(channel.name).or_insert(0);
        *count += 1;
        let cmd = (*count == 1).then(|| command::select(self.port, channel.mode));
        Ok((channel, cmd))
    }

    /// Remove a subscriber from `channel`.
    ///
    /// Only the last subscriber produces a `deselect` command. Removing from
    /// a channel with no subscribers is a no-op.
    pub fn unsubscribe(&mut self, channel: &str) -> Result<Option<String>> {
        let channel = self.descriptor.channel(channel)?;
        match self.subscribers.get_mut(channel.name) {
            Some(count) if *count > 1 => {
                *count -= 1;
                Ok(None)
            }
            Some(_) => {
                self.subscribers.remove(channel.name);
                Ok(Some(command::deselect(self.port)))
            }
            None => Ok(None),
        }
    }

    /// Switch to a simple mode, cancelling any combi mode.
    pub fn set_mode(&mut self, mode: u8) -> Vec<String> {
        let mut cmds = Vec::new();
        if matches!(self.selection, ModeSelection::Combi(_)) {
            cmds.push(command::cancel_combi(self.port, COMBI_SLOT));
        }
        self.selection = ModeSelection::Simple(mode);
        cmds
    }

    /// Switch to a combi mode, cancelling the previous combi first.
    pub fn set_combi(&mut self, modes: &[(u8, u8)]) -> Result<Vec<String>> {
        if modes.is_empty() {
            return Err(Error::InvalidArgument(
                "combi mode needs at least one (mode, subindex) pair".into(),
            ));
        }
        let mut cmds = Vec::new();
        if matches!(self.selection, ModeSelection::Combi(_)) {
            cmds.push(command::cancel_combi(self.port, COMBI_SLOT));
        }
        cmds.push(command::combi(self.port, COMBI_SLOT, modes));
        self.selection = ModeSelection::Combi(modes.to_vec());
        Ok(cmds)
    }

    /// Commands for one step of the attach sequence.
    pub fn setup_step(&mut self, step: &SetupStep) -> Result<Vec<String>> {
        Ok(match step {
            SetupStep::SwitchOn => vec![command::switch_on(self.port)],
            SetupStep::SensorPower => vec![command::sensor_power(self.port)],
            SetupStep::Mode(mode) => self.set_mode(*mode),
            SetupStep::Combi(modes) => self.set_combi(modes)?,
            SetupStep::Plimit(limit) => vec![command::plimit(self.port, *limit)],
            SetupStep::Bias(bias) => vec![command::bias(self.port, *bias)],
        })
    }

    /// Commands for the whole attach sequence of this device.
    pub fn setup(&mut self) -> Result<Vec<String>> {
        let descriptor = self.descriptor;
        let mut cmds = Vec::new();
        for step in descriptor.setup {
            cmds.extend(self.setup_step(step)?);
        }
        Ok(cmds)
    }

    pub fn select(&self) -> Result<String> {
        Ok(command::select(self.port, self.selection.index()?))
    }

    pub fn deselect(&self) -> String {
        command::deselect(self.port)
    }

    /// Mode index to wait for and the `selonce` command requesting it.
    pub fn select_once(&self) -> Result<(u8, String)> {
        let index = self.selection.index()?;
        Ok((index, command::select_once(self.port, index)))
    }

    /// Map telemetry for this port to the channel it belongs to.
    pub fn route(&self, telemetry: &Telemetry) -> Option<(&'static str, Reading)> {
        if telemetry.port != self.port {
            return None;
        }
        let channel = self.descriptor.channel_for_mode(telemetry.mode)?;
        Some((channel.name, (channel.transform)(&telemetry.values)))
    }

    /// Forget all subscriptions without producing any command.
    pub fn detach(&mut self) {
        self.subscribers.clear();
        self.selection = ModeSelection::None;
    }
}
