//! Port identity and per-port connection state.
//!
//! The board exposes four fixed connectors. [`PortTable`] keeps, for each of
//! them, whether a device is attached and at most one pending waiter. The
//! waiter type is generic so the async layer can store its own channel
//! senders here while the occupancy rules stay in pure code.
//!
//! ```text
//!            claim()                         occupy()
//!   Empty ────────────▶ Empty + waiter ─────────────────▶ Occupied
//!     ▲                                   (waiter handed     │
//!     │                                    back to caller)   │
//!     └──────────────────────── vacate() ◀───────────────────┘
//! ```

use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::devices::DeviceKind;
use crate::error::{Error, Result};

/// One of the four physical connectors, labelled A to D on the board.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Primitive,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Port {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
}

impl Port {
    pub const ALL: [Port; 4] = [Port::A, Port::B, Port::C, Port::D];

    /// Index used on the wire (`port <n> ; ...`)
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u32) -> Result<Port> {
        Port::from_u32(index).ok_or(Error::InvalidPort(index))
    }
}

/// Connection state of a single port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PortState {
    #[default]
    Empty,
    Occupied(DeviceKind),
}

/// Outcome of [`PortTable::claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// A device is already attached; the waiter was not stored
    Present(DeviceKind),
    /// The waiter was stored and will be handed back by [`PortTable::occupy`]
    Waiting,
}

#[derive(Debug)]
struct Slot<W> {
    state: PortState,
    waiter: Option<W>,
}

impl<W> Default for Slot<W> {
    fn default() -> Self {
        Slot {
            state: PortState::Empty,
            waiter: None,
        }
    }
}

/// Authoritative state of all four ports.
#[derive(Debug)]
pub struct PortTable<W> {
    slots: [Slot<W>; 4],
}

impl<W> Default for PortTable<W> {
    fn default() -> Self {
        PortTable {
            slots: Default::default(),
        }
    }
}

impl<W> PortTable<W> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, port: Port) -> &Slot<W> {
        &self.slots[port.index() as usize]
    }

    fn slot_mut(&mut self, port: Port) -> &mut Slot<W> {
        &mut self.slots[port.index() as usize]
    }

    pub fn state(&self, port: Port) -> PortState {
        self.slot(port).state
    }

    pub fn kind(&self, port: Port) -> Option<DeviceKind> {
        match self.slot(port).state {
            PortState::Occupied(kind) => Some(kind),
            PortState::Empty => None,
        }
    }

    /// All occupied ports in port order.
    pub fn occupied(&self) -> impl Iterator<Item = (Port, DeviceKind)> + '_ {
        Port::ALL
            .into_iter()
            .filter_map(|port| self.kind(port).map(|kind| (port, kind)))
    }

    pub fn has_waiter(&self, port: Port) -> bool {
        self.slot(port).waiter.is_some()
    }

    /// Register interest in the device at `port`.
    ///
    /// Fails with [`Error::AlreadyWaiting`] when another waiter is pending,
    /// even if the port is occupied. Otherwise an occupied port reports
    /// [`Claim::Present`] and drops `waiter`.
    pub fn claim(&mut self, port: Port, waiter: W) -> Result<Claim> {
        let slot = self.slot_mut(port);
        if slot.waiter.is_some() {
            return Err(Error::AlreadyWaiting(port));
        }
        match slot.state {
            PortState::Occupied(kind) => Ok(Claim::Present(kind)),
            PortState::Empty => {
                slot.waiter = Some(waiter);
                Ok(Claim::Waiting)
            }
        }
    }

    /// Mark `port` occupied and hand back the pending waiter, if any.
    ///
    /// Both happen in one call so no other update can observe an occupied
    /// port that still has a waiter.
    pub fn occupy(&mut self, port: Port, kind: DeviceKind) -> Option<W> {
        let slot = self.slot_mut(port);
        slot.state = PortState::Occupied(kind);
        slot.waiter.take()
    }

    /// Mark `port` empty, returning what was attached before.
    pub fn vacate(&mut self, port: Port) -> Option<DeviceKind> {
        let slot = self.slot_mut(port);
        let previous = match slot.state {
            PortState::Occupied(kind) => Some(kind),
            PortState::Empty => None,
        };
        slot.state = PortState::Empty;
        previous
    }

    /// Drop waiters for which `stale` returns true.
    pub fn prune_waiters(&mut self, mut stale: impl FnMut(&W) -> bool) {
        for slot in self.slots.iter_mut() {
            if slot.waiter.as_ref().is_some_and(&mut stale) {
                slot.waiter = None;
            }
        }
    }

    /// Remove every pending waiter, e.g. on shutdown.
    pub fn drain_waiters(&mut self) -> Vec<(Port, W)> {
        Port::ALL
            .into_iter()
            .filter_map(|port| self.slot_mut(port).waiter.take().map(|w| (port, w)))
            .collect()
    }
}
