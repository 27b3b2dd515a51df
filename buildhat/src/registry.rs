//! Per-port bookkeeping shared by the dispatcher and `wait_for_device`.
//!
//! Occupancy and waiters live in a [`PortTable`]; on top of that the
//! registry remembers which device handles are bound to each port so they
//! can be detached or fed telemetry. Every method is synchronous and runs
//! under the controller's registry lock.

use std::collections::HashMap;
use std::sync::Weak;

use buildhat_core::protocol::event::Event;
use buildhat_core::{Claim, DeviceKind, Port, PortTable};
use tokio::sync::oneshot;

use crate::device::{Device, DeviceShared};
use crate::error::Result;
use crate::hat::HatInner;

pub(crate) enum Claimed {
    Present(Device),
    Waiting(oneshot::Receiver<Device>),
}

#[derive(Default)]
pub(crate) struct Registry {
    ports: PortTable<oneshot::Sender<Device>>,
    bound: HashMap<Port, Vec<Weak<DeviceShared>>>,
}

impl Registry {
    pub(crate) fn new() -> Registry {
        Registry::default()
    }

    /// Resolve `port` now, or register the caller as its waiter.
    pub(crate) fn claim(&mut self, port: Port, hat: &Weak<HatInner>) -> Result<Claimed> {
        self.ports.prune_waiters(|tx| tx.is_closed());
        let (tx, rx) = oneshot::channel();
        match self.ports.claim(port, tx)? {
            Claim::Present(kind) => Ok(Claimed::Present(self.bind(port, kind, hat))),
            Claim::Waiting => Ok(Claimed::Waiting(rx)),
        }
    }

    fn bind(&mut self, port: Port, kind: DeviceKind, hat: &Weak<HatInner>) -> Device {
        let device = Device::new(hat.clone(), port, kind);
        self.bound.entry(port).or_default().push(device.downgrade());
        device
    }

    /// Apply one classified line. Returns whether it should be published.
    pub(crate) fn apply(&mut self, event: &Event, hat: &Weak<HatInner>) -> bool {
        match event {
            Event::Connected { port, type_id, .. } => {
                self.detach(*port);
                let kind = match DeviceKind::from_type_id(*type_id) {
                    Ok(kind) => kind,
                    Err(e) => {
                        log::warn!("{}: {}", port, e);
                        self.ports.vacate(*port);
                        return false;
                    }
                };
                log::debug!("{}: {} connected", port, kind);
                if let Some(waiter) = self.ports.occupy(*port, kind) {
                    let device = self.bind(*port, kind, hat);
                    if waiter.send(device).is_err() {
                        log::debug!("{}: waiter went away", port);
                    }
                }
                true
            }
            Event::Disconnected(port) | Event::Timeout(port) | Event::NotConnected(port) => {
                if let Some(kind) = self.ports.vacate(*port) {
                    log::debug!("{}: {} gone ({:?})", port, kind, event);
                }
                self.detach(*port);
                true
            }
            Event::Telemetry(telemetry) => {
                self.each_bound(telemetry.port, |device| device.route(telemetry));
                true
            }
            Event::RampDone(port) => {
                self.each_bound(*port, DeviceShared::ramp_done);
                true
            }
            Event::PulseDone(port) => {
                self.each_bound(*port, DeviceShared::pulse_done);
                true
            }
            Event::Voltage(_) => true,
        }
    }

    /// Run `f` on every live handle bound to `port`, forgetting dropped ones.
    fn each_bound(&mut self, port: Port, f: impl Fn(&DeviceShared)) {
        if let Some(bound) = self.bound.get_mut(&port) {
            bound.retain(|device| match device.upgrade() {
                Some(device) => {
                    f(&device);
                    true
                }
                None => false,
            });
        }
    }

    /// Detach every handle bound to `port`.
    pub(crate) fn detach(&mut self, port: Port) {
        for device in self.bound.remove(&port).into_iter().flatten() {
            if let Some(device) = device.upgrade() {
                device.detach();
            }
        }
    }

    /// Fail all waiters and detach all handles. Occupancy is kept so the
    /// caller can still switch the attached devices off.
    pub(crate) fn close(&mut self) -> Vec<(Port, DeviceKind)> {
        let waiters = self.ports.drain_waiters();
        if !waiters.is_empty() {
            log::debug!("Failing {} pending waits", waiters.len());
        }
        for port in Port::ALL {
            self.detach(port);
        }
        self.ports.occupied().collect()
    }

    pub(crate) fn has_waiter(&self, port: Port) -> bool {
        self.ports.has_waiter(port)
    }

    pub(crate) fn occupied(&self) -> Vec<(Port, DeviceKind)> {
        self.ports.occupied().collect()
    }
}
