//! Handle on one attached device.
//!
//! A [`Device`] is a cheap clone of shared state: the pure
//! [`DeviceState`] from the core crate plus the channels that deliver
//! readings to subscribers. The dispatcher feeds telemetry in through
//! `route` and ends the attachment through `detach`; applications use the
//! async methods, which only hold the state lock long enough to decide what
//! to write.
//!
//! ```text
//!  dispatcher ──route()──▶ DeviceShared ──mpsc──▶ Subscription::recv()
//!                            │    ▲
//!                 oneshot ◀──┘    └── subscribe() / get() / set_mode()
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use buildhat_core::protocol::command;
use buildhat_core::protocol::event::Telemetry;
use buildhat_core::{DeviceKind, DeviceState, ModeSelection, Port, Reading};
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{HatError, Result};
use crate::hat::HatInner;

/// Delivered to a [`Subscription`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Reading(Reading),
    /// The device went away; no further readings follow
    Detached,
}

/// Ramps and pulses the board has reported finished on this port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Completions {
    pub(crate) ramps: u64,
    pub(crate) pulses: u64,
}

type Subscribers = HashMap<&'static str, Vec<(u64, mpsc::UnboundedSender<DeviceEvent>)>>;

struct Inner {
    state: DeviceState,
    subscribers: Subscribers,
    /// One-shot reads: (read id, mode index, reply)
    pending: Vec<(u64, u8, oneshot::Sender<Reading>)>,
    detached: bool,
}

pub(crate) struct DeviceShared {
    hat: Weak<HatInner>,
    port: Port,
    kind: DeviceKind,
    inner: Mutex<Inner>,
    detached: watch::Sender<bool>,
    completions: watch::Sender<Completions>,
    next_id: AtomicU64,
}

impl DeviceShared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver telemetry for this port to subscribers and pending reads.
    pub(crate) fn route(&self, telemetry: &Telemetry) {
        let mut inner = self.lock();
        if inner.detached {
            return;
        }
        if let Some((channel, reading)) = inner.state.route(telemetry) {
            if let Some(subscribers) = inner.subscribers.get_mut(channel) {
                subscribers.retain(|(_, tx)| tx.send(DeviceEvent::Reading(reading.clone())).is_ok());
            }
        }
        if inner.pending.iter().any(|(_, mode, _)| *mode == telemetry.mode) {
            let reading = inner
                .state
                .descriptor()
                .transform(telemetry.mode, &telemetry.values);
            let (ready, waiting): (Vec<_>, Vec<_>) = inner
                .pending
                .drain(..)
                .partition(|(_, mode, _)| *mode == telemetry.mode);
            inner.pending = waiting;
            for (_, _, tx) in ready {
                let _ = tx.send(reading.clone());
            }
        }
    }

    pub(crate) fn ramp_done(&self) {
        self.completions.send_modify(|c| c.ramps += 1);
    }

    pub(crate) fn pulse_done(&self) {
        self.completions.send_modify(|c| c.pulses += 1);
    }

    /// End the attachment without writing anything to the board.
    pub(crate) fn detach(&self) {
        let mut inner = self.lock();
        if inner.detached {
            return;
        }
        inner.detached = true;
        inner.state.detach();
        for (_, subscribers) in inner.subscribers.drain() {
            for (_, tx) in subscribers {
                let _ = tx.send(DeviceEvent::Detached);
            }
        }
        inner.pending.clear();
        drop(inner);
        self.detached.send_replace(true);
        log::debug!("{}: {} detached", self.port, self.kind);
    }
}

#[derive(Clone)]
pub struct Device {
    shared: Arc<DeviceShared>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("port", &self.shared.port)
            .field("kind", &self.shared.kind)
            .field("detached", &self.is_detached())
            .finish()
    }
}

impl Device {
    pub(crate) fn new(hat: Weak<HatInner>, port: Port, kind: DeviceKind) -> Device {
        let (detached, _) = watch::channel(false);
        let (completions, _) = watch::channel(Completions::default());
        Device {
            shared: Arc::new(DeviceShared {
                hat,
                port,
                kind,
                inner: Mutex::new(Inner {
                    state: DeviceState::new(port, kind),
                    subscribers: HashMap::new(),
                    pending: Vec::new(),
                    detached: false,
                }),
                detached,
                completions,
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<DeviceShared> {
        Arc::downgrade(&self.shared)
    }

    pub(crate) fn hat(&self) -> Result<Arc<HatInner>> {
        self.shared.hat.upgrade().ok_or(HatError::Shutdown)
    }

    pub fn port(&self) -> Port {
        self.shared.port
    }

    pub fn kind(&self) -> DeviceKind {
        self.shared.kind
    }

    pub fn name(&self) -> &'static str {
        self.shared.kind.name()
    }

    pub fn is_detached(&self) -> bool {
        *self.shared.detached.borrow()
    }

    pub fn selection(&self) -> ModeSelection {
        self.shared.lock().state.selection().clone()
    }

    /// Number of live subscriptions to `channel`.
    pub fn subscribers(&self, channel: &str) -> usize {
        self.shared.lock().state.subscribers(channel)
    }

    fn attached(&self) -> Result<MutexGuard<'_, Inner>> {
        let inner = self.shared.lock();
        if inner.detached {
            return Err(HatError::Detached);
        }
        Ok(inner)
    }

    /// Write one command for this device.
    pub(crate) async fn write(&self, cmd: &str) -> Result<()> {
        if self.is_detached() {
            return Err(HatError::Detached);
        }
        self.hat()?.write(cmd).await
    }

    /// Write several commands without anything else in between.
    pub(crate) async fn write_all(&self, cmds: &[String]) -> Result<()> {
        if cmds.is_empty() {
            return Ok(());
        }
        if self.is_detached() {
            return Err(HatError::Detached);
        }
        self.hat()?.write_all(cmds).await
    }

    /// Run the descriptor's attach sequence.
    pub(crate) async fn setup(&self) -> Result<()> {
        let cmds = self.attached()?.state.setup()?;
        self.write_all(&cmds).await
    }

    /// Start receiving readings from `channel`.
    ///
    /// The first subscriber of a channel selects its mode on the board.
    pub async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (channel, cmd) = {
            let mut inner = self.attached()?;
            let (channel, cmd) = inner.state.subscribe(channel)?;
            inner
                .subscribers
                .entry(channel.name)
                .or_default()
                .push((id, tx));
            (channel.name, cmd)
        };
        let subscription = Subscription {
            device: self.clone(),
            channel,
            id,
            rx,
            active: true,
        };
        if let Some(cmd) = cmd {
            self.write(&cmd).await?;
        }
        Ok(subscription)
    }

    async fn release(&self, channel: &'static str, id: u64) -> Result<()> {
        let cmd = {
            let mut inner = self.shared.lock();
            if let Some(subscribers) = inner.subscribers.get_mut(channel) {
                subscribers.retain(|(other, _)| *other != id);
            }
            if inner.detached {
                return Ok(());
            }
            inner.state.unsubscribe(channel)?
        };
        if let Some(cmd) = cmd {
            self.write(&cmd).await?;
        }
        Ok(())
    }

    /// Switch to a simple mode.
    pub async fn set_mode(&self, mode: u8) -> Result<()> {
        let cmds = self.attached()?.state.set_mode(mode);
        self.write_all(&cmds).await
    }

    /// Switch to a combi mode of `(mode, dataset)` pairs.
    pub async fn set_combi(&self, modes: &[(u8, u8)]) -> Result<()> {
        let cmds = self.attached()?.state.set_combi(modes)?;
        self.write_all(&cmds).await
    }

    /// Stream the current mode.
    pub async fn select(&self) -> Result<()> {
        let cmd = self.attached()?.state.select()?;
        self.write(&cmd).await
    }

    pub async fn deselect(&self) -> Result<()> {
        let cmd = self.attached()?.state.deselect();
        self.write(&cmd).await
    }

    /// Read the current mode once.
    pub async fn get(&self) -> Result<Reading> {
        let (tx, rx) = oneshot::channel();
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let cmd = {
            let mut inner = self.attached()?;
            let (index, cmd) = inner.state.select_once()?;
            inner.pending.push((id, index, tx));
            cmd
        };
        // Forgets the read if the write fails or the caller gives up
        let _pending = PendingRead {
            shared: &self.shared,
            id,
        };
        self.write(&cmd).await?;
        rx.await.map_err(|_| HatError::Detached)
    }

    /// Watch ramp and pulse completions reported for this port.
    pub(crate) fn completions(&self) -> watch::Receiver<Completions> {
        self.shared.completions.subscribe()
    }

    pub async fn switch_on(&self) -> Result<()> {
        self.write(&command::switch_on(self.port())).await
    }

    pub async fn switch_off(&self) -> Result<()> {
        self.write(&command::off(self.port())).await
    }

    /// Reverse polarity. Passive sensors need this to be powered.
    pub async fn reverse(&self) -> Result<()> {
        self.write(&command::sensor_power(self.port())).await
    }

    /// Send a raw `write1` payload, given as hex.
    pub async fn write1(&self, hex: &str) -> Result<()> {
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(buildhat_core::Error::InvalidArgument(format!(
                "write1 payload must be hex, got {:?}",
                hex
            ))
            .into());
        }
        self.write(&command::write1(self.port(), hex)).await
    }

    /// Show one `write1` frame: select, write, deselect, back to back.
    pub(crate) async fn write_frame(&self, hex: &str) -> Result<()> {
        let cmds = {
            let inner = self.attached()?;
            vec![
                inner.state.select()?,
                command::write1(self.port(), hex),
                inner.state.deselect(),
            ]
        };
        self.write_all(&cmds).await
    }

    /// Fail with [`HatError::WrongDevice`] unless `accept` likes the kind.
    pub(crate) fn expect_kind(
        &self,
        accept: impl FnOnce(DeviceKind) -> bool,
        wanted: &'static str,
    ) -> Result<()> {
        if !accept(self.kind()) {
            return Err(HatError::WrongDevice {
                port: self.port(),
                kind: self.kind(),
                wanted,
            });
        }
        Ok(())
    }

    /// Resolves once the device has been detached.
    pub async fn wait_detached(&self) {
        let mut rx = self.shared.detached.subscribe();
        let _ = rx.wait_for(|detached| *detached).await;
    }
}

struct PendingRead<'a> {
    shared: &'a DeviceShared,
    id: u64,
}

impl Drop for PendingRead<'_> {
    fn drop(&mut self) {
        self.shared.lock().pending.retain(|(id, _, _)| *id != self.id);
    }
}

/// Readings from one channel of a device.
///
/// Dropping a subscription releases it in the background; use
/// [`Subscription::unsubscribe`] to wait for the board to be told.
pub struct Subscription {
    device: Device,
    channel: &'static str,
    id: u64,
    rx: mpsc::UnboundedReceiver<DeviceEvent>,
    active: bool,
}

impl Subscription {
    pub fn channel(&self) -> &'static str {
        self.channel
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Next event, or `None` once the device is gone.
    pub async fn recv(&mut self) -> Option<DeviceEvent> {
        self.rx.recv().await
    }

    pub async fn next_reading(&mut self) -> Result<Reading> {
        match self.rx.recv().await {
            Some(DeviceEvent::Reading(reading)) => Ok(reading),
            Some(DeviceEvent::Detached) | None => Err(HatError::Detached),
        }
    }

    pub async fn unsubscribe(mut self) -> Result<()> {
        self.active = false;
        self.device.release(self.channel, self.id).await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let device = self.device.clone();
        let (channel, id) = (self.channel, self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = device.release(channel, id).await {
                        log::debug!("{}: releasing {} failed: {}", device.port(), channel, e);
                    }
                });
            }
            Err(_) => log::warn!(
                "{}: subscription to {} dropped outside the runtime",
                self.device.port(),
                channel
            ),
        }
    }
}
