//! The Build HAT controller.
//!
//! [`Hat`] owns the serial connection. Opening it negotiates firmware,
//! starts the reader task and waits for the board to report all four
//! ports; afterwards devices are obtained per port with
//! [`Hat::wait_for_device`] or one of the typed helpers.
//!
//! ```text
//!   Hat::open
//!     │ bring_up (version / reflash)
//!     │ spawn dispatcher ───────────────▶ reader task
//!     │ select none, list                   │ parse_line
//!     │ wait for 4 port reports ◀─ reported ┤ Registry::apply
//!     ▼                                     │ Device::route
//!   ready                                   ▼
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use buildhat_core::devices::matrix::CLEAR_FRAME;
use buildhat_core::protocol::command;
use buildhat_core::protocol::event::Event;
use buildhat_core::{DeviceKind, Port};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::boot::bring_up;
use crate::config::HatConfig;
use crate::device::Device;
use crate::error::{HatError, Result};
use crate::gpio::{GpioPins, SysfsGpio};
use crate::light::Light;
use crate::matrix::Matrix;
use crate::motor::{Motor, PassiveMotor};
use crate::registry::{Claimed, Registry};
use crate::sensor::DistanceSensor;
use crate::transport::{open_serial, SerialIo, Transport, Writer};

const EVENT_CAPACITY: usize = 256;

/// An occupied port, as listed by [`Hat::devices`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub port: Port,
    pub type_id: u32,
    pub name: &'static str,
}

pub(crate) struct HatInner {
    writer: tokio::sync::Mutex<Option<Writer>>,
    registry: Mutex<Registry>,
    pub(crate) events: broadcast::Sender<Event>,
    /// Bit per port that has reported its state, supported device or not
    pub(crate) reported: watch::Sender<u8>,
    /// Cancelled once the connection is gone for good
    pub(crate) closed: CancellationToken,
    shutting_down: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl HatInner {
    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Error for an operation cut short by the connection going away.
    pub(crate) fn closed_error(&self) -> HatError {
        if self.is_shutting_down() {
            HatError::Shutdown
        } else {
            HatError::TransportClosed
        }
    }

    pub(crate) async fn write(&self, cmd: &str) -> Result<()> {
        match self.writer.lock().await.as_mut() {
            Some(writer) => writer.write_str(cmd).await,
            None => Err(self.closed_error()),
        }
    }

    pub(crate) async fn write_all(&self, cmds: &[String]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or_else(|| self.closed_error())?;
        for cmd in cmds {
            writer.write_str(cmd).await?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Hat {
    inner: Arc<HatInner>,
}

impl Hat {
    /// Open the board on the serial device named in `config`.
    pub async fn open(config: &HatConfig) -> Result<Hat> {
        let serial = open_serial(config)?;
        let mut pins = SysfsGpio::new(&config.gpio_root);
        Hat::start(serial, config, &mut pins).await
    }

    /// Bring up a board reachable over `io`.
    pub async fn start<T, P>(io: T, config: &HatConfig, pins: &mut P) -> Result<Hat>
    where
        T: SerialIo + 'static,
        P: GpioPins + ?Sized,
    {
        let mut transport = Transport::new(io);
        bring_up(&mut transport, config, pins).await?;
        let (reader, writer) = transport.into_parts();

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Arc::new(HatInner {
            writer: tokio::sync::Mutex::new(Some(writer)),
            registry: Mutex::new(Registry::new()),
            events,
            reported: watch::Sender::new(0),
            closed: CancellationToken::new(),
            shutting_down: AtomicBool::new(false),
            reader: Mutex::new(None),
        });
        let task = tokio::spawn(crate::dispatcher::run(Arc::downgrade(&inner), reader));
        *inner.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        let hat = Hat { inner };
        hat.inner.write(command::SELECT_NONE).await?;
        hat.inner.write(command::LIST).await?;
        hat.scan_ports(config.port_scan_timeout()).await;
        Ok(hat)
    }

    async fn scan_ports(&self, timeout: Duration) {
        let all = (1u8 << Port::ALL.len()) - 1;
        let mut rx = self.inner.reported.subscribe();
        let scan = async {
            tokio::select! {
                _ = rx.wait_for(|reported| *reported == all) => {}
                _ = self.inner.closed.cancelled() => {}
            }
        };
        if tokio::time::timeout(timeout, scan).await.is_err() {
            log::warn!(
                "Only {} of {} ports reported within {:?}",
                self.inner.reported.borrow().count_ones(),
                Port::ALL.len(),
                timeout
            );
        }
        for (port, kind) in self.inner.registry().occupied() {
            log::info!("{}: {} ({})", port, kind, kind.type_id());
        }
    }

    /// Wait until a device is attached to `port` and set it up.
    ///
    /// Only one caller may wait on a port at a time. There is no timeout;
    /// race the future against a timer if one is needed.
    pub async fn wait_for_device(&self, port: Port) -> Result<Device> {
        let claimed = {
            let mut registry = self.inner.registry();
            if self.inner.closed.is_cancelled() {
                return Err(self.inner.closed_error());
            }
            registry.claim(port, &Arc::downgrade(&self.inner))?
        };
        let device = match claimed {
            Claimed::Present(device) => device,
            Claimed::Waiting(rx) => {
                log::debug!("{}: waiting for a device", port);
                rx.await.map_err(|_| self.inner.closed_error())?
            }
        };
        device.setup().await?;
        log::info!("{}: {} ready", port, device.name());
        Ok(device)
    }

    pub async fn motor(&self, port: Port) -> Result<Motor> {
        Motor::new(self.wait_for_device(port).await?)
    }

    pub async fn passive_motor(&self, port: Port) -> Result<PassiveMotor> {
        PassiveMotor::new(self.wait_for_device(port).await?)
    }

    pub async fn matrix(&self, port: Port) -> Result<Matrix> {
        Matrix::new(self.wait_for_device(port).await?)
    }

    pub async fn light(&self, port: Port) -> Result<Light> {
        Light::new(self.wait_for_device(port).await?)
    }

    pub async fn distance_sensor(&self, port: Port) -> Result<DistanceSensor> {
        DistanceSensor::new(self.wait_for_device(port).await?)
    }

    /// Currently occupied ports.
    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.inner
            .registry()
            .occupied()
            .into_iter()
            .map(|(port, kind)| DeviceInfo {
                port,
                type_id: kind.type_id(),
                name: kind.name(),
            })
            .collect()
    }

    /// Every classified line from the board, in arrival order.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// Ask the board for its supply voltage.
    pub async fn voltage(&self) -> Result<f64> {
        let mut rx = self.inner.events.subscribe();
        self.inner.write(command::VIN).await?;
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Ok(Event::Voltage(volts)) => return Ok(volts),
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return Err(self.inner.closed_error()),
                },
                _ = self.inner.closed.cancelled() => return Err(self.inner.closed_error()),
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shutting_down()
    }

    /// Stop every device, deselect all ports and close the connection.
    ///
    /// Pending waits fail with [`HatError::Shutdown`]. Calling this again
    /// does nothing.
    pub async fn shutdown(&self) -> Result<()> {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        log::info!("Shutting down Build HAT");
        let occupied = self.inner.registry().close();

        let writer = self.inner.writer.lock().await.take();
        let result = match writer {
            Some(mut writer) => Hat::switch_off(&mut writer, &occupied).await,
            None => Ok(()),
        };

        self.inner.closed.cancel();
        let reader = self
            .inner
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }
        result
    }

    async fn switch_off(writer: &mut Writer, occupied: &[(Port, DeviceKind)]) -> Result<()> {
        for (port, kind) in occupied {
            let cmd = match kind {
                DeviceKind::Matrix => command::write1(*port, CLEAR_FRAME),
                _ => command::shutdown(*port),
            };
            writer.write_str(&cmd).await?;
        }
        writer.write_str(command::SELECT_NONE).await?;
        writer.close().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gpio::tests::FakePins;
    use crate::testing::{Board, Script};
    use buildhat_core::Reading;

    pub(crate) async fn until_waiting(hat: &Hat, port: Port) {
        while !hat.inner.registry().has_waiter(port) {
            tokio::task::yield_now().await;
        }
    }

    pub(crate) async fn start(script: Script) -> (Hat, Board) {
        let (board, host) = Board::spawn(script);
        let hat = Hat::start(host, &HatConfig::default(), &mut FakePins::new())
            .await
            .unwrap();
        (hat, board)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_scans_ports() {
        let (hat, board) = start(
            Script::firmware()
                .with_device(Port::A, 46)
                .with_device(Port::C, 64),
        )
        .await;

        assert_eq!(
            board.received(),
            vec![
                "version",
                "port 0 ; select ; port 1 ; select ; port 2 ; select ; port 3 ; select ; echo 0",
                "list",
            ]
        );
        assert_eq!(
            hat.devices(),
            vec![
                DeviceInfo {
                    port: Port::A,
                    type_id: 46,
                    name: "LargeMotor"
                },
                DeviceInfo {
                    port: Port::C,
                    type_id: 64,
                    name: "Matrix"
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_device_still_completes_scan() {
        let config = HatConfig::default();
        let (_board, host) = Board::spawn(
            Script::firmware()
                .with_device(Port::A, 46)
                .with_device(Port::B, 0x7f),
        );
        let started = tokio::time::Instant::now();
        let hat = Hat::start(host, &config, &mut FakePins::new())
            .await
            .unwrap();

        assert!(started.elapsed() < config.port_scan_timeout());
        assert_eq!(*hat.inner.reported.borrow(), 0b1111);
        assert_eq!(
            hat.devices(),
            vec![DeviceInfo {
                port: Port::A,
                type_id: 46,
                name: "LargeMotor"
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_present_device_runs_setup() {
        let (hat, board) = start(Script::firmware().with_device(Port::B, 61)).await;

        let device = hat.wait_for_device(Port::B).await.unwrap();
        assert_eq!(device.kind(), DeviceKind::ColorSensor);
        board.wait_for("port 1 ; plimit 1 ; set -1").await;
        assert_eq!(
            board.received_after("list"),
            vec!["port 1 ; plimit 1 ; set -1"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_later_device() {
        let (hat, board) = start(Script::firmware()).await;

        let waiter = tokio::spawn({
            let hat = hat.clone();
            async move { hat.wait_for_device(Port::D).await }
        });
        until_waiting(&hat, Port::D).await;
        board.send("P3: connected to active ID 3e");

        let device = waiter.await.unwrap().unwrap();
        assert_eq!(device.kind(), DeviceKind::DistanceSensor);
        assert_eq!(device.port(), Port::D);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_waiter_fails() {
        let (hat, _board) = start(Script::firmware()).await;

        let first = tokio::spawn({
            let hat = hat.clone();
            async move { hat.wait_for_device(Port::A).await }
        });
        until_waiting(&hat, Port::A).await;
        assert!(matches!(
            hat.wait_for_device(Port::A).await,
            Err(HatError::Core(buildhat_core::Error::AlreadyWaiting(Port::A)))
        ));

        hat.shutdown().await.unwrap();
        assert!(matches!(first.await.unwrap(), Err(HatError::Shutdown)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_and_detach() {
        let (hat, board) = start(Script::firmware().with_device(Port::A, 46)).await;
        let motor = hat.wait_for_device(Port::A).await.unwrap();

        let mut first = motor.subscribe("position").await.unwrap();
        let second = motor.subscribe("position").await.unwrap();
        assert_eq!(motor.subscribers("position"), 2);
        board.send("P0C2: 90");
        assert_eq!(first.next_reading().await.unwrap(), Reading::Scalar(90.0));

        second.unsubscribe().await.unwrap();
        board.send("P0: disconnected");
        assert_eq!(first.recv().await, Some(crate::DeviceEvent::Detached));
        motor.wait_detached().await;
        assert!(matches!(motor.select().await, Err(HatError::Detached)));

        board.wait_for("port 0 ; select 2").await;
        let selects = board
            .received()
            .iter()
            .filter(|c| c.as_str() == "port 0 ; select 2")
            .count();
        assert_eq!(selects, 1);
        // A subscriber was still live at detach, which writes nothing
        assert!(!board.received().iter().any(|c| c == "port 0 ; select"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_subscription_deselects() {
        let (hat, board) = start(Script::firmware().with_device(Port::A, 46)).await;
        let motor = hat.wait_for_device(Port::A).await.unwrap();

        let subscription = motor.subscribe("speed").await.unwrap();
        drop(subscription);
        board.wait_for("port 0 ; select").await;
        assert_eq!(motor.subscribers("speed"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_read() {
        let (hat, board) = start(Script::firmware().with_device(Port::C, 62)).await;
        let sensor = hat.wait_for_device(Port::C).await.unwrap();

        let read = tokio::spawn(async move { sensor.get().await });
        board.wait_for("port 2 ; selonce 0").await;
        board.send("P2M0: 155");

        assert_eq!(
            read.await.unwrap().unwrap(),
            Reading::Vector(vec![155.0])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_voltage() {
        let (hat, _board) = start(Script::firmware()).await;
        assert_eq!(hat.voltage().await.unwrap(), 7.8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent() {
        let (hat, board) = start(
            Script::firmware()
                .with_device(Port::A, 46)
                .with_device(Port::B, 64),
        )
        .await;

        hat.shutdown().await.unwrap();
        hat.shutdown().await.unwrap();
        assert!(hat.is_shut_down());
        board.wait_closed().await;

        assert_eq!(
            board.received_after("list"),
            vec![
                "port 0 ; pwm ; coast ; off",
                "port 1 ; write1 c2000000000000000000",
                "port 0 ; select ; port 1 ; select ; port 2 ; select ; port 3 ; select ; echo 0",
            ]
        );
        assert!(matches!(
            hat.wait_for_device(Port::C).await,
            Err(HatError::Shutdown)
        ));
        assert!(matches!(hat.voltage().await, Err(HatError::Shutdown)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_loss_fails_waiters() {
        let (hat, board) = start(Script::firmware()).await;
        let waiter = tokio::spawn({
            let hat = hat.clone();
            async move { hat.wait_for_device(Port::A).await }
        });
        until_waiting(&hat, Port::A).await;

        board.close();
        assert!(matches!(
            waiter.await.unwrap(),
            Err(HatError::TransportClosed)
        ));
        assert!(matches!(
            hat.wait_for_device(Port::B).await,
            Err(HatError::TransportClosed)
        ));
    }
}
