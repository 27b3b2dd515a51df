//! Scripted stand-in for the Build HAT, talking over `tokio::io::duplex`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use buildhat_core::protocol::STX;
use buildhat_core::Port;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, Notify};

use crate::config::FIRMWARE_VERSION;

/// How the fake board answers commands.
#[derive(Debug, Clone)]
pub(crate) struct Script {
    /// Version of the running firmware, `None` while in the bootloader
    pub(crate) running: Option<u64>,
    /// Number of `version` queries answered with noise before the banner
    pub(crate) noise: usize,
    /// Type ids reported by `list`
    pub(crate) ports: [Option<u32>; 4],
    pub(crate) silent: bool,
}

impl Script {
    pub(crate) fn firmware() -> Script {
        Script {
            running: Some(FIRMWARE_VERSION),
            noise: 0,
            ports: [None; 4],
            silent: false,
        }
    }

    pub(crate) fn bootloader() -> Script {
        Script {
            running: None,
            ..Script::firmware()
        }
    }

    pub(crate) fn silent() -> Script {
        Script {
            silent: true,
            ..Script::firmware()
        }
    }

    pub(crate) fn with_device(mut self, port: Port, type_id: u32) -> Script {
        self.ports[port.index() as usize] = Some(type_id);
        self
    }

    fn reply(&mut self, cmd: &str) -> Vec<String> {
        if self.silent {
            return Vec::new();
        }
        match cmd {
            "version" if self.noise > 0 => {
                self.noise -= 1;
                vec!["\u{fffd}\u{fffd}garbage".to_string()]
            }
            "version" => match self.running {
                Some(version) => vec![format!(
                    "Firmware version: {} 2022-02-01T17:52:16+00:00",
                    version
                )],
                None => vec!["BuildHAT bootloader version 1.0 2021-08-13T12:39:12+00:00".to_string()],
            },
            "clear" if self.running.is_none() => vec!["BHBL>".to_string()],
            "reboot" => {
                self.running = Some(FIRMWARE_VERSION);
                Vec::new()
            }
            "list" => self
                .ports
                .iter()
                .enumerate()
                .map(|(i, id)| match id {
                    Some(id) if *id < 16 => format!("P{}: connected to passive ID {:x}", i, id),
                    Some(id) => format!("P{}: connected to active ID {:x}", i, id),
                    None => format!("P{}: no device detected", i),
                })
                .collect(),
            "vin" => vec!["7.8 V".to_string()],
            _ if cmd.as_bytes().first() == Some(&STX) && self.running.is_none() => {
                vec!["BHBL>".to_string()]
            }
            _ => Vec::new(),
        }
    }
}

enum Control {
    Line(String),
    /// Restart into the bootloader, as a pulse on the reset line does
    Bootloader,
    /// Drop the connection
    Close,
}

/// Handle on a running fake board.
#[derive(Clone)]
pub(crate) struct Board {
    received: Arc<Mutex<Vec<String>>>,
    notify: Arc<Notify>,
    closed: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Control>,
}

impl Board {
    /// Start the board; the returned stream is the host end of the UART.
    pub(crate) fn spawn(script: Script) -> (Board, DuplexStream) {
        let (io, host) = tokio::io::duplex(4096);
        let (tx, rx) = mpsc::unbounded_channel();
        let board = Board {
            received: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
            closed: Arc::new(AtomicBool::new(false)),
            tx,
        };
        tokio::spawn(run(
            io,
            script,
            board.received.clone(),
            board.notify.clone(),
            board.closed.clone(),
            rx,
        ));
        (board, host)
    }

    /// Commands received so far, without their `\r`.
    pub(crate) fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Commands received since the first one starting with `marker`.
    pub(crate) fn received_after(&self, marker: &str) -> Vec<String> {
        self.received()
            .into_iter()
            .skip_while(|c| !c.starts_with(marker))
            .skip(1)
            .collect()
    }

    /// Push an unsolicited line to the host.
    pub(crate) fn send(&self, line: &str) {
        self.tx.send(Control::Line(line.to_string())).unwrap();
    }

    /// Callback for fake GPIO pins that drops the board into its bootloader.
    pub(crate) fn reset_hook(&self) -> Box<dyn FnMut() + Send> {
        let tx = self.tx.clone();
        Box::new(move || {
            let _ = tx.send(Control::Bootloader);
        })
    }

    /// Wait until a command equal to `cmd` has been received.
    pub(crate) async fn wait_for(&self, cmd: &str) {
        loop {
            let notified = self.notify.notified();
            if self.received.lock().unwrap().iter().any(|c| c == cmd) {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn close(&self) {
        self.tx.send(Control::Close).unwrap();
    }

    /// Wait until the host closed its end, or the board dropped it.
    pub(crate) async fn wait_closed(&self) {
        loop {
            let notified = self.notify.notified();
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

async fn run(
    mut io: DuplexStream,
    mut script: Script,
    received: Arc<Mutex<Vec<String>>>,
    notify: Arc<Notify>,
    closed: Arc<AtomicBool>,
    mut rx: mpsc::UnboundedReceiver<Control>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        tokio::select! {
            n = io.read(&mut chunk) => {
                let n = match n {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                buf.extend_from_slice(&chunk[..n]);
                while let Some(end) = buf.iter().position(|b| *b == b'\r') {
                    let cmd: Vec<u8> = buf.drain(..=end).collect();
                    let cmd = String::from_utf8_lossy(&cmd[..end]).into_owned();
                    let replies = script.reply(&cmd);
                    received.lock().unwrap().push(cmd);
                    notify.notify_waiters();
                    for reply in replies {
                        if io.write_all(format!("{}\r\n", reply).as_bytes()).await.is_err() {
                            break;
                        }
                    }
                }
            }
            Some(control) = rx.recv() => match control {
                Control::Line(line) => {
                    if io.write_all(format!("{}\r\n", line).as_bytes()).await.is_err() {
                        break;
                    }
                }
                Control::Bootloader => script.running = None,
                Control::Close => break,
            }
        }
    }
    closed.store(true, Ordering::SeqCst);
    notify.notify_waiters();
}
