//! Build HAT command formatting
//!
//! Pure functions for building command lines. Every function returns the
//! complete line including the trailing `\r`, ready to write to the UART.

use std::fmt::Write;

use super::number;
use crate::kinematics::Ramp;
use crate::port::Port;

// =============================================================================
// Board commands
// =============================================================================

/// Ask for the firmware or bootloader banner
pub const VERSION: &str = "version\r";

/// Ask the firmware to report every port's connection state
pub const LIST: &str = "list\r";

/// Request a supply voltage report
pub const VIN: &str = "vin\r";

/// Restart the board
pub const REBOOT: &str = "reboot\r";

/// Clear the bootloader's image buffer
pub const CLEAR: &str = "clear\r";

/// Stop telemetry on all four ports
pub const SELECT_NONE: &str =
    "port 0 ; select ; port 1 ; select ; port 2 ; select ; port 3 ; select ; echo 0\r";

/// Announce a firmware image of `len` bytes with its checksum
pub fn load(len: usize, checksum: u32) -> String {
    format!("load {} {}\r", len, checksum)
}

/// Announce a signature image of `len` bytes
pub fn signature(len: usize) -> String {
    format!("signature {}\r", len)
}

// =============================================================================
// Mode selection
// =============================================================================

/// Start streaming `mode` on `port`
pub fn select(port: Port, mode: u8) -> String {
    format!("port {} ; select {}\r", port.index(), mode)
}

/// Stop streaming on `port`
pub fn deselect(port: Port) -> String {
    format!("port {} ; select\r", port.index())
}

/// Request a single reading of `mode`
pub fn select_once(port: Port, mode: u8) -> String {
    format!("port {} ; selonce {}\r", port.index(), mode)
}

/// Define combi `slot` as the given (mode, subindex) pairs
pub fn combi(port: Port, slot: u8, modes: &[(u8, u8)]) -> String {
    let mut cmd = format!("port {} ; combi {}", port.index(), slot);
    for (mode, subindex) in modes {
        let _ = write!(cmd, " {} {}", mode, subindex);
    }
    cmd.push('\r');
    cmd
}

/// Remove the definition of combi `slot`
pub fn cancel_combi(port: Port, slot: u8) -> String {
    format!("port {} ; combi {}\r", port.index(), slot)
}

// =============================================================================
// Power and drive
// =============================================================================

/// Power the device with full current limit
pub fn switch_on(port: Port) -> String {
    format!("port {} ; plimit 1 ; on\r", port.index())
}

/// Power sensors that take their supply from the motor pins
pub fn sensor_power(port: Port) -> String {
    format!("port {} ; plimit 1 ; set -1\r", port.index())
}

pub fn off(port: Port) -> String {
    format!("port {} ; off\r", port.index())
}

pub fn coast(port: Port) -> String {
    format!("port {} ; coast\r", port.index())
}

pub fn plimit(port: Port, limit: f64) -> String {
    format!("port {} ; plimit {}\r", port.index(), number(limit))
}

pub fn bias(port: Port, bias: f64) -> String {
    format!("port {} ; bias {}\r", port.index(), number(bias))
}

/// Open-loop drive, `value` in -1..=1
pub fn pwm(port: Port, value: f64) -> String {
    format!("port {} ; pwm ; set {}\r", port.index(), number(value))
}

/// Closed-loop speed set point
pub fn set_speed(port: Port, speed: f64) -> String {
    format!("port {} ; set {}\r", port.index(), number(speed))
}

/// Positional ramp using the position PID on combi slot 0
pub fn ramp(port: Port, ramp: &Ramp) -> String {
    format!(
        "port {p} ; select 0 ; selrate 100 ; pid {p} 0 1 s4 0.0027777778 0 5 0 .1 3 ; set ramp {} {} {} 0\r",
        ramp.from,
        ramp.to,
        ramp.duration,
        p = port.index()
    )
}

/// Run at `speed` for `seconds`
pub fn pulse(port: Port, speed: f64, seconds: f64) -> String {
    format!(
        "port {} ; set pulse {} 0.0 {} 0\r",
        port.index(),
        number(speed),
        number(seconds)
    )
}

/// Stop drive and power on shutdown
pub fn shutdown(port: Port) -> String {
    format!("port {} ; pwm ; coast ; off\r", port.index())
}

/// Light output: 0 switches off, anything else sets the current limit
pub fn light(port: Port, brightness: u8) -> String {
    if brightness == 0 {
        off(port)
    } else {
        format!(
            "port {} ; on ; plimit {}\r",
            port.index(),
            number(f64::from(brightness) / 100.0)
        )
    }
}

// =============================================================================
// Raw payloads
// =============================================================================

/// Write a raw payload given as a hex string
pub fn write1(port: Port, hex: &str) -> String {
    format!("port {} ; write1 {}\r", port.index(), hex)
}

/// Hex-encode payload bytes, two digits per byte
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}
