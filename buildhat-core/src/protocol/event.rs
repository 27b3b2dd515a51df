//! Inbound line classification.
//!
//! Lines are tested in a fixed priority order:
//!
//! 1. `P<n>: ...` port status (connect, disconnect, timeout, not detected,
//!    ramp done, pulse done)
//! 2. `P<n>C<mode>` / `P<n>M<mode>` telemetry followed by numbers
//! 3. `<float> V` supply voltage
//!
//! Anything else yields `None`. New firmware messages must never break the
//! driver, so unknown lines are not errors.

use serde::Serialize;

use crate::port::Port;

/// How the attached device identified itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Link {
    Active,
    Passive,
}

/// Telemetry channel marker following the port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TelemetryKind {
    /// `C`: combi or continuous data
    Continuous,
    /// `M`: single mode data
    Mode,
}

/// One telemetry report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Telemetry {
    pub port: Port,
    pub kind: TelemetryKind,
    pub mode: u8,
    pub values: Vec<f64>,
}

/// A classified inbound line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event {
    Connected {
        port: Port,
        link: Link,
        type_id: u32,
    },
    Disconnected(Port),
    /// The device stopped answering and the board dropped it
    Timeout(Port),
    /// Port probed with nothing attached
    NotConnected(Port),
    RampDone(Port),
    PulseDone(Port),
    Telemetry(Telemetry),
    Voltage(f64),
}

impl Event {
    /// Port this event refers to, if any
    pub fn port(&self) -> Option<Port> {
        match self {
            Event::Connected { port, .. }
            | Event::Disconnected(port)
            | Event::Timeout(port)
            | Event::NotConnected(port)
            | Event::RampDone(port)
            | Event::PulseDone(port) => Some(*port),
            Event::Telemetry(t) => Some(t.port),
            Event::Voltage(_) => None,
        }
    }

    /// True for the events that end a device's attachment
    pub fn is_detach(&self) -> bool {
        matches!(
            self,
            Event::Disconnected(_) | Event::Timeout(_) | Event::NotConnected(_)
        )
    }
}

/// Classify one line received from the board.
pub fn parse_line(line: &str) -> Option<Event> {
    let line = line.trim_end();
    let bytes = line.as_bytes();

    if bytes.len() >= 3 && bytes[0] == b'P' {
        match bytes[2] {
            b':' => return parse_port_status(line),
            b'C' | b'M' => return parse_telemetry(line),
            _ => {}
        }
    }

    parse_voltage(line)
}

fn port_at(line: &str) -> Option<Port> {
    let digit = line.as_bytes().get(1)?;
    if !digit.is_ascii_digit() {
        return None;
    }
    Port::from_index(u32::from(digit - b'0')).ok()
}

fn parse_port_status(line: &str) -> Option<Event> {
    let port = port_at(line)?;

    if let Some(event) = parse_connected(port, line) {
        return Some(event);
    }
    if line.contains(": disconnected") {
        return Some(Event::Disconnected(port));
    }
    if line.contains(": timeout during data phase: disconnecting") {
        return Some(Event::Timeout(port));
    }
    if line.contains(": no device detected") {
        return Some(Event::NotConnected(port));
    }
    if line.contains(": ramp done") {
        return Some(Event::RampDone(port));
    }
    if line.contains(": pulse done") {
        return Some(Event::PulseDone(port));
    }
    None
}

fn parse_connected(port: Port, line: &str) -> Option<Event> {
    let (_, rest) = line.split_once("connected to ")?;
    let (link, rest) = if let Some(rest) = rest.strip_prefix("active ") {
        (Link::Active, rest)
    } else if let Some(rest) = rest.strip_prefix("passive ") {
        (Link::Passive, rest)
    } else {
        return None;
    };
    let rest = rest.strip_prefix("ID ")?;
    let end = rest
        .find(|c: char| !c.is_ascii_hexdigit())
        .unwrap_or(rest.len());
    let type_id = u32::from_str_radix(&rest[..end], 16).ok()?;
    Some(Event::Connected {
        port,
        link,
        type_id,
    })
}

fn parse_telemetry(line: &str) -> Option<Event> {
    let port = port_at(line)?;
    let kind = match line.as_bytes()[2] {
        b'C' => TelemetryKind::Continuous,
        _ => TelemetryKind::Mode,
    };

    let rest = &line[3..];
    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let mode = rest[..digits].parse::<u8>().ok()?;
    let rest = &rest[digits..];
    let rest = rest.strip_prefix(':').unwrap_or(rest);

    let values = rest
        .split_whitespace()
        .map(|v| v.parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()?;

    Some(Event::Telemetry(Telemetry {
        port,
        kind,
        mode,
        values,
    }))
}

fn parse_voltage(line: &str) -> Option<Event> {
    let end = line
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(line.len());
    if end == 0 || !line[end..].starts_with(" V") {
        return None;
    }
    line[..end].parse::<f64>().ok().map(Event::Voltage)
}
