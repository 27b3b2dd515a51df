//! Light outputs: the plain light and the distance sensor's eye LEDs.

use super::Descriptor;
use crate::error::{check_range, Result};
use crate::protocol::command;

pub static LIGHT: Descriptor = Descriptor {
    name: "Light",
    channels: &[],
    setup: &[],
};

/// Validate a 0..=100 brightness.
pub fn validate_brightness(brightness: u8) -> Result<()> {
    check_range("brightness", f64::from(brightness), 0.0, 100.0)
}

/// `write1` payload lighting the four eye segments of a distance sensor.
pub fn eyes_payload(brightness: [u8; 4]) -> Result<String> {
    let mut bytes = vec![0xc5];
    for b in brightness {
        validate_brightness(b)?;
        bytes.push(b);
    }
    Ok(command::hex(&bytes))
}
