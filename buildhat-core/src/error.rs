//! Error types for protocol handling and argument validation

use thiserror::Error;

use crate::port::Port;

/// Errors raised by the pure protocol layer.
///
/// Every validation error is produced before any command is formatted, so a
/// rejected call never reaches the wire.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Argument outside the range accepted by the board
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A connect line carried a device type id with no descriptor
    #[error("Unsupported device type: {0}")]
    UnsupportedDeviceType(u32),

    /// Read or select attempted while neither a simple nor a combi mode is set
    #[error("Device is not in a simple or combi mode")]
    NotInSelectedMode,

    /// Port index outside 0..=3
    #[error("Invalid port: {0}")]
    InvalidPort(u32),

    /// A wait for a device on this port is already outstanding
    #[error("Already waiting for a device on port {0}")]
    AlreadyWaiting(Port),

    /// Boot negotiation gave up after too many unrecognized replies
    #[error("Build HAT not found")]
    DeviceNotFound,

    /// Channel name not present in the device descriptor
    #[error("Unknown channel '{channel}' for {device}")]
    UnknownChannel {
        device: &'static str,
        channel: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fail with [`Error::InvalidArgument`] unless `min <= value <= max`.
pub(crate) fn check_range(what: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_nan() || value < min || value > max {
        return Err(Error::InvalidArgument(format!(
            "{} should be {} to {}, got {}",
            what, min, max, value
        )));
    }
    Ok(())
}
