use buildhat_core::{DeviceKind, Port};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HatError {
    #[error("I/O operation failed")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Core(#[from] buildhat_core::Error),
    #[error("Device has been detached")]
    Detached,
    #[error("Port {port} holds a {kind}, not a {wanted}")]
    WrongDevice {
        port: Port,
        kind: DeviceKind,
        wanted: &'static str,
    },
    #[error("Timeout")]
    Timeout,
    #[error("Shutdown")]
    Shutdown,
    #[error("Serial connection to the Build HAT closed")]
    TransportClosed,
    #[error("Cannot open serial device '{0}'")]
    Serial(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Unexpected reading: {0}")]
    UnexpectedReading(String),
    #[error("JSON encoding failed")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HatError>;

impl From<tokio::time::error::Elapsed> for HatError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        HatError::Timeout
    }
}
