//! # Build HAT
//!
//! Async driver for the Raspberry Pi Build HAT, the serial-attached board
//! that runs LEGO motors, sensors and lights on four ports.
//!
//! ## Architecture
//!
//! The driver is built on top of [`buildhat_core`] for all parsing and
//! state decisions, with [`tokio`] providing the runtime and
//! [`tokio_serial`] the UART.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        buildhat                          │
//! │  ┌────────────┐  ┌────────────┐  ┌─────────────────────┐ │
//! │  │ Motor      │  │ Matrix     │  │ Light, Distance...  │ │
//! │  └─────┬──────┘  └─────┬──────┘  └──────────┬──────────┘ │
//! │        └───────────────┼────────────────────┘            │
//! │                        ▼                                 │
//! │  ┌──────────────────────────────────────────────────────┐│
//! │  │  Hat (Arc<HatInner>)                                 ││
//! │  │  - Registry: port occupancy, waiters, bound devices  ││
//! │  │  - write half behind an async mutex                  ││
//! │  │  - event broadcast                                   ││
//! │  └──────────────────────────────────────────────────────┘│
//! │        ▲                         │                       │
//! │        │ dispatcher task         ▼ commands              │
//! │  ┌──────────────────────────────────────────────────────┐│
//! │  │  Transport (BoardCodec lines / raw writes)           ││
//! │  │  boot: version check, GPIO reset, firmware upload    ││
//! │  └──────────────────────────────────────────────────────┘│
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use buildhat::{Hat, HatConfig, Port};
//!
//! # async fn run() -> buildhat::Result<()> {
//! let hat = Hat::open(&HatConfig::default()).await?;
//! let motor = hat.motor(Port::A).await?;
//! motor.run_for_degrees(360.0, 50.0).await?.wait().await?;
//! hat.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use buildhat_core::devices::matrix::Color;
use clap::{Parser, Subcommand};

pub mod boot;
pub mod config;
pub mod device;
pub(crate) mod dispatcher;
pub mod error;
pub mod firmware;
pub mod gpio;
pub mod hat;
pub mod light;
pub mod matrix;
pub mod motor;
pub(crate) mod registry;
pub mod sensor;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use buildhat_core::protocol::event::Event;
pub use buildhat_core::{DeviceKind, Direction, Family, ModeSelection, Port, Reading};
pub use config::HatConfig;
pub use device::{Device, DeviceEvent, Subscription};
pub use error::{HatError, Result};
pub use hat::{DeviceInfo, Hat};
pub use light::Light;
pub use matrix::Matrix;
pub use motor::{Motion, Motor, PassiveMotor};
pub use sensor::DistanceSensor;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Configuration file (JSON); defaults to config.json in the config directory
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial device, overriding the configuration
    #[arg(short, long)]
    pub device: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// List the devices attached to each port
    List {
        /// Print as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print every event from the board until interrupted
    Monitor,
    /// Print the supply voltage
    Voltage,
    /// Drive the motor on a port
    Motor {
        port: Port,
        #[command(subcommand)]
        action: MotorAction,
    },
    /// Control the light matrix on a port
    Matrix {
        port: Port,
        #[command(subcommand)]
        action: MatrixAction,
    },
    /// Pulse the reset line, leaving the board in its bootloader
    Reset,
}

#[derive(Subcommand, Clone, Debug)]
pub enum MotorAction {
    /// Turn by a number of degrees
    Degrees {
        #[arg(allow_negative_numbers = true)]
        degrees: f64,
        #[arg(short, long, default_value_t = 20.0, allow_negative_numbers = true)]
        speed: f64,
    },
    /// Turn by a number of rotations
    Rotations {
        #[arg(allow_negative_numbers = true)]
        rotations: f64,
        #[arg(short, long, default_value_t = 20.0, allow_negative_numbers = true)]
        speed: f64,
    },
    /// Turn to an absolute angle, -180 to 180
    Position {
        #[arg(allow_negative_numbers = true)]
        degrees: f64,
        #[arg(short, long, default_value_t = 20.0)]
        speed: f64,
        /// shortest, clockwise or anticlockwise
        #[arg(long, default_value_t = Direction::Shortest)]
        direction: Direction,
    },
    /// Run for a number of seconds
    Seconds {
        seconds: f64,
        #[arg(short, long, default_value_t = 20.0)]
        speed: f64,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum MatrixAction {
    /// Fill the matrix with one color
    Clear {
        #[arg(default_value_t = Color::Black)]
        color: Color,
        /// 0 to 10
        #[arg(short, long, default_value_t = 10)]
        brightness: u8,
    },
    /// Show a bar graph level, 0 to 9
    Level { level: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_motor_command() {
        let cli = Cli::parse_from([
            "buildhat",
            "-d",
            "/dev/ttyAMA0",
            "motor",
            "b",
            "position",
            "-90",
            "--direction",
            "anticlockwise",
        ]);
        assert_eq!(cli.device.as_deref(), Some("/dev/ttyAMA0"));
        match cli.command {
            Command::Motor {
                port,
                action:
                    MotorAction::Position {
                        degrees,
                        speed,
                        direction,
                    },
            } => {
                assert_eq!(port, Port::B);
                assert_eq!(degrees, -90.0);
                assert_eq!(speed, 20.0);
                assert_eq!(direction, Direction::Anticlockwise);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_matrix_clear() {
        let cli = Cli::parse_from(["buildhat", "matrix", "C", "clear", "red", "-b", "5"]);
        assert!(matches!(
            cli.command,
            Command::Matrix {
                port: Port::C,
                action: MatrixAction::Clear {
                    color: Color::Red,
                    brightness: 5
                }
            }
        ));
    }

    #[test]
    fn test_cli_asserts() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
