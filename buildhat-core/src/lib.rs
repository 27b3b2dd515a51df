//! # Build HAT Core
//!
//! Platform-independent protocol library for the Raspberry Pi Build HAT.
//!
//! This crate contains pure parsing, formatting and state logic with **zero
//! I/O dependencies**. The async driver in the `buildhat` crate owns the
//! serial port and GPIO pins and calls into this crate for every decision.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  buildhat-core (pure, no tokio/async deps)                  │
//! │  ├── checksum     (firmware image checksum)                 │
//! │  ├── boot         (version negotiation state machine)       │
//! │  ├── protocol/    (command formatting, line parsing)        │
//! │  ├── port         (per-port state and waiters)              │
//! │  ├── devices/     (descriptor tables, matrix encoding)      │
//! │  ├── device       (mode selection, subscriber counts)       │
//! │  └── kinematics   (motor ramps and direction choice)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!                 ┌────────────┴────────────┐
//!                 │  buildhat               │
//!                 │  (tokio, serial, GPIO)  │
//!                 └─────────────────────────┘
//! ```
//!
//! ## Key Modules
//!
//! - [`protocol`] - Wire protocol parsing and command formatting
//! - [`boot`] - Firmware/bootloader detection with bounded retries
//! - [`port`] - Port occupancy and the one-waiter-per-port rule
//! - [`devices`] - Device type ids, channels and attach sequences
//! - [`device`] - Subscription bookkeeping for one attached device
//! - [`kinematics`] - Ramp targets and durations for positional moves
//!
//! ## Example: Tracking a Port
//!
//! ```rust
//! use buildhat_core::protocol::event::{parse_line, Event};
//! use buildhat_core::{Claim, DeviceKind, Port, PortTable};
//!
//! let mut ports: PortTable<&str> = PortTable::new();
//! assert_eq!(ports.claim(Port::A, "waiter"), Ok(Claim::Waiting));
//!
//! if let Some(Event::Connected { port, type_id, .. }) = parse_line("P0: connected to active ID 41") {
//!     let kind = DeviceKind::from_type_id(type_id).unwrap();
//!     assert_eq!(kind, DeviceKind::SmallAngularMotor);
//!     assert_eq!(ports.occupy(port, kind), Some("waiter"));
//! }
//! ```

pub mod boot;
pub mod checksum;
pub mod device;
pub mod devices;
pub mod error;
pub mod kinematics;
pub mod port;
pub mod protocol;

// Re-export commonly used types
pub use boot::{BootAction, BootNegotiator, BootState};
pub use checksum::checksum;
pub use device::{DeviceState, ModeSelection};
pub use devices::{DeviceKind, Family, Reading};
pub use error::{Error, Result};
pub use kinematics::{Direction, Ramp};
pub use port::{Claim, Port, PortState, PortTable};
