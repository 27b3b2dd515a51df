//! Build HAT serial protocol.
//!
//! The board speaks a half-duplex text protocol: commands are terminated by
//! `\r`, replies and unsolicited events by `\r\n`. Several commands can be
//! chained on one line with ` ; `, and most begin with `port <n>` to select
//! the connector they apply to.
//!
//! # Structure
//!
//! - [`command`] - formatting of outbound command lines
//! - [`event`] - classification of inbound lines
//!
//! All functions are pure (no I/O). The async layer writes the returned
//! strings and feeds every received line to [`event::parse_line`].
//!
//! # Example
//!
//! ```rust
//! use buildhat_core::protocol::{command, event::{self, Event}};
//! use buildhat_core::Port;
//!
//! assert_eq!(command::select(Port::B, 2), "port 1 ; select 2\r");
//!
//! match event::parse_line("P0: connected to active ID 30") {
//!     Some(Event::Connected { port, type_id, .. }) => {
//!         assert_eq!(port, Port::A);
//!         assert_eq!(type_id, 0x30);
//!     }
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

pub mod command;
pub mod event;

/// Line terminator for outbound commands
pub const COMMAND_TERMINATOR: char = '\r';

/// Baud rate of the board's UART
pub const BAUD_RATE: u32 = 115_200;

/// Start of a binary image transfer
pub const STX: u8 = 0x02;

/// End of a binary image transfer
pub const ETX: u8 = 0x03;

/// Format a float the way the board expects it.
///
/// Integral values are written without a fraction, everything else with the
/// shortest representation that round-trips.
pub(crate) fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
