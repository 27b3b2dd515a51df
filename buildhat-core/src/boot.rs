//! Boot negotiation state machine.
//!
//! On startup the driver sends `version` and inspects the reply to decide
//! whether the board already runs the expected firmware, runs another
//! firmware, or sits in the bootloader waiting for an image.
//!
//! ```text
//!                      version
//!   ┌──────────────────────────────────────────┐
//!   ▼                                          │ unrecognized (< 5)
//! Unknown ──"Firmware version: N" (N == expected)──▶ MatchingFirmware ─▶ Ready
//!    │  ──"Firmware version: N" (N != expected)──▶ MismatchedFirmware ─▶ Reflash { reset }
//!    │  ──"BuildHAT bootloader version ..."─────▶ Bootloader ─────────▶ Reflash
//!    └──── 5th unrecognized line ──▶ DeviceNotFound
//! ```
//!
//! [`BootNegotiator`] is pure: the async layer writes the queries, performs
//! the reset and firmware upload, and feeds lines back in.

use serde::Serialize;

use crate::error::{Error, Result};

pub const FIRMWARE_BANNER: &str = "Firmware version: ";
pub const BOOTLOADER_BANNER: &str = "BuildHAT bootloader version";

/// Bootloader prompt, printed when ready for the next upload command
pub const PROMPT: &str = "BHBL>";

/// Unrecognized replies tolerated before giving up
pub const MAX_UNRECOGNIZED: u32 = 5;

/// What the board is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BootState {
    #[default]
    Unknown,
    MatchingFirmware,
    MismatchedFirmware,
    Bootloader,
}

/// Next step for the driver after a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootAction {
    /// Send `version` again and read another line
    Query,
    /// Upload firmware and reboot; `reset` pulses the reset line first
    Reflash { reset: bool },
    /// Firmware matches, start normal operation
    Ready,
}

/// Extract the version from a `Firmware version: <n>` banner.
pub fn firmware_version(line: &str) -> Option<u64> {
    let rest = line.strip_prefix(FIRMWARE_BANNER)?;
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Classify a reply to `version`.
pub fn classify(line: &str, expected_version: u64) -> BootState {
    if let Some(version) = firmware_version(line) {
        if version == expected_version {
            BootState::MatchingFirmware
        } else {
            BootState::MismatchedFirmware
        }
    } else if line.contains(BOOTLOADER_BANNER) {
        BootState::Bootloader
    } else {
        BootState::Unknown
    }
}

pub fn is_prompt(line: &str) -> bool {
    line.contains(PROMPT)
}

/// Tracks one negotiation, including re-entries after a reflash.
#[derive(Debug, Clone)]
pub struct BootNegotiator {
    expected_version: u64,
    unrecognized: u32,
    state: BootState,
}

impl BootNegotiator {
    pub fn new(expected_version: u64) -> Self {
        BootNegotiator {
            expected_version,
            unrecognized: 0,
            state: BootState::Unknown,
        }
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    pub fn unrecognized(&self) -> u32 {
        self.unrecognized
    }

    pub fn expected_version(&self) -> u64 {
        self.expected_version
    }

    /// Feed a reply to `version`.
    ///
    /// Fails with [`Error::DeviceNotFound`] on the fifth unrecognized line,
    /// so at most five queries are ever sent.
    pub fn on_line(&mut self, line: &str) -> Result<BootAction> {
        self.state = classify(line, self.expected_version);
        match self.state {
            BootState::MatchingFirmware => Ok(BootAction::Ready),
            BootState::MismatchedFirmware => Ok(BootAction::Reflash { reset: true }),
            BootState::Bootloader => Ok(BootAction::Reflash { reset: false }),
            BootState::Unknown => {
                self.count_attempt()?;
                Ok(BootAction::Query)
            }
        }
    }

    /// Start another round after a reflash.
    ///
    /// Each round counts against the same budget as unrecognized lines.
    pub fn reenter(&mut self) -> Result<()> {
        self.state = BootState::Unknown;
        self.count_attempt()
    }

    fn count_attempt(&mut self) -> Result<()> {
        self.unrecognized += 1;
        if self.unrecognized >= MAX_UNRECOGNIZED {
            return Err(Error::DeviceNotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION: u64 = 1643737936;

    #[test]
    fn test_classify_banners() {
        assert_eq!(
            classify("Firmware version: 1643737936", VERSION),
            BootState::MatchingFirmware
        );
        assert_eq!(
            classify("Firmware version: 1643737935", VERSION),
            BootState::MismatchedFirmware
        );
        assert_eq!(
            classify("BuildHAT bootloader version 1.0", VERSION),
            BootState::Bootloader
        );
        assert_eq!(classify("Firmware version: ", VERSION), BootState::Unknown);
        assert_eq!(classify("garbage", VERSION), BootState::Unknown);
    }

    #[test]
    fn test_version_must_lead_the_line() {
        assert_eq!(firmware_version("x Firmware version: 12"), None);
        assert_eq!(firmware_version("Firmware version: 12 extra"), Some(12));
    }

    #[test]
    fn test_prompt() {
        assert!(is_prompt("BHBL>"));
        assert!(is_prompt("  BHBL> "));
        assert!(!is_prompt("BHBL"));
    }

    #[test]
    fn test_fifth_unrecognized_line_fails() {
        let mut n = BootNegotiator::new(VERSION);
        for _ in 0..4 {
            assert_eq!(n.on_line("noise"), Ok(BootAction::Query));
        }
        assert_eq!(n.on_line("noise"), Err(Error::DeviceNotFound));
        assert_eq!(n.unrecognized(), 5);
    }

    #[test]
    fn test_mismatch_requests_reset_and_reflash() {
        let mut n = BootNegotiator::new(VERSION);
        assert_eq!(
            n.on_line("Firmware version: 1"),
            Ok(BootAction::Reflash { reset: true })
        );
        assert_eq!(n.state(), BootState::MismatchedFirmware);
    }

    #[test]
    fn test_bootloader_reflashes_without_reset() {
        let mut n = BootNegotiator::new(VERSION);
        assert_eq!(
            n.on_line("BuildHAT bootloader version 1.0"),
            Ok(BootAction::Reflash { reset: false })
        );
    }

    #[test]
    fn test_reentry_shares_the_budget() {
        let mut n = BootNegotiator::new(VERSION);
        n.on_line("noise").unwrap();
        n.on_line("noise").unwrap();
        n.on_line("Firmware version: 1").unwrap();
        n.reenter().unwrap();
        assert_eq!(n.state(), BootState::Unknown);
        assert_eq!(n.on_line("noise"), Ok(BootAction::Query));
        assert_eq!(n.on_line("noise"), Err(Error::DeviceNotFound));
    }

    #[test]
    fn test_matching_is_ready() {
        let mut n = BootNegotiator::new(VERSION);
        n.on_line("noise").unwrap();
        assert_eq!(
            n.on_line("Firmware version: 1643737936"),
            Ok(BootAction::Ready)
        );
    }
}
