//! Bring-up of the board: version negotiation and, when needed, a reflash.
//!
//! The decisions are made by [`BootNegotiator`]; this module performs the
//! I/O each decision calls for.

use buildhat_core::protocol::command;
use buildhat_core::{BootAction, BootNegotiator};

use crate::config::HatConfig;
use crate::error::Result;
use crate::firmware::{load_firmware, FirmwareImages};
use crate::gpio::{reset_hat, GpioPins};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Expected firmware is running
    Ready,
    /// Firmware was uploaded and the board rebooted; negotiate again
    Reflashed,
}

/// Run one round of negotiation.
///
/// When the board needs new firmware and `allow_reflash` is false the round
/// fails with `DeviceNotFound` instead.
pub async fn negotiate<P: GpioPins + ?Sized>(
    transport: &mut Transport,
    negotiator: &mut BootNegotiator,
    config: &HatConfig,
    pins: &mut P,
    allow_reflash: bool,
) -> Result<BootOutcome> {
    let timeout = config.prompt_timeout();
    transport.write_str(command::VERSION).await?;
    loop {
        let line = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, transport.next_line()).await??,
            None => transport.next_line().await?,
        };
        match negotiator.on_line(&line)? {
            BootAction::Query => {
                log::debug!(
                    "Unrecognized reply to version ({} so far): {:?}",
                    negotiator.unrecognized(),
                    line
                );
                transport.write_str(command::VERSION).await?;
            }
            BootAction::Reflash { .. } if !allow_reflash => {
                log::error!("Still no usable firmware after upload: {}", line);
                return Err(buildhat_core::Error::DeviceNotFound.into());
            }
            BootAction::Reflash { reset } => {
                log::warn!("{}, uploading firmware", line);
                let images = FirmwareImages::read(config).await?;
                if reset {
                    reset_hat(
                        pins,
                        config.reset_pin,
                        config.boot0_pin,
                        config.reset_time_unit(),
                    )
                    .await?;
                }
                load_firmware(transport, &images, config).await?;
                transport.write_str(command::REBOOT).await?;
                tokio::time::sleep(config.reboot_delay()).await;
                return Ok(BootOutcome::Reflashed);
            }
            BootAction::Ready => {
                log::info!("{}", line);
                return Ok(BootOutcome::Ready);
            }
        }
    }
}

/// Negotiate until the expected firmware runs, reflashing at most
/// `config.max_reflash` times.
pub async fn bring_up<P: GpioPins + ?Sized>(
    transport: &mut Transport,
    config: &HatConfig,
    pins: &mut P,
) -> Result<()> {
    let mut negotiator = BootNegotiator::new(config.firmware_version);
    let mut reflashed = 0;
    loop {
        let allow_reflash = reflashed < config.max_reflash;
        match negotiate(transport, &mut negotiator, config, pins, allow_reflash).await? {
            BootOutcome::Ready => return Ok(()),
            BootOutcome::Reflashed => {
                reflashed += 1;
                negotiator.reenter()?;
            }
        }
    }
}
