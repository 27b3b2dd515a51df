//! Firmware upload through the bootloader.
//!
//! ```text
//! host                                  bootloader
//!  │ clear\r                               │
//!  │◀──────────────────────────── BHBL>    │
//!  │ load <len> <checksum>\r               │
//!  │ (pause) STX <image> ETX \r            │
//!  │◀──────────────────────────── BHBL>    │
//!  │ signature <len>\r                     │
//!  │ (pause) STX <signature> ETX \r        │
//!  │◀──────────────────────────── BHBL>    │
//! ```

use std::time::Duration;

use buildhat_core::boot::is_prompt;
use buildhat_core::protocol::{command, ETX, STX};

use crate::config::HatConfig;
use crate::error::{HatError, Result};
use crate::transport::Transport;

/// Firmware and signature images, read from disk before the upload starts.
#[derive(Debug, Clone)]
pub struct FirmwareImages {
    pub firmware: Vec<u8>,
    pub signature: Vec<u8>,
}

impl FirmwareImages {
    pub async fn read(config: &HatConfig) -> Result<FirmwareImages> {
        let firmware = tokio::fs::read(&config.firmware).await.map_err(|e| {
            HatError::Config(format!("cannot read firmware {}: {}", config.firmware.display(), e))
        })?;
        let signature = tokio::fs::read(&config.signature).await.map_err(|e| {
            HatError::Config(format!(
                "cannot read signature {}: {}",
                config.signature.display(),
                e
            ))
        })?;
        Ok(FirmwareImages {
            firmware,
            signature,
        })
    }
}

/// Wait until the bootloader prints its prompt, discarding everything else.
pub async fn wait_for_prompt(transport: &mut Transport, timeout: Option<Duration>) -> Result<()> {
    let wait = async {
        while !is_prompt(&transport.next_line().await?) {}
        Ok::<(), HatError>(())
    };
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, wait).await?,
        None => wait.await,
    }
}

async fn send_framed(
    transport: &mut Transport,
    bytes: &[u8],
    label: &str,
    pause: Duration,
) -> Result<()> {
    tokio::time::sleep(pause).await;
    transport.writer.write_bytes(&[STX], "STX").await?;
    transport.writer.write_bytes(bytes, label).await?;
    transport.writer.write_bytes(&[ETX], "ETX").await?;
    transport.write_str("\r").await
}

/// Upload `images` to a board sitting in its bootloader.
pub async fn load_firmware(
    transport: &mut Transport,
    images: &FirmwareImages,
    config: &HatConfig,
) -> Result<()> {
    let timeout = config.prompt_timeout();
    let pause = config.binary_mode_delay();

    log::info!("Uploading firmware ({} bytes)", images.firmware.len());
    transport.write_str(command::CLEAR).await?;
    wait_for_prompt(transport, timeout).await?;

    let sum = buildhat_core::checksum(&images.firmware);
    transport
        .write_str(&command::load(images.firmware.len(), sum))
        .await?;
    send_framed(transport, &images.firmware, "--firmware file--", pause).await?;
    wait_for_prompt(transport, timeout).await?;

    transport
        .write_str(&command::signature(images.signature.len()))
        .await?;
    send_framed(transport, &images.signature, "--signature file--", pause).await?;
    wait_for_prompt(transport, timeout).await?;

    log::info!("Firmware upload complete");
    Ok(())
}
