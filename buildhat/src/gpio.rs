//! Hardware reset of the HAT's microcontroller.
//!
//! Holding BOOT0 low while pulsing RESET restarts the board into its
//! bootloader, which is the only way out of a firmware it no longer talks
//! to. Pins are driven through the [`GpioPins`] seam so the sequence can be
//! tested without hardware.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait GpioPins: Send {
    async fn set_output(&mut self, pin: u32) -> Result<()>;
    async fn write(&mut self, pin: u32, high: bool) -> Result<()>;
    async fn release(&mut self, pin: u32) -> Result<()>;
}

/// Pins driven through the kernel's sysfs GPIO interface.
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    pub fn new(root: impl Into<PathBuf>) -> SysfsGpio {
        SysfsGpio { root: root.into() }
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }
}

#[async_trait]
impl GpioPins for SysfsGpio {
    async fn set_output(&mut self, pin: u32) -> Result<()> {
        if !tokio::fs::try_exists(self.pin_dir(pin)).await? {
            tokio::fs::write(self.root.join("export"), pin.to_string()).await?;
        }
        tokio::fs::write(self.pin_dir(pin).join("direction"), "out").await?;
        Ok(())
    }

    async fn write(&mut self, pin: u32, high: bool) -> Result<()> {
        let value = if high { "1" } else { "0" };
        tokio::fs::write(self.pin_dir(pin).join("value"), value).await?;
        Ok(())
    }

    async fn release(&mut self, pin: u32) -> Result<()> {
        tokio::fs::write(self.root.join("unexport"), pin.to_string()).await?;
        Ok(())
    }
}

/// Restart the board into its bootloader.
///
/// With the default one second `unit` this takes 21 seconds.
pub async fn reset_hat<P: GpioPins + ?Sized>(
    pins: &mut P,
    reset_pin: u32,
    boot0_pin: u32,
    unit: Duration,
) -> Result<()> {
    log::info!("Resetting Build HAT (GPIO {} reset, GPIO {} boot0)", reset_pin, boot0_pin);

    pins.set_output(reset_pin).await?;
    pins.set_output(boot0_pin).await?;
    pins.write(boot0_pin, false).await?;
    pins.write(reset_pin, false).await?;
    tokio::time::sleep(unit * 10).await;
    pins.write(reset_pin, true).await?;
    tokio::time::sleep(unit * 10).await;
    pins.release(boot0_pin).await?;
    pins.release(reset_pin).await?;
    tokio::time::sleep(unit).await;

    log::debug!("Reset complete");
    Ok(())
}
