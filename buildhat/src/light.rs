use buildhat_core::devices::light::validate_brightness;
use buildhat_core::protocol::command;
use buildhat_core::Family;

use crate::device::Device;
use crate::error::Result;

/// A plain LED light on a motor port.
#[derive(Debug, Clone)]
pub struct Light {
    device: Device,
}

impl Light {
    pub fn new(device: Device) -> Result<Light> {
        device.expect_kind(|kind| kind.family() == Family::Light, "light")?;
        Ok(Light { device })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Set brightness 0 to 100; 0 switches the light off.
    pub async fn brightness(&self, brightness: u8) -> Result<()> {
        validate_brightness(brightness)?;
        self.device
            .write(&command::light(self.device.port(), brightness))
            .await
    }

    pub async fn on(&self) -> Result<()> {
        self.brightness(100).await
    }

    pub async fn off(&self) -> Result<()> {
        self.brightness(0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hat::tests::start;
    use crate::testing::Script;
    use buildhat_core::Port;

    #[tokio::test(start_paused = true)]
    async fn test_brightness_commands() {
        let (hat, board) = start(Script::firmware().with_device(Port::B, 8)).await;
        let light = hat.light(Port::B).await.unwrap();

        light.brightness(50).await.unwrap();
        light.off().await.unwrap();
        assert!(light.brightness(101).await.is_err());
        board.wait_for("port 1 ; off").await;

        let sent = board.received();
        let tail = &sent[sent.len() - 2..];
        assert_eq!(tail, ["port 1 ; on ; plimit 0.5", "port 1 ; off"]);
    }
}
