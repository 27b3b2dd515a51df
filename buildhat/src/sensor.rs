//! Sensors with behaviour beyond plain subscriptions.
//!
//! Every sensor can be read through [`Device::subscribe`] and
//! [`Device::get`]; this module only adds the distance sensor's eye LEDs and
//! a typed distance read.

use buildhat_core::devices::light::eyes_payload;
use buildhat_core::DeviceKind;

use crate::device::Device;
use crate::error::{HatError, Result};

#[derive(Debug, Clone)]
pub struct DistanceSensor {
    device: Device,
}

impl DistanceSensor {
    pub fn new(device: Device) -> Result<DistanceSensor> {
        device.expect_kind(|kind| kind == DeviceKind::DistanceSensor, "distance sensor")?;
        Ok(DistanceSensor { device })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Light the four eye segments, each 0 to 100.
    pub async fn eyes(&self, brightness: [u8; 4]) -> Result<()> {
        let payload = eyes_payload(brightness)?;
        self.device.write1(&payload).await
    }

    /// Distance in millimetres; -1 when nothing is in range.
    pub async fn distance(&self) -> Result<f64> {
        let reading = self.device.get().await?;
        reading
            .values()
            .first()
            .copied()
            .ok_or_else(|| HatError::UnexpectedReading(reading.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hat::tests::start;
    use crate::testing::Script;
    use buildhat_core::Port;

    #[tokio::test(start_paused = true)]
    async fn test_eyes_and_distance() {
        let (hat, board) = start(Script::firmware().with_device(Port::C, 62)).await;
        let sensor = hat.distance_sensor(Port::C).await.unwrap();

        sensor.eyes([100, 0, 100, 0]).await.unwrap();
        board.wait_for("port 2 ; write1 c564006400").await;
        assert!(sensor.eyes([0, 0, 0, 101]).await.is_err());

        let read = tokio::spawn({
            let sensor = sensor.clone();
            async move { sensor.distance().await }
        });
        board.wait_for("port 2 ; selonce 0").await;
        board.send("P2M0: 240");
        assert_eq!(read.await.unwrap().unwrap(), 240.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_other_sensors() {
        let (hat, _board) = start(Script::firmware().with_device(Port::A, 61)).await;
        assert!(matches!(
            hat.distance_sensor(Port::A).await,
            Err(HatError::WrongDevice { .. })
        ));
    }
}
