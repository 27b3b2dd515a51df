//! The 3x3 light matrix.
//!
//! A local pixel buffer is kept so single pixels can be changed without the
//! caller tracking the rest of the frame.

use std::sync::{Mutex, PoisonError};

use buildhat_core::devices::matrix::{
    self, Grid, Pixel, LEVEL_MODE, PIXEL_MODE, TRANSITION_MODE,
};
use buildhat_core::DeviceKind;

use crate::device::Device;
use crate::error::Result;

#[derive(Debug)]
pub struct Matrix {
    device: Device,
    grid: Mutex<Grid>,
}

impl Matrix {
    pub fn new(device: Device) -> Result<Matrix> {
        device.expect_kind(|kind| kind == DeviceKind::Matrix, "light matrix")?;
        Ok(Matrix {
            device,
            grid: Mutex::new(Grid::default()),
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The buffered frame.
    pub fn pixels(&self) -> Grid {
        *self.grid.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the whole frame, showing it when `display` is set.
    pub async fn set_pixels(&self, grid: Grid, display: bool) -> Result<()> {
        *self.grid.lock().unwrap_or_else(PoisonError::into_inner) = grid;
        if display {
            self.show().await?;
        }
        Ok(())
    }

    pub async fn set_pixel(&self, x: usize, y: usize, pixel: Pixel, display: bool) -> Result<()> {
        matrix::validate_coordinate(x, y)?;
        self.grid.lock().unwrap_or_else(PoisonError::into_inner)[x][y] = pixel;
        if display {
            self.show().await?;
        }
        Ok(())
    }

    /// Fill every pixel with `pixel` and show it.
    pub async fn clear(&self, pixel: Pixel) -> Result<()> {
        self.set_pixels(matrix::filled(pixel), true).await
    }

    pub async fn off(&self) -> Result<()> {
        self.clear(Pixel::default()).await
    }

    /// Send the buffered frame.
    pub async fn show(&self) -> Result<()> {
        let payload = matrix::pixel_payload(&self.pixels());
        self.device.write_frame(&payload).await
    }

    /// Show a bar graph of `level`, 0 to 9.
    pub async fn level(&self, level: u8) -> Result<()> {
        let payload = matrix::level_payload(level)?;
        self.in_mode(LEVEL_MODE, &payload).await
    }

    /// Pick the transition between frames: 0 none, 1 swipe, 2 fade.
    pub async fn set_transition(&self, transition: u8) -> Result<()> {
        let payload = matrix::transition_payload(transition)?;
        self.in_mode(TRANSITION_MODE, &payload).await
    }

    async fn in_mode(&self, mode: u8, payload: &str) -> Result<()> {
        self.device.set_mode(mode).await?;
        let shown = self.device.write_frame(payload).await;
        self.device.set_mode(PIXEL_MODE).await?;
        shown
    }
}
