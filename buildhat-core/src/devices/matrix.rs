//! 3x3 light matrix.
//!
//! The matrix is driven by raw `write1` frames rather than telemetry modes:
//!
//! | Prefix | Payload                                  | Mode |
//! |--------|------------------------------------------|------|
//! | `c0`   | bar graph level 0..=9                     | 0    |
//! | `c2`   | 9 pixel bytes, `(brightness << 4) + color` | 2  |
//! | `c3`   | transition 0..=2                          | 3    |
//!
//! Pixels are sent column by column (x outer, y inner).

use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::{Descriptor, SetupStep};
use crate::error::{check_range, Error, Result};
use crate::protocol::command;

pub const LEVEL_MODE: u8 = 0;
pub const PIXEL_MODE: u8 = 2;
pub const TRANSITION_MODE: u8 = 3;

/// Frame that switches every pixel off
pub const CLEAR_FRAME: &str = "c2000000000000000000";

pub static MATRIX: Descriptor = Descriptor {
    name: "Matrix",
    channels: &[],
    setup: &[SetupStep::SwitchOn, SetupStep::Mode(PIXEL_MODE)],
};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Primitive,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    #[default]
    Black = 0,
    Pink = 1,
    Lilac = 2,
    Blue = 3,
    Cyan = 4,
    Turquoise = 5,
    Green = 6,
    Yellow = 7,
    Orange = 8,
    Red = 9,
    White = 10,
}

impl Color {
    pub fn from_index(index: u8) -> Result<Color> {
        Color::from_u8(index)
            .ok_or_else(|| Error::InvalidArgument(format!("color should be 0 to 10, got {}", index)))
    }
}

/// One matrix pixel, brightness 0..=10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pixel {
    color: Color,
    brightness: u8,
}

impl Pixel {
    pub fn new(color: Color, brightness: u8) -> Result<Pixel> {
        check_range("brightness", f64::from(brightness), 0.0, 10.0)?;
        Ok(Pixel { color, brightness })
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    fn byte(&self) -> u8 {
        (self.brightness << 4) | self.color as u8
    }
}

/// Pixel buffer indexed `[x][y]`.
pub type Grid = [[Pixel; 3]; 3];

pub fn filled(pixel: Pixel) -> Grid {
    [[pixel; 3]; 3]
}

pub fn validate_coordinate(x: usize, y: usize) -> Result<()> {
    if x > 2 || y > 2 {
        return Err(Error::InvalidArgument(format!(
            "coordinate should be 0 to 2, got ({}, {})",
            x, y
        )));
    }
    Ok(())
}

/// `write1` payload showing `grid`.
pub fn pixel_payload(grid: &Grid) -> String {
    let mut bytes = Vec::with_capacity(10);
    bytes.push(0xc2);
    for column in grid {
        for pixel in column {
            bytes.push(pixel.byte());
        }
    }
    command::hex(&bytes)
}

/// `write1` payload showing a bar graph level.
pub fn level_payload(level: u8) -> Result<String> {
    check_range("level", f64::from(level), 0.0, 9.0)?;
    Ok(command::hex(&[0xc0, level]))
}

/// `write1` payload selecting the transition between frames.
pub fn transition_payload(transition: u8) -> Result<String> {
    check_range("transition", f64::from(transition), 0.0, 2.0)?;
    Ok(command::hex(&[0xc3, transition]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_grid_matches_clear_frame() {
        assert_eq!(pixel_payload(&Grid::default()), CLEAR_FRAME);
    }

    #[test]
    fn test_pixel_byte_layout() {
        let mut grid = Grid::default();
        grid[0][1] = Pixel::new(Color::Red, 10).unwrap();
        grid[2][2] = Pixel::new(Color::White, 1).unwrap();
        assert_eq!(pixel_payload(&grid), "c200a90000000000001a");
    }

    #[test]
    fn test_pixel_validation() {
        assert!(Pixel::new(Color::Blue, 11).is_err());
        assert!(Color::from_index(11).is_err());
        assert_eq!(Color::from_index(3), Ok(Color::Blue));
        assert_eq!("Turquoise".parse::<Color>().ok(), Some(Color::Turquoise));
    }

    #[test]
    fn test_coordinates() {
        assert!(validate_coordinate(2, 2).is_ok());
        assert!(validate_coordinate(3, 0).is_err());
    }

    #[test]
    fn test_level_and_transition_payloads() {
        assert_eq!(level_payload(9).unwrap(), "c009");
        assert!(level_payload(10).is_err());
        assert_eq!(transition_payload(2).unwrap(), "c302");
        assert!(transition_payload(3).is_err());
    }

    #[test]
    fn test_filled_grid() {
        let grid = filled(Pixel::new(Color::Green, 5).unwrap());
        let payload = pixel_payload(&grid);
        assert_eq!(payload, format!("c2{}", "56".repeat(9)));
    }
}
