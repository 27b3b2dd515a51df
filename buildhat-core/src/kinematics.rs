//! Motor motion calculations.
//!
//! Positional moves are executed by the firmware as a linear ramp of the
//! target position, expressed in rotations, over a duration in seconds. The
//! functions here turn user level requests (degrees, speed, direction) into
//! such a [`Ramp`]. Argument validation lives here too so callers can reject
//! bad input before touching the wire.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{check_range, Error, Result};

/// Converts the 0..=100 speed scale into rotations per second.
pub const SPEED_SCALE: f64 = 0.05;

/// Which way to turn when seeking an absolute position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Shortest,
    Clockwise,
    Anticlockwise,
}

/// Linear position ramp, positions in rotations and duration in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Ramp {
    pub from: f64,
    pub to: f64,
    pub duration: f64,
}

impl Ramp {
    /// Ramp between two positions at `speed` (sign ignored).
    pub fn new(from: f64, to: f64, speed: f64) -> Ramp {
        let duration = ((to - from) / (speed.abs() * SPEED_SCALE)).abs();
        Ramp { from, to, duration }
    }
}

/// Speed for relative moves: -100..=100, sign gives direction.
pub fn validate_signed_speed(speed: f64) -> Result<()> {
    check_range("speed", speed, -100.0, 100.0)
}

/// Speed for absolute and timed moves: 0..=100.
pub fn validate_unsigned_speed(speed: f64) -> Result<()> {
    check_range("speed", speed, 0.0, 100.0)
}

/// Absolute target angle: -180..=180.
pub fn validate_angle(degrees: f64) -> Result<()> {
    check_range("angle", degrees, -180.0, 180.0)
}

/// A ramp at zero speed would never finish.
pub fn validate_ramp_speed(speed: f64) -> Result<()> {
    if speed == 0.0 {
        return Err(Error::InvalidArgument(
            "speed must be non-zero for a positional move".into(),
        ));
    }
    Ok(())
}

/// Ramp for turning `degrees` relative to `position` (degrees).
///
/// A negative speed reverses the direction of travel.
pub fn degrees_ramp(degrees: f64, speed: f64, position: f64) -> Ramp {
    let sign = if speed < 0.0 { -1.0 } else { 1.0 };
    let from = position / 360.0;
    let to = (degrees * sign + position) / 360.0;
    Ramp::new(from, to, speed)
}

/// Signed difference from `absolute` to `target`, in degrees.
///
/// Uses truncating remainder, so for some inputs the result lies outside
/// -180..=180 and is not the shorter way round.
pub fn angle_difference(target: f64, absolute: f64) -> f64 {
    ((target - absolute + 180.0) % 360.0) - 180.0
}

/// The same angular move taken the other way round.
pub fn complement(diff: f64) -> f64 {
    if diff > 0.0 {
        diff - 360.0
    } else if diff < 0.0 {
        diff + 360.0
    } else {
        diff
    }
}

/// Pick the move for `direction` given the initial difference.
///
/// `Shortest` keeps `diff` as computed by [`angle_difference`]; it is not
/// re-evaluated against the complement.
pub fn choose_move(diff: f64, direction: Direction) -> f64 {
    let other = complement(diff);
    match direction {
        Direction::Shortest => diff,
        Direction::Clockwise => diff.max(other),
        Direction::Anticlockwise => diff.min(other),
    }
}

/// Ramp for reaching absolute angle `target`.
///
/// `position` is the raw accumulated position and `absolute` the absolute
/// angle, both as reported by the motor's status channel.
pub fn position_ramp(
    target: f64,
    speed: f64,
    direction: Direction,
    position: f64,
    absolute: f64,
) -> Ramp {
    let step = choose_move(angle_difference(target, absolute), direction);
    Ramp::new(position / 360.0, (position + step) / 360.0, speed)
}
