//! Peripheral descriptor tables.
//!
//! Every supported device type id maps to a static [`Descriptor`]: the named
//! telemetry channels it offers, the mode index behind each channel, how raw
//! values are turned into a [`Reading`], and the commands to run when the
//! device is attached.
//!
//! | Id | Kind                    | Family        |
//! |----|-------------------------|---------------|
//! | 1  | PassiveMotor            | passive motor |
//! | 2  | TrainMotor              | passive motor |
//! | 8  | Light                   | light         |
//! | 34 | TiltSensor              | sensor        |
//! | 35 | MotionSensor            | sensor        |
//! | 37 | ColorDistanceSensor     | sensor        |
//! | 38 | MediumLinearMotor       | motor         |
//! | 46 | LargeMotor              | motor         |
//! | 47 | XlMotor                 | motor         |
//! | 48 | MediumAngularMotorCyan  | motor         |
//! | 49 | LargeAngularMotorCyan   | motor         |
//! | 61 | ColorSensor             | sensor        |
//! | 62 | DistanceSensor          | sensor        |
//! | 63 | ForceSensor             | sensor        |
//! | 64 | Matrix                  | matrix        |
//! | 65 | SmallAngularMotor       | motor         |
//! | 75 | MediumAngularMotorGrey  | motor         |
//! | 76 | LargeAngularMotorGrey   | motor         |

use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;
use serde::{Serialize, Serializer};
use strum::{Display, EnumIter, IntoStaticStr};

use crate::error::{Error, Result};

pub mod light;
pub mod matrix;
pub mod motor;
pub mod sensor;

/// Supported peripheral models, keyed by the id reported on connect.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Primitive, Display, EnumIter, IntoStaticStr, Serialize,
)]
pub enum DeviceKind {
    PassiveMotor = 1,
    TrainMotor = 2,
    Light = 8,
    TiltSensor = 34,
    MotionSensor = 35,
    ColorDistanceSensor = 37,
    MediumLinearMotor = 38,
    LargeMotor = 46,
    XlMotor = 47,
    MediumAngularMotorCyan = 48,
    LargeAngularMotorCyan = 49,
    ColorSensor = 61,
    DistanceSensor = 62,
    ForceSensor = 63,
    Matrix = 64,
    SmallAngularMotor = 65,
    MediumAngularMotorGrey = 75,
    LargeAngularMotorGrey = 76,
}

/// Broad behaviour group, used to pick the helper that drives a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum Family {
    PassiveMotor,
    Motor,
    Light,
    Sensor,
    Matrix,
}

impl DeviceKind {
    /// Resolve a wire type id.
    pub fn from_type_id(type_id: u32) -> Result<DeviceKind> {
        DeviceKind::from_u32(type_id).ok_or(Error::UnsupportedDeviceType(type_id))
    }

    pub fn type_id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn family(self) -> Family {
        use DeviceKind::*;
        match self {
            PassiveMotor | TrainMotor => Family::PassiveMotor,
            Light => Family::Light,
            TiltSensor | MotionSensor | ColorDistanceSensor | ColorSensor | DistanceSensor
            | ForceSensor => Family::Sensor,
            Matrix => Family::Matrix,
            MediumLinearMotor | LargeMotor | XlMotor | MediumAngularMotorCyan
            | LargeAngularMotorCyan | SmallAngularMotor | MediumAngularMotorGrey
            | LargeAngularMotorGrey => Family::Motor,
        }
    }

    pub fn descriptor(self) -> &'static Descriptor {
        use DeviceKind::*;
        match self {
            PassiveMotor | TrainMotor => &motor::PASSIVE_MOTOR,
            MediumLinearMotor => &motor::LINEAR_MOTOR,
            LargeMotor | XlMotor | MediumAngularMotorCyan | LargeAngularMotorCyan
            | SmallAngularMotor | MediumAngularMotorGrey | LargeAngularMotorGrey => &motor::MOTOR,
            Light => &light::LIGHT,
            TiltSensor => &sensor::TILT,
            MotionSensor => &sensor::MOTION,
            ColorDistanceSensor => &sensor::COLOR_DISTANCE,
            ColorSensor => &sensor::COLOR,
            DistanceSensor => &sensor::DISTANCE,
            ForceSensor => &sensor::FORCE,
            Matrix => &matrix::MATRIX,
        }
    }
}

// =============================================================================
// Readings
// =============================================================================

/// A transformed telemetry value.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Reading {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Reading::Scalar(v) => Some(*v),
            Reading::Vector(_) => None,
        }
    }

    /// Values as a slice; a scalar is a one element slice
    pub fn values(&self) -> &[f64] {
        match self {
            Reading::Scalar(v) => std::slice::from_ref(v),
            Reading::Vector(v) => v,
        }
    }
}

impl Serialize for Reading {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Reading::Scalar(v) => serializer.serialize_f64(*v),
            Reading::Vector(v) => v.serialize(serializer),
        }
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reading::Scalar(v) => write!(f, "{}", v),
            Reading::Vector(v) => {
                let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Raw values unchanged
pub fn raw(values: &[f64]) -> Reading {
    Reading::Vector(values.to_vec())
}

/// First value only
pub fn first(values: &[f64]) -> Reading {
    match values.first() {
        Some(v) => Reading::Scalar(*v),
        None => Reading::Vector(Vec::new()),
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// A named telemetry channel.
#[derive(Debug)]
pub struct Channel {
    pub name: &'static str,
    pub mode: u8,
    pub transform: fn(&[f64]) -> Reading,
}

/// One command of a device's attach sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetupStep {
    /// `plimit 1 ; on`
    SwitchOn,
    /// `plimit 1 ; set -1`, for sensors powered through the motor pins
    SensorPower,
    /// Make `mode` the simple mode
    Mode(u8),
    /// Define combi slot 0
    Combi(&'static [(u8, u8)]),
    Plimit(f64),
    Bias(f64),
}

/// Static description of one device model.
#[derive(Debug)]
pub struct Descriptor {
    pub name: &'static str,
    pub channels: &'static [Channel],
    pub setup: &'static [SetupStep],
}

impl Descriptor {
    pub fn channel(&self, name: &str) -> Result<&'static Channel> {
        self.channels
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::UnknownChannel {
                device: self.name,
                channel: name.to_string(),
            })
    }

    pub fn channel_for_mode(&self, mode: u8) -> Option<&'static Channel> {
        self.channels.iter().find(|c| c.mode == mode)
    }

    /// Transform raw values reported for `mode`; unmapped modes stay raw.
    pub fn transform(&self, mode: u8, values: &[f64]) -> Reading {
        match self.channel_for_mode(mode) {
            Some(channel) => (channel.transform)(values),
            None => raw(values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use strum::IntoEnumIterator;

    #[test]
    fn test_type_id_lookup() {
        assert_eq!(DeviceKind::from_type_id(2), Ok(DeviceKind::TrainMotor));
        assert_eq!(DeviceKind::from_type_id(64), Ok(DeviceKind::Matrix));
        assert_eq!(
            DeviceKind::from_type_id(3),
            Err(Error::UnsupportedDeviceType(3))
        );
        assert_eq!(DeviceKind::Matrix.type_id(), 64);
        assert_eq!(DeviceKind::XlMotor.name(), "XlMotor");
    }

    #[test]
    fn test_modes_unique_within_descriptor() {
        for kind in DeviceKind::iter() {
            let d = kind.descriptor();
            let modes: HashSet<u8> = d.channels.iter().map(|c| c.mode).collect();
            assert_eq!(modes.len(), d.channels.len(), "{}", d.name);
            let names: HashSet<&str> = d.channels.iter().map(|c| c.name).collect();
            assert_eq!(names.len(), d.channels.len(), "{}", d.name);
        }
    }

    #[test]
    fn test_unknown_channel() {
        let d = DeviceKind::LargeMotor.descriptor();
        assert!(d.channel("position").is_ok());
        assert_eq!(
            d.channel("colour").unwrap_err(),
            Error::UnknownChannel {
                device: "Motor",
                channel: "colour".into()
            }
        );
    }

    #[test]
    fn test_transform_falls_back_to_raw() {
        let d = DeviceKind::LargeMotor.descriptor();
        assert_eq!(d.transform(2, &[42.0, 1.0]), Reading::Scalar(42.0));
        assert_eq!(d.transform(9, &[1.0, 2.0]), Reading::Vector(vec![1.0, 2.0]));
    }

    #[test]
    fn test_reading_serializes_plainly() {
        assert_eq!(
            serde_json::to_string(&Reading::Scalar(1.5)).unwrap(),
            "1.5"
        );
        assert_eq!(
            serde_json::to_string(&Reading::Vector(vec![1.0, 2.0])).unwrap(),
            "[1.0,2.0]"
        );
    }

    #[test]
    fn test_families() {
        assert_eq!(DeviceKind::TrainMotor.family(), Family::PassiveMotor);
        assert_eq!(DeviceKind::SmallAngularMotor.family(), Family::Motor);
        assert_eq!(DeviceKind::ForceSensor.family(), Family::Sensor);
    }
}
