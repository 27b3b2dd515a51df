//! Motor descriptors.
//!
//! Active motors report speed and position through a combi mode on slot 0;
//! the values arrive on the `status` channel in combi order. The medium
//! linear motor has no absolute encoder, so its combi omits mode 3.

use super::{first, raw, Channel, Descriptor, SetupStep};

pub const STATUS: u8 = 0;
pub const SPEED: u8 = 1;
pub const POSITION: u8 = 2;
pub const ABSOLUTE_POSITION: u8 = 3;
pub const CALIB: u8 = 4;
pub const STATS: u8 = 5;

/// Default current limit applied at attach
pub const DEFAULT_PLIMIT: f64 = 0.7;

/// Default bias applied at attach
pub const DEFAULT_BIAS: f64 = 0.3;

static MOTOR_CHANNELS: [Channel; 6] = [
    Channel {
        name: "status",
        mode: STATUS,
        transform: raw,
    },
    Channel {
        name: "speed",
        mode: SPEED,
        transform: first,
    },
    Channel {
        name: "position",
        mode: POSITION,
        transform: first,
    },
    Channel {
        name: "absolutePosition",
        mode: ABSOLUTE_POSITION,
        transform: first,
    },
    Channel {
        name: "calib",
        mode: CALIB,
        transform: raw,
    },
    Channel {
        name: "stats",
        mode: STATS,
        transform: raw,
    },
];

pub static MOTOR: Descriptor = Descriptor {
    name: "Motor",
    channels: &MOTOR_CHANNELS,
    setup: &[
        SetupStep::Combi(&[(SPEED, 0), (POSITION, 0), (ABSOLUTE_POSITION, 0)]),
        SetupStep::Plimit(DEFAULT_PLIMIT),
        SetupStep::Bias(DEFAULT_BIAS),
    ],
};

pub static LINEAR_MOTOR: Descriptor = Descriptor {
    name: "Motor",
    channels: &MOTOR_CHANNELS,
    setup: &[
        SetupStep::Combi(&[(SPEED, 0), (POSITION, 0)]),
        SetupStep::Plimit(DEFAULT_PLIMIT),
        SetupStep::Bias(DEFAULT_BIAS),
    ],
};

pub static PASSIVE_MOTOR: Descriptor = Descriptor {
    name: "PassiveMotor",
    channels: &[],
    setup: &[
        SetupStep::Plimit(DEFAULT_PLIMIT),
        SetupStep::Bias(DEFAULT_BIAS),
    ],
};
