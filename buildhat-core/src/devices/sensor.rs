//! Sensor descriptors.

use super::{first, raw, Channel, Descriptor, Reading, SetupStep};

fn clamp_rgb(values: &[f64]) -> Reading {
    Reading::Vector(
        values
            .iter()
            .map(|v| v.clamp(0.0, 400.0) / 400.0 * 255.0)
            .collect(),
    )
}

fn scale_rgb(values: &[f64]) -> Reading {
    Reading::Vector(values.iter().map(|v| v / 1024.0 * 255.0).collect())
}

pub static TILT: Descriptor = Descriptor {
    name: "TiltSensor",
    channels: &[Channel {
        name: "tilt",
        mode: 0,
        transform: raw,
    }],
    setup: &[SetupStep::SwitchOn, SetupStep::Mode(0)],
};

pub static MOTION: Descriptor = Descriptor {
    name: "MotionSensor",
    channels: &[Channel {
        name: "distance",
        mode: 0,
        transform: raw,
    }],
    setup: &[SetupStep::SwitchOn, SetupStep::Mode(0)],
};

pub static COLOR_DISTANCE: Descriptor = Descriptor {
    name: "ColorDistanceSensor",
    channels: &[
        Channel {
            name: "color",
            mode: 0,
            transform: first,
        },
        Channel {
            name: "distance",
            mode: 1,
            transform: first,
        },
        Channel {
            name: "distanceCount",
            mode: 2,
            transform: first,
        },
        Channel {
            name: "reflect",
            mode: 3,
            transform: first,
        },
        Channel {
            name: "ambient",
            mode: 4,
            transform: first,
        },
        Channel {
            name: "rgbIntensity",
            mode: 6,
            transform: clamp_rgb,
        },
        Channel {
            name: "colorAndDistance",
            mode: 8,
            transform: raw,
        },
    ],
    setup: &[SetupStep::SensorPower, SetupStep::Mode(6)],
};

pub static COLOR: Descriptor = Descriptor {
    name: "ColorSensor",
    channels: &[
        Channel {
            name: "reflect",
            mode: 1,
            transform: first,
        },
        Channel {
            name: "ambient",
            mode: 2,
            transform: first,
        },
        Channel {
            name: "rgbIntensity",
            mode: 5,
            transform: scale_rgb,
        },
    ],
    setup: &[SetupStep::SensorPower, SetupStep::Mode(5)],
};

pub static DISTANCE: Descriptor = Descriptor {
    name: "DistanceSensor",
    channels: &[Channel {
        name: "distance",
        mode: 0,
        transform: raw,
    }],
    setup: &[SetupStep::SensorPower, SetupStep::Mode(0)],
};

pub static FORCE: Descriptor = Descriptor {
    name: "ForceSensor",
    channels: &[
        Channel {
            name: "force",
            mode: 0,
            transform: first,
        },
        Channel {
            name: "pressed",
            mode: 2,
            transform: first,
        },
        Channel {
            name: "peakForce",
            mode: 3,
            transform: first,
        },
    ],
    setup: &[
        SetupStep::SensorPower,
        SetupStep::Combi(&[(0, 0), (2, 0), (3, 0)]),
    ],
};
