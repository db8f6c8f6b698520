//! Device and laser state owned by the interpreter.

use serde::Serialize;
use std::fmt;

/// Upper bound for every power-like setting.
pub const MAX_POWER: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionMode {
    Rapid,
    Program,
    Finished,
    /// Transitional marker reserved for backends; the interpreter never enters it.
    ModeChange,
}

impl MotionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MotionMode::Rapid => "rapid",
            MotionMode::Program => "program",
            MotionMode::Finished => "finished",
            MotionMode::ModeChange => "modechange",
        }
    }
}

impl fmt::Display for MotionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceState {
    pub mode: MotionMode,
    pub x: i32,
    pub y: i32,
    pub relative: bool,
    pub laser_on: bool,
    pub properties: u32,
}

impl DeviceState {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            mode: MotionMode::Rapid,
            x,
            y,
            relative: false,
            laser_on: false,
            properties: 0,
        }
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn set_prop(&mut self, mask: u32) {
        self.properties |= mask;
    }

    pub fn unset_prop(&mut self, mask: u32) {
        self.properties &= !mask;
    }

    /// True if any bit of `mask` is set.
    pub fn is_prop(&self, mask: u32) -> bool {
        self.properties & mask != 0
    }

    pub fn toggle_prop(&mut self, mask: u32) {
        if self.is_prop(mask) {
            self.unset_prop(mask);
        } else {
            self.set_prop(mask);
        }
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaserSettings {
    pub speed: f64,
    pub power: f64,
    pub d_ratio: Option<f64>,
    pub acceleration: Option<i32>,
    pub raster_step: i32,
    pub overscan: Option<f64>,
    pub laser_enabled: bool,
}

impl Default for LaserSettings {
    fn default() -> Self {
        Self {
            speed: 20.0,
            power: MAX_POWER,
            d_ratio: None,
            acceleration: None,
            raster_step: 0,
            overscan: None,
            laser_enabled: true,
        }
    }
}

/// Clamps a power value into `[0, MAX_POWER]`. NaN clamps to 0.
pub fn clamp_power(power: f64) -> f64 {
    if power > MAX_POWER {
        MAX_POWER
    } else if power > 0.0 {
        power
    } else {
        0.0
    }
}
