//! Unit conversion between canonical storage units and display units.
//!
//! Everything in the store is kept in meters, bar and degrees Celsius.
//! Display preferences travel as an explicit [`UnitPrefs`] value; nothing
//! here holds global state, and converting never touches stored values.

use serde::{Deserialize, Serialize};

/// Feet in one meter.
pub const FEET_PER_METER: f64 = 3.28084;

/// PSI in one bar.
pub const PSI_PER_BAR: f64 = 14.5038;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "lowercase")]
pub enum DepthUnit {
    /// Meters and degrees Celsius.
    #[default]
    Metric,
    /// Feet and degrees Fahrenheit.
    Imperial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "lowercase")]
pub enum PressureUnit {
    Bar,
    #[default]
    Psi,
}

/// Display preferences toggled by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, uniffi::Record)]
#[serde(default)]
pub struct UnitPrefs {
    pub depth: DepthUnit,
    pub pressure: PressureUnit,
}

pub fn to_display_depth(meters: f64, unit: DepthUnit) -> f64 {
    match unit {
        DepthUnit::Metric => meters,
        DepthUnit::Imperial => meters * FEET_PER_METER,
    }
}

pub fn from_display_depth(value: f64, unit: DepthUnit) -> f64 {
    match unit {
        DepthUnit::Metric => value,
        DepthUnit::Imperial => value / FEET_PER_METER,
    }
}

pub fn to_display_pressure(bar: f64, unit: PressureUnit) -> f64 {
    match unit {
        PressureUnit::Bar => bar,
        PressureUnit::Psi => bar * PSI_PER_BAR,
    }
}

pub fn from_display_pressure(value: f64, unit: PressureUnit) -> f64 {
    match unit {
        PressureUnit::Bar => value,
        PressureUnit::Psi => value / PSI_PER_BAR,
    }
}

pub fn to_display_temperature(celsius: f64, unit: DepthUnit) -> f64 {
    match unit {
        DepthUnit::Metric => celsius,
        DepthUnit::Imperial => celsius * 9.0 / 5.0 + 32.0,
    }
}

pub fn feet_to_meters(feet: f64) -> f64 {
    from_display_depth(feet, DepthUnit::Imperial)
}

pub fn psi_to_bar(psi: f64) -> f64 {
    from_display_pressure(psi, PressureUnit::Psi)
}

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

impl UnitPrefs {
    pub fn new(depth: DepthUnit, pressure: PressureUnit) -> Self {
        Self { depth, pressure }
    }

    pub fn depth(&self, meters: f64) -> f64 {
        to_display_depth(meters, self.depth)
    }

    pub fn pressure(&self, bar: f64) -> f64 {
        to_display_pressure(bar, self.pressure)
    }

    /// Consumption rate (bar/min) in display pressure units per minute.
    pub fn rate(&self, bar_per_min: f64) -> f64 {
        to_display_pressure(bar_per_min, self.pressure)
    }

    pub fn temperature(&self, celsius: f64) -> f64 {
        to_display_temperature(celsius, self.depth)
    }

    pub fn depth_label(&self) -> &'static str {
        match self.depth {
            DepthUnit::Metric => "m",
            DepthUnit::Imperial => "ft",
        }
    }

    pub fn pressure_label(&self) -> &'static str {
        match self.pressure {
            PressureUnit::Bar => "bar",
            PressureUnit::Psi => "PSI",
        }
    }

    pub fn temperature_label(&self) -> &'static str {
        match self.depth {
            DepthUnit::Metric => "°C",
            DepthUnit::Imperial => "°F",
        }
    }

    /// `18.3m` or `60ft`: metric keeps one decimal, imperial rounds to whole feet.
    pub fn format_depth(&self, meters: f64) -> String {
        match self.depth {
            DepthUnit::Metric => format!("{:.1}{}", self.depth(meters), self.depth_label()),
            DepthUnit::Imperial => format!("{:.0}{}", self.depth(meters), self.depth_label()),
        }
    }

    pub fn format_pressure(&self, bar: f64) -> String {
        format!("{:.0} {}", self.pressure(bar), self.pressure_label())
    }
}
