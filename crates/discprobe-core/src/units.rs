//! Unit conversion utilities
//!
//! Handles conversion between metric (mm) and imperial (inch) dimension
//! values. Program titles mix both systems freely, so every nominal value
//! carries the unit it was written in alongside its normalized magnitude.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Millimeters per inch
pub const MM_PER_INCH: f64 = 25.4;

/// Measurement system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementSystem {
    /// Metric system (mm)
    Metric,
    /// Imperial system (inches)
    Imperial,
}

impl Default for MeasurementSystem {
    fn default() -> Self {
        Self::Metric
    }
}

impl fmt::Display for MeasurementSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metric => write!(f, "Metric"),
            Self::Imperial => write!(f, "Imperial"),
        }
    }
}

impl FromStr for MeasurementSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "metric" | "mm" => Ok(Self::Metric),
            "imperial" | "inch" | "in" => Ok(Self::Imperial),
            _ => Err(format!("Unknown measurement system: {}", s)),
        }
    }
}

/// The unit a dimension token was originally written in
///
/// Distinct from [`MeasurementSystem`]: title text may carry no unit marker
/// at all, and the distinction matters for confidence scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceUnit {
    /// Explicit inch marker (`"`, `IN`, `INCH`)
    Inch,
    /// Explicit millimeter marker (`MM`)
    Millimeter,
    /// No unit marker present; classified by plausible numeric range
    Unmarked,
}

impl fmt::Display for SourceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inch => write!(f, "in"),
            Self::Millimeter => write!(f, "mm"),
            Self::Unmarked => write!(f, "unmarked"),
        }
    }
}

/// Convert inches to millimeters
pub fn in_to_mm(inches: f64) -> f64 {
    inches * MM_PER_INCH
}

/// Convert millimeters to inches
pub fn mm_to_in(mm: f64) -> f64 {
    mm / MM_PER_INCH
}

/// Convert a millimeter magnitude into the given working system
pub fn mm_to_system(mm: f64, system: MeasurementSystem) -> f64 {
    match system {
        MeasurementSystem::Metric => mm,
        MeasurementSystem::Imperial => mm_to_in(mm),
    }
}

/// Convert a magnitude in the given working system into millimeters
pub fn system_to_mm(value: f64, system: MeasurementSystem) -> f64 {
    match system {
        MeasurementSystem::Metric => value,
        MeasurementSystem::Imperial => in_to_mm(value),
    }
}

/// Format a millimeter length for display in the given system
pub fn format_length(value_mm: f64, system: MeasurementSystem) -> String {
    match system {
        MeasurementSystem::Metric => format!("{:.3}", value_mm),
        MeasurementSystem::Imperial => format!("{:.3}", mm_to_in(value_mm)),
    }
}

/// Get the unit label for the given system ("mm" or "in")
pub fn get_unit_label(system: MeasurementSystem) -> &'static str {
    match system {
        MeasurementSystem::Metric => "mm",
        MeasurementSystem::Imperial => "in",
    }
}
