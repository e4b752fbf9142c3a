//! Tolerance configuration for the extraction heuristics
//!
//! The numeric bands the classifiers key on (roughing step increments,
//! chamfer depth, marker agreement, pass/fail tolerances) are empirically
//! tuned against shop programs, not derived constants. They live in a serde
//! struct with sensible defaults and can be overridden from a JSON file so
//! they can be re-validated against a labeled corpus without a rebuild.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, ToleranceError};

/// An inclusive numeric band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// True when the value falls inside the band (inclusive, with a small
    /// epsilon so boundary steps like exactly 0.30 still qualify)
    pub fn contains(&self, value: f64) -> bool {
        const EPS: f64 = 1e-6;
        value >= self.min - EPS && value <= self.max + EPS
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// Tuning knobs for all five extraction stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Agreement window for an "X IN / Y MM" dual-unit title pair (mm).
    /// Inside: one outer-diameter-class value. Outside: two dimensions.
    pub dual_unit_tolerance_mm: f64,

    /// How far an inline marker's value may sit from the nominal value and
    /// still be trusted as marking the same dimension (working units)
    pub marker_tolerance: f64,

    /// Measured-vs-spec window for a PASS status (mm)
    pub tight_tolerance_mm: f64,

    /// Measured-vs-spec window separating BORE_WARNING from CRITICAL (mm)
    pub loose_tolerance_mm: f64,

    /// Ratio between nominal and measured beyond which the disagreement is
    /// treated as a stated-value typo rather than a machining deviation
    pub typo_ratio: f64,

    /// Plausible per-pass step of a roughing progression (working units)
    pub roughing_step: Band,

    /// Depths shallower than this are edge-break/chamfer touches and are
    /// excluded from roughing progressions and hub cycles (working units)
    pub chamfer_depth: f64,

    /// Feed rates at or below this are finishing feeds (working units/rev)
    pub finishing_feed_max: f64,

    /// Fraction of hub-cycle axial steps that must fall in the roughing
    /// step band for the oscillation pattern to qualify
    pub hub_step_majority: f64,

    /// Minimum diameter drop from the facing position to the hub-rough
    /// position for an oscillation cycle to count (working units)
    pub hub_diameter_drop_min: f64,

    /// Stock left on the hub diameter by the roughing oscillation, removed
    /// to get the finished hub diameter (working units)
    pub roughing_allowance: f64,

    /// Diameter tolerance for linking a stepped bore across sides
    /// (working units)
    pub stepped_bore_link_tolerance: f64,

    /// Plausible outer-diameter range for unmarked title numbers (mm)
    pub od_range_mm: Band,

    /// Plausible center-bore range for unmarked title numbers (mm)
    pub bore_range_mm: Band,

    /// Plausible thickness range for unmarked title numbers (mm)
    pub thickness_range_mm: Band,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            dual_unit_tolerance_mm: 5.0,
            marker_tolerance: 5.0,
            tight_tolerance_mm: 0.5,
            loose_tolerance_mm: 2.5,
            typo_ratio: 2.0,
            roughing_step: Band::new(0.10, 0.30),
            chamfer_depth: 0.5,
            finishing_feed_max: 0.15,
            hub_step_majority: 0.7,
            hub_diameter_drop_min: 0.5,
            roughing_allowance: 0.04,
            stepped_bore_link_tolerance: 0.25,
            od_range_mm: Band::new(166.0, 520.0),
            bore_range_mm: Band::new(46.0, 165.0),
            thickness_range_mm: Band::new(3.0, 45.0),
        }
    }
}

impl Tolerances {
    /// Load tolerances from a JSON file, validating before returning
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ToleranceError::FileAccess {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let tolerances: Self =
            serde_json::from_str(&contents).map_err(|e| ToleranceError::InvalidFormat {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        tolerances.validate()?;
        Ok(tolerances)
    }

    /// Persist tolerances to a JSON file (pretty-printed)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents =
            serde_json::to_string_pretty(self).map_err(|e| ToleranceError::InvalidFormat {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        std::fs::write(path, contents).map_err(|e| {
            ToleranceError::FileAccess {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Reject nonsensical configurations before they reach a classifier
    pub fn validate(&self) -> Result<()> {
        for (name, band) in [
            ("roughing_step", &self.roughing_step),
            ("od_range_mm", &self.od_range_mm),
            ("bore_range_mm", &self.bore_range_mm),
            ("thickness_range_mm", &self.thickness_range_mm),
        ] {
            if band.min >= band.max {
                return Err(ToleranceError::EmptyBand {
                    name: name.to_string(),
                    min: band.min,
                    max: band.max,
                }
                .into());
            }
        }
        for (name, value, min, max) in [
            ("hub_step_majority", self.hub_step_majority, 0.0, 1.0),
            ("typo_ratio", self.typo_ratio, 1.0, 100.0),
            ("chamfer_depth", self.chamfer_depth, 0.0, 50.0),
        ] {
            if value < min || value > max {
                return Err(ToleranceError::OutOfRange {
                    name: name.to_string(),
                    value,
                    min,
                    max,
                }
                .into());
            }
        }
        if self.tight_tolerance_mm > self.loose_tolerance_mm {
            return Err(ToleranceError::OutOfRange {
                name: "tight_tolerance_mm".to_string(),
                value: self.tight_tolerance_mm,
                min: 0.0,
                max: self.loose_tolerance_mm,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        Tolerances::default().validate().unwrap();
    }

    #[test]
    fn test_band_contains_boundary() {
        let band = Band::new(0.10, 0.30);
        assert!(band.contains(0.10));
        assert!(band.contains(0.30));
        assert!(band.contains(0.2945));
        assert!(!band.contains(0.35));
        assert!(!band.contains(0.05));
    }

    #[test]
    fn test_ranges_are_disjoint() {
        // The bare-number fallback relies on these never overlapping.
        let t = Tolerances::default();
        assert!(t.thickness_range_mm.max < t.bore_range_mm.min);
        assert!(t.bore_range_mm.max < t.od_range_mm.min);
    }

    #[test]
    fn test_empty_band_rejected() {
        let mut t = Tolerances::default();
        t.roughing_step = Band::new(0.3, 0.1);
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tolerances.json");

        let mut t = Tolerances::default();
        t.chamfer_depth = 0.8;
        t.save(&path).unwrap();

        let loaded = Tolerances::load(&path).unwrap();
        assert_eq!(loaded, t);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tolerances.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Tolerances::load(&path).is_err());
    }
}
