//! # Discprobe Core
//!
//! Core types and utilities for the discprobe extraction engine:
//! the forward-flowing data model (nominal spec, motion events, passes,
//! features, extraction result), unit handling, tolerance configuration,
//! and the error taxonomy.

pub mod error;
pub mod model;
pub mod tolerances;
pub mod units;

pub use error::{Error, InputError, Result, ToleranceError};

pub use model::{
    Confidence, DimensionValue, ExtractionResult, Feature, FeatureType, Marker, MotionEvent,
    NominalSpec, NominalValue, Pass, Side, ValidationStatus,
};

pub use tolerances::{Band, Tolerances};

pub use units::{MeasurementSystem, SourceUnit, MM_PER_INCH};
