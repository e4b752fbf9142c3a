//! # Discprobe
//!
//! Dimensional extraction and validation engine for lathe part programs:
//! reads the toolpath of a rotationally-symmetric part (brake rotor,
//! flywheel, hub adapter), derives its real dimensions from the motion,
//! and reconciles them against the nominal values stated in the free-text
//! program title.
//!
//! ## Architecture
//!
//! Discprobe is organized as a workspace with multiple crates:
//!
//! 1. **discprobe-core** - Data model, unit handling, tolerance
//!    configuration, error taxonomy
//! 2. **discprobe-extract** - The five-stage extraction pipeline (title,
//!    motion, passes, features, reconcile)
//! 3. **discprobe** - Batch CLI binary that runs extractions over many
//!    program files concurrently
//!
//! ## Guarantees
//!
//! - **Deterministic**: the same program text always yields the same
//!   dimensions, status, and notes
//! - **Best-effort**: malformed programs produce a CRITICAL result with
//!   null fields, never an error
//! - **Traceable**: every resolved dimension carries a provenance string
//!   and is referenced by at least one detection note

pub use discprobe_core::{
    Confidence, DimensionValue, Error, ExtractionResult, Feature, FeatureType, InputError, Marker,
    MeasurementSystem, MotionEvent, NominalSpec, NominalValue, Pass, Result, Side, SourceUnit,
    ToleranceError, Tolerances, ValidationStatus,
};

pub use discprobe_extract::{extract, Extractor};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date set by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize the tracing subscriber for the CLI
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    // Results go to stdout as JSON lines; all diagnostics go to stderr.
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
