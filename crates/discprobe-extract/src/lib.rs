//! # Discprobe Extract
//!
//! The five-stage dimensional extraction pipeline for lathe part programs:
//!
//! 1. **title** - nominal dimensions from the free-text title
//! 2. **motion** - raw text to an ordered, typed motion stream
//! 3. **passes** - roughing vs finishing classification
//! 4. **features** - bore/hub/outer-turn candidate features
//! 5. **reconcile** - one validated, confidence-tagged result
//!
//! Data flows strictly forward; extraction is pure and deterministic, with
//! no I/O and no shared state, so a batch driver can run any number of
//! programs concurrently.

pub mod features;
pub mod motion;
pub mod passes;
pub mod reconcile;
pub mod title;

use tracing::{debug, instrument};

use discprobe_core::error::{InputError, Result};
use discprobe_core::model::ExtractionResult;
use discprobe_core::tolerances::Tolerances;

pub use features::{classify_features, FeatureSet};
pub use motion::{build_stream, MotionStream};
pub use passes::{classify_stream, group_passes, ToolGroup};
pub use reconcile::reconcile;
pub use title::parse_title;

/// The extraction engine, parameterized by its tolerance configuration
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    tolerances: Tolerances,
}

impl Extractor {
    /// Create an extractor with the default tolerances
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an extractor with validated custom tolerances
    pub fn with_tolerances(tolerances: Tolerances) -> Result<Self> {
        tolerances.validate()?;
        Ok(Self { tolerances })
    }

    /// The tolerance configuration in effect
    pub fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }

    /// Run the full pipeline over one program's text
    ///
    /// Malformed or incomplete programs never error: the result carries
    /// null fields, a severity status, and notes naming what failed. The
    /// only `Err` is the programmer error of handing in an empty string.
    #[instrument(skip_all, fields(bytes = text.len()))]
    pub fn extract(&self, text: &str) -> Result<ExtractionResult> {
        if text.trim().is_empty() {
            return Err(InputError::EmptyProgram.into());
        }

        let stream = build_stream(text);
        if stream.is_headerless() {
            debug!("no recognizable program header");
            return Ok(ExtractionResult::unparseable(
                "no recognizable program header; nothing extracted",
            ));
        }

        let spec = stream
            .title
            .as_deref()
            .map(|t| parse_title(t, &self.tolerances))
            .unwrap_or_default();

        let groups = classify_stream(&stream.events, &self.tolerances);
        let feature_set =
            classify_features(&groups, &spec, stream.working_units, &self.tolerances);

        let mut result = reconcile(
            &spec,
            &feature_set,
            stream.program_number.clone(),
            stream.working_units,
            &self.tolerances,
        );
        if stream.title.is_none() {
            result
                .detection_notes
                .push("no title comment found near the program header".to_string());
        }
        Ok(result)
    }
}

/// Extract with default tolerances; see [`Extractor::extract`]
pub fn extract(text: &str) -> Result<ExtractionResult> {
    Extractor::new().extract(text)
}
