//! Error handling for discprobe
//!
//! Extraction itself is best-effort and never fails on malformed program
//! text: a bad program produces an `ExtractionResult` with null fields and a
//! CRITICAL validation status, not an error. The error types here cover the
//! remaining failure surface:
//! - Input errors (programmer misuse of the API)
//! - Tolerance configuration errors (loading/saving tuning files)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Input error type
///
/// Represents misuse of the extraction API rather than malformed program
/// content. These fail loudly instead of returning a misleading result.
#[derive(Error, Debug, Clone)]
pub enum InputError {
    /// The caller handed in an empty (or whitespace-only) program
    #[error("Cannot extract from an empty program")]
    EmptyProgram,
}

/// Tolerance configuration error type
///
/// Represents errors loading or persisting a tolerance tuning file.
#[derive(Error, Debug)]
pub enum ToleranceError {
    /// The tolerance file could not be read or written
    #[error("Failed to access tolerance file {path}: {reason}")]
    FileAccess {
        /// The path to the tolerance file.
        path: String,
        /// The underlying I/O failure.
        reason: String,
    },

    /// The tolerance file did not parse as valid JSON
    #[error("Invalid tolerance file {path}: {reason}")]
    InvalidFormat {
        /// The path to the tolerance file.
        path: String,
        /// The reason the file failed to parse.
        reason: String,
    },

    /// A tolerance value is outside its valid range
    #[error("Tolerance '{name}' out of range: {value} (valid: {min}..{max})")]
    OutOfRange {
        /// The tolerance field name.
        name: String,
        /// The offending value.
        value: f64,
        /// Lower bound of the valid range.
        min: f64,
        /// Upper bound of the valid range.
        max: f64,
    },

    /// A band tolerance has min >= max
    #[error("Tolerance band '{name}' is empty: {min} >= {max}")]
    EmptyBand {
        /// The band field name.
        name: String,
        /// The configured lower edge.
        min: f64,
        /// The configured upper edge.
        max: f64,
    },
}

/// Main error type for discprobe
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Input error
    #[error(transparent)]
    Input(#[from] InputError),

    /// Tolerance configuration error
    #[error(transparent)]
    Tolerance(#[from] ToleranceError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is an input (API misuse) error
    pub fn is_input_error(&self) -> bool {
        matches!(self, Error::Input(_))
    }

    /// Check if this is a tolerance configuration error
    pub fn is_tolerance_error(&self) -> bool {
        matches!(self, Error::Tolerance(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
