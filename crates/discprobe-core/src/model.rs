//! Data model for the extraction pipeline
//!
//! The types here flow strictly forward through the five stages: raw text
//! becomes a [`NominalSpec`] and a stream of [`MotionEvent`]s, motions are
//! grouped into [`Pass`]es, passes yield candidate [`Feature`]s, and
//! reconciliation produces one immutable [`ExtractionResult`]. No stage
//! mutates an earlier stage's output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::units::{MeasurementSystem, SourceUnit};

/// Confidence tier attached to every derived value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Derived purely from a numeric-range fallback or a weak heuristic
    Low,
    /// Derived indirectly (cross-unit agreement, spec fallback)
    Medium,
    /// Explicit unit marker or unambiguous finishing-pass geometry
    High,
}

impl Confidence {
    /// Step a confidence tier down one level (used when a value is carried
    /// forward from spec only, with no measured confirmation)
    pub fn reduced(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

/// Which machining setup of a two-sided part a motion belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// First operation (initial chucking)
    Side1,
    /// Second operation (part flipped)
    Side2,
}

impl Side {
    /// The opposite side (a "flip part" annotation toggles)
    pub fn flipped(self) -> Self {
        match self {
            Self::Side1 => Self::Side2,
            Self::Side2 => Self::Side1,
        }
    }
}

impl Default for Side {
    fn default() -> Self {
        Self::Side1
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Side1 => write!(f, "side 1"),
            Self::Side2 => write!(f, "side 2"),
        }
    }
}

/// Recognized inline annotation markers
///
/// Any parenthetical text outside this vocabulary is inert commentary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    /// "this value is the center bore"
    CenterBore,
    /// "this value is the outer/hub diameter"
    HubDiameter,
    /// "this value is the outer diameter"
    OuterDiameter,
    /// "flip part": toggles the current side
    FlipPart,
    /// "operation 2" / "side 2": forces SIDE_2
    SecondOperation,
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CenterBore => write!(f, "center bore"),
            Self::HubDiameter => write!(f, "hub diameter"),
            Self::OuterDiameter => write!(f, "outer diameter"),
            Self::FlipPart => write!(f, "flip part"),
            Self::SecondOperation => write!(f, "operation 2"),
        }
    }
}

/// A single nominal dimension parsed from the title
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NominalValue {
    /// Magnitude normalized to millimeters
    pub value_mm: f64,
    /// The unit the token was written in
    pub unit: SourceUnit,
    /// How the token was disambiguated
    pub confidence: Confidence,
}

impl NominalValue {
    pub fn new(value_mm: f64, unit: SourceUnit, confidence: Confidence) -> Self {
        Self {
            value_mm,
            unit,
            confidence,
        }
    }
}

/// Designer-intended dimensions parsed from the free-text title
///
/// Created once per program, never mutated. Absent fields stay `None`;
/// the parser never defaults a dimension it could not read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NominalSpec {
    /// The raw title text the spec was parsed from
    pub title: String,
    pub outer_diameter: Option<NominalValue>,
    pub thickness: Option<NominalValue>,
    pub center_bore: Option<NominalValue>,
    pub hub_diameter: Option<NominalValue>,
    pub hub_height: Option<NominalValue>,
}

impl NominalSpec {
    /// True when no dimension at all could be read from the title
    pub fn is_empty(&self) -> bool {
        self.outer_diameter.is_none()
            && self.thickness.is_none()
            && self.center_bore.is_none()
            && self.hub_diameter.is_none()
            && self.hub_height.is_none()
    }
}

/// One normalized step of the toolpath
///
/// Produced in source order and never reordered; ordering is the basis for
/// side tracking and pass sequencing. Axis values are in the program's
/// working units with modal (sticky) retention already applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionEvent {
    /// Source line ordinal (0-based)
    pub sequence_index: usize,
    /// Rapid positioning as opposed to a controlled feed move
    pub is_rapid: bool,
    /// Diametral position (X word), if any axis value is in effect
    pub x_value: Option<f64>,
    /// Axial position (Z word); depth is its absolute value
    pub z_value: Option<f64>,
    /// Feed rate in effect for this move
    pub feed_rate: Option<f64>,
    /// Currently active tool identifier (e.g. a 3-digit code), if selected
    pub active_tool: Option<String>,
    /// Which face of the part the motion belongs to
    pub side: Side,
    /// Recognized annotation markers found on or adjacent to this line
    pub markers: Vec<Marker>,
}

impl MotionEvent {
    /// Axial depth of this move (absolute Z), if a Z value is in effect
    pub fn depth(&self) -> Option<f64> {
        self.z_value.map(f64::abs)
    }
}

/// A maximal contiguous run of motions sharing tool, side, and X target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pass {
    /// Tool active for the whole run
    pub tool: Option<String>,
    /// Side the run belongs to
    pub side: Side,
    /// The motions, in source order
    pub events: Vec<MotionEvent>,
    /// True for intermediate material-removal passes; the finishing pass
    /// that defines the real dimension carries `false`
    pub is_roughing: bool,
}

impl Pass {
    /// The diametral target of this pass (X of its feed motions)
    pub fn target_x(&self) -> Option<f64> {
        self.events
            .iter()
            .filter(|e| !e.is_rapid)
            .find_map(|e| e.x_value)
    }

    /// Deepest axial position reached by a feed motion in this pass
    pub fn max_depth(&self) -> Option<f64> {
        self.events
            .iter()
            .filter(|e| !e.is_rapid)
            .filter_map(MotionEvent::depth)
            .fold(None, |acc, d| Some(acc.map_or(d, |a: f64| a.max(d))))
    }

    /// Feed rate in effect for the pass's feed motions
    pub fn feed_rate(&self) -> Option<f64> {
        self.events
            .iter()
            .filter(|e| !e.is_rapid)
            .find_map(|e| e.feed_rate)
    }

    /// All annotation markers carried by the pass's motions
    pub fn markers(&self) -> Vec<Marker> {
        let mut markers: Vec<Marker> = self
            .events
            .iter()
            .flat_map(|e| e.markers.iter().copied())
            .collect();
        markers.dedup();
        markers
    }
}

/// Classified geometric feature kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    /// Through-hole bore (depth >= half the part thickness)
    Centerbore,
    /// Shallow pocket bore (depth < half the part thickness)
    Counterbore,
    /// Raised boss turned out of the face
    HubProfile,
    /// Outer-diameter turning cut
    OuterTurn,
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Centerbore => write!(f, "centerbore"),
            Self::Counterbore => write!(f, "counterbore"),
            Self::HubProfile => write!(f, "hub profile"),
            Self::OuterTurn => write!(f, "outer turn"),
        }
    }
}

/// A candidate classified feature
///
/// Several candidates per dimension may coexist until the reconciler picks
/// one; the rest survive as detection notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub feature_type: FeatureType,
    /// Diameter in working units
    pub diameter: f64,
    /// Axial depth (bores) or boss height (hubs), in working units
    pub depth_or_height: Option<f64>,
    pub side: Side,
    /// Tool that produced the finishing geometry
    pub source_tool: Option<String>,
    pub confidence: Confidence,
    /// Which rule fired, for auditability
    pub provenance: String,
}

/// Validation status tiers, ascending severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Measured matches spec within the tight tolerance
    Pass,
    /// Minor deviation, or only spec / only measured data available
    Warning,
    /// Inconsistent auxiliary dimension (e.g. mismatched program number,
    /// implausible magnitude mismatch)
    Dimensional,
    /// Bore outside the tight tolerance but inside the loose tolerance
    BoreWarning,
    /// Bore or outer dimension outside the loose tolerance, or a required
    /// dimension entirely unresolved
    Critical,
}

impl ValidationStatus {
    /// Merge two statuses, keeping the more severe
    pub fn escalate(self, other: Self) -> Self {
        self.max(other)
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Warning => write!(f, "WARNING"),
            Self::Dimensional => write!(f, "DIMENSIONAL"),
            Self::BoreWarning => write!(f, "BORE_WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// One reconciled dimension value with its audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionValue {
    /// Magnitude in millimeters
    pub value_mm: f64,
    pub confidence: Confidence,
    /// Which feature or spec entry this value traces to
    pub provenance: String,
}

impl DimensionValue {
    pub fn new(value_mm: f64, confidence: Confidence, provenance: impl Into<String>) -> Self {
        Self {
            value_mm,
            confidence,
            provenance: provenance.into(),
        }
    }
}

/// The final output of one program extraction
///
/// Immutable once produced and safe to serialize for an external
/// persistence layer. Every non-null value traces to a [`NominalSpec`]
/// entry or a [`Feature`]; the engine never fabricates a value without
/// provenance.
///
/// `id` and `extracted_at` are per-run record bookkeeping for the
/// persistence layer and differ between runs; every other field is a
/// pure function of the program text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Record key for the external persistence layer
    pub id: Uuid,
    /// When the extraction ran
    pub extracted_at: DateTime<Utc>,
    /// Program number from the O-number header, if one was found
    pub program_number: Option<String>,
    /// Working measurement system the program ran in
    pub working_units: MeasurementSystem,

    pub outer_diameter: Option<DimensionValue>,
    pub thickness: Option<DimensionValue>,
    pub center_bore: Option<DimensionValue>,
    pub counterbore_diameter: Option<DimensionValue>,
    pub counterbore_depth: Option<DimensionValue>,
    pub hub_diameter: Option<DimensionValue>,
    pub hub_height: Option<DimensionValue>,

    pub validation_status: ValidationStatus,
    /// Ordered human-readable trace of which rules fired and which
    /// interpretations lost
    pub detection_notes: Vec<String>,
}

impl ExtractionResult {
    /// An all-null result for input with no recognizable program header
    pub fn unparseable(note: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            extracted_at: Utc::now(),
            program_number: None,
            working_units: MeasurementSystem::default(),
            outer_diameter: None,
            thickness: None,
            center_bore: None,
            counterbore_diameter: None,
            counterbore_depth: None,
            hub_diameter: None,
            hub_height: None,
            validation_status: ValidationStatus::Critical,
            detection_notes: vec![note.into()],
        }
    }

    /// Iterate the seven dimension slots with their field names
    pub fn dimensions(&self) -> impl Iterator<Item = (&'static str, Option<&DimensionValue>)> {
        [
            ("outer_diameter", self.outer_diameter.as_ref()),
            ("thickness", self.thickness.as_ref()),
            ("center_bore", self.center_bore.as_ref()),
            ("counterbore_diameter", self.counterbore_diameter.as_ref()),
            ("counterbore_depth", self.counterbore_depth.as_ref()),
            ("hub_diameter", self.hub_diameter.as_ref()),
            ("hub_height", self.hub_height.as_ref()),
        ]
        .into_iter()
    }
}
