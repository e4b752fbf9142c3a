//! Title parser: nominal dimensions from free-text program headers
//!
//! Titles are authored by hand with no grammar: units are inconsistent,
//! leading zeros are dropped, and the same fragment can describe one
//! dimension in two units or two different dimensions. The parser works in
//! three sweeps over the title, consuming matched spans so later sweeps
//! never re-read a number:
//!
//! 1. dual-unit pairs (`8.7 IN / 220 MM`), disambiguated by cross-unit
//!    agreement within a tolerance
//! 2. unit-marked single values, including the dropped-leading-zero
//!    millimeter quirk (`.75MM` is an inch thickness, not 0.75 mm)
//! 3. bare numbers classified only by disjoint plausible ranges, as a
//!    last resort at LOW confidence

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use discprobe_core::model::{Confidence, NominalSpec, NominalValue};
use discprobe_core::tolerances::Tolerances;
use discprobe_core::units::{in_to_mm, SourceUnit};

/// Target slot a title token can be assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    OuterDiameter,
    Thickness,
    CenterBore,
    HubDiameter,
    HubHeight,
}

fn dual_pair_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(\d+(?:\.\d+)?)\s*(?:IN(?:CH)?\.?|")\s*/\s*(\d+(?:\.\d+)?)\s*MM"#)
            .expect("invalid regex pattern")
    })
}

fn bare_decimal_mm_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A decimal written without its leading zero, directly unit-marked MM.
    RE.get_or_init(|| Regex::new(r"(?i)(?:^|[^0-9.])(\.\d+)\s*MM").expect("invalid regex pattern"))
}

fn inch_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(\d+(?:\.\d+)?|\.\d+)\s*(?:IN(?:CH)?\.?|")"#)
            .expect("invalid regex pattern")
    })
}

fn mm_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*MM").expect("invalid regex pattern"))
}

fn bare_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?|\.\d+)").expect("invalid regex pattern"))
}

/// Tracks which byte spans of the title have already been claimed
struct SpanMask {
    claimed: Vec<(usize, usize)>,
}

impl SpanMask {
    fn new() -> Self {
        Self { claimed: Vec::new() }
    }

    fn overlaps(&self, start: usize, end: usize) -> bool {
        self.claimed.iter().any(|&(s, e)| start < e && end > s)
    }

    fn claim(&mut self, start: usize, end: usize) {
        self.claimed.push((start, end));
    }
}

/// Look for a slot keyword in the text surrounding a token
///
/// Shop titles tag values with terse abbreviations ("CB", "THK", "HUB").
/// The window is small so a keyword for one value cannot capture another.
fn keyword_near(title: &str, start: usize, end: usize) -> Option<Slot> {
    let window_start = start.saturating_sub(12);
    let window_end = (end + 12).min(title.len());
    let mut before = title[window_start..start].to_uppercase();
    let mut after = title[end..window_end].to_uppercase();

    // A keyword only tags the value it is adjacent to: never look past the
    // next (or previous) number in the title.
    if let Some(pos) = after.find(|c: char| c.is_ascii_digit()) {
        after.truncate(pos);
    }
    if let Some(pos) = before.rfind(|c: char| c.is_ascii_digit()) {
        before.drain(..=pos);
    }

    // Keywords are written postfix ("72.6MM CB"), so the trailing window is
    // authoritative; the leading window is only a fallback, otherwise a
    // keyword between two numbers would bind to both.
    for window in [&after, &before] {
        let hit = if window.contains("HUB HT") || window.contains("HUB HEIGHT") {
            Some(Slot::HubHeight)
        } else if window.contains("HUB") {
            Some(Slot::HubDiameter)
        } else if window.contains("C.B") || window.contains("CB") || window.contains("BORE") {
            Some(Slot::CenterBore)
        } else if window.contains("THK") || window.contains("THICK") {
            Some(Slot::Thickness)
        } else if window.contains("O.D") || window.contains("OD") || window.contains("DIA") {
            Some(Slot::OuterDiameter)
        } else {
            None
        };
        if hit.is_some() {
            return hit;
        }
    }
    None
}

/// Classify an unmarked millimeter magnitude by plausible range
fn classify_by_range(value_mm: f64, tolerances: &Tolerances) -> Option<Slot> {
    if tolerances.od_range_mm.contains(value_mm) {
        Some(Slot::OuterDiameter)
    } else if tolerances.bore_range_mm.contains(value_mm) {
        Some(Slot::CenterBore)
    } else if tolerances.thickness_range_mm.contains(value_mm) {
        Some(Slot::Thickness)
    } else {
        None
    }
}

/// Assign a value into a spec slot, keeping the higher-confidence entry
/// when the same slot is matched twice
fn assign(spec: &mut NominalSpec, slot: Slot, value: NominalValue) {
    let target = match slot {
        Slot::OuterDiameter => &mut spec.outer_diameter,
        Slot::Thickness => &mut spec.thickness,
        Slot::CenterBore => &mut spec.center_bore,
        Slot::HubDiameter => &mut spec.hub_diameter,
        Slot::HubHeight => &mut spec.hub_height,
    };
    match target {
        Some(existing) if existing.confidence >= value.confidence => {}
        _ => *target = Some(value),
    }
}

/// Parse the free-text title into a [`NominalSpec`]
///
/// Fails softly: a title with no readable dimensions yields a spec whose
/// fields are all `None`, never defaults.
pub fn parse_title(title: &str, tolerances: &Tolerances) -> NominalSpec {
    let mut spec = NominalSpec {
        title: title.to_string(),
        ..NominalSpec::default()
    };
    let mut mask = SpanMask::new();

    // Sweep 1: dual inch/mm pairs.
    for caps in dual_pair_regex().captures_iter(title) {
        let whole = caps.get(0).expect("capture 0 always present");
        let (Ok(inches), Ok(mm)) = (caps[1].parse::<f64>(), caps[2].parse::<f64>()) else {
            continue;
        };
        mask.claim(whole.start(), whole.end());

        let inch_as_mm = in_to_mm(inches);
        if (inch_as_mm - mm).abs() <= tolerances.dual_unit_tolerance_mm {
            // One outer-diameter-class dimension stated twice; the inch
            // figure carries more precision.
            debug!(inches, mm, "dual-unit pair agrees; single outer diameter");
            assign(
                &mut spec,
                Slot::OuterDiameter,
                NominalValue::new(inch_as_mm, SourceUnit::Inch, Confidence::Medium),
            );
        } else {
            // Two different dimensions: the inch figure is the center
            // bore, the mm figure the outer/hub diameter.
            debug!(inches, mm, "dual-unit pair disagrees; bore + diameter");
            assign(
                &mut spec,
                Slot::CenterBore,
                NominalValue::new(inch_as_mm, SourceUnit::Inch, Confidence::Medium),
            );
            let diameter_slot = if spec.outer_diameter.is_none() {
                Slot::OuterDiameter
            } else {
                Slot::HubDiameter
            };
            assign(
                &mut spec,
                diameter_slot,
                NominalValue::new(mm, SourceUnit::Millimeter, Confidence::Medium),
            );
        }
    }

    // Sweep 2a: dropped-leading-zero decimals marked MM. Read as 0.NN mm
    // the part would be foil; read as whole mm it would be absurdly thick
    // for the slot it describes. The author meant inches.
    for caps in bare_decimal_mm_regex().captures_iter(title) {
        let token = caps.get(1).expect("group 1 always present");
        if mask.overlaps(token.start(), token.end()) {
            continue;
        }
        let Ok(inches) = token.as_str().parse::<f64>() else {
            continue;
        };
        let whole = caps.get(0).expect("capture 0 always present");
        mask.claim(token.start(), whole.end());
        debug!(token = token.as_str(), "leading-zero-less MM token read as inches");
        assign(
            &mut spec,
            Slot::Thickness,
            NominalValue::new(in_to_mm(inches), SourceUnit::Inch, Confidence::Medium),
        );
    }

    // Sweep 2b: explicitly unit-marked values.
    for caps in inch_regex().captures_iter(title) {
        let whole = caps.get(0).expect("capture 0 always present");
        let token = caps.get(1).expect("group 1 always present");
        if mask.overlaps(whole.start(), whole.end()) {
            continue;
        }
        let Ok(inches) = token.as_str().parse::<f64>() else {
            continue;
        };
        mask.claim(whole.start(), whole.end());
        let value_mm = in_to_mm(inches);
        let slot = keyword_near(title, whole.start(), whole.end())
            .or_else(|| classify_by_range(value_mm, tolerances));
        if let Some(slot) = slot {
            assign(
                &mut spec,
                slot,
                NominalValue::new(value_mm, SourceUnit::Inch, Confidence::High),
            );
        }
    }
    for caps in mm_regex().captures_iter(title) {
        let whole = caps.get(0).expect("capture 0 always present");
        let token = caps.get(1).expect("group 1 always present");
        if mask.overlaps(whole.start(), whole.end()) {
            continue;
        }
        let Ok(mm) = token.as_str().parse::<f64>() else {
            continue;
        };
        mask.claim(whole.start(), whole.end());
        let slot = keyword_near(title, whole.start(), whole.end())
            .or_else(|| classify_by_range(mm, tolerances));
        if let Some(slot) = slot {
            assign(
                &mut spec,
                slot,
                NominalValue::new(mm, SourceUnit::Millimeter, Confidence::High),
            );
        }
    }

    // Sweep 3: bare numbers, range fallback only.
    for caps in bare_number_regex().captures_iter(title) {
        let token = caps.get(0).expect("capture 0 always present");
        if mask.overlaps(token.start(), token.end()) {
            continue;
        }
        let Ok(value) = token.as_str().parse::<f64>() else {
            continue;
        };
        // Keyword proximity still helps an unmarked number; range fallback
        // assumes millimeters, the dominant system in these titles.
        let slot = keyword_near(title, token.start(), token.end())
            .or_else(|| classify_by_range(value, tolerances));
        if let Some(slot) = slot {
            mask.claim(token.start(), token.end());
            assign(
                &mut spec,
                slot,
                NominalValue::new(value, SourceUnit::Unmarked, Confidence::Low),
            );
        }
    }

    spec
}
