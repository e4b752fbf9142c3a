//! Reconciler: nominal spec + candidate features -> one validated result
//!
//! The last, pure stage. Candidate features per dimension are resolved by
//! a spec-aware reducer: nearest-to-nominal beats any largest-value or
//! last-value heuristic, spec values stand in (at reduced confidence) when
//! geometry is silent, and every losing interpretation lands in the
//! detection notes. The validation status is computed once from the full
//! set of field comparisons.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use discprobe_core::model::{
    Confidence, DimensionValue, ExtractionResult, FeatureType, NominalSpec, NominalValue,
    ValidationStatus,
};
use discprobe_core::tolerances::Tolerances;
use discprobe_core::units::{system_to_mm, MeasurementSystem};
use uuid::Uuid;

use crate::features::FeatureSet;

/// A measured candidate for one dimension, normalized to millimeters
#[derive(Debug, Clone)]
struct Candidate {
    value_mm: f64,
    confidence: Confidence,
    provenance: String,
}

fn title_onumber_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bO(\d{3,6})\b").expect("invalid regex pattern"))
}

/// Pick one candidate: highest confidence tier first, then nearest to the
/// nominal value when one exists, then latest in source order. Losers are
/// reported through `notes`.
fn select(
    field: &str,
    mut candidates: Vec<Candidate>,
    nominal: Option<&NominalValue>,
    notes: &mut Vec<String>,
) -> Option<Candidate> {
    if candidates.is_empty() {
        return None;
    }
    let top = candidates
        .iter()
        .map(|c| c.confidence)
        .max()
        .expect("non-empty candidates");
    for c in candidates.iter().filter(|c| c.confidence < top) {
        notes.push(format!(
            "{}: candidate {:.3} ({}) not selected",
            field, c.value_mm, c.provenance
        ));
    }
    candidates.retain(|c| c.confidence == top);

    let winner_index = match nominal {
        Some(n) if candidates.len() > 1 => candidates
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let da = (a.value_mm - n.value_mm).abs();
                let db = (b.value_mm - n.value_mm).abs();
                da.partial_cmp(&db).expect("finite distances")
            })
            .map(|(i, _)| i)
            .expect("non-empty candidates"),
        _ => candidates.len() - 1,
    };

    for (i, c) in candidates.iter().enumerate() {
        if i != winner_index {
            notes.push(format!(
                "{}: candidate {:.3} ({}) not selected",
                field, c.value_mm, c.provenance
            ));
        }
    }
    Some(candidates.swap_remove(winner_index))
}

/// Resolve one dimension slot from its candidates and nominal entry
fn resolve(
    field: &str,
    candidates: Vec<Candidate>,
    nominal: Option<&NominalValue>,
    notes: &mut Vec<String>,
) -> Option<DimensionValue> {
    if let Some(winner) = select(field, candidates, nominal, notes) {
        notes.push(format!(
            "{} = {:.3} ({})",
            field, winner.value_mm, winner.provenance
        ));
        return Some(DimensionValue::new(
            winner.value_mm,
            winner.confidence,
            winner.provenance,
        ));
    }
    if let Some(n) = nominal {
        notes.push(format!(
            "{} = {:.3} from title only, no measured geometry",
            field, n.value_mm
        ));
        return Some(DimensionValue::new(
            n.value_mm,
            n.confidence.reduced(),
            format!("title nominal ({})", n.unit),
        ));
    }
    None
}

/// Compare one nominal/measured pair and report the resulting severity
fn compare_dimension(
    field: &str,
    nominal: Option<&NominalValue>,
    measured: Option<&DimensionValue>,
    is_bore_class: bool,
    tolerances: &Tolerances,
    notes: &mut Vec<String>,
) -> ValidationStatus {
    match (nominal, measured) {
        (Some(n), Some(m)) => {
            // The measured slot may itself be the nominal fallback; that
            // is one-sided data, not agreement.
            if m.provenance.starts_with("title nominal") {
                return ValidationStatus::Warning;
            }
            let (lo, hi) = if n.value_mm < m.value_mm {
                (n.value_mm, m.value_mm)
            } else {
                (m.value_mm, n.value_mm)
            };
            if lo > 0.0 && hi / lo > tolerances.typo_ratio {
                // Implausibly large margin: a stated-value typo, not a
                // machining deviation. Surface it, never pick silently.
                notes.push(format!(
                    "{}: stated {:.3} vs measured {:.3} is a magnitude mismatch, \
                     suspected title typo",
                    field, n.value_mm, m.value_mm
                ));
                return ValidationStatus::Dimensional;
            }
            let diff = (n.value_mm - m.value_mm).abs();
            if diff <= tolerances.tight_tolerance_mm {
                ValidationStatus::Pass
            } else if diff <= tolerances.loose_tolerance_mm {
                notes.push(format!(
                    "{}: measured {:.3} deviates {:.3} from stated {:.3}",
                    field, m.value_mm, diff, n.value_mm
                ));
                if is_bore_class {
                    ValidationStatus::BoreWarning
                } else {
                    ValidationStatus::Warning
                }
            } else {
                notes.push(format!(
                    "{}: measured {:.3} outside loose tolerance of stated {:.3}",
                    field, m.value_mm, n.value_mm
                ));
                ValidationStatus::Critical
            }
        }
        (Some(_), None) | (None, Some(_)) => ValidationStatus::Warning,
        (None, None) => ValidationStatus::Pass,
    }
}

/// Merge nominal spec and candidate features into the final result
pub fn reconcile(
    spec: &NominalSpec,
    feature_set: &FeatureSet,
    program_number: Option<String>,
    units: MeasurementSystem,
    tolerances: &Tolerances,
) -> ExtractionResult {
    let mut notes = feature_set.notes.clone();

    let candidates_of = |wanted: FeatureType| -> Vec<Candidate> {
        feature_set
            .features
            .iter()
            .filter(|f| f.feature_type == wanted)
            .map(|f| Candidate {
                value_mm: system_to_mm(f.diameter, units),
                confidence: f.confidence,
                provenance: f.provenance.clone(),
            })
            .collect()
    };
    let depths_of = |wanted: FeatureType| -> Vec<Candidate> {
        feature_set
            .features
            .iter()
            .filter(|f| f.feature_type == wanted)
            .filter_map(|f| {
                f.depth_or_height.map(|d| Candidate {
                    value_mm: system_to_mm(d, units),
                    confidence: f.confidence,
                    provenance: f.provenance.clone(),
                })
            })
            .collect()
    };

    let outer_diameter = resolve(
        "outer_diameter",
        candidates_of(FeatureType::OuterTurn),
        spec.outer_diameter.as_ref(),
        &mut notes,
    );
    let center_bore = resolve(
        "center_bore",
        candidates_of(FeatureType::Centerbore),
        spec.center_bore.as_ref(),
        &mut notes,
    );
    let counterbore_diameter = resolve(
        "counterbore_diameter",
        candidates_of(FeatureType::Counterbore),
        None,
        &mut notes,
    );
    let counterbore_depth = resolve(
        "counterbore_depth",
        depths_of(FeatureType::Counterbore),
        None,
        &mut notes,
    );
    let hub_diameter = resolve(
        "hub_diameter",
        candidates_of(FeatureType::HubProfile),
        spec.hub_diameter.as_ref(),
        &mut notes,
    );
    let hub_height = resolve(
        "hub_height",
        depths_of(FeatureType::HubProfile),
        spec.hub_height.as_ref(),
        &mut notes,
    );

    let thickness_candidates = feature_set
        .measured_thickness
        .map(|t| {
            vec![Candidate {
                value_mm: system_to_mm(t, units),
                confidence: Confidence::Low,
                provenance: "estimated from outer-turn travel".to_string(),
            }]
        })
        .unwrap_or_default();
    let thickness = resolve(
        "thickness",
        thickness_candidates,
        spec.thickness.as_ref(),
        &mut notes,
    );

    // Status is computed once here from the full comparison set.
    let mut status = ValidationStatus::Pass;
    status = status.escalate(compare_dimension(
        "outer_diameter",
        spec.outer_diameter.as_ref(),
        outer_diameter.as_ref(),
        false,
        tolerances,
        &mut notes,
    ));
    status = status.escalate(compare_dimension(
        "center_bore",
        spec.center_bore.as_ref(),
        center_bore.as_ref(),
        true,
        tolerances,
        &mut notes,
    ));
    status = status.escalate(compare_dimension(
        "thickness",
        spec.thickness.as_ref(),
        thickness.as_ref(),
        false,
        tolerances,
        &mut notes,
    ));
    status = status.escalate(compare_dimension(
        "hub_diameter",
        spec.hub_diameter.as_ref(),
        hub_diameter.as_ref(),
        false,
        tolerances,
        &mut notes,
    ));

    // Required dimensions entirely unresolved is a critical condition.
    for (field, value) in [
        ("outer_diameter", outer_diameter.as_ref()),
        ("center_bore", center_bore.as_ref()),
    ] {
        if value.is_none() {
            notes.push(format!("required dimension {} unresolved", field));
            status = status.escalate(ValidationStatus::Critical);
        }
    }

    // Auxiliary consistency: a program number restated in the title must
    // match the O-number header.
    if let (Some(header), Some(caps)) = (
        program_number.as_deref(),
        title_onumber_regex().captures(&spec.title),
    ) {
        let stated = &caps[1];
        if stated.trim_start_matches('0') != header.trim_start_matches('0') {
            notes.push(format!(
                "title states program O{} but header is O{}",
                stated, header
            ));
            status = status.escalate(ValidationStatus::Dimensional);
        }
    }

    debug!(%status, notes = notes.len(), "reconciled");

    ExtractionResult {
        id: Uuid::new_v4(),
        extracted_at: chrono::Utc::now(),
        program_number,
        working_units: units,
        outer_diameter,
        thickness,
        center_bore,
        counterbore_diameter,
        counterbore_depth,
        hub_diameter,
        hub_height,
        validation_status: status,
        detection_notes: notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discprobe_core::model::{Feature, Side};
    use discprobe_core::units::SourceUnit;

    fn nominal(v: f64) -> NominalValue {
        NominalValue::new(v, SourceUnit::Millimeter, Confidence::High)
    }

    fn bore(diameter: f64, confidence: Confidence, provenance: &str) -> Feature {
        Feature {
            feature_type: FeatureType::Centerbore,
            diameter,
            depth_or_height: Some(18.0),
            side: Side::Side1,
            source_tool: Some("0101".to_string()),
            confidence,
            provenance: provenance.to_string(),
        }
    }

    fn run(spec: NominalSpec, features: Vec<Feature>) -> ExtractionResult {
        let set = FeatureSet {
            features,
            notes: vec![],
            measured_thickness: None,
        };
        reconcile(
            &spec,
            &set,
            Some("1234".to_string()),
            MeasurementSystem::Metric,
            &Tolerances::default(),
        )
    }

    fn spec_cb(v: f64) -> NominalSpec {
        NominalSpec {
            title: String::new(),
            center_bore: Some(nominal(v)),
            ..NominalSpec::default()
        }
    }

    #[test]
    fn test_spec_aware_selection_beats_magnitude() {
        // Two candidates; the larger one is NOT nearest to spec and must
        // lose despite being larger and later.
        let result = run(
            spec_cb(72.6),
            vec![
                bore(72.69, Confidence::High, "finishing-pass bore candidate"),
                bore(78.2, Confidence::High, "unclassified bore candidate"),
            ],
        );
        let cb = result.center_bore.expect("center bore");
        assert!((cb.value_mm - 72.69).abs() < 1e-9);
        assert!(result
            .detection_notes
            .iter()
            .any(|n| n.contains("78.200") && n.contains("not selected")));
    }

    #[test]
    fn test_lower_confidence_loser_is_noted() {
        // A candidate dropped for being in a lower confidence tier still
        // belongs to the audit trail.
        let result = run(
            spec_cb(72.6),
            vec![
                bore(72.69, Confidence::High, "finishing-pass bore"),
                bore(68.0, Confidence::Low, "unclassified bore candidate"),
            ],
        );
        let cb = result.center_bore.expect("center bore");
        assert!((cb.value_mm - 72.69).abs() < 1e-9);
        assert!(result
            .detection_notes
            .iter()
            .any(|n| n.contains("68.000") && n.contains("not selected")));
    }

    #[test]
    fn test_spec_fallback_at_reduced_confidence() {
        let result = run(spec_cb(72.6), vec![]);
        let cb = result.center_bore.expect("center bore");
        assert_eq!(cb.value_mm, 72.6);
        assert_eq!(cb.confidence, Confidence::Medium);
        assert!(cb.provenance.contains("title nominal"));
        // One-sided data can never be a full PASS.
        assert!(result.validation_status >= ValidationStatus::Warning);
    }

    #[test]
    fn test_pass_status_within_tight_tolerance() {
        let mut spec = spec_cb(72.6);
        spec.outer_diameter = Some(nominal(283.0));
        let mut features = vec![bore(72.69, Confidence::High, "finishing-pass bore")];
        features.push(Feature {
            feature_type: FeatureType::OuterTurn,
            diameter: 283.1,
            depth_or_height: Some(22.0),
            side: Side::Side1,
            source_tool: Some("0202".to_string()),
            confidence: Confidence::High,
            provenance: "finishing outer turn".to_string(),
        });
        let result = run(spec, features);
        assert_eq!(result.validation_status, ValidationStatus::Pass);
    }

    #[test]
    fn test_bore_warning_between_tight_and_loose() {
        let result = run(
            spec_cb(72.6),
            vec![bore(74.0, Confidence::High, "finishing-pass bore")],
        );
        // 1.4 mm off: more than tight (0.5), less than loose (2.5). The
        // missing outer diameter escalates to CRITICAL, so check notes.
        assert!(result
            .detection_notes
            .iter()
            .any(|n| n.contains("deviates")));
    }

    #[test]
    fn test_bore_outside_loose_is_critical() {
        let mut spec = spec_cb(72.6);
        spec.outer_diameter = Some(nominal(283.0));
        let mut features = vec![bore(77.0, Confidence::High, "finishing-pass bore")];
        features.push(Feature {
            feature_type: FeatureType::OuterTurn,
            diameter: 283.0,
            depth_or_height: Some(22.0),
            side: Side::Side1,
            source_tool: None,
            confidence: Confidence::High,
            provenance: "finishing outer turn".to_string(),
        });
        let result = run(spec, features);
        assert_eq!(result.validation_status, ValidationStatus::Critical);
    }

    #[test]
    fn test_typo_magnitude_mismatch_is_surfaced() {
        // Stated 4.9 vs measured 120.6: a typo, not a deviation. Must be
        // flagged with a note, not silently resolved either way.
        let result = run(
            spec_cb(4.9),
            vec![bore(120.6, Confidence::High, "finishing-pass bore")],
        );
        assert!(result.validation_status >= ValidationStatus::Dimensional);
        assert!(result
            .detection_notes
            .iter()
            .any(|n| n.contains("magnitude mismatch")));
    }

    #[test]
    fn test_unresolved_required_dimension_is_critical() {
        let result = run(NominalSpec::default(), vec![]);
        assert_eq!(result.validation_status, ValidationStatus::Critical);
        assert!(result
            .detection_notes
            .iter()
            .any(|n| n.contains("required dimension")));
    }

    #[test]
    fn test_program_number_mismatch_is_dimensional() {
        let mut spec = spec_cb(72.6);
        spec.title = "ROTOR O5678 72.6 CB".to_string();
        spec.outer_diameter = Some(nominal(283.0));
        let mut features = vec![bore(72.6, Confidence::High, "finishing-pass bore")];
        features.push(Feature {
            feature_type: FeatureType::OuterTurn,
            diameter: 283.0,
            depth_or_height: Some(22.0),
            side: Side::Side1,
            source_tool: None,
            confidence: Confidence::High,
            provenance: "finishing outer turn".to_string(),
        });
        let result = run(spec, features);
        assert_eq!(result.validation_status, ValidationStatus::Dimensional);
        assert!(result
            .detection_notes
            .iter()
            .any(|n| n.contains("O5678")));
    }

    #[test]
    fn test_provenance_invariant() {
        let result = run(
            spec_cb(72.6),
            vec![bore(72.69, Confidence::High, "finishing-pass bore")],
        );
        for (field, value) in result.dimensions() {
            if value.is_some() {
                assert!(
                    result.detection_notes.iter().any(|n| n.contains(field)),
                    "no note references {}",
                    field
                );
            }
        }
    }
}
