//! Feature classifier: from classified passes to candidate features
//!
//! Walks each tool/side group and turns its finishing geometry into
//! candidate [`Feature`]s: bores split into centerbore vs counterbore by
//! depth ratio, hub profiles recovered from the facing/hub-rough
//! oscillation pattern, and outer-diameter turns. Inline markers take
//! precedence, but only after validation against the nominal spec; a
//! marker that disagrees with spec and sits at chamfer depth marks an
//! adjacent shallow pocket, not the main bore.

use tracing::debug;

use discprobe_core::model::{Confidence, Feature, FeatureType, Marker, NominalSpec, Side};
use discprobe_core::tolerances::Tolerances;
use discprobe_core::units::{mm_to_system, system_to_mm, MeasurementSystem};

use crate::passes::ToolGroup;

/// Output of feature classification
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub features: Vec<Feature>,
    /// Audit trail of fired and rejected rules, in evaluation order
    pub notes: Vec<String>,
    /// Thickness inferred from outer-turn axial travel (working units),
    /// available when the title gave none
    pub measured_thickness: Option<f64>,
}

/// One hub-roughing oscillation cycle: the small-diameter position and
/// the axial depth it was cut at
#[derive(Debug, Clone, Copy)]
struct HubCycle {
    small_x: f64,
    depth: f64,
}

/// Detect the facing/hub-rough oscillation in a group's feed motions
///
/// The signature is a move at a large diameter immediately followed by a
/// markedly smaller one, repeated across depth-increasing cycles with a
/// consistent axial step. Isolated outlier steps are tolerated via a
/// majority-of-steps rule; cycles shallower than the chamfer threshold
/// are excluded from both the diameter minimum and the depth maximum.
fn detect_hub_profile(group: &ToolGroup, tolerances: &Tolerances) -> Option<(Feature, String)> {
    let feed_events: Vec<_> = group
        .passes
        .iter()
        .flat_map(|p| p.events.iter())
        .filter(|e| !e.is_rapid)
        .collect();

    let mut cycles: Vec<HubCycle> = Vec::new();
    for pair in feed_events.windows(2) {
        let (Some(x0), Some(x1)) = (pair[0].x_value, pair[1].x_value) else {
            continue;
        };
        if x0 - x1 >= tolerances.hub_diameter_drop_min {
            if let Some(depth) = pair[1].depth() {
                cycles.push(HubCycle {
                    small_x: x1,
                    depth,
                });
            }
        }
    }
    if cycles.len() < 2 {
        return None;
    }

    let qualifying: Vec<HubCycle> = cycles
        .iter()
        .copied()
        .filter(|c| c.depth >= tolerances.chamfer_depth)
        .collect();
    let filtered = cycles.len() - qualifying.len();
    if qualifying.len() < 2 {
        return None;
    }

    // Depth must walk downward cycle over cycle, in consistent steps.
    let steps: Vec<f64> = qualifying
        .windows(2)
        .map(|w| w[1].depth - w[0].depth)
        .collect();
    let in_band = steps
        .iter()
        .filter(|s| **s > 0.0 && tolerances.roughing_step.contains(**s))
        .count();
    if (in_band as f64) < tolerances.hub_step_majority * steps.len() as f64 {
        return None;
    }

    let min_small_x = qualifying
        .iter()
        .map(|c| c.small_x)
        .fold(f64::INFINITY, f64::min);
    let max_depth = qualifying
        .iter()
        .map(|c| c.depth)
        .fold(f64::NEG_INFINITY, f64::max);

    let provenance = format!(
        "from oscillation pattern on {}, {} cycles, filtered {} shallow",
        group.side,
        qualifying.len(),
        filtered
    );
    debug!(
        tool = ?group.tool,
        cycles = qualifying.len(),
        filtered,
        "hub profile detected"
    );
    let feature = Feature {
        feature_type: FeatureType::HubProfile,
        diameter: min_small_x - tolerances.roughing_allowance,
        depth_or_height: Some(max_depth),
        side: group.side,
        source_tool: group.tool.clone(),
        confidence: Confidence::Medium,
        provenance: provenance.clone(),
    };
    Some((feature, provenance))
}

/// Split a bore candidate into centerbore vs counterbore by depth ratio
///
/// Through-features reach at least half the part thickness. With no
/// thickness available at all the classification degrades to LOW
/// confidence, surfaced in the notes.
fn bore_type(
    depth: Option<f64>,
    thickness: Option<f64>,
    units: MeasurementSystem,
    tolerances: &Tolerances,
) -> (FeatureType, Confidence) {
    match (depth, thickness) {
        (Some(d), Some(t)) if t > 0.0 => {
            if d / t >= 0.5 {
                (FeatureType::Centerbore, Confidence::High)
            } else {
                (FeatureType::Counterbore, Confidence::High)
            }
        }
        (Some(d), None) => {
            // No thickness anywhere; a cut at least as deep as the
            // thinnest plausible part is still plausibly through.
            if system_to_mm(d, units) >= tolerances.thickness_range_mm.min {
                (FeatureType::Centerbore, Confidence::Low)
            } else {
                (FeatureType::Counterbore, Confidence::Low)
            }
        }
        _ => (FeatureType::Counterbore, Confidence::Low),
    }
}

/// Validate an explicit bore/hub marker against the nominal spec
///
/// Returns `true` when the marked value can be trusted as the main
/// dimension: it agrees with spec within the marker tolerance, or it was
/// cut at full depth rather than a chamfer touch.
fn marker_is_valid(
    value: f64,
    nominal_wu: Option<f64>,
    depth: Option<f64>,
    tolerances: &Tolerances,
) -> bool {
    let agrees = nominal_wu.is_none_or(|n| (value - n).abs() <= tolerances.marker_tolerance);
    let deep = depth.is_some_and(|d| d >= tolerances.chamfer_depth);
    agrees || deep
}

/// Classify every group's candidate passes into features
pub fn classify_features(
    groups: &[ToolGroup],
    spec: &NominalSpec,
    units: MeasurementSystem,
    tolerances: &Tolerances,
) -> FeatureSet {
    let mut set = FeatureSet::default();

    let nominal_thickness_wu = spec.thickness.map(|t| mm_to_system(t.value_mm, units));
    let nominal_bore_wu = spec.center_bore.map(|b| mm_to_system(b.value_mm, units));
    let nominal_hub_wu = spec.hub_diameter.map(|h| mm_to_system(h.value_mm, units));

    // First sweep: hub profiles and outer turns. Outer-turn axial travel
    // doubles as a thickness estimate, which the bore ratio rule needs
    // when the title gave no thickness.
    let mut hub_groups: Vec<usize> = Vec::new();
    for (gi, group) in groups.iter().enumerate() {
        if let Some((feature, _)) = detect_hub_profile(group, tolerances) {
            set.notes.push(format!(
                "hub profile {:.3} x {:.3} {}",
                feature.diameter,
                feature.depth_or_height.unwrap_or_default(),
                feature.provenance
            ));
            set.features.push(feature);
            hub_groups.push(gi);
            continue;
        }

        let group_had_roughing = group.passes.iter().any(|p| p.is_roughing);
        for pass in group.candidate_passes() {
            let Some(x) = pass.target_x() else { continue };
            let x_mm = system_to_mm(x, units);
            if tolerances.od_range_mm.contains(x_mm)
                && pass
                    .max_depth()
                    .is_some_and(|d| d >= tolerances.chamfer_depth)
            {
                let confidence = if group_had_roughing {
                    Confidence::High
                } else {
                    Confidence::Medium
                };
                set.features.push(Feature {
                    feature_type: FeatureType::OuterTurn,
                    diameter: x,
                    depth_or_height: pass.max_depth(),
                    side: pass.side,
                    source_tool: pass.tool.clone(),
                    confidence,
                    provenance: format!("finishing outer turn on {}", pass.side),
                });
            }
        }
    }

    // Thickness estimate: an OD turn runs the axial length of the part.
    let od_depth = set
        .features
        .iter()
        .filter(|f| f.feature_type == FeatureType::OuterTurn)
        .filter_map(|f| f.depth_or_height)
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));
    if let Some(d) = od_depth {
        set.measured_thickness = Some(d);
        set.notes
            .push(format!("thickness {:.3} estimated from outer-turn travel", d));
    }
    let thickness_wu = nominal_thickness_wu.or(set.measured_thickness);

    // Second sweep: bores, with explicit-marker precedence.
    for (gi, group) in groups.iter().enumerate() {
        if hub_groups.contains(&gi) {
            continue;
        }
        let group_had_roughing = group.passes.iter().any(|p| p.is_roughing);
        let group_depth = group
            .passes
            .iter()
            .filter_map(|p| p.max_depth())
            .fold(None, |acc: Option<f64>, d| {
                Some(acc.map_or(d, |a| a.max(d)))
            });

        for pass in group.candidate_passes() {
            let Some(x) = pass.target_x() else { continue };
            let x_mm = system_to_mm(x, units);
            let depth = pass.max_depth();
            // In a roughed group every pass walks toward one feature, so
            // the full progression depth is the feature depth even when
            // the finishing cut itself only kisses the chamfer.
            let depth_for_type = if group_had_roughing { group_depth } else { depth };
            let markers = pass.markers();

            if markers.contains(&Marker::CenterBore) {
                if marker_is_valid(x, nominal_bore_wu, depth, tolerances) {
                    let (feature_type, _) =
                        bore_type(depth_for_type, thickness_wu, units, tolerances);
                    set.features.push(Feature {
                        feature_type,
                        diameter: x,
                        depth_or_height: depth,
                        side: pass.side,
                        source_tool: pass.tool.clone(),
                        confidence: Confidence::High,
                        provenance: format!("from explicit marker on {}", pass.side),
                    });
                    set.notes.push(format!(
                        "center bore {:.3} from explicit marker on {}",
                        x, pass.side
                    ));
                    continue;
                }
                // Disagrees with spec and sits at chamfer depth: the
                // author marked an adjacent shallow pocket.
                set.notes.push(format!(
                    "marker value {:.3} disagrees with nominal {:.3} at chamfer depth; \
                     treated as adjacent pocket, not the main bore",
                    x,
                    nominal_bore_wu.unwrap_or_default()
                ));
                set.features.push(Feature {
                    feature_type: FeatureType::Counterbore,
                    diameter: x,
                    depth_or_height: depth,
                    side: pass.side,
                    source_tool: pass.tool.clone(),
                    confidence: Confidence::Low,
                    provenance: format!("rejected bore marker on {}", pass.side),
                });
                continue;
            }

            if markers.contains(&Marker::HubDiameter) {
                if marker_is_valid(x, nominal_hub_wu, depth, tolerances) {
                    set.features.push(Feature {
                        feature_type: FeatureType::HubProfile,
                        diameter: x,
                        depth_or_height: depth,
                        side: pass.side,
                        source_tool: pass.tool.clone(),
                        confidence: Confidence::High,
                        provenance: format!("from explicit hub marker on {}", pass.side),
                    });
                    set.notes
                        .push(format!("hub diameter {:.3} from explicit marker", x));
                    continue;
                }
                set.notes.push(format!(
                    "hub marker value {:.3} failed validation; ignored",
                    x
                ));
                continue;
            }

            if markers.contains(&Marker::OuterDiameter) {
                set.features.push(Feature {
                    feature_type: FeatureType::OuterTurn,
                    diameter: x,
                    depth_or_height: depth,
                    side: pass.side,
                    source_tool: pass.tool.clone(),
                    confidence: Confidence::High,
                    provenance: format!("from explicit marker on {}", pass.side),
                });
                continue;
            }

            // Unmarked geometry: classify by plausible diameter range.
            if tolerances.bore_range_mm.contains(x_mm) {
                let (feature_type, type_confidence) =
                    bore_type(depth_for_type, thickness_wu, units, tolerances);
                let confidence = if group_had_roughing {
                    type_confidence
                } else {
                    type_confidence.min(Confidence::Medium)
                };
                set.features.push(Feature {
                    feature_type,
                    diameter: x,
                    depth_or_height: depth,
                    side: pass.side,
                    source_tool: pass.tool.clone(),
                    confidence,
                    provenance: format!(
                        "{} bore candidate on {}",
                        if group_had_roughing {
                            "finishing-pass"
                        } else {
                            "unclassified"
                        },
                        pass.side
                    ),
                });
            }
        }
    }

    link_stepped_bores(&mut set, tolerances);
    set
}

/// Record stepped bores: the same diameter on both sides with one
/// through-depth and one shallow reading is one linked pair, a centerbore
/// and a counterbore at the same diameter
fn link_stepped_bores(set: &mut FeatureSet, tolerances: &Tolerances) {
    let bores: Vec<(usize, f64, Side, FeatureType)> = set
        .features
        .iter()
        .enumerate()
        .filter(|(_, f)| {
            matches!(
                f.feature_type,
                FeatureType::Centerbore | FeatureType::Counterbore
            )
        })
        .map(|(i, f)| (i, f.diameter, f.side, f.feature_type))
        .collect();

    for (i, &(ai, ad, a_side, a_type)) in bores.iter().enumerate() {
        for &(bi, bd, b_side, b_type) in bores.iter().skip(i + 1) {
            if a_side != b_side
                && (ad - bd).abs() <= tolerances.stepped_bore_link_tolerance
                && a_type != b_type
            {
                set.notes.push(format!(
                    "stepped bore: centerbore and counterbore linked at {:.3}",
                    (ad + bd) / 2.0
                ));
                // The linked pair is authoritative on both readings.
                set.features[ai].confidence = Confidence::High;
                set.features[bi].confidence = Confidence::High;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::classify_stream;
    use discprobe_core::model::{MotionEvent, NominalValue};
    use discprobe_core::units::SourceUnit;

    fn feed(index: usize, x: f64, z: f64, tool: &str, side: Side) -> MotionEvent {
        MotionEvent {
            sequence_index: index,
            is_rapid: false,
            x_value: Some(x),
            z_value: Some(z),
            feed_rate: Some(0.1),
            active_tool: Some(tool.to_string()),
            side,
            markers: vec![],
        }
    }

    fn spec_with(
        thickness: Option<f64>,
        center_bore: Option<f64>,
        hub: Option<f64>,
    ) -> NominalSpec {
        let nv = |v| NominalValue::new(v, SourceUnit::Millimeter, Confidence::High);
        NominalSpec {
            title: String::new(),
            outer_diameter: None,
            thickness: thickness.map(nv),
            center_bore: center_bore.map(nv),
            hub_diameter: hub.map(nv),
            hub_height: None,
        }
    }

    fn classify(
        events: Vec<MotionEvent>,
        spec: &NominalSpec,
        units: MeasurementSystem,
    ) -> FeatureSet {
        let tolerances = Tolerances::default();
        let groups = classify_stream(&events, &tolerances);
        classify_features(&groups, spec, units, &tolerances)
    }

    #[test]
    fn test_deep_bore_is_centerbore() {
        // 18 mm deep in a 22 mm thick part: through-feature.
        let events = vec![feed(0, 72.6, -18.0, "0101", Side::Side1)];
        let set = classify(events, &spec_with(Some(22.0), None, None), MeasurementSystem::Metric);
        let bore = &set.features[0];
        assert_eq!(bore.feature_type, FeatureType::Centerbore);
        assert_eq!(bore.diameter, 72.6);
    }

    #[test]
    fn test_shallow_bore_is_counterbore() {
        // 6 mm deep in a 22 mm thick part: seat pocket.
        let events = vec![feed(0, 95.0, -6.0, "0101", Side::Side1)];
        let set = classify(events, &spec_with(Some(22.0), None, None), MeasurementSystem::Metric);
        assert_eq!(set.features[0].feature_type, FeatureType::Counterbore);
    }

    #[test]
    fn test_marker_valid_when_agreeing_with_spec() {
        let mut events = vec![feed(0, 72.69, -18.0, "0101", Side::Side1)];
        events[0].markers.push(Marker::CenterBore);
        let set = classify(
            events,
            &spec_with(Some(22.0), Some(72.6), None),
            MeasurementSystem::Metric,
        );
        let bore = &set.features[0];
        assert_eq!(bore.confidence, Confidence::High);
        assert!(bore.provenance.contains("explicit marker"));
    }

    #[test]
    fn test_disagreeing_shallow_marker_becomes_adjacent_pocket() {
        // Marker at 66.0, spec bore 72.6, cut at chamfer depth: the
        // marker tags an adjacent pocket and must not claim the bore.
        let mut events = vec![
            feed(0, 66.0, -0.3, "0101", Side::Side1),
            feed(1, 72.69, -18.0, "0101", Side::Side1),
        ];
        events[0].markers.push(Marker::CenterBore);
        let set = classify(
            events,
            &spec_with(Some(22.0), Some(72.6), None),
            MeasurementSystem::Metric,
        );

        let rejected = set
            .features
            .iter()
            .find(|f| f.provenance.contains("rejected bore marker"))
            .expect("rejected marker recorded");
        assert_eq!(rejected.feature_type, FeatureType::Counterbore);
        assert_eq!(rejected.confidence, Confidence::Low);

        let main = set
            .features
            .iter()
            .find(|f| f.feature_type == FeatureType::Centerbore)
            .expect("main bore candidate");
        assert_eq!(main.diameter, 72.69);
        assert!(set.notes.iter().any(|n| n.contains("adjacent pocket")));
    }

    #[test]
    fn test_hub_oscillation_pattern() {
        // 12 facing/hub-rough cycles stepping 0.20 deep, plus one shallow
        // outlier cycle that must be excluded from min and max.
        let mut events = Vec::new();
        let mut index = 0;
        // Shallow edge-break cycle first.
        events.push(feed(index, 6.2, -0.05, "0404", Side::Side2));
        index += 1;
        events.push(feed(index, 4.9, -0.05, "0404", Side::Side2));
        index += 1;
        for cycle in 0..12 {
            let depth = 0.6 + 0.2 * cycle as f64;
            events.push(feed(index, 6.2, -depth, "0404", Side::Side2));
            index += 1;
            let small = if cycle == 7 { 4.840 } else { 4.9 };
            events.push(feed(index, small, -depth, "0404", Side::Side2));
            index += 1;
        }

        let set = classify(events, &spec_with(None, None, None), MeasurementSystem::Imperial);
        let hub = set
            .features
            .iter()
            .find(|f| f.feature_type == FeatureType::HubProfile)
            .expect("hub profile");
        let tolerances = Tolerances::default();
        assert!((hub.diameter - (4.840 - tolerances.roughing_allowance)).abs() < 1e-9);
        assert!((hub.depth_or_height.unwrap() - 2.8).abs() < 1e-9);
        assert!(hub.provenance.contains("oscillation"));
    }

    #[test]
    fn test_outer_turn_supplies_thickness_estimate() {
        let events = vec![
            feed(0, 283.1, -22.4, "0202", Side::Side1),
            feed(1, 72.6, -18.0, "0101", Side::Side1),
        ];
        let set = classify(events, &spec_with(None, None, None), MeasurementSystem::Metric);
        assert_eq!(set.measured_thickness, Some(22.4));
        // With the estimate in hand the 18 mm bore is a through-feature.
        let bore = set
            .features
            .iter()
            .find(|f| f.feature_type == FeatureType::Centerbore)
            .expect("centerbore");
        assert_eq!(bore.diameter, 72.6);
    }

    #[test]
    fn test_stepped_bore_linking() {
        let events = vec![
            feed(0, 72.6, -18.0, "0101", Side::Side1),
            feed(1, 72.55, -6.0, "0101", Side::Side2),
        ];
        let set = classify(events, &spec_with(Some(22.0), None, None), MeasurementSystem::Metric);
        assert!(set.notes.iter().any(|n| n.contains("stepped bore")));
        assert!(set
            .features
            .iter()
            .all(|f| f.confidence == Confidence::High));
    }
}
