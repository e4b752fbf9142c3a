//! Pass classifier: roughing vs finishing
//!
//! Groups the motion stream into contiguous (tool, side) runs, splits each
//! run into passes by X target, and separates intermediate roughing passes
//! from the finishing pass that defines the real dimension. The primary
//! signal is a stepped progression of X targets in a plausible increment
//! band; a slow finishing feed rate is the fallback signal.

use tracing::{debug, trace};

use discprobe_core::model::{MotionEvent, Pass, Side};
use discprobe_core::tolerances::Tolerances;

/// All passes a single tool cut on a single side, in source order
#[derive(Debug, Clone)]
pub struct ToolGroup {
    pub tool: Option<String>,
    pub side: Side,
    pub passes: Vec<Pass>,
}

impl ToolGroup {
    /// The pass holding the authoritative dimension: the last
    /// non-roughing pass, if classification found one
    pub fn finishing_pass(&self) -> Option<&Pass> {
        self.passes.iter().rev().find(|p| !p.is_roughing)
    }

    /// Passes that remain dimension candidates after classification
    pub fn candidate_passes(&self) -> impl Iterator<Item = &Pass> {
        self.passes.iter().filter(|p| !p.is_roughing)
    }
}

const X_TARGET_EPS: f64 = 1e-6;

/// Group motion events into per-(tool, side) pass lists
///
/// A new pass starts whenever the feed X target changes; rapids between
/// cuts (retract/reposition) stay attached to the pass they serve.
pub fn group_passes(events: &[MotionEvent]) -> Vec<ToolGroup> {
    let mut groups: Vec<ToolGroup> = Vec::new();

    for event in events {
        let needs_new_group = match groups.last() {
            None => true,
            Some(g) => g.tool != event.active_tool || g.side != event.side,
        };
        if needs_new_group {
            groups.push(ToolGroup {
                tool: event.active_tool.clone(),
                side: event.side,
                passes: Vec::new(),
            });
        }
        let group = groups.last_mut().expect("group just ensured");

        let needs_new_pass = if event.is_rapid {
            group.passes.is_empty()
        } else {
            match group.passes.last().and_then(Pass::target_x) {
                None => group.passes.last().is_none(),
                Some(x) => match event.x_value {
                    Some(ex) => (ex - x).abs() > X_TARGET_EPS,
                    None => false,
                },
            }
        };
        if needs_new_pass {
            group.passes.push(Pass {
                tool: event.active_tool.clone(),
                side: event.side,
                events: Vec::new(),
                is_roughing: false,
            });
        }
        group
            .passes
            .last_mut()
            .expect("pass just ensured")
            .events
            .push(event.clone());
    }

    // Drop groups that never fed: pure positioning has no dimension.
    groups.retain(|g| {
        g.passes
            .iter()
            .any(|p| p.events.iter().any(|e| !e.is_rapid))
    });
    groups
}

/// Check a progression of X targets for the roughing-step signature:
/// consistent consecutive steps inside the plausible increment band, one
/// outlier tolerated, all steps in one direction
fn has_step_signature(xs: &[f64], tolerances: &Tolerances) -> bool {
    if xs.len() < 3 {
        return false;
    }
    let deltas: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let positive = deltas.iter().filter(|d| **d > 0.0).count();
    let majority_sign = if positive * 2 >= deltas.len() { 1.0 } else { -1.0 };
    let outliers = deltas
        .iter()
        .filter(|d| {
            !(tolerances.roughing_step.contains(d.abs()) && (**d * majority_sign) > 0.0)
        })
        .count();
    outliers <= 1
}

/// Annotate the passes of one group with `is_roughing`
///
/// Positions reached only at chamfer-shallow depths are excluded from the
/// step-delta evaluation: edge-break touches are not part of the roughing
/// progression and corrupt the average-step test.
pub fn classify_roughing(group: &mut ToolGroup, tolerances: &Tolerances) {
    let n = group.passes.len();
    if n < 3 {
        // Too few positions to call anything roughing; all stay
        // equally-weighted candidates.
        return;
    }

    let deep_xs: Vec<f64> = group
        .passes
        .iter()
        .filter(|p| p.max_depth().is_some_and(|d| d >= tolerances.chamfer_depth))
        .filter_map(Pass::target_x)
        .collect();

    if has_step_signature(&deep_xs, tolerances) {
        // The final cut of the group is the finishing pass, whatever its
        // depth; everything before it is the progression.
        for pass in &mut group.passes[..n - 1] {
            pass.is_roughing = true;
        }
        debug!(
            tool = ?group.tool,
            side = %group.side,
            roughing = n - 1,
            "step-progression roughing classification"
        );
        return;
    }

    // Feed-rate fallback: the first pass cutting at a finishing feed is
    // the finishing pass; everything before it is roughing.
    let finishing_index = group.passes.iter().position(|p| {
        p.feed_rate()
            .is_some_and(|f| f <= tolerances.finishing_feed_max)
            && p.max_depth().is_some_and(|d| d >= tolerances.chamfer_depth)
    });
    if let Some(index) = finishing_index {
        for pass in &mut group.passes[..index] {
            pass.is_roughing = true;
        }
        trace!(
            tool = ?group.tool,
            side = %group.side,
            finishing_index = index,
            "feed-rate roughing classification"
        );
    }
}

/// Group and classify the whole stream in one shot
pub fn classify_stream(events: &[MotionEvent], tolerances: &Tolerances) -> Vec<ToolGroup> {
    let mut groups = group_passes(events);
    for group in &mut groups {
        classify_roughing(group, tolerances);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use discprobe_core::model::Side;

    fn feed(index: usize, x: f64, z: f64, f: f64, tool: &str) -> MotionEvent {
        MotionEvent {
            sequence_index: index,
            is_rapid: false,
            x_value: Some(x),
            z_value: Some(z),
            feed_rate: Some(f),
            active_tool: Some(tool.to_string()),
            side: Side::Side1,
            markers: vec![],
        }
    }

    fn stepped_events(xs: &[(f64, f64)], feed_rate: f64, tool: &str) -> Vec<MotionEvent> {
        xs.iter()
            .enumerate()
            .map(|(i, (x, z))| feed(i, *x, *z, feed_rate, tool))
            .collect()
    }

    #[test]
    fn test_grouping_splits_on_tool_change() {
        let mut events = stepped_events(&[(50.0, -5.0)], 0.2, "0101");
        events.extend(stepped_events(&[(60.0, -5.0)], 0.2, "0303"));
        let groups = group_passes(&events);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].tool.as_deref(), Some("0101"));
        assert_eq!(groups[1].tool.as_deref(), Some("0303"));
    }

    #[test]
    fn test_pass_split_on_x_target_change() {
        let events = stepped_events(&[(50.0, -5.0), (50.0, -10.0), (52.0, -10.0)], 0.2, "0101");
        let groups = group_passes(&events);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].passes.len(), 2);
        assert_eq!(groups[0].passes[0].max_depth(), Some(10.0));
    }

    #[test]
    fn test_step_progression_marks_all_but_final() {
        // 2.3 .. 5.3 by 0.3, then the finishing cut 5.5945 at a shallow
        // chamfer depth. The shallow position must not corrupt the step
        // test, and the finishing value must be the final cut, not the
        // largest roughing value.
        let mut targets: Vec<(f64, f64)> = Vec::new();
        let mut x = 2.3;
        while x <= 5.31 {
            targets.push((x, -0.7));
            x += 0.3;
        }
        targets.push((5.5945, -0.04));
        let events = stepped_events(&targets, 0.01, "0505");

        let groups = classify_stream(&events, &Tolerances::default());
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        let finishing = group.finishing_pass().expect("finishing pass");
        assert!((finishing.target_x().unwrap() - 5.5945).abs() < 1e-9);
        let roughing: Vec<f64> = group
            .passes
            .iter()
            .filter(|p| p.is_roughing)
            .filter_map(Pass::target_x)
            .collect();
        assert_eq!(roughing.len(), group.passes.len() - 1);
        assert!(roughing.iter().all(|x| *x <= 5.3 + 1e-9));
    }

    #[test]
    fn test_feed_rate_fallback() {
        // Irregular steps (no progression signature) but a clear slow
        // finishing feed on the last pass.
        let events = stepped_events(
            &[(60.0, -18.0), (66.5, -18.0), (70.0, -18.0), (72.6, -18.0)],
            0.35,
            "0101",
        )
        .into_iter()
        .enumerate()
        .map(|(i, mut e)| {
            if i == 3 {
                e.feed_rate = Some(0.08);
            }
            e.sequence_index = i;
            e
        })
        .collect::<Vec<_>>();

        let groups = classify_stream(&events, &Tolerances::default());
        let group = &groups[0];
        assert!(group.passes[0].is_roughing);
        assert!(group.passes[1].is_roughing);
        assert!(group.passes[2].is_roughing);
        let finishing = group.finishing_pass().unwrap();
        assert_eq!(finishing.target_x(), Some(72.6));
    }

    #[test]
    fn test_too_few_positions_skips_classification() {
        let events = stepped_events(&[(72.0, -18.0), (72.6, -18.0)], 0.1, "0101");
        let groups = classify_stream(&events, &Tolerances::default());
        assert!(groups[0].passes.iter().all(|p| !p.is_roughing));
        assert_eq!(groups[0].candidate_passes().count(), 2);
    }

    #[test]
    fn test_one_outlier_step_tolerated() {
        let events = stepped_events(
            &[
                (2.3, -0.7),
                (2.6, -0.7),
                (2.9, -0.7),
                (3.75, -0.7), // oversized step, tolerated once
                (4.0, -0.7),
                (4.3, -0.7),
            ],
            0.01,
            "0505",
        );
        let groups = classify_stream(&events, &Tolerances::default());
        let group = &groups[0];
        assert_eq!(group.finishing_pass().unwrap().target_x(), Some(4.3));
        assert_eq!(group.passes.iter().filter(|p| p.is_roughing).count(), 5);
    }

    #[test]
    fn test_descending_outer_turn_progression() {
        // OD turning steps downward toward the finished diameter.
        let events = stepped_events(
            &[(284.0, -22.0), (283.7, -22.0), (283.4, -22.0), (283.1, -22.0)],
            0.25,
            "0202",
        );
        let groups = classify_stream(&events, &Tolerances::default());
        let group = &groups[0];
        assert_eq!(group.finishing_pass().unwrap().target_x(), Some(283.1));
        assert_eq!(group.passes.iter().filter(|p| p.is_roughing).count(), 3);
    }
}
