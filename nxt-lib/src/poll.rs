//! Edge detection over consecutive poll readings.
//!
//! A device reading pair goes through two states: unpolled (no baseline) and
//! polled. Detection only ever compares the two most recent readings, so the
//! first poll after construction can never fire, and a steady signal fires
//! nothing no matter how long it is observed.

/// Transition of a boolean reading between two polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoolEdge {
    Rose,
    Fell,
}

pub(crate) fn boolean_edge(previous: Option<bool>, current: bool) -> Option<BoolEdge> {
    match previous {
        Some(false) if current => Some(BoolEdge::Rose),
        Some(true) if !current => Some(BoolEdge::Fell),
        _ => None,
    }
}

/// Threshold crossing of a scalar reading between two polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ThresholdEdge {
    Above,
    Below,
}

/// A reading at or above the threshold counts as "above"; crossing happens
/// when consecutive readings land on different sides.
pub(crate) fn threshold_edge(
    previous: Option<i32>,
    current: i32,
    threshold: i32,
) -> Option<ThresholdEdge> {
    let prev = previous?;
    let was_above = prev >= threshold;
    let is_above = current >= threshold;
    match (was_above, is_above) {
        (false, true) => Some(ThresholdEdge::Above),
        (true, false) => Some(ThresholdEdge::Below),
        _ => None,
    }
}
