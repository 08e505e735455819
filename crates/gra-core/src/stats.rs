use crate::RawGraphSnapshot;
use std::collections::BTreeMap;

pub type StateCounts = BTreeMap<String, usize>;

/// Per-state totals, always recomputed from the full snapshot.
pub fn count_states(snapshot: Option<&RawGraphSnapshot>) -> Option<StateCounts> {
    let snapshot = snapshot?;
    let mut counts = StateCounts::new();
    for record in snapshot.records() {
        *counts.entry(record.state.as_str().to_string()).or_insert(0) += 1;
    }
    Some(counts)
}

pub fn failure_count(counts: Option<&StateCounts>) -> usize {
    let Some(counts) = counts else {
        return 0;
    };
    counts.get("failed").copied().unwrap_or(0)
        + counts.get("unable_to_complete").copied().unwrap_or(0)
}

pub fn has_failures(team1: Option<&StateCounts>, team2: Option<&StateCounts>) -> bool {
    failure_count(team1) + failure_count(team2) > 0
}
