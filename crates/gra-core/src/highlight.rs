use crate::palette::Palette;
use crate::projector::RenderableGraph;
use crate::TaskState;
use std::collections::BTreeSet;

/// Emphasizes nodes whose state is in `states` and dims the rest.
/// An empty set returns the graph untouched.
pub fn apply_highlight(
    mut graph: RenderableGraph,
    states: &BTreeSet<TaskState>,
    palette: &Palette,
) -> RenderableGraph {
    if states.is_empty() {
        return graph;
    }
    for node in &mut graph.nodes {
        if states.contains(&node.state) {
            node.size = palette.size_highlighted;
        } else {
            node.size = palette.size_dimmed;
            node.fill = palette.dimmed_fill;
            node.border = palette.dimmed_border;
        }
    }
    graph
}

/// User-selected subset of task states to emphasize.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightFilter {
    states: BTreeSet<TaskState>,
}

impl HighlightFilter {
    /// Adds the state if absent, removes it otherwise. Returns whether it is now active.
    pub fn toggle(&mut self, state: TaskState) -> bool {
        if self.states.remove(&state) {
            false
        } else {
            self.states.insert(state);
            true
        }
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn is_active(&self, state: &TaskState) -> bool {
        self.states.contains(state)
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &BTreeSet<TaskState> {
        &self.states
    }

    pub fn summary(&self) -> String {
        if self.states.is_empty() {
            return "none".to_string();
        }
        self.states
            .iter()
            .map(TaskState::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::GraphProjector;
    use crate::{GraphKind, RawGraphSnapshot};
    use serde_json::json;

    fn snapshot() -> RawGraphSnapshot {
        RawGraphSnapshot::from_nodes_value(&json!({
            "done": {"state": "completed", "task_type": "executable"},
            "busy": {"state": "working", "task_type": "exploratory"}
        }))
    }

    #[test]
    fn non_matching_nodes_are_dimmed_and_shrunk() {
        let mut filter = HighlightFilter::default();
        filter.toggle(TaskState::Completed);
        let graph = GraphProjector::default().project(
            &snapshot(),
            GraphKind::Execution,
            filter.states(),
        );

        let done = graph.node("done").expect("done");
        assert_eq!(done.size, 40);
        assert_eq!(done.border.to_hex(), "#28a745");
        assert_eq!(done.fill.to_hex(), "#80bdff");

        let busy = graph.node("busy").expect("busy");
        assert_eq!(busy.size, 15);
        assert_eq!(busy.fill.to_hex(), "#eeeeee");
        assert_eq!(busy.border.to_hex(), "#cccccc");
    }

    #[test]
    fn clearing_the_filter_restores_baseline() {
        let projector = GraphProjector::default();
        let baseline = projector.project(&snapshot(), GraphKind::Execution, &BTreeSet::new());

        let mut filter = HighlightFilter::default();
        filter.toggle(TaskState::Working);
        let highlighted = projector.project(&snapshot(), GraphKind::Execution, filter.states());
        assert_ne!(baseline, highlighted);

        filter.clear();
        let restored = projector.project(&snapshot(), GraphKind::Execution, filter.states());
        assert_eq!(baseline, restored);
    }

    #[test]
    fn toggle_flips_membership() {
        let mut filter = HighlightFilter::default();
        assert!(filter.toggle(TaskState::Failed));
        assert!(filter.toggle(TaskState::Completed));
        assert_eq!(filter.summary(), "completed,failed");
        assert!(!filter.toggle(TaskState::Failed));
        assert!(!filter.is_active(&TaskState::Failed));
        assert_eq!(filter.summary(), "completed");
    }
}
