//! Raw node map to renderable graph.
//!
//! Projection is total: every record yields exactly one node, and edges whose
//! endpoints are missing from the snapshot are dropped without complaint.

use crate::highlight::apply_highlight;
use crate::palette::{Palette, Rgb};
use crate::{GraphKind, RawGraphSnapshot, TaskRecord, TaskState};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderNode {
    pub id: String,
    pub label: String,
    pub fill: Rgb,
    pub border: Rgb,
    pub border_width: u8,
    pub size: u16,
    pub state: TaskState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderEdge {
    pub id: String,
    pub from: String,
    pub to: String,
}

impl RenderEdge {
    fn new(from: &str, to: &str) -> Self {
        Self {
            id: format!("{from}->{to}"),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderableGraph {
    pub kind: GraphKind,
    pub nodes: Vec<RenderNode>,
    pub edges: Vec<RenderEdge>,
}

impl RenderableGraph {
    pub fn node(&self, id: &str) -> Option<&RenderNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a RenderEdge> + 'a {
        self.edges.iter().filter(move |edge| edge.from == id)
    }

    pub fn edges_into<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a RenderEdge> + 'a {
        self.edges.iter().filter(move |edge| edge.to == id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphProjector {
    palette: Palette,
}

impl GraphProjector {
    pub fn new(palette: Palette) -> Self {
        Self { palette }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Projects `snapshot` for `kind`. A non-empty `highlight` set dims every
    /// execution node whose state is not in the set; it is ignored for planning.
    pub fn project(
        &self,
        snapshot: &RawGraphSnapshot,
        kind: GraphKind,
        highlight: &BTreeSet<TaskState>,
    ) -> RenderableGraph {
        let mut nodes = Vec::with_capacity(snapshot.len());
        let mut edges = Vec::new();

        for record in snapshot.records() {
            nodes.push(self.node_for(record, kind));
            match kind {
                GraphKind::Planning => {
                    for child in &record.children {
                        if snapshot.contains(child) {
                            edges.push(RenderEdge::new(&record.id, child));
                        }
                    }
                }
                GraphKind::Execution => {
                    for dependency in &record.dependencies {
                        if snapshot.contains(dependency) {
                            edges.push(RenderEdge::new(dependency, &record.id));
                        }
                    }
                }
            }
        }

        let graph = RenderableGraph { kind, nodes, edges };
        if kind == GraphKind::Execution && !highlight.is_empty() {
            apply_highlight(graph, highlight, &self.palette)
        } else {
            graph
        }
    }

    fn node_for(&self, record: &TaskRecord, kind: GraphKind) -> RenderNode {
        let palette = &self.palette;
        let (fill, border) = match kind {
            GraphKind::Planning => (palette.state_fill(&record.state), palette.border_neutral),
            GraphKind::Execution => (
                palette.type_color(record.task_type).pastel(),
                palette.state_border(&record.state),
            ),
        };
        RenderNode {
            id: record.id.clone(),
            label: truncate_label(record.display_name(), palette.label_max_chars),
            fill,
            border,
            border_width: if record.has_sub_tasks() { 3 } else { 1 },
            size: palette.size_normal,
            state: record.state.clone(),
        }
    }
}

/// Keeps the first `max` characters; applying it twice changes nothing.
pub fn truncate_label(input: &str, max: usize) -> String {
    input.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskType;
    use serde_json::json;

    fn no_highlight() -> BTreeSet<TaskState> {
        BTreeSet::new()
    }

    fn execution_snapshot() -> RawGraphSnapshot {
        RawGraphSnapshot::from_nodes_value(&json!({
            "fetch": {
                "objective": "Fetch the upstream dataset",
                "state": "completed",
                "task_type": "executable"
            },
            "clean": {
                "objective": "Clean rows",
                "state": "failed",
                "task_type": "exploratory",
                "dependencies": ["fetch", "ghost"]
            },
            "report": {
                "state": "unable_to_complete",
                "task_type": "container",
                "dependencies": ["clean"],
                "sub_task_ids": ["report-1"]
            },
            "mystery": {"task_type": "alchemy", "state": "working"}
        }))
    }

    #[test]
    fn execution_edges_point_from_dependency_to_dependent() {
        let graph = GraphProjector::default().project(
            &execution_snapshot(),
            GraphKind::Execution,
            &no_highlight(),
        );
        let edges: Vec<(&str, &str)> = graph
            .edges
            .iter()
            .map(|edge| (edge.from.as_str(), edge.to.as_str()))
            .collect();
        assert_eq!(edges, vec![("fetch", "clean"), ("clean", "report")]);
        assert_eq!(graph.edges[0].id, "fetch->clean");
    }

    #[test]
    fn planning_edges_point_from_parent_to_child_and_drop_dangling() {
        let snapshot = RawGraphSnapshot::from_nodes_value(&json!({
            "root": {"objective": "Ship", "children": ["a", "missing", "b"]},
            "a": {"state": "completed"},
            "b": {"state": "working", "children": ["root-2"]}
        }));
        let graph =
            GraphProjector::default().project(&snapshot, GraphKind::Planning, &no_highlight());

        assert_eq!(graph.nodes.len(), 3);
        let edges: Vec<&str> = graph.edges.iter().map(|edge| edge.id.as_str()).collect();
        assert_eq!(edges, vec!["root->a", "root->b"]);
        for edge in &graph.edges {
            assert!(snapshot.contains(&edge.from) && snapshot.contains(&edge.to));
        }
    }

    #[test]
    fn execution_encoding_uses_pastel_type_fill_and_state_border() {
        let projector = GraphProjector::default();
        let graph =
            projector.project(&execution_snapshot(), GraphKind::Execution, &no_highlight());

        let fetch = graph.node("fetch").expect("fetch node");
        assert_eq!(fetch.fill.to_hex(), "#80bdff");
        assert_eq!(fetch.border.to_hex(), "#28a745");
        assert_eq!(fetch.border_width, 1);
        assert_eq!(fetch.size, 25);

        let clean = graph.node("clean").expect("clean node");
        assert_eq!(clean.border.to_hex(), "#dc3545");

        let report = graph.node("report").expect("report node");
        assert_eq!(report.border.to_hex(), "#dc3545");
        assert_eq!(report.border_width, 3);
        assert_eq!(report.fill, projector.palette().type_color(TaskType::Container).pastel());
        assert_eq!(report.label, "report");

        let mystery = graph.node("mystery").expect("mystery node");
        assert_eq!(mystery.fill.to_hex(), "#808080");
        assert_eq!(mystery.border.to_hex(), "#6c757d");
    }

    #[test]
    fn planning_encoding_is_flat_fill_by_state() {
        let snapshot = RawGraphSnapshot::from_nodes_value(&json!({
            "done": {"state": "completed", "task_type": "executable"},
            "broke": {"state": "failed"},
            "gave_up": {"state": "unable_to_complete"},
            "busy": {"state": "working"},
            "new": {"state": "submitted", "sub_task_ids": ["x"]},
            "shouty": {"state": "Completed"}
        }));
        let graph =
            GraphProjector::default().project(&snapshot, GraphKind::Planning, &no_highlight());
        let fill = |id: &str| graph.node(id).map(|node| node.fill.to_hex());

        assert_eq!(fill("done").as_deref(), Some("#d4edda"));
        assert_eq!(fill("broke").as_deref(), Some("#f8d7da"));
        assert_eq!(fill("gave_up").as_deref(), Some("#f8d7da"));
        assert_eq!(fill("busy").as_deref(), Some("#fff3cd"));
        assert_eq!(fill("new").as_deref(), Some("#d3d3d3"));
        assert_eq!(fill("shouty").as_deref(), Some("#d3d3d3"));
        assert!(graph.nodes.iter().all(|node| node.border.to_hex() == "#6c757d"));
        assert_eq!(graph.node("new").map(|node| node.border_width), Some(3));
    }

    #[test]
    fn labels_are_capped_at_35_chars_and_stable() {
        let long = "é".repeat(50);
        let snapshot = RawGraphSnapshot::from_records([TaskRecord {
            objective: Some(long),
            ..TaskRecord::new("long")
        }]);
        let graph =
            GraphProjector::default().project(&snapshot, GraphKind::Execution, &no_highlight());
        let label = &graph.nodes[0].label;
        assert_eq!(label.chars().count(), 35);
        assert_eq!(&truncate_label(label, 35), label);
    }

    #[test]
    fn projection_is_deterministic() {
        let projector = GraphProjector::default();
        let snapshot = execution_snapshot();
        let mut highlight = BTreeSet::new();
        highlight.insert(TaskState::Completed);
        let first = projector.project(&snapshot, GraphKind::Execution, &highlight);
        let second = projector.project(&snapshot, GraphKind::Execution, &highlight);
        assert_eq!(first, second);
    }

    #[test]
    fn highlight_is_ignored_for_planning_graph() {
        let snapshot = RawGraphSnapshot::from_nodes_value(&json!({
            "a": {"state": "working"}
        }));
        let mut highlight = BTreeSet::new();
        highlight.insert(TaskState::Completed);
        let graph = GraphProjector::default().project(&snapshot, GraphKind::Planning, &highlight);
        assert_eq!(graph.nodes[0].size, 25);
        assert_eq!(graph.nodes[0].fill.to_hex(), "#fff3cd");
    }
}
