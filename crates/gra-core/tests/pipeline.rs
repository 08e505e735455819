use async_trait::async_trait;
use gra_core::artifact::{resolve, ArtifactContent, ArtifactSource};
use gra_core::highlight::HighlightFilter;
use gra_core::plans::PlanDetail;
use gra_core::popup::{PendingPopup, Position, Size};
use gra_core::projector::GraphProjector;
use gra_core::stats::{count_states, has_failures};
use gra_core::store::{GenerationClock, RawTaskStore, SyncPhase};
use gra_core::{CoreError, GraphKind, RawGraphSnapshot, TaskState};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};

struct FixtureSource {
    artifacts: HashMap<String, Value>,
}

#[async_trait]
impl ArtifactSource for FixtureSource {
    async fn fetch_artifact(&self, reference: &str) -> Result<Value, CoreError> {
        self.artifacts
            .get(reference)
            .cloned()
            .ok_or_else(|| CoreError::ArtifactNotFound {
                reference: reference.to_string(),
            })
    }
}

fn execution_nodes() -> Value {
    json!({
        "fetch": {
            "objective": "Fetch the dataset",
            "state": "completed",
            "task_type": "executable",
            "output_artifact_ref": "art-fetch",
            "updated_at": "2025-03-01T10:00:00"
        },
        "analyse": {
            "objective": "Analyse the dataset and write a report about every anomaly found",
            "state": "failed",
            "task_type": "exploratory",
            "dependencies": ["fetch", "ghost"],
            "result_summary": "timed out"
        },
        "publish": {
            "state": "pending",
            "dependencies": ["analyse"]
        }
    })
}

fn selected_store() -> (RawTaskStore, GenerationClock) {
    let mut clock = GenerationClock::default();
    let mut store = RawTaskStore::new();
    store.select_plan("plan-1");

    let generation = clock.issue();
    store.begin_refresh("plan-1", generation);
    let detail: PlanDetail = serde_json::from_value(json!({
        "global_plan_id": "plan-1",
        "current_supervisor_state": "TEAM2_EXECUTION_IN_PROGRESS",
        "team1_plan_id": "t1",
        "team2_execution_plan_id": "t2"
    }))
    .expect("detail");
    assert!(store.apply_plan_detail("plan-1", generation, detail).is_applied());
    let snapshot = RawGraphSnapshot::from_nodes_value(&execution_nodes());
    assert!(store
        .apply_graph("plan-1", GraphKind::Execution, clock.issue(), snapshot)
        .is_applied());
    store.finish_refresh("plan-1", generation, Ok(()));
    (store, clock)
}

#[test]
fn store_to_projection_drops_dangling_edges_and_truncates_labels() {
    let (store, _) = selected_store();
    assert_eq!(store.phase(), SyncPhase::Loaded);

    let snapshot = store.snapshot(GraphKind::Execution).expect("execution graph");
    let graph = GraphProjector::default().project(snapshot, GraphKind::Execution, &BTreeSet::new());

    let edges: Vec<&str> = graph.edges.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(edges, vec!["fetch->analyse", "analyse->publish"]);
    assert!(graph.nodes.iter().all(|n| n.label.chars().count() <= 35));
    assert_eq!(graph.node("analyse").map(|n| n.border.to_hex()), Some("#dc3545".to_string()));

    let counts = count_states(Some(snapshot));
    assert!(has_failures(None, counts.as_ref()));
}

#[test]
fn highlighting_failed_tasks_dims_everything_else() {
    let (store, _) = selected_store();
    let snapshot = store.snapshot(GraphKind::Execution).expect("execution graph");

    let mut filter = HighlightFilter::default();
    filter.toggle(TaskState::Failed);
    let graph = GraphProjector::default().project(snapshot, GraphKind::Execution, filter.states());

    for node in &graph.nodes {
        if node.id == "analyse" {
            assert_eq!(node.size, 40);
        } else {
            assert_eq!(node.size, 15);
            assert_eq!(node.fill.to_hex(), "#eeeeee");
        }
    }
}

#[tokio::test]
async fn node_click_resolves_and_places_a_popup() {
    let (store, _) = selected_store();
    let snapshot = store.snapshot(GraphKind::Execution).expect("execution graph");
    let source = FixtureSource {
        artifacts: HashMap::from([("art-fetch".to_string(), json!("{\"rows\": 120}"))]),
    };

    let content = resolve(&source, snapshot, "fetch", GraphKind::Execution).await;
    assert_eq!(content, ArtifactContent::Json(json!({"rows": 120})));

    let failed = resolve(&source, snapshot, "analyse", GraphKind::Execution).await;
    assert_eq!(
        failed,
        ArtifactContent::Json(json!({
            "initial_request": "Analyse the dataset and write a report about every anomaly found",
            "summary": "timed out"
        }))
    );

    let pending = resolve(&source, snapshot, "publish", GraphKind::Execution).await;
    assert_eq!(pending, ArtifactContent::Unresolved);

    let popup = PendingPopup::new(Position { x: 590, y: 590 }, content, GraphKind::Execution)
        .place(Size { w: 100, h: 50 }, Size { w: 600, h: 600 });
    assert_eq!(popup.position, Position { x: 490, y: 540 });
}

#[test]
fn switching_plans_discards_late_results() {
    let (mut store, mut clock) = selected_store();
    let late = clock.issue();
    store.select_plan("plan-2");

    let outcome = store.apply_graph(
        "plan-1",
        GraphKind::Execution,
        late,
        RawGraphSnapshot::from_nodes_value(&execution_nodes()),
    );
    assert!(!outcome.is_applied());
    assert!(store.snapshot(GraphKind::Execution).is_none());
    assert_eq!(store.phase(), SyncPhase::Idle);
}
