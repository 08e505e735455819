//! On-demand artifact resolution for a clicked node.
//!
//! The planning graph carries its artifact inline. The execution graph only
//! carries a reference, so content is fetched through an [`ArtifactSource`]
//! and failed tasks fall back to a synthesized summary. Resolution never
//! surfaces an error: anything that cannot be shown becomes
//! [`ArtifactContent::Unresolved`].

use crate::{CoreError, GraphKind, RawGraphSnapshot, TaskRecord, TaskState};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures_util::future::join_all;
use serde_json::{json, Value};
use tracing::warn;

pub const FAILURE_WITHOUT_DETAILS: &str = "Failure without details";

/// Backend seam for `GET /artifacts/{reference}`; returns the raw `content` field.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn fetch_artifact(&self, reference: &str) -> Result<Value, CoreError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactContent {
    Text(String),
    Json(Value),
    Unresolved,
}

impl ArtifactContent {
    /// Decides the shape once: strings are tried as JSON, and kept verbatim if
    /// they are not JSON (or are a JSON string themselves).
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => ArtifactContent::Unresolved,
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::String(inner)) => ArtifactContent::Text(inner),
                Ok(Value::Null) | Err(_) => ArtifactContent::Text(text),
                Ok(parsed) => ArtifactContent::Json(parsed),
            },
            other => ArtifactContent::Json(other),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, ArtifactContent::Unresolved)
    }

    pub fn into_value(self) -> Value {
        match self {
            ArtifactContent::Text(text) => Value::String(text),
            ArtifactContent::Json(value) => value,
            ArtifactContent::Unresolved => Value::Null,
        }
    }
}

/// Resolves the popup content for `node_id` in a graph of `kind`.
pub async fn resolve<S>(
    source: &S,
    snapshot: &RawGraphSnapshot,
    node_id: &str,
    kind: GraphKind,
) -> ArtifactContent
where
    S: ArtifactSource + ?Sized,
{
    let Some(record) = snapshot.get(node_id) else {
        return ArtifactContent::Unresolved;
    };
    match kind {
        GraphKind::Planning => record
            .artifact_ref
            .clone()
            .map(ArtifactContent::from_value)
            .unwrap_or(ArtifactContent::Unresolved),
        GraphKind::Execution => resolve_execution(source, record).await,
    }
}

async fn resolve_execution<S>(source: &S, record: &TaskRecord) -> ArtifactContent
where
    S: ArtifactSource + ?Sized,
{
    let failed = record.state == TaskState::Failed;
    let Some(reference) = record.output_artifact_ref.as_deref() else {
        return if failed {
            failure_fallback(record)
        } else {
            ArtifactContent::Unresolved
        };
    };

    match source.fetch_artifact(reference).await {
        Ok(raw) => {
            let content = ArtifactContent::from_value(raw);
            if failed {
                ArtifactContent::Json(json!({
                    "initial_request": record.objective.clone().unwrap_or_default(),
                    "artifact": content.into_value(),
                }))
            } else {
                content
            }
        }
        Err(err) => {
            warn!(
                event = "artifact_fetch_error",
                task_id = %record.id,
                reference,
                error = %err
            );
            if failed {
                failure_fallback(record)
            } else {
                ArtifactContent::Unresolved
            }
        }
    }
}

fn failure_fallback(record: &TaskRecord) -> ArtifactContent {
    let summary = record
        .result_summary
        .as_deref()
        .filter(|summary| !summary.is_empty())
        .unwrap_or(FAILURE_WITHOUT_DETAILS);
    ArtifactContent::Json(json!({
        "initial_request": record.objective.clone().unwrap_or_default(),
        "summary": summary,
    }))
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinalArtifact {
    pub task_id: String,
    pub task: String,
    pub content: ArtifactContent,
    pub updated_at: Option<String>,
}

/// Fetches the deliverables of every finished leaf task concurrently and
/// returns them oldest first. Failed fetches are skipped.
pub async fn collect_final_artifacts<S>(
    source: &S,
    snapshot: &RawGraphSnapshot,
) -> Vec<FinalArtifact>
where
    S: ArtifactSource + ?Sized,
{
    let finals: Vec<(&TaskRecord, &str)> = snapshot
        .records()
        .filter(|record| record.state.is_terminal() && !record.has_sub_tasks())
        .filter_map(|record| {
            record
                .output_artifact_ref
                .as_deref()
                .map(|reference| (record, reference))
        })
        .collect();

    let fetches = finals.iter().map(|(record, reference)| async move {
        match source.fetch_artifact(reference).await {
            Ok(raw) => Some(FinalArtifact {
                task_id: record.id.clone(),
                task: record.display_name().to_string(),
                content: ArtifactContent::from_value(raw),
                updated_at: record.updated_at.clone(),
            }),
            Err(err) => {
                warn!(
                    event = "final_artifact_fetch_error",
                    task_id = %record.id,
                    reference = %reference,
                    error = %err
                );
                None
            }
        }
    });

    let mut items: Vec<FinalArtifact> = join_all(fetches).await.into_iter().flatten().collect();
    items.sort_by_key(|item| item.updated_at.as_deref().and_then(parse_timestamp));
    items
}

/// Accepts RFC 3339 and the naive ISO form the backend writes (assumed UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemorySource {
        artifacts: HashMap<String, Value>,
        calls: AtomicUsize,
    }

    impl MemorySource {
        fn with(mut self, reference: &str, content: Value) -> Self {
            self.artifacts.insert(reference.to_string(), content);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ArtifactSource for MemorySource {
        async fn fetch_artifact(&self, reference: &str) -> Result<Value, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.artifacts
                .get(reference)
                .cloned()
                .ok_or_else(|| CoreError::ArtifactNotFound {
                    reference: reference.to_string(),
                })
        }
    }

    fn execution_snapshot() -> RawGraphSnapshot {
        RawGraphSnapshot::from_nodes_value(&json!({
            "ok": {
                "objective": "Write parser",
                "state": "completed",
                "output_artifact_ref": "art-ok"
            },
            "failed_with_ref": {
                "objective": "Deploy",
                "state": "failed",
                "output_artifact_ref": "art-fail"
            },
            "failed_lost_ref": {
                "objective": "Benchmark",
                "state": "failed",
                "output_artifact_ref": "art-missing",
                "result_summary": "timeout after 30s"
            },
            "failed_no_ref": {"objective": "Review", "state": "failed"},
            "working_no_ref": {"objective": "Idle", "state": "working"},
            "working_lost_ref": {"state": "working", "output_artifact_ref": "art-missing"}
        }))
    }

    fn source() -> MemorySource {
        MemorySource::default()
            .with("art-ok", json!("{\"files\": [\"parser.rs\"]}"))
            .with("art-fail", json!("stack trace: boom"))
    }

    #[test]
    fn content_shape_is_decided_once() {
        assert_eq!(
            ArtifactContent::from_value(json!("{\"a\": 1}")),
            ArtifactContent::Json(json!({"a": 1}))
        );
        assert_eq!(
            ArtifactContent::from_value(json!("# Title\nnot json")),
            ArtifactContent::Text("# Title\nnot json".to_string())
        );
        assert_eq!(
            ArtifactContent::from_value(json!("\"quoted\"")),
            ArtifactContent::Text("quoted".to_string())
        );
        assert_eq!(
            ArtifactContent::from_value(json!([1, 2])),
            ArtifactContent::Json(json!([1, 2]))
        );
        assert_eq!(ArtifactContent::from_value(Value::Null), ArtifactContent::Unresolved);
    }

    #[tokio::test]
    async fn planning_artifact_is_inline_and_never_fetched() {
        let snapshot = RawGraphSnapshot::from_nodes_value(&json!({
            "p1": {"artifact_ref": "{\"steps\": 3}"},
            "p2": {"artifact_ref": "plain notes"},
            "p3": {}
        }));
        let source = MemorySource::default();

        let p1 = resolve(&source, &snapshot, "p1", GraphKind::Planning).await;
        let p2 = resolve(&source, &snapshot, "p2", GraphKind::Planning).await;
        let p3 = resolve(&source, &snapshot, "p3", GraphKind::Planning).await;

        assert_eq!(p1, ArtifactContent::Json(json!({"steps": 3})));
        assert_eq!(p2, ArtifactContent::Text("plain notes".to_string()));
        assert_eq!(p3, ArtifactContent::Unresolved);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn completed_execution_node_returns_fetched_content() {
        let content = resolve(&source(), &execution_snapshot(), "ok", GraphKind::Execution).await;
        assert_eq!(content, ArtifactContent::Json(json!({"files": ["parser.rs"]})));
    }

    #[tokio::test]
    async fn failed_node_wraps_fetched_artifact_with_request() {
        let content = resolve(
            &source(),
            &execution_snapshot(),
            "failed_with_ref",
            GraphKind::Execution,
        )
        .await;
        assert_eq!(
            content,
            ArtifactContent::Json(json!({
                "initial_request": "Deploy",
                "artifact": "stack trace: boom"
            }))
        );
    }

    #[tokio::test]
    async fn failed_node_falls_back_to_summary_when_fetch_fails() {
        let content = resolve(
            &source(),
            &execution_snapshot(),
            "failed_lost_ref",
            GraphKind::Execution,
        )
        .await;
        assert_eq!(
            content,
            ArtifactContent::Json(json!({
                "initial_request": "Benchmark",
                "summary": "timeout after 30s"
            }))
        );
    }

    #[tokio::test]
    async fn failed_node_without_ref_synthesizes_fallback_without_fetching() {
        let source = source();
        let content = resolve(
            &source,
            &execution_snapshot(),
            "failed_no_ref",
            GraphKind::Execution,
        )
        .await;
        assert_eq!(
            content,
            ArtifactContent::Json(json!({
                "initial_request": "Review",
                "summary": FAILURE_WITHOUT_DETAILS
            }))
        );
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn non_failed_gaps_resolve_to_nothing() {
        let source = source();
        let snapshot = execution_snapshot();
        for id in ["working_no_ref", "working_lost_ref", "not-a-node"] {
            let content = resolve(&source, &snapshot, id, GraphKind::Execution).await;
            assert_eq!(content, ArtifactContent::Unresolved, "node {id}");
        }
    }

    #[tokio::test]
    async fn final_artifacts_are_fetched_for_finished_leaves_oldest_first() {
        let snapshot = RawGraphSnapshot::from_nodes_value(&json!({
            "late": {
                "objective": "Late leaf",
                "state": "completed",
                "output_artifact_ref": "a-late",
                "updated_at": "2025-03-02T10:00:00.000001"
            },
            "early": {
                "objective": "Early leaf",
                "state": "unable_to_complete",
                "output_artifact_ref": "a-early",
                "updated_at": "2025-03-01T09:00:00+00:00"
            },
            "parent": {
                "state": "completed",
                "output_artifact_ref": "a-parent",
                "sub_task_ids": ["late"]
            },
            "running": {"state": "working", "output_artifact_ref": "a-run"},
            "lost": {"state": "failed", "output_artifact_ref": "a-gone"}
        }));
        let source = MemorySource::default()
            .with("a-late", json!("late body"))
            .with("a-early", json!({"ok": false}))
            .with("a-parent", json!("parent body"))
            .with("a-run", json!("running body"));

        let items = collect_final_artifacts(&source, &snapshot).await;

        let tasks: Vec<&str> = items.iter().map(|item| item.task.as_str()).collect();
        assert_eq!(tasks, vec!["Early leaf", "Late leaf"]);
        assert_eq!(items[0].content, ArtifactContent::Json(json!({"ok": false})));
        assert_eq!(source.calls(), 3);
    }

    #[test]
    fn timestamps_accept_rfc3339_and_naive_iso() {
        assert!(parse_timestamp("2025-03-01T09:00:00Z").is_some());
        assert!(parse_timestamp("2025-03-01T09:00:00.123456").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
