pub mod artifact;
pub mod error;
pub mod highlight;
pub mod palette;
pub mod plans;
pub mod popup;
pub mod projector;
pub mod push;
pub mod stats;
pub mod store;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub use error::CoreError;

/// Which of the two backend graphs a snapshot or projection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphKind {
    /// Team1 decomposition tree; edges follow `children`.
    Planning,
    /// Team2 dependency DAG; edges follow `dependencies`.
    Execution,
}

impl GraphKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GraphKind::Planning => "planning",
            GraphKind::Execution => "execution",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            GraphKind::Planning => "Team 1 plan",
            GraphKind::Execution => "Team 2 execution",
        }
    }
}

impl fmt::Display for GraphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum TaskState {
    Pending,
    Working,
    Completed,
    Failed,
    UnableToComplete,
    #[default]
    Unknown,
    /// Any other backend state name (`ready`, `blocked`, `submitted`, ...), kept verbatim.
    Other(String),
}

impl TaskState {
    pub fn as_str(&self) -> &str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Working => "working",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::UnableToComplete => "unable_to_complete",
            TaskState::Unknown => "unknown",
            TaskState::Other(name) => name.as_str(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskState::Failed | TaskState::UnableToComplete)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::UnableToComplete
        )
    }

    /// Case-sensitive: `Completed` is not `completed` and stays `Other`.
    pub fn parse_lenient(input: &str) -> Self {
        match input {
            "" | "unknown" => TaskState::Unknown,
            "pending" => TaskState::Pending,
            "working" => TaskState::Working,
            "completed" => TaskState::Completed,
            "failed" => TaskState::Failed,
            "unable_to_complete" => TaskState::UnableToComplete,
            other => TaskState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match TaskState::parse_lenient(input) {
            TaskState::Other(other) => Err(format!("Unknown state: {other}")),
            known => Ok(known),
        }
    }
}

impl Serialize for TaskState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val = Value::deserialize(deserializer)?;
        Ok(match val {
            Value::String(s) => TaskState::parse_lenient(&s),
            _ => TaskState::Unknown,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskType {
    Executable,
    Exploratory,
    Container,
    Decomposition,
    #[default]
    Unknown,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Executable => "executable",
            TaskType::Exploratory => "exploratory",
            TaskType::Container => "container",
            TaskType::Decomposition => "decomposition",
            TaskType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "executable" => Ok(TaskType::Executable),
            "exploratory" => Ok(TaskType::Exploratory),
            "container" => Ok(TaskType::Container),
            "decomposition" => Ok(TaskType::Decomposition),
            other => Err(format!("Unknown task type: {other}")),
        }
    }
}

impl Serialize for TaskType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val = Value::deserialize(deserializer)?;
        Ok(val
            .as_str()
            .and_then(|s| s.parse::<TaskType>().ok())
            .unwrap_or_default())
    }
}

/// One node of either graph, as received from the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    pub objective: Option<String>,
    #[serde(default)]
    pub state: TaskState,
    #[serde(default)]
    pub task_type: TaskType,
    #[serde(default, deserialize_with = "deserialize_ids")]
    pub children: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_ids")]
    pub dependencies: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_ids")]
    pub sub_task_ids: Vec<String>,
    #[serde(default)]
    pub artifact_ref: Option<Value>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub output_artifact_ref: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    pub result_summary: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    pub updated_at: Option<String>,
}

impl TaskRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Objective when present and non-empty, otherwise the id.
    pub fn display_name(&self) -> &str {
        self.objective
            .as_deref()
            .filter(|objective| !objective.is_empty())
            .unwrap_or(&self.id)
    }

    pub fn has_sub_tasks(&self) -> bool {
        !self.sub_task_ids.is_empty()
    }
}

/// Latest node map of one graph, in backend order. Keys are authoritative ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGraphSnapshot {
    records: IndexMap<String, TaskRecord>,
}

impl RawGraphSnapshot {
    pub fn from_records(records: impl IntoIterator<Item = TaskRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.id.clone(), record))
                .collect(),
        }
    }

    /// Builds a snapshot from the `nodes` object of a graph detail response.
    /// Entries that are not valid records degrade to an id-only record.
    pub fn from_nodes_value(nodes: &Value) -> Self {
        let Some(map) = nodes.as_object() else {
            return Self::default();
        };
        let mut records = IndexMap::with_capacity(map.len());
        for (key, value) in map {
            let mut record = match serde_json::from_value::<TaskRecord>(value.clone()) {
                Ok(record) => record,
                Err(err) => {
                    debug!(event = "task_record_degraded", id = %key, error = %err);
                    TaskRecord::default()
                }
            };
            record.id = key.clone();
            records.insert(key.clone(), record);
        }
        Self { records }
    }

    pub fn get(&self, id: &str) -> Option<&TaskRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &TaskRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'de> Deserialize<'de> for RawGraphSnapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val = Value::deserialize(deserializer)?;
        Ok(RawGraphSnapshot::from_nodes_value(&val))
    }
}

/// Deserialize an ID that can be either a string or a number into a String
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    Ok(id_from_value(&val).unwrap_or_default())
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    Ok(id_from_value(&val).filter(|id| !id.is_empty()))
}

fn deserialize_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    Ok(match val {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Id lists tolerate numbers, and skip anything else (including a null list).
fn deserialize_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    let Value::Array(items) = val else {
        return Ok(Vec::new());
    };
    Ok(items.iter().filter_map(id_from_value).collect())
}

fn id_from_value(val: &Value) -> Option<String> {
    match val {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_tolerates_numbers_nulls_and_unknown_shapes() {
        let record: TaskRecord = serde_json::from_value(json!({
            "id": 7,
            "objective": null,
            "state": "READY",
            "task_type": "container",
            "dependencies": ["a", 2, {"bad": true}],
            "children": null,
            "output_artifact_ref": "",
            "history": [{"from_state": "pending"}]
        }))
        .expect("lenient record");

        assert_eq!(record.id, "7");
        assert_eq!(record.objective, None);
        assert_eq!(record.state, TaskState::Other("READY".to_string()));
        assert_eq!(record.task_type, TaskType::Container);
        assert_eq!(record.dependencies, vec!["a".to_string(), "2".to_string()]);
        assert!(record.children.is_empty());
        assert_eq!(record.output_artifact_ref, None);
    }

    #[test]
    fn missing_state_is_unknown_and_unknown_type_defaults() {
        let record: TaskRecord =
            serde_json::from_value(json!({"task_type": "quantum"})).expect("record");
        assert_eq!(record.state, TaskState::Unknown);
        assert_eq!(record.task_type, TaskType::Unknown);
    }

    #[test]
    fn snapshot_keeps_backend_order_and_uses_keys_as_ids() {
        let snapshot = RawGraphSnapshot::from_nodes_value(&json!({
            "zeta": {"id": "ignored", "objective": "last key first"},
            "alpha": "not an object",
            "mid": {"state": "working"}
        }));

        let ids: Vec<&str> = snapshot.records().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
        assert!(snapshot.contains("alpha"));
        assert_eq!(snapshot.get("mid").map(|r| &r.state), Some(&TaskState::Working));
    }

    #[test]
    fn non_object_nodes_yield_empty_snapshot() {
        assert!(RawGraphSnapshot::from_nodes_value(&Value::Null).is_empty());
        assert!(RawGraphSnapshot::from_nodes_value(&json!([1, 2])).is_empty());
    }

    #[test]
    fn display_name_falls_back_to_id_only_for_empty_objective() {
        let mut record = TaskRecord::new("t-1");
        assert_eq!(record.display_name(), "t-1");
        record.objective = Some(String::new());
        assert_eq!(record.display_name(), "t-1");
        record.objective = Some("   ".to_string());
        assert_eq!(record.display_name(), "   ");
        record.objective = Some("Write docs".to_string());
        assert_eq!(record.display_name(), "Write docs");
    }

    #[test]
    fn state_from_str_rejects_unknown_names() {
        assert_eq!("unable_to_complete".parse::<TaskState>(), Ok(TaskState::UnableToComplete));
        assert!("blocked".parse::<TaskState>().is_err());
    }

    #[test]
    fn state_names_match_case_sensitively() {
        assert_eq!(TaskState::parse_lenient("completed"), TaskState::Completed);
        assert_eq!(
            TaskState::parse_lenient("Completed"),
            TaskState::Other("Completed".to_string())
        );
        assert_eq!(
            TaskState::parse_lenient(" failed"),
            TaskState::Other(" failed".to_string())
        );
        assert_eq!(TaskState::parse_lenient(""), TaskState::Unknown);
    }
}
