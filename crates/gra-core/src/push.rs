//! Agent status payloads, from both the polled endpoints and the push socket.
//!
//! The push socket sends either a bare array of agent statuses or an object
//! with `agents` (array or id-keyed map) and `gra_status.state`. Both shapes
//! fold into a [`PushUpdate`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub health_status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "deserialize_strings")]
    pub skills: Vec<String>,
    #[serde(default)]
    pub internal_url: Option<String>,
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl AgentStatus {
    /// Folds a partial update in: only fields the update carries overwrite.
    pub fn merge_from(&mut self, update: AgentStatus) {
        if !update.name.is_empty() {
            self.name = update.name;
        }
        if update.health_status.is_some() {
            self.health_status = update.health_status;
        }
        if update.timestamp.is_some() {
            self.timestamp = update.timestamp;
        }
        if !update.skills.is_empty() {
            self.skills = update.skills;
        }
        if update.internal_url.is_some() {
            self.internal_url = update.internal_url;
        }
        if update.public_url.is_some() {
            self.public_url = update.public_url;
        }
        if update.url.is_some() {
            self.url = update.url;
        }
    }

    pub fn is_online(&self) -> bool {
        self.health_status
            .as_deref()
            .map(|status| status.to_ascii_lowercase().contains("online"))
            .unwrap_or(false)
    }

    /// Name without the `AgentServer` suffix the registry appends.
    pub fn short_name(&self) -> &str {
        self.name
            .strip_suffix("AgentServer")
            .filter(|short| !short.is_empty())
            .unwrap_or(&self.name)
    }

    /// Stats are keyed by executor name rather than server name.
    pub fn executor_name(&self) -> String {
        self.name.replace("AgentServer", "AgentExecutor")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentStats {
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub tasks_completed: u64,
    #[serde(default)]
    pub tasks_failed: u64,
}

/// Accepts `{"stats": [...]}` or a bare array; anything else yields no stats.
pub fn parse_agent_stats(value: Value) -> Vec<AgentStats> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("stats") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushUpdate {
    pub agents: Vec<AgentStatus>,
    pub gra_state: Option<String>,
}

impl PushUpdate {
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty() && self.gra_state.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("unrecognized push payload: {0}")]
    UnrecognizedShape(&'static str),
}

pub fn parse_push_message(text: &str, max_frame_bytes: usize) -> Result<PushUpdate, PushError> {
    if text.len() > max_frame_bytes {
        return Err(PushError::OversizedFrame {
            size: text.len(),
            max: max_frame_bytes,
        });
    }
    let value: Value =
        serde_json::from_str(text).map_err(|err| PushError::Decode(err.to_string()))?;
    parse_push_value(value)
}

pub fn parse_push_value(value: Value) -> Result<PushUpdate, PushError> {
    match value {
        Value::Array(items) => Ok(PushUpdate {
            agents: agents_from_array(items),
            gra_state: None,
        }),
        Value::Object(mut map) => {
            let agents = match map.remove("agents") {
                Some(Value::Array(items)) => agents_from_array(items),
                Some(Value::Object(keyed)) => keyed
                    .into_iter()
                    .filter_map(|(key, item)| {
                        let mut status = agent_from_value(item)?;
                        if status.name.is_empty() {
                            status.name = key;
                        }
                        Some(status)
                    })
                    .collect(),
                _ => Vec::new(),
            };
            let gra_state = map
                .get("gra_status")
                .and_then(|status| status.get("state"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let update = PushUpdate { agents, gra_state };
            if update.is_empty() && !map.contains_key("gra_status") {
                return Err(PushError::UnrecognizedShape("object without agents or gra_status"));
            }
            Ok(update)
        }
        _ => Err(PushError::UnrecognizedShape("expected array or object")),
    }
}

fn agents_from_array(items: Vec<Value>) -> Vec<AgentStatus> {
    items
        .into_iter()
        .filter_map(agent_from_value)
        .filter(|status| !status.name.is_empty())
        .collect()
}

fn agent_from_value(value: Value) -> Option<AgentStatus> {
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value).ok()
}

fn deserialize_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    let Value::Array(items) = v else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            Value::Object(map) => map
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_array_is_a_list_of_statuses() {
        let update = parse_push_message(
            r#"[{"name": "ResearchAgentServer", "health_status": "✅ Online"}, 42]"#,
            DEFAULT_MAX_FRAME_BYTES,
        )
        .expect("array payload");
        assert_eq!(update.agents.len(), 1);
        assert!(update.agents[0].is_online());
        assert_eq!(update.gra_state, None);
    }

    #[test]
    fn keyed_agents_take_their_name_from_the_key() {
        let update = parse_push_value(json!({
            "agents": {
                "DevelopmentAgentServer": {"health_status": "⚠️ Offline"},
                "TestingAgentServer": {"name": "TestingAgentServer", "skills": ["pytest", {"name": "lint"}]}
            },
            "gra_status": {"state": "online"}
        }))
        .expect("object payload");

        let names: Vec<&str> = update.agents.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["DevelopmentAgentServer", "TestingAgentServer"]);
        assert_eq!(update.agents[1].skills, vec!["pytest".to_string(), "lint".to_string()]);
        assert_eq!(update.gra_state.as_deref(), Some("online"));
    }

    #[test]
    fn gra_status_alone_is_accepted() {
        let update = parse_push_value(json!({"gra_status": {"state": "degraded"}})).expect("status");
        assert!(update.agents.is_empty());
        assert_eq!(update.gra_state.as_deref(), Some("degraded"));
    }

    #[test]
    fn unrelated_shapes_and_bad_frames_are_errors() {
        assert!(matches!(
            parse_push_value(json!({"hello": 1})),
            Err(PushError::UnrecognizedShape(_))
        ));
        assert!(matches!(
            parse_push_value(json!("text")),
            Err(PushError::UnrecognizedShape(_))
        ));
        assert!(matches!(
            parse_push_message("{not json", DEFAULT_MAX_FRAME_BYTES),
            Err(PushError::Decode(_))
        ));
        assert!(matches!(
            parse_push_message(&"x".repeat(64), 16),
            Err(PushError::OversizedFrame { size: 64, max: 16 })
        ));
    }

    #[test]
    fn merge_keeps_fields_the_update_omits() {
        let mut status = AgentStatus {
            name: "ValidatorAgentServer".to_string(),
            health_status: Some("✅ Online".to_string()),
            internal_url: Some("http://validator:8080".to_string()),
            skills: vec!["validate".to_string()],
            ..AgentStatus::default()
        };
        status.merge_from(AgentStatus {
            health_status: Some("⚠️ Offline".to_string()),
            timestamp: Some("2025-03-01T10:00:00Z".to_string()),
            ..AgentStatus::default()
        });

        assert_eq!(status.name, "ValidatorAgentServer");
        assert!(!status.is_online());
        assert_eq!(status.internal_url.as_deref(), Some("http://validator:8080"));
        assert_eq!(status.skills, vec!["validate".to_string()]);
        assert_eq!(status.short_name(), "Validator");
        assert_eq!(status.executor_name(), "ValidatorAgentExecutor");
    }

    #[test]
    fn stats_accept_wrapped_or_bare_lists() {
        let wrapped = parse_agent_stats(json!({"stats": [
            {"agent_name": "ResearchAgentExecutor", "tasks_completed": 4, "tasks_failed": 1}
        ]}));
        let bare = parse_agent_stats(json!([{"agent_name": "X", "tasks_completed": 2}]));
        assert_eq!(wrapped[0].tasks_completed, 4);
        assert_eq!(bare[0].tasks_failed, 0);
        assert!(parse_agent_stats(json!("nope")).is_empty());
    }
}
