use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Supervisor states after which a plan no longer makes progress on its own.
pub const DEFAULT_FINISHED_STATES: &[&str] = &[
    "TEAM2_EXECUTION_COMPLETED",
    "TEAM2_EXECUTION_FAILED",
    "TEAM1_PLANNING_FAILED",
    "FAILED_MAX_CLARIFICATION_ATTEMPTS",
    "FAILED_AGENT_ERROR",
];

pub fn default_finished_states() -> Vec<String> {
    DEFAULT_FINISHED_STATES
        .iter()
        .map(|state| state.to_string())
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanSummary {
    #[serde(default, deserialize_with = "crate::deserialize_id")]
    pub global_plan_id: String,
    #[serde(default, deserialize_with = "crate::deserialize_opt_string")]
    pub raw_objective: Option<String>,
    #[serde(default, deserialize_with = "crate::deserialize_opt_string")]
    pub current_supervisor_state: Option<String>,
}

impl PlanSummary {
    pub fn state(&self) -> &str {
        self.current_supervisor_state.as_deref().unwrap_or("")
    }

    pub fn title(&self) -> &str {
        self.raw_objective
            .as_deref()
            .filter(|objective| !objective.trim().is_empty())
            .unwrap_or(&self.global_plan_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanDetail {
    #[serde(flatten)]
    pub summary: PlanSummary,
    #[serde(default, deserialize_with = "crate::deserialize_opt_string")]
    pub clarified_objective: Option<String>,
    #[serde(default, deserialize_with = "crate::deserialize_opt_id")]
    pub team1_plan_id: Option<String>,
    #[serde(default, deserialize_with = "crate::deserialize_opt_id")]
    pub team2_execution_plan_id: Option<String>,
    #[serde(default, deserialize_with = "crate::deserialize_opt_string")]
    pub last_question_to_user: Option<String>,
    #[serde(default)]
    pub conversation_history: Value,
}

impl PlanDetail {
    pub fn plan_id(&self) -> &str {
        &self.summary.global_plan_id
    }

    pub fn objective(&self) -> Option<&str> {
        self.clarified_objective
            .as_deref()
            .or(self.summary.raw_objective.as_deref())
    }

    pub fn is_flow_running(&self, finished_states: &[String]) -> bool {
        is_flow_running(self.summary.current_supervisor_state.as_deref(), finished_states)
    }
}

/// A flow is running while it has a supervisor state that is not a finished one.
pub fn is_flow_running(state: Option<&str>, finished_states: &[String]) -> bool {
    match state {
        Some(state) if !state.is_empty() => !finished_states.iter().any(|f| f == state),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    InProgress,
    Finished,
}

impl StatusFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::InProgress => "in_progress",
            StatusFilter::Finished => "finished",
        }
    }

    pub fn next(self) -> Self {
        match self {
            StatusFilter::All => StatusFilter::InProgress,
            StatusFilter::InProgress => StatusFilter::Finished,
            StatusFilter::Finished => StatusFilter::All,
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "in_progress" | "in-progress" | "running" => Ok(StatusFilter::InProgress),
            "finished" | "done" => Ok(StatusFilter::Finished),
            other => Err(format!("unknown status filter: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanFilter {
    pub status: StatusFilter,
    /// Exact supervisor state; `None` matches every state.
    pub state: Option<String>,
}

impl PlanFilter {
    pub fn matches(&self, plan: &PlanSummary, finished_states: &[String]) -> bool {
        let finished = finished_states.iter().any(|f| f == plan.state());
        let status_ok = match self.status {
            StatusFilter::All => true,
            StatusFilter::InProgress => !finished,
            StatusFilter::Finished => finished,
        };
        let state_ok = self
            .state
            .as_deref()
            .map(|state| state == plan.state())
            .unwrap_or(true);
        status_ok && state_ok
    }

    pub fn apply<'a>(
        &self,
        plans: &'a [PlanSummary],
        finished_states: &[String],
    ) -> Vec<&'a PlanSummary> {
        plans
            .iter()
            .filter(|plan| self.matches(plan, finished_states))
            .collect()
    }
}

/// Sorted, de-duplicated supervisor states for the filter picker.
pub fn unique_states(plans: &[PlanSummary]) -> Vec<String> {
    plans
        .iter()
        .filter_map(|plan| plan.current_supervisor_state.clone())
        .filter(|state| !state.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
