//! Generation-stamped state shared by the scheduler and the dashboard.
//!
//! Every write carries the [`Generation`] issued when its fetch started (or
//! when a push message arrived). A slot only accepts writes at least as new
//! as the one it holds, so a slow response can never overwrite a faster,
//! newer one. Plan-scoped writes are also rejected once the plan has been
//! deselected.

use crate::artifact::FinalArtifact;
use crate::plans::{PlanDetail, PlanSummary};
use crate::push::{AgentStats, AgentStatus, PushUpdate};
use crate::{GraphKind, RawGraphSnapshot};
use indexmap::IndexMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Issues strictly increasing generations, starting at 1.
#[derive(Debug, Default)]
pub struct GenerationClock {
    last: u64,
}

impl GenerationClock {
    pub fn issue(&mut self) -> Generation {
        self.last += 1;
        Generation(self.last)
    }

    pub fn last(&self) -> Generation {
        Generation(self.last)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    Stale { held: Generation, offered: Generation },
    NotSelected,
}

impl WriteOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, WriteOutcome::Applied)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Stamped<T> {
    value: T,
    generation: Generation,
}

impl<T> Stamped<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            generation: Generation::default(),
        }
    }

    fn offer(&mut self, generation: Generation, value: T, slot: &'static str) -> WriteOutcome {
        if generation < self.generation {
            debug!(
                event = "store_write_stale",
                slot,
                held = %self.generation,
                offered = %generation
            );
            return WriteOutcome::Stale {
                held: self.generation,
                offered: generation,
            };
        }
        self.value = value;
        self.generation = generation;
        WriteOutcome::Applied
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Idle,
    Loading,
    Loaded,
    /// Last refresh failed; previously loaded data is kept.
    Error(String),
}

impl SyncPhase {
    pub fn label(&self) -> &str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Loading => "loading",
            SyncPhase::Loaded => "loaded",
            SyncPhase::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraHealth {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl GraHealth {
    pub fn as_str(self) -> &'static str {
        match self {
            GraHealth::Online => "online",
            GraHealth::Offline => "offline",
            GraHealth::Unknown => "unknown",
        }
    }
}

/// Data for the currently selected plan.
#[derive(Debug, Clone)]
struct PlanView {
    plan_id: String,
    detail: Stamped<Option<PlanDetail>>,
    planning: Stamped<Option<RawGraphSnapshot>>,
    execution: Stamped<Option<RawGraphSnapshot>>,
    finals: Stamped<Vec<FinalArtifact>>,
    phase: Stamped<SyncPhase>,
}

impl PlanView {
    fn new(plan_id: String) -> Self {
        Self {
            plan_id,
            detail: Stamped::new(None),
            planning: Stamped::new(None),
            execution: Stamped::new(None),
            finals: Stamped::new(Vec::new()),
            phase: Stamped::new(SyncPhase::Idle),
        }
    }

    fn graph_slot(&mut self, kind: GraphKind) -> &mut Stamped<Option<RawGraphSnapshot>> {
        match kind {
            GraphKind::Planning => &mut self.planning,
            GraphKind::Execution => &mut self.execution,
        }
    }
}

/// Live agent and health view. Agents keep the generation of their last write
/// so a list fetched before a push message cannot roll that message back.
#[derive(Debug, Clone, Default)]
pub struct AgentBoard {
    agents: IndexMap<String, Stamped<AgentStatus>>,
    list_generation: Generation,
    stats: Stamped<Vec<AgentStats>>,
    health: Stamped<GraHealth>,
    gra_state: Stamped<Option<String>>,
}

impl AgentBoard {
    pub fn agents(&self) -> impl Iterator<Item = &AgentStatus> {
        self.agents.values().map(|slot| &slot.value)
    }

    pub fn agent(&self, name: &str) -> Option<&AgentStatus> {
        self.agents.get(name).map(|slot| &slot.value)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.agents().filter(|agent| agent.is_online()).count()
    }

    pub fn stats(&self) -> &[AgentStats] {
        &self.stats.value
    }

    /// Stats row for an agent, matched by its executor name.
    pub fn stats_for(&self, agent: &AgentStatus) -> Option<&AgentStats> {
        let executor = agent.executor_name();
        self.stats
            .value
            .iter()
            .find(|stats| stats.agent_name == executor)
    }

    pub fn health(&self) -> GraHealth {
        self.health.value
    }

    pub fn gra_state(&self) -> Option<&str> {
        self.gra_state.value.as_deref()
    }

    /// Replaces the whole list. Agents written after `generation` survive.
    pub fn replace_agents(&mut self, generation: Generation, list: Vec<AgentStatus>) -> WriteOutcome {
        if generation < self.list_generation {
            debug!(
                event = "store_write_stale",
                slot = "agents",
                held = %self.list_generation,
                offered = %generation
            );
            return WriteOutcome::Stale {
                held: self.list_generation,
                offered: generation,
            };
        }
        let mut next: IndexMap<String, Stamped<AgentStatus>> = IndexMap::with_capacity(list.len());
        for status in list {
            let name = status.name.clone();
            match self.agents.get(&name) {
                Some(held) if held.generation > generation => {
                    next.insert(name, held.clone());
                }
                _ => {
                    next.insert(
                        name,
                        Stamped {
                            value: status,
                            generation,
                        },
                    );
                }
            }
        }
        for (name, held) in &self.agents {
            if held.generation > generation && !next.contains_key(name) {
                next.insert(name.clone(), held.clone());
            }
        }
        self.agents = next;
        self.list_generation = generation;
        WriteOutcome::Applied
    }

    /// Merges a push message field by field into the matching agents.
    pub fn apply_push(&mut self, generation: Generation, update: PushUpdate) -> usize {
        let mut applied = 0;
        for status in update.agents {
            let slot = self
                .agents
                .entry(status.name.clone())
                .or_insert_with(|| Stamped::new(AgentStatus::default()));
            if generation < slot.generation {
                debug!(
                    event = "store_write_stale",
                    slot = "agent",
                    agent = %status.name,
                    held = %slot.generation,
                    offered = %generation
                );
                continue;
            }
            slot.value.merge_from(status);
            slot.generation = generation;
            applied += 1;
        }
        if let Some(state) = update.gra_state {
            if self
                .gra_state
                .offer(generation, Some(state), "gra_state")
                .is_applied()
            {
                applied += 1;
            }
        }
        applied
    }

    pub fn set_stats(&mut self, generation: Generation, stats: Vec<AgentStats>) -> WriteOutcome {
        self.stats.offer(generation, stats, "agent_stats")
    }

    pub fn set_health(&mut self, generation: Generation, health: GraHealth) -> WriteOutcome {
        self.health.offer(generation, health, "health")
    }
}

#[derive(Debug, Clone, Default)]
pub struct RawTaskStore {
    summaries: Stamped<Vec<PlanSummary>>,
    selected: Option<PlanView>,
    board: AgentBoard,
}

impl RawTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summaries(&self) -> &[PlanSummary] {
        &self.summaries.value
    }

    pub fn set_summaries(&mut self, generation: Generation, summaries: Vec<PlanSummary>) -> WriteOutcome {
        self.summaries.offer(generation, summaries, "plan_summaries")
    }

    pub fn board(&self) -> &AgentBoard {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut AgentBoard {
        &mut self.board
    }

    pub fn selected_plan_id(&self) -> Option<&str> {
        self.selected.as_ref().map(|view| view.plan_id.as_str())
    }

    pub fn is_selected(&self, plan_id: &str) -> bool {
        self.selected_plan_id() == Some(plan_id)
    }

    /// Switches the selection. Returns false when the plan was already selected.
    /// Data for the previous plan is discarded.
    pub fn select_plan(&mut self, plan_id: impl Into<String>) -> bool {
        let plan_id = plan_id.into();
        if self.is_selected(&plan_id) {
            return false;
        }
        self.selected = Some(PlanView::new(plan_id));
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn phase(&self) -> SyncPhase {
        self.selected
            .as_ref()
            .map(|view| view.phase.value.clone())
            .unwrap_or_default()
    }

    pub fn plan_detail(&self) -> Option<&PlanDetail> {
        self.selected.as_ref().and_then(|view| view.detail.value.as_ref())
    }

    pub fn snapshot(&self, kind: GraphKind) -> Option<&RawGraphSnapshot> {
        let view = self.selected.as_ref()?;
        match kind {
            GraphKind::Planning => view.planning.value.as_ref(),
            GraphKind::Execution => view.execution.value.as_ref(),
        }
    }

    /// Deliverables of finished execution tasks, oldest first.
    pub fn final_artifacts(&self) -> &[FinalArtifact] {
        self.selected
            .as_ref()
            .map(|view| view.finals.value.as_slice())
            .unwrap_or(&[])
    }

    fn view_for(&mut self, plan_id: &str) -> Option<&mut PlanView> {
        match self.selected.as_mut() {
            Some(view) if view.plan_id == plan_id => Some(view),
            _ => {
                debug!(event = "store_write_not_selected", plan_id = %plan_id);
                None
            }
        }
    }

    /// Enters `Loading` for a refresh issued at `generation`.
    pub fn begin_refresh(&mut self, plan_id: &str, generation: Generation) -> WriteOutcome {
        match self.view_for(plan_id) {
            Some(view) => view.phase.offer(generation, SyncPhase::Loading, "phase"),
            None => WriteOutcome::NotSelected,
        }
    }

    /// Settles the refresh issued at `generation`. A newer refresh that is
    /// still loading keeps its `Loading` phase.
    pub fn finish_refresh(
        &mut self,
        plan_id: &str,
        generation: Generation,
        result: Result<(), String>,
    ) -> WriteOutcome {
        let phase = match result {
            Ok(()) => SyncPhase::Loaded,
            Err(message) => SyncPhase::Error(message),
        };
        match self.view_for(plan_id) {
            Some(view) => view.phase.offer(generation, phase, "phase"),
            None => WriteOutcome::NotSelected,
        }
    }

    /// Stores plan metadata. A missing team id clears that team's graph, and a
    /// missing execution graph also clears the final artifacts.
    pub fn apply_plan_detail(
        &mut self,
        plan_id: &str,
        generation: Generation,
        detail: PlanDetail,
    ) -> WriteOutcome {
        let Some(view) = self.view_for(plan_id) else {
            return WriteOutcome::NotSelected;
        };
        let has_team1 = detail.team1_plan_id.is_some();
        let has_team2 = detail.team2_execution_plan_id.is_some();
        let outcome = view.detail.offer(generation, Some(detail), "plan_detail");
        if outcome.is_applied() {
            if !has_team1 {
                view.planning.offer(generation, None, "planning_graph");
            }
            if !has_team2 {
                view.execution.offer(generation, None, "execution_graph");
                view.finals.offer(generation, Vec::new(), "final_artifacts");
            }
        }
        outcome
    }

    pub fn apply_graph(
        &mut self,
        plan_id: &str,
        kind: GraphKind,
        generation: Generation,
        snapshot: RawGraphSnapshot,
    ) -> WriteOutcome {
        let Some(view) = self.view_for(plan_id) else {
            return WriteOutcome::NotSelected;
        };
        let slot = match kind {
            GraphKind::Planning => "planning_graph",
            GraphKind::Execution => "execution_graph",
        };
        view.graph_slot(kind).offer(generation, Some(snapshot), slot)
    }

    pub fn apply_final_artifacts(
        &mut self,
        plan_id: &str,
        generation: Generation,
        items: Vec<FinalArtifact>,
    ) -> WriteOutcome {
        match self.view_for(plan_id) {
            Some(view) => view.finals.offer(generation, items, "final_artifacts"),
            None => WriteOutcome::NotSelected,
        }
    }
}
