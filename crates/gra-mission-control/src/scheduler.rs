//! Drives polling and applies results to the store.
//!
//! Fetches run as spawned tasks and report back over one channel, so the
//! store has a single writer: the dashboard loop calling [`SyncScheduler::apply`].

use crate::api::{ApiError, BackendClient};
use gra_core::artifact::{collect_final_artifacts, resolve, ArtifactContent, FinalArtifact};
use gra_core::plans::{PlanDetail, PlanSummary};
use gra_core::popup::{PendingPopup, Position};
use gra_core::push::{AgentStats, AgentStatus, PushUpdate};
use gra_core::store::{Generation, GenerationClock, GraHealth, RawTaskStore};
use gra_core::{GraphKind, RawGraphSnapshot};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum SyncMessage {
    Summaries {
        generation: Generation,
        result: Result<Vec<PlanSummary>, ApiError>,
    },
    Agents {
        generation: Generation,
        result: Result<Vec<AgentStatus>, ApiError>,
    },
    Stats {
        generation: Generation,
        result: Result<Vec<AgentStats>, ApiError>,
    },
    Health {
        generation: Generation,
        health: GraHealth,
    },
    Detail {
        plan_id: String,
        generation: Generation,
        result: Result<PlanDetail, ApiError>,
    },
    Graph {
        plan_id: String,
        kind: GraphKind,
        generation: Generation,
        result: Result<RawGraphSnapshot, ApiError>,
    },
    RefreshDone {
        plan_id: String,
        generation: Generation,
        error: Option<String>,
    },
    FinalArtifacts {
        plan_id: String,
        generation: Generation,
        items: Vec<FinalArtifact>,
    },
    Resolved {
        plan_id: String,
        kind: GraphKind,
        node_id: String,
        anchor: Position,
        content: ArtifactContent,
    },
}

/// What the dashboard should do after a message was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Nothing,
    Popup(PendingPopup),
    Note(String),
}

struct DetailTask {
    plan_id: String,
    handle: JoinHandle<()>,
}

pub struct SyncScheduler {
    client: Arc<BackendClient>,
    clock: GenerationClock,
    tx: mpsc::Sender<SyncMessage>,
    auto_refresh: bool,
    detail_task: Option<DetailTask>,
    finals_task: Option<JoinHandle<()>>,
    resolve_task: Option<JoinHandle<()>>,
}

impl SyncScheduler {
    pub fn new(client: BackendClient, tx: mpsc::Sender<SyncMessage>, auto_refresh: bool) -> Self {
        Self {
            client: Arc::new(client),
            clock: GenerationClock::default(),
            tx,
            auto_refresh,
            detail_task: None,
            finals_task: None,
            resolve_task: None,
        }
    }

    pub fn toggle_auto_refresh(&mut self) -> bool {
        self.auto_refresh = !self.auto_refresh;
        self.auto_refresh
    }

    pub fn issue(&mut self) -> Generation {
        self.clock.issue()
    }

    /// Plan list, agents, stats and health, fetched concurrently and written independently.
    pub fn refresh_summaries(&mut self) {
        let generation = self.issue();
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let summaries = async {
                let result = client.plan_summaries().await;
                let _ = tx.send(SyncMessage::Summaries { generation, result }).await;
            };
            let agents = async {
                let result = client.agents_status().await;
                let _ = tx.send(SyncMessage::Agents { generation, result }).await;
            };
            let stats = async {
                let result = client.agent_stats().await;
                let _ = tx.send(SyncMessage::Stats { generation, result }).await;
            };
            let health = async {
                let health = client.health().await;
                let _ = tx.send(SyncMessage::Health { generation, health }).await;
            };
            tokio::join!(summaries, agents, stats, health);
        });
    }

    /// Selects `plan_id`, aborting whatever refresh was running for the
    /// previous plan, and refreshes it immediately.
    pub fn select_plan(&mut self, store: &mut RawTaskStore, plan_id: &str) -> bool {
        if !store.select_plan(plan_id) {
            return false;
        }
        info!(event = "plan_selected", plan_id = %plan_id);
        self.abort_detail();
        abort(&mut self.finals_task);
        abort(&mut self.resolve_task);
        self.refresh_detail(store);
        true
    }

    pub fn on_detail_tick(&mut self, store: &mut RawTaskStore) {
        if !self.auto_refresh {
            return;
        }
        let Some(plan_id) = store.selected_plan_id() else {
            return;
        };
        if let Some(task) = &self.detail_task {
            if task.plan_id == plan_id && !task.handle.is_finished() {
                debug!(event = "detail_refresh_in_flight", plan_id = %plan_id);
                return;
            }
        }
        self.refresh_detail(store);
    }

    /// Plan detail, then both graphs. A refresh already in flight is superseded.
    pub fn refresh_detail(&mut self, store: &mut RawTaskStore) {
        let Some(plan_id) = store.selected_plan_id().map(str::to_string) else {
            return;
        };
        self.abort_detail();
        let generation = self.issue();
        store.begin_refresh(&plan_id, generation);

        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        let task_plan_id = plan_id.clone();
        let handle = tokio::spawn(async move {
            let plan_id = task_plan_id;
            let detail = client.plan_detail(&plan_id).await;
            let (team1, team2, error) = match &detail {
                Ok(detail) => (
                    detail.team1_plan_id.clone(),
                    detail.team2_execution_plan_id.clone(),
                    None,
                ),
                Err(err) => (None, None, Some(err.to_string())),
            };
            let _ = tx
                .send(SyncMessage::Detail {
                    plan_id: plan_id.clone(),
                    generation,
                    result: detail,
                })
                .await;
            if let Some(error) = error {
                let _ = tx
                    .send(SyncMessage::RefreshDone {
                        plan_id,
                        generation,
                        error: Some(error),
                    })
                    .await;
                return;
            }

            let fetch_graph = |kind: GraphKind, graph_id: Option<String>| {
                let client = Arc::clone(&client);
                let tx = tx.clone();
                let plan_id = plan_id.clone();
                async move {
                    let graph_id = graph_id?;
                    let result = client.graph(kind, &graph_id).await;
                    let error = result.as_ref().err().map(ToString::to_string);
                    let _ = tx
                        .send(SyncMessage::Graph {
                            plan_id,
                            kind,
                            generation,
                            result,
                        })
                        .await;
                    error
                }
            };
            let (planning_error, execution_error) = tokio::join!(
                fetch_graph(GraphKind::Planning, team1),
                fetch_graph(GraphKind::Execution, team2)
            );
            let _ = tx
                .send(SyncMessage::RefreshDone {
                    plan_id,
                    generation,
                    error: planning_error.or(execution_error),
                })
                .await;
        });
        self.detail_task = Some(DetailTask { plan_id, handle });
    }

    /// Resolves popup content for a node in the background.
    pub fn resolve_node(
        &mut self,
        store: &RawTaskStore,
        kind: GraphKind,
        node_id: &str,
        anchor: Position,
    ) {
        let (Some(plan_id), Some(snapshot)) = (store.selected_plan_id(), store.snapshot(kind)) else {
            return;
        };
        if !snapshot.contains(node_id) {
            return;
        }
        abort(&mut self.resolve_task);
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        let plan_id = plan_id.to_string();
        let snapshot = snapshot.clone();
        let node_id = node_id.to_string();
        self.resolve_task = Some(tokio::spawn(async move {
            let content = resolve(client.as_ref(), &snapshot, &node_id, kind).await;
            let _ = tx
                .send(SyncMessage::Resolved {
                    plan_id,
                    kind,
                    node_id,
                    anchor,
                    content,
                })
                .await;
        }));
    }

    /// Push messages are stamped on receipt.
    pub fn apply_push(&mut self, store: &mut RawTaskStore, update: PushUpdate) -> usize {
        let generation = self.issue();
        store.board_mut().apply_push(generation, update)
    }

    pub fn apply(&mut self, store: &mut RawTaskStore, msg: SyncMessage) -> SyncOutcome {
        match msg {
            SyncMessage::Summaries { generation, result } => match result {
                Ok(summaries) => {
                    store.set_summaries(generation, summaries);
                    SyncOutcome::Nothing
                }
                Err(err) => fetch_failed("plan_summaries", &err),
            },
            SyncMessage::Agents { generation, result } => match result {
                Ok(agents) => {
                    store.board_mut().replace_agents(generation, agents);
                    SyncOutcome::Nothing
                }
                Err(err) => fetch_failed("agents_status", &err),
            },
            SyncMessage::Stats { generation, result } => match result {
                Ok(stats) => {
                    store.board_mut().set_stats(generation, stats);
                    SyncOutcome::Nothing
                }
                Err(err) => fetch_failed("agent_stats", &err),
            },
            SyncMessage::Health { generation, health } => {
                store.board_mut().set_health(generation, health);
                SyncOutcome::Nothing
            }
            SyncMessage::Detail {
                plan_id,
                generation,
                result,
            } => match result {
                Ok(detail) => {
                    store.apply_plan_detail(&plan_id, generation, detail);
                    SyncOutcome::Nothing
                }
                Err(err) => fetch_failed("plan_detail", &err),
            },
            SyncMessage::Graph {
                plan_id,
                kind,
                generation,
                result,
            } => match result {
                Ok(snapshot) => {
                    let changed = store.snapshot(kind) != Some(&snapshot);
                    let applied = store
                        .apply_graph(&plan_id, kind, generation, snapshot)
                        .is_applied();
                    if applied && changed && kind == GraphKind::Execution {
                        self.refresh_final_artifacts(store, generation);
                    }
                    SyncOutcome::Nothing
                }
                Err(err) => fetch_failed(kind.as_str(), &err),
            },
            SyncMessage::RefreshDone {
                plan_id,
                generation,
                error,
            } => {
                store.finish_refresh(&plan_id, generation, error.map_or(Ok(()), Err));
                SyncOutcome::Nothing
            }
            SyncMessage::FinalArtifacts {
                plan_id,
                generation,
                items,
            } => {
                store.apply_final_artifacts(&plan_id, generation, items);
                SyncOutcome::Nothing
            }
            SyncMessage::Resolved {
                plan_id,
                kind,
                node_id,
                anchor,
                content,
            } => {
                if !store.is_selected(&plan_id) {
                    return SyncOutcome::Nothing;
                }
                if !content.is_resolved() {
                    debug!(event = "artifact_unresolved", kind = %kind, node_id = %node_id);
                    return SyncOutcome::Note(format!("no artifact for {node_id}"));
                }
                SyncOutcome::Popup(PendingPopup::new(anchor, content, kind))
            }
        }
    }

    fn refresh_final_artifacts(&mut self, store: &RawTaskStore, generation: Generation) {
        let (Some(plan_id), Some(snapshot)) = (
            store.selected_plan_id(),
            store.snapshot(GraphKind::Execution),
        ) else {
            return;
        };
        abort(&mut self.finals_task);
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        let plan_id = plan_id.to_string();
        let snapshot = snapshot.clone();
        self.finals_task = Some(tokio::spawn(async move {
            let items = collect_final_artifacts(client.as_ref(), &snapshot).await;
            let _ = tx
                .send(SyncMessage::FinalArtifacts {
                    plan_id,
                    generation,
                    items,
                })
                .await;
        }));
    }

    fn abort_detail(&mut self) {
        if let Some(task) = self.detail_task.take() {
            if !task.handle.is_finished() {
                debug!(event = "detail_refresh_aborted", plan_id = %task.plan_id);
            }
            task.handle.abort();
        }
    }

    pub fn shutdown(&mut self) {
        self.abort_detail();
        abort(&mut self.finals_task);
        abort(&mut self.resolve_task);
    }
}

fn abort(task: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = task.take() {
        handle.abort();
    }
}

fn fetch_failed(what: &'static str, err: &ApiError) -> SyncOutcome {
    warn!(event = "fetch_error", what, error = %err);
    SyncOutcome::Note(format!("{what}: {err}"))
}
