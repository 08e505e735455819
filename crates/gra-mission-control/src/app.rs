use crate::push::PushEvent;
use crate::scheduler::SyncOutcome;
use crate::ui;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind};
use gra_core::highlight::HighlightFilter;
use gra_core::plans::{unique_states, PlanFilter, PlanSummary};
use gra_core::popup::{PendingPopup, Popup, Position, Size};
use gra_core::projector::{GraphProjector, RenderableGraph};
use gra_core::stats::{count_states, has_failures, StateCounts};
use gra_core::store::RawTaskStore;
use gra_core::{GraphKind, TaskState};
use ratatui::layout::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Plans,
    Planning,
    Execution,
    Artifacts,
    Agents,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::Plans => Focus::Planning,
            Focus::Planning => Focus::Execution,
            Focus::Execution => Focus::Artifacts,
            Focus::Artifacts => Focus::Agents,
            Focus::Agents => Focus::Plans,
        }
    }

    pub fn graph_kind(self) -> Option<GraphKind> {
        match self {
            Focus::Planning => Some(GraphKind::Planning),
            Focus::Execution => Some(GraphKind::Execution),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    Nodes,
    Edges,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    None,
    Quit,
    SelectPlan(String),
    Refresh,
    ToggleAutoRefresh,
    Resolve { kind: GraphKind, node_id: String },
}

pub struct App {
    pub store: RawTaskStore,
    pub projector: GraphProjector,
    pub finished_states: Vec<String>,
    pub focus: Focus,
    pub list_mode: ListMode,
    pub plan_filter: PlanFilter,
    pub plan_cursor: usize,
    pub planning_cursor: usize,
    pub execution_cursor: usize,
    pub scroll: u16,
    pub highlight: HighlightFilter,
    pub pending_popup: Option<PendingPopup>,
    pub popup: Option<Popup>,
    pub help_open: bool,
    pub status_note: Option<String>,
    pub push_enabled: bool,
    pub push_connected: bool,
    pub auto_refresh: bool,
}

impl App {
    pub fn new(
        projector: GraphProjector,
        finished_states: Vec<String>,
        push_enabled: bool,
        auto_refresh: bool,
    ) -> Self {
        Self {
            store: RawTaskStore::new(),
            projector,
            finished_states,
            focus: Focus::Plans,
            list_mode: ListMode::Nodes,
            plan_filter: PlanFilter::default(),
            plan_cursor: 0,
            planning_cursor: 0,
            execution_cursor: 0,
            scroll: 0,
            highlight: HighlightFilter::default(),
            pending_popup: None,
            popup: None,
            help_open: false,
            status_note: None,
            push_enabled,
            push_connected: false,
            auto_refresh,
        }
    }

    pub fn filtered_plans(&self) -> Vec<&PlanSummary> {
        self.plan_filter
            .apply(self.store.summaries(), &self.finished_states)
    }

    pub fn graph(&self, kind: GraphKind) -> Option<RenderableGraph> {
        self.store
            .snapshot(kind)
            .map(|snapshot| self.projector.project(snapshot, kind, self.highlight.states()))
    }

    pub fn counts(&self, kind: GraphKind) -> Option<StateCounts> {
        count_states(self.store.snapshot(kind))
    }

    pub fn has_failures(&self) -> bool {
        has_failures(
            self.counts(GraphKind::Planning).as_ref(),
            self.counts(GraphKind::Execution).as_ref(),
        )
    }

    pub fn flow_running(&self) -> bool {
        self.store
            .plan_detail()
            .map(|detail| detail.is_flow_running(&self.finished_states))
            .unwrap_or(false)
    }

    pub fn cursor(&self, kind: GraphKind) -> usize {
        match kind {
            GraphKind::Planning => self.planning_cursor,
            GraphKind::Execution => self.execution_cursor,
        }
    }

    fn cursor_mut(&mut self, kind: GraphKind) -> &mut usize {
        match kind {
            GraphKind::Planning => &mut self.planning_cursor,
            GraphKind::Execution => &mut self.execution_cursor,
        }
    }

    /// Rows shown for a graph panel in the current list mode.
    pub fn row_count(&self, kind: GraphKind) -> usize {
        self.graph(kind)
            .map(|graph| match self.list_mode {
                ListMode::Nodes => graph.nodes.len(),
                ListMode::Edges => graph.edges.len(),
            })
            .unwrap_or(0)
    }

    pub fn move_selection(&mut self, delta: isize) {
        match self.focus {
            Focus::Plans => {
                let len = self.filtered_plans().len();
                self.plan_cursor = step(self.plan_cursor, delta, len);
            }
            Focus::Planning | Focus::Execution => {
                let Some(kind) = self.focus.graph_kind() else {
                    return;
                };
                let len = self.row_count(kind);
                let cursor = self.cursor_mut(kind);
                *cursor = step(*cursor, delta, len);
            }
            Focus::Artifacts | Focus::Agents => {
                self.scroll = if delta < 0 {
                    self.scroll.saturating_sub(1)
                } else {
                    self.scroll.saturating_add(1)
                };
            }
        }
    }

    /// Node under the cursor; in edge mode, the edge's source node.
    pub fn selected_node(&self, kind: GraphKind) -> Option<String> {
        let graph = self.graph(kind)?;
        let cursor = self.cursor(kind);
        match self.list_mode {
            ListMode::Nodes => graph.nodes.get(cursor).map(|node| node.id.clone()),
            ListMode::Edges => graph.edges.get(cursor).map(|edge| edge.from.clone()),
        }
    }

    pub fn cycle_state_filter(&mut self) {
        let states = unique_states(self.store.summaries());
        let next = match self.plan_filter.state.as_deref() {
            None => states.first().cloned(),
            Some(current) => states
                .iter()
                .position(|state| state == current)
                .and_then(|idx| states.get(idx + 1))
                .cloned(),
        };
        self.plan_filter.state = next;
        self.plan_cursor = 0;
    }

    pub fn toggle_highlight(&mut self, state: TaskState) {
        let active = self.highlight.toggle(state.clone());
        self.status_note = Some(format!(
            "highlight {} {}",
            if active { "+" } else { "-" },
            state.as_str()
        ));
    }

    pub fn absorb(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Nothing => {}
            SyncOutcome::Note(note) => self.status_note = Some(note),
            SyncOutcome::Popup(pending) => {
                self.popup = None;
                self.pending_popup = Some(pending);
            }
        }
    }

    pub fn apply_push_event(&mut self, event: &PushEvent) {
        match event {
            PushEvent::Connected => self.push_connected = true,
            PushEvent::Disconnected => self.push_connected = false,
            PushEvent::Update(_) => {}
        }
    }

    /// Second phase of the popup protocol: measure, then place inside `container`.
    pub fn place_pending_popup(&mut self, container: Rect) {
        let Some(pending) = self.pending_popup.take() else {
            return;
        };
        let measured = ui::measure_popup(&pending.content, container);
        let bounds = Size {
            w: i32::from(container.width),
            h: i32::from(container.height),
        };
        let relative = Position {
            x: pending.anchor.x - i32::from(container.x),
            y: pending.anchor.y - i32::from(container.y),
        };
        let mut popup = PendingPopup { anchor: relative, ..pending }.place(measured, bounds);
        popup.position.x += i32::from(container.x);
        popup.position.y += i32::from(container.y);
        self.popup = Some(popup);
    }

    pub fn close_popup(&mut self) -> bool {
        let had_popup = self.popup.is_some() || self.pending_popup.is_some();
        self.popup = None;
        self.pending_popup = None;
        had_popup
    }
}

fn step(cursor: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let next = cursor as isize + delta;
    next.clamp(0, len as isize - 1) as usize
}

pub fn handle_input(event: Event, app: &mut App) -> InputAction {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(key, app),
        _ => InputAction::None,
    }
}

fn handle_key(key: KeyEvent, app: &mut App) -> InputAction {
    if matches!(key.code, KeyCode::Char('?') | KeyCode::F(1)) {
        app.help_open = !app.help_open;
        return InputAction::None;
    }
    if key.code == KeyCode::Esc {
        if app.help_open {
            app.help_open = false;
        } else {
            app.close_popup();
        }
        return InputAction::None;
    }
    if app.help_open {
        return InputAction::None;
    }

    match key.code {
        KeyCode::Char('q') => InputAction::Quit,
        KeyCode::Tab => {
            app.focus = app.focus.next();
            app.scroll = 0;
            InputAction::None
        }
        KeyCode::Char('1') => focus(app, Focus::Plans),
        KeyCode::Char('2') => focus(app, Focus::Planning),
        KeyCode::Char('3') => focus(app, Focus::Execution),
        KeyCode::Char('4') => focus(app, Focus::Artifacts),
        KeyCode::Char('5') => focus(app, Focus::Agents),
        KeyCode::Down | KeyCode::Char('j') => {
            app.move_selection(1);
            InputAction::None
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.move_selection(-1);
            InputAction::None
        }
        KeyCode::Enter => match app.focus {
            Focus::Plans => app
                .filtered_plans()
                .get(app.plan_cursor)
                .map(|plan| InputAction::SelectPlan(plan.global_plan_id.clone()))
                .unwrap_or(InputAction::None),
            Focus::Planning | Focus::Execution => {
                let Some(kind) = app.focus.graph_kind() else {
                    return InputAction::None;
                };
                app.selected_node(kind)
                    .map(|node_id| InputAction::Resolve { kind, node_id })
                    .unwrap_or(InputAction::None)
            }
            _ => InputAction::None,
        },
        KeyCode::Char('e') => {
            app.list_mode = match app.list_mode {
                ListMode::Nodes => ListMode::Edges,
                ListMode::Edges => ListMode::Nodes,
            };
            app.planning_cursor = 0;
            app.execution_cursor = 0;
            InputAction::None
        }
        KeyCode::Char('f') => {
            app.plan_filter.status = app.plan_filter.status.next();
            app.plan_cursor = 0;
            InputAction::None
        }
        KeyCode::Char('s') => {
            app.cycle_state_filter();
            InputAction::None
        }
        KeyCode::Char('c') => highlight(app, TaskState::Completed),
        KeyCode::Char('x') => highlight(app, TaskState::Failed),
        KeyCode::Char('w') => highlight(app, TaskState::Working),
        KeyCode::Char('p') => highlight(app, TaskState::Pending),
        KeyCode::Char('u') => highlight(app, TaskState::UnableToComplete),
        KeyCode::Char('0') => {
            app.highlight.clear();
            app.status_note = Some("highlight cleared".to_string());
            InputAction::None
        }
        KeyCode::Char('r') => InputAction::Refresh,
        KeyCode::Char('a') => InputAction::ToggleAutoRefresh,
        _ => InputAction::None,
    }
}

fn focus(app: &mut App, target: Focus) -> InputAction {
    app.focus = target;
    app.scroll = 0;
    InputAction::None
}

fn highlight(app: &mut App, state: TaskState) -> InputAction {
    app.toggle_highlight(state);
    InputAction::None
}
