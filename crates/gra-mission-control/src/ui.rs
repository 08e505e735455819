use crate::app::{App, Focus, ListMode};
use crate::theme::{color, health_color, phase_color, theme, Theme};
use gra_core::artifact::ArtifactContent;
use gra_core::popup::{Position, Size};
use gra_core::projector::{truncate_label, RenderNode, RenderableGraph};
use gra_core::stats::StateCounts;
use gra_core::GraphKind;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

const POPUP_MIN_WIDTH: usize = 24;

pub struct Areas {
    pub header: Rect,
    pub plans: Rect,
    pub planning: Rect,
    pub execution: Rect,
    pub artifacts: Rect,
    pub agents: Rect,
    pub footer: Rect,
}

pub fn layout_areas(size: Rect) -> Areas {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(size);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(26),
            Constraint::Percentage(46),
            Constraint::Percentage(28),
        ])
        .split(rows[1]);
    let graphs = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(columns[1]);
    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(columns[2]);
    Areas {
        header: rows[0],
        plans: columns[0],
        planning: graphs[0],
        execution: graphs[1],
        artifacts: side[0],
        agents: side[1],
        footer: rows[2],
    }
}

/// First visible row for a list whose cursor must stay inside `area`.
fn scroll_offset(cursor: usize, area: Rect) -> usize {
    let visible = usize::from(area.height.saturating_sub(2)).max(1);
    cursor.saturating_sub(visible - 1)
}

/// Screen cell of the selected graph row; used as the popup anchor.
pub fn selection_anchor(app: &App, size: Rect) -> Position {
    let areas = layout_areas(size);
    let (area, cursor) = match app.focus {
        Focus::Planning => (areas.planning, app.planning_cursor),
        Focus::Execution => (areas.execution, app.execution_cursor),
        _ => (areas.plans, app.plan_cursor),
    };
    let row = cursor - scroll_offset(cursor, area);
    Position {
        x: i32::from(area.x) + 2,
        y: i32::from(area.y) + 1 + row as i32,
    }
}

pub fn popup_text(content: &ArtifactContent) -> String {
    match content {
        ArtifactContent::Text(text) => text.clone(),
        ArtifactContent::Json(value) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        ArtifactContent::Unresolved => String::new(),
    }
}

/// Content-dependent popup size, bounded by `container`.
pub fn measure_popup(content: &ArtifactContent, container: Rect) -> Size {
    let text = popup_text(content);
    let max_inner_w = usize::from(container.width.saturating_mul(3) / 4)
        .saturating_sub(2)
        .max(1);
    let longest = text.lines().map(|line| line.chars().count()).max().unwrap_or(0);
    let inner_w = longest.max(POPUP_MIN_WIDTH).min(max_inner_w);
    let wrapped: usize = text
        .lines()
        .map(|line| line.chars().count().max(1).div_ceil(inner_w))
        .sum::<usize>()
        .max(1);
    let max_inner_h = usize::from(container.height.saturating_mul(2) / 3)
        .saturating_sub(2)
        .max(1);
    let w = (inner_w + 2).min(usize::from(container.width));
    let h = (wrapped.min(max_inner_h) + 2).min(usize::from(container.height));
    Size {
        w: w as i32,
        h: h as i32,
    }
}

pub fn render_ui(frame: &mut Frame, app: &App) {
    let size = frame.size();
    let theme = theme();
    let areas = layout_areas(size);
    frame.render_widget(
        Block::default().style(Style::default().bg(theme.bg)),
        size,
    );
    frame.render_widget(render_header(app, theme), areas.header);
    render_plans(frame, app, theme, areas.plans);
    render_graph(frame, app, theme, GraphKind::Planning, areas.planning);
    render_graph(frame, app, theme, GraphKind::Execution, areas.execution);
    render_artifacts(frame, app, theme, areas.artifacts);
    render_agents(frame, app, theme, areas.agents);
    frame.render_widget(render_footer(theme), areas.footer);
    if let Some(popup) = &app.popup {
        render_popup(frame, theme, popup);
    }
    if app.help_open {
        render_help_overlay(frame, theme);
    }
}

fn panel(title: String, focused: bool, theme: Theme) -> Block<'static> {
    let border = if focused { theme.focus } else { theme.border };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(theme.surface))
        .title(Span::styled(
            title,
            Style::default()
                .fg(theme.title)
                .add_modifier(Modifier::BOLD),
        ))
}

fn render_header(app: &App, theme: Theme) -> Paragraph<'static> {
    let phase = app.store.phase();
    let board = app.store.board();
    let plan = app
        .store
        .plan_detail()
        .and_then(|detail| detail.objective().map(str::to_string))
        .or_else(|| app.store.selected_plan_id().map(str::to_string))
        .unwrap_or_else(|| "no plan selected".to_string());
    let push = match (app.push_enabled, app.push_connected) {
        (false, _) => ("off", theme.muted),
        (true, true) => ("live", theme.ok),
        (true, false) => ("reconnecting", theme.warn),
    };
    let (flow, flow_color) = if app.flow_running() {
        ("running", theme.ok)
    } else {
        ("idle", theme.muted)
    };
    let failures = app.has_failures();

    let line1 = Line::from(vec![
        Span::styled(
            "GRA Mission Control ",
            Style::default()
                .fg(theme.title)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(truncate_label(&plan, 48), Style::default().fg(theme.text)),
        Span::raw("  "),
        Span::styled(
            format!("sync:{}", phase.label()),
            Style::default().fg(phase_color(&phase, theme)),
        ),
        Span::raw("  "),
        Span::styled(format!("flow:{flow}"), Style::default().fg(flow_color)),
        Span::raw("  "),
        Span::styled(
            if failures { "failures:yes" } else { "failures:no" },
            Style::default().fg(if failures { theme.critical } else { theme.muted }),
        ),
    ]);
    let line2 = Line::from(vec![
        Span::styled(
            format!("gra:{}", board.health().as_str()),
            Style::default().fg(health_color(board.health(), theme)),
        ),
        Span::raw("  "),
        Span::styled(format!("push:{}", push.0), Style::default().fg(push.1)),
        Span::raw("  "),
        Span::styled(
            format!(
                "agents:{}/{}",
                board.online_count(),
                board.len()
            ),
            Style::default().fg(theme.text),
        ),
        Span::raw("  "),
        Span::styled(
            format!("auto:{}", if app.auto_refresh { "on" } else { "off" }),
            Style::default().fg(theme.muted),
        ),
        Span::raw("  "),
        Span::styled(
            format!("highlight:{}", app.highlight.summary()),
            Style::default().fg(theme.accent),
        ),
    ]);
    let mut lines = vec![line1, line2];
    let note = match (&phase, &app.status_note) {
        (gra_core::store::SyncPhase::Error(message), _) => Some((message.clone(), theme.critical)),
        (_, Some(note)) => Some((note.clone(), theme.muted)),
        _ => None,
    };
    if let Some((note, note_color)) = note {
        lines.push(Line::from(Span::styled(note, Style::default().fg(note_color))));
    }
    Paragraph::new(Text::from(lines))
        .style(Style::default().bg(theme.bg))
        .block(Block::default().borders(Borders::BOTTOM).border_style(Style::default().fg(theme.border)))
}

fn render_plans(frame: &mut Frame, app: &App, theme: Theme, area: Rect) {
    let plans = app.filtered_plans();
    let selected = app.store.selected_plan_id();
    let mut title = format!("Plans [{}]", app.plan_filter.status);
    if let Some(state) = &app.plan_filter.state {
        title.push_str(&format!(" {}", truncate_label(state, 18)));
    }
    let lines: Vec<Line<'static>> = if plans.is_empty() {
        vec![Line::from(Span::styled(
            "No plans.",
            Style::default().fg(theme.muted),
        ))]
    } else {
        plans
            .iter()
            .enumerate()
            .map(|(idx, plan)| {
                let cursor = app.focus == Focus::Plans && idx == app.plan_cursor;
                let is_selected = selected == Some(plan.global_plan_id.as_str());
                let finished = app.finished_states.iter().any(|f| f == plan.state());
                let mut style = Style::default().fg(if is_selected { theme.accent } else { theme.text });
                if cursor {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                Line::from(vec![
                    Span::styled(if is_selected { "● " } else { "  " }, style),
                    Span::styled(truncate_label(plan.title(), 30), style),
                    Span::raw(" "),
                    Span::styled(
                        plan.state().to_ascii_lowercase(),
                        Style::default().fg(if finished { theme.muted } else { theme.warn }),
                    ),
                ])
            })
            .collect()
    };
    let offset = scroll_offset(app.plan_cursor, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .scroll((offset as u16, 0))
            .block(panel(title, app.focus == Focus::Plans, theme)),
        area,
    );
}

fn counts_label(counts: Option<&StateCounts>) -> String {
    match counts {
        None => "no data".to_string(),
        Some(counts) if counts.is_empty() => "empty".to_string(),
        Some(counts) => counts
            .iter()
            .map(|(state, count)| format!("{state}:{count}"))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn node_line(node: &RenderNode, cursor: bool, palette_normal: u16) -> Line<'static> {
    let marker = if node.size > palette_normal {
        "◉ "
    } else if node.size < palette_normal {
        "· "
    } else {
        "● "
    };
    let mut label_style = Style::default().fg(color(node.fill));
    if node.border_width > 1 {
        label_style = label_style.add_modifier(Modifier::BOLD);
    }
    if node.size < palette_normal {
        label_style = label_style.add_modifier(Modifier::DIM);
    }
    if cursor {
        label_style = label_style.add_modifier(Modifier::REVERSED);
    }
    Line::from(vec![
        Span::styled("▌", Style::default().fg(color(node.border))),
        Span::styled(marker, Style::default().fg(color(node.fill))),
        Span::styled(node.label.clone(), label_style),
        Span::raw(" "),
        Span::styled(
            node.state.as_str().to_string(),
            Style::default().fg(color(node.border)),
        ),
    ])
}

fn graph_lines(app: &App, graph: &RenderableGraph, focused: bool, theme: Theme) -> Vec<Line<'static>> {
    let cursor = app.cursor(graph.kind);
    let normal = app.projector.palette().size_normal;
    match app.list_mode {
        ListMode::Nodes => graph
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| node_line(node, focused && idx == cursor, normal))
            .collect(),
        ListMode::Edges => graph
            .edges
            .iter()
            .enumerate()
            .map(|(idx, edge)| {
                let mut style = Style::default().fg(theme.text);
                if focused && idx == cursor {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                let label = |id: &str| {
                    graph
                        .node(id)
                        .map(|node| node.label.clone())
                        .unwrap_or_else(|| id.to_string())
                };
                Line::from(vec![
                    Span::styled(label(&edge.from), style),
                    Span::styled(" → ", Style::default().fg(theme.muted)),
                    Span::styled(label(&edge.to), style),
                ])
            })
            .collect(),
    }
}

fn render_graph(frame: &mut Frame, app: &App, theme: Theme, kind: GraphKind, area: Rect) {
    let focused = app.focus.graph_kind() == Some(kind);
    let counts = app.counts(kind);
    let mode = match app.list_mode {
        ListMode::Nodes => "nodes",
        ListMode::Edges => "edges",
    };
    let title = format!("{} ({mode}) {}", kind.title(), counts_label(counts.as_ref()));
    let lines = match app.graph(kind) {
        Some(graph) if !graph.nodes.is_empty() => graph_lines(app, &graph, focused, theme),
        Some(_) => vec![Line::from(Span::styled(
            "Graph is empty.",
            Style::default().fg(theme.muted),
        ))],
        None => vec![Line::from(Span::styled(
            "No graph for this plan.",
            Style::default().fg(theme.muted),
        ))],
    };
    let offset = scroll_offset(app.cursor(kind), area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .scroll((offset as u16, 0))
            .block(panel(title, focused, theme)),
        area,
    );
}

fn render_artifacts(frame: &mut Frame, app: &App, theme: Theme, area: Rect) {
    let items = app.store.final_artifacts();
    let mut lines: Vec<Line<'static>> = Vec::new();
    if items.is_empty() {
        lines.push(Line::from(Span::styled(
            "No final artifacts yet.",
            Style::default().fg(theme.muted),
        )));
    }
    for item in items {
        lines.push(Line::from(vec![
            Span::styled(
                truncate_label(&item.task, 35),
                Style::default()
                    .fg(theme.text)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            Span::styled(
                item.updated_at.clone().unwrap_or_default(),
                Style::default().fg(theme.muted),
            ),
        ]));
        let preview = popup_text(&item.content);
        let first = preview.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
        lines.push(Line::from(Span::styled(
            format!("  {}", truncate_label(first.trim(), 60)),
            Style::default().fg(theme.muted),
        )));
    }
    let scroll = if app.focus == Focus::Artifacts { app.scroll } else { 0 };
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .scroll((scroll, 0))
            .block(panel("Final artifacts".to_string(), app.focus == Focus::Artifacts, theme)),
        area,
    );
}

fn render_agents(frame: &mut Frame, app: &App, theme: Theme, area: Rect) {
    let board = app.store.board();
    let mut lines: Vec<Line<'static>> = Vec::new();
    if let Some(state) = board.gra_state() {
        lines.push(Line::from(Span::styled(
            format!("supervisor: {state}"),
            Style::default().fg(theme.accent),
        )));
    }
    if board.is_empty() {
        lines.push(Line::from(Span::styled(
            "No agents reported.",
            Style::default().fg(theme.muted),
        )));
    }
    for agent in board.agents() {
        let online = agent.is_online();
        let mut spans = vec![
            Span::styled(
                if online { "● " } else { "○ " },
                Style::default().fg(if online { theme.ok } else { theme.critical }),
            ),
            Span::styled(agent.short_name().to_string(), Style::default().fg(theme.text)),
        ];
        if let Some(stats) = board.stats_for(agent) {
            spans.push(Span::styled(
                format!("  ✓{} ✗{}", stats.tasks_completed, stats.tasks_failed),
                Style::default().fg(theme.muted),
            ));
        }
        if !agent.skills.is_empty() {
            spans.push(Span::styled(
                format!("  {}", truncate_label(&agent.skills.join(","), 24)),
                Style::default().fg(theme.muted),
            ));
        }
        lines.push(Line::from(spans));
    }
    let scroll = if app.focus == Focus::Agents { app.scroll } else { 0 };
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .scroll((scroll, 0))
            .block(panel("Agents".to_string(), app.focus == Focus::Agents, theme)),
        area,
    );
}

fn render_footer(theme: Theme) -> Paragraph<'static> {
    Paragraph::new(Line::from(Span::styled(
        "Tab/1-5 focus  j/k move  Enter open  e nodes/edges  f/s filter  c/x/w/p/u highlight  0 clear  r refresh  a auto  ? help  q quit",
        Style::default().fg(theme.muted),
    )))
    .style(Style::default().bg(theme.bg))
}

fn render_popup(frame: &mut Frame, theme: Theme, popup: &gra_core::popup::Popup) {
    let frame_area = frame.size();
    let area = Rect::new(
        popup.position.x.max(0) as u16,
        popup.position.y.max(0) as u16,
        popup.size.w.max(0) as u16,
        popup.size.h.max(0) as u16,
    )
    .intersection(frame_area);
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(popup_text(&popup.content))
            .style(Style::default().fg(theme.text).bg(theme.surface))
            .wrap(Wrap { trim: false })
            .block(panel(
                format!("Artifact · {} (Esc)", popup.target.title()),
                true,
                theme,
            )),
        area,
    );
}

fn render_help_overlay(frame: &mut Frame, theme: Theme) {
    let area = centered_rect(70, 70, frame.size());
    let heading = |text: &'static str| {
        Line::from(Span::styled(
            text,
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ))
    };
    let lines = vec![
        heading("Navigation"),
        Line::from("  Tab      cycle panels"),
        Line::from("  1-5      plans / team 1 / team 2 / artifacts / agents"),
        Line::from("  j/k      move selection or scroll"),
        Line::from("  Enter    select plan; open artifact of node (edge: its source)"),
        Line::from("  e        toggle node and edge lists"),
        Line::from(""),
        heading("Plans"),
        Line::from("  f        status filter (all / in_progress / finished)"),
        Line::from("  s        cycle supervisor-state filter"),
        Line::from(""),
        heading("Team 2 highlight"),
        Line::from("  c x w p u  toggle completed / failed / working / pending / unable"),
        Line::from("  0          clear highlight"),
        Line::from(""),
        heading("Sync & Exit"),
        Line::from("  r        refresh now"),
        Line::from("  a        toggle auto refresh"),
        Line::from("  ? or F1  toggle this help"),
        Line::from("  Esc      close popup or help"),
        Line::from("  q        quit"),
    ];
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().fg(theme.text).bg(theme.surface))
            .block(panel("Help".to_string(), true, theme))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn popup_measure_fits_content_and_container() {
        let container = Rect::new(0, 0, 80, 24);
        let small = measure_popup(&ArtifactContent::Text("ok".to_string()), container);
        assert_eq!(small, Size { w: 26, h: 3 });

        let long = "x".repeat(500);
        let big = measure_popup(&ArtifactContent::Text(long), container);
        assert!(big.w <= 80 && big.h <= 24);
        assert_eq!(big.w, 60);
    }

    #[test]
    fn json_content_is_pretty_printed() {
        let text = popup_text(&ArtifactContent::Json(json!({"a": 1})));
        assert_eq!(text, "{\n  \"a\": 1\n}");
        assert_eq!(popup_text(&ArtifactContent::Unresolved), "");
    }

    #[test]
    fn counts_label_lists_states_in_order() {
        let counts: StateCounts = [("completed".to_string(), 2), ("failed".to_string(), 1)]
            .into_iter()
            .collect();
        assert_eq!(counts_label(Some(&counts)), "completed:2 failed:1");
        assert_eq!(counts_label(None), "no data");
    }

    #[test]
    fn anchor_tracks_scrolled_cursor() {
        let size = Rect::new(0, 0, 120, 40);
        let areas = layout_areas(size);
        assert_eq!(scroll_offset(3, areas.execution), 0);
        let visible = usize::from(areas.execution.height - 2);
        assert_eq!(scroll_offset(visible + 4, areas.execution), 5);
    }
}
