mod api;
mod app;
mod config;
mod push;
mod scheduler;
mod theme;
mod ui;

use anyhow::Context;
use app::{handle_input, App, InputAction};
use clap::Parser;
use config::{init_logging, Args, Config};
use crossterm::{
    event::{Event, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use gra_core::projector::GraphProjector;
use push::{push_loop, PushEvent};
use ratatui::{backend::CrosstermBackend, Terminal};
use scheduler::{SyncMessage, SyncScheduler};
use std::io;
use std::ops::ControlFlow;
use tokio::sync::mpsc;
use tracing::{info, warn};

const SYNC_QUEUE_CAPACITY: usize = 256;
const PUSH_QUEUE_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args(Args::parse())?;
    init_logging(&config);
    info!(
        event = "startup",
        backend = %config.backend_url,
        push = %config.push_url,
        push_enabled = config.push_enabled
    );

    let client = api::BackendClient::new(config.backend_url.clone(), config.request_timeout)
        .context("building http client")?;
    let (sync_tx, mut sync_rx) = mpsc::channel(SYNC_QUEUE_CAPACITY);
    let mut scheduler = SyncScheduler::new(client, sync_tx, config.auto_refresh);
    let mut app = App::new(
        GraphProjector::new(config.palette.clone()),
        config.finished_states.clone(),
        config.push_enabled,
        config.auto_refresh,
    );

    let (push_tx, mut push_rx) = mpsc::channel(PUSH_QUEUE_CAPACITY);
    let _push_tx_guard = if config.push_enabled {
        let url = config.push_url.clone();
        tokio::spawn(async move {
            push_loop(url, push_tx).await;
        });
        None
    } else {
        app.status_note = Some("push channel disabled (GRA_PUSH_ENABLED=0)".to_string());
        Some(push_tx)
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&config, &mut terminal, &mut app, &mut scheduler, &mut sync_rx, &mut push_rx).await;

    scheduler.shutdown();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

async fn run(
    config: &Config,
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    scheduler: &mut SyncScheduler,
    sync_rx: &mut mpsc::Receiver<SyncMessage>,
    push_rx: &mut mpsc::Receiver<PushEvent>,
) -> anyhow::Result<()> {
    let mut events = EventStream::new();
    let mut summary_ticker = tokio::time::interval(config.summary_interval);
    let mut detail_ticker = tokio::time::interval(config.detail_interval);

    if let Some(plan_id) = &config.initial_plan {
        scheduler.select_plan(&mut app.store, plan_id);
    }

    loop {
        let size = terminal.size()?;
        app.place_pending_popup(size);
        terminal.draw(|frame| ui::render_ui(frame, app))?;

        tokio::select! {
            _ = summary_ticker.tick() => {
                scheduler.refresh_summaries();
            }
            _ = detail_ticker.tick() => {
                scheduler.on_detail_tick(&mut app.store);
            }
            Some(msg) = sync_rx.recv() => {
                let outcome = scheduler.apply(&mut app.store, msg);
                app.absorb(outcome);
            }
            Some(event) = push_rx.recv() => {
                app.apply_push_event(&event);
                if let PushEvent::Update(update) = event {
                    scheduler.apply_push(&mut app.store, update);
                }
            }
            maybe_event = events.next() => {
                let event = match next_input(maybe_event) {
                    ControlFlow::Break(()) => break,
                    ControlFlow::Continue(None) => continue,
                    ControlFlow::Continue(Some(event)) => event,
                };
                match handle_input(event, app) {
                    InputAction::None => {}
                    InputAction::Quit => break,
                    InputAction::SelectPlan(plan_id) => {
                        app.close_popup();
                        app.planning_cursor = 0;
                        app.execution_cursor = 0;
                        if !scheduler.select_plan(&mut app.store, &plan_id) {
                            scheduler.refresh_detail(&mut app.store);
                        }
                    }
                    InputAction::Refresh => {
                        scheduler.refresh_summaries();
                        scheduler.refresh_detail(&mut app.store);
                    }
                    InputAction::ToggleAutoRefresh => {
                        app.auto_refresh = scheduler.toggle_auto_refresh();
                    }
                    InputAction::Resolve { kind, node_id } => {
                        let anchor = ui::selection_anchor(app, terminal.size()?);
                        scheduler.resolve_node(&app.store, kind, &node_id, anchor);
                    }
                }
            }
        }
    }
    Ok(())
}

/// A closed input stream ends the loop; read errors are skipped.
fn next_input(maybe_event: Option<io::Result<Event>>) -> ControlFlow<(), Option<Event>> {
    match maybe_event {
        Some(Ok(event)) => ControlFlow::Continue(Some(event)),
        Some(Err(err)) => {
            warn!(event = "input_error", error = %err);
            ControlFlow::Continue(None)
        }
        None => {
            info!(event = "input_closed");
            ControlFlow::Break(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    #[test]
    fn closed_input_stream_stops_the_loop() {
        assert_eq!(next_input(None), ControlFlow::Break(()));
    }

    #[test]
    fn input_errors_are_skipped_and_events_pass_through() {
        let err = io::Error::new(io::ErrorKind::Other, "tty gone");
        assert_eq!(next_input(Some(Err(err))), ControlFlow::Continue(None));

        let key = Event::Key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE));
        assert_eq!(
            next_input(Some(Ok(key.clone()))),
            ControlFlow::Continue(Some(key))
        );
    }
}
