//! `whdbg listen`: stream a listener's requests and control its response

use crate::config::Config;
use crate::session::{
    ConnectionState, ReconnectConfig, Session, SessionOptions, SessionUpdate,
};
use crate::tui::{Action, TuiApp, TuiEvent};
use anyhow::{bail, Context, Result};
use console::style;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::Duration;
use whdbg_common::{status, ResponseOverride};

/// Options for the listen command
#[derive(Debug, Clone)]
pub struct ListenOptions {
    pub listener: String,
    pub status: Option<u16>,
    pub body: Option<String>,
    pub plain: bool,
    pub json: bool,
}

impl ListenOptions {
    /// Whether the full screen interface is used
    pub fn interactive(&self) -> bool {
        !self.plain && !self.json && console::Term::stdout().is_term()
    }
}

/// Build the session options from config and flags
pub fn session_options(config: &Config, opts: &ListenOptions) -> Result<SessionOptions> {
    let code = opts.status.unwrap_or(status::DEFAULT_STATUS_CODE);
    if !status::is_known(code) {
        bail!(
            "Unknown status code {} (run `whdbg codes` for the list)",
            code
        );
    }

    Ok(SessionOptions {
        listener: opts.listener.clone(),
        server_url: config.server_url(),
        websocket_url: config.websocket_url(),
        initial_override: ResponseOverride::new(code, opts.body.clone().unwrap_or_default()),
        push_timeout: config.push_timeout(),
        reconnect: ReconnectConfig {
            max_backoff: config.reconnect_max(),
            ..ReconnectConfig::default()
        },
    })
}

pub async fn run(config: Config, opts: ListenOptions) -> Result<()> {
    let session_opts = session_options(&config, &opts)?;
    let session = Session::start(session_opts)
        .await
        .context("Failed to start listener session")?;

    if opts.interactive() {
        run_with_tui(session).await
    } else {
        run_plain(session, opts.json).await
    }
}

/// Run with full TUI
async fn run_with_tui(mut session: Session) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = TuiApp::new();

    // Run event loop
    let result = run_tui_loop(&mut terminal, &mut app, &mut session).await;

    session.shutdown().await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_tui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut TuiApp,
    session: &mut Session,
) -> Result<()> {
    let mut tick_interval = tokio::time::interval(Duration::from_millis(100));

    loop {
        // Draw UI
        {
            let view = session.view();
            terminal.draw(|f| crate::tui::draw(f, app, &view))?;
        }

        tokio::select! {
            // Handle keyboard events (non-blocking)
            _ = tick_interval.tick() => {
                while event::poll(Duration::from_millis(0))? {
                    let Event::Key(key) = event::read()? else {
                        continue;
                    };
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }

                    let action = app.handle_event(TuiEvent::Key(key), &session.view());
                    if let Some(action) = action {
                        apply_action(session, app, action).await;
                    }
                    if app.should_quit {
                        return Ok(());
                    }
                }
            }

            update = session.step() => {
                app.handle_event(TuiEvent::Session(update), &session.view());
            }
        }
    }
}

async fn apply_action(session: &mut Session, app: &mut TuiApp, action: Action) {
    match action {
        Action::ToggleRead(index) => {
            session.toggle_read(index);
        }
        Action::SetStatusCode(code) => {
            if let Err(e) = session.set_status_code(code) {
                app.notice = Some(e.to_string());
            }
        }
        Action::SetBody(body) => {
            session.set_body(body);
        }
        Action::SwitchListener(listener) => match session.switch_listener(&listener).await {
            Ok(_) => app.notice = None,
            Err(e) => app.notice = Some(e.to_string()),
        },
        Action::Quit => {}
    }
}

/// Stream to stdout until Ctrl+C
async fn run_plain(mut session: Session, json: bool) -> Result<()> {
    if !json {
        let view = session.view();
        println!(
            "{} {}",
            style("Send requests to:").dim(),
            style(&view.listener_url).green().bold(),
        );
        println!(
            "{} {}",
            style("Responding with:").dim(),
            describe_override(view.response),
        );
        println!();
        println!(
            "{}  {}",
            style("◆").green(),
            style("Waiting for requests... (Ctrl+C to stop)").dim()
        );
        println!();
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = session.step() => print_update(&session, update, json)?,
        }
    }

    session.shutdown().await;
    if !json {
        let summary = if session.log().is_empty() {
            "No requests received".to_string()
        } else {
            format!("Received {} requests", session.log().len())
        };
        eprintln!();
        eprintln!("{}", style(summary).dim());
    }
    Ok(())
}

fn print_update(session: &Session, update: SessionUpdate, json: bool) -> Result<()> {
    match update {
        SessionUpdate::Appended(index) => {
            let Some(entry) = session.log().get(index) else {
                return Ok(());
            };
            if json {
                println!("{}", serde_json::to_string(entry.record)?);
            } else {
                let request = &entry.record.request;
                println!(
                    "  {} {} {} {}",
                    style(crate::tui::format_timestamp(&entry.record.timestamp)).dim(),
                    method_styled(&request.method),
                    entry.record.full_url(),
                    style(&request.proto).dim(),
                );
            }
        }
        SessionUpdate::State(state) if !json => {
            let styled = match state {
                ConnectionState::Open => style(state.as_str()).green(),
                ConnectionState::Closed => style(state.as_str()).red(),
                _ => style(state.as_str()).yellow(),
            };
            eprintln!("{} {}", style("Stream:").dim(), styled);
        }
        SessionUpdate::PushSucceeded if !json => {
            eprintln!(
                "{} Responding with {}",
                style("✓").green(),
                describe_override(session.response())
            );
        }
        SessionUpdate::PushFailed(e) => {
            eprintln!(
                "{} Response override not applied: {}",
                style("✗").red(),
                e
            );
        }
        SessionUpdate::DecodeFailed(e) => {
            tracing::warn!("Dropped undecodable frame: {}", e);
        }
        _ => {}
    }
    Ok(())
}

fn method_styled(method: &str) -> console::StyledObject<String> {
    let padded = format!("{:>7}", method);
    match method {
        "GET" => style(padded).green(),
        "POST" => style(padded).yellow(),
        "PUT" => style(padded).blue(),
        "PATCH" => style(padded).magenta(),
        "DELETE" => style(padded).red(),
        "HEAD" => style(padded).cyan(),
        _ => style(padded).white(),
    }
}

fn describe_override(response: &ResponseOverride) -> String {
    let label = status::label(response.status_code)
        .map(str::to_string)
        .unwrap_or_else(|| response.status_code.to_string());
    if response.reflects_body() {
        format!("{}, echoing the request body", label)
    } else {
        format!("{}, body {:?}", label, response.response_body)
    }
}
