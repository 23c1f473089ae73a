//! TUI rendering functions

use super::app::{Mode, TuiApp};
use crate::session::{ConnectionState, LogEntry, SessionView};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Cell, Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState,
        Table, TableState, Wrap,
    },
    Frame,
};
use whdbg_common::status;

/// Draw the TUI
pub fn draw(frame: &mut Frame, app: &TuiApp, view: &SessionView<'_>) {
    let selected = app
        .selected_index(view)
        .and_then(|index| view.entries.iter().find(|e| e.index == index));
    let expanded = selected.filter(|e| e.expanded);

    let mut constraints = vec![
        Constraint::Length(3), // Listener + connection
        Constraint::Length(4), // Response override
        Constraint::Min(5),    // Requests
    ];
    if expanded.is_some() {
        constraints.push(Constraint::Percentage(40)); // Dump of the expanded request
    }
    constraints.push(Constraint::Length(1)); // Footer

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(frame.area());

    draw_header(frame, view, chunks[0]);
    draw_override(frame, app, view, chunks[1]);
    draw_requests(frame, app, view, chunks[2]);
    if let Some(entry) = expanded {
        draw_detail(frame, entry, chunks[3]);
    }
    draw_footer(frame, app, chunks[chunks.len() - 1]);
}

/// Listener URL, connection state and counters
fn draw_header(frame: &mut Frame, view: &SessionView<'_>, area: Rect) {
    let lines = vec![
        Line::from(vec![
            Span::styled("Send requests to  ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                view.listener_url.as_str(),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("Stream            ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                view.state.as_str(),
                Style::default()
                    .fg(state_color(view.state))
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled("  │  ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                format!("{} requests", view.entries.len()),
                Style::default().fg(Color::White),
            ),
            Span::styled(
                format!(" ({} unread)", view.unread),
                Style::default().fg(Color::Cyan),
            ),
            Span::styled(dropped_frames(view.decode_errors), Style::default().fg(Color::Red)),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(Color::DarkGray));

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// Current override and its sync status
fn draw_override(frame: &mut Frame, app: &TuiApp, view: &SessionView<'_>, area: Rect) {
    let code = view.response.status_code;
    let label = status::label(code)
        .map(str::to_string)
        .unwrap_or_else(|| code.to_string());

    let body = if app.mode == Mode::EditBody {
        Span::styled(
            format!("{}▏", single_line(&app.input)),
            Style::default().fg(Color::Yellow),
        )
    } else if view.response.reflects_body() {
        Span::styled("(reflect request body)", Style::default().fg(Color::DarkGray))
    } else {
        Span::styled(
            single_line(&view.response.response_body),
            Style::default().fg(Color::White),
        )
    };

    let sync = match (view.pending, view.last_error, app.notice.as_deref()) {
        (true, Some(err), _) => Span::styled(format!("not applied: {}", err), Style::default().fg(Color::Red)),
        (true, None, _) if view.pushing => Span::styled("pushing...", Style::default().fg(Color::Yellow)),
        (true, None, _) => Span::styled("pending", Style::default().fg(Color::Yellow)),
        (false, _, Some(notice)) => Span::styled(notice.to_string(), Style::default().fg(Color::Yellow)),
        (false, _, None) => Span::styled("applied", Style::default().fg(Color::Green)),
    };

    let lines = vec![
        Line::from(vec![
            Span::styled("Status            ", Style::default().fg(Color::DarkGray)),
            Span::styled(label, status_style(code).add_modifier(Modifier::BOLD)),
            Span::styled("  │  ", Style::default().fg(Color::DarkGray)),
            sync,
        ]),
        Line::from(vec![
            Span::styled("Body              ", Style::default().fg(Color::DarkGray)),
            body,
        ]),
    ];

    let block = Block::default()
        .title(format!(" Response for {} ", view.listener))
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(Color::DarkGray));

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// Draw all requests, newest first, with scrolling and scrollbar
fn draw_requests(frame: &mut Frame, app: &TuiApp, view: &SessionView<'_>, area: Rect) {
    let fixed_width = 9 + 8 + 9 + 6; // time + method + proto + padding
    let url_width = (area.width as usize).saturating_sub(fixed_width).max(10);

    let header = Row::new(vec!["Time", "Method", "URL", "Proto"])
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .bottom_margin(0);

    let rows: Vec<Row> = view
        .entries
        .iter()
        .map(|entry| {
            let request = &entry.record.request;
            let row_style = if entry.read {
                Style::default().fg(Color::Gray)
            } else {
                Style::default().add_modifier(Modifier::BOLD)
            };

            Row::new(vec![
                Cell::from(format_timestamp(&entry.record.timestamp)),
                Cell::from(format!("{:>7}", truncate_str(&request.method, 7)))
                    .style(method_style(&request.method)),
                Cell::from(truncate_str(&entry.record.full_url(), url_width)),
                Cell::from(request.proto.as_str()),
            ])
            .style(row_style)
        })
        .collect();

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    let table = Table::new(
        rows,
        [
            Constraint::Length(9),
            Constraint::Length(8),
            Constraint::Min(10),
            Constraint::Length(9),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .title(format!(" Requests ({}) ", view.entries.len()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    )
    .row_highlight_style(Style::default().bg(Color::Rgb(40, 40, 60)));

    let position = app.selected_position(view);
    let mut state = TableState::default();
    state.select(position);

    frame.render_stateful_widget(table, chunks[0], &mut state);

    if !view.entries.is_empty() {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"))
            .track_symbol(Some("│"))
            .thumb_symbol("█");

        let mut scrollbar_state =
            ScrollbarState::new(view.entries.len()).position(position.unwrap_or(0));

        frame.render_stateful_widget(scrollbar, chunks[1], &mut scrollbar_state);
    }
}

/// Raw dump of the expanded request
fn draw_detail(frame: &mut Frame, entry: &LogEntry<'_>, area: Rect) {
    let lines: Vec<Line> = entry
        .record
        .dump_lines()
        .map(|line| Line::from(Span::styled(line, Style::default().fg(Color::White))))
        .collect();

    let block = Block::default()
        .title(format!(
            " {} {} ",
            entry.record.request.method, entry.record.url
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        area,
    );
}

/// Draw the footer with key hints, or the input prompt
fn draw_footer(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Cyan));
    let hint = |h: &'static str| Span::styled(h, Style::default().fg(Color::DarkGray));

    let text = match app.mode {
        Mode::Browse => Line::from(vec![
            key("↑/↓"),
            hint(" Navigate  "),
            key("Enter"),
            hint(" Expand  "),
            key("[/]"),
            hint(" Status  "),
            key("b"),
            hint(" Body  "),
            key("l"),
            hint(" Listener  "),
            key("q"),
            hint(" Quit"),
        ]),
        Mode::EditBody => Line::from(vec![
            key("Enter"),
            hint(" Apply body (empty reflects)  "),
            key("Alt+Enter"),
            hint(" Newline  "),
            key("Esc"),
            hint(" Cancel"),
        ]),
        Mode::SwitchListener => Line::from(vec![
            hint("Listener: "),
            Span::styled(format!("{}▏", app.input), Style::default().fg(Color::Yellow)),
            hint("  "),
            key("Enter"),
            hint(" Open  "),
            key("Esc"),
            hint(" Cancel"),
        ]),
    };

    frame.render_widget(Paragraph::new(text), area);
}

fn state_color(state: ConnectionState) -> Color {
    match state {
        ConnectionState::Open => Color::Green,
        ConnectionState::Connecting | ConnectionState::Closing => Color::Yellow,
        ConnectionState::Closed => Color::Red,
        ConnectionState::Uninstantiated => Color::DarkGray,
    }
}

/// Get style for HTTP method
fn method_style(method: &str) -> Style {
    match method {
        "GET" => Style::default().fg(Color::Green),
        "POST" => Style::default().fg(Color::Yellow),
        "PUT" => Style::default().fg(Color::Blue),
        "PATCH" => Style::default().fg(Color::Magenta),
        "DELETE" => Style::default().fg(Color::Red),
        "HEAD" => Style::default().fg(Color::Cyan),
        _ => Style::default().fg(Color::White),
    }
}

/// Get style for HTTP status code
fn status_style(status: u16) -> Style {
    if status >= 500 {
        Style::default().fg(Color::Red)
    } else if status >= 400 {
        Style::default().fg(Color::Yellow)
    } else if status >= 300 {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::Green)
    }
}

/// Body text on one row, line breaks shown as ⏎
fn single_line(text: &str) -> String {
    text.replace("\r\n", "⏎").replace('\n', "⏎")
}

/// Counter for frames that could not be decoded, empty while there are none
fn dropped_frames(count: usize) -> String {
    match count {
        0 => String::new(),
        1 => " · 1 dropped frame".to_string(),
        n => format!(" · {} dropped frames", n),
    }
}

/// Format timestamp for display, keeping unparseable ones as they are
pub fn format_timestamp(timestamp: &str) -> String {
    chrono::DateTime::parse_from_rfc2822(timestamp)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

/// Truncate any string to max length
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len > 3 {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    } else {
        s.chars().take(max_len).collect()
    }
}
