//! TUI application state and event handling

use crate::session::{SessionUpdate, SessionView};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use whdbg_common::status;

/// What keystrokes currently do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browse,
    EditBody,
    SwitchListener,
}

/// Session changes requested by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ToggleRead(usize),
    SetStatusCode(u16),
    SetBody(String),
    SwitchListener(String),
    Quit,
}

/// Events that can be sent to the TUI
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// Key event from terminal
    Key(KeyEvent),
    /// Something changed in the session
    Session(SessionUpdate),
}

/// TUI application state.
///
/// The selection is kept as a log index so it stays on the same record while
/// newer ones arrive above it.
pub struct TuiApp {
    pub mode: Mode,
    pub selected: Option<usize>,
    pub input: String,
    pub notice: Option<String>,
    pub should_quit: bool,
}

impl TuiApp {
    pub fn new() -> Self {
        Self {
            mode: Mode::Browse,
            selected: None,
            input: String::new(),
            notice: None,
            should_quit: false,
        }
    }

    /// Log index of the highlighted record, defaulting to the newest
    pub fn selected_index(&self, view: &SessionView<'_>) -> Option<usize> {
        match self.selected {
            Some(index) if view.entries.iter().any(|e| e.index == index) => Some(index),
            _ => view.entries.first().map(|e| e.index),
        }
    }

    /// Position of the highlighted record in the newest-first list
    pub fn selected_position(&self, view: &SessionView<'_>) -> Option<usize> {
        let index = self.selected_index(view)?;
        view.entries.iter().position(|e| e.index == index)
    }

    /// Handle TUI event
    pub fn handle_event(&mut self, event: TuiEvent, view: &SessionView<'_>) -> Option<Action> {
        match event {
            TuiEvent::Key(key) => self.handle_key(key, view),
            TuiEvent::Session(update) => {
                self.handle_update(&update);
                None
            }
        }
    }

    pub fn handle_update(&mut self, update: &SessionUpdate) {
        match update {
            SessionUpdate::PushFailed(e) => self.notice = Some(e.clone()),
            SessionUpdate::PushSucceeded => self.notice = None,
            SessionUpdate::DecodeFailed(e) => self.notice = Some(format!("Dropped frame: {}", e)),
            _ => {}
        }
    }

    /// Handle key events
    pub fn handle_key(&mut self, key: KeyEvent, view: &SessionView<'_>) -> Option<Action> {
        if let (KeyCode::Char('c'), KeyModifiers::CONTROL) = (key.code, key.modifiers) {
            self.should_quit = true;
            return Some(Action::Quit);
        }

        match self.mode {
            Mode::Browse => self.handle_browse_key(key, view),
            Mode::EditBody | Mode::SwitchListener => self.handle_input_key(key),
        }
    }

    fn handle_browse_key(&mut self, key: KeyEvent, view: &SessionView<'_>) -> Option<Action> {
        let len = view.entries.len();
        let position = self.selected_position(view);

        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Some(Action::Quit)
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if let Some(pos) = position {
                    self.select(view, pos.saturating_sub(1));
                }
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if let Some(pos) = position {
                    self.select(view, (pos + 1).min(len.saturating_sub(1)));
                }
                None
            }
            KeyCode::PageUp => {
                if let Some(pos) = position {
                    self.select(view, pos.saturating_sub(10));
                }
                None
            }
            KeyCode::PageDown => {
                if let Some(pos) = position {
                    self.select(view, (pos + 10).min(len.saturating_sub(1)));
                }
                None
            }
            KeyCode::Home => {
                self.select(view, 0);
                None
            }
            KeyCode::End => {
                self.select(view, len.saturating_sub(1));
                None
            }
            KeyCode::Enter | KeyCode::Char(' ') => self.selected_index(view).map(Action::ToggleRead),
            KeyCode::Char(']') => Some(Action::SetStatusCode(status::next(
                view.response.status_code,
            ))),
            KeyCode::Char('[') => Some(Action::SetStatusCode(status::previous(
                view.response.status_code,
            ))),
            KeyCode::Char('b') => {
                self.mode = Mode::EditBody;
                self.input = view.response.response_body.clone();
                None
            }
            KeyCode::Char('l') => {
                self.mode = Mode::SwitchListener;
                self.input.clear();
                None
            }
            _ => None,
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Esc => {
                self.mode = Mode::Browse;
                self.input.clear();
                None
            }
            KeyCode::Enter
                if self.mode == Mode::EditBody && key.modifiers.contains(KeyModifiers::ALT) =>
            {
                self.input.push('\n');
                None
            }
            KeyCode::Enter => {
                let input = std::mem::take(&mut self.input);
                let mode = std::mem::replace(&mut self.mode, Mode::Browse);
                match mode {
                    Mode::EditBody => Some(Action::SetBody(input)),
                    Mode::SwitchListener => {
                        let listener = input.trim().to_string();
                        if listener.is_empty() {
                            None
                        } else {
                            self.selected = None;
                            Some(Action::SwitchListener(listener))
                        }
                    }
                    Mode::Browse => None,
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
                None
            }
            KeyCode::Char(c) => {
                self.input.push(c);
                None
            }
            _ => None,
        }
    }

    fn select(&mut self, view: &SessionView<'_>, position: usize) {
        self.selected = view.entries.get(position).map(|e| e.index);
    }
}

impl Default for TuiApp {
    fn default() -> Self {
        Self::new()
    }
}
