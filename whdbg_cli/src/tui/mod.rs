//! Terminal User Interface for a live listener session

mod app;
mod ui;

pub use app::{Action, TuiApp, TuiEvent};
pub use ui::{draw, format_timestamp};
