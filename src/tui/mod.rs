//! Terminal chat screen built on Ratatui.

mod app;
mod compose;
mod help;
mod log_pane;
mod messages;
mod ui;

pub use app::run;
pub use log_pane::LogBuffer;
