//! Terminal front-end for a mounted session view.

mod command;
mod formatter;
mod runner;
mod ui;

pub use command::{Command, parse_command};
pub use formatter::SnapshotFormatter;
pub use runner::run_session;
