// Application layer: command handlers and terminal output.

#[cfg(feature = "cli")]
pub mod commands;
pub mod report;
