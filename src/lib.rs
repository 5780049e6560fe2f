pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{CliConfig, Command};

pub use adapters::GeminiClient;
pub use config::{cli::LocalStorage, toml_config::AgentConfig};
pub use core::{agent::AnalyticalAgent, pipeline::TablePipeline};
pub use domain::model::{AgentResponse, AnalysisResult, ErrorResponse};
pub use utils::error::{AgentError, Result};
