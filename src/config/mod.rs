pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "table-agent")]
#[command(about = "Ask questions about CSV files and get exact answers with a narrative")]
pub struct CliConfig {
    #[arg(long, global = true, help = "Path to the TOML config file (default: table-agent.toml)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Override storage.data_dir")]
    pub data_dir: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Load a CSV file into the data directory
    Ingest {
        file: PathBuf,

        #[arg(long, help = "Custom file id instead of a generated one")]
        file_id: Option<String>,

        #[arg(long, help = "Skip row and column embeddings")]
        no_vectorize: bool,
    },

    /// Ask a question about the ingested files
    Query {
        question: String,

        #[arg(long, help = "Rephrase the question with the model first")]
        enhance: bool,

        #[arg(long, help = "Print the raw JSON response")]
        json: bool,

        #[arg(short, long, help = "Also write the JSON response to this file")]
        output: Option<PathBuf>,
    },

    /// Show loaded files and vector stores
    Status,

    /// Interactive question loop
    Interactive,

    /// Ingest a CSV file and ask one question in a single step
    Run {
        file: PathBuf,

        question: String,

        #[arg(long, help = "Print the raw JSON response")]
        json: bool,
    },
}

#[cfg(feature = "cli")]
impl Command {
    pub fn needs_model(&self) -> bool {
        match self {
            Command::Ingest { no_vectorize, .. } => !no_vectorize,
            Command::Status => false,
            Command::Query { .. } | Command::Interactive | Command::Run { .. } => true,
        }
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_command() {
        let cli = CliConfig::try_parse_from([
            "table-agent",
            "--data-dir",
            "/tmp/data",
            "query",
            "top 5 products by price",
            "--json",
            "-o",
            "out.json",
        ])
        .unwrap();

        assert_eq!(cli.data_dir.as_deref(), Some("/tmp/data"));
        match cli.command {
            Command::Query {
                question,
                enhance,
                json,
                output,
            } => {
                assert_eq!(question, "top 5 products by price");
                assert!(!enhance);
                assert!(json);
                assert_eq!(output, Some(PathBuf::from("out.json")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = CliConfig::try_parse_from(["table-agent", "status", "-v", "--log-json"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.log_json);
        assert!(!cli.command.needs_model());
    }

    #[test]
    fn test_ingest_without_vectors_needs_no_model() {
        let cli = CliConfig::try_parse_from([
            "table-agent",
            "ingest",
            "sales.csv",
            "--file-id",
            "sales",
            "--no-vectorize",
        ])
        .unwrap();
        assert!(!cli.command.needs_model());

        let cli = CliConfig::try_parse_from(["table-agent", "ingest", "sales.csv"]).unwrap();
        assert!(cli.command.needs_model());
    }
}
