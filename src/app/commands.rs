use crate::adapters::GeminiClient;
use crate::app::report;
use crate::config::cli::LocalStorage;
use crate::config::toml_config::AgentConfig;
use crate::config::{CliConfig, Command};
use crate::core::agent::AnalyticalAgent;
use crate::core::pipeline::TablePipeline;
use crate::domain::model::AgentResponse;
use crate::utils::error::{AgentError, Result};
use crate::utils::validation::Validate;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

type CliAgent = AnalyticalAgent<TablePipeline<LocalStorage, GeminiClient, AgentConfig>>;

const HELP: &str = "\nCommands:\n  query <your question>  - Ask a question\n  status                 - Show agent status\n  help                   - Show this help\n  quit/exit              - Exit interactive mode\n";

/// 互動模式的一行輸入
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Empty,
    Quit,
    Help,
    Status,
    Query(String),
}

pub fn parse_repl_input(line: &str) -> ReplInput {
    let line = line.trim();
    if line.is_empty() {
        return ReplInput::Empty;
    }
    match line.to_lowercase().as_str() {
        "quit" | "exit" | "q" => return ReplInput::Quit,
        "help" => return ReplInput::Help,
        "status" => return ReplInput::Status,
        "query" => return ReplInput::Empty,
        _ => {}
    }

    let question = match line.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("query ") => line[6..].trim(),
        _ => line,
    };
    if question.is_empty() {
        ReplInput::Empty
    } else {
        ReplInput::Query(question.to_string())
    }
}

pub async fn run(cli: CliConfig) -> Result<()> {
    let config = AgentConfig::load(cli.config.as_deref())?.with_data_dir(cli.data_dir.clone());
    config.validate()?;

    let api_key = if cli.command.needs_model() {
        config.require_api_key()?.to_string()
    } else {
        config.llm.api_key.clone().unwrap_or_default()
    };

    tracing::debug!("Data directory: {}", config.data_dir());
    let storage = LocalStorage::new(config.data_dir().to_string());
    let model = GeminiClient::new(&api_key, &config.llm)?;
    let pipeline = TablePipeline::open(storage, model, config).await?;
    let mut agent = AnalyticalAgent::new(pipeline);

    match cli.command {
        Command::Ingest {
            file,
            file_id,
            no_vectorize,
        } => ingest(&mut agent, &file, file_id.as_deref(), !no_vectorize).await,
        Command::Query {
            question,
            enhance,
            json,
            output,
        } => {
            println!("\n🤔 Processing query: {}", question);
            let response = agent.process_query(&question, enhance).await;
            print_response(&response, json)?;
            if let Some(path) = output {
                save_response(&path, &response)?;
                println!("✅ Result saved to {}", path.display());
            }
            Ok(())
        }
        Command::Status => {
            let status = agent.get_status().await?;
            println!("\n{}", report::render_status(&status));
            Ok(())
        }
        Command::Interactive => interactive(&agent).await,
        Command::Run {
            file,
            question,
            json,
        } => {
            ingest(&mut agent, &file, None, true).await?;
            println!("\n🤔 Processing query: {}", question);
            let response = agent.process_query(&question, false).await;
            print_response(&response, json)?;
            match response {
                AgentResponse::Error(error) => Err(AgentError::ProcessingError {
                    message: error.details.unwrap_or(error.error),
                }),
                AgentResponse::Analysis(_) => Ok(()),
            }
        }
    }
}

async fn ingest(
    agent: &mut CliAgent,
    file: &Path,
    file_id: Option<&str>,
    vectorize: bool,
) -> Result<()> {
    println!("\n🔄 Ingesting CSV file: {}", file.display());
    let metadata = agent
        .pipeline_mut()
        .ingest_csv(file, file_id, vectorize)
        .await?;
    println!("\n{}", report::render_ingest(&metadata, vectorize));
    Ok(())
}

fn print_response(response: &AgentResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
    } else {
        println!("{}", report::render_response(response));
    }
    Ok(())
}

fn save_response(path: &Path, response: &AgentResponse) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(response)?)?;
    Ok(())
}

async fn interactive(agent: &CliAgent) -> Result<()> {
    println!("\n{}", "=".repeat(80));
    println!("🤖 Table Agent - Interactive Mode");
    println!("{}", "=".repeat(80));
    println!("{}", HELP);
    println!("Type your command or question:");
    println!("{}\n", "=".repeat(80));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!(">>> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!("\n👋 Goodbye!");
            break;
        };

        match parse_repl_input(&line) {
            ReplInput::Empty => continue,
            ReplInput::Quit => {
                println!("\n👋 Goodbye!");
                break;
            }
            ReplInput::Help => println!("{}", HELP),
            ReplInput::Status => match agent.get_status().await {
                Ok(status) => println!("\n{}", report::render_short_status(&status)),
                Err(e) => println!("\n❌ Error: {}\n", e.user_friendly_message()),
            },
            ReplInput::Query(question) => {
                let response = agent.process_query(&question, false).await;
                println!("{}", report::render_response(&response));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repl_input() {
        assert_eq!(parse_repl_input("   "), ReplInput::Empty);
        assert_eq!(parse_repl_input("EXIT"), ReplInput::Quit);
        assert_eq!(parse_repl_input("q"), ReplInput::Quit);
        assert_eq!(parse_repl_input("help"), ReplInput::Help);
        assert_eq!(parse_repl_input(" Status "), ReplInput::Status);
        assert_eq!(
            parse_repl_input("query top 3 by price"),
            ReplInput::Query("top 3 by price".to_string())
        );
        assert_eq!(
            parse_repl_input("Query   average salary"),
            ReplInput::Query("average salary".to_string())
        );
        assert_eq!(
            parse_repl_input("which rows mention bananas?"),
            ReplInput::Query("which rows mention bananas?".to_string())
        );
        assert_eq!(parse_repl_input("query "), ReplInput::Empty);
    }

    #[test]
    fn test_save_response_writes_pretty_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/result.json");
        let response = AgentResponse::Error(crate::domain::model::ErrorResponse {
            error: "no_data".to_string(),
            supported_intents: None,
            details: None,
        });

        save_response(&path, &response).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "{\n  \"error\": \"no_data\"\n}");
    }
}
