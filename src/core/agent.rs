use crate::domain::intent::{supported_intents, ActionIntent};
use crate::domain::model::{AgentResponse, AgentStatus, AnalysisResult, ErrorResponse};
use crate::domain::ports::Pipeline;
use crate::utils::error::{AgentError, Result};
use serde_json::{Map, Value};

pub struct AnalyticalAgent<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> AnalyticalAgent<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut P {
        &mut self.pipeline
    }

    /// 問題 → 意圖 → 確定性運算 → 敘述。錯誤一律轉成 ErrorResponse
    pub async fn process_query(&self, query: &str, enhance: bool) -> AgentResponse {
        match self.run_query(query, enhance).await {
            Ok(result) => AgentResponse::Analysis(result),
            Err(e) => {
                tracing::error!(
                    "❌ Query failed: {} (Category: {:?}, Severity: {:?})",
                    e,
                    e.category(),
                    e.severity()
                );
                AgentResponse::Error(error_response(e))
            }
        }
    }

    async fn run_query(&self, query: &str, enhance: bool) -> Result<AnalysisResult> {
        let query = if enhance {
            self.pipeline.enhance(query).await?
        } else {
            query.to_string()
        };

        if !self.pipeline.has_data() {
            return Err(AgentError::NoData);
        }

        tracing::info!("🔍 Interpreting query...");
        let raw = self.pipeline.interpret(&query).await?;
        let intent = ActionIntent::from_raw(&raw.intent, &raw.parameters)?;

        tracing::info!("📊 Running {}...", intent.name());
        let computation = self.pipeline.execute(&intent).await?;
        tracing::debug!("Computed {} result rows", computation.result_table.len());

        tracing::info!("📝 Generating narrative...");
        let narrative = self
            .pipeline
            .narrate(&intent, &raw.parameters, &computation)
            .await?;

        let mut metadata = Map::new();
        metadata.insert("intent".to_string(), Value::from(intent.name()));
        metadata.insert("parameters".to_string(), raw.parameters);
        metadata.insert("query".to_string(), Value::from(query));

        Ok(AnalysisResult {
            result_table: computation.result_table,
            numbers: computation.numbers,
            narrative,
            metadata,
        })
    }

    pub async fn get_status(&self) -> Result<AgentStatus> {
        self.pipeline.status().await
    }
}

fn error_response(error: AgentError) -> ErrorResponse {
    match error {
        AgentError::NoData => ErrorResponse {
            error: "no_data".to_string(),
            supported_intents: None,
            details: Some(error.to_string()),
        },
        AgentError::UnsupportedIntent { .. } => ErrorResponse {
            error: "unsupported_intent".to_string(),
            supported_intents: Some(supported_intents()),
            details: Some(error.to_string()),
        },
        other => ErrorResponse {
            error: "execution_error".to_string(),
            supported_intents: None,
            details: Some(other.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::tests::{write_csv, MockConfig, MockModel, MockStorage, FRUITS_CSV};
    use crate::core::pipeline::TablePipeline;
    use tempfile::TempDir;

    type TestAgent = AnalyticalAgent<TablePipeline<MockStorage, MockModel, MockConfig>>;

    async fn agent_with(replies: &[&str], ingest: bool) -> (TestAgent, TempDir) {
        let dir = TempDir::new().unwrap();
        let pipeline = TablePipeline::open(MockStorage::new(), MockModel::new(replies), MockConfig)
            .await
            .unwrap();
        let mut agent = AnalyticalAgent::new(pipeline);
        if ingest {
            let csv = write_csv(&dir, "fruits.csv", FRUITS_CSV);
            agent
                .pipeline_mut()
                .ingest_csv(&csv, Some("fruits"), true)
                .await
                .unwrap();
        }
        (agent, dir)
    }

    #[tokio::test]
    async fn test_process_query_success() {
        let (agent, _dir) = agent_with(
            &[
                r#"{"intent": "filter_threshold", "parameters": {"column": "price", "operator": ">", "value": 1}}"#,
                "Two fruits cost more than 1.",
            ],
            true,
        )
        .await;

        let response = agent.process_query("fruits above 1?", false).await;

        let AgentResponse::Analysis(result) = response else {
            panic!("expected analysis");
        };
        assert_eq!(result.result_table.len(), 2);
        assert_eq!(result.numbers["filtered_rows"], 2);
        assert_eq!(result.narrative, "Two fruits cost more than 1.");
        assert_eq!(result.metadata["intent"], "filter_threshold");
        assert_eq!(result.metadata["parameters"]["operator"], ">");
        assert_eq!(result.metadata["query"], "fruits above 1?");
    }

    #[tokio::test]
    async fn test_no_data_response() {
        let (agent, _dir) = agent_with(&[], false).await;

        let response = agent.process_query("anything", false).await;

        let AgentResponse::Error(error) = response else {
            panic!("expected error");
        };
        assert_eq!(error.error, "no_data");
        assert!(error.supported_intents.is_none());
        assert!(error.details.unwrap().contains("Please ingest data first"));
    }

    #[tokio::test]
    async fn test_unsupported_intent_response() {
        let (agent, _dir) = agent_with(&[r#"{"intent": "unsupported", "parameters": {}}"#], true).await;

        let response = agent.process_query("write me a poem", false).await;

        let AgentResponse::Error(error) = response else {
            panic!("expected error");
        };
        assert_eq!(error.error, "unsupported_intent");
        assert_eq!(error.supported_intents.unwrap().len(), 6);
        assert_eq!(error.details.unwrap(), "Intent 'unsupported' is not supported");
    }

    #[tokio::test]
    async fn test_execution_error_response() {
        let (agent, _dir) = agent_with(
            &[r#"{"intent": "top_n", "parameters": {"column": "weight", "n": 2}}"#],
            true,
        )
        .await;

        let response = agent.process_query("heaviest fruits", false).await;

        let AgentResponse::Error(error) = response else {
            panic!("expected error");
        };
        assert_eq!(error.error, "execution_error");
        assert_eq!(error.details.unwrap(), "Column weight not found in fruits");
    }

    #[tokio::test]
    async fn test_enhanced_query_is_recorded() {
        let (agent, _dir) = agent_with(
            &[
                "\"List the 2 fruits with the highest stock\"",
                r#"{"intent": "top_n", "parameters": {"column": "stock", "n": 2}}"#,
                "Banana leads.",
            ],
            true,
        )
        .await;

        let response = agent.process_query("stock?", true).await;

        let AgentResponse::Analysis(result) = response else {
            panic!("expected analysis");
        };
        assert_eq!(
            result.metadata["query"],
            "List the 2 fruits with the highest stock"
        );
        assert_eq!(result.numbers["top_indices"], serde_json::json!([1, 0]));
    }

    #[tokio::test]
    async fn test_get_status() {
        let (agent, _dir) = agent_with(&[], true).await;

        let status = agent.get_status().await.unwrap();

        assert_eq!(status.loaded_files, 1);
        assert_eq!(status.files[0].rows, 3);
        assert_eq!(status.vector_stores, vec!["fruits"]);
    }
}
