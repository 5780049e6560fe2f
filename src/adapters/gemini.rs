use crate::config::toml_config::LlmConfig;
use crate::domain::ports::{EmbeddingTask, GenerationOptions, LanguageModel};
use crate::utils::error::{AgentError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    /// `base × 2^(attempt-1)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << exponent))
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Generative Language REST API 客戶端
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    embedding_model: String,
    generative_model: String,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(api_key: &str, config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        let embedding_model = if config.embedding_model.starts_with("models/") {
            config.embedding_model.clone()
        } else {
            format!("models/{}", config.embedding_model)
        };
        let generative_model = config
            .generative_model
            .trim_start_matches("models/")
            .to_string();

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            embedding_model,
            generative_model,
            retry: RetryPolicy {
                attempts: config.retry_attempts,
                base_delay_ms: config.retry_delay_ms,
            },
        })
    }

    fn embed_url(&self) -> String {
        format!("{}/v1beta/{}:embedContent", self.base_url, self.embedding_model)
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.generative_model
        )
    }

    /// 傳輸錯誤、429 與 5xx 以指數退避重試
    async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Response> {
        let mut attempt = 0u32;
        loop {
            let outcome = self
                .client
                .post(url)
                .header(API_KEY_HEADER, &self.api_key)
                .json(body)
                .send()
                .await;

            let retry_reason = match outcome {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if is_retryable_status(response.status()) => {
                    format!("HTTP {}", response.status())
                }
                Ok(response) => return Err(api_error(response).await),
                Err(e) => {
                    let err = AgentError::from(e);
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    err.to_string()
                }
            };

            attempt += 1;
            if attempt > self.retry.attempts {
                return Err(AgentError::LlmError {
                    message: format!(
                        "request to {} failed after {} attempts: {}",
                        url, attempt, retry_reason
                    ),
                });
            }

            let delay = self.retry.delay_for_attempt(attempt);
            tracing::warn!(
                "⚠️ Gemini request failed ({}), retrying in {:?} ({}/{})",
                retry_reason,
                delay,
                attempt,
                self.retry.attempts
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

async fn api_error(response: Response) -> AgentError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body);
    AgentError::LlmError {
        message: format!("HTTP {}: {}", status, message),
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: &self.embedding_model,
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
            task_type: task.as_api_str(),
        };

        let response = self.post_json(&self.embed_url(), &request).await?;
        let body: EmbedResponse = response.json().await?;
        if body.embedding.values.is_empty() {
            return Err(AgentError::LlmError {
                message: "embedding response contained no values".to_string(),
            });
        }
        Ok(body.embedding.values)
    }

    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_output_tokens,
            },
        };

        tracing::debug!("Calling {} ({} prompt chars)", self.generative_model, prompt.len());
        let response = self.post_json(&self.generate_url(), &request).await?;
        let body: GenerateResponse = response.json().await?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            let reason = body
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "empty response".to_string());
            return Err(AgentError::LlmError {
                message: format!("model returned no text: {}", reason),
            });
        }
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client_for(server: &MockServer, retry_attempts: u32) -> GeminiClient {
        let config = LlmConfig {
            base_url: server.base_url(),
            retry_attempts,
            retry_delay_ms: 1,
            ..LlmConfig::default()
        };
        GeminiClient::new("test-key", &config).unwrap()
    }

    #[test]
    fn test_retry_delay_doubles() {
        let policy = RetryPolicy {
            attempts: 3,
            base_delay_ms: 500,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_embed_sends_task_type_and_key() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-embedding-001:embedContent")
                .header("x-goog-api-key", "test-key")
                .json_body(json!({
                    "model": "models/gemini-embedding-001",
                    "content": {"parts": [{"text": "price: 10"}]},
                    "taskType": "RETRIEVAL_QUERY"
                }));
            then.status(200)
                .json_body(json!({"embedding": {"values": [0.1, 0.2, 0.3]}}));
        });

        let client = client_for(&server, 0);
        let vector = client
            .embed("price: 10", EmbeddingTask::RetrievalQuery)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_generate_joins_parts() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-2.0-flash-exp:generateContent")
                .json_body_partial(r#"{"generationConfig": {"temperature": 0.5, "maxOutputTokens": 42}}"#);
            then.status(200).json_body(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "world\n"}]}
                }]
            }));
        });

        let client = client_for(&server, 0);
        let options = GenerationOptions {
            temperature: 0.5,
            max_output_tokens: 42,
        };
        let text = client.generate("Say hello", options).await.unwrap();

        mock.assert();
        assert_eq!(text, "Hello world");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST);
            then.status(400)
                .json_body(json!({"error": {"code": 400, "message": "API key not valid"}}));
        });

        let client = client_for(&server, 3);
        let err = client
            .embed("x", EmbeddingTask::RetrievalDocument)
            .await
            .unwrap_err();

        mock.assert_hits(1);
        assert!(matches!(err, AgentError::LlmError { .. }));
        assert!(err.to_string().contains("API key not valid"));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST);
            then.status(503);
        });

        let client = client_for(&server, 2);
        let err = client
            .generate(
                "hi",
                GenerationOptions {
                    temperature: 0.1,
                    max_output_tokens: 10,
                },
            )
            .await
            .unwrap_err();

        mock.assert_hits(3);
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn test_blocked_prompt_reports_reason() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(200)
                .json_body(json!({"candidates": [], "promptFeedback": {"blockReason": "SAFETY"}}));
        });

        let client = client_for(&server, 0);
        let err = client
            .generate(
                "hi",
                GenerationOptions {
                    temperature: 0.1,
                    max_output_tokens: 10,
                },
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("SAFETY"));
    }
}
