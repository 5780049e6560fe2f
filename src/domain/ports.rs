use crate::domain::intent::ActionIntent;
use crate::domain::model::{AgentStatus, Computation};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::Value;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// 列出目錄下的檔名；目錄不存在時回傳空清單
    fn list_files(&self, dir: &str)
        -> impl std::future::Future<Output = Result<Vec<String>>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn max_rows_display(&self) -> usize;
    fn vector_dimension(&self) -> usize;
    /// 意圖解析的生成參數
    fn intent_options(&self) -> GenerationOptions;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    RetrievalDocument,
    RetrievalQuery,
}

impl EmbeddingTask {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            EmbeddingTask::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            EmbeddingTask::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>>;
    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<String>;

    async fn embed_batch(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            vectors.push(self.embed(text, task).await?);
            if (i + 1) % 50 == 0 {
                tracing::info!("    Processed {}/{} embeddings", i + 1, texts.len());
            }
        }
        Ok(vectors)
    }
}

/// 模型回傳、尚未驗證的意圖
#[derive(Debug, Clone, PartialEq)]
pub struct RawIntent {
    pub intent: String,
    pub parameters: Value,
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    fn has_data(&self) -> bool;
    async fn enhance(&self, query: &str) -> Result<String>;
    async fn interpret(&self, query: &str) -> Result<RawIntent>;
    async fn execute(&self, intent: &ActionIntent) -> Result<Computation>;
    async fn narrate(
        &self,
        intent: &ActionIntent,
        parameters: &Value,
        computation: &Computation,
    ) -> Result<String>;
    async fn status(&self) -> Result<AgentStatus>;
}
