use crate::domain::ports::{ConfigProvider, GenerationOptions};
use crate::utils::error::{AgentError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

pub const DEFAULT_CONFIG_FILE: &str = "table-agent.toml";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub llm: LlmConfig,
    pub storage: StorageConfig,
    pub vector: VectorConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub embedding_model: String,
    pub generative_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            embedding_model: "models/gemini-embedding-001".to_string(),
            generative_model: "gemini-2.0-flash-exp".to_string(),
            temperature: 0.1,
            max_tokens: 2048,
            timeout_seconds: 60,
            retry_attempts: 3,
            retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub dimension: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self { dimension: 3072 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub max_rows_display: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_rows_display: 100,
        }
    }
}

impl AgentConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AgentError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        let mut config: AgentConfig =
            toml::from_str(&processed_content).map_err(|e| AgentError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;
        config.apply_api_key_fallback(std::env::var(API_KEY_ENV).ok());
        Ok(config)
    }

    /// 檔案不存在時使用預設值；明確指定的檔案必須存在
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                Self::from_file(path)
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                tracing::debug!("Loading config from {}", DEFAULT_CONFIG_FILE);
                Self::from_file(DEFAULT_CONFIG_FILE)
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                let mut config = Self::default();
                config.apply_api_key_fallback(std::env::var(API_KEY_ENV).ok());
                Ok(config)
            }
        }
    }

    /// 替換環境變數 (例如 ${GEMINI_API_KEY})，找不到的保持原樣
    fn substitute_env_vars(content: &str) -> String {
        static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
        let re = PLACEHOLDER
            .get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid placeholder pattern"));

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned()
    }

    /// 設定檔沒給或沒替換成功的金鑰，改用環境變數的值
    fn apply_api_key_fallback(&mut self, env_key: Option<String>) {
        if validation::require_secret("llm.api_key", &self.llm.api_key).is_err() {
            self.llm.api_key = env_key.filter(|key| !key.trim().is_empty());
        }
    }

    pub fn with_data_dir(mut self, data_dir: Option<String>) -> Self {
        if let Some(dir) = data_dir {
            self.storage.data_dir = dir;
        }
        self
    }

    /// 需要呼叫語言模型的指令才檢查金鑰
    pub fn require_api_key(&self) -> Result<&str> {
        validation::require_secret(&format!("llm.api_key (or {})", API_KEY_ENV), &self.llm.api_key)
    }

    pub fn data_dir(&self) -> &str {
        &self.storage.data_dir
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_endpoint("llm.base_url", &self.llm.base_url)?;
        validation::validate_model_name("llm.embedding_model", &self.llm.embedding_model)?;
        validation::validate_model_name("llm.generative_model", &self.llm.generative_model)?;
        validation::validate_range("llm.temperature", self.llm.temperature, 0.0, 2.0)?;
        validation::validate_range("llm.retry_attempts", self.llm.retry_attempts, 0, 10)?;
        validation::validate_data_dir("storage.data_dir", &self.storage.data_dir)?;
        validation::validate_at_least("vector.dimension", self.vector.dimension, 1)?;
        validation::validate_at_least(
            "analysis.max_rows_display",
            self.analysis.max_rows_display,
            1,
        )?;
        Ok(())
    }
}

impl ConfigProvider for AgentConfig {
    fn max_rows_display(&self) -> usize {
        self.analysis.max_rows_display
    }

    fn vector_dimension(&self) -> usize {
        self.vector.dimension
    }

    fn intent_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.llm.temperature,
            max_output_tokens: self.llm.max_tokens,
        }
    }
}

impl Validate for AgentConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
