use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Language model error: {message}")]
    LlmError { message: String },

    #[error("Could not parse intent: {message}")]
    IntentParseError { message: String },

    #[error("No CSV files have been loaded. Please ingest data first.")]
    NoData,

    #[error("Intent '{intent}' is not supported")]
    UnsupportedIntent { intent: String },

    #[error("File {file_id} not loaded")]
    FileNotLoaded { file_id: String },

    #[error("Column {column} not found in {file_id}")]
    ColumnNotFound { column: String, file_id: String },

    #[error("Column {column} in {file_id} is not numeric")]
    ColumnNotNumeric { column: String, file_id: String },

    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("Vector store error: {message}")]
    VectorStoreError { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Data,
    Analysis,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl AgentError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AgentError::MissingConfigError { .. }
            | AgentError::InvalidConfigValueError { .. }
            | AgentError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            AgentError::ApiError(_) | AgentError::LlmError { .. } => ErrorCategory::Network,
            AgentError::CsvError(_)
            | AgentError::SerializationError(_)
            | AgentError::NoData
            | AgentError::FileNotLoaded { .. }
            | AgentError::ValidationError { .. } => ErrorCategory::Data,
            AgentError::IntentParseError { .. }
            | AgentError::UnsupportedIntent { .. }
            | AgentError::ColumnNotFound { .. }
            | AgentError::ColumnNotNumeric { .. }
            | AgentError::InvalidParameter { .. }
            | AgentError::ProcessingError { .. } => ErrorCategory::Analysis,
            AgentError::IoError(_) | AgentError::VectorStoreError { .. } => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Data | ErrorCategory::Analysis => {
                ErrorSeverity::High
            }
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// 可重試的錯誤（網路層）
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::ApiError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            AgentError::MissingConfigError { .. } => {
                "Set the missing field in the config file or export GEMINI_API_KEY"
            }
            AgentError::InvalidConfigValueError { .. } | AgentError::ConfigValidationError { .. } => {
                "Check the TOML configuration file for typos and valid values"
            }
            AgentError::ApiError(_) | AgentError::LlmError { .. } => {
                "Check network connectivity and the API key, then retry"
            }
            AgentError::IntentParseError { .. } | AgentError::UnsupportedIntent { .. } => {
                "Rephrase the question or try --enhance"
            }
            AgentError::NoData | AgentError::FileNotLoaded { .. } => {
                "Ingest a CSV file first with `table-agent ingest <file>`"
            }
            AgentError::ColumnNotFound { .. } | AgentError::ColumnNotNumeric { .. } => {
                "Run `table-agent status` to list available columns"
            }
            AgentError::VectorStoreError { .. } => {
                "Re-ingest the file without --no-vectorize to rebuild embeddings"
            }
            AgentError::CsvError(_) | AgentError::ValidationError { .. } => {
                "Check that the input is a well-formed CSV file with a header row"
            }
            AgentError::IoError(_) => "Check file paths and permissions of the data directory",
            AgentError::SerializationError(_)
            | AgentError::InvalidParameter { .. }
            | AgentError::ProcessingError { .. } => "Retry the query with more specific wording",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Network => format!("Could not reach the language model: {}", self),
            ErrorCategory::Data => format!("Data problem: {}", self),
            ErrorCategory::Analysis => format!("Analysis failed: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_follows_category() {
        let err = AgentError::MissingConfigError {
            field: "llm.api_key".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.severity(), ErrorSeverity::High);

        let err = AgentError::LlmError {
            message: "quota".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Medium);

        let err = AgentError::VectorStoreError {
            message: "corrupt".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_every_category_has_a_failing_severity() {
        let errors = [
            AgentError::NoData,
            AgentError::IoError(std::io::Error::other("disk")),
            AgentError::ValidationError {
                message: "bad".to_string(),
            },
            AgentError::UnsupportedIntent {
                intent: "poem".to_string(),
            },
        ];
        let severities: Vec<ErrorSeverity> = errors.iter().map(|e| e.severity()).collect();
        assert_eq!(
            severities,
            vec![
                ErrorSeverity::High,
                ErrorSeverity::Critical,
                ErrorSeverity::High,
                ErrorSeverity::High
            ]
        );
    }

    #[test]
    fn test_messages_include_context() {
        let err = AgentError::ColumnNotFound {
            column: "price".to_string(),
            file_id: "sales".to_string(),
        };
        assert_eq!(err.to_string(), "Column price not found in sales");
        assert!(err.user_friendly_message().starts_with("Analysis failed"));
        assert!(err.recovery_suggestion().contains("status"));
    }
}
