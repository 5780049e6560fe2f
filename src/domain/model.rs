use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 一列結果資料，保留欄位順序
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    pub data: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

/// 確定性計算的輸出：結果表 + 精確數值
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Computation {
    pub result_table: Vec<Record>,
    pub numbers: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub result_table: Vec<Record>,
    pub numbers: Map<String, Value>,
    pub narrative: String,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub supported_intents: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentResponse {
    Analysis(AnalysisResult),
    Error(ErrorResponse),
}

impl AgentResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, AgentResponse::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_id: String,
    pub filename: String,
    pub num_rows: usize,
    pub num_columns: usize,
    pub columns: Vec<String>,
    pub column_types: BTreeMap<String, String>,
    pub numeric_columns: Vec<String>,
    pub text_columns: Vec<String>,
    pub ingestion_timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub file_id: String,
    /// 欄位摘要為 -1
    pub row_idx: i64,
    pub column_name: Option<String>,
    pub is_row_vector: bool,
    pub original_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub file_id: String,
    pub filename: String,
    pub rows: usize,
    pub columns: usize,
    pub numeric_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub status: String,
    pub loaded_files: usize,
    pub files: Vec<FileSummary>,
    pub vector_stores: Vec<String>,
    pub supported_intents: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_omits_empty_fields() {
        let response = AgentResponse::Error(ErrorResponse {
            error: "no_data".to_string(),
            supported_intents: None,
            details: Some("No CSV files have been loaded.".to_string()),
        });

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], "no_data");
        assert!(json.get("supported_intents").is_none());
        assert!(response.is_error());
    }

    #[test]
    fn test_record_keeps_insertion_order() {
        let record = Record::new()
            .with("rank", 1)
            .with("b_price", 30.0)
            .with("a_price", 32.0);

        let keys: Vec<&String> = record.data.keys().collect();
        assert_eq!(keys, vec!["rank", "b_price", "a_price"]);
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"rank":1,"b_price":30.0,"a_price":32.0}"#);
    }
}
