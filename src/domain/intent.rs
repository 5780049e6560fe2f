use crate::utils::error::{AgentError, Result};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const SUPPORTED_INTENTS: [&str; 6] = [
    "compare_averages",
    "filter_threshold",
    "sort",
    "top_n",
    "compare_top",
    "explain_row",
];

pub fn supported_intents() -> Vec<String> {
    SUPPORTED_INTENTS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
        }
    }

    /// 缺值只會符合 `!=`
    pub fn matches(&self, cell: Option<f64>, value: f64) -> bool {
        match cell {
            None => *self == Operator::Ne,
            Some(x) => match self {
                Operator::Gt => x > value,
                Operator::Lt => x < value,
                Operator::Ge => x >= value,
                Operator::Le => x <= value,
                Operator::Eq => x == value,
                Operator::Ne => x != value,
            },
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareAveragesParams {
    pub column: String,
    #[serde(default)]
    pub file1_id: Option<String>,
    #[serde(default)]
    pub file2_id: Option<String>,
    #[serde(default)]
    pub group_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterThresholdParams {
    pub column: String,
    pub operator: Operator,
    pub value: f64,
    #[serde(default)]
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortParams {
    pub column: String,
    #[serde(default = "default_true")]
    pub ascending: bool,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default, deserialize_with = "de_optional_count")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopNParams {
    pub column: String,
    #[serde(deserialize_with = "de_count")]
    pub n: usize,
    #[serde(default)]
    pub ascending: bool,
    #[serde(default)]
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareTopParams {
    pub column: String,
    #[serde(deserialize_with = "de_count")]
    pub n: usize,
    #[serde(default)]
    pub file1_id: Option<String>,
    #[serde(default)]
    pub file2_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainRowParams {
    pub query: String,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default = "default_top_k", deserialize_with = "de_count")]
    pub top_k: usize,
}

fn default_true() -> bool {
    true
}

fn default_top_k() -> usize {
    1
}

/// 模型有時把整數寫成 `5.0`，零小數視為整數
fn count_from_value<E: de::Error>(value: &Value) -> std::result::Result<usize, E> {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return Ok(u as usize);
            }
            match n.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= usize::MAX as f64 => Ok(f as usize),
                _ => Err(E::custom(format!("expected a non-negative integer, got {}", n))),
            }
        }
        other => Err(E::custom(format!("expected a non-negative integer, got {}", other))),
    }
}

fn de_count<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<usize, D::Error> {
    let value = Value::deserialize(deserializer)?;
    count_from_value(&value)
}

fn de_optional_count<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<usize>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    count_from_value(&value).map(Some)
}

/// 經過驗證的動作意圖
#[derive(Debug, Clone, PartialEq)]
pub enum ActionIntent {
    CompareAverages(CompareAveragesParams),
    FilterThreshold(FilterThresholdParams),
    Sort(SortParams),
    TopN(TopNParams),
    CompareTop(CompareTopParams),
    ExplainRow(ExplainRowParams),
}

impl ActionIntent {
    pub fn from_raw(intent: &str, parameters: &Value) -> Result<Self> {
        let parameters = match parameters {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };

        let action = match intent {
            "compare_averages" => ActionIntent::CompareAverages(parse_params(intent, parameters)?),
            "filter_threshold" => ActionIntent::FilterThreshold(parse_params(intent, parameters)?),
            "sort" => ActionIntent::Sort(parse_params(intent, parameters)?),
            "top_n" => ActionIntent::TopN(parse_params(intent, parameters)?),
            "compare_top" => ActionIntent::CompareTop(parse_params(intent, parameters)?),
            "explain_row" => ActionIntent::ExplainRow(parse_params(intent, parameters)?),
            other => {
                return Err(AgentError::UnsupportedIntent {
                    intent: other.to_string(),
                })
            }
        };

        action.validate()?;
        Ok(action)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActionIntent::CompareAverages(_) => "compare_averages",
            ActionIntent::FilterThreshold(_) => "filter_threshold",
            ActionIntent::Sort(_) => "sort",
            ActionIntent::TopN(_) => "top_n",
            ActionIntent::CompareTop(_) => "compare_top",
            ActionIntent::ExplainRow(_) => "explain_row",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            ActionIntent::TopN(p) if p.n == 0 => Err(invalid("top_n: n must be greater than 0")),
            ActionIntent::CompareTop(p) if p.n == 0 => {
                Err(invalid("compare_top: n must be greater than 0"))
            }
            ActionIntent::ExplainRow(p) if !(1..=10).contains(&p.top_k) => {
                Err(invalid("explain_row: top_k must be between 1 and 10"))
            }
            ActionIntent::ExplainRow(p) if p.query.trim().is_empty() => {
                Err(invalid("explain_row: query cannot be empty"))
            }
            ActionIntent::FilterThreshold(p) if !p.value.is_finite() => {
                Err(invalid("filter_threshold: value must be a finite number"))
            }
            _ => Ok(()),
        }
    }
}

fn invalid(message: &str) -> AgentError {
    AgentError::InvalidParameter {
        message: message.to_string(),
    }
}

fn parse_params<T: DeserializeOwned>(intent: &str, parameters: Value) -> Result<T> {
    serde_json::from_value(parameters).map_err(|e| AgentError::InvalidParameter {
        message: format!("{}: {}", intent, e),
    })
}
