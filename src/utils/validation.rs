//! 設定值與使用者輸入的檢查

use crate::utils::error::{AgentError, Result};
use regex::Regex;
use std::fmt::Display;
use std::path::Path;
use std::sync::OnceLock;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field: &str, value: impl Display, reason: impl Into<String>) -> AgentError {
    AgentError::InvalidConfigValueError {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// 模型服務根網址：http(s)、有主機、不帶查詢字串或片段
pub fn validate_endpoint(field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value).map_err(|e| invalid(field, value, format!("not a valid URL ({})", e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(
            field,
            value,
            format!("scheme '{}' is not supported, use http or https", url.scheme()),
        ));
    }
    if url.host_str().is_none() {
        return Err(invalid(field, value, "URL has no host"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid(field, value, "endpoint must not carry a query or fragment"));
    }
    Ok(())
}

/// 資料目錄可以尚未存在，但不能是一般檔案
pub fn validate_data_dir(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(field, value, "data directory cannot be empty"));
    }
    if value.contains('\0') {
        return Err(invalid(field, value.escape_default(), "data directory contains a null byte"));
    }
    let path = Path::new(value);
    if path.exists() && !path.is_dir() {
        return Err(invalid(field, value, "exists but is not a directory"));
    }
    Ok(())
}

/// 模型名稱不可為空且不含空白，例如 `models/gemini-embedding-001`
pub fn validate_model_name(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(invalid(field, value, "model name cannot be empty"));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(invalid(field, value, "model name cannot contain whitespace"));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + Display + Copy>(field: &str, value: T, min: T, max: T) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(field, value, format!("must be between {} and {}", min, max)));
    }
    Ok(())
}

pub fn validate_at_least(field: &str, value: usize, min: usize) -> Result<()> {
    if value < min {
        return Err(invalid(field, value, format!("must be at least {}", min)));
    }
    Ok(())
}

/// 空白字串或未替換的 `${VAR}` 視同未設定
pub fn require_secret<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(secret) if !secret.is_empty() && !secret.starts_with("${") => Ok(secret),
        _ => Err(AgentError::MissingConfigError {
            field: field.to_string(),
        }),
    }
}

/// 只接受副檔名為 .csv 的檔案（不分大小寫）
pub fn validate_csv_path(path: &Path) -> Result<()> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(AgentError::ValidationError {
            message: format!("{} is not a CSV file, expected a .csv extension", path.display()),
        });
    }
    Ok(())
}

/// file_id 會成為 `input/<id>.csv` 的檔名
pub fn validate_file_id(value: &str) -> Result<()> {
    static FILE_ID: OnceLock<Regex> = OnceLock::new();
    let re = FILE_ID.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid file id pattern"));

    if !re.is_match(value) || value.starts_with('.') {
        return Err(AgentError::ValidationError {
            message: format!(
                "Invalid file id '{}': use letters, digits, '_', '-' or '.', not starting with '.'",
                value
            ),
        });
    }
    Ok(())
}
