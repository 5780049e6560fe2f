//! 終端機輸出格式。回傳字串，由呼叫端決定印到哪裡。

use crate::domain::model::{AgentResponse, AgentStatus, AnalysisResult, ErrorResponse, FileMetadata};
use serde_json::Value;
use std::fmt::Write;

const PREVIEW_ROWS: usize = 5;
const RULE_WIDTH: usize = 80;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 浮點數四位小數；超過五個元素的清單只顯示頭尾
pub fn format_number(value: &Value) -> String {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) => format!("{:.4}", f),
            None => n.to_string(),
        },
        Value::Array(items) if items.len() > PREVIEW_ROWS => format!(
            "[{}, {}, ..., {}] ({} items)",
            scalar(&items[0]),
            scalar(&items[1]),
            scalar(&items[items.len() - 1]),
            items.len()
        ),
        other => scalar(other),
    }
}

fn render_analysis(out: &mut String, result: &AnalysisResult) {
    let _ = writeln!(out, "📊 NARRATIVE:");
    let narrative = if result.narrative.is_empty() {
        "No narrative generated"
    } else {
        result.narrative.as_str()
    };
    let _ = writeln!(out, "{}", narrative);

    let _ = writeln!(out, "\n📈 COMPUTED NUMBERS:");
    for (key, value) in &result.numbers {
        let _ = writeln!(out, "  {}: {}", key, format_number(value));
    }

    let _ = writeln!(out, "\n📋 RESULT TABLE (first {} rows):", PREVIEW_ROWS);
    if result.result_table.is_empty() {
        let _ = writeln!(out, "  (empty)");
    }
    for (i, row) in result.result_table.iter().take(PREVIEW_ROWS).enumerate() {
        let row = serde_json::to_string(row).unwrap_or_default();
        let _ = writeln!(out, "  Row {}: {}", i + 1, row);
    }
    if result.result_table.len() > PREVIEW_ROWS {
        let _ = writeln!(
            out,
            "  ... and {} more rows",
            result.result_table.len() - PREVIEW_ROWS
        );
    }
}

fn render_error(out: &mut String, error: &ErrorResponse) {
    let _ = writeln!(out, "❌ ERROR: {}", error.error);
    if let Some(details) = &error.details {
        let _ = writeln!(out, "Details: {}", details);
    }
    if let Some(intents) = &error.supported_intents {
        let _ = writeln!(out, "\nSupported intents:");
        for intent in intents {
            let _ = writeln!(out, "  - {}", intent);
        }
    }
}

pub fn render_response(response: &AgentResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", rule());
    match response {
        AgentResponse::Analysis(result) => render_analysis(&mut out, result),
        AgentResponse::Error(error) => render_error(&mut out, error),
    }
    let _ = writeln!(out, "{}", rule());
    out
}

pub fn render_ingest(metadata: &FileMetadata, vectorized: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "✅ Successfully ingested file!");
    let _ = writeln!(out, "   File ID: {}", metadata.file_id);
    let _ = writeln!(out, "   Rows: {}", metadata.num_rows);
    let _ = writeln!(out, "   Columns: {}", metadata.num_columns);
    let _ = writeln!(out, "   Numeric columns: {}", metadata.numeric_columns.join(", "));
    let _ = writeln!(out, "   Text columns: {}", metadata.text_columns.join(", "));
    if vectorized {
        let _ = writeln!(out, "   ✓ Embeddings created and stored");
    }
    out
}

pub fn render_status(status: &AgentStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "📊 Agent Status:");
    let _ = writeln!(out, "   Status: {}", status.status);
    let _ = writeln!(out, "   Loaded files: {}", status.loaded_files);

    if !status.files.is_empty() {
        let _ = writeln!(out, "\n   Files:");
        for file in &status.files {
            let _ = writeln!(out, "     - {}: {}", file.file_id, file.filename);
            let _ = writeln!(out, "       Rows: {}, Columns: {}", file.rows, file.columns);
            let _ = writeln!(
                out,
                "       Numeric columns: {}",
                file.numeric_columns.join(", ")
            );
        }
    }

    if !status.vector_stores.is_empty() {
        let _ = writeln!(out, "\n   Vector stores: {}", status.vector_stores.join(", "));
    }

    let _ = writeln!(out, "\n   Supported intents:");
    for intent in &status.supported_intents {
        let _ = writeln!(out, "     - {}", intent);
    }
    out
}

/// 互動模式用的精簡狀態
pub fn render_short_status(status: &AgentStatus) -> String {
    let mut out = format!("📊 Loaded files: {}\n", status.loaded_files);
    for file in &status.files {
        let _ = writeln!(out, "   - {}: {} rows", file.file_id, file.rows);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{FileSummary, Record};
    use serde_json::{json, Map};

    fn analysis(rows: usize) -> AgentResponse {
        let mut numbers = Map::new();
        numbers.insert("average".to_string(), json!(12.345678));
        numbers.insert("count".to_string(), json!(7));
        numbers.insert("row_indices".to_string(), json!([3, 1, 4, 1, 5, 9, 2]));
        numbers.insert("column".to_string(), json!("price"));
        AgentResponse::Analysis(AnalysisResult {
            result_table: (0..rows).map(|i| Record::new().with("id", i)).collect(),
            numbers,
            narrative: "Prices average 12.35.".to_string(),
            metadata: Map::new(),
        })
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(&json!(2.5)), "2.5000");
        assert_eq!(format_number(&json!(42)), "42");
        assert_eq!(format_number(&json!("price")), "price");
        assert_eq!(format_number(&json!([1, 2, 3])), "[1,2,3]");
        assert_eq!(
            format_number(&json!(["a", "b", "c", "d", "e", "f"])),
            "[a, b, ..., f] (6 items)"
        );
    }

    #[test]
    fn test_render_analysis_truncates_rows() {
        let text = render_response(&analysis(8));

        assert!(text.contains("📊 NARRATIVE:\nPrices average 12.35."));
        assert!(text.contains("  average: 12.3457"));
        assert!(text.contains("  count: 7"));
        assert!(text.contains("  row_indices: [3, 1, ..., 2] (7 items)"));
        assert!(text.contains("  Row 5: {\"id\":4}"));
        assert!(!text.contains("Row 6:"));
        assert!(text.contains("  ... and 3 more rows"));
    }

    #[test]
    fn test_render_empty_table() {
        let text = render_response(&analysis(0));
        assert!(text.contains("  (empty)"));
        assert!(!text.contains("more rows"));
    }

    #[test]
    fn test_render_error() {
        let text = render_response(&AgentResponse::Error(ErrorResponse {
            error: "unsupported_intent".to_string(),
            supported_intents: Some(vec!["sort".to_string(), "top_n".to_string()]),
            details: Some("Intent 'poem' is not supported".to_string()),
        }));

        assert!(text.contains("❌ ERROR: unsupported_intent"));
        assert!(text.contains("Details: Intent 'poem' is not supported"));
        assert!(text.contains("  - top_n"));
    }

    #[test]
    fn test_render_status() {
        let status = AgentStatus {
            status: "ready".to_string(),
            loaded_files: 1,
            files: vec![FileSummary {
                file_id: "sales".to_string(),
                filename: "sales.csv".to_string(),
                rows: 10,
                columns: 3,
                numeric_columns: vec!["amount".to_string(), "qty".to_string()],
            }],
            vector_stores: vec!["sales".to_string()],
            supported_intents: vec!["sort".to_string()],
        };

        let text = render_status(&status);
        assert!(text.contains("   Loaded files: 1"));
        assert!(text.contains("     - sales: sales.csv"));
        assert!(text.contains("       Numeric columns: amount, qty"));

        assert_eq!(
            render_short_status(&status),
            "📊 Loaded files: 1\n   - sales: 10 rows\n"
        );
    }
}
