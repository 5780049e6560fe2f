use crate::domain::model::{FileMetadata, Record};
use crate::domain::ports::{GenerationOptions, RawIntent};
use crate::utils::error::{AgentError, Result};
use serde_json::{Map, Value};

pub const NARRATIVE_OPTIONS: GenerationOptions = GenerationOptions {
    temperature: 0.3,
    max_output_tokens: 500,
};

pub const ENHANCE_OPTIONS: GenerationOptions = GenerationOptions {
    temperature: 0.3,
    max_output_tokens: 200,
};

const INTENT_CATALOG: &str = r#"1. compare_averages - compare the mean of a column across two files or across groups
   Parameters: {"column": str, "file1_id": str|null, "file2_id": str|null, "group_by": str|null}

2. filter_threshold - keep rows whose numeric column passes a threshold
   Parameters: {"column": str, "operator": str (>, <, >=, <=, ==, !=), "value": float, "file_id": str|null}

3. sort - order rows by a column
   Parameters: {"column": str, "ascending": bool, "file_id": str|null, "limit": int|null}

4. top_n - the N rows with the highest (or lowest) values of a column
   Parameters: {"column": str, "n": int, "ascending": bool, "file_id": str|null}

5. compare_top - compare the top N values of a column in two files
   Parameters: {"column": str, "n": int, "file1_id": str|null, "file2_id": str|null}

6. explain_row - find rows matching a description through semantic search
   Parameters: {"query": str, "file_id": str|null, "top_k": int}"#;

fn describe_files(files: &[FileMetadata]) -> String {
    files
        .iter()
        .map(|f| {
            format!(
                "- File ID: {}, Columns: {}, Numeric columns: {}",
                f.file_id,
                f.columns.join(", "),
                f.numeric_columns.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn intent_prompt(files: &[FileMetadata], query: &str) -> String {
    format!(
        "You translate questions about tabular data into a JSON action.\n\n\
         Available files:\n{files}\n\n\
         Supported intents:\n{catalog}\n\n\
         User query: \"{query}\"\n\n\
         Answer with a JSON object holding the keys \"intent\" and \"parameters\". \
         When no intent fits, answer {{\"intent\": \"unsupported\", \"parameters\": {{}}}}.\n\
         Return only the JSON, without any explanation.",
        files = describe_files(files),
        catalog = INTENT_CATALOG,
        query = query,
    )
}

pub fn narrative_prompt(
    intent: &str,
    parameters: &Value,
    numbers: &Map<String, Value>,
    result_table: &[Record],
) -> String {
    let preview: Vec<&Record> = result_table.iter().take(5).collect();
    let preview = serde_json::to_string(&preview).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Write a short narrative explaining the result of this analysis.\n\n\
         Intent: {intent}\n\
         Parameters: {parameters}\n\n\
         Computed numbers: {numbers}\n\n\
         Result preview (first 5 rows): {preview}\n\n\
         The narrative must describe the analysis that was run, point out the key findings, \
         quote specific values from the computed numbers and stay within 2-4 sentences \
         in a professional tone.\n\n\
         Return only the narrative text.",
        intent = intent,
        parameters = parameters,
        numbers = Value::Object(numbers.clone()),
        preview = preview,
    )
}

pub fn enhance_prompt(query: &str) -> String {
    format!(
        "Rephrase this analytical question so it is precise and unambiguous, keeping its original intent:\n\n\
         \"{}\"\n\n\
         Return only the rephrased question.",
        query
    )
}

/// 去掉 ```json ... ``` 包裝
pub fn strip_code_fences(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    }
    if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

pub fn parse_intent_reply(reply: &str) -> Result<RawIntent> {
    let body = strip_code_fences(reply);
    let value: Value = serde_json::from_str(body).map_err(|e| AgentError::IntentParseError {
        message: format!("reply is not valid JSON ({}): {}", e, truncate(body, 200)),
    })?;

    let Value::Object(mut object) = value else {
        return Err(AgentError::IntentParseError {
            message: "reply is not a JSON object".to_string(),
        });
    };

    let intent = match object.remove("intent") {
        Some(Value::String(intent)) => intent,
        _ => {
            return Err(AgentError::IntentParseError {
                message: "reply has no \"intent\" string".to_string(),
            })
        }
    };
    let parameters = match object.remove("parameters") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(parameters) => parameters,
    };

    Ok(RawIntent { intent, parameters })
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
