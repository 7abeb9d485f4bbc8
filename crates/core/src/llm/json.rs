use serde_json::{Map, Value};

/// Removes a surrounding Markdown fence (```json ... ``` or ``` ... ```).
/// Text without a leading fence is returned trimmed and otherwise untouched.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    // The opening fence line may carry a language tag.
    let mut inner = match trimmed.split_once('\n') {
        Some((_, rest)) => rest,
        None => trimmed.trim_start_matches('`').trim_start_matches("json"),
    };
    if let Some(end) = inner.rfind("```") {
        inner = &inner[..end];
    }
    inner.trim()
}

/// Best-effort parse of model output. Malformed output is logged and yields an
/// empty JSON object so the run can continue with a degraded report.
pub fn parse_model_output(text: &str) -> Value {
    let body = strip_code_fence(text);
    match serde_json::from_str::<Value>(body) {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(
                error = %err,
                output_len = text.len(),
                "failed to parse model output to JSON"
            );
            Value::Object(Map::new())
        }
    }
}

pub fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(Map::is_empty)
}
