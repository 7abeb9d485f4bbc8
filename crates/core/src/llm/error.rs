use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

/// Model-call failure that keeps the raw service output for later inspection.
#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl LlmDiagnosticsError {
    pub fn http(provider: Provider, status: reqwest::StatusCode, body: String) -> Self {
        let raw_response_json = serde_json::from_str::<Value>(&body).ok();
        let service_message = raw_response_json
            .as_ref()
            .and_then(|v| v.pointer("/error/message"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            provider,
            stage: "http",
            detail: match service_message {
                Some(msg) => format!("status={status}: {msg}"),
                None => format!("status={status}"),
            },
            raw_output: Some(body),
            raw_response_json,
        }
    }

    pub fn decode(provider: Provider, detail: impl Into<String>, body: String) -> Self {
        Self {
            provider,
            stage: "decode",
            detail: detail.into(),
            raw_output: Some(body),
            raw_response_json: None,
        }
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (provider={:?}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}
