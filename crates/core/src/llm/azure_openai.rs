use crate::config::Settings;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{ChatModel, ChatRequest, Completion, Provider, Usage};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_DEPLOYMENT: &str = "gpt-4";
const DEFAULT_API_VERSION: &str = "2024-02-01";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct AzureOpenAiClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    deployment: String,
    api_version: String,
}

impl AzureOpenAiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let endpoint = settings.require_openai_endpoint()?.to_string();
        let api_key = settings.require_openai_api_key()?.to_string();
        let deployment = std::env::var("AZURE_OPENAI_DEPLOYMENT")
            .unwrap_or_else(|_| DEFAULT_DEPLOYMENT.to_string());
        let api_version = std::env::var("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|_| DEFAULT_API_VERSION.to_string());

        let timeout_secs = std::env::var("AZURE_OPENAI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            endpoint,
            deployment,
            api_version,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment,
            self.api_version
        )
    }

    async fn create_completion(
        &self,
        req: &ChatCompletionRequest<'_>,
    ) -> anyhow::Result<ChatCompletionResponse> {
        let mut headers = HeaderMap::new();
        headers.insert("api-key", HeaderValue::from_str(&self.api_key)?);

        let res = self
            .http
            .post(self.url())
            .headers(headers)
            .json(req)
            .send()
            .await
            .context("Azure OpenAI request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Azure OpenAI response body")?;
        if !status.is_success() {
            return Err(LlmDiagnosticsError::http(Provider::AzureOpenAi, status, text).into());
        }

        decode_response(&text)
    }
}

fn decode_response(text: &str) -> anyhow::Result<ChatCompletionResponse> {
    serde_json::from_str::<ChatCompletionResponse>(text).map_err(|err| {
        LlmDiagnosticsError::decode(
            Provider::AzureOpenAi,
            format!("failed to decode chat completion response: {err}"),
            text.to_string(),
        )
        .into()
    })
}

impl ChatCompletionResponse {
    fn into_completion(self) -> Completion {
        let text = self
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.and_then(|m| m.content))
            .collect::<Vec<_>>()
            .join("");

        Completion {
            text,
            usage: self.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens.unwrap_or(0),
                completion_tokens: u.completion_tokens.unwrap_or(0),
            }),
        }
    }
}

#[async_trait::async_trait]
impl ChatModel for AzureOpenAiClient {
    fn provider(&self) -> Provider {
        Provider::AzureOpenAi
    }

    fn model(&self) -> &str {
        &self.deployment
    }

    async fn complete(&self, request: ChatRequest) -> anyhow::Result<Completion> {
        let req = ChatCompletionRequest {
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let res = self.create_completion(&req).await?;
        if let Some(reason) = res.choices.first().and_then(|c| c.finish_reason.as_deref()) {
            if reason == "length" {
                tracing::warn!(
                    deployment = %self.deployment,
                    max_tokens = request.max_tokens,
                    "model output truncated at max_tokens"
                );
            }
        }

        Ok(res.into_completion())
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,

    #[serde(default)]
    usage: Option<UsageBlock>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,

    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct UsageBlock {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
}
