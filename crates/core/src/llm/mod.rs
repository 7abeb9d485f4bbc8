pub mod azure_openai;
pub mod error;
pub mod json;

/// Sampling parameters used for the daily report.
pub const REPORT_TEMPERATURE: f32 = 0.0;
pub const REPORT_MAX_TOKENS: u32 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn report(prompt: String) -> Self {
        Self {
            prompt,
            temperature: REPORT_TEMPERATURE,
            max_tokens: REPORT_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    /// Absent when the service did not report token usage.
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone)]
pub enum Provider {
    AzureOpenAi,
}

#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    fn provider(&self) -> Provider;

    /// Deployment or model name the requests go to.
    fn model(&self) -> &str;

    async fn complete(&self, request: ChatRequest) -> anyhow::Result<Completion>;
}
