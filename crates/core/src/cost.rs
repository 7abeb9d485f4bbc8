use crate::llm::Usage;

/// Per-token USD rates for one model deployment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingTable {
    pub name: &'static str,
    pub prompt_per_token: f64,
    pub completion_per_token: f64,
}

impl PricingTable {
    /// $0.01 / 1K prompt tokens, $0.03 / 1K completion tokens.
    pub const GPT4_TURBO: PricingTable = PricingTable {
        name: "GPT-4 Turbo",
        prompt_per_token: 0.01 / 1_000.0,
        completion_per_token: 0.03 / 1_000.0,
    };

    /// $2.50 / 1M prompt tokens, $10.00 / 1M completion tokens.
    pub const GPT4O: PricingTable = PricingTable {
        name: "GPT-4o",
        prompt_per_token: 2.50 / 1_000_000.0,
        completion_per_token: 10.00 / 1_000_000.0,
    };

    pub fn from_name(name: Option<&str>) -> anyhow::Result<Self> {
        match name.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("gpt-4-turbo") | Some("gpt-4") => Ok(Self::GPT4_TURBO),
            Some("gpt-4o") => Ok(Self::GPT4O),
            Some(other) => anyhow::bail!("unknown MODEL_PRICING value: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// USD, rounded to 4 decimal places.
    pub total: f64,
    pub pricing: &'static str,
}

/// Estimates the cost of one model call. A missing usage report counts as
/// zero tokens.
pub fn estimate_cost(usage: Option<Usage>, pricing: &PricingTable) -> CostEstimate {
    let usage = usage.unwrap_or_default();
    let raw = usage.prompt_tokens as f64 * pricing.prompt_per_token
        + usage.completion_tokens as f64 * pricing.completion_per_token;

    CostEstimate {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total: round4(raw),
        pricing: pricing.name,
    }
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
