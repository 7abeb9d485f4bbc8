pub mod acs;

use crate::config::RunMode;
use crate::cost::CostEstimate;
use chrono::NaiveDate;
use serde::Serialize;

pub const PLAIN_TEXT_FALLBACK: &str = "Twój raport dzienny jest dostępny w wersji HTML.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub address: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub plain_text: String,
    pub html: String,
    pub sender: String,
    pub recipient: Recipient,
}

#[async_trait::async_trait]
pub trait EmailSender: Send + Sync {
    /// Submits the message and waits until the service accepts or rejects it.
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()>;
}

/// Run details printed under the report.
#[derive(Debug, Clone)]
pub struct FooterInfo {
    pub run_mode: RunMode,
    pub correlation_id: uuid::Uuid,
}

pub fn subject_for(date: NaiveDate) -> String {
    format!("📈 Dzienny przegląd portfela — {}", date.format("%Y-%m-%d"))
}

pub fn cost_footer(cost: &CostEstimate, footer: &FooterInfo) -> String {
    format!(
        "<hr><p style='font-size:small;color:gray'>\
🔍 Wykorzystano {} tokenów promptu, {} tokenów odpowiedzi.<br>\
💸 Szacunkowy koszt: <b>${}</b> ({}).<br>\
{} &middot; {}</p>",
        cost.prompt_tokens,
        cost.completion_tokens,
        cost.total,
        cost.pricing,
        footer.run_mode,
        footer.correlation_id
    )
}

pub fn compose_report_email(
    html_body: &str,
    cost: &CostEstimate,
    footer: &FooterInfo,
    date: NaiveDate,
    sender: &str,
    recipient: &Recipient,
) -> EmailMessage {
    EmailMessage {
        subject: subject_for(date),
        plain_text: PLAIN_TEXT_FALLBACK.to_string(),
        html: format!("{html_body}{}", cost_footer(cost, footer)),
        sender: sender.to_string(),
        recipient: recipient.clone(),
    }
}
