use crate::config::{RunMode, Settings};
use crate::cost::{estimate_cost, CostEstimate, PricingTable};
use crate::llm::azure_openai::AzureOpenAiClient;
use crate::llm::{json, ChatModel, ChatRequest};
use crate::mail::acs::AcsEmailClient;
use crate::mail::{compose_report_email, EmailSender, FooterInfo, Recipient};
use crate::report;
use crate::source::{source_from_settings, PortfolioSource};
use crate::telemetry::{sink_from_settings, TelemetrySink};
use chrono::NaiveDate;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Progress of a single run. `Failed` is reachable from every other stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    PortfolioLoaded,
    PromptBuilt,
    ModelInvoked,
    ResponseParsed,
    ReportRendered,
    EmailSent,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Start => "start",
            Stage::PortfolioLoaded => "portfolio_loaded",
            Stage::PromptBuilt => "prompt_built",
            Stage::ModelInvoked => "model_invoked",
            Stage::ResponseParsed => "response_parsed",
            Stage::ReportRendered => "report_rendered",
            Stage::EmailSent => "email_sent",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub correlation_id: Uuid,
    pub portfolio_rows: usize,
    pub cost: CostEstimate,
    /// False when the model output could not be turned into a report.
    pub report_valid: bool,
}

pub struct ReviewPipeline {
    source: Box<dyn PortfolioSource>,
    model: Arc<dyn ChatModel>,
    mailer: Box<dyn EmailSender>,
    telemetry: Arc<dyn TelemetrySink>,
    pricing: PricingTable,
    run_mode: RunMode,
    sender: String,
    recipient: Recipient,
}

impl ReviewPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn PortfolioSource>,
        model: Arc<dyn ChatModel>,
        mailer: Box<dyn EmailSender>,
        telemetry: Arc<dyn TelemetrySink>,
        pricing: PricingTable,
        run_mode: RunMode,
        sender: String,
        recipient: Recipient,
    ) -> Self {
        Self {
            source,
            model,
            mailer,
            telemetry,
            pricing,
            run_mode,
            sender,
            recipient,
        }
    }

    /// Wires every collaborator from the environment.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let mailer = AcsEmailClient::from_settings(settings)?;
        Self::from_settings_with_mailer(settings, Box::new(mailer))
    }

    /// Same as [`ReviewPipeline::from_settings`] with a caller-provided sender.
    pub fn from_settings_with_mailer(
        settings: &Settings,
        mailer: Box<dyn EmailSender>,
    ) -> anyhow::Result<Self> {
        let source = source_from_settings(settings)?;
        let model = AzureOpenAiClient::from_settings(settings)?;
        let pricing = PricingTable::from_name(settings.model_pricing.as_deref())?;
        let sender = settings.require_sender_email()?.to_string();
        let address = settings.require_receiver_email()?.to_string();
        let recipient = Recipient {
            display_name: settings
                .receiver_name
                .clone()
                .unwrap_or_else(|| address.clone()),
            address,
        };

        Ok(Self::new(
            source,
            Arc::new(model),
            mailer,
            sink_from_settings(settings),
            pricing,
            settings.run_mode,
            sender,
            recipient,
        ))
    }

    /// Runs the whole review once for `date`. Errors are logged, reported to
    /// telemetry and returned unchanged.
    pub async fn run(&self, date: NaiveDate) -> anyhow::Result<RunSummary> {
        let correlation_id = Uuid::new_v4();
        let mut stage = Stage::Start;
        tracing::info!(%correlation_id, %date, %stage, source = %self.source.describe(), "daily review started");
        self.telemetry.track_event(
            "daily_review_started",
            &[("correlation_id", correlation_id.to_string())],
        );

        match self.run_stages(date, correlation_id, &mut stage).await {
            Ok(summary) => {
                tracing::info!(
                    %correlation_id,
                    stage = %Stage::Done,
                    prompt_tokens = summary.cost.prompt_tokens,
                    completion_tokens = summary.cost.completion_tokens,
                    total_cost = summary.cost.total,
                    report_valid = summary.report_valid,
                    "daily review finished"
                );
                self.telemetry.track_event(
                    "daily_review_finished",
                    &[
                        ("correlation_id", correlation_id.to_string()),
                        ("total_cost", summary.cost.total.to_string()),
                    ],
                );
                Ok(summary)
            }
            Err(err) => {
                tracing::error!(
                    %correlation_id,
                    last_stage = %stage,
                    stage = %Stage::Failed,
                    error = %format!("{err:#}"),
                    "daily review failed"
                );
                self.telemetry.track_exception(
                    &err,
                    &[
                        ("correlation_id", correlation_id.to_string()),
                        ("stage", stage.to_string()),
                    ],
                );
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        date: NaiveDate,
        correlation_id: Uuid,
        stage: &mut Stage,
    ) -> anyhow::Result<RunSummary> {
        let portfolio = self.source.load().await?;
        advance(stage, Stage::PortfolioLoaded, correlation_id);
        tracing::debug!(rows = portfolio.len(), symbols = ?portfolio.symbols(), "portfolio loaded");

        let prompt = crate::prompt::build_prompt(date, &portfolio.to_tsv());
        advance(stage, Stage::PromptBuilt, correlation_id);

        let completion = self.model.complete(ChatRequest::report(prompt)).await?;
        advance(stage, Stage::ModelInvoked, correlation_id);
        tracing::info!(
            provider = ?self.model.provider(),
            model = self.model.model(),
            output_len = completion.text.len(),
            "model responded"
        );

        let parsed = json::parse_model_output(&completion.text);
        let report_valid = !json::is_empty_object(&parsed);
        if !report_valid {
            self.telemetry.track_event(
                "model_output_unparsed",
                &[
                    ("correlation_id", correlation_id.to_string()),
                    ("output_len", completion.text.len().to_string()),
                ],
            );
        }
        advance(stage, Stage::ResponseParsed, correlation_id);

        let html_body = report::render_report(&parsed);
        let cost = estimate_cost(completion.usage, &self.pricing);
        advance(stage, Stage::ReportRendered, correlation_id);

        let message = compose_report_email(
            &html_body,
            &cost,
            &FooterInfo {
                run_mode: self.run_mode,
                correlation_id,
            },
            date,
            &self.sender,
            &self.recipient,
        );
        self.mailer.send(message).await?;
        advance(stage, Stage::EmailSent, correlation_id);

        Ok(RunSummary {
            correlation_id,
            portfolio_rows: portfolio.len(),
            cost,
            report_valid,
        })
    }
}

fn advance(stage: &mut Stage, next: Stage, correlation_id: Uuid) {
    tracing::info!(%correlation_id, from = %stage, to = %next, "stage transition");
    *stage = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::Portfolio;
    use crate::llm::{Completion, Provider, Usage};
    use crate::mail::EmailMessage;
    use crate::telemetry::testing::RecordingTelemetry;
    use std::sync::Mutex;

    struct FixedSource(&'static str);

    #[async_trait::async_trait]
    impl PortfolioSource for FixedSource {
        fn describe(&self) -> String {
            "memory".to_string()
        }

        async fn load(&self) -> anyhow::Result<Portfolio> {
            Portfolio::from_tsv(self.0)
        }
    }

    struct FailingSource;

    #[async_trait::async_trait]
    impl PortfolioSource for FailingSource {
        fn describe(&self) -> String {
            "broken".to_string()
        }

        async fn load(&self) -> anyhow::Result<Portfolio> {
            anyhow::bail!("blob storage HTTP 403 Forbidden")
        }
    }

    struct CannedModel(&'static str);

    #[async_trait::async_trait]
    impl ChatModel for CannedModel {
        fn provider(&self) -> Provider {
            Provider::AzureOpenAi
        }

        fn model(&self) -> &str {
            "gpt-4"
        }

        async fn complete(&self, _request: ChatRequest) -> anyhow::Result<Completion> {
            Ok(Completion {
                text: self.0.to_string(),
                usage: Some(Usage {
                    prompt_tokens: 1000,
                    completion_tokens: 1000,
                }),
            })
        }
    }

    #[derive(Default, Clone)]
    struct Outbox(Arc<Mutex<Vec<EmailMessage>>>);

    #[async_trait::async_trait]
    impl EmailSender for Outbox {
        async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn pipeline(
        source: Box<dyn PortfolioSource>,
        model_output: &'static str,
        outbox: Outbox,
        telemetry: Arc<RecordingTelemetry>,
    ) -> ReviewPipeline {
        ReviewPipeline::new(
            source,
            Arc::new(CannedModel(model_output)),
            Box::new(outbox),
            telemetry,
            PricingTable::GPT4_TURBO,
            RunMode::Development,
            "from@example.com".to_string(),
            Recipient {
                address: "to@example.com".to_string(),
                display_name: "To".to_string(),
            },
        )
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    #[tokio::test]
    async fn malformed_model_output_still_sends_degraded_report() {
        let outbox = Outbox::default();
        let telemetry = Arc::new(RecordingTelemetry::default());
        let p = pipeline(
            Box::new(FixedSource("symbol\nKO\n")),
            "Sorry, I cannot help with that.",
            outbox.clone(),
            telemetry.clone(),
        );

        let summary = p.run(date()).await.unwrap();
        assert!(!summary.report_valid);
        assert_eq!(summary.cost.total, 0.04);

        let sent = outbox.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].html.starts_with(report::INVALID_DATA_NOTICE));
        assert!(telemetry
            .events
            .lock()
            .unwrap()
            .contains(&"model_output_unparsed".to_string()));
    }

    #[tokio::test]
    async fn source_failure_propagates_unchanged_and_sends_nothing() {
        let outbox = Outbox::default();
        let telemetry = Arc::new(RecordingTelemetry::default());
        let p = pipeline(Box::new(FailingSource), "{}", outbox.clone(), telemetry.clone());

        let err = p.run(date()).await.unwrap_err();
        assert_eq!(err.to_string(), "blob storage HTTP 403 Forbidden");
        assert!(outbox.0.lock().unwrap().is_empty());
        assert_eq!(telemetry.exceptions.lock().unwrap().len(), 1);
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::ResponseParsed.to_string(), "response_parsed");
        assert_eq!(Stage::Failed.to_string(), "failed");
    }
}
