//! Azure Functions custom handler hosting the daily review triggers.
//!
//! The Functions host owns the timer schedule and function-key auth (see
//! `deploy/`); it forwards timer invocations as JSON to `/daily_review` and the
//! HTTP trigger request as-is to `/api/runreview`.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{any, get, post},
    Json, Router,
};
use portfolio_review_core::pipeline::{ReviewPipeline, RunSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TIMER_BINDING: &str = "myTimer";
const DEFAULT_PORT: u16 = 3000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = portfolio_review_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(portfolio_review_core::telemetry::sentry_layer())
        .init();

    if settings.run_mode.is_development() {
        // Development: run once on startup, then stop the host.
        tracing::info!(run_mode = %settings.run_mode, "running daily review on startup");
        let pipeline = ReviewPipeline::from_settings(&settings).inspect_err(|e| {
            sentry_anyhow::capture_anyhow(e);
        })?;
        pipeline.run(today()).await?;
        return Ok(());
    }

    let pipeline = ReviewPipeline::from_settings(&settings);
    if let Err(e) = &pipeline {
        sentry_anyhow::capture_anyhow(e);
        tracing::error!(error = %e, "pipeline configuration incomplete; starting in degraded mode");
    }

    let state = AppState {
        pipeline: Arc::new(pipeline),
    };
    let app = router(state);

    let port: u16 = std::env::var("FUNCTIONS_CUSTOMHANDLER_PORT")
        .or_else(|_| std::env::var("PORT"))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));

    tracing::info!(%addr, "custom handler listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/daily_review", post(daily_review_timer))
        .route("/api/runreview", any(run_review_http))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Clone)]
struct AppState {
    /// Holds the configuration error when the pipeline could not be built.
    pipeline: Arc<anyhow::Result<ReviewPipeline>>,
}

impl AppState {
    async fn run_review(&self) -> anyhow::Result<RunSummary> {
        match self.pipeline.as_ref() {
            Ok(pipeline) => pipeline.run(today()).await,
            Err(e) => Err(anyhow::anyhow!("{e:#}")),
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

/// Invocation payload the Functions host posts for a timer trigger.
#[derive(Debug, Default, Deserialize)]
struct InvocationRequest {
    #[serde(rename = "Data", default)]
    data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct TimerInfo {
    #[serde(rename = "IsPastDue", default)]
    is_past_due: bool,
}

impl InvocationRequest {
    fn timer(&self) -> TimerInfo {
        self.data
            .get(TIMER_BINDING)
            .and_then(|v| serde_json::from_value::<TimerInfo>(v.clone()).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
struct InvocationResponse {
    #[serde(rename = "Outputs")]
    outputs: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "Logs")]
    logs: Vec<String>,
    #[serde(rename = "ReturnValue")]
    return_value: Option<serde_json::Value>,
}

impl InvocationResponse {
    fn with_logs(logs: Vec<String>) -> Self {
        Self {
            outputs: serde_json::Map::new(),
            logs,
            return_value: None,
        }
    }
}

async fn daily_review_timer(
    State(state): State<AppState>,
    payload: Option<Json<InvocationRequest>>,
) -> (StatusCode, Json<InvocationResponse>) {
    let mut logs = Vec::new();
    let timer = payload.map(|Json(p)| p.timer()).unwrap_or_default();
    if timer.is_past_due {
        tracing::info!("the timer is past due");
        logs.push("The timer is past due!".to_string());
    }

    match state.run_review().await {
        Ok(summary) => {
            logs.push(format!(
                "Daily review sent (correlation_id={}, cost=${})",
                summary.correlation_id, summary.cost.total
            ));
            (StatusCode::OK, Json(InvocationResponse::with_logs(logs)))
        }
        Err(err) => {
            logs.push(format!("Daily review failed: {err:#}"));
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(InvocationResponse::with_logs(logs)),
            )
        }
    }
}

async fn run_review_http(State(state): State<AppState>) -> impl IntoResponse {
    manual_run_response(state.run_review().await.map(|_| ()))
}

fn manual_run_response(result: anyhow::Result<()>) -> (StatusCode, String) {
    match result {
        Ok(()) => (
            StatusCode::OK,
            "✅ Daily report has been manually triggered.".to_string(),
        ),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("❌ Error while triggering daily report: {err:#}"),
        ),
    }
}

fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(
    settings: &portfolio_review_core::config::Settings,
) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(settings.run_mode.to_string().into()),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_past_due_flag_from_timer_binding() {
        let req: InvocationRequest = serde_json::from_value(json!({
            "Data": {
                "myTimer": {
                    "Schedule": {"AdjustForDST": true},
                    "ScheduleStatus": null,
                    "IsPastDue": true
                }
            },
            "Metadata": {"sys": {"MethodName": "daily_review"}}
        }))
        .unwrap();
        assert!(req.timer().is_past_due);
    }

    #[test]
    fn missing_timer_binding_is_not_past_due() {
        let req: InvocationRequest = serde_json::from_value(json!({"Metadata": {}})).unwrap();
        assert!(!req.timer().is_past_due);
    }

    #[test]
    fn invocation_response_uses_host_field_names() {
        let v = serde_json::to_value(InvocationResponse::with_logs(vec!["x".to_string()])).unwrap();
        assert_eq!(v, json!({"Outputs": {}, "Logs": ["x"], "ReturnValue": null}));
    }

    #[test]
    fn manual_run_reports_success_text() {
        let (status, body) = manual_run_response(Ok(()));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "✅ Daily report has been manually triggered.");
    }

    #[test]
    fn manual_run_embeds_error_text_in_500() {
        let (status, body) =
            manual_run_response(Err(anyhow::anyhow!("AZURE_OPENAI_API_KEY is required")));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            "❌ Error while triggering daily report: AZURE_OPENAI_API_KEY is required"
        );
    }

    #[test]
    fn manual_run_error_keeps_the_cause() {
        let err = anyhow::anyhow!("status=401").context("Azure OpenAI request failed");
        let (_, body) = manual_run_response(Err(err));
        assert_eq!(
            body,
            "❌ Error while triggering daily report: Azure OpenAI request failed: status=401"
        );
    }

    mod routes {
        use super::*;
        use axum::body::{to_bytes, Body};
        use axum::http::{header, Method, Request};
        use portfolio_review_core::config::RunMode;
        use portfolio_review_core::cost::PricingTable;
        use portfolio_review_core::domain::portfolio::Portfolio;
        use portfolio_review_core::llm::{ChatModel, ChatRequest, Completion, Provider};
        use portfolio_review_core::mail::{EmailMessage, EmailSender, Recipient};
        use portfolio_review_core::source::PortfolioSource;
        use portfolio_review_core::telemetry::NoopTelemetry;
        use tower::ServiceExt;

        struct UnreachableBlob;

        #[async_trait::async_trait]
        impl PortfolioSource for UnreachableBlob {
            fn describe(&self) -> String {
                "blob".to_string()
            }

            async fn load(&self) -> anyhow::Result<Portfolio> {
                Err(anyhow::anyhow!("HTTP 403 Forbidden").context("blob download failed"))
            }
        }

        struct SilentModel;

        #[async_trait::async_trait]
        impl ChatModel for SilentModel {
            fn provider(&self) -> Provider {
                Provider::AzureOpenAi
            }

            fn model(&self) -> &str {
                "gpt-4"
            }

            async fn complete(&self, _request: ChatRequest) -> anyhow::Result<Completion> {
                Ok(Completion::default())
            }
        }

        struct DiscardMailer;

        #[async_trait::async_trait]
        impl EmailSender for DiscardMailer {
            async fn send(&self, _message: EmailMessage) -> anyhow::Result<()> {
                Ok(())
            }
        }

        fn degraded() -> AppState {
            AppState {
                pipeline: Arc::new(Err(anyhow::anyhow!("AZURE_OPENAI_API_KEY is required"))),
            }
        }

        fn failing_source() -> AppState {
            let pipeline = ReviewPipeline::new(
                Box::new(UnreachableBlob),
                Arc::new(SilentModel),
                Box::new(DiscardMailer),
                Arc::new(NoopTelemetry),
                PricingTable::GPT4_TURBO,
                RunMode::Production,
                "reports@example.com".to_string(),
                Recipient {
                    address: "investor@example.com".to_string(),
                    display_name: "Investor".to_string(),
                },
            );
            AppState {
                pipeline: Arc::new(Ok(pipeline)),
            }
        }

        async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Vec<u8>) {
            let response = router(state).oneshot(request).await.unwrap();
            let status = response.status();
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, body.to_vec())
        }

        fn timer_request(is_past_due: bool) -> Request<Body> {
            let payload = json!({"Data": {"myTimer": {"IsPastDue": is_past_due}}, "Metadata": {}});
            Request::builder()
                .method(Method::POST)
                .uri("/daily_review")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap()
        }

        #[tokio::test]
        async fn healthz_answers_ok() {
            let request = Request::get("/healthz").body(Body::empty()).unwrap();
            let (status, body) = send(degraded(), request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, b"ok");
        }

        #[tokio::test]
        async fn degraded_http_trigger_returns_config_error() {
            for method in [Method::GET, Method::POST] {
                let request = Request::builder()
                    .method(method)
                    .uri("/api/runreview")
                    .body(Body::empty())
                    .unwrap();
                let (status, body) = send(degraded(), request).await;
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(
                    String::from_utf8(body).unwrap(),
                    "❌ Error while triggering daily report: AZURE_OPENAI_API_KEY is required"
                );
            }
        }

        #[tokio::test]
        async fn degraded_timer_trigger_fails_with_logs() {
            let (status, body) = send(degraded(), timer_request(true)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

            let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(
                v["Logs"],
                json!([
                    "The timer is past due!",
                    "Daily review failed: AZURE_OPENAI_API_KEY is required"
                ])
            );
            assert_eq!(v["ReturnValue"], serde_json::Value::Null);
        }

        #[tokio::test]
        async fn pipeline_failure_surfaces_full_error_chain() {
            let request = Request::post("/api/runreview").body(Body::empty()).unwrap();
            let (status, body) = send(failing_source(), request).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(
                String::from_utf8(body).unwrap(),
                "❌ Error while triggering daily report: blob download failed: HTTP 403 Forbidden"
            );

            let (status, body) = send(failing_source(), timer_request(false)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(
                v["Logs"],
                json!(["Daily review failed: blob download failed: HTTP 403 Forbidden"])
            );
        }
    }
}
