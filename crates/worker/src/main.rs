use anyhow::Context;
use clap::Parser;
use portfolio_review_core::pipeline::ReviewPipeline;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod dry_run;

#[derive(Debug, Parser)]
#[command(name = "portfolio_review_worker")]
struct Args {
    /// Report date (YYYY-MM-DD). Defaults to today's UTC date.
    #[arg(long)]
    date: Option<String>,

    /// Do everything except sending the email; the HTML goes to --output or stdout.
    #[arg(long)]
    dry_run: bool,

    /// Where to write the HTML in dry-run mode.
    #[arg(long, requires = "dry_run")]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = portfolio_review_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(portfolio_review_core::telemetry::sentry_layer())
        .init();

    let args = Args::parse();
    let date = resolve_date(args.date.as_deref())?;

    let pipeline = if args.dry_run {
        let sender = dry_run::HtmlFileSender::new(args.output.clone());
        ReviewPipeline::from_settings_with_mailer(&settings, Box::new(sender))?
    } else {
        ReviewPipeline::from_settings(&settings)?
    };

    let summary = pipeline.run(date).await?;
    tracing::info!(
        %date,
        dry_run = args.dry_run,
        correlation_id = %summary.correlation_id,
        portfolio_rows = summary.portfolio_rows,
        total_cost = summary.cost.total,
        report_valid = summary.report_valid,
        "worker run complete"
    );

    Ok(())
}

fn init_sentry(
    settings: &portfolio_review_core::config::Settings,
) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

fn resolve_date(date_arg: Option<&str>) -> anyhow::Result<chrono::NaiveDate> {
    if let Some(s) = date_arg {
        return chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --date {s}, expected YYYY-MM-DD"));
    }
    Ok(chrono::Utc::now().date_naive())
}
