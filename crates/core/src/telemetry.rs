//! Diagnostic event sink handed to the pipeline at startup.

use crate::config::Settings;
use sentry_tracing::EventFilter;
use std::sync::Arc;
use tracing::Level;

pub type Properties<'a> = &'a [(&'a str, String)];

pub trait TelemetrySink: Send + Sync {
    fn track_event(&self, name: &str, properties: Properties<'_>);

    fn track_exception(&self, error: &anyhow::Error, properties: Properties<'_>);
}

/// Used when no telemetry connection is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn track_event(&self, _name: &str, _properties: Properties<'_>) {}

    fn track_exception(&self, _error: &anyhow::Error, _properties: Properties<'_>) {}
}

/// How `tracing` records reach Sentry. Errors stay breadcrumbs because run
/// failures are captured once through [`TelemetrySink::track_exception`].
pub fn sentry_event_filter(level: &Level) -> EventFilter {
    match *level {
        Level::ERROR | Level::WARN | Level::INFO => EventFilter::Breadcrumb,
        _ => EventFilter::Ignore,
    }
}

/// `sentry_tracing` layer for the binaries, using [`sentry_event_filter`].
pub fn sentry_layer<S>() -> sentry_tracing::SentryLayer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    sentry_tracing::layer().event_filter(|metadata| sentry_event_filter(metadata.level()))
}

/// Forwards events to the process-wide Sentry client.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentryTelemetry;

impl TelemetrySink for SentryTelemetry {
    fn track_event(&self, name: &str, properties: Properties<'_>) {
        sentry::with_scope(
            |scope| {
                for (key, value) in properties {
                    scope.set_tag(key, value);
                }
            },
            || sentry::capture_message(name, sentry::Level::Info),
        );
    }

    fn track_exception(&self, error: &anyhow::Error, properties: Properties<'_>) {
        sentry::with_scope(
            |scope| {
                for (key, value) in properties {
                    scope.set_tag(key, value);
                }
            },
            || sentry_anyhow::capture_anyhow(error),
        );
    }
}

/// Sentry when a DSN is configured, otherwise a no-op sink.
pub fn sink_from_settings(settings: &Settings) -> Arc<dyn TelemetrySink> {
    match settings.sentry_dsn {
        Some(_) => Arc::new(SentryTelemetry),
        None => Arc::new(NoopTelemetry),
    }
}
