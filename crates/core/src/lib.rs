pub mod cost;
pub mod domain;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod source;
pub mod telemetry;

pub mod config {
    use anyhow::Context;
    use std::fmt;

    const DEFAULT_PORTFOLIO_PATH: &str = "portfolio.tsv";
    const DEFAULT_STORAGE_CONTAINER: &str = "source";
    const DEFAULT_STORAGE_BLOB: &str = "portfolio.tsv";

    /// Deployment mode, read from `AZURE_FUNCTIONS_ENVIRONMENT`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum RunMode {
        Development,
        Production,
    }

    impl RunMode {
        pub fn from_env_value(value: Option<&str>) -> Self {
            match value.map(str::trim) {
                Some("Development") => RunMode::Development,
                _ => RunMode::Production,
            }
        }

        pub fn is_development(self) -> bool {
            matches!(self, RunMode::Development)
        }
    }

    impl fmt::Display for RunMode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                RunMode::Development => f.write_str("Development"),
                RunMode::Production => f.write_str("Production"),
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub run_mode: RunMode,
        pub portfolio_path: String,
        pub storage_account_name: Option<String>,
        pub storage_container: String,
        pub storage_blob: String,
        pub azure_client_id: Option<String>,
        pub openai_endpoint: Option<String>,
        pub openai_api_key: Option<String>,
        pub model_pricing: Option<String>,
        pub acs_connection_string: Option<String>,
        pub sender_email: Option<String>,
        pub receiver_email: Option<String>,
        pub receiver_name: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                run_mode: RunMode::from_env_value(
                    std::env::var("AZURE_FUNCTIONS_ENVIRONMENT").ok().as_deref(),
                ),
                portfolio_path: non_empty_var("PORTFOLIO_PATH")
                    .unwrap_or_else(|| DEFAULT_PORTFOLIO_PATH.to_string()),
                storage_account_name: non_empty_var("AZURE_STORAGE_ACCOUNT_NAME"),
                storage_container: non_empty_var("AZURE_STORAGE_CONTAINER")
                    .unwrap_or_else(|| DEFAULT_STORAGE_CONTAINER.to_string()),
                storage_blob: non_empty_var("AZURE_STORAGE_BLOB")
                    .unwrap_or_else(|| DEFAULT_STORAGE_BLOB.to_string()),
                azure_client_id: non_empty_var("AZURE_CLIENT_ID"),
                openai_endpoint: non_empty_var("AZURE_OPENAI_ENDPOINT"),
                openai_api_key: non_empty_var("AZURE_OPENAI_API_KEY"),
                model_pricing: non_empty_var("MODEL_PRICING"),
                acs_connection_string: non_empty_var("ACS_CONNECTION_STRING"),
                sender_email: non_empty_var("SENDER_EMAIL"),
                receiver_email: non_empty_var("RECEIVER_EMAIL"),
                receiver_name: non_empty_var("RECEIVER_NAME"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
            })
        }

        pub fn require_storage_account_name(&self) -> anyhow::Result<&str> {
            self.storage_account_name
                .as_deref()
                .context("AZURE_STORAGE_ACCOUNT_NAME is required")
        }

        pub fn require_openai_endpoint(&self) -> anyhow::Result<&str> {
            self.openai_endpoint
                .as_deref()
                .context("AZURE_OPENAI_ENDPOINT is required")
        }

        pub fn require_openai_api_key(&self) -> anyhow::Result<&str> {
            self.openai_api_key
                .as_deref()
                .context("AZURE_OPENAI_API_KEY is required")
        }

        pub fn require_acs_connection_string(&self) -> anyhow::Result<&str> {
            self.acs_connection_string
                .as_deref()
                .context("ACS_CONNECTION_STRING is required")
        }

        pub fn require_sender_email(&self) -> anyhow::Result<&str> {
            self.sender_email
                .as_deref()
                .context("SENDER_EMAIL is required")
        }

        pub fn require_receiver_email(&self) -> anyhow::Result<&str> {
            self.receiver_email
                .as_deref()
                .context("RECEIVER_EMAIL is required")
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn run_mode_is_development_only_for_exact_value() {
            assert_eq!(
                RunMode::from_env_value(Some("Development")),
                RunMode::Development
            );
            assert_eq!(
                RunMode::from_env_value(Some("Staging")),
                RunMode::Production
            );
            assert_eq!(RunMode::from_env_value(None), RunMode::Production);
            assert!(RunMode::Development.is_development());
            assert_eq!(RunMode::Production.to_string(), "Production");
        }
    }
}
