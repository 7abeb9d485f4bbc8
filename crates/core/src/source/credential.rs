use crate::config::Settings;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use std::time::Duration;

const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[async_trait::async_trait]
pub trait TokenCredential: Send + Sync {
    /// Returns a bearer token for `resource` (e.g. `https://storage.azure.com/`).
    async fn get_token(&self, resource: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum IdentityEndpoint {
    /// App Service / Functions sandbox endpoint.
    AppService { endpoint: String, header: String },
    /// VM instance metadata service.
    Imds,
}

/// Ambient platform identity.
#[derive(Debug, Clone)]
pub struct ManagedIdentityCredential {
    http: reqwest::Client,
    endpoint: IdentityEndpoint,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let endpoint = match (
            std::env::var("IDENTITY_ENDPOINT").ok(),
            std::env::var("IDENTITY_HEADER").ok(),
        ) {
            (Some(endpoint), Some(header)) => IdentityEndpoint::AppService { endpoint, header },
            _ => IdentityEndpoint::Imds,
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build managed identity http client")?;

        Ok(Self {
            http,
            endpoint,
            client_id: settings.azure_client_id.clone(),
        })
    }

    fn request(&self, resource: &str) -> anyhow::Result<reqwest::RequestBuilder> {
        let mut query = vec![("resource", resource.to_string())];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.clone()));
        }

        let mut headers = HeaderMap::new();
        let req = match &self.endpoint {
            IdentityEndpoint::AppService { endpoint, header } => {
                headers.insert("X-IDENTITY-HEADER", HeaderValue::from_str(header)?);
                query.push(("api-version", APP_SERVICE_API_VERSION.to_string()));
                self.http.get(endpoint)
            }
            IdentityEndpoint::Imds => {
                headers.insert("Metadata", HeaderValue::from_static("true"));
                query.push(("api-version", IMDS_API_VERSION.to_string()));
                self.http.get(IMDS_TOKEN_URL)
            }
        };

        Ok(req.headers(headers).query(&query))
    }
}

#[async_trait::async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, resource: &str) -> anyhow::Result<String> {
        let res = self
            .request(resource)?
            .send()
            .await
            .context("managed identity token request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read managed identity response")?;
        if !status.is_success() {
            anyhow::bail!("managed identity HTTP {status}: {text}");
        }

        parse_token(&text)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

fn parse_token(text: &str) -> anyhow::Result<String> {
    let parsed = serde_json::from_str::<TokenResponse>(text)
        .context("managed identity response has no access_token")?;
    anyhow::ensure!(
        !parsed.access_token.trim().is_empty(),
        "managed identity returned an empty access_token"
    );
    Ok(parsed.access_token)
}
