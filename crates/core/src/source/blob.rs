use crate::config::Settings;
use crate::domain::portfolio::Portfolio;
use crate::source::credential::TokenCredential;
use crate::source::PortfolioSource;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::sync::Arc;
use std::time::Duration;

const STORAGE_RESOURCE: &str = "https://storage.azure.com/";
const STORAGE_API_VERSION: &str = "2023-11-03";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Portfolio TSV stored as a blob, read with the platform identity.
pub struct BlobSource {
    http: reqwest::Client,
    account: String,
    container: String,
    blob: String,
    credential: Arc<dyn TokenCredential>,
}

impl BlobSource {
    pub fn from_settings(
        settings: &Settings,
        credential: Arc<dyn TokenCredential>,
    ) -> anyhow::Result<Self> {
        let account = settings.require_storage_account_name()?.to_string();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build blob storage http client")?;

        Ok(Self {
            http,
            account,
            container: settings.storage_container.clone(),
            blob: settings.storage_blob.clone(),
            credential,
        })
    }

    fn url(&self) -> String {
        format!(
            "https://{}.blob.core.windows.net/{}/{}",
            self.account, self.container, self.blob
        )
    }
}

#[async_trait::async_trait]
impl PortfolioSource for BlobSource {
    fn describe(&self) -> String {
        self.url()
    }

    async fn load(&self) -> anyhow::Result<Portfolio> {
        let token = self
            .credential
            .get_token(STORAGE_RESOURCE)
            .await
            .context("failed to acquire storage token")?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))?,
        );
        headers.insert("x-ms-version", HeaderValue::from_static(STORAGE_API_VERSION));

        let url = self.url();
        let res = self
            .http
            .get(&url)
            .headers(headers)
            .send()
            .await
            .with_context(|| format!("blob download failed: {url}"))?;

        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .context("failed to read blob body")?;
        if !status.is_success() {
            anyhow::bail!(
                "blob storage HTTP {status} for {url}: {}",
                String::from_utf8_lossy(&bytes)
            );
        }

        let text = String::from_utf8(bytes.to_vec()).context("portfolio blob is not UTF-8")?;
        Portfolio::from_tsv(&text).with_context(|| format!("failed to parse portfolio blob {url}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticToken;

    #[async_trait::async_trait]
    impl TokenCredential for StaticToken {
        async fn get_token(&self, _resource: &str) -> anyhow::Result<String> {
            Ok("t".to_string())
        }
    }

    #[test]
    fn blob_url_uses_account_container_and_name() {
        let source = BlobSource {
            http: reqwest::Client::new(),
            account: "acct".to_string(),
            container: "source".to_string(),
            blob: "portfolio.tsv".to_string(),
            credential: Arc::new(StaticToken),
        };
        assert_eq!(
            source.describe(),
            "https://acct.blob.core.windows.net/source/portfolio.tsv"
        );
    }
}
