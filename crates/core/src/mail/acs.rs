use crate::config::Settings;
use crate::mail::{EmailMessage, EmailSender, Recipient};
use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;

const API_VERSION: &str = "2023-03-31";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_MAX_POLLS: u32 = 60;

/// Parsed `endpoint=...;accesskey=...` connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcsConnection {
    pub endpoint: Url,
    pub access_key: Vec<u8>,
}

impl AcsConnection {
    pub fn parse(connection_string: &str) -> anyhow::Result<Self> {
        let mut endpoint = None;
        let mut access_key = None;
        for part in connection_string.split(';') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value.trim().to_string()),
                // Base64 keys may end in '=' padding, so only the first '=' splits.
                "accesskey" => access_key = Some(value.trim().to_string()),
                _ => {}
            }
        }

        let endpoint = endpoint.context("ACS connection string has no endpoint")?;
        let endpoint = Url::parse(&endpoint)
            .with_context(|| format!("invalid ACS endpoint: {endpoint}"))?;
        let access_key = access_key.context("ACS connection string has no accesskey")?;
        let access_key = BASE64
            .decode(access_key)
            .context("ACS accesskey is not valid base64")?;

        Ok(Self {
            endpoint,
            access_key,
        })
    }
}

/// Azure Communication Services Email over REST, with HMAC request signing.
#[derive(Debug, Clone)]
pub struct AcsEmailClient {
    http: reqwest::Client,
    connection: AcsConnection,
    poll_interval: Duration,
    max_polls: u32,
}

impl AcsEmailClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let connection = AcsConnection::parse(settings.require_acs_connection_string()?)?;

        let poll_interval_secs = std::env::var("ACS_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

        let max_polls = std::env::var("ACS_MAX_POLLS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_POLLS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build ACS http client")?;

        Ok(Self {
            http,
            connection,
            poll_interval: Duration::from_secs(poll_interval_secs),
            max_polls,
        })
    }

    fn send_url(&self) -> anyhow::Result<Url> {
        let mut url = self
            .connection
            .endpoint
            .join("./emails:send")
            .context("failed to build ACS send URL")?;
        url.set_query(Some(&format!("api-version={API_VERSION}")));
        Ok(url)
    }

    fn signed_headers(&self, method: &Method, url: &Url, body: &[u8]) -> anyhow::Result<HeaderMap> {
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        let content_hash = BASE64.encode(Sha256::digest(body));
        let host = host_header(url)?;
        let signature = sign(
            &self.connection.access_key,
            &string_to_sign(method, url, &date, &host, &content_hash),
        )?;

        let mut headers = HeaderMap::new();
        headers.insert("x-ms-date", HeaderValue::from_str(&date)?);
        headers.insert("x-ms-content-sha256", HeaderValue::from_str(&content_hash)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!(
                "HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature={signature}"
            ))?,
        );
        Ok(headers)
    }

    async fn begin_send(&self, message: &EmailMessage) -> anyhow::Result<Url> {
        let url = self.send_url()?;
        let body = serde_json::to_vec(&SendEmailRequest::from(message))
            .context("failed to encode ACS send request")?;

        let mut headers = self.signed_headers(&Method::POST, &url, &body)?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let res = self
            .http
            .post(url.clone())
            .headers(headers)
            .body(body)
            .send()
            .await
            .context("ACS send request failed")?;

        let status = res.status();
        let operation_location = res
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = res.text().await.context("failed to read ACS response")?;
        if !status.is_success() {
            anyhow::bail!("ACS send HTTP {status}: {text}");
        }

        let location = match operation_location {
            Some(location) => location,
            None => {
                // Fall back to the operation id in the body.
                let op = serde_json::from_str::<OperationStatus>(&text)
                    .with_context(|| format!("ACS send response is not valid JSON: {text}"))?;
                let id = op.id.context("ACS send response has no operation id")?;
                let mut url = self
                    .connection
                    .endpoint
                    .join(&format!("./emails/operations/{id}"))
                    .context("failed to build ACS operation URL")?;
                url.set_query(Some(&format!("api-version={API_VERSION}")));
                return Ok(url);
            }
        };

        Url::parse(&location).with_context(|| format!("invalid operation-location: {location}"))
    }

    async fn poll_until_done(&self, operation: &Url) -> anyhow::Result<String> {
        for attempt in 1..=self.max_polls {
            let headers = self.signed_headers(&Method::GET, operation, b"")?;
            let res = self
                .http
                .get(operation.clone())
                .headers(headers)
                .send()
                .await
                .context("ACS operation poll failed")?;

            let status = res.status();
            let retry_after = res
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = res.text().await.context("failed to read ACS poll response")?;
            if !status.is_success() {
                anyhow::bail!("ACS operation HTTP {status}: {text}");
            }

            let op = serde_json::from_str::<OperationStatus>(&text)
                .with_context(|| format!("ACS operation response is not valid JSON: {text}"))?;
            match op.state() {
                OperationState::Succeeded => return Ok(op.id.unwrap_or_default()),
                OperationState::Failed => {
                    anyhow::bail!(
                        "ACS email send {}: {}",
                        op.status,
                        op.error
                            .map(|e| e.message)
                            .unwrap_or_else(|| "no error details".to_string())
                    );
                }
                OperationState::Pending => {
                    let wait = retry_after.unwrap_or(self.poll_interval);
                    tracing::debug!(attempt, status = %op.status, ?wait, "ACS email send in progress");
                    tokio::time::sleep(wait).await;
                }
            }
        }

        anyhow::bail!(
            "ACS email send did not complete after {} polls",
            self.max_polls
        )
    }
}

#[async_trait::async_trait]
impl EmailSender for AcsEmailClient {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        let operation = self.begin_send(&message).await?;
        let operation_id = self.poll_until_done(&operation).await?;
        tracing::info!(%operation_id, recipient = %message.recipient.address, "daily review sent via ACS");
        Ok(())
    }
}

fn host_header(url: &Url) -> anyhow::Result<String> {
    let host = url.host_str().context("ACS URL has no host")?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn string_to_sign(method: &Method, url: &Url, date: &str, host: &str, content_hash: &str) -> String {
    let path_and_query = match url.query() {
        Some(q) => format!("{}?{q}", url.path()),
        None => url.path().to_string(),
    };
    format!("{method}\n{path_and_query}\n{date};{host};{content_hash}")
}

fn sign(key: &[u8], string_to_sign: &str) -> anyhow::Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).context("invalid HMAC key")?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailRequest<'a> {
    sender_address: &'a str,
    content: EmailContent<'a>,
    recipients: Recipients<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailContent<'a> {
    subject: &'a str,
    plain_text: &'a str,
    html: &'a str,
}

#[derive(Debug, Serialize)]
struct Recipients<'a> {
    to: [&'a Recipient; 1],
}

impl<'a> From<&'a EmailMessage> for SendEmailRequest<'a> {
    fn from(message: &'a EmailMessage) -> Self {
        Self {
            sender_address: &message.sender,
            content: EmailContent {
                subject: &message.subject,
                plain_text: &message.plain_text,
                html: &message.html,
            },
            recipients: Recipients {
                to: [&message.recipient],
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationState {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Debug, Clone, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

impl OperationStatus {
    fn state(&self) -> OperationState {
        match self.status.as_str() {
            "Succeeded" => OperationState::Succeeded,
            "Failed" | "Canceled" => OperationState::Failed,
            _ => OperationState::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEY_B64: &str = "c2VjcmV0LWtleQ==";

    fn connection() -> AcsConnection {
        AcsConnection::parse(&format!(
            "endpoint=https://contoso.communication.azure.com/;accesskey={KEY_B64}"
        ))
        .unwrap()
    }

    #[test]
    fn parses_connection_string_with_padded_key() {
        let c = connection();
        assert_eq!(c.endpoint.host_str(), Some("contoso.communication.azure.com"));
        assert_eq!(c.access_key, b"secret-key");
    }

    #[test]
    fn rejects_incomplete_connection_strings() {
        assert!(AcsConnection::parse("accesskey=abc=").is_err());
        assert!(AcsConnection::parse("endpoint=https://x.communication.azure.com/").is_err());
        assert!(AcsConnection::parse("endpoint=https://x/;accesskey=!!!").is_err());
    }

    #[test]
    fn string_to_sign_uses_path_query_and_signed_headers() {
        let url = Url::parse("https://contoso.communication.azure.com/emails:send?api-version=2023-03-31").unwrap();
        let s = string_to_sign(
            &Method::POST,
            &url,
            "Tue, 10 Mar 2026 12:00:00 GMT",
            "contoso.communication.azure.com",
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=",
        );
        assert_eq!(
            s,
            "POST\n/emails:send?api-version=2023-03-31\nTue, 10 Mar 2026 12:00:00 GMT;contoso.communication.azure.com;47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn signature_is_deterministic_base64() {
        let a = sign(b"secret-key", "payload").unwrap();
        let b = sign(b"secret-key", "payload").unwrap();
        let c = sign(b"other-key", "payload").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(BASE64.decode(&a).unwrap().len(), 32);
    }

    #[test]
    fn empty_body_hash_matches_sha256_of_nothing() {
        assert_eq!(
            BASE64.encode(Sha256::digest(b"")),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn send_url_targets_emails_send() {
        let client = AcsEmailClient {
            http: reqwest::Client::new(),
            connection: connection(),
            poll_interval: Duration::from_secs(1),
            max_polls: 1,
        };
        assert_eq!(
            client.send_url().unwrap().as_str(),
            "https://contoso.communication.azure.com/emails:send?api-version=2023-03-31"
        );
    }

    #[test]
    fn request_body_matches_acs_shape() {
        let message = EmailMessage {
            subject: "s".to_string(),
            plain_text: "p".to_string(),
            html: "<b>h</b>".to_string(),
            sender: "from@example.com".to_string(),
            recipient: Recipient {
                address: "to@example.com".to_string(),
                display_name: "To".to_string(),
            },
        };
        let v = serde_json::to_value(SendEmailRequest::from(&message)).unwrap();
        assert_eq!(
            v,
            json!({
                "senderAddress": "from@example.com",
                "content": {"subject": "s", "plainText": "p", "html": "<b>h</b>"},
                "recipients": {"to": [{"address": "to@example.com", "displayName": "To"}]}
            })
        );
    }

    #[test]
    fn operation_states() {
        let parse = |s: &str| serde_json::from_value::<OperationStatus>(json!({"id": "1", "status": s})).unwrap().state();
        assert_eq!(parse("Running"), OperationState::Pending);
        assert_eq!(parse("NotStarted"), OperationState::Pending);
        assert_eq!(parse("Succeeded"), OperationState::Succeeded);
        assert_eq!(parse("Failed"), OperationState::Failed);
        assert_eq!(parse("Canceled"), OperationState::Failed);
    }
}
