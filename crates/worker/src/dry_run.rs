use anyhow::Context;
use portfolio_review_core::mail::{EmailMessage, EmailSender};
use std::path::PathBuf;

/// Stands in for the email service: writes the final HTML instead of sending it.
#[derive(Debug, Clone)]
pub struct HtmlFileSender {
    output: Option<PathBuf>,
}

impl HtmlFileSender {
    pub fn new(output: Option<PathBuf>) -> Self {
        Self { output }
    }
}

#[async_trait::async_trait]
impl EmailSender for HtmlFileSender {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        match &self.output {
            Some(path) => {
                tokio::fs::write(path, message.html.as_bytes())
                    .await
                    .with_context(|| format!("failed to write report to {}", path.display()))?;
                tracing::info!(
                    path = %path.display(),
                    subject = %message.subject,
                    "dry run: report written instead of sent"
                );
            }
            None => {
                println!("{}", message.html);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_review_core::mail::Recipient;

    #[tokio::test]
    async fn writes_html_to_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.html");
        let sender = HtmlFileSender::new(Some(path.clone()));

        sender
            .send(EmailMessage {
                subject: "s".to_string(),
                plain_text: "p".to_string(),
                html: "<h2>raport</h2>".to_string(),
                sender: "from@example.com".to_string(),
                recipient: Recipient {
                    address: "to@example.com".to_string(),
                    display_name: "To".to_string(),
                },
            })
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "<h2>raport</h2>");
    }
}
