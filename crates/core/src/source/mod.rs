pub mod blob;
pub mod credential;
pub mod local;

use crate::config::Settings;
use crate::domain::portfolio::Portfolio;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait PortfolioSource: Send + Sync {
    /// Human-readable location, used in logs.
    fn describe(&self) -> String;

    async fn load(&self) -> anyhow::Result<Portfolio>;
}

/// Picks the portfolio source for this process: a local file in development,
/// the storage blob otherwise.
pub fn source_from_settings(settings: &Settings) -> anyhow::Result<Box<dyn PortfolioSource>> {
    if settings.run_mode.is_development() {
        return Ok(Box::new(local::LocalFileSource::new(&settings.portfolio_path)));
    }

    let credential = credential::ManagedIdentityCredential::from_settings(settings)?;
    let source = blob::BlobSource::from_settings(settings, Arc::new(credential))?;
    Ok(Box::new(source))
}
