use crate::domain::portfolio::Portfolio;
use crate::source::PortfolioSource;
use anyhow::Context;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct LocalFileSource {
    path: PathBuf,
}

impl LocalFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl PortfolioSource for LocalFileSource {
    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }

    async fn load(&self) -> anyhow::Result<Portfolio> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read portfolio file {}", self.path.display()))?;
        Portfolio::from_tsv(&text)
            .with_context(|| format!("failed to parse portfolio file {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn loads_tsv_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "symbol\tcompany\tquantity\nKO\tCoca-Cola\t25\nO\tRealty Income\t12\n").unwrap();

        let source = LocalFileSource::new(file.path());
        let portfolio = source.load().await.unwrap();
        assert_eq!(portfolio.len(), 2);
        assert_eq!(portfolio.symbols(), vec!["KO", "O"]);
        assert!(source.describe().starts_with("file://"));
    }

    #[tokio::test]
    async fn missing_file_is_an_error_naming_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.tsv");
        let err = LocalFileSource::new(&path).load().await.unwrap_err();
        assert!(err.to_string().contains("portfolio.tsv"));
    }
}
