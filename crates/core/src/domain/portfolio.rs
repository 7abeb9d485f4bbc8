use anyhow::Context;
use std::collections::BTreeMap;

/// One portfolio line, keyed by header column.
pub type PortfolioRow = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Portfolio {
    pub columns: Vec<String>,
    pub rows: Vec<PortfolioRow>,
}

impl Portfolio {
    /// Parses tab-separated text whose first non-blank record is the header.
    /// Quoted cells may contain tabs; short rows are padded with `""` and
    /// extra cells are dropped.
    pub fn from_tsv(text: &str) -> anyhow::Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut records = reader
            .records()
            .filter(|record| !matches!(record, Ok(r) if is_blank(r)));

        let header = match records.next() {
            Some(header) => header.context("failed to read portfolio header")?,
            None => return Ok(Self::default()),
        };
        let columns: Vec<String> = header
            .iter()
            .map(|c| c.trim().trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for (index, record) in records.enumerate() {
            let record =
                record.with_context(|| format!("malformed portfolio row {}", index + 1))?;
            let row = columns
                .iter()
                .enumerate()
                .map(|(i, col)| (col.clone(), record.get(i).unwrap_or("").trim().to_string()))
                .collect::<PortfolioRow>();
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    /// Serializes back to TSV in header order. An empty portfolio yields `""`.
    pub fn to_tsv(&self) -> String {
        if self.columns.is_empty() || self.rows.is_empty() {
            return String::new();
        }

        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        lines.push(self.columns.join("\t"));
        for row in &self.rows {
            let cells: Vec<&str> = self
                .columns
                .iter()
                .map(|col| row.get(col).map(String::as_str).unwrap_or(""))
                .collect();
            lines.push(cells.join("\t"));
        }
        lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn symbols(&self) -> Vec<&str> {
        let Some(column) = self
            .columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case("symbol"))
        else {
            return Vec::new();
        };

        self.rows
            .iter()
            .filter_map(|row| row.get(column).map(String::as_str))
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn is_blank(record: &csv::StringRecord) -> bool {
    record.iter().all(|cell| cell.trim().is_empty())
}
