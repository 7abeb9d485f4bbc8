use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "buy")]
    Buy,
    #[serde(rename = "buy-new")]
    BuyNew,
    #[serde(rename = "sell")]
    Sell,
    #[serde(rename = "hold")]
    Hold,
}

/// Order in which categories appear in the rendered report.
pub const DISPLAY_ORDER: [Category; 4] = [
    Category::Buy,
    Category::BuyNew,
    Category::Sell,
    Category::Hold,
];

impl Category {
    pub fn key(self) -> &'static str {
        match self {
            Category::Buy => "buy",
            Category::BuyNew => "buy-new",
            Category::Sell => "sell",
            Category::Hold => "hold",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        DISPLAY_ORDER.into_iter().find(|c| c.key() == key)
    }

    pub fn icon(self) -> &'static str {
        match self {
            Category::Buy | Category::BuyNew => "✅",
            Category::Sell => "❌",
            Category::Hold => "🕒",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Buy => "Dokupienie",
            Category::BuyNew => "Kupno",
            Category::Sell => "Sprzedaż",
            Category::Hold => "Przetrzymanie",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Category::Buy | Category::BuyNew => "green",
            Category::Sell => "red",
            Category::Hold => "gray",
        }
    }
}

/// Fields are read leniently: `null` becomes `""` and numbers or booleans
/// keep their JSON text, so one odd value never drops the entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default, deserialize_with = "lenient_text")]
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub company: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAnalysis {
    #[serde(default, deserialize_with = "lenient_text")]
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub company: String,
    #[serde(default, deserialize_with = "lenient_text_list")]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewReport {
    pub recommendations: BTreeMap<Category, Vec<Recommendation>>,
    pub analysis: Vec<StockAnalysis>,
    pub notes: Option<String>,
}

impl ReviewReport {
    /// Lenient conversion of model output. Returns `None` for anything that is
    /// not a non-empty JSON object; malformed entries inside are skipped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object().filter(|o| !o.is_empty())?;

        let mut recommendations = BTreeMap::new();
        if let Some(recs) = obj.get("recommendations").and_then(Value::as_object) {
            for (key, items) in recs {
                let Some(category) = Category::from_key(key) else {
                    tracing::warn!(category = %key, "ignoring unknown recommendation category");
                    continue;
                };
                recommendations.insert(category, entries::<Recommendation>(items, key));
            }
        }

        let analysis = obj
            .get("analysis")
            .map(|v| entries::<StockAnalysis>(v, "analysis"))
            .unwrap_or_default();

        let notes = obj
            .get("notes")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Some(Self {
            recommendations,
            analysis,
            notes,
        })
    }

    pub fn items(&self, category: Category) -> &[Recommendation] {
        self.recommendations
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn entries<T: serde::de::DeserializeOwned>(value: &Value, section: &str) -> Vec<T> {
    let Some(list) = value.as_array() else {
        tracing::warn!(section, "expected a list in model output");
        return Vec::new();
    };

    list.iter()
        .filter_map(|item| match serde_json::from_value::<T>(item.clone()) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                tracing::warn!(section, error = %err, "skipping malformed entry");
                None
            }
        })
        .collect()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(value_text(&Value::deserialize(deserializer)?))
}

/// A single value is treated as a one-item list; `null` items are dropped.
fn lenient_text_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(value_text)
            .collect(),
        other => vec![value_text(&other)],
    })
}
