use chrono::NaiveDate;

/// JSON keys the model is asked to emit. `domain::report` parses the same names.
pub const SCHEMA_KEYS: [&str; 10] = [
    "recommendations",
    "buy",
    "buy-new",
    "sell",
    "hold",
    "analysis",
    "symbol",
    "company",
    "reason",
    "highlights",
];

const INSTRUCTIONS: &str = "\
Na podstawie poniższego portfela inwestycyjnego wygeneruj analizę w postaci poprawnego obiektu JSON.
Nie dodawaj żadnych opisów ani komentarzy — tylko czysty JSON.

Podaj rekomendacje min 10 spółek, które są w portfelu + 5 nowych.
Rekomendacje kupna podziel na te które już są w portfelu (buy) i nowe (buy-new).
Interesują mnie spółki z rynku amerykańskiego dostępne w XTB generujące wysoką dywidendę albo duży wzrost w ciągu max 3 miesięcy.

W sekcji analiza podaj informacje dla wszystkich posiadanych spółek.
Komentarze dla spółek powinny być krótkie i zwięzłe, nie dłuższe niż 1 zdanie po polsku.

Struktura JSON:

{
  \"recommendations\": {
    \"buy\": [ { \"symbol\": \"...\", \"company\": \"...\", \"reason\": \"...\" } ],
    \"sell\": [ { \"symbol\": \"...\", \"company\": \"...\", \"reason\": \"...\" } ],
    \"hold\": [ { \"symbol\": \"...\", \"company\": \"...\", \"reason\": \"...\" } ],
    \"buy-new\": [ { \"symbol\": \"...\", \"company\": \"...\", \"reason\": \"...\" } ]
  },
  \"analysis\": [
    {
      \"symbol\": \"...\",
      \"company\": \"...\",
      \"highlights\": [ \"...\", \"...\" ]
    }
  ],
  \"notes\": \"Dodatkowe uwagi podsumowujące analizę, np. ogólny sentyment lub alerty.\"
}

Portfel wejściowy (TSV):
";

/// Builds the daily review prompt for `date` over the TSV-serialized portfolio.
///
/// The whole text is HTML-escaped before it leaves the process; the model
/// reads the entities as the characters they stand for.
pub fn build_prompt(date: NaiveDate, portfolio_tsv: &str) -> String {
    let raw = format!(
        "Dziś jest {}.\n{INSTRUCTIONS}{portfolio_tsv}",
        date.format("%Y-%m-%d")
    );
    escape_html(&raw)
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}
