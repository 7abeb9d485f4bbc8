//! HTML rendering of the model's review for the email body.
//!
//! Values coming from the model are interpolated verbatim: the output is an
//! HTML fragment consumed by a mail client, and the model output is trusted
//! to be displayable markup.

use crate::domain::report::{ReviewReport, DISPLAY_ORDER};
use serde_json::Value;

pub const INVALID_DATA_NOTICE: &str =
    "<p style='color:red'><b>⚠️ Nie udało się wygenerować raportu: nieprawidłowe dane.</b></p>";

const RECOMMENDATIONS_HEADER: &str = "<h2>📌 Rekomendacje na dziś</h2>";
const ANALYSIS_HEADER: &str = "<hr><h2>📊 Analiza spółek</h2>";

/// Renders parsed model output. Non-objects and empty objects produce only
/// [`INVALID_DATA_NOTICE`].
pub fn render_report(value: &Value) -> String {
    match ReviewReport::from_value(value) {
        Some(report) => render(&report),
        None => INVALID_DATA_NOTICE.to_string(),
    }
}

pub fn render(report: &ReviewReport) -> String {
    let mut html = vec![RECOMMENDATIONS_HEADER.to_string()];

    for category in DISPLAY_ORDER {
        let items = report.items(category);
        if items.is_empty() {
            continue;
        }
        html.push(format!(
            "<h3 style='color:{}'>{} {}</h3>",
            category.color(),
            category.icon(),
            category.label()
        ));
        html.push("<ul>".to_string());
        for rec in items {
            html.push(format!(
                "<li><b>{}</b> <i>({})</i> &mdash; {}</li>",
                rec.company, rec.symbol, rec.reason
            ));
        }
        html.push("</ul>".to_string());
    }

    html.push(ANALYSIS_HEADER.to_string());
    for stock in &report.analysis {
        html.push(format!(
            "<h3><b>{}</b> <i>({})</i></h3>",
            stock.company, stock.symbol
        ));
        html.push("<ul>".to_string());
        for point in &stock.highlights {
            html.push(format!("<li>{point}</li>"));
        }
        html.push("</ul>".to_string());
    }

    if let Some(notes) = &report.notes {
        html.push(format!(
            "<hr><p style='color:gray;font-size:small'>{notes}</p>"
        ));
    }

    html.join("\n")
}
