use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::{collapse_text, UNKNOWN};

static BOX_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.mp_box_content").unwrap());
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CURRENCY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$[0-9,]+").unwrap());

/// First currency token in the first summary-box row whose text contains
/// `keyword` (case-insensitive). Only that row is consulted; a keyword row
/// without a currency token degrades to the sentinel.
pub fn extract_figure(doc: &Html, keyword: &str) -> String {
    let Some(summary) = doc.select(&BOX_SEL).next() else {
        return UNKNOWN.to_string();
    };
    let needle = keyword.to_lowercase();
    let row = summary
        .select(&ROW_SEL)
        .map(collapse_text)
        .find(|text| text.to_lowercase().contains(&needle));
    match row {
        Some(text) => CURRENCY_RE
            .find(&text)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        None => UNKNOWN.to_string(),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(rows: &str) -> Html {
        Html::parse_document(&format!(
            "<html><body><div class=\"mp_box_content\"><table>{rows}</table></div></body></html>"
        ))
    }

    #[test]
    fn first_currency_in_keyword_row() {
        let d = summary("<tr><td>Domestic: <b>$12,345,678</b> (opening $1,000)</td></tr>");
        assert_eq!(extract_figure(&d, "Domestic"), "$12,345,678");
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let d = summary("<tr><td>DOMESTIC TOTAL: <b>$5,000</b></td></tr>");
        assert_eq!(extract_figure(&d, "Domestic"), "$5,000");
    }

    #[test]
    fn first_matching_row_wins_even_without_currency() {
        let d = summary(
            "<tr><td>Foreign summary pending</td></tr>\
             <tr><td>Foreign: <b>$9,999</b></td></tr>",
        );
        assert_eq!(extract_figure(&d, "Foreign"), UNKNOWN);
    }

    #[test]
    fn missing_summary_box() {
        let d = Html::parse_document("<html><body><table><tr><td>Domestic: $1</td></tr></table></body></html>");
        assert_eq!(extract_figure(&d, "Domestic"), UNKNOWN);
    }

    #[test]
    fn missing_keyword_row() {
        let d = summary("<tr><td>Worldwide: <b>$1,000</b></td></tr>");
        assert_eq!(extract_figure(&d, "Foreign"), UNKNOWN);
    }
}
