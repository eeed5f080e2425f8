pub mod credits;
pub mod details;
pub mod figures;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::db::MovieRecord;

/// Fills every field the page would not yield.
pub const UNKNOWN: &str = "unknown";

static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static BOLD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("b").unwrap());

/// All text under an element, whitespace-collapsed.
pub(crate) fn collapse_text(el: ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Full-record extraction over one fetched page. Returns None only when the
/// document has neither anchors nor bold elements (an error page, not a
/// movie page); any recognizable document yields a complete record with
/// per-field degradation to [`UNKNOWN`].
pub fn extract_record(body: &str, url: &str) -> Option<MovieRecord> {
    let doc = Html::parse_document(body);
    if doc.select(&ANCHOR_SEL).next().is_none() && doc.select(&BOLD_SEL).next().is_none() {
        return None;
    }

    let d = details::extract_details(&doc);
    let [director_1, director_2] = fixed::<2>(credits::extract_role(&doc, "Director&", 2));
    let [writer_1, writer_2, writer_3] = fixed::<3>(credits::extract_role(&doc, "Writer&", 3));
    let [actor_1, actor_2, actor_3, actor_4, actor_5, actor_6] =
        fixed::<6>(credits::extract_role(&doc, "Actor&", 6));
    let [producer_1, producer_2, producer_3, producer_4, producer_5, producer_6] =
        fixed::<6>(credits::extract_role(&doc, "Producer&", 6));
    let [cinematographer] = fixed::<1>(credits::extract_role(&doc, "Cinematographer&", 1));
    let [composer_1, composer_2] = fixed::<2>(credits::extract_role(&doc, "Composer&", 2));

    Some(MovieRecord {
        url: url.to_string(),
        title: d.title,
        distributor: d.distributor,
        runtime: d.runtime,
        rating: d.rating,
        release_date: d.release_date,
        genres: d.genres,
        domestic_gross: figures::extract_figure(&doc, "Domestic"),
        foreign_gross: figures::extract_figure(&doc, "Foreign"),
        worldwide_gross: figures::extract_figure(&doc, "Worldwide"),
        adjusted_domestic_gross: d.adjusted_domestic_gross,
        production_budget: d.production_budget,
        director_1,
        director_2,
        writer_1,
        writer_2,
        writer_3,
        actor_1,
        actor_2,
        actor_3,
        actor_4,
        actor_5,
        actor_6,
        producer_1,
        producer_2,
        producer_3,
        producer_4,
        producer_5,
        producer_6,
        cinematographer,
        composer_1,
        composer_2,
    })
}

// extract_role already sized the vec to N; the fallback never fires on a
// matched call site.
fn fixed<const N: usize>(names: Vec<String>) -> [String; N] {
    names
        .try_into()
        .unwrap_or_else(|_| std::array::from_fn(|_| UNKNOWN.to_string()))
}

// ── Tests ──
