use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::{collapse_text, UNKNOWN};

static BOLD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("b").unwrap());

const TITLE_SLOT: usize = 1;

/// Detail fields read from the page's ordered `<b>` slot sequence.
pub struct Details {
    pub title: String,
    pub adjusted_domestic_gross: String,
    pub distributor: String,
    pub release_date: String,
    pub genres: String,
    pub runtime: String,
    pub rating: String,
    pub production_budget: String,
}

/// How many bold gross figures precede the detail slots. One or two extra
/// `$`-bearing slots after the title shift everything downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeadingGrosses {
    Neither,
    One,
    Both,
}

struct SlotTable {
    distributor: usize,
    release_date: usize,
    genres: usize,
    runtime: usize,
    rating: usize,
    production_budget: usize,
}

impl LeadingGrosses {
    fn classify(slot_2: bool, slot_3: bool) -> Self {
        match (slot_2, slot_3) {
            (false, false) => LeadingGrosses::Neither,
            (true, true) => LeadingGrosses::Both,
            (true, false) | (false, true) => LeadingGrosses::One,
        }
    }

    fn slots(self) -> SlotTable {
        match self {
            LeadingGrosses::Neither => SlotTable {
                distributor: 2,
                release_date: 3,
                genres: 4,
                runtime: 5,
                rating: 6,
                production_budget: 7,
            },
            LeadingGrosses::One => SlotTable {
                distributor: 3,
                release_date: 4,
                genres: 5,
                runtime: 6,
                rating: 7,
                production_budget: 8,
            },
            LeadingGrosses::Both => SlotTable {
                distributor: 4,
                release_date: 5,
                genres: 6,
                runtime: 7,
                rating: 8,
                production_budget: 9,
            },
        }
    }
}

pub fn extract_details(doc: &Html) -> Details {
    let texts: Vec<String> = doc.select(&BOLD_SEL).map(collapse_text).collect();
    let has_dollar = |i: usize| texts.get(i).is_some_and(|t| t.contains('$'));
    let slot = |i: usize| match texts.get(i) {
        Some(t) if !t.is_empty() => t.clone(),
        _ => UNKNOWN.to_string(),
    };

    let table = LeadingGrosses::classify(has_dollar(2), has_dollar(3)).slots();
    Details {
        title: slot(TITLE_SLOT),
        adjusted_domestic_gross: if has_dollar(2) {
            slot(2)
        } else {
            UNKNOWN.to_string()
        },
        distributor: slot(table.distributor),
        release_date: slot(table.release_date),
        genres: slot(table.genres),
        runtime: slot(table.runtime),
        rating: slot(table.rating),
        production_budget: slot(table.production_budget),
    }
}

// ── Tests ──
