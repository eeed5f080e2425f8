use std::sync::{Arc, LazyLock};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::{self, BudgetRow};
use crate::extract::{collapse_text, UNKNOWN};
use crate::fetch::FetchClient;

pub const BUDGETS_ROOT: &str = "https://www.the-numbers.com/movie/budgets/all";
const PAGE_COUNT: usize = 58;
const PAGE_STEP: usize = 100;
const CONCURRENCY: usize = 8;

static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

#[derive(Debug, Clone)]
pub struct BudgetsConfig {
    pub root_url: String,
    pub page_count: usize,
}

impl Default for BudgetsConfig {
    fn default() -> Self {
        Self {
            root_url: BUDGETS_ROOT.to_string(),
            page_count: PAGE_COUNT,
        }
    }
}

pub struct BudgetStats {
    pub pages: usize,
    pub rows: usize,
    pub flagged: usize,
    pub failed_pages: usize,
}

/// One ranking page per fixed offset: /1, /101, /201, ...
fn page_urls(config: &BudgetsConfig) -> Vec<String> {
    (0..config.page_count)
        .map(|i| format!("{}/{}", config.root_url, i * PAGE_STEP + 1))
        .collect()
}

/// Fetch every ranking page concurrently and store its rows. The source
/// serves Latin-1, so bodies are decoded before parsing. A failed page is
/// logged and skipped; the rest of the batch continues.
pub async fn harvest_budgets(
    conn: &Connection,
    client: FetchClient,
    config: &BudgetsConfig,
) -> Result<BudgetStats> {
    let urls = page_urls(config);
    info!("Harvesting {} budget ranking pages", urls.len());

    let pb = ProgressBar::new(urls.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Option<Vec<BudgetRow>>>(CONCURRENCY * 2);

    for url in urls {
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let client = client.clone();

        tokio::spawn(async move {
            let _permit = sem.acquire().await.unwrap();
            let parsed = match client.fetch_bytes(&url).await {
                Ok(bytes) => {
                    let body = encoding_rs::mem::decode_latin1(&bytes);
                    Some(parse_rankings(&body, &url))
                }
                Err(e) => {
                    warn!("Budget page {} failed: {}", url, e);
                    None
                }
            };
            let _ = tx.send(parsed).await;
        });
    }

    drop(tx);

    let mut stats = BudgetStats {
        pages: 0,
        rows: 0,
        flagged: 0,
        failed_pages: 0,
    };
    while let Some(parsed) = rx.recv().await {
        match parsed {
            Some(rows) => {
                stats.pages += 1;
                stats.flagged += rows.iter().filter(|r| r.title_flagged).count();
                stats.rows += db::insert_budget_rows(conn, &rows)?;
            }
            None => stats.failed_pages += 1,
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Stored {} budget rows from {} pages ({} flagged titles, {} failed pages)",
        stats.rows, stats.pages, stats.flagged, stats.failed_pages
    );
    Ok(stats)
}

/// Every data row of the page's ranking table, cells sentinel-degraded.
/// The first row is the header; rows without cells are separators.
fn parse_rankings(body: &str, page_url: &str) -> Vec<BudgetRow> {
    let doc = Html::parse_document(body);
    let mut rows = Vec::new();
    for row in doc.select(&ROW_SEL).skip(1) {
        let cells: Vec<String> = row.select(&CELL_SEL).map(collapse_text).collect();
        if cells.is_empty() {
            continue;
        }
        let cell = |i: usize| match cells.get(i) {
            Some(c) if !c.is_empty() => c.clone(),
            _ => UNKNOWN.to_string(),
        };
        let (title, title_flagged) = recover_title(&cell(2));
        rows.push(BudgetRow {
            rank: cell(0),
            release_date: cell(1),
            title,
            production_budget: cell(3),
            domestic_gross: cell(4),
            worldwide_gross: cell(5),
            title_flagged,
            page_url: page_url.to_string(),
        });
    }
    rows
}

/// Undo the UTF-8-read-as-Latin-1 mangling some titles carry: re-encode the
/// chars as single bytes and strictly re-decode as UTF-8. Titles that do not
/// survive the round trip are kept verbatim and flagged for manual review.
fn recover_title(title: &str) -> (String, bool) {
    let bytes: Option<Vec<u8>> = title
        .chars()
        .map(|c| u8::try_from(c as u32).ok())
        .collect();
    match bytes {
        Some(bytes) => match String::from_utf8(bytes) {
            Ok(recovered) => (recovered, false),
            Err(_) => (title.to_string(), true),
        },
        // Chars beyond one byte mean the title was never mangled.
        None => (title.to_string(), false),
    }
}

// ── Tests ──
