use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::fetch::FetchClient;

pub const SITE_ROOT: &str = "https://www.boxofficemojo.com";
pub const CATALOG_ROOT: &str = "https://www.boxofficemojo.com/movies/alphabetical.htm";
const CRAWL_DELAY_MS: u64 = 1000;

/// Appended once to every materialized target address.
pub const TARGET_PARAMS: &str = "&adjust_yr=2019&p=.htm";

// Href markers for the two anchor kinds on index pages.
const LETTER_MARKER: &str = "letter=";
const ITEM_MARKER: &str = "id=";

static MOVIE_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"id=([^&.]+)").unwrap());

static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static ROW_LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr a").unwrap());
static SUB_NAV_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.alpha-nav-holder").unwrap());

// Item ids the site serves with a mangled trailing byte; the catalog links
// them clean, so the fetch address needs the mangled form.
const ID_FIXUPS: [(&str, &str); 2] = [
    ("elizabeth", "elizabeth%A0"),
    ("simpleplan", "simpleplan%A0"),
];

/// One discovered movie page: fetch address plus the id parsed from it.
#[derive(Debug, Clone)]
pub struct CrawlTarget {
    pub url: String,
    pub movie_id: String,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub site_root: String,
    pub catalog_root: String,
    pub crawl_delay: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            site_root: SITE_ROOT.to_string(),
            catalog_root: CATALOG_ROOT.to_string(),
            crawl_delay: Duration::from_millis(CRAWL_DELAY_MS),
        }
    }
}

/// Walk the alphabetical index: root, letter pages, one level of numbered
/// sub-pages. Targets come back in discovery order, duplicates included.
/// A failed letter or sub-page contributes zero targets; a failed root
/// aborts the whole crawl.
pub async fn discover_targets(
    client: &FetchClient,
    config: &CatalogConfig,
) -> Result<Vec<CrawlTarget>> {
    tokio::time::sleep(config.crawl_delay).await;
    let root = client
        .fetch(&config.catalog_root)
        .await
        .context("catalog root fetch failed")?;
    let letters = letter_pages(&root, config);
    info!("Catalog root lists {} letter pages", letters.len());

    let mut targets = Vec::new();
    for letter_url in letters {
        tokio::time::sleep(config.crawl_delay).await;
        let body = match client.fetch(&letter_url).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Skipping letter page {}: {}", letter_url, e);
                continue;
            }
        };
        let (mut items, sub_pages) = page_items(&body, config);
        info!(
            "{}: {} items, {} sub-pages",
            letter_url,
            items.len(),
            sub_pages.len()
        );
        targets.append(&mut items);

        // Sub-pages are one level deep; their own nav is not followed.
        for sub_url in sub_pages {
            tokio::time::sleep(config.crawl_delay).await;
            let body = match client.fetch(&sub_url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Skipping sub-page {}: {}", sub_url, e);
                    continue;
                }
            };
            let (mut items, _) = page_items(&body, config);
            targets.append(&mut items);
        }
    }

    info!("Discovered {} targets", targets.len());
    Ok(targets)
}

/// Letter-index addresses from the root document, deduplicated by resolved
/// address in first-seen order (the nav repeats at top and bottom).
fn letter_pages(body: &str, config: &CatalogConfig) -> Vec<String> {
    let doc = Html::parse_document(body);
    let mut seen = HashSet::new();
    let mut pages = Vec::new();
    for anchor in doc.select(&ANCHOR_SEL) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !href.contains(LETTER_MARKER) {
            continue;
        }
        let url = resolve(&config.site_root, href);
        if seen.insert(url.clone()) {
            pages.push(url);
        }
    }
    pages
}

/// Item targets (row anchors carrying an item id) and sub-page addresses
/// (letter anchors inside the pagination nav) from one index page.
fn page_items(body: &str, config: &CatalogConfig) -> (Vec<CrawlTarget>, Vec<String>) {
    let doc = Html::parse_document(body);

    let items = doc
        .select(&ROW_LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| href.contains(ITEM_MARKER))
        .map(|href| materialize(&config.site_root, href))
        .collect();

    let sub_pages = doc
        .select(&SUB_NAV_SEL)
        .next()
        .map(|nav| {
            nav.select(&ANCHOR_SEL)
                .filter_map(|a| a.value().attr("href"))
                .filter(|href| href.contains(LETTER_MARKER))
                .map(|href| resolve(&config.site_root, href))
                .collect()
        })
        .unwrap_or_default();

    (items, sub_pages)
}

fn materialize(site_root: &str, href: &str) -> CrawlTarget {
    let movie_id = MOVIE_ID_RE
        .captures(href)
        .map(|c| c[1].to_string())
        .unwrap_or_default();
    let mut url = format!("{}{}", resolve(site_root, href), TARGET_PARAMS);
    for (id, replacement) in ID_FIXUPS {
        if movie_id == id {
            let fixed = url.replace(
                &format!("id={}.htm", id),
                &format!("id={}.htm", replacement),
            );
            warn!("Rewrote mis-encoded target {} -> {}; review manually", url, fixed);
            url = fixed;
        }
    }
    CrawlTarget { url, movie_id }
}

fn resolve(site_root: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", site_root, href)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchConfig;
    use wiremock::matchers::{path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn test_client() -> FetchClient {
        FetchClient::with_config(FetchConfig {
            timeout: Duration::from_secs(5),
            max_attempts: 2,
            base_backoff: Duration::from_millis(1),
        })
        .unwrap()
    }

    fn test_config(server: &MockServer) -> CatalogConfig {
        CatalogConfig {
            site_root: server.uri(),
            catalog_root: format!("{}/movies/alphabetical.htm", server.uri()),
            crawl_delay: Duration::from_millis(1),
        }
    }

    async fn mount_page(server: &MockServer, letter: &str, page: Option<&str>, body: String) {
        let mock = Mock::given(path("/movies/alphabetical.htm")).and(query_param("letter", letter));
        let mock = match page {
            Some(n) => mock.and(query_param("page", n)),
            None => mock.and(query_param_is_missing("page")),
        };
        mock.respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn mount_catalog(server: &MockServer) {
        Mock::given(path("/movies/alphabetical.htm"))
            .and(query_param_is_missing("letter"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("catalog_root")))
            .mount(server)
            .await;
        mount_page(server, "A", None, fixture("catalog_letter_a")).await;
        mount_page(server, "A", Some("2"), fixture("catalog_letter_a_p2")).await;
        mount_page(server, "B", None, fixture("catalog_letter_b")).await;
        mount_page(server, "B", Some("2"), fixture("catalog_letter_b_p2")).await;
    }

    #[tokio::test]
    async fn discovers_targets_through_sub_pages() {
        let server = MockServer::start().await;
        mount_catalog(&server).await;

        let targets = discover_targets(&test_client(), &test_config(&server))
            .await
            .unwrap();

        let ids: Vec<&str> = targets.iter().map(|t| t.movie_id.as_str()).collect();
        assert_eq!(ids, ["alpha1", "alpha2", "beta1", "beta2"]);
        for t in &targets {
            assert_eq!(t.url.matches(TARGET_PARAMS).count(), 1);
            assert!(t.url.starts_with(&server.uri()));
        }
    }

    #[tokio::test]
    async fn duplicate_items_across_pages_are_preserved() {
        let server = MockServer::start().await;
        Mock::given(path("/movies/alphabetical.htm"))
            .and(query_param_is_missing("letter"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<a href=\"/movies/alphabetical.htm?letter=S\">S</a>",
            ))
            .mount(&server)
            .await;
        // The same title is linked from the letter page and again from its
        // sub-page; both sightings survive in discovery order.
        mount_page(
            &server,
            "S",
            None,
            "<div class=\"alpha-nav-holder\">\
             <a href=\"/movies/alphabetical.htm?letter=S&amp;page=2\">2</a></div>\
             <table>\
             <tr><td><a href=\"/movies/?id=shared1.htm\">Shared One</a></td></tr>\
             <tr><td><a href=\"/movies/?id=solo1.htm\">Solo One</a></td></tr>\
             </table>"
                .to_string(),
        )
        .await;
        mount_page(
            &server,
            "S",
            Some("2"),
            "<table>\
             <tr><td><a href=\"/movies/?id=shared1.htm\">Shared One</a></td></tr>\
             </table>"
                .to_string(),
        )
        .await;

        let targets = discover_targets(&test_client(), &test_config(&server))
            .await
            .unwrap();

        let ids: Vec<&str> = targets.iter().map(|t| t.movie_id.as_str()).collect();
        assert_eq!(ids, ["shared1", "solo1", "shared1"]);
        assert_eq!(targets[0].url, targets[2].url);
    }

    #[tokio::test]
    async fn failed_letter_page_contributes_zero() {
        let server = MockServer::start().await;
        // Letter A is never mounted, so its fetch 404s.
        Mock::given(path("/movies/alphabetical.htm"))
            .and(query_param_is_missing("letter"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture("catalog_root")))
            .mount(&server)
            .await;
        mount_page(&server, "B", None, fixture("catalog_letter_b")).await;
        mount_page(&server, "B", Some("2"), fixture("catalog_letter_b_p2")).await;

        let targets = discover_targets(&test_client(), &test_config(&server))
            .await
            .unwrap();

        let ids: Vec<&str> = targets.iter().map(|t| t.movie_id.as_str()).collect();
        assert_eq!(ids, ["beta1", "beta2"]);
    }

    #[tokio::test]
    async fn root_failure_aborts_the_crawl() {
        let server = MockServer::start().await;
        // Nothing mounted: every request 404s.
        let result = discover_targets(&test_client(), &test_config(&server)).await;
        assert!(result.is_err());
    }

    #[test]
    fn known_bad_id_is_rewritten() {
        let t = materialize(SITE_ROOT, "/movies/?id=elizabeth.htm");
        assert!(t.url.contains("id=elizabeth%A0.htm"));
        assert_eq!(t.movie_id, "elizabeth");
    }

    #[test]
    fn fixup_requires_exact_id() {
        let t = materialize(SITE_ROOT, "/movies/?id=elizabethtown.htm");
        assert!(t.url.contains("id=elizabethtown.htm"));
        assert!(!t.url.contains("%A0"));
    }

    #[test]
    fn target_params_appended_once() {
        let t = materialize(SITE_ROOT, "/movies/?id=bladerunner.htm");
        assert_eq!(
            t.url,
            format!("{}/movies/?id=bladerunner.htm{}", SITE_ROOT, TARGET_PARAMS)
        );
    }
}
