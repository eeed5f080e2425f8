mod budgets;
mod catalog;
mod db;
mod export;
mod extract;
mod fetch;
mod harvest;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mojo_scraper", about = "Box office catalog harvester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the alphabetical index and populate the target queue
    Crawl,
    /// Harvest unvisited targets into movie records
    Harvest {
        /// Max targets to harvest (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Crawl (if the queue is empty) then harvest in one pipeline
    Run {
        /// Max targets to harvest
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Re-extract records from stored page bodies without refetching
    Process {
        /// Max stored pages to process (default: all without a record)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Re-process every stored page, not just recordless ones
        #[arg(long)]
        all: bool,
    },
    /// Harvest the production budget ranking pages
    Budgets,
    /// Show queue and harvest statistics
    Stats,
    /// Export movie records to CSV or JSON
    Export {
        /// Output path (default: data/movies-<date>.<format>)
        #[arg(long)]
        out: Option<PathBuf>,
        /// csv or json
        #[arg(long, default_value = "csv")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Crawl => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let client = fetch::FetchClient::new()?;
            let targets = catalog::discover_targets(&client, &catalog::CatalogConfig::default()).await?;
            let rows: Vec<(String, String)> = targets
                .into_iter()
                .map(|t| (t.url, t.movie_id))
                .collect();
            let inserted = db::insert_targets(&conn, &rows)?;
            println!("Queued {} new targets ({} discovered)", inserted, rows.len());
            Ok(())
        }
        Commands::Harvest { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let targets = db::fetch_unvisited(&conn, limit)?;
            if targets.is_empty() {
                println!("No unvisited targets. Run 'crawl' first or all targets are harvested.");
                return Ok(());
            }
            println!("Harvesting {} targets (streaming to DB)...", targets.len());
            let client = fetch::FetchClient::new()?;
            let stats = harvest::harvest_streaming(&conn, client, targets).await?;
            println!(
                "Done: {} harvested ({} records, {} failures).",
                stats.total, stats.records, stats.failures
            );
            Ok(())
        }
        Commands::Run { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let client = fetch::FetchClient::new()?;

            // Phase 1: Crawl, unless a previous crawl already filled the queue
            let mut targets = db::fetch_unvisited(&conn, limit)?;
            if targets.is_empty() {
                let t_crawl = Instant::now();
                println!("Queue empty, crawling the catalog first...");
                let discovered =
                    catalog::discover_targets(&client, &catalog::CatalogConfig::default()).await?;
                let rows: Vec<(String, String)> = discovered
                    .into_iter()
                    .map(|t| (t.url, t.movie_id))
                    .collect();
                let inserted = db::insert_targets(&conn, &rows)?;
                println!(
                    "Queued {} new targets in {:.1}s",
                    inserted,
                    t_crawl.elapsed().as_secs_f64()
                );
                targets = db::fetch_unvisited(&conn, limit)?;
            }
            if targets.is_empty() {
                println!("Nothing to harvest.");
                return Ok(());
            }

            // Phase 2: Harvest
            let t_harvest = Instant::now();
            println!("Pipeline: harvesting {} targets (streaming to DB)...", targets.len());
            let stats = harvest::harvest_streaming(&conn, client, targets).await?;
            println!(
                "Harvested {} targets ({} records, {} failures) in {:.1}s",
                stats.total,
                stats.records,
                stats.failures,
                t_harvest.elapsed().as_secs_f64()
            );
            Ok(())
        }
        Commands::Process { limit, all } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let pages = db::fetch_stored_pages(&conn, limit, all)?;
            if pages.is_empty() {
                println!("No stored pages to process. Run 'harvest' first.");
                return Ok(());
            }
            println!("Processing {} stored pages...", pages.len());
            let counts = process_pages(&conn, &pages)?;
            counts.print();
            Ok(())
        }
        Commands::Budgets => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let client = fetch::FetchClient::new()?;
            let stats =
                budgets::harvest_budgets(&conn, client, &budgets::BudgetsConfig::default()).await?;
            println!(
                "Stored {} budget rows from {} pages ({} flagged, {} failed pages).",
                stats.rows, stats.pages, stats.flagged, stats.failed_pages
            );
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Targets:     {}", s.targets);
            println!("Visited:     {}", s.visited);
            println!("Unvisited:   {}", s.unvisited);
            println!("Harvests:    {}", s.harvests);
            println!("Records:     {}", s.records);
            println!("Failures:    {}", s.failures);
            println!("Budget rows: {}", s.budget_rows);
            Ok(())
        }
        Commands::Export { out, format } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let (path, count) = export::run(&conn, out, &format)?;
            println!("Exported {} records to {}", count, path.display());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

struct ProcessCounts {
    records: usize,
    unrecognized: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Saved {} records ({} unrecognizable pages).",
            self.records, self.unrecognized
        );
    }
}

fn process_pages(
    conn: &rusqlite::Connection,
    pages: &[db::StoredPage],
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts {
        records: 0,
        unrecognized: 0,
    };

    for chunk in pages.chunks(500) {
        let results: Vec<(String, Option<db::MovieRecord>)> = chunk
            .par_iter()
            .map(|page| {
                (
                    page.movie_id.clone(),
                    extract::extract_record(&page.body, &page.url),
                )
            })
            .collect();

        let mut records = Vec::new();
        for (movie_id, rec) in results {
            match rec {
                Some(rec) => records.push((movie_id, rec)),
                None => counts.unrecognized += 1,
            }
        }

        counts.records += db::upsert_movies(conn, &records)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
