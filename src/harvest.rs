use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::info;

use crate::db::{self, MovieRecord, TargetRow};
use crate::extract;
use crate::fetch::{FetchClient, FetchError};

/// Why a target produced no record.
#[derive(Debug, Error)]
pub enum HarvestFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("page structure not recognized")]
    Unrecognizable,
}

#[derive(Debug)]
pub enum HarvestOutcome {
    Record(Box<MovieRecord>),
    Failed(HarvestFailure),
}

struct HarvestRow {
    target: TargetRow,
    outcome: HarvestOutcome,
    body: Option<String>,
    latency_ms: i64,
}

/// Harvest stats returned after completion.
pub struct HarvestStats {
    pub total: usize,
    pub records: usize,
    pub failures: usize,
}

fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(8)
}

/// Harvest targets concurrently, saving each outcome to DB as it arrives.
/// Every target yields exactly one outcome row, failures included.
pub async fn harvest_streaming(
    conn: &Connection,
    client: FetchClient,
    targets: Vec<TargetRow>,
) -> Result<HarvestStats> {
    let total = targets.len();
    let workers = worker_count();
    info!("Harvesting {} targets with {} workers", total, workers);

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let semaphore = Arc::new(Semaphore::new(workers));

    // Channel: workers send outcomes, main loop saves to DB
    let (tx, mut rx) = tokio::sync::mpsc::channel::<HarvestRow>(workers * 2);

    // Spawn all harvest tasks
    for target in targets {
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let client = client.clone();

        tokio::spawn(async move {
            let _permit = sem.acquire().await.unwrap();
            let row = harvest_one(&client, target).await;
            let _ = tx.send(row).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    // Prepare statements once, reuse for each row
    let mut insert_harvest = conn.prepare(db::INSERT_HARVEST_SQL)?;
    let mut upsert_movie = conn.prepare(db::UPSERT_MOVIE_SQL)?;
    let mut mark_visited = conn.prepare(db::MARK_VISITED_SQL)?;

    let mut records = 0usize;
    let mut failures = 0usize;

    while let Some(row) = rx.recv().await {
        match &row.outcome {
            HarvestOutcome::Record(_) => records += 1,
            HarvestOutcome::Failed(_) => failures += 1,
        }
        save_one(&mut insert_harvest, &mut upsert_movie, &mut mark_visited, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Harvested {} targets ({} records, {} failures)",
        total, records, failures
    );

    Ok(HarvestStats {
        total,
        records,
        failures,
    })
}

/// Fetch and extract one target. Never errors: fetch and structure
/// failures become tagged outcomes occupying the target's slot.
async fn harvest_one(client: &FetchClient, target: TargetRow) -> HarvestRow {
    let start = Instant::now();
    let (outcome, body) = match client.fetch(&target.url).await {
        Ok(body) => match extract::extract_record(&body, &target.url) {
            Some(rec) => (HarvestOutcome::Record(Box::new(rec)), Some(body)),
            None => (HarvestOutcome::Failed(HarvestFailure::Unrecognizable), Some(body)),
        },
        Err(e) => (HarvestOutcome::Failed(e.into()), None),
    };
    HarvestRow {
        target,
        outcome,
        body,
        latency_ms: start.elapsed().as_millis() as i64,
    }
}

/// Save a single outcome to DB using pre-prepared statements.
fn save_one(
    insert_harvest: &mut rusqlite::Statement,
    upsert_movie: &mut rusqlite::Statement,
    mark_visited: &mut rusqlite::Statement,
    row: &HarvestRow,
) -> Result<()> {
    let (kind, error) = match &row.outcome {
        HarvestOutcome::Record(_) => ("record", None),
        HarvestOutcome::Failed(f) => ("failed", Some(f.to_string())),
    };
    insert_harvest.execute(rusqlite::params![
        row.target.id,
        row.target.url,
        row.target.movie_id,
        kind,
        error,
        row.body,
        row.latency_ms,
    ])?;
    if let HarvestOutcome::Record(rec) = &row.outcome {
        db::upsert_movie(upsert_movie, &row.target.movie_id, rec)?;
    }
    mark_visited.execute(rusqlite::params![row.target.id])?;
    Ok(())
}

// ── Tests ──
