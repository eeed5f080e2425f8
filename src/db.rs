use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

const DB_PATH: &str = "data/mojo.sqlite";

pub fn connect() -> Result<Connection> {
    std::fs::create_dir_all("data")?;
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS targets (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            movie_id   TEXT NOT NULL,
            visited    BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_targets_visited ON targets(visited);

        CREATE TABLE IF NOT EXISTS harvests (
            id           INTEGER PRIMARY KEY,
            target_id    INTEGER NOT NULL REFERENCES targets(id),
            url          TEXT NOT NULL,
            movie_id     TEXT NOT NULL,
            outcome      TEXT NOT NULL CHECK(outcome IN ('record','failed')),
            error        TEXT,
            body         TEXT,
            latency_ms   INTEGER,
            harvested_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_harvests_movie ON harvests(movie_id);

        -- Raw string fields only; normalization happens downstream.
        CREATE TABLE IF NOT EXISTS movies (
            movie_id                TEXT PRIMARY KEY,
            url                     TEXT NOT NULL,
            title                   TEXT NOT NULL,
            distributor             TEXT NOT NULL,
            runtime                 TEXT NOT NULL,
            rating                  TEXT NOT NULL,
            release_date            TEXT NOT NULL,
            genres                  TEXT NOT NULL,
            domestic_gross          TEXT NOT NULL,
            foreign_gross           TEXT NOT NULL,
            worldwide_gross         TEXT NOT NULL,
            adjusted_domestic_gross TEXT NOT NULL,
            production_budget       TEXT NOT NULL,
            director_1              TEXT NOT NULL,
            director_2              TEXT NOT NULL,
            writer_1                TEXT NOT NULL,
            writer_2                TEXT NOT NULL,
            writer_3                TEXT NOT NULL,
            actor_1                 TEXT NOT NULL,
            actor_2                 TEXT NOT NULL,
            actor_3                 TEXT NOT NULL,
            actor_4                 TEXT NOT NULL,
            actor_5                 TEXT NOT NULL,
            actor_6                 TEXT NOT NULL,
            producer_1              TEXT NOT NULL,
            producer_2              TEXT NOT NULL,
            producer_3              TEXT NOT NULL,
            producer_4              TEXT NOT NULL,
            producer_5              TEXT NOT NULL,
            producer_6              TEXT NOT NULL,
            cinematographer         TEXT NOT NULL,
            composer_1              TEXT NOT NULL,
            composer_2              TEXT NOT NULL,
            harvested_at            TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS budget_rankings (
            id                INTEGER PRIMARY KEY,
            rank              TEXT NOT NULL,
            release_date      TEXT NOT NULL,
            title             TEXT NOT NULL,
            production_budget TEXT NOT NULL,
            domestic_gross    TEXT NOT NULL,
            worldwide_gross   TEXT NOT NULL,
            title_flagged     BOOLEAN NOT NULL DEFAULT 0,
            page_url          TEXT NOT NULL,
            scraped_at        TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_budget_identity
            ON budget_rankings(page_url, rank, title);
        ",
    )?;
    Ok(())
}

// ── Crawling ──

pub fn insert_targets(conn: &Connection, targets: &[(String, String)]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt =
            tx.prepare("INSERT OR IGNORE INTO targets (url, movie_id) VALUES (?1, ?2)")?;
        for (url, movie_id) in targets {
            count += stmt.execute(rusqlite::params![url, movie_id])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

#[derive(Debug, Clone)]
pub struct TargetRow {
    pub id: i64,
    pub url: String,
    pub movie_id: String,
}

pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<TargetRow>> {
    let sql = match limit {
        Some(n) => format!(
            "SELECT id, url, movie_id FROM targets WHERE visited = 0 ORDER BY id LIMIT {}",
            n
        ),
        None => "SELECT id, url, movie_id FROM targets WHERE visited = 0 ORDER BY id".to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(TargetRow {
                id: row.get(0)?,
                url: row.get(1)?,
                movie_id: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Harvesting ──

pub const INSERT_HARVEST_SQL: &str =
    "INSERT INTO harvests (target_id, url, movie_id, outcome, error, body, latency_ms)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

pub const UPSERT_MOVIE_SQL: &str = "INSERT OR REPLACE INTO movies
     (movie_id, url, title, distributor, runtime, rating, release_date, genres,
      domestic_gross, foreign_gross, worldwide_gross, adjusted_domestic_gross,
      production_budget, director_1, director_2, writer_1, writer_2, writer_3,
      actor_1, actor_2, actor_3, actor_4, actor_5, actor_6,
      producer_1, producer_2, producer_3, producer_4, producer_5, producer_6,
      cinematographer, composer_1, composer_2)
     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,
             ?19,?20,?21,?22,?23,?24,?25,?26,?27,?28,?29,?30,?31,?32,?33)";

pub const MARK_VISITED_SQL: &str =
    "UPDATE targets SET visited = 1, visited_at = datetime('now') WHERE id = ?1";

/// One movie's raw harvested fields. Every column is a string straight off
/// the page; "unknown" fills anything the page would not yield.
#[derive(Debug, Clone, Serialize)]
pub struct MovieRecord {
    pub url: String,
    pub title: String,
    pub distributor: String,
    pub runtime: String,
    pub rating: String,
    pub release_date: String,
    pub genres: String,
    pub domestic_gross: String,
    pub foreign_gross: String,
    pub worldwide_gross: String,
    pub adjusted_domestic_gross: String,
    pub production_budget: String,
    pub director_1: String,
    pub director_2: String,
    pub writer_1: String,
    pub writer_2: String,
    pub writer_3: String,
    pub actor_1: String,
    pub actor_2: String,
    pub actor_3: String,
    pub actor_4: String,
    pub actor_5: String,
    pub actor_6: String,
    pub producer_1: String,
    pub producer_2: String,
    pub producer_3: String,
    pub producer_4: String,
    pub producer_5: String,
    pub producer_6: String,
    pub cinematographer: String,
    pub composer_1: String,
    pub composer_2: String,
}

impl MovieRecord {
    pub const COLUMNS: [&'static str; 32] = [
        "url",
        "title",
        "distributor",
        "runtime",
        "rating",
        "release_date",
        "genres",
        "domestic_gross",
        "foreign_gross",
        "worldwide_gross",
        "adjusted_domestic_gross",
        "production_budget",
        "director_1",
        "director_2",
        "writer_1",
        "writer_2",
        "writer_3",
        "actor_1",
        "actor_2",
        "actor_3",
        "actor_4",
        "actor_5",
        "actor_6",
        "producer_1",
        "producer_2",
        "producer_3",
        "producer_4",
        "producer_5",
        "producer_6",
        "cinematographer",
        "composer_1",
        "composer_2",
    ];

    pub fn values(&self) -> [&str; 32] {
        [
            &self.url,
            &self.title,
            &self.distributor,
            &self.runtime,
            &self.rating,
            &self.release_date,
            &self.genres,
            &self.domestic_gross,
            &self.foreign_gross,
            &self.worldwide_gross,
            &self.adjusted_domestic_gross,
            &self.production_budget,
            &self.director_1,
            &self.director_2,
            &self.writer_1,
            &self.writer_2,
            &self.writer_3,
            &self.actor_1,
            &self.actor_2,
            &self.actor_3,
            &self.actor_4,
            &self.actor_5,
            &self.actor_6,
            &self.producer_1,
            &self.producer_2,
            &self.producer_3,
            &self.producer_4,
            &self.producer_5,
            &self.producer_6,
            &self.cinematographer,
            &self.composer_1,
            &self.composer_2,
        ]
    }
}

pub fn upsert_movie(
    stmt: &mut rusqlite::Statement,
    movie_id: &str,
    rec: &MovieRecord,
) -> Result<()> {
    stmt.execute(rusqlite::params![
        movie_id,
        rec.url,
        rec.title,
        rec.distributor,
        rec.runtime,
        rec.rating,
        rec.release_date,
        rec.genres,
        rec.domestic_gross,
        rec.foreign_gross,
        rec.worldwide_gross,
        rec.adjusted_domestic_gross,
        rec.production_budget,
        rec.director_1,
        rec.director_2,
        rec.writer_1,
        rec.writer_2,
        rec.writer_3,
        rec.actor_1,
        rec.actor_2,
        rec.actor_3,
        rec.actor_4,
        rec.actor_5,
        rec.actor_6,
        rec.producer_1,
        rec.producer_2,
        rec.producer_3,
        rec.producer_4,
        rec.producer_5,
        rec.producer_6,
        rec.cinematographer,
        rec.composer_1,
        rec.composer_2,
    ])?;
    Ok(())
}

pub fn upsert_movies(conn: &Connection, records: &[(String, MovieRecord)]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(UPSERT_MOVIE_SQL)?;
        for (movie_id, rec) in records {
            upsert_movie(&mut stmt, movie_id, rec)?;
            count += 1;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Re-extraction ──

pub struct StoredPage {
    pub movie_id: String,
    pub url: String,
    pub body: String,
}

/// Latest stored body per movie. By default only movies without a record
/// yet; `all` replays every stored page.
pub fn fetch_stored_pages(
    conn: &Connection,
    limit: Option<usize>,
    all: bool,
) -> Result<Vec<StoredPage>> {
    let sql = format!(
        "SELECT h.movie_id, h.url, h.body
         FROM harvests h
         WHERE h.body IS NOT NULL
           AND h.id = (SELECT MAX(h2.id) FROM harvests h2
                       WHERE h2.movie_id = h.movie_id AND h2.body IS NOT NULL){}
         ORDER BY h.id{}",
        if all {
            ""
        } else {
            "
           AND NOT EXISTS (SELECT 1 FROM movies m WHERE m.movie_id = h.movie_id)"
        },
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredPage {
                movie_id: row.get(0)?,
                url: row.get(1)?,
                body: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Budget rankings ──

pub struct BudgetRow {
    pub rank: String,
    pub release_date: String,
    pub title: String,
    pub production_budget: String,
    pub domestic_gross: String,
    pub worldwide_gross: String,
    pub title_flagged: bool,
    pub page_url: String,
}

pub fn insert_budget_rows(conn: &Connection, rows: &[BudgetRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO budget_rankings
             (rank, release_date, title, production_budget, domestic_gross,
              worldwide_gross, title_flagged, page_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for r in rows {
            count += stmt.execute(rusqlite::params![
                r.rank,
                r.release_date,
                r.title,
                r.production_budget,
                r.domestic_gross,
                r.worldwide_gross,
                r.title_flagged,
                r.page_url,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Export ──

pub fn fetch_all_movies(conn: &Connection) -> Result<Vec<MovieRecord>> {
    let mut stmt = conn.prepare(
        "SELECT url, title, distributor, runtime, rating, release_date, genres,
                domestic_gross, foreign_gross, worldwide_gross,
                adjusted_domestic_gross, production_budget,
                director_1, director_2, writer_1, writer_2, writer_3,
                actor_1, actor_2, actor_3, actor_4, actor_5, actor_6,
                producer_1, producer_2, producer_3, producer_4, producer_5,
                producer_6, cinematographer, composer_1, composer_2
         FROM movies ORDER BY movie_id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(MovieRecord {
                url: row.get(0)?,
                title: row.get(1)?,
                distributor: row.get(2)?,
                runtime: row.get(3)?,
                rating: row.get(4)?,
                release_date: row.get(5)?,
                genres: row.get(6)?,
                domestic_gross: row.get(7)?,
                foreign_gross: row.get(8)?,
                worldwide_gross: row.get(9)?,
                adjusted_domestic_gross: row.get(10)?,
                production_budget: row.get(11)?,
                director_1: row.get(12)?,
                director_2: row.get(13)?,
                writer_1: row.get(14)?,
                writer_2: row.get(15)?,
                writer_3: row.get(16)?,
                actor_1: row.get(17)?,
                actor_2: row.get(18)?,
                actor_3: row.get(19)?,
                actor_4: row.get(20)?,
                actor_5: row.get(21)?,
                actor_6: row.get(22)?,
                producer_1: row.get(23)?,
                producer_2: row.get(24)?,
                producer_3: row.get(25)?,
                producer_4: row.get(26)?,
                producer_5: row.get(27)?,
                producer_6: row.get(28)?,
                cinematographer: row.get(29)?,
                composer_1: row.get(30)?,
                composer_2: row.get(31)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub targets: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub harvests: usize,
    pub records: usize,
    pub failures: usize,
    pub budget_rows: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let targets: usize = conn.query_row("SELECT COUNT(*) FROM targets", [], |r| r.get(0))?;
    let visited: usize =
        conn.query_row("SELECT COUNT(*) FROM targets WHERE visited = 1", [], |r| {
            r.get(0)
        })?;
    let harvests: usize = conn.query_row("SELECT COUNT(*) FROM harvests", [], |r| r.get(0))?;
    let records: usize = conn.query_row("SELECT COUNT(*) FROM movies", [], |r| r.get(0))?;
    let failures: usize = conn.query_row(
        "SELECT COUNT(*) FROM harvests WHERE outcome = 'failed'",
        [],
        |r| r.get(0),
    )?;
    let budget_rows: usize =
        conn.query_row("SELECT COUNT(*) FROM budget_rankings", [], |r| r.get(0))?;
    Ok(Stats {
        targets,
        visited,
        unvisited: targets - visited,
        harvests,
        records,
        failures,
        budget_rows,
    })
}
