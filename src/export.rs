use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chrono::Local;
use rusqlite::Connection;

use crate::db::{self, MovieRecord};

/// Dump the movies table to `out` (or a dated default path) and return the
/// path written plus the record count. Only records are exported; failures
/// stay in the harvest log.
pub fn run(conn: &Connection, out: Option<PathBuf>, format: &str) -> Result<(PathBuf, usize)> {
    if format != "csv" && format != "json" {
        bail!("unsupported export format: {} (expected csv or json)", format);
    }
    let movies = db::fetch_all_movies(conn)?;
    let path = out.unwrap_or_else(|| default_path(format));
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    match format {
        "csv" => write_csv(&path, &movies)?,
        _ => write_json(&path, &movies)?,
    }
    Ok((path, movies.len()))
}

fn default_path(format: &str) -> PathBuf {
    PathBuf::from(format!(
        "data/movies-{}.{}",
        Local::now().format("%Y%m%d"),
        format
    ))
}

fn write_csv(path: &Path, movies: &[MovieRecord]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "{}", MovieRecord::COLUMNS.join(","))?;
    for rec in movies {
        let fields: Vec<String> = rec.values().iter().map(|v| escape_csv(v)).collect();
        writeln!(w, "{}", fields.join(","))?;
    }
    w.flush()?;
    Ok(())
}

fn write_json(path: &Path, movies: &[MovieRecord]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut w, movies)?;
    w.flush()?;
    Ok(())
}

fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn memdb() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    fn blank(title: &str) -> MovieRecord {
        let u = || "unknown".to_string();
        MovieRecord {
            url: "https://example.com/m".to_string(),
            title: title.to_string(),
            distributor: u(),
            runtime: u(),
            rating: u(),
            release_date: u(),
            genres: u(),
            domestic_gross: u(),
            foreign_gross: u(),
            worldwide_gross: u(),
            adjusted_domestic_gross: u(),
            production_budget: u(),
            director_1: u(),
            director_2: u(),
            writer_1: u(),
            writer_2: u(),
            writer_3: u(),
            actor_1: u(),
            actor_2: u(),
            actor_3: u(),
            actor_4: u(),
            actor_5: u(),
            actor_6: u(),
            producer_1: u(),
            producer_2: u(),
            producer_3: u(),
            producer_4: u(),
            producer_5: u(),
            producer_6: u(),
            cinematographer: u(),
            composer_1: u(),
            composer_2: u(),
        }
    }

    fn seed(conn: &Connection, titles: &[&str]) {
        let records: Vec<(String, MovieRecord)> = titles
            .iter()
            .enumerate()
            .map(|(i, t)| (format!("m{}", i), blank(t)))
            .collect();
        db::upsert_movies(conn, &records).unwrap();
    }

    #[test]
    fn escape_csv_cases() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn csv_export_quotes_embedded_commas() {
        let conn = memdb();
        seed(&conn, &["Plain Title", "The Good, the Bad and the Ugly"]);
        let out = std::env::temp_dir().join("mojo_export_csv_test.csv");

        let (path, count) = run(&conn, Some(out.clone()), "csv").unwrap();
        assert_eq!(count, 2);

        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next().unwrap(), MovieRecord::COLUMNS.join(","));
        assert_eq!(written.lines().count(), 3);
        assert!(written.contains("\"The Good, the Bad and the Ugly\""));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn json_export_round_trips() {
        let conn = memdb();
        seed(&conn, &["Blade Runner (1982)"]);
        let out = std::env::temp_dir().join("mojo_export_json_test.json");

        let (path, count) = run(&conn, Some(out.clone()), "json").unwrap();
        assert_eq!(count, 1);

        let written = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["title"], "Blade Runner (1982)");
        assert_eq!(parsed[0]["director_1"], "unknown");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unknown_format_rejected() {
        let conn = memdb();
        assert!(run(&conn, None, "xml").is_err());
    }
}
