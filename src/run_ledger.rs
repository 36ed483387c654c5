use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::ingest::IngestSummary;

#[derive(Debug, Clone, PartialEq)]
pub struct IngestRun {
    pub run_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub seasons_total: i64,
    pub seasons_succeeded: i64,
    pub rows_written: i64,
    pub errors: Vec<String>,
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            seasons_total INTEGER NOT NULL,
            seasons_succeeded INTEGER NOT NULL,
            rows_written INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn start_run(conn: &Connection, seasons_total: usize) -> Result<i64> {
    let started_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO ingest_runs(started_at, finished_at, seasons_total, seasons_succeeded, rows_written, errors_json)
         VALUES (?1, NULL, ?2, 0, 0, '[]')",
        params![started_at, seasons_total as i64],
    )
    .context("insert ingest run")?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_run(conn: &Connection, run_id: i64, summary: &IngestSummary) -> Result<()> {
    let finished_at = Utc::now().to_rfc3339();
    let errors_json = serde_json::to_string(&summary.errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE ingest_runs
         SET finished_at = ?1, seasons_succeeded = ?2, rows_written = ?3, errors_json = ?4
         WHERE run_id = ?5",
        params![
            finished_at,
            summary.seasons_succeeded as i64,
            summary.rows_written as i64,
            errors_json,
            run_id
        ],
    )
    .context("update ingest run")?;
    Ok(())
}

pub fn recent_runs(conn: &Connection, limit: usize) -> Result<Vec<IngestRun>> {
    let mut stmt = conn
        .prepare(
            "SELECT run_id, started_at, finished_at, seasons_total, seasons_succeeded, rows_written, errors_json
             FROM ingest_runs ORDER BY run_id DESC LIMIT ?1",
        )
        .context("prepare recent runs")?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            let errors_json: String = row.get(6)?;
            Ok(IngestRun {
                run_id: row.get(0)?,
                started_at: row.get(1)?,
                finished_at: row.get(2)?,
                seasons_total: row.get(3)?,
                seasons_succeeded: row.get(4)?,
                rows_written: row.get(5)?,
                errors: serde_json::from_str(&errors_json).unwrap_or_default(),
            })
        })
        .context("query recent runs")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode ingest run")?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{finish_run, open_db, recent_runs, start_run};
    use crate::ingest::IngestSummary;

    #[test]
    fn run_is_recorded_and_finished() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(&dir.path().join("processed").join("ledger.sqlite")).expect("db");
        let run_id = start_run(&conn, 3).expect("start");
        let summary = IngestSummary {
            seasons_total: 3,
            seasons_succeeded: 2,
            rows_written: 410,
            master_path: None,
            errors: vec!["season 2017-18: no league-wide data".to_string()],
        };
        finish_run(&conn, run_id, &summary).expect("finish");

        let runs = recent_runs(&conn, 5).expect("runs");
        assert_eq!(runs.len(), 1);
        let run = &runs[0];
        assert_eq!(run.run_id, run_id);
        assert_eq!(run.seasons_total, 3);
        assert_eq!(run.seasons_succeeded, 2);
        assert_eq!(run.rows_written, 410);
        assert!(run.finished_at.is_some());
        assert_eq!(run.errors, summary.errors);
    }
}
