use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::models::{JobRecord, ScrapedJob};

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    /// Open (creating if needed) the database at `path` and make sure the
    /// schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self {
            conn,
            path: path.to_path_buf(),
        };
        db.init()?;
        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                location TEXT NOT NULL,
                scraped_at TEXT NOT NULL,
                applied INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_title_company ON jobs(title, company);
            CREATE INDEX IF NOT EXISTS idx_jobs_scraped_at ON jobs(scraped_at);
            "#,
        )?;
        Ok(())
    }

    /// Insert every job whose (title, company) pair is not stored yet.
    /// Returns how many rows were actually inserted.
    ///
    /// The lookup and the inserts share one `BEGIN IMMEDIATE` transaction, so
    /// the write lock is held before the first existence check.
    pub fn persist(&mut self, jobs: &[ScrapedJob]) -> Result<usize> {
        if jobs.is_empty() {
            return Ok(0);
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to start transaction")?;

        let mut inserted = 0;
        {
            let mut exists = tx.prepare("SELECT id FROM jobs WHERE title = ?1 AND company = ?2")?;
            let mut insert = tx.prepare(
                "INSERT INTO jobs (title, company, location, scraped_at) VALUES (?1, ?2, ?3, ?4)",
            )?;

            for job in jobs {
                let existing: Option<i64> = exists
                    .query_row(params![job.title, job.company], |row| row.get(0))
                    .optional()?;
                if let Some(id) = existing {
                    debug!(id, title = %job.title, company = %job.company, "skipping duplicate job");
                    continue;
                }
                insert.execute(params![job.title, job.company, job.location, Utc::now()])?;
                inserted += 1;
            }
        }

        tx.commit().context("Failed to commit jobs")?;
        Ok(inserted)
    }

    /// Every stored job, most recently scraped first.
    pub fn list_all(&self) -> Result<Vec<JobRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, company, location, scraped_at, applied
             FROM jobs
             ORDER BY scraped_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], Self::row_to_job)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list jobs")
    }

    pub fn get_job(&self, id: i64) -> Result<Option<JobRecord>> {
        let result = self.conn.query_row(
            "SELECT id, title, company, location, scraped_at, applied
             FROM jobs WHERE id = ?1",
            [id],
            Self::row_to_job,
        );
        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Flag a job as applied to. Returns false when no job has that id.
    pub fn mark_applied(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("UPDATE jobs SET applied = 1 WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    /// Delete every job and restart ids from 1.
    pub fn clear(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "BEGIN;
                 DELETE FROM jobs;
                 DELETE FROM sqlite_sequence WHERE name = 'jobs';
                 COMMIT;",
            )
            .context("Failed to clear jobs")
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
        let scraped_at: DateTime<Utc> = row.get(4)?;
        Ok(JobRecord {
            id: row.get(0)?,
            title: row.get(1)?,
            company: row.get(2)?,
            location: row.get(3)?,
            scraped_at,
            applied: row.get(5)?,
        })
    }
}
