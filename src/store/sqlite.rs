// src/store/sqlite.rs - SQLite-backed print queue
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Params, Row};

use super::{CustomerNotifier, JobStore, StoreError};
use crate::job::{CustomerId, CustomerStatus, JobId, JobStatus, NewPrintJob, PageSize, PrintJob};

const JOB_COLUMNS: &str =
    "id, customer_id, exported_file_path, template_print_size, status, created_at";

/// Same layout as SQLite's `CURRENT_TIMESTAMP`, plus microseconds.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// FIFO order. `julianday` reads both our layout and ISO 8601 with a `T`;
/// the text and id break ties below its resolution.
const FIFO_ORDER: &str = "ORDER BY julianday(created_at), created_at, id";

/// Print queue rows in a SQLite database file.
///
/// Other writers may insert rows too, relying on the `created_at` default.
/// Rows this store cannot read are logged and left out of every query.
/// Queries run on the blocking pool.
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|_| StoreError::Unavailable("database lock poisoned".to_string()))
}

impl SqliteJobStore {
    /// Open (or create) the database at `path` and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        tracing::info!(path = %path.display(), "Print queue database ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS print_job_queue (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_id         INTEGER NOT NULL,
                exported_file_path  TEXT NOT NULL,
                template_print_size TEXT NOT NULL,
                status              TEXT NOT NULL DEFAULT 'pending',
                created_at          TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_print_job_queue_pending
                ON print_job_queue(status, template_print_size);
            CREATE TABLE IF NOT EXISTS customer_workflow_status (
                customer_id INTEGER PRIMARY KEY,
                status      TEXT NOT NULL,
                updated_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );",
        )
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("database task failed: {e}")))?
    }

    /// Last workflow status written for a customer.
    pub fn customer_status(&self, customer_id: CustomerId) -> Result<Option<String>, StoreError> {
        let conn = lock(&self.conn)?;
        let status = conn
            .query_row(
                "SELECT status FROM customer_workflow_status WHERE customer_id = ?1",
                params![customer_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(status)
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

/// Accepts our own layout, bare `CURRENT_TIMESTAMP` values and RFC 3339.
fn parse_timestamp(value: String) -> Result<DateTime<Utc>, StoreError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(&value, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(&value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|source| StoreError::InvalidTimestamp { value, source })
}

struct JobRow {
    id: JobId,
    customer_id: CustomerId,
    file_path: String,
    page_size: String,
    status: String,
    created_at: String,
}

impl JobRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            customer_id: row.get(1)?,
            file_path: row.get(2)?,
            page_size: row.get(3)?,
            status: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl TryFrom<JobRow> for PrintJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(PrintJob {
            id: row.id,
            customer_id: row.customer_id,
            file_path: PathBuf::from(row.file_path),
            page_size: row.page_size.parse()?,
            status: row.status.parse()?,
            created_at: parse_timestamp(row.created_at)?,
        })
    }
}

fn query_jobs<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<PrintJob>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, JobRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id;
            match PrintJob::try_from(row) {
                Ok(job) => Some(job),
                Err(e) => {
                    tracing::warn!(job_id = id, error = %e, "Skipping unreadable print job row");
                    None
                }
            }
        })
        .collect())
}

/// Readable pending rows of one size, oldest first. No SQL `LIMIT`, so an
/// unreadable row never hides the ones behind it.
fn pending_fifo(conn: &Connection, size: PageSize) -> Result<Vec<PrintJob>, StoreError> {
    let sql = format!(
        "SELECT {JOB_COLUMNS} FROM print_job_queue
         WHERE template_print_size = ?1 AND status = 'pending' {FIFO_ORDER}"
    );
    query_jobs(conn, &sql, params![size.as_str()])
}

fn update_status(conn: &Connection, id: JobId, status: JobStatus) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "UPDATE print_job_queue SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?)
}

fn insert_job(conn: &Connection, job: NewPrintJob) -> Result<PrintJob, StoreError> {
    conn.execute(
        "INSERT INTO print_job_queue
            (customer_id, exported_file_path, template_print_size, status, created_at)
         VALUES (?1, ?2, ?3, 'pending', ?4)",
        params![
            job.customer_id,
            job.file_path.to_string_lossy(),
            job.page_size.as_str(),
            timestamp(job.created_at),
        ],
    )?;
    Ok(job.into_job(conn.last_insert_rowid()))
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, job: NewPrintJob) -> Result<PrintJob, StoreError> {
        self.with_conn(move |conn| insert_job(conn, job)).await
    }

    async fn enqueue_many(&self, jobs: Vec<NewPrintJob>) -> Result<Vec<PrintJob>, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let inserted = jobs
                .into_iter()
                .map(|job| insert_job(&tx, job))
                .collect::<Result<Vec<_>, _>>()?;
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    async fn get(&self, id: JobId) -> Result<Option<PrintJob>, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {JOB_COLUMNS} FROM print_job_queue WHERE id = ?1");
            Ok(query_jobs(conn, &sql, params![id])?.into_iter().next())
        })
        .await
    }

    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<PrintJob>, StoreError> {
        self.with_conn(move |conn| match status {
            Some(status) => {
                let sql =
                    format!("SELECT {JOB_COLUMNS} FROM print_job_queue WHERE status = ?1 {FIFO_ORDER}");
                query_jobs(conn, &sql, params![status.as_str()])
            }
            None => {
                let sql = format!("SELECT {JOB_COLUMNS} FROM print_job_queue {FIFO_ORDER}");
                query_jobs(conn, &sql, [])
            }
        })
        .await
    }

    async fn oldest_pending(&self, sizes: &[PageSize]) -> Result<Option<PrintJob>, StoreError> {
        if sizes.is_empty() {
            return Ok(None);
        }
        let sizes = sizes.to_vec();
        self.with_conn(move |conn| {
            let placeholders = (1..=sizes.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT {JOB_COLUMNS} FROM print_job_queue
                 WHERE template_print_size IN ({placeholders}) AND status = 'pending' {FIFO_ORDER}"
            );
            let jobs = query_jobs(conn, &sql, params_from_iter(sizes.iter().map(PageSize::as_str)))?;
            Ok(jobs.into_iter().next())
        })
        .await
    }

    async fn claim_oldest(&self, size: PageSize, to: JobStatus) -> Result<Option<PrintJob>, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let Some(mut job) = pending_fifo(&tx, size)?.into_iter().next() else {
                return Ok(None);
            };
            update_status(&tx, job.id, to)?;
            tx.commit()?;
            job.status = to;
            Ok(Some(job))
        })
        .await
    }

    async fn claim_pair(&self, size: PageSize) -> Result<Option<(PrintJob, PrintJob)>, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut jobs = pending_fifo(&tx, size)?;
            jobs.truncate(2);
            if jobs.len() < 2 {
                return Ok(None);
            }
            for job in jobs.iter_mut() {
                update_status(&tx, job.id, JobStatus::Paired)?;
                job.status = JobStatus::Paired;
            }
            tx.commit()?;
            let second = jobs.pop();
            let first = jobs.pop();
            Ok(first.zip(second))
        })
        .await
    }

    async fn transition(&self, id: JobId, from: JobStatus, to: JobStatus) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE print_job_queue SET status = ?1 WHERE id = ?2 AND status = ?3",
                params![to.as_str(), id, from.as_str()],
            )?;
            if changed == 1 {
                return Ok(true);
            }
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM print_job_queue WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            if exists { Ok(false) } else { Err(StoreError::JobNotFound(id)) }
        })
        .await
    }

    async fn set_status(&self, ids: &[JobId], status: JobStatus) -> Result<(), StoreError> {
        let ids = ids.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for id in ids {
                if update_status(&tx, id, status)? == 0 {
                    return Err(StoreError::JobNotFound(id));
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CustomerNotifier for SqliteJobStore {
    async fn update_customer_status(
        &self,
        customer_id: CustomerId,
        status: CustomerStatus,
    ) -> Result<(), StoreError> {
        let updated_at = timestamp(Utc::now());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO customer_workflow_status (customer_id, status, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(customer_id) DO UPDATE
                    SET status = excluded.status, updated_at = excluded.updated_at",
                params![customer_id, status.as_str(), updated_at],
            )?;
            Ok(())
        })
        .await
    }
}
