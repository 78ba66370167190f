//! Durable print queue and customer workflow status.
//!
//! The dispatch engine only talks to these traits. Every method is a single
//! logical operation so a backend can make it atomic; in particular
//! [`JobStore::claim_pair`] selects and marks a pair in one step.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::{CustomerId, CustomerStatus, JobId, JobStatus, NewPrintJob, PageSize, PrintJob};

pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid column value: {0}")]
    InvalidColumn(#[from] crate::job::ParseColumnError),
    #[error("Invalid timestamp {value}: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("Job not found: {0}")]
    JobNotFound(JobId),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `Pending` row.
    async fn enqueue(&self, job: NewPrintJob) -> Result<PrintJob, StoreError>;

    /// Insert several rows as one write; either all land or none do.
    async fn enqueue_many(&self, jobs: Vec<NewPrintJob>) -> Result<Vec<PrintJob>, StoreError>;

    async fn get(&self, id: JobId) -> Result<Option<PrintJob>, StoreError>;

    /// Jobs in FIFO order, optionally restricted to one status.
    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<PrintJob>, StoreError>;

    /// Oldest `Pending` job whose page size is in `sizes`, left untouched.
    async fn oldest_pending(&self, sizes: &[PageSize]) -> Result<Option<PrintJob>, StoreError>;

    /// Take the oldest `Pending` job of `size` and move it to `to`.
    async fn claim_oldest(&self, size: PageSize, to: JobStatus) -> Result<Option<PrintJob>, StoreError>;

    /// Take the two oldest `Pending` jobs of `size` and mark both `Paired`.
    /// Returns `None` and changes nothing unless two are available.
    async fn claim_pair(&self, size: PageSize) -> Result<Option<(PrintJob, PrintJob)>, StoreError>;

    /// Compare-and-set on one row. Returns false if the row was not in `from`.
    async fn transition(&self, id: JobId, from: JobStatus, to: JobStatus) -> Result<bool, StoreError>;

    /// Set every listed row to `status` in one write.
    async fn set_status(&self, ids: &[JobId], status: JobStatus) -> Result<(), StoreError>;
}

/// Receiver of customer workflow updates. The engine never waits on the outcome.
#[async_trait]
pub trait CustomerNotifier: Send + Sync {
    async fn update_customer_status(
        &self,
        customer_id: CustomerId,
        status: CustomerStatus,
    ) -> Result<(), StoreError>;
}
