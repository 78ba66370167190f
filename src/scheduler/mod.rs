// src/scheduler/mod.rs - The polling loop around the dispatcher
pub mod clock;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::dispatch::Dispatcher;
use crate::job::{CustomerId, CustomerStatus, JobStatus, NewPrintJob, PageSize, PrintJob};
use crate::printer::PrinterError;
use crate::rest::RestSnapshot;
use crate::store::StoreError;

pub use clock::{Clock, ManualClock, SystemClock};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Copies must be at least 1")]
    InvalidCopies,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Printer error: {0}")]
    Printer(#[from] PrinterError),
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub running: bool,
    pub ticks: u64,
    pub rest: RestSnapshot,
    /// Job count per status name; every status is present.
    pub jobs: BTreeMap<String, usize>,
}

struct Runner {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the single polling task that ticks a [`Dispatcher`].
///
/// At most one loop runs per queue. Ticks run inside the loop task, one after
/// another, so they never overlap; `stop` lets an in-flight tick finish.
pub struct PrintQueue {
    dispatcher: Arc<Dispatcher>,
    runner: Mutex<Option<Runner>>,
}

impl PrintQueue {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            runner: Mutex::new(None),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Start polling at the interval from settings. Returns false if already running.
    pub async fn start(&self) -> bool {
        let period = self.dispatcher.settings().poll_interval;
        self.start_with_interval(period).await
    }

    pub async fn start_with_interval(&self, period: Duration) -> bool {
        let mut runner = self.runner.lock().await;
        if runner.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            tracing::debug!("Print queue already running");
            return false;
        }
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let dispatcher = self.dispatcher.clone();
        let handle = tokio::spawn(run_loop(dispatcher, period, shutdown_rx));
        *runner = Some(Runner { shutdown_tx, handle });
        tracing::info!(interval_secs = period.as_secs_f64(), "Print queue started");
        true
    }

    /// Stop polling after any in-flight tick. Returns false if it was not running.
    pub async fn stop(&self) -> bool {
        let Some(runner) = self.runner.lock().await.take() else {
            return false;
        };
        let _ = runner.shutdown_tx.send(());
        if let Err(e) = runner.handle.await {
            tracing::warn!(error = %e, "Print queue loop ended abnormally");
        }
        tracing::info!("Print queue stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.runner
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Add `copies` pending rows for one exported image in a single write,
    /// then mark the customer `queued_for_print`.
    pub async fn enqueue(
        &self,
        customer_id: CustomerId,
        file_path: impl Into<PathBuf>,
        page_size: PageSize,
        copies: u32,
    ) -> Result<Vec<PrintJob>, QueueError> {
        if copies == 0 {
            return Err(QueueError::InvalidCopies);
        }
        let file_path = file_path.into();
        let created_at = self.dispatcher.clock().now();
        let rows = (0..copies)
            .map(|_| NewPrintJob::new(customer_id, file_path.clone(), page_size, created_at))
            .collect();
        let jobs = self.dispatcher.store().enqueue_many(rows).await?;
        tracing::info!(customer_id, copies, %page_size, file = %file_path.display(), "Queued print");

        if let Err(e) = self
            .dispatcher
            .customers()
            .update_customer_status(customer_id, CustomerStatus::QueuedForPrint)
            .await
        {
            tracing::warn!(customer_id, error = %e, "Customer status update failed");
        }
        Ok(jobs)
    }

    pub async fn jobs(&self, status: Option<JobStatus>) -> Result<Vec<PrintJob>, QueueError> {
        Ok(self.dispatcher.store().list(status).await?)
    }

    pub async fn available_printers(&self) -> Result<Vec<String>, QueueError> {
        Ok(self.dispatcher.printer().available_printers().await?)
    }

    pub async fn status(&self) -> Result<QueueStatus, QueueError> {
        let mut jobs: BTreeMap<String, usize> = JobStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        for job in self.dispatcher.store().list(None).await? {
            *jobs.entry(job.status.as_str().to_string()).or_default() += 1;
        }
        Ok(QueueStatus {
            running: self.is_running().await,
            ticks: self.dispatcher.ticks(),
            rest: self.dispatcher.rest_snapshot().await,
            jobs,
        })
    }
}

async fn run_loop(dispatcher: Arc<Dispatcher>, period: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                tracing::info!("Print queue loop shutting down");
                break;
            }
            _ = interval.tick() => {
                let outcome = dispatcher.tick().await;
                tracing::trace!(?outcome, "Tick finished");
            }
        }
    }
}
