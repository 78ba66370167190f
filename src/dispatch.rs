//! The pairing and dispatch engine.
//!
//! [`Dispatcher::tick`] performs at most one unit of work per call, in a fixed
//! priority order:
//!
//! 1. nothing while the rest governor says the printer is resting,
//! 2. the oldest full-page job,
//! 3. the two oldest vertical half-page jobs,
//! 4. the two oldest horizontal half-page jobs,
//! 5. the oldest unpaired half-page job, against the stock photo, once it has
//!    waited past the orphan threshold.
//!
//! Job state machine: `Pending -> Printing -> Done` for full pages and
//! `Pending -> Paired -> Done` for halves; any step may end in `Failed`.
//! `Done` and `Failed` are terminal and nothing here retries them.
//!
//! A tick never returns an error. Missing files, merge failures and spooler
//! rejections become `Failed` rows plus a `failed` customer update.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::compositor::{CompositeError, Compositor};
use crate::job::{CustomerStatus, JobId, JobStatus, Orientation, PageSize, PrintJob};
use crate::orphan;
use crate::printer::{PrinterError, PrinterGateway, SpoolJobId};
use crate::rest::{RestGovernor, RestSnapshot};
use crate::scheduler::clock::Clock;
use crate::settings::{DispatchSettings, SettingsSource};
use crate::store::{CustomerNotifier, JobStore, StoreError};

/// Why a dispatch attempt ended its job(s) as `Failed`.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Source file for job {job_id} not found: {path}")]
    MissingSourceFile { job_id: JobId, path: PathBuf },
    #[error("Composite failed: {0}")]
    Composite(#[from] CompositeError),
    #[error("Printer rejected submission: {0}")]
    PrinterRejection(#[from] PrinterError),
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Rest in progress; nothing was looked at.
    Resting,
    /// No eligible work.
    Idle,
    /// An orphan exists but is not due for filler yet.
    OrphanDeferred { job_id: JobId },
    Printed { job_ids: Vec<JobId>, spool_job: SpoolJobId },
    Failed { job_ids: Vec<JobId>, reason: String },
    /// The store itself misbehaved; the tick was abandoned.
    Faulted { reason: String },
}

/// Policy for jobs found mid-dispatch when the process starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// Leave them for the operator.
    #[default]
    Leave,
    Fail,
    Requeue,
}

/// External collaborators the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn JobStore>,
    pub customers: Arc<dyn CustomerNotifier>,
    pub compositor: Arc<dyn Compositor>,
    pub printer: Arc<dyn PrinterGateway>,
    pub settings: Arc<dyn SettingsSource>,
    pub clock: Arc<dyn Clock>,
}

pub struct Dispatcher {
    collaborators: Collaborators,
    projects_base: PathBuf,
    rest: Mutex<RestGovernor>,
    ticks: AtomicU64,
}

/// A claimed unit of work waiting to be merged and printed.
struct Claim {
    jobs: Vec<PrintJob>,
    sources: Vec<PathBuf>,
}

impl Claim {
    fn ids(&self) -> Vec<JobId> {
        self.jobs.iter().map(|j| j.id).collect()
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

impl Dispatcher {
    pub fn new(collaborators: Collaborators, projects_base: impl Into<PathBuf>) -> Self {
        Self {
            collaborators,
            projects_base: projects_base.into(),
            rest: Mutex::new(RestGovernor::new()),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.collaborators.store
    }

    pub fn customers(&self) -> &Arc<dyn CustomerNotifier> {
        &self.collaborators.customers
    }

    pub fn printer(&self) -> &Arc<dyn PrinterGateway> {
        &self.collaborators.printer
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.collaborators.clock
    }

    /// Settings as they read right now.
    pub fn settings(&self) -> DispatchSettings {
        DispatchSettings::load(self.collaborators.settings.as_ref())
    }

    /// Ticks run since this dispatcher was built.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub async fn rest_snapshot(&self) -> RestSnapshot {
        let now = self.collaborators.clock.now();
        self.rest.lock().await.snapshot(now)
    }

    fn source_path(&self, job: &PrintJob) -> PathBuf {
        self.projects_base.join(&job.file_path)
    }

    /// Run one pass of the queue. Never fails; see [`TickOutcome`].
    pub async fn tick(&self) -> TickOutcome {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        match self.run_tick().await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Print queue tick abandoned");
                TickOutcome::Faulted { reason: e.to_string() }
            }
        }
    }

    async fn run_tick(&self) -> Result<TickOutcome, StoreError> {
        let now = self.collaborators.clock.now();
        if self.rest.lock().await.is_resting(now) {
            tracing::debug!("Printer resting, skipping tick");
            return Ok(TickOutcome::Resting);
        }
        let settings = self.settings();
        let store = &self.collaborators.store;

        if let Some(job) = store.claim_oldest(PageSize::Full, JobStatus::Printing).await? {
            tracing::info!(job_id = job.id, customer_id = job.customer_id, "Dispatching full-page job");
            return self.dispatch_full(job, &settings).await;
        }

        for orientation in [Orientation::Vertical, Orientation::Horizontal] {
            if let Some((a, b)) = store.claim_pair(PageSize::half(orientation)).await? {
                tracing::info!(first = a.id, second = b.id, %orientation, "Dispatching half-page pair");
                return self.dispatch_pair(a, b, orientation, &settings).await;
            }
        }

        match store.oldest_pending(&PageSize::HALF_SIZES).await? {
            Some(job) => self.resolve_orphan(job, &settings).await,
            None => Ok(TickOutcome::Idle),
        }
    }

    async fn dispatch_full(
        &self,
        job: PrintJob,
        settings: &DispatchSettings,
    ) -> Result<TickOutcome, StoreError> {
        let claim = Claim {
            sources: vec![self.source_path(&job)],
            jobs: vec![job],
        };
        let result = match self.check_sources(&claim).await {
            Ok(()) => self.submit(&claim.sources[0], settings).await,
            Err(e) => Err(e),
        };
        self.settle(claim, result, settings).await
    }

    async fn dispatch_pair(
        &self,
        first: PrintJob,
        second: PrintJob,
        orientation: Orientation,
        settings: &DispatchSettings,
    ) -> Result<TickOutcome, StoreError> {
        let claim = Claim {
            sources: vec![self.source_path(&first), self.source_path(&second)],
            jobs: vec![first, second],
        };
        let result = match self.check_sources(&claim).await {
            Ok(()) => {
                self.merge_and_submit(&claim.sources[0], &claim.sources[1], orientation, settings)
                    .await
            }
            Err(e) => Err(e),
        };
        self.settle(claim, result, settings).await
    }

    async fn resolve_orphan(
        &self,
        job: PrintJob,
        settings: &DispatchSettings,
    ) -> Result<TickOutcome, StoreError> {
        let now = self.collaborators.clock.now();
        let age = orphan::job_age_minutes(job.created_at, now);
        let filler = match &settings.stock_photo_path {
            Some(path) if file_exists(path).await => Some(path.clone()),
            Some(path) => {
                tracing::warn!(path = %path.display(), "Stock photo configured but missing");
                None
            }
            None => None,
        };

        if !orphan::should_resolve(age, settings.orphan_wait_minutes, filler.is_some()) {
            tracing::debug!(job_id = job.id, age_minutes = age, "Orphan waiting for a partner");
            return Ok(TickOutcome::OrphanDeferred { job_id: job.id });
        }
        let (Some(filler), Some(orientation)) = (filler, job.page_size.orientation()) else {
            return Ok(TickOutcome::OrphanDeferred { job_id: job.id });
        };

        let claim = Claim {
            sources: vec![self.source_path(&job)],
            jobs: vec![job],
        };
        if let Err(e) = self.check_sources(&claim).await {
            return self.settle(claim, Err(e), settings).await;
        }
        let job_id = claim.jobs[0].id;
        if !self
            .collaborators
            .store
            .transition(job_id, JobStatus::Pending, JobStatus::Paired)
            .await?
        {
            tracing::warn!(job_id, "Orphan was claimed elsewhere, skipping");
            return Ok(TickOutcome::Idle);
        }
        tracing::info!(job_id, age_minutes = age, %orientation, "Pairing orphan with stock photo");

        let result = self
            .merge_and_submit(&claim.sources[0], &filler, orientation, settings)
            .await;
        self.settle(claim, result, settings).await
    }

    async fn check_sources(&self, claim: &Claim) -> Result<(), DispatchError> {
        for (job, path) in claim.jobs.iter().zip(&claim.sources) {
            if !file_exists(path).await {
                return Err(DispatchError::MissingSourceFile {
                    job_id: job.id,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }

    async fn merge_and_submit(
        &self,
        first: &Path,
        second: &Path,
        orientation: Orientation,
        settings: &DispatchSettings,
    ) -> Result<SpoolJobId, DispatchError> {
        if settings.printer_name.is_none() {
            return Err(PrinterError::NoPrinterSelected.into());
        }
        let merged = self.collaborators.compositor.merge(first, second, orientation).await?;
        self.submit(&merged, settings).await
    }

    async fn submit(&self, file: &Path, settings: &DispatchSettings) -> Result<SpoolJobId, DispatchError> {
        let printer = settings
            .printer_name
            .as_deref()
            .ok_or(PrinterError::NoPrinterSelected)?;
        Ok(self.collaborators.printer.submit(file, printer).await?)
    }

    /// Write the outcome of one claim: every job in it ends the same way.
    async fn settle(
        &self,
        claim: Claim,
        result: Result<SpoolJobId, DispatchError>,
        settings: &DispatchSettings,
    ) -> Result<TickOutcome, StoreError> {
        let ids = claim.ids();
        match result {
            Ok(spool_job) => {
                self.collaborators.store.set_status(&ids, JobStatus::Done).await?;
                self.notify(&claim.jobs, CustomerStatus::Printed).await;
                let now = self.collaborators.clock.now();
                self.rest.lock().await.record_completion(settings.rest, now);
                tracing::info!(job_ids = ?ids, spool_job = %spool_job, "Print dispatched");
                Ok(TickOutcome::Printed { job_ids: ids, spool_job })
            }
            Err(e) => {
                tracing::error!(job_ids = ?ids, error = %e, "Print job failed");
                self.collaborators.store.set_status(&ids, JobStatus::Failed).await?;
                self.notify(&claim.jobs, CustomerStatus::Failed).await;
                Ok(TickOutcome::Failed { job_ids: ids, reason: e.to_string() })
            }
        }
    }

    async fn notify(&self, jobs: &[PrintJob], status: CustomerStatus) {
        for job in jobs {
            if let Err(e) = self
                .collaborators
                .customers
                .update_customer_status(job.customer_id, status)
                .await
            {
                tracing::warn!(customer_id = job.customer_id, %status, error = %e, "Customer status update failed");
            }
        }
    }

    /// Deal with jobs a previous run left `Printing` or `Paired`.
    /// Returns how many rows were found.
    pub async fn reconcile_interrupted(&self, policy: ReconcilePolicy) -> Result<usize, StoreError> {
        let store = &self.collaborators.store;
        let mut stuck = store.list(Some(JobStatus::Printing)).await?;
        stuck.extend(store.list(Some(JobStatus::Paired)).await?);
        if stuck.is_empty() {
            return Ok(0);
        }
        let ids: Vec<JobId> = stuck.iter().map(|j| j.id).collect();
        match policy {
            ReconcilePolicy::Leave => {
                for job in &stuck {
                    tracing::warn!(job_id = job.id, status = %job.status, "Job interrupted mid-dispatch; needs operator");
                }
            }
            ReconcilePolicy::Fail => {
                store.set_status(&ids, JobStatus::Failed).await?;
                self.notify(&stuck, CustomerStatus::Failed).await;
                tracing::warn!(job_ids = ?ids, "Interrupted jobs marked failed");
            }
            ReconcilePolicy::Requeue => {
                store.set_status(&ids, JobStatus::Pending).await?;
                tracing::warn!(job_ids = ?ids, "Interrupted jobs returned to the queue");
            }
        }
        Ok(stuck.len())
    }
}
