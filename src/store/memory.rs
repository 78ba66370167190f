use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CustomerNotifier, JobStore, StoreError};
use crate::job::{CustomerId, CustomerStatus, JobId, JobStatus, NewPrintJob, PageSize, PrintJob};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: JobId,
    jobs: BTreeMap<JobId, PrintJob>,
    customer_updates: Vec<(CustomerId, CustomerStatus)>,
}

impl MemoryState {
    fn pending_fifo(&self, size: PageSize) -> Vec<JobId> {
        let mut pending: Vec<&PrintJob> = self
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.page_size == size)
            .collect();
        pending.sort_by_key(|j| (j.created_at, j.id));
        pending.into_iter().map(|j| j.id).collect()
    }

    fn mark(&mut self, id: JobId, status: JobStatus) -> Result<PrintJob, StoreError> {
        let job = self.jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        job.status = status;
        Ok(job.clone())
    }
}

/// Queue kept entirely in memory. Also records every customer update it receives.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    state: Mutex<MemoryState>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Customer updates in the order they arrived.
    pub async fn customer_updates(&self) -> Vec<(CustomerId, CustomerStatus)> {
        self.state.lock().await.customer_updates.clone()
    }

    /// Latest status pushed for one customer.
    pub async fn customer_status(&self, customer_id: CustomerId) -> Option<CustomerStatus> {
        let state = self.state.lock().await;
        state
            .customer_updates
            .iter()
            .rev()
            .find(|(id, _)| *id == customer_id)
            .map(|(_, status)| *status)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(&self, job: NewPrintJob) -> Result<PrintJob, StoreError> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let job = job.into_job(state.next_id);
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn enqueue_many(&self, jobs: Vec<NewPrintJob>) -> Result<Vec<PrintJob>, StoreError> {
        let mut state = self.state.lock().await;
        let mut inserted = Vec::with_capacity(jobs.len());
        for job in jobs {
            state.next_id += 1;
            let job = job.into_job(state.next_id);
            state.jobs.insert(job.id, job.clone());
            inserted.push(job);
        }
        Ok(inserted)
    }

    async fn get(&self, id: JobId) -> Result<Option<PrintJob>, StoreError> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<PrintJob>, StoreError> {
        let state = self.state.lock().await;
        let mut jobs: Vec<PrintJob> = state
            .jobs
            .values()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.created_at, j.id));
        Ok(jobs)
    }

    async fn oldest_pending(&self, sizes: &[PageSize]) -> Result<Option<PrintJob>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && sizes.contains(&j.page_size))
            .min_by_key(|j| (j.created_at, j.id))
            .cloned())
    }

    async fn claim_oldest(&self, size: PageSize, to: JobStatus) -> Result<Option<PrintJob>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(id) = state.pending_fifo(size).first().copied() else {
            return Ok(None);
        };
        state.mark(id, to).map(Some)
    }

    async fn claim_pair(&self, size: PageSize) -> Result<Option<(PrintJob, PrintJob)>, StoreError> {
        let mut state = self.state.lock().await;
        let fifo = state.pending_fifo(size);
        let (first, second) = match fifo.as_slice() {
            [a, b, ..] => (*a, *b),
            _ => return Ok(None),
        };
        let first = state.mark(first, JobStatus::Paired)?;
        let second = state.mark(second, JobStatus::Paired)?;
        Ok(Some((first, second)))
    }

    async fn transition(&self, id: JobId, from: JobStatus, to: JobStatus) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.jobs.get_mut(&id) {
            Some(job) if job.status == from => {
                job.status = to;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::JobNotFound(id)),
        }
    }

    async fn set_status(&self, ids: &[JobId], status: JobStatus) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(missing) = ids.iter().find(|id| !state.jobs.contains_key(*id)) {
            return Err(StoreError::JobNotFound(*missing));
        }
        for id in ids {
            if let Some(job) = state.jobs.get_mut(id) {
                job.status = status;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CustomerNotifier for MemoryJobStore {
    async fn update_customer_status(
        &self,
        customer_id: CustomerId,
        status: CustomerStatus,
    ) -> Result<(), StoreError> {
        self.state.lock().await.customer_updates.push((customer_id, status));
        Ok(())
    }
}
