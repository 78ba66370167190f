//! Contains the data models for API requests and responses.

use serde::{Deserialize, Serialize};

use crate::job::{CustomerId, JobStatus, PageSize, PrintJob};

fn default_copies() -> u32 {
    1
}

/// A request to queue one exported image for printing.
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub customer_id: CustomerId,
    /// Relative to the projects base path.
    pub file_path: String,
    pub page_size: PageSize,
    #[serde(default = "default_copies")]
    pub copies: u32,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub jobs: Vec<PrintJob>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobsQuery {
    pub status: Option<JobStatus>,
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<PrintJob>,
}

/// Reply to start/stop. `changed` is false when the queue was already in
/// the requested state.
#[derive(Debug, Serialize)]
pub struct QueueControlResponse {
    pub running: bool,
    pub changed: bool,
}

#[derive(Debug, Serialize)]
pub struct PrintersResponse {
    pub printers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
