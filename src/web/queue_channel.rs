//! Defines the communication channel messages between the web server and the print queue task.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::models::EnqueueRequest;
use crate::job::{JobStatus, PrintJob};
use crate::scheduler::{PrintQueue, QueueError, QueueStatus};

/// Represents a request sent from a web handler to the queue control task.
#[derive(Debug)]
pub enum QueueRequest {
    GetStatus {
        respond_to: oneshot::Sender<Result<QueueStatus, QueueError>>,
    },
    /// Start the polling loop. Replies with whether it was started by this call.
    Start {
        respond_to: oneshot::Sender<bool>,
    },
    /// Stop the polling loop. Replies with whether it was stopped by this call.
    Stop {
        respond_to: oneshot::Sender<bool>,
    },
    ListJobs {
        status: Option<JobStatus>,
        respond_to: oneshot::Sender<Result<Vec<PrintJob>, QueueError>>,
    },
    Enqueue {
        request: EnqueueRequest,
        respond_to: oneshot::Sender<Result<Vec<PrintJob>, QueueError>>,
    },
    ListPrinters {
        respond_to: oneshot::Sender<Result<Vec<String>, QueueError>>,
    },
}

/// Answer requests until every sender is dropped.
pub async fn serve_requests(queue: Arc<PrintQueue>, mut rx: mpsc::Receiver<QueueRequest>) {
    while let Some(request) = rx.recv().await {
        match request {
            QueueRequest::GetStatus { respond_to } => {
                let _ = respond_to.send(queue.status().await);
            }
            QueueRequest::Start { respond_to } => {
                let _ = respond_to.send(queue.start().await);
            }
            QueueRequest::Stop { respond_to } => {
                let _ = respond_to.send(queue.stop().await);
            }
            QueueRequest::ListJobs { status, respond_to } => {
                let _ = respond_to.send(queue.jobs(status).await);
            }
            QueueRequest::Enqueue { request, respond_to } => {
                let result = queue
                    .enqueue(request.customer_id, request.file_path, request.page_size, request.copies)
                    .await;
                let _ = respond_to.send(result);
            }
            QueueRequest::ListPrinters { respond_to } => {
                let _ = respond_to.send(queue.available_printers().await);
            }
        }
    }
    tracing::debug!("Queue request channel closed");
}
