// src/job.rs - Print job rows and their state enums
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type JobId = i64;
pub type CustomerId = i64;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown {kind} value: {value}")]
pub struct ParseColumnError {
    pub kind: &'static str,
    pub value: String,
}

/// Physical footprint of an exported print on a 4R sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageSize {
    #[serde(rename = "full_4r")]
    Full,
    #[serde(rename = "half_4r_vertical")]
    HalfVertical,
    #[serde(rename = "half_4r_horizontal")]
    HalfHorizontal,
}

impl PageSize {
    pub const HALF_SIZES: [PageSize; 2] = [PageSize::HalfVertical, PageSize::HalfHorizontal];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageSize::Full => "full_4r",
            PageSize::HalfVertical => "half_4r_vertical",
            PageSize::HalfHorizontal => "half_4r_horizontal",
        }
    }

    /// Orientation of a half-page print, `None` for full pages.
    pub fn orientation(&self) -> Option<Orientation> {
        match self {
            PageSize::Full => None,
            PageSize::HalfVertical => Some(Orientation::Vertical),
            PageSize::HalfHorizontal => Some(Orientation::Horizontal),
        }
    }

    pub fn half(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Vertical => PageSize::HalfVertical,
            Orientation::Horizontal => PageSize::HalfHorizontal,
        }
    }

    pub fn is_half(&self) -> bool {
        self.orientation().is_some()
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageSize {
    type Err = ParseColumnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full_4r" => Ok(PageSize::Full),
            "half_4r_vertical" => Ok(PageSize::HalfVertical),
            "half_4r_horizontal" => Ok(PageSize::HalfHorizontal),
            other => Err(ParseColumnError { kind: "page size", value: other.to_string() }),
        }
    }
}

/// How two half-page prints share one sheet: side by side or stacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Vertical,
    Horizontal,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Vertical => write!(f, "vertical"),
            Orientation::Horizontal => write!(f, "horizontal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Printing,
    Paired,
    Done,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Printing,
        JobStatus::Paired,
        JobStatus::Done,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Printing => "printing",
            JobStatus::Paired => "paired",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Jobs a crash can leave behind mid-dispatch.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobStatus::Printing | JobStatus::Paired)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseColumnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseColumnError { kind: "job status", value: s.to_string() })
    }
}

/// Workflow status pushed to the customer record when prints are queued and
/// after each dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    QueuedForPrint,
    Printed,
    Failed,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerStatus::QueuedForPrint => "queued_for_print",
            CustomerStatus::Printed => "printed",
            CustomerStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CustomerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    pub customer_id: CustomerId,
    /// Relative to the projects base directory.
    pub file_path: PathBuf,
    pub page_size: PageSize,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

/// A row about to be inserted; the store assigns the id and starts it `Pending`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrintJob {
    pub customer_id: CustomerId,
    pub file_path: PathBuf,
    pub page_size: PageSize,
    pub created_at: DateTime<Utc>,
}

impl NewPrintJob {
    pub fn new(
        customer_id: CustomerId,
        file_path: impl Into<PathBuf>,
        page_size: PageSize,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            customer_id,
            file_path: file_path.into(),
            page_size,
            created_at,
        }
    }

    pub fn into_job(self, id: JobId) -> PrintJob {
        PrintJob {
            id,
            customer_id: self.customer_id,
            file_path: self.file_path,
            page_size: self.page_size,
            status: JobStatus::Pending,
            created_at: self.created_at,
        }
    }
}
