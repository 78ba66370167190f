// src/printer.rs - Hand-off to the OS print spooler
use std::fmt;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum PrinterError {
    #[error("No printer selected in settings")]
    NoPrinterSelected,
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Printer '{printer}' rejected the job: {message}")]
    Rejected { printer: String, message: String },
    #[error("Printer listing failed: {0}")]
    Listing(String),
}

/// Identifier the spooler assigned to an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpoolJobId(pub String);

impl fmt::Display for SpoolJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait PrinterGateway: Send + Sync {
    /// Queue `file` on `printer`. Success means the spooler accepted it, not
    /// that paper came out.
    async fn submit(&self, file: &Path, printer: &str) -> Result<SpoolJobId, PrinterError>;

    /// Destinations the spooler knows about.
    async fn available_printers(&self) -> Result<Vec<String>, PrinterError>;
}

/// Gateway for CUPS-style spoolers driven through `lp` and `lpstat`.
#[derive(Debug, Clone)]
pub struct LpGateway {
    submit_command: String,
    list_command: String,
}

impl Default for LpGateway {
    fn default() -> Self {
        Self::new("lp", "lpstat")
    }
}

impl LpGateway {
    pub fn new(submit_command: impl Into<String>, list_command: impl Into<String>) -> Self {
        Self {
            submit_command: submit_command.into(),
            list_command: list_command.into(),
        }
    }
}

/// Pull the job id out of `lp` output such as
/// `request id is DNP_DS620-42 (1 file(s))`.
pub fn parse_request_id(stdout: &str) -> Option<SpoolJobId> {
    stdout.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("request id is ")?;
        let id = rest.split_whitespace().next()?;
        Some(SpoolJobId(id.to_string()))
    })
}

/// Destination names from `lpstat -e`, one per line.
pub fn parse_destinations(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl PrinterGateway for LpGateway {
    async fn submit(&self, file: &Path, printer: &str) -> Result<SpoolJobId, PrinterError> {
        if printer.trim().is_empty() {
            return Err(PrinterError::NoPrinterSelected);
        }
        tracing::info!(printer, file = %file.display(), "Sending to printer");

        let output = Command::new(&self.submit_command)
            .arg("-d")
            .arg(printer)
            .arg(file)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| PrinterError::Spawn {
                command: self.submit_command.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let message = if stderr.trim().is_empty() {
                format!("exit status {:?}", output.status.code())
            } else {
                stderr.trim().to_string()
            };
            tracing::error!(printer, error = %message, "Spooler refused job");
            return Err(PrinterError::Rejected {
                printer: printer.to_string(),
                message,
            });
        }

        // Some spoolers accept silently; keep going with a placeholder id.
        let job_id = parse_request_id(&stdout).unwrap_or_else(|| SpoolJobId("unknown".to_string()));
        tracing::info!(printer, spool_job = %job_id, "Spooler accepted job");
        Ok(job_id)
    }

    async fn available_printers(&self) -> Result<Vec<String>, PrinterError> {
        let output = Command::new(&self.list_command)
            .arg("-e")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| PrinterError::Spawn {
                command: self.list_command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(PrinterError::Listing(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(parse_destinations(&String::from_utf8_lossy(&output.stdout)))
    }
}
