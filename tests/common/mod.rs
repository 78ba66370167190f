//! Shared fakes and a harness for the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use booth_print::compositor::{CompositeError, Compositor};
use booth_print::dispatch::{Collaborators, Dispatcher};
use booth_print::job::{CustomerId, NewPrintJob, Orientation, PageSize, PrintJob};
use booth_print::printer::{PrinterError, PrinterGateway, SpoolJobId};
use booth_print::scheduler::ManualClock;
use booth_print::scheduler::clock::Clock;
use booth_print::settings::{self, MemorySettings};
use booth_print::store::{JobStore, MemoryJobStore};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

pub const PRINTER: &str = "DNP_DS620";

/// Records submissions; can be told to reject them.
#[derive(Default)]
pub struct FakePrinter {
    pub submissions: Mutex<Vec<(PathBuf, String)>>,
    pub reject: AtomicBool,
}

impl FakePrinter {
    pub fn submitted(&self) -> Vec<PathBuf> {
        self.submissions.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }
}

#[async_trait]
impl PrinterGateway for FakePrinter {
    async fn submit(&self, file: &Path, printer: &str) -> Result<SpoolJobId, PrinterError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(PrinterError::Rejected {
                printer: printer.to_string(),
                message: "out of paper".to_string(),
            });
        }
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push((file.to_path_buf(), printer.to_string()));
        Ok(SpoolJobId(format!("{}-{}", printer, submissions.len())))
    }

    async fn available_printers(&self) -> Result<Vec<String>, PrinterError> {
        Ok(vec![PRINTER.to_string()])
    }
}

/// Records merge inputs instead of decoding images.
#[derive(Default)]
pub struct FakeCompositor {
    pub merges: Mutex<Vec<(PathBuf, PathBuf, Orientation)>>,
    pub fail: AtomicBool,
    count: AtomicUsize,
}

impl FakeCompositor {
    pub fn merged(&self) -> Vec<(PathBuf, PathBuf, Orientation)> {
        self.merges.lock().unwrap().clone()
    }
}

#[async_trait]
impl Compositor for FakeCompositor {
    async fn merge(
        &self,
        first: &Path,
        second: &Path,
        orientation: Orientation,
    ) -> Result<PathBuf, CompositeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CompositeError::Task("decoder exploded".to_string()));
        }
        self.merges
            .lock()
            .unwrap()
            .push((first.to_path_buf(), second.to_path_buf(), orientation));
        let n = self.count.fetch_add(1, Ordering::SeqCst);
        Ok(PathBuf::from(format!("/merged/merged_print_{}.jpg", n)))
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// A dispatcher wired to in-memory fakes, with a projects directory on disk.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<MemoryJobStore>,
    pub settings: Arc<MemorySettings>,
    pub clock: Arc<ManualClock>,
    pub printer: Arc<FakePrinter>,
    pub compositor: Arc<FakeCompositor>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Harness {
    /// Printer selected, no stock photo, stock rest and orphan defaults.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryJobStore::new());
        let settings = Arc::new(MemorySettings::new());
        settings.set(settings::SELECTED_PRINTER_NAME, PRINTER);
        let clock = Arc::new(ManualClock::new(start_time()));
        let printer = Arc::new(FakePrinter::default());
        let compositor = Arc::new(FakeCompositor::default());
        let collaborators = Collaborators {
            store: store.clone(),
            customers: store.clone(),
            compositor: compositor.clone(),
            printer: printer.clone(),
            settings: settings.clone(),
            clock: clock.clone(),
        };
        let dispatcher = Arc::new(Dispatcher::new(collaborators, dir.path().join("projects")));
        Self {
            dir,
            store,
            settings,
            clock,
            printer,
            compositor,
            dispatcher,
        }
    }

    pub fn projects(&self) -> PathBuf {
        self.dir.path().join("projects")
    }

    /// Create a source image file under the projects directory.
    pub fn touch(&self, relative: &str) -> PathBuf {
        let path = self.projects().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"jpeg").unwrap();
        path
    }

    /// Create and configure a stock photo outside the projects directory.
    pub fn with_stock_photo(&self) -> PathBuf {
        let path = self.dir.path().join("stock.jpg");
        std::fs::write(&path, b"stock").unwrap();
        self.settings
            .set(settings::STOCK_PHOTO_PATH, path.to_string_lossy().to_string());
        path
    }

    /// Queue a job whose source file exists, created `age_minutes` ago.
    pub async fn job(&self, customer_id: CustomerId, name: &str, size: PageSize, age_minutes: i64) -> PrintJob {
        self.touch(name);
        self.job_without_file(customer_id, name, size, age_minutes).await
    }

    pub async fn job_without_file(
        &self,
        customer_id: CustomerId,
        name: &str,
        size: PageSize,
        age_minutes: i64,
    ) -> PrintJob {
        let created_at = self.clock.now() - Duration::minutes(age_minutes);
        self.store
            .enqueue(NewPrintJob::new(customer_id, name, size, created_at))
            .await
            .unwrap()
    }

    pub async fn status_of(&self, job: &PrintJob) -> booth_print::job::JobStatus {
        self.store.get(job.id).await.unwrap().unwrap().status
    }
}
