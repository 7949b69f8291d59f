//! The two operations a front end drives: scanning a disc and ripping one
//! title from it.
//!
//! A [`Ripper`] owns the tool registry and the three controllers. It runs at
//! most one rip at a time: starting a rip cancels whichever rip it started
//! before and waits for that rip to release the drive.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use dr_av::{
    CaptureController, CaptureTimings, RawFile, RemuxController, TitleScanner, ToolInfo,
    ToolRegistry,
};
use dr_core::{Error, LogSink, ProgressSender, Title};

use crate::config::Config;

/// One rip request and the raw file it owns.
///
/// Dropping the job removes the raw file.
#[derive(Debug)]
pub struct RipJob {
    pub device: String,
    pub title: u32,
    pub output: PathBuf,
    raw: RawFile,
}

impl RipJob {
    /// Validate the request and reserve a raw file in `temp_dir`.
    pub fn new(device: &str, title: u32, output: &Path, temp_dir: &Path) -> dr_core::Result<Self> {
        if device.trim().is_empty() {
            return Err(Error::Validation("device cannot be empty".into()));
        }
        if title == 0 {
            return Err(Error::Validation("title numbers start at 1".into()));
        }
        if output.as_os_str().is_empty() {
            return Err(Error::Validation("output path cannot be empty".into()));
        }

        Ok(Self {
            device: device.to_string(),
            title,
            output: output.to_path_buf(),
            raw: RawFile::new_in(temp_dir)?,
        })
    }

    pub fn raw_path(&self) -> &Path {
        self.raw.path()
    }

    /// Remove the raw file.
    pub fn finish(self) -> dr_core::Result<()> {
        self.raw.close()
    }
}

/// Front-end facade over the scanner and the capture/remux pipeline.
#[derive(Debug)]
pub struct Ripper {
    tools: Arc<ToolRegistry>,
    scanner: TitleScanner,
    capture: CaptureController,
    remux: RemuxController,
    temp_dir: PathBuf,
    next_job: AtomicU64,
    active: Mutex<Option<(u64, CancellationToken)>>,
    /// Held for the whole of a job; only one capture touches the drive.
    drive: tokio::sync::Mutex<()>,
}

impl Ripper {
    pub fn new(tools: Arc<ToolRegistry>, temp_dir: PathBuf) -> Self {
        Self {
            scanner: TitleScanner::new(tools.clone()),
            capture: CaptureController::new(tools.clone()),
            remux: RemuxController::new(tools.clone()),
            tools,
            temp_dir,
            next_job: AtomicU64::new(1),
            active: Mutex::new(None),
            drive: tokio::sync::Mutex::new(()),
        }
    }

    /// Discover tools per `config.tools` and use `config.rip.temp_dir`.
    pub fn from_config(config: &Config) -> Self {
        let tools = Arc::new(ToolRegistry::discover(&config.tools));
        Self::new(tools, config.rip.temp_dir())
    }

    /// Replace the capture timings (stall threshold, poll interval).
    pub fn with_capture_timings(mut self, timings: CaptureTimings) -> Self {
        self.capture = CaptureController::with_timings(self.tools.clone(), timings);
        self
    }

    pub fn check_tools(&self) -> Vec<ToolInfo> {
        self.tools.check_all()
    }

    /// List the titles on `device`, sorted by number.
    ///
    /// An empty list is a valid result; only cancellation is an error.
    pub async fn scan_titles(
        &self,
        device: &str,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<Vec<Title>> {
        self.scanner.scan(device, log, cancel).await
    }

    /// Rip `title` from `device` into `output`.
    ///
    /// Any rip previously started through this `Ripper` is cancelled first,
    /// and this one starts only after it has finished. The raw capture file is removed on every exit path. Progress is left
    /// at its last reported value; callers decide whether to show 100% on
    /// success.
    pub async fn rip(
        &self,
        device: &str,
        title: u32,
        output: &Path,
        progress: &ProgressSender,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<()> {
        let (job_id, token) = self.supersede(cancel, log);
        let result = async {
            let _drive = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Error::Cancelled),
                guard = self.drive.lock() => guard,
            };
            self.run_job(device, title, output, progress, log, &token).await
        }
        .await;
        self.release(job_id);

        match &result {
            Ok(()) => log.info(format!("Title {title} saved to {}", output.display())),
            Err(Error::Cancelled) => log.error(format!("Rip of title {title} cancelled")),
            Err(e) => log.error(format!("Rip of title {title} failed: {e}")),
        }
        result
    }

    async fn run_job(
        &self,
        device: &str,
        title: u32,
        output: &Path,
        progress: &ProgressSender,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<()> {
        let job = RipJob::new(device, title, output, &self.temp_dir)?;
        log.info(format!(
            "Ripping title {title} from {device} to {}",
            output.display()
        ));
        log.debug(format!("Raw capture file: {}", job.raw_path().display()));

        let result = self.capture_and_remux(&job, progress, log, cancel).await;

        let raw_path = job.raw_path().to_path_buf();
        if let Err(e) = job.finish() {
            log.error(format!("Failed to remove {}: {e}", raw_path.display()));
        }
        result
    }

    async fn capture_and_remux(
        &self,
        job: &RipJob,
        progress: &ProgressSender,
        log: &LogSink,
        cancel: &CancellationToken,
    ) -> dr_core::Result<()> {
        self.capture
            .capture(&job.device, job.title, job.raw_path(), progress, log, cancel)
            .await?;
        self.remux
            .remux(job.raw_path(), &job.output, log, cancel)
            .await
    }

    /// Cancel the previous job, if any, and register a new one whose token
    /// is a child of `cancel`.
    fn supersede(&self, cancel: &CancellationToken, log: &LogSink) -> (u64, CancellationToken) {
        let id = self.next_job.fetch_add(1, Ordering::Relaxed);
        let token = cancel.child_token();

        let mut active = self.active.lock();
        if let Some((prev_id, prev)) = active.replace((id, token.clone())) {
            if !prev.is_cancelled() {
                log.info(format!("Cancelling in-flight rip job {prev_id}"));
                prev.cancel();
            }
        }
        (id, token)
    }

    fn release(&self, id: u64) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|(active_id, _)| *active_id == id) {
            *active = None;
        }
    }
}
