use chrono::{DateTime, Local};
use image::Rgba;
use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::coordinator::EncodeCoordinator;
use super::encoder::{EncodeError, EncoderFactory};
use super::Artifact;
use crate::cancel::CancelToken;
use crate::capture::{CaptureError, CaptureTarget, FrameSampler, RasterOptions, Rasterizer};
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Sampling,
    Encoding,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Sampling | JobState::Encoding)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Jobs only move forward. Failing is allowed from either active state.
    pub fn can_advance_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Idle, JobState::Sampling)
                | (JobState::Sampling, JobState::Encoding)
                | (JobState::Sampling, JobState::Failed)
                | (JobState::Encoding, JobState::Succeeded)
                | (JobState::Encoding, JobState::Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Capture,
    Encode,
    Cancelled,
}

/// Why a job failed. Displays as the short user-facing reason; `detail`
/// carries the underlying error for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub detail: String,
}

impl FailureReason {
    fn new(kind: FailureKind, detail: impl fmt::Display) -> Self {
        Self {
            kind,
            detail: detail.to_string(),
        }
    }

    fn from_capture(err: CaptureError) -> Self {
        match err {
            CaptureError::Cancelled => Self::new(FailureKind::Cancelled, err),
            other => Self::new(FailureKind::Capture, other),
        }
    }

    fn from_encode(err: EncodeError) -> Self {
        match err {
            EncodeError::Cancelled => Self::new(FailureKind::Cancelled, err),
            other => Self::new(FailureKind::Encode, other),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.kind {
            FailureKind::Capture => "capture failed",
            FailureKind::Encode => "encode failed",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(reason)
    }
}

/// Record of one capture and encode cycle.
#[derive(Debug, Clone)]
pub struct CaptureJob {
    pub id: Uuid,
    pub started_at: DateTime<Local>,
    pub frame_count: usize,
    pub frame_delay: Duration,
    pub state: JobState,
    /// 0 to 100. Only reaches 100 when the job succeeds.
    pub progress: u8,
    pub artifact: Option<Artifact>,
    pub failure: Option<FailureReason>,
}

impl CaptureJob {
    fn new(options: &ExportOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Local::now(),
            frame_count: options.frame_count,
            frame_delay: options.frame_delay,
            state: JobState::Idle,
            progress: 0,
            artifact: None,
            failure: None,
        }
    }
}

pub type JobOutcome = Result<Artifact, FailureReason>;

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub frame_count: usize,
    pub frame_delay: Duration,
    pub warmup: Duration,
    pub workers: usize,
    pub quality: u8,
    pub background: Rgba<u8>,
    pub raster: RasterOptions,
}

impl ExportOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            frame_count: config.export.frame_count as usize,
            frame_delay: config.export.frame_delay(),
            warmup: config.export.warmup(),
            workers: config.export.workers,
            quality: config.export.quality,
            background: config.export.background_color(),
            raster: RasterOptions::from_config(config),
        }
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("an export is already running")]
    AlreadyRunning,
    #[error("the previous export result has not been collected")]
    ResultPending,
    #[error("at least one frame is required")]
    NoFrames,
}

/// Callbacks from the job task. They run on the runtime, not the UI thread.
pub trait ExportObserver: Send + Sync {
    fn on_progress(&self, _job: Uuid, _percent: u8) {}

    fn on_complete(&self, _job: Uuid, _artifact: &Artifact) {}

    fn on_error(&self, _job: Uuid, _reason: &FailureReason) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ExportObserver for NoopObserver {}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Progress(Uuid, u8),
    Completed(Uuid, Artifact),
    Failed(Uuid, FailureReason),
}

/// Forwards callbacks to a channel drained by a polling UI.
impl ExportObserver for Sender<SessionEvent> {
    fn on_progress(&self, job: Uuid, percent: u8) {
        let _ = self.send(SessionEvent::Progress(job, percent));
    }

    fn on_complete(&self, job: Uuid, artifact: &Artifact) {
        let _ = self.send(SessionEvent::Completed(job, artifact.clone()));
    }

    fn on_error(&self, job: Uuid, reason: &FailureReason) {
        let _ = self.send(SessionEvent::Failed(job, reason.clone()));
    }
}

struct Shared {
    job: Mutex<Option<CaptureJob>>,
    state: watch::Sender<JobState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Option<CaptureJob>> {
        self.job.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves the job forward; returns false when the transition is not allowed.
    fn advance(&self, id: Uuid, next: JobState, update: impl FnOnce(&mut CaptureJob)) -> bool {
        let mut guard = self.lock();
        let Some(job) = guard.as_mut().filter(|job| job.id == id) else {
            return false;
        };
        if !job.state.can_advance_to(next) {
            warn!("Job {} cannot move from {:?} to {:?}", id, job.state, next);
            return false;
        }
        update(job);
        job.state = next;
        self.state.send_replace(next);
        info!("Job {} -> {:?}", id, next);
        true
    }

    fn set_progress(&self, id: Uuid, percent: u8) {
        if let Some(job) = self.lock().as_mut().filter(|job| job.id == id) {
            job.progress = job.progress.max(percent);
        }
    }
}

/// Runs at most one capture and encode job at a time.
///
/// The terminal job is kept until `take_result` or `reset`; dropping the
/// session cancels a job that is still running.
pub struct ExportSession {
    runtime: Handle,
    rasterizer: Arc<dyn Rasterizer>,
    factory: Arc<dyn EncoderFactory>,
    observer: Arc<dyn ExportObserver>,
    shared: Arc<Shared>,
    cancel: Mutex<Option<CancelToken>>,
}

impl ExportSession {
    pub fn new(
        runtime: Handle,
        rasterizer: Arc<dyn Rasterizer>,
        factory: Arc<dyn EncoderFactory>,
        observer: Arc<dyn ExportObserver>,
    ) -> Self {
        let (state, _) = watch::channel(JobState::Idle);
        Self {
            runtime,
            rasterizer,
            factory,
            observer,
            shared: Arc::new(Shared {
                job: Mutex::new(None),
                state,
            }),
            cancel: Mutex::new(None),
        }
    }

    pub fn start(
        &self,
        target: Arc<dyn CaptureTarget>,
        options: ExportOptions,
    ) -> Result<Uuid, StartError> {
        if options.frame_count == 0 {
            return Err(StartError::NoFrames);
        }

        let id = {
            let mut guard = self.shared.lock();
            match guard.as_ref().map(|job| job.state) {
                Some(state) if state.is_active() => return Err(StartError::AlreadyRunning),
                Some(state) if state.is_terminal() => return Err(StartError::ResultPending),
                _ => {}
            }
            let mut job = CaptureJob::new(&options);
            job.state = JobState::Sampling;
            let id = job.id;
            *guard = Some(job);
            self.shared.state.send_replace(JobState::Sampling);
            id
        };
        info!(
            "Job {} started: {} frames every {:?}",
            id, options.frame_count, options.frame_delay
        );

        let cancel = CancelToken::new();
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = Some(cancel.clone());

        let job = JobTask {
            id,
            target,
            options,
            rasterizer: Arc::clone(&self.rasterizer),
            factory: Arc::clone(&self.factory),
            observer: Arc::clone(&self.observer),
            shared: Arc::clone(&self.shared),
            cancel,
        };
        self.runtime.spawn(job.run());
        Ok(id)
    }

    /// Cancels the running job, if any. It ends as Failed("cancelled").
    pub fn cancel(&self) {
        if let Some(cancel) = self.cancel.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            debug!("Cancelling export job");
            cancel.cancel();
        }
    }

    /// Consumes a terminal outcome and returns the session to Idle.
    pub fn take_result(&self) -> Option<JobOutcome> {
        let mut guard = self.shared.lock();
        if !guard.as_ref().is_some_and(|job| job.state.is_terminal()) {
            return None;
        }
        let job = guard.take()?;
        self.shared.state.send_replace(JobState::Idle);
        match (job.artifact, job.failure) {
            (Some(artifact), _) => Some(Ok(artifact)),
            (None, Some(reason)) => Some(Err(reason)),
            (None, None) => Some(Err(FailureReason::new(FailureKind::Encode, "no result"))),
        }
    }

    /// Discards a terminal outcome. Returns false while a job is running.
    pub fn reset(&self) -> bool {
        let mut guard = self.shared.lock();
        if guard.as_ref().is_some_and(|job| job.state.is_active()) {
            return false;
        }
        *guard = None;
        self.shared.state.send_replace(JobState::Idle);
        true
    }

    pub fn state(&self) -> JobState {
        *self.shared.state.borrow()
    }

    pub fn job(&self) -> Option<CaptureJob> {
        self.shared.lock().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.shared.state.subscribe()
    }
}

impl Drop for ExportSession {
    fn drop(&mut self) {
        if self.state().is_active() {
            self.cancel();
        }
    }
}

struct JobTask {
    id: Uuid,
    target: Arc<dyn CaptureTarget>,
    options: ExportOptions,
    rasterizer: Arc<dyn Rasterizer>,
    factory: Arc<dyn EncoderFactory>,
    observer: Arc<dyn ExportObserver>,
    shared: Arc<Shared>,
    cancel: CancelToken,
}

impl JobTask {
    async fn run(self) {
        match self.pipeline().await {
            Ok(artifact) => {
                let recorded = self.shared.advance(self.id, JobState::Succeeded, |job| {
                    job.progress = 100;
                    job.artifact = Some(artifact.clone());
                });
                if recorded {
                    self.observer.on_complete(self.id, &artifact);
                }
            }
            Err(reason) => {
                warn!("Job {} failed: {} ({})", self.id, reason, reason.detail);
                let recorded = self.shared.advance(self.id, JobState::Failed, |job| {
                    job.failure = Some(reason.clone());
                });
                if recorded {
                    self.observer.on_error(self.id, &reason);
                }
            }
        }
    }

    async fn pipeline(&self) -> Result<Artifact, FailureReason> {
        let options = &self.options;
        let sampler = FrameSampler::new(Arc::clone(&self.rasterizer), options.raster.clone())
            .with_warmup(options.warmup);
        let frames = sampler
            .sample(&self.target, options.frame_count, options.frame_delay, &self.cancel)
            .await
            .map_err(FailureReason::from_capture)?;

        if frames.len() != options.frame_count {
            return Err(FailureReason::new(
                FailureKind::Capture,
                format!("captured {} of {} frames", frames.len(), options.frame_count),
            ));
        }
        let Some((width, height)) = frames.dimensions() else {
            return Err(FailureReason::new(FailureKind::Capture, "no frames captured"));
        };

        if !self.shared.advance(self.id, JobState::Encoding, |_| {}) {
            return Err(FailureReason::new(FailureKind::Cancelled, "job was discarded"));
        }

        let coordinator =
            EncodeCoordinator::new(Arc::clone(&self.factory), options.workers, options.quality);
        coordinator
            .encode(
                frames,
                width,
                height,
                options.background,
                &self.cancel,
                |percent| {
                    self.shared.set_progress(self.id, percent);
                    self.observer.on_progress(self.id, percent);
                },
            )
            .await
            .map_err(FailureReason::from_encode)
    }
}
