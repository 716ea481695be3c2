use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{CaptureError, CaptureTarget, Frame, FrameSequence, RasterOptions, Rasterizer};
use crate::cancel::CancelToken;

/// Samples a live target at a fixed cadence.
///
/// Frames are rasterized one at a time: the target is read at the moment of
/// rasterization, so overlapping reads would capture the same visual moment
/// twice.
pub struct FrameSampler {
    rasterizer: Arc<dyn Rasterizer>,
    options: RasterOptions,
    warmup: Duration,
}

impl FrameSampler {
    pub fn new(rasterizer: Arc<dyn Rasterizer>, options: RasterOptions) -> Self {
        Self {
            rasterizer,
            options,
            warmup: Duration::ZERO,
        }
    }

    /// Time to let the target's own animation settle before the first frame.
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub async fn sample(
        &self,
        target: &Arc<dyn CaptureTarget>,
        frame_count: usize,
        delay: Duration,
        cancel: &CancelToken,
    ) -> Result<FrameSequence, CaptureError> {
        self.prepare(target, cancel).await?;
        pause(self.warmup, cancel).await?;

        let mut frames = Vec::with_capacity(frame_count);
        for index in 0..frame_count {
            if cancel.is_cancelled() {
                return Err(CaptureError::Cancelled);
            }
            let started = Instant::now();
            debug!("Capturing frame {}/{}", index + 1, frame_count);

            let layout = target.snapshot().ok_or(CaptureError::TargetUnavailable)?;
            let rasterizer = Arc::clone(&self.rasterizer);
            let options = self.options.clone();
            let image = tokio::task::spawn_blocking(move || rasterizer.rasterize(&layout, &options))
                .await
                .map_err(|e| CaptureError::Rasterize {
                    frame: index,
                    reason: e.to_string(),
                })?
                .map_err(|e| CaptureError::Rasterize {
                    frame: index,
                    reason: format!("{e:#}"),
                })?;
            frames.push(Frame::new(image, delay));

            if index + 1 < frame_count {
                pause(delay.saturating_sub(started.elapsed()), cancel).await?;
            }
        }

        info!("Captured {} frames", frames.len());
        Ok(FrameSequence::from(frames))
    }
}

impl FrameSampler {
    /// Lets the rasterizer load external content once, so slow loads never
    /// land between two frames.
    async fn prepare(&self, target: &Arc<dyn CaptureTarget>, cancel: &CancelToken) -> Result<(), CaptureError> {
        let Some(layout) = target.snapshot() else {
            return Ok(());
        };
        let rasterizer = Arc::clone(&self.rasterizer);
        let options = self.options.clone();
        let task = tokio::task::spawn_blocking(move || rasterizer.prepare(&layout, &options));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CaptureError::Cancelled),
            joined = task => {
                if let Err(e) = joined {
                    warn!("Preparing the capture target failed: {}", e);
                }
                Ok(())
            }
        }
    }
}

async fn pause(duration: Duration, cancel: &CancelToken) -> Result<(), CaptureError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CaptureError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
