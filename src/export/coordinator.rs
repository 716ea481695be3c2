use image::Rgba;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::encoder::{EncodeError, EncoderEvent, EncoderFactory, EncoderOptions};
use super::progress::ProgressReporter;
use super::Artifact;
use crate::cancel::CancelToken;
use crate::capture::FrameSequence;

/// Drives one encoder from creation to a single final artifact.
pub struct EncodeCoordinator {
    factory: Arc<dyn EncoderFactory>,
    workers: usize,
    quality: u8,
}

impl EncodeCoordinator {
    pub fn new(factory: Arc<dyn EncoderFactory>, workers: usize, quality: u8) -> Self {
        Self {
            factory,
            workers,
            quality,
        }
    }

    /// Resolves only on `Finished`. Any other terminal signal, a closed event
    /// stream, or cancellation fails the encode; nothing is retried.
    pub async fn encode(
        &self,
        frames: FrameSequence,
        width: u32,
        height: u32,
        background: Rgba<u8>,
        cancel: &CancelToken,
        mut on_progress: impl FnMut(u8),
    ) -> Result<Artifact, EncodeError> {
        if frames.is_empty() {
            return Err(EncodeError::NoFrames);
        }
        if cancel.is_cancelled() {
            return Err(EncodeError::Cancelled);
        }

        let options = EncoderOptions {
            workers: self.workers,
            quality: self.quality,
            width,
            height,
            background,
        };
        let mut encoder = self.factory.create(&options)?;

        let total = frames.len();
        for (index, frame) in frames.into_iter().enumerate() {
            let (image, delay) = frame.into_parts();
            encoder.add_frame(image, delay).map_err(|e| {
                warn!("Frame {} rejected: {}", index, e);
                e
            })?;
        }
        debug!("Added {} frames, rendering {}x{}", total, width, height);

        let mut render = encoder.render();
        let mut reporter = ProgressReporter::new();
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    render.abort();
                    return Err(EncodeError::Cancelled);
                }
                event = render.next_event() => event,
            };
            let Some(event) = event else {
                return Err(EncodeError::Disconnected);
            };
            if let Some(percent) = reporter.observe(&event) {
                on_progress(percent);
            }
            match event {
                EncoderEvent::Finished(artifact) => {
                    info!(
                        "Encoded {} frames into {} bytes",
                        artifact.frame_count(),
                        artifact.bytes().len()
                    );
                    return Ok(artifact);
                }
                EncoderEvent::Aborted => return Err(EncodeError::Aborted),
                EncoderEvent::Errored(reason) => return Err(EncodeError::Render(reason)),
                EncoderEvent::Started | EncoderEvent::Progress(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Frame;
    use crate::export::mock::{MockBehavior, MockFactory};
    use image::RgbaImage;
    use std::time::Duration;

    fn frames(count: usize) -> FrameSequence {
        (0..count)
            .map(|i| {
                Frame::new(
                    RgbaImage::from_pixel(2, 2, Rgba([i as u8, 0, 0, 255])),
                    Duration::from_millis(100),
                )
            })
            .collect::<Vec<_>>()
            .into()
    }

    fn coordinator(factory: &Arc<MockFactory>) -> EncodeCoordinator {
        EncodeCoordinator::new(factory.clone(), 2, 5)
    }

    #[tokio::test]
    async fn test_encode_adds_all_frames_before_render() {
        let factory = MockFactory::new(MockBehavior::Finish);
        let mut seen = Vec::new();

        let artifact = coordinator(&factory)
            .encode(frames(30), 2, 2, Rgba([26, 26, 26, 255]), &CancelToken::new(), |p| {
                seen.push(p)
            })
            .await
            .unwrap();

        assert_eq!(artifact.frame_count(), 30);
        let log = factory.log();
        assert_eq!(log.len(), 31);
        for (i, entry) in log.iter().take(30).enumerate() {
            assert_eq!(entry, &format!("add {}", i));
        }
        assert_eq!(log.last().map(String::as_str), Some("render"));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));

        let created = factory.options().unwrap();
        assert_eq!((created.workers, created.quality), (2, 5));
        assert_eq!((created.width, created.height), (2, 2));
    }

    #[tokio::test]
    async fn test_empty_sequence_is_rejected() {
        let factory = MockFactory::new(MockBehavior::Finish);
        let result = coordinator(&factory)
            .encode(frames(0), 2, 2, Rgba([0, 0, 0, 255]), &CancelToken::new(), |_| {})
            .await;
        assert_eq!(result.unwrap_err(), EncodeError::NoFrames);
        assert!(factory.log().is_empty());
    }

    #[tokio::test]
    async fn test_init_failure_never_renders() {
        let factory = MockFactory::new(MockBehavior::FailInit);
        let result = coordinator(&factory)
            .encode(frames(3), 2, 2, Rgba([0, 0, 0, 255]), &CancelToken::new(), |_| {})
            .await;
        assert!(matches!(result, Err(EncodeError::Init(_))));
        assert!(factory.log().is_empty());
    }

    #[tokio::test]
    async fn test_aborted_signal_fails_without_completion() {
        let factory = MockFactory::new(MockBehavior::Abort);
        let mut seen = Vec::new();
        let result = coordinator(&factory)
            .encode(frames(3), 2, 2, Rgba([0, 0, 0, 255]), &CancelToken::new(), |p| {
                seen.push(p)
            })
            .await;
        assert_eq!(result.unwrap_err(), EncodeError::Aborted);
        assert!(!seen.contains(&100));
    }

    #[tokio::test]
    async fn test_errored_signal_carries_reason() {
        let factory = MockFactory::new(MockBehavior::Error);
        let result = coordinator(&factory)
            .encode(frames(3), 2, 2, Rgba([0, 0, 0, 255]), &CancelToken::new(), |_| {})
            .await;
        match result {
            Err(EncodeError::Render(reason)) => assert!(reason.contains("palette")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_closed_stream_is_reported() {
        let factory = MockFactory::new(MockBehavior::Disconnect);
        let result = coordinator(&factory)
            .encode(frames(3), 2, 2, Rgba([0, 0, 0, 255]), &CancelToken::new(), |_| {})
            .await;
        assert_eq!(result.unwrap_err(), EncodeError::Disconnected);
    }

    #[tokio::test]
    async fn test_cancel_aborts_running_render() {
        let factory = MockFactory::new(MockBehavior::Hang);
        let cancel = CancelToken::new();

        let task = {
            let coordinator = coordinator(&factory);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                coordinator
                    .encode(frames(3), 2, 2, Rgba([0, 0, 0, 255]), &cancel, |_| {})
                    .await
            })
        };
        while !factory.log().iter().any(|e| e == "render") {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        assert_eq!(task.await.unwrap().unwrap_err(), EncodeError::Cancelled);
        assert!(factory.was_aborted());
    }
}
