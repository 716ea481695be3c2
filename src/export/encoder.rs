use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::ARTIFACT_FILE_NAME;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("encoder failed to initialize: {0}")]
    Init(String),
    #[error("encoder rejected frame {index}: {reason}")]
    FrameRejected { index: usize, reason: String },
    #[error("no frames to encode")]
    NoFrames,
    #[error("encoder aborted")]
    Aborted,
    #[error("encoder failed: {0}")]
    Render(String),
    #[error("encoder stopped without producing a result")]
    Disconnected,
    #[error("encoding cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncoderOptions {
    pub workers: usize,
    /// 1 (best palette) to 30 (fastest).
    pub quality: u8,
    pub width: u32,
    pub height: u32,
    pub background: Rgba<u8>,
}

/// The encoded animation. Clones share the same bytes.
#[derive(Debug, Clone)]
pub struct Artifact {
    id: Uuid,
    bytes: Arc<[u8]>,
    width: u32,
    height: u32,
    frame_count: usize,
}

impl Artifact {
    pub fn new(bytes: Vec<u8>, width: u32, height: u32, frame_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            bytes: Arc::from(bytes),
            width,
            height,
            frame_count,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn file_name(&self) -> &'static str {
        ARTIFACT_FILE_NAME
    }
}

#[derive(Debug, Clone)]
pub enum EncoderEvent {
    Started,
    /// Fraction of the work done, 0.0 to 1.0.
    Progress(f32),
    Aborted,
    Finished(Artifact),
    Errored(String),
}

/// Signals from a running render plus the means to abort it.
pub struct RenderHandle {
    events: mpsc::UnboundedReceiver<EncoderEvent>,
    abort: Arc<AtomicBool>,
}

impl RenderHandle {
    pub fn new(events: mpsc::UnboundedReceiver<EncoderEvent>, abort: Arc<AtomicBool>) -> Self {
        Self { events, abort }
    }

    /// `None` once the encoder has dropped its side of the stream.
    pub async fn next_event(&mut self) -> Option<EncoderEvent> {
        self.events.recv().await
    }

    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }
}

/// Assembles frames into one animation. Frames can only be added before
/// `render`, which consumes the encoder.
pub trait Encoder: Send {
    fn add_frame(&mut self, image: RgbaImage, delay: Duration) -> Result<(), EncodeError>;

    fn render(self: Box<Self>) -> RenderHandle;
}

pub trait EncoderFactory: Send + Sync {
    fn create(&self, options: &EncoderOptions) -> Result<Box<dyn Encoder>, EncodeError>;
}
