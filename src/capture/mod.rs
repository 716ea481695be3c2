mod glyph;
mod remote;
mod sampler;

pub use glyph::GlyphRasterizer;
pub use sampler::FrameSampler;

use anyhow::Result;
use image::{Rgba, RgbaImage};
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::train::TrainLayout;

/// A live visual region that can be read at any moment.
pub trait CaptureTarget: Send + Sync {
    /// The region as it looks right now, or `None` when it is not available.
    fn snapshot(&self) -> Option<TrainLayout>;
}

/// Turns a snapshot of the region into a still bitmap.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, layout: &TrainLayout, options: &RasterOptions) -> Result<RgbaImage>;

    /// Loads what the layout refers to, such as remote badge images, before
    /// any frame is taken. Anything that cannot be loaded falls back to its
    /// plain rendering.
    fn prepare(&self, _layout: &TrainLayout, _options: &RasterOptions) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterOptions {
    pub background: Rgba<u8>,
    pub foreground: Rgba<u8>,
    /// Forces the canvas width; the natural width is used when unset.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub padding: u32,
    /// Draw badge images. When false every badge is drawn as its alt text.
    pub embed_images: bool,
}

impl RasterOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            background: config.export.background_color(),
            foreground: config.render.foreground_color(),
            width: None,
            height: None,
            padding: config.render.padding,
            embed_images: config.render.embed_images,
        }
    }
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("capture target is not available")]
    TargetUnavailable,
    #[error("rasterizing frame {frame} failed: {reason}")]
    Rasterize { frame: usize, reason: String },
    #[error("capture cancelled")]
    Cancelled,
}

/// One captured still and how long it is shown.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbaImage,
    delay: Duration,
}

impl Frame {
    pub fn new(image: RgbaImage, delay: Duration) -> Self {
        Self { image, delay }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn into_parts(self) -> (RgbaImage, Duration) {
        (self.image, self.delay)
    }
}

/// Frames in capture order, which is also playback order.
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    frames: Vec<Frame>,
}

impl FrameSequence {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Size of the first frame.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.frames.first().map(|f| f.image.dimensions())
    }
}

impl From<Vec<Frame>> for FrameSequence {
    fn from(frames: Vec<Frame>) -> Self {
        Self { frames }
    }
}

impl IntoIterator for FrameSequence {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}
