//! Test doubles shared by the export tests.

use anyhow::anyhow;
use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use super::encoder::{
    Artifact, EncodeError, Encoder, EncoderEvent, EncoderFactory, EncoderOptions, RenderHandle,
};
use crate::capture::{CaptureTarget, RasterOptions, Rasterizer};
use crate::train::{Train, TrainCar, TrainLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// One progress signal per frame, then `Finished`.
    Finish,
    FailInit,
    Abort,
    Error,
    /// Closes the stream without a terminal signal.
    Disconnect,
    /// Reports half done, then keeps the stream open until the test ends.
    Hang,
}

#[derive(Default)]
struct Shared {
    log: Vec<String>,
    options: Option<EncoderOptions>,
    held: Vec<UnboundedSender<EncoderEvent>>,
}

pub struct MockFactory {
    behavior: MockBehavior,
    shared: Arc<Mutex<Shared>>,
    abort: Arc<AtomicBool>,
}

impl MockFactory {
    pub fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            shared: Arc::new(Mutex::new(Shared::default())),
            abort: Arc::new(AtomicBool::new(false)),
        })
    }

    /// "add N" per frame and "render", in call order.
    pub fn log(&self) -> Vec<String> {
        self.shared.lock().unwrap().log.clone()
    }

    pub fn options(&self) -> Option<EncoderOptions> {
        self.shared.lock().unwrap().options.clone()
    }

    pub fn was_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}

impl EncoderFactory for MockFactory {
    fn create(&self, options: &EncoderOptions) -> Result<Box<dyn Encoder>, EncodeError> {
        if self.behavior == MockBehavior::FailInit {
            return Err(EncodeError::Init(String::from("no worker script")));
        }
        self.shared.lock().unwrap().options = Some(options.clone());
        Ok(Box::new(MockEncoder {
            behavior: self.behavior,
            shared: Arc::clone(&self.shared),
            abort: Arc::clone(&self.abort),
            options: options.clone(),
            frames: 0,
        }))
    }
}

struct MockEncoder {
    behavior: MockBehavior,
    shared: Arc<Mutex<Shared>>,
    abort: Arc<AtomicBool>,
    options: EncoderOptions,
    frames: usize,
}

impl Encoder for MockEncoder {
    fn add_frame(&mut self, _image: RgbaImage, _delay: Duration) -> Result<(), EncodeError> {
        let entry = format!("add {}", self.frames);
        self.shared.lock().unwrap().log.push(entry);
        self.frames += 1;
        Ok(())
    }

    fn render(self: Box<Self>) -> RenderHandle {
        let (tx, rx) = unbounded_channel();
        self.shared.lock().unwrap().log.push(String::from("render"));
        let _ = tx.send(EncoderEvent::Started);
        match self.behavior {
            MockBehavior::Finish => {
                for i in 1..=self.frames {
                    let _ = tx.send(EncoderEvent::Progress(i as f32 / self.frames as f32));
                }
                let artifact = Artifact::new(
                    b"GIF89a".to_vec(),
                    self.options.width,
                    self.options.height,
                    self.frames,
                );
                let _ = tx.send(EncoderEvent::Finished(artifact));
            }
            MockBehavior::Abort => {
                let _ = tx.send(EncoderEvent::Progress(0.5));
                let _ = tx.send(EncoderEvent::Aborted);
            }
            MockBehavior::Error => {
                let _ = tx.send(EncoderEvent::Errored(String::from("palette overflow")));
            }
            MockBehavior::Disconnect => {}
            MockBehavior::Hang => {
                let _ = tx.send(EncoderEvent::Progress(0.5));
                self.shared.lock().unwrap().held.push(tx);
            }
            MockBehavior::FailInit => {}
        }
        RenderHandle::new(rx, Arc::clone(&self.abort))
    }
}

/// A fixed one-car train.
pub struct StaticTarget {
    available: AtomicBool,
}

impl StaticTarget {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            available: AtomicBool::new(true),
        })
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl CaptureTarget for StaticTarget {
    fn snapshot(&self) -> Option<TrainLayout> {
        if !self.available.load(Ordering::SeqCst) {
            return None;
        }
        TrainCar::text("hello")
            .and_then(|car| Train::new(vec![car]))
            .ok()
            .map(|train| train.layout(0))
    }
}

/// Solid 4x3 frames; fails on call `fail_on` (1-based).
pub struct SolidRasterizer {
    calls: AtomicUsize,
    fail_on: Option<usize>,
}

impl SolidRasterizer {
    pub fn new(fail_on: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_on,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Rasterizer for SolidRasterizer {
    fn rasterize(&self, _layout: &TrainLayout, options: &RasterOptions) -> anyhow::Result<RgbaImage> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if Some(call) == self.fail_on {
            return Err(anyhow!("canvas tainted"));
        }
        let Rgba([r, g, b, _]) = options.background;
        Ok(RgbaImage::from_pixel(4, 3, Rgba([r, g, b, 255])))
    }
}
