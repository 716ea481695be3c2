use anyhow::{anyhow, Result};
use gif::{Frame as GifFrame, Repeat};
use image::{imageops, Rgba, RgbaImage};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, warn};

use super::encoder::{
    Artifact, EncodeError, Encoder, EncoderEvent, EncoderFactory, EncoderOptions, RenderHandle,
};

const MAX_FRAMES: usize = 1000;
const MAX_GIF_DIMENSION: u32 = 4096;
const MAX_WORKERS: usize = 8;
const MIN_DELAY_CS: u16 = 2;
const ABORT_POLL: Duration = Duration::from_millis(50);

type QueuedFrame = (usize, (RgbaImage, Duration));

#[derive(Debug, Default, Clone, Copy)]
pub struct GifEncoderFactory;

impl EncoderFactory for GifEncoderFactory {
    fn create(&self, options: &EncoderOptions) -> Result<Box<dyn Encoder>, EncodeError> {
        Ok(Box::new(GifEncoder::new(options.clone())?))
    }
}

/// Looping GIF encoder. Palette quantization runs on a pool of worker
/// threads; frames are written strictly in the order they were added.
pub struct GifEncoder {
    options: EncoderOptions,
    frames: Vec<(RgbaImage, Duration)>,
}

impl GifEncoder {
    pub fn new(mut options: EncoderOptions) -> Result<Self, EncodeError> {
        if options.width == 0 || options.height == 0 {
            return Err(EncodeError::Init(String::from("Image has zero dimension")));
        }
        if options.width > MAX_GIF_DIMENSION || options.height > MAX_GIF_DIMENSION {
            return Err(EncodeError::Init(String::from(
                "Image dimensions exceed GIF safety limit",
            )));
        }
        options.workers = options.workers.clamp(1, MAX_WORKERS);
        options.quality = options.quality.clamp(1, 30);
        Ok(Self {
            options,
            frames: Vec::new(),
        })
    }
}

impl Encoder for GifEncoder {
    fn add_frame(&mut self, image: RgbaImage, delay: Duration) -> Result<(), EncodeError> {
        let index = self.frames.len();
        if index >= MAX_FRAMES {
            return Err(EncodeError::FrameRejected {
                index,
                reason: format!("at most {} frames per animation", MAX_FRAMES),
            });
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(EncodeError::FrameRejected {
                index,
                reason: String::from("Image has zero dimension"),
            });
        }
        self.frames.push((image, delay));
        Ok(())
    }

    fn render(self: Box<Self>) -> RenderHandle {
        let (tx, rx) = unbounded_channel();
        let abort = Arc::new(AtomicBool::new(false));
        let GifEncoder { options, frames } = *self;

        let render_tx = tx.clone();
        let render_abort = Arc::clone(&abort);
        let spawned = thread::Builder::new()
            .name(String::from("gif-render"))
            .spawn(move || {
                let event = match render_gif(frames, &options, &render_tx, &render_abort) {
                    Ok(Some(artifact)) => EncoderEvent::Finished(artifact),
                    Ok(None) => EncoderEvent::Aborted,
                    Err(e) => {
                        warn!("GIF render failed: {:#}", e);
                        EncoderEvent::Errored(e.to_string())
                    }
                };
                let _ = render_tx.send(event);
            });
        if let Err(e) = spawned {
            let _ = tx.send(EncoderEvent::Errored(format!("Failed to start render thread: {}", e)));
        }

        RenderHandle::new(rx, abort)
    }
}

/// Returns `Ok(None)` when aborted.
fn render_gif(
    frames: Vec<(RgbaImage, Duration)>,
    options: &EncoderOptions,
    events: &UnboundedSender<EncoderEvent>,
    abort: &Arc<AtomicBool>,
) -> Result<Option<Artifact>> {
    let total = frames.len();
    if total == 0 {
        return Err(anyhow!("No frames captured"));
    }
    let width = u16::try_from(options.width).map_err(|_| anyhow!("Image too wide for GIF"))?;
    let height = u16::try_from(options.height).map_err(|_| anyhow!("Image too tall for GIF"))?;

    let _ = events.send(EncoderEvent::Started);

    let queue: Arc<Mutex<VecDeque<QueuedFrame>>> =
        Arc::new(Mutex::new(frames.into_iter().enumerate().collect()));
    let (result_tx, result_rx) = channel::<(usize, GifFrame<'static>)>();

    let workers = options.workers.clamp(1, total);
    debug!("Encoding {} frames on {} workers", total, workers);
    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let queue = Arc::clone(&queue);
        let result_tx = result_tx.clone();
        let abort = Arc::clone(abort);
        let options = options.clone();
        let handle = thread::Builder::new()
            .name(format!("gif-worker-{}", worker))
            .spawn(move || loop {
                if abort.load(Ordering::SeqCst) {
                    break;
                }
                let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
                let Some((index, (image, delay))) = next else {
                    break;
                };
                let frame = quantize(image, delay, &options);
                if result_tx.send((index, frame)).is_err() {
                    break;
                }
            })?;
        handles.push(handle);
    }
    drop(result_tx);

    let mut output = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut output, width, height, &[])?;
        encoder.set_repeat(Repeat::Infinite)?;

        let mut pending = BTreeMap::new();
        let mut next = 0;
        while next < total {
            if abort.load(Ordering::SeqCst) {
                return Ok(None);
            }
            match result_rx.recv_timeout(ABORT_POLL) {
                Ok((index, frame)) => {
                    pending.insert(index, frame);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    if abort.load(Ordering::SeqCst) {
                        return Ok(None);
                    }
                    return Err(anyhow!("Encoder workers stopped after {} of {} frames", next, total));
                }
            }
            while let Some(frame) = pending.remove(&next) {
                encoder.write_frame(&frame)?;
                next += 1;
                let _ = events.send(EncoderEvent::Progress(next as f32 / total as f32));
            }
        }
    }

    for handle in handles {
        let _ = handle.join();
    }

    Ok(Some(Artifact::new(output, options.width, options.height, total)))
}

fn quantize(image: RgbaImage, delay: Duration, options: &EncoderOptions) -> GifFrame<'static> {
    let image = if image.dimensions() != (options.width, options.height) {
        imageops::resize(
            &image,
            options.width,
            options.height,
            imageops::FilterType::Nearest,
        )
    } else {
        image
    };
    let mut pixels = flatten(image, options.background).into_raw();
    let mut frame = GifFrame::from_rgba_speed(
        options.width as u16,
        options.height as u16,
        &mut pixels,
        options.quality as i32,
    );
    frame.delay = delay_centis(delay);
    frame
}

/// Composites the image over an opaque background.
fn flatten(mut image: RgbaImage, background: Rgba<u8>) -> RgbaImage {
    for pixel in image.pixels_mut() {
        let a = pixel[3] as u32;
        if a == 255 {
            continue;
        }
        for c in 0..3 {
            pixel[c] = ((pixel[c] as u32 * a + background[c] as u32 * (255 - a)) / 255) as u8;
        }
        pixel[3] = 255;
    }
    image
}

/// GIF delays are in hundredths of a second.
fn delay_centis(delay: Duration) -> u16 {
    let centis = (delay.as_millis() + 5) / 10;
    centis.clamp(MIN_DELAY_CS as u128, u16::MAX as u128) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn options(width: u32, height: u32, workers: usize) -> EncoderOptions {
        EncoderOptions {
            workers,
            quality: 10,
            width,
            height,
            background: Rgba([26, 26, 26, 255]),
        }
    }

    fn solid(color: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba([color[0], color[1], color[2], 255]))
    }

    async fn collect(mut handle: RenderHandle) -> Vec<EncoderEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            let terminal = matches!(
                event,
                EncoderEvent::Finished(_) | EncoderEvent::Aborted | EncoderEvent::Errored(_)
            );
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    #[test]
    fn test_delay_centis() {
        assert_eq!(delay_centis(Duration::from_millis(100)), 10);
        assert_eq!(delay_centis(Duration::from_millis(66)), 7);
        assert_eq!(delay_centis(Duration::from_millis(0)), MIN_DELAY_CS);
    }

    #[test]
    fn test_flatten_over_background() {
        let mut image = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 0]));
        image = flatten(image, Rgba([10, 20, 30, 255]));
        assert_eq!(*image.get_pixel(0, 0), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_rejects_invalid_dimensions() {
        assert!(matches!(GifEncoder::new(options(0, 10, 2)), Err(EncodeError::Init(_))));
        assert!(matches!(
            GifEncoder::new(options(MAX_GIF_DIMENSION + 1, 10, 2)),
            Err(EncodeError::Init(_))
        ));
    }

    #[tokio::test]
    async fn test_render_keeps_frame_order_across_workers() {
        let colors = [[255, 0, 0], [0, 255, 0], [0, 0, 255], [255, 255, 0], [0, 255, 255]];
        let mut encoder = GifEncoderFactory.create(&options(4, 4, 2)).unwrap();
        for color in colors {
            encoder.add_frame(solid(color), Duration::from_millis(100)).unwrap();
        }

        let events = collect(encoder.render()).await;
        assert!(matches!(events.first(), Some(EncoderEvent::Started)));
        let fractions: Vec<f32> = events
            .iter()
            .filter_map(|e| match e {
                EncoderEvent::Progress(f) => Some(*f),
                _ => None,
            })
            .collect();
        assert_eq!(fractions.len(), colors.len());
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(fractions.last().copied(), Some(1.0));

        let artifact = match events.last() {
            Some(EncoderEvent::Finished(artifact)) => artifact.clone(),
            other => panic!("unexpected terminal event: {other:?}"),
        };
        assert_eq!(artifact.frame_count(), colors.len());
        assert_eq!(artifact.file_name(), "zaamurets-train.gif");
        assert!(artifact.bytes().starts_with(b"GIF89a"));

        let mut decode = gif::DecodeOptions::new();
        decode.set_color_output(gif::ColorOutput::RGBA);
        let mut decoder = decode.read_info(Cursor::new(artifact.bytes().to_vec())).unwrap();
        let mut decoded = Vec::new();
        while let Some(frame) = decoder.read_next_frame().unwrap() {
            assert_eq!(frame.delay, 10);
            decoded.push([frame.buffer[0], frame.buffer[1], frame.buffer[2]]);
        }
        assert_eq!(decoded.len(), colors.len());
        for (got, want) in decoded.iter().zip(colors) {
            for c in 0..3 {
                assert!((got[c] as i32 - want[c] as i32).abs() <= 8, "{got:?} vs {want:?}");
            }
        }
    }

    #[tokio::test]
    async fn test_mismatched_frames_are_resized() {
        let mut encoder = GifEncoderFactory.create(&options(8, 6, 1)).unwrap();
        encoder.add_frame(solid([9, 9, 9]), Duration::from_millis(50)).unwrap();
        let events = collect(encoder.render()).await;
        match events.last() {
            Some(EncoderEvent::Finished(artifact)) => assert_eq!(artifact.dimensions(), (8, 6)),
            other => panic!("unexpected terminal event: {other:?}"),
        }
    }

    #[test]
    fn test_render_reports_abort() {
        let (tx, _rx) = unbounded_channel();
        let abort = Arc::new(AtomicBool::new(true));
        let frames = vec![(solid([1, 2, 3]), Duration::from_millis(100)); 3];
        let result = render_gif(frames, &options(4, 4, 2), &tx, &abort).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_render_without_frames_fails() {
        let (tx, _rx) = unbounded_channel();
        let abort = Arc::new(AtomicBool::new(false));
        assert!(render_gif(Vec::new(), &options(4, 4, 2), &tx, &abort).is_err());
    }
}
