use anyhow::{anyhow, Context, Result};
use fontdue::{Font, FontSettings, Metrics};
use image::{imageops, Rgba, RgbaImage};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::remote::BadgeFetcher;
use super::{RasterOptions, Rasterizer};
use crate::config::RenderConfig;
use crate::train::{Badge, BadgeSource, CarContent, ContentSlot, TrainLayout};

const MAX_CANVAS_DIMENSION: u32 = 4096;
const BADGE_MARGIN: u32 = 2;

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu-sans-mono-fonts/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
    "/usr/share/fonts/liberation-mono/LiberationMono-Regular.ttf",
    "/usr/share/fonts/truetype/ubuntu/UbuntuMono-R.ttf",
    "/Library/Fonts/Courier New.ttf",
    "/System/Library/Fonts/Supplemental/Courier New.ttf",
    "C:\\Windows\\Fonts\\consola.ttf",
    "C:\\Windows\\Fonts\\cour.ttf",
];

struct Glyph {
    metrics: Metrics,
    coverage: Vec<u8>,
}

enum Piece {
    Image(Arc<RgbaImage>),
    Text(String),
}

/// Draws a train layout on a fixed character grid with a monospace font.
pub struct GlyphRasterizer {
    font: Font,
    size: f32,
    cell_width: u32,
    line_height: u32,
    ascent: f32,
    glyphs: Mutex<HashMap<char, Arc<Glyph>>>,
    /// `None` marks a badge that failed to load; it is not retried.
    badges: Mutex<HashMap<BadgeSource, Option<Arc<RgbaImage>>>>,
}

impl GlyphRasterizer {
    pub fn from_bytes(bytes: Vec<u8>, size: f32) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| anyhow!("Failed to parse font: {}", e))?;
        let line = font
            .horizontal_line_metrics(size)
            .ok_or_else(|| anyhow!("Font has no horizontal metrics"))?;
        let cell_width = font.metrics('M', size).advance_width.ceil().max(1.0) as u32;
        let line_height = line.new_line_size.ceil().max(1.0) as u32;

        Ok(Self {
            font,
            size,
            cell_width,
            line_height,
            ascent: line.ascent,
            glyphs: Mutex::new(HashMap::new()),
            badges: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_file(path: &Path, size: f32) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read font {}", path.display()))?;
        Self::from_bytes(bytes, size)
    }

    /// First monospace font found among common system locations.
    pub fn system_default(size: f32) -> Result<Self> {
        for candidate in FONT_CANDIDATES {
            let path = Path::new(candidate);
            if !path.is_file() {
                continue;
            }
            match Self::from_file(path, size) {
                Ok(rasterizer) => {
                    debug!("Using font {}", path.display());
                    return Ok(rasterizer);
                }
                Err(e) => warn!("Skipping font {}: {:#}", path.display(), e),
            }
        }
        Err(anyhow!("No monospace font found; set render.font_path"))
    }

    pub fn from_config(render: &RenderConfig) -> Result<Self> {
        match &render.font_path {
            Some(path) => Self::from_file(path, render.font_size),
            None => Self::system_default(render.font_size),
        }
    }

    pub fn cell_size(&self) -> (u32, u32) {
        (self.cell_width, self.line_height)
    }

    pub fn canvas_size(&self, layout: &TrainLayout, options: &RasterOptions) -> (u32, u32) {
        let natural_w = layout.columns() as u32 * self.cell_width + options.padding * 2;
        let natural_h = layout.rows.len() as u32 * self.line_height + options.padding * 2;
        let width = options.width.unwrap_or(natural_w);
        let height = options.height.unwrap_or(natural_h);
        (
            width.clamp(1, MAX_CANVAS_DIMENSION),
            height.clamp(1, MAX_CANVAS_DIMENSION),
        )
    }

    fn glyph(&self, c: char) -> Arc<Glyph> {
        let mut cache = self.glyphs.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .entry(c)
            .or_insert_with(|| {
                let (metrics, coverage) = self.font.rasterize(c, self.size);
                Arc::new(Glyph { metrics, coverage })
            })
            .clone()
    }

    /// Local files load on first use. Remote images are only ever read from
    /// the cache, which `prepare` fills.
    fn badge_image(&self, source: &BadgeSource) -> Option<Arc<RgbaImage>> {
        let mut cache = self.badges.lock().unwrap_or_else(|e| e.into_inner());
        match source {
            BadgeSource::File(path) => cache
                .entry(source.clone())
                .or_insert_with(|| match image::open(path) {
                    Ok(img) => Some(Arc::new(img.to_rgba8())),
                    Err(e) => {
                        warn!("Failed to load badge {}: {}", path.display(), e);
                        None
                    }
                })
                .clone(),
            BadgeSource::Remote(_) => cache.get(source).cloned().flatten(),
        }
    }

    pub fn cache_badge(&self, source: BadgeSource, image: RgbaImage) {
        self.badges
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(source, Some(Arc::new(image)));
    }

    fn is_cached(&self, source: &BadgeSource) -> bool {
        self.badges
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(source)
    }

    fn fetch_remote(&self, fetcher: &mut Option<BadgeFetcher>, url: &url::Url) {
        let source = BadgeSource::Remote(url.clone());
        if fetcher.is_none() {
            match BadgeFetcher::new() {
                Ok(created) => *fetcher = Some(created),
                Err(e) => {
                    warn!("Badge downloads unavailable: {:#}", e);
                    return;
                }
            }
        }
        let Some(fetcher) = fetcher.as_ref() else {
            return;
        };
        match fetcher.fetch(url) {
            Ok(image) => {
                debug!("Cached badge {} ({}x{})", url, image.width(), image.height());
                self.cache_badge(source, image);
            }
            Err(e) => {
                warn!("Drawing badge {} as text: {:#}", url, e);
                self.badges
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(source, None);
            }
        }
    }

    fn draw_char(&self, canvas: &mut RgbaImage, c: char, x: i64, y: i64, color: Rgba<u8>) {
        if c.is_whitespace() {
            return;
        }
        let glyph = self.glyph(c);
        let metrics = &glyph.metrics;
        let baseline = y + self.ascent.round() as i64;
        let left = x + metrics.xmin as i64;
        let top = baseline - metrics.height as i64 - metrics.ymin as i64;

        for gy in 0..metrics.height {
            for gx in 0..metrics.width {
                let coverage = glyph.coverage[gy * metrics.width + gx];
                if coverage == 0 {
                    continue;
                }
                let px = left + gx as i64;
                let py = top + gy as i64;
                if px < 0 || py < 0 || px >= canvas.width() as i64 || py >= canvas.height() as i64 {
                    continue;
                }
                let pixel = canvas.get_pixel_mut(px as u32, py as u32);
                *pixel = blend(*pixel, color, coverage);
            }
        }
    }

    fn draw_text(&self, canvas: &mut RgbaImage, text: &str, x: i64, y: i64, color: Rgba<u8>) {
        for (i, c) in text.chars().enumerate() {
            self.draw_char(canvas, c, x + (i as u32 * self.cell_width) as i64, y, color);
        }
    }

    fn draw_slot(&self, canvas: &mut RgbaImage, slot: &ContentSlot, origin: (i64, i64), options: &RasterOptions) {
        let x0 = origin.0 + (slot.column as u32 * self.cell_width) as i64;
        let y0 = origin.1 + (slot.row as u32 * self.line_height) as i64;
        let slot_w = slot.columns as u32 * self.cell_width;
        let slot_h = slot.rows as u32 * self.line_height;

        let pieces: Vec<Piece> = match &slot.content {
            CarContent::Text(text) => vec![Piece::Text(text.clone())],
            CarContent::Badges(badges) => badges
                .iter()
                .map(|badge| self.badge_piece(badge, options.embed_images))
                .collect(),
        };
        if pieces.is_empty() {
            return;
        }

        let max_h = slot_h.saturating_sub(BADGE_MARGIN * 2).max(1);
        let gap = self.cell_width / 2;
        let mut sized: Vec<(Piece, u32, u32)> = pieces
            .into_iter()
            .map(|piece| {
                let (w, h) = match &piece {
                    Piece::Image(img) => fit_within(img.width(), img.height(), u32::MAX, max_h),
                    Piece::Text(text) => (text.chars().count() as u32 * self.cell_width, self.line_height),
                };
                (piece, w, h)
            })
            .collect();

        let total = |sized: &[(Piece, u32, u32)]| -> u32 {
            sized.iter().map(|(_, w, _)| *w).sum::<u32>() + gap * (sized.len() as u32 - 1)
        };
        let overflow = total(&sized);
        if overflow > slot_w {
            let scale = slot_w as f32 / overflow as f32;
            for (piece, w, h) in sized.iter_mut() {
                if let Piece::Image(_) = piece {
                    *w = ((*w as f32 * scale) as u32).max(1);
                    *h = ((*h as f32 * scale) as u32).max(1);
                }
            }
        }

        let mut x = x0 + (slot_w.saturating_sub(total(&sized)) / 2) as i64;
        for (piece, w, h) in &sized {
            let y = y0 + (slot_h.saturating_sub(*h) / 2) as i64;
            match piece {
                Piece::Image(img) => {
                    let scaled = if img.dimensions() == (*w, *h) {
                        (**img).clone()
                    } else {
                        imageops::resize(&**img, *w, *h, imageops::FilterType::Triangle)
                    };
                    imageops::overlay(canvas, &scaled, x, y);
                }
                Piece::Text(text) => {
                    let visible: String = text.chars().take(slot.columns).collect();
                    self.draw_text(canvas, &visible, x, y, options.foreground);
                }
            }
            x += (*w + gap) as i64;
        }
    }

    fn badge_piece(&self, badge: &Badge, embed_images: bool) -> Piece {
        if embed_images {
            if let Some(img) = self.badge_image(&badge.source) {
                return Piece::Image(img);
            }
        }
        Piece::Text(badge.alt.clone())
    }
}

impl Rasterizer for GlyphRasterizer {
    fn rasterize(&self, layout: &TrainLayout, options: &RasterOptions) -> Result<RgbaImage> {
        if layout.rows.is_empty() {
            return Err(anyhow!("Nothing to rasterize"));
        }
        let (width, height) = self.canvas_size(layout, options);
        let mut canvas = RgbaImage::from_pixel(width, height, options.background);
        let origin = (options.padding as i64, options.padding as i64);

        for (r, row) in layout.rows.iter().enumerate() {
            let y = origin.1 + (r as u32 * self.line_height) as i64;
            self.draw_text(&mut canvas, row, origin.0, y, options.foreground);
        }
        for slot in &layout.slots {
            self.draw_slot(&mut canvas, slot, origin, options);
        }
        Ok(canvas)
    }

    fn prepare(&self, layout: &TrainLayout, options: &RasterOptions) {
        if !options.embed_images {
            return;
        }
        let mut fetcher = None;
        for slot in &layout.slots {
            let CarContent::Badges(badges) = &slot.content else {
                continue;
            };
            for badge in badges {
                match &badge.source {
                    BadgeSource::File(_) => {
                        self.badge_image(&badge.source);
                    }
                    BadgeSource::Remote(url) if !self.is_cached(&badge.source) => {
                        self.fetch_remote(&mut fetcher, url);
                    }
                    BadgeSource::Remote(_) => {}
                }
            }
        }
    }
}

fn blend(dst: Rgba<u8>, src: Rgba<u8>, coverage: u8) -> Rgba<u8> {
    let a = (coverage as u32 * src[3] as u32) / 255;
    let mix = |d: u8, s: u8| ((s as u32 * a + d as u32 * (255 - a)) / 255) as u8;
    Rgba([
        mix(dst[0], src[0]),
        mix(dst[1], src[1]),
        mix(dst[2], src[2]),
        dst[3].max(a as u8),
    ])
}

/// Scales `(w, h)` down to fit the bounds, keeping the aspect ratio.
fn fit_within(w: u32, h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if w == 0 || h == 0 {
        return (1, 1);
    }
    let scale = (max_w as f64 / w as f64).min(max_h as f64 / h as f64).min(1.0);
    (
        ((w as f64 * scale).round() as u32).max(1),
        ((h as f64 * scale).round() as u32).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::{Train, TrainCar};

    #[test]
    fn test_blend_full_and_zero_coverage() {
        let bg = Rgba([10, 20, 30, 255]);
        let fg = Rgba([200, 100, 50, 255]);
        assert_eq!(blend(bg, fg, 255), fg);
        assert_eq!(blend(bg, fg, 0), bg);
    }

    #[test]
    fn test_fit_within_keeps_aspect() {
        assert_eq!(fit_within(100, 20, u32::MAX, 10), (50, 10));
        assert_eq!(fit_within(8, 4, u32::MAX, 10), (8, 4));
        assert_eq!(fit_within(0, 4, 10, 10), (1, 1));
    }

    #[test]
    fn test_rasterize_with_system_font() {
        let Ok(rasterizer) = GlyphRasterizer::system_default(14.0) else {
            return;
        };
        let train = Train::new(vec![TrainCar::text("hi").unwrap()]).unwrap();
        let layout = train.layout(0);
        let options = RasterOptions::default();

        let image = rasterizer.rasterize(&layout, &options).unwrap();
        let (cell_w, line_h) = rasterizer.cell_size();
        assert_eq!(image.width(), layout.columns() as u32 * cell_w + options.padding * 2);
        assert_eq!(image.height(), layout.rows.len() as u32 * line_h + options.padding * 2);
        assert_eq!(*image.get_pixel(0, 0), options.background);
        assert!(image.pixels().any(|p| *p != options.background));
    }

    #[test]
    fn test_cached_remote_badge_is_drawn_as_image() {
        let Ok(rasterizer) = GlyphRasterizer::system_default(14.0) else {
            return;
        };
        let badge = Badge::shield("https://img.shields.io/badge/build-passing-green").unwrap();
        let source = badge.source.clone();
        let layout = Train::new(vec![TrainCar::badges(vec![badge]).unwrap()])
            .unwrap()
            .layout(0);
        let options = RasterOptions::default();

        let as_text = rasterizer.rasterize(&layout, &options).unwrap();
        let plain = Train::new(vec![TrainCar::text("build passing").unwrap()])
            .unwrap()
            .layout(0);
        assert_eq!(as_text, rasterizer.rasterize(&plain, &options).unwrap());

        let green = Rgba([0, 200, 0, 255]);
        rasterizer.cache_badge(source, RgbaImage::from_pixel(40, 10, green));
        let as_image = rasterizer.rasterize(&layout, &options).unwrap();
        assert_eq!(as_image.dimensions(), as_text.dimensions());
        assert_ne!(as_image, as_text);
        assert!(as_image.pixels().any(|p| *p == green));

        let text_only = RasterOptions {
            embed_images: false,
            ..RasterOptions::default()
        };
        assert_eq!(rasterizer.rasterize(&layout, &text_only).unwrap(), as_text);
    }

    #[test]
    fn test_prepare_skips_cached_and_disabled_badges() {
        let Ok(rasterizer) = GlyphRasterizer::system_default(14.0) else {
            return;
        };
        let badge = Badge::shield("https://img.shields.io/badge/a-b-blue").unwrap();
        let layout = Train::new(vec![TrainCar::badges(vec![badge.clone()]).unwrap()])
            .unwrap()
            .layout(0);

        let text_only = RasterOptions {
            embed_images: false,
            ..RasterOptions::default()
        };
        rasterizer.prepare(&layout, &text_only);
        assert!(!rasterizer.is_cached(&badge.source));

        rasterizer.cache_badge(badge.source.clone(), RgbaImage::new(4, 2));
        rasterizer.prepare(&layout, &RasterOptions::default());
        assert!(rasterizer.badge_image(&badge.source).is_some());
    }

    #[test]
    fn test_forced_canvas_size() {
        let Ok(rasterizer) = GlyphRasterizer::system_default(12.0) else {
            return;
        };
        let layout = Train::new(vec![]).unwrap().layout(0);
        let options = RasterOptions {
            width: Some(320),
            height: Some(90),
            ..RasterOptions::default()
        };
        let image = rasterizer.rasterize(&layout, &options).unwrap();
        assert_eq!(image.dimensions(), (320, 90));
    }
}
