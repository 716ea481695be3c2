use anyhow::{anyhow, bail, Context, Result};
use image::{Rgba, RgbaImage};
use resvg::{tiny_skia, usvg};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;
use url::Url;

const FETCH_TIMEOUT_SECS: u64 = 10;
const MAX_REDIRECTS: usize = 3;
const MAX_BADGE_BYTES: usize = 512 * 1024;
const MAX_BADGE_DIMENSION: u32 = 2048;
/// Badges are drawn at twice their nominal size and scaled down into the car.
const SVG_SCALE: f32 = 2.0;

/// Downloads badge images. Blocking; call it from a blocking context and
/// drop it there as well.
pub struct BadgeFetcher {
    client: reqwest::blocking::Client,
}

impl BadgeFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .user_agent(concat!("zaamurets/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }

    pub fn fetch(&self, url: &Url) -> Result<RgbaImage> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("{} returned {}", url, status);
        }
        if response.content_length().is_some_and(|len| len > MAX_BADGE_BYTES as u64) {
            bail!("Badge at {} is too large", url);
        }
        let is_svg = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("svg"));

        let bytes = response.bytes()?;
        if bytes.len() > MAX_BADGE_BYTES {
            bail!("Badge at {} is too large", url);
        }
        debug!("Fetched {} bytes from {}", bytes.len(), url);
        decode_badge(&bytes, is_svg)
    }
}

/// Decodes SVG (what shields.io serves) or any raster format `image` reads.
pub fn decode_badge(bytes: &[u8], is_svg: bool) -> Result<RgbaImage> {
    if is_svg || looks_like_svg(bytes) {
        decode_svg(bytes)
    } else {
        Ok(image::load_from_memory(bytes)?.to_rgba8())
    }
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(256)];
    String::from_utf8_lossy(head).trim_start().starts_with('<')
}

fn system_fonts() -> Arc<usvg::fontdb::Database> {
    static FONTS: OnceLock<Arc<usvg::fontdb::Database>> = OnceLock::new();
    FONTS
        .get_or_init(|| {
            let mut db = usvg::fontdb::Database::new();
            db.load_system_fonts();
            debug!("Loaded {} font faces for badge text", db.len());
            Arc::new(db)
        })
        .clone()
}

fn decode_svg(bytes: &[u8]) -> Result<RgbaImage> {
    let mut options = usvg::Options::default();
    options.fontdb = system_fonts();
    let tree = usvg::Tree::from_data(bytes, &options).context("Invalid SVG badge")?;

    let size = tree.size();
    let width = (size.width() * SVG_SCALE).ceil() as u32;
    let height = (size.height() * SVG_SCALE).ceil() as u32;
    if width == 0 || height == 0 || width > MAX_BADGE_DIMENSION || height > MAX_BADGE_DIMENSION {
        bail!("SVG badge has unusable size {}x{}", width, height);
    }

    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| anyhow!("Failed to allocate {}x{} badge pixmap", width, height))?;
    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(SVG_SCALE, SVG_SCALE),
        &mut pixmap.as_mut(),
    );

    let mut image = RgbaImage::new(width, height);
    for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const RED_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="4"><rect width="10" height="4" fill="#ff0000"/></svg>"##;

    #[test]
    fn test_decode_svg_badge() {
        let image = decode_badge(RED_SVG.as_bytes(), true).unwrap();
        assert_eq!(image.dimensions(), (20, 8));
        assert_eq!(*image.get_pixel(10, 4), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_svg_detected_without_content_type() {
        let image = decode_badge(format!("\n  {}", RED_SVG).as_bytes(), false).unwrap();
        assert_eq!(image.width(), 20);
    }

    #[test]
    fn test_decode_png_badge() {
        let source = RgbaImage::from_pixel(3, 2, Rgba([0, 128, 0, 255]));
        let mut bytes = Vec::new();
        source
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let image = decode_badge(&bytes, false).unwrap();
        assert_eq!(image, source);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_badge(b"<not really svg", true).is_err());
        assert!(decode_badge(&[0u8, 1, 2, 3], false).is_err());
    }
}
