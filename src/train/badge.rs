use std::path::{Path, PathBuf};

use url::Url;

use super::LayoutError;

const SHIELDS_BASE: &str = "https://img.shields.io/badge";
const SHIELD_HOSTS: [&str; 2] = ["img.shields.io", "shields.io"];
const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "bmp"];
const SHIELD_STYLES: [&str; 5] = ["flat", "flat-square", "plastic", "for-the-badge", "social"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BadgeSource {
    File(PathBuf),
    Remote(Url),
}

/// An image carried inside a car. The alt text stands in for it whenever the
/// image cannot be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub source: BadgeSource,
    pub alt: String,
}

impl Badge {
    pub fn file(path: impl Into<PathBuf>, alt: impl Into<String>) -> Self {
        Self {
            source: BadgeSource::File(path.into()),
            alt: alt.into(),
        }
    }

    /// Accepts only https shields.io badge URLs.
    pub fn shield(raw: &str) -> Result<Self, LayoutError> {
        let url = Url::parse(raw.trim()).map_err(|_| LayoutError::InvalidShield(raw.to_string()))?;
        if !is_shield_url(&url) {
            return Err(LayoutError::InvalidShield(raw.to_string()));
        }
        let alt = shield_alt_text(&url);
        Ok(Self {
            source: BadgeSource::Remote(url),
            alt,
        })
    }

    /// Parses user input as a shields.io URL, a local image file, or the
    /// [`ShieldSpec::from_shorthand`] form of a static shield.
    pub fn parse(raw: &str) -> Result<Self, LayoutError> {
        let trimmed = raw.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Self::shield(trimmed);
        }
        let path = Path::new(trimmed);
        if has_image_extension(path) && path.is_file() {
            let alt = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            return Ok(Self::file(path, alt));
        }
        match ShieldSpec::from_shorthand(trimmed) {
            Some(spec) => spec.badge(),
            None => Err(LayoutError::InvalidBadge(raw.to_string())),
        }
    }
}

fn is_shield_url(url: &Url) -> bool {
    url.scheme() == "https"
        && url
            .host_str()
            .map(|host| SHIELD_HOSTS.contains(&host))
            .unwrap_or(false)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// `badge/build-passing-green` reads as "build passing".
fn shield_alt_text(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let decoded = percent_decode(segment);
    let mut parts = split_shield_segment(&decoded);
    if parts.len() > 1 {
        parts.pop();
    }
    let alt = parts.join(" ");
    if alt.trim().is_empty() {
        String::from("Shield")
    } else {
        alt
    }
}

fn percent_decode(segment: &str) -> String {
    url::form_urlencoded::parse(format!("x={}", segment.replace('+', "%2B")).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| segment.to_string())
}

/// Splits on single dashes; `--` is a literal dash and `__` a literal
/// underscore while `_` is a space.
fn split_shield_segment(segment: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = segment.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '-' if chars.peek() == Some(&'-') => {
                chars.next();
                current.push('-');
            }
            '-' => parts.push(std::mem::take(&mut current)),
            '_' if chars.peek() == Some(&'_') => {
                chars.next();
                current.push('_');
            }
            '_' => current.push(' '),
            other => current.push(other),
        }
    }
    parts.push(current);
    parts
}

fn escape_shield_part(part: &str) -> String {
    part.replace('-', "--").replace('_', "__")
}

/// Parameters for a static shields.io badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShieldSpec {
    pub label: String,
    pub message: String,
    pub color: String,
    pub style: String,
    pub logo: Option<String>,
    pub logo_color: Option<String>,
    pub label_color: Option<String>,
}

impl ShieldSpec {
    pub fn new(label: impl Into<String>, message: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            message: message.into(),
            color: color.into(),
            style: String::from("flat"),
            logo: None,
            logo_color: None,
            label_color: None,
        }
    }

    /// `label:message[:color[:style[:logo[:logoColor[:labelColor]]]]]`.
    /// Empty fields keep their defaults and a leading `#` on colors is
    /// dropped, so `build:passing:#4c1::rust` is a flat badge with a logo.
    pub fn from_shorthand(raw: &str) -> Option<Self> {
        let parts: Vec<&str> = raw.trim().split(':').map(str::trim).collect();
        let (label, message) = match parts.as_slice() {
            [label, message, ..] if !label.is_empty() && !message.is_empty() => (*label, *message),
            _ => return None,
        };
        if parts.len() > 7 {
            return None;
        }
        let field = |i: usize| parts.get(i).copied().filter(|p| !p.is_empty());
        let color = |i: usize| field(i).map(|c| c.trim_start_matches('#').to_string());

        let mut spec = Self::new(label, message, color(2).unwrap_or_else(|| String::from("blue")));
        if let Some(style) = field(3) {
            if !SHIELD_STYLES.contains(&style) {
                return None;
            }
            spec.style = style.to_string();
        }
        spec.logo = field(4).map(str::to_string);
        spec.logo_color = color(5);
        spec.label_color = color(6);
        Some(spec)
    }

    pub fn url(&self) -> Result<Url, LayoutError> {
        let color = if self.color.is_empty() { "blue" } else { self.color.as_str() };
        let segment = format!(
            "{}-{}-{}",
            escape_shield_part(&self.label),
            escape_shield_part(&self.message),
            escape_shield_part(color)
        );

        let mut url = Url::parse(SHIELDS_BASE)
            .map_err(|_| LayoutError::InvalidShield(SHIELDS_BASE.to_string()))?;
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(&segment);
        }

        let params = [
            ("style", Some(self.style.as_str()).filter(|s| !s.is_empty())),
            ("logo", self.logo.as_deref()),
            ("logoColor", self.logo_color.as_deref()),
            ("labelColor", self.label_color.as_deref()),
        ];
        if params.iter().any(|(_, v)| v.is_some()) {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                if let Some(value) = value {
                    query.append_pair(key, value);
                }
            }
        }
        Ok(url)
    }

    pub fn badge(&self) -> Result<Badge, LayoutError> {
        Ok(Badge {
            source: BadgeSource::Remote(self.url()?),
            alt: format!("{} {}", self.label, self.message),
        })
    }
}
