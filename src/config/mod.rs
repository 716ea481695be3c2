use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use image::Rgba;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const ARTIFACT_FILE_NAME: &str = "zaamurets-train.gif";
pub const SNAPSHOT_FILE_NAME: &str = "zaamurets-train.png";

const MIN_FRAME_COUNT: u32 = 1;
const MAX_FRAME_COUNT: u32 = 300;
const MIN_FRAME_DELAY_MS: u32 = 20;
const MAX_FRAME_DELAY_MS: u32 = 10_000;
const MAX_WARMUP_MS: u32 = 10_000;
const MIN_WORKERS: usize = 1;
const MAX_WORKERS: usize = 8;
const MIN_QUALITY: u8 = 1;
const MAX_QUALITY: u8 = 30;
const MIN_FONT_SIZE: f32 = 6.0;
const MAX_FONT_SIZE: f32 = 72.0;
const MAX_PADDING: u32 = 256;
const MIN_TRACK_INTERVAL_MS: u32 = 50;
const MAX_TRACK_INTERVAL_MS: u32 = 5_000;
const MAX_TRACK_SEGMENTS: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub output: OutputConfig,
    pub export: ExportConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub train: TrainConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    pub frame_count: u32,
    pub frame_delay_ms: u32,
    pub warmup_ms: u32,
    pub workers: usize,
    /// 1 is the best palette, 30 the fastest.
    pub quality: u8,
    pub background: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            frame_count: 30,
            frame_delay_ms: 100,
            warmup_ms: 500,
            workers: 2,
            quality: 5,
            background: String::from("#1a1a1a"),
        }
    }
}

impl ExportConfig {
    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(self.frame_delay_ms as u64)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms as u64)
    }

    pub fn background_color(&self) -> Rgba<u8> {
        parse_hex_color(&self.background).unwrap_or(Rgba([0x1a, 0x1a, 0x1a, 0xff]))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
    /// Monospace TTF/OTF; common system fonts are tried when unset.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    pub foreground: String,
    pub padding: u32,
    pub embed_images: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            font_size: 16.0,
            foreground: String::from("#9ca3af"),
            padding: 12,
            embed_images: true,
        }
    }
}

impl RenderConfig {
    pub fn foreground_color(&self) -> Rgba<u8> {
        parse_hex_color(&self.foreground).unwrap_or(Rgba([0x9c, 0xa3, 0xaf, 0xff]))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainConfig {
    pub animated: bool,
    pub additional_track_segments: usize,
    pub track_interval_ms: u32,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            animated: true,
            additional_track_segments: 0,
            track_interval_ms: 250,
        }
    }
}

impl TrainConfig {
    pub fn track_interval(&self) -> Duration {
        Duration::from_millis(self.track_interval_ms as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UiConfig {
    pub theme: Theme,
    pub show_notifications: bool,
    pub copy_path_to_clipboard: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

/// Parses `#rrggbb` into an opaque color.
pub fn parse_hex_color(value: &str) -> Option<Rgba<u8>> {
    let hex = value.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 0xff]))
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let export = &self.export;
        if export.frame_count < MIN_FRAME_COUNT || export.frame_count > MAX_FRAME_COUNT {
            return Err(anyhow!(
                "frame_count must be between {} and {}",
                MIN_FRAME_COUNT,
                MAX_FRAME_COUNT
            ));
        }
        if export.frame_delay_ms < MIN_FRAME_DELAY_MS || export.frame_delay_ms > MAX_FRAME_DELAY_MS {
            return Err(anyhow!(
                "frame_delay_ms must be between {} and {}",
                MIN_FRAME_DELAY_MS,
                MAX_FRAME_DELAY_MS
            ));
        }
        if export.warmup_ms > MAX_WARMUP_MS {
            return Err(anyhow!("warmup_ms must be <= {}", MAX_WARMUP_MS));
        }
        if export.workers < MIN_WORKERS || export.workers > MAX_WORKERS {
            return Err(anyhow!("workers must be between {} and {}", MIN_WORKERS, MAX_WORKERS));
        }
        if export.quality < MIN_QUALITY || export.quality > MAX_QUALITY {
            return Err(anyhow!("quality must be between {} and {}", MIN_QUALITY, MAX_QUALITY));
        }
        if parse_hex_color(&export.background).is_none() {
            return Err(anyhow!("background must be a #rrggbb color"));
        }

        let render = &self.render;
        if !render.font_size.is_finite()
            || render.font_size < MIN_FONT_SIZE
            || render.font_size > MAX_FONT_SIZE
        {
            return Err(anyhow!(
                "font_size must be between {} and {}",
                MIN_FONT_SIZE,
                MAX_FONT_SIZE
            ));
        }
        if parse_hex_color(&render.foreground).is_none() {
            return Err(anyhow!("foreground must be a #rrggbb color"));
        }
        if render.padding > MAX_PADDING {
            return Err(anyhow!("padding must be <= {}", MAX_PADDING));
        }

        let train = &self.train;
        if train.track_interval_ms < MIN_TRACK_INTERVAL_MS
            || train.track_interval_ms > MAX_TRACK_INTERVAL_MS
        {
            return Err(anyhow!(
                "track_interval_ms must be between {} and {}",
                MIN_TRACK_INTERVAL_MS,
                MAX_TRACK_INTERVAL_MS
            ));
        }
        if train.additional_track_segments > MAX_TRACK_SEGMENTS {
            return Err(anyhow!("additional_track_segments must be <= {}", MAX_TRACK_SEGMENTS));
        }
        Ok(())
    }

    fn sanitize(&mut self) {
        let defaults = ExportConfig::default();
        let export = &mut self.export;
        export.frame_count = export.frame_count.clamp(MIN_FRAME_COUNT, MAX_FRAME_COUNT);
        export.frame_delay_ms = export.frame_delay_ms.clamp(MIN_FRAME_DELAY_MS, MAX_FRAME_DELAY_MS);
        export.warmup_ms = export.warmup_ms.min(MAX_WARMUP_MS);
        export.workers = export.workers.clamp(MIN_WORKERS, MAX_WORKERS);
        export.quality = export.quality.clamp(MIN_QUALITY, MAX_QUALITY);
        if parse_hex_color(&export.background).is_none() {
            export.background = defaults.background;
        }

        let render = &mut self.render;
        render.font_size = if render.font_size.is_finite() {
            render.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
        } else {
            RenderConfig::default().font_size
        };
        if parse_hex_color(&render.foreground).is_none() {
            render.foreground = RenderConfig::default().foreground;
        }
        render.padding = render.padding.min(MAX_PADDING);

        let train = &mut self.train;
        train.track_interval_ms = train
            .track_interval_ms
            .clamp(MIN_TRACK_INTERVAL_MS, MAX_TRACK_INTERVAL_MS);
        train.additional_track_segments = train.additional_track_segments.min(MAX_TRACK_SEGMENTS);
    }
}

impl Default for Config {
    fn default() -> Self {
        let pictures_dir = directories::UserDirs::new()
            .and_then(|d| d.picture_dir().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| {
                directories::BaseDirs::new()
                    .map(|b| b.home_dir().to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."))
            });

        Self {
            output: OutputConfig {
                directory: pictures_dir.join("zaamurets"),
            },
            export: ExportConfig::default(),
            render: RenderConfig::default(),
            train: TrainConfig::default(),
            ui: UiConfig {
                theme: Theme::Dark,
                show_notifications: true,
                copy_path_to_clipboard: false,
            },
        }
    }
}

impl Config {
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "zaamurets", "zaamurets").map(|p| p.config_dir().to_path_buf())
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                let content = fs::read_to_string(&path)?;
                return Self::from_toml(&content);
            }
        }
        Ok(Config::default())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.sanitize();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.validate()?;
        if let Some(dir) = Self::config_dir() {
            fs::create_dir_all(&dir)?;
            if let Some(path) = Self::config_path() {
                let content = toml::to_string_pretty(self)?;
                fs::write(&path, content)?;
            }
        }
        Ok(())
    }

    pub fn ensure_output_dir(&self) -> Result<()> {
        let dir = &self.output.directory;
        if dir.as_os_str().is_empty() {
            return Err(anyhow!("Output directory path is empty"));
        }
        if dir.to_string_lossy().contains("..") {
            return Err(anyhow!("Output directory contains path traversal"));
        }
        fs::create_dir_all(dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.export.frame_count, 30);
        assert_eq!(config.export.frame_delay(), Duration::from_millis(100));
        assert_eq!(config.export.workers, 2);
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#1a1a1a"), Some(Rgba([26, 26, 26, 255])));
        assert_eq!(parse_hex_color(" #FFffFF "), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(parse_hex_color("1a1a1a"), None);
        assert_eq!(parse_hex_color("#1a1a"), None);
        assert_eq!(parse_hex_color("#1a1a1g"), None);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = Config::default();
        config.export.frame_count = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.export.quality = 31;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.export.background = String::from("black");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_sanitizes_values() {
        let content = r##"
            [output]
            directory = "/tmp/zaamurets"

            [export]
            frame_count = 5000
            frame_delay_ms = 1
            warmup_ms = 0
            workers = 64
            quality = 0
            background = "nope"

            [ui]
            theme = "Light"
            show_notifications = false
            copy_path_to_clipboard = true
        "##;
        let config = Config::from_toml(content).unwrap();
        assert_eq!(config.export.frame_count, MAX_FRAME_COUNT);
        assert_eq!(config.export.frame_delay_ms, MIN_FRAME_DELAY_MS);
        assert_eq!(config.export.workers, MAX_WORKERS);
        assert_eq!(config.export.quality, MIN_QUALITY);
        assert_eq!(config.export.background, "#1a1a1a");
        assert_eq!(config.render.font_size, 16.0);
        assert!(config.train.animated);
        assert_eq!(config.ui.theme, Theme::Light);
    }

    #[test]
    fn test_from_toml_rejects_unknown_fields() {
        let content = r##"
            [output]
            directory = "/tmp"
            upload = true

            [export]
            frame_count = 30
            frame_delay_ms = 100
            warmup_ms = 500
            workers = 2
            quality = 5
            background = "#000000"

            [ui]
            theme = "Dark"
            show_notifications = true
            copy_path_to_clipboard = false
        "##;
        assert!(Config::from_toml(content).is_err());
    }
}
