use anyhow::{anyhow, Result};
use arboard::Clipboard;
use image::{ImageFormat, RgbaImage};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::export::Artifact;

const MAX_NOTIFICATION_LEN: usize = 256;
const MAX_PATH_LEN: usize = 4096;
const MAX_NAME_ATTEMPTS: u32 = 1000;

pub struct ClipboardManager {
    clipboard: Clipboard,
}

impl ClipboardManager {
    pub fn new() -> Result<Self> {
        let clipboard = Clipboard::new()?;
        Ok(Self { clipboard })
    }

    pub fn copy_file_path<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        if path_str.len() > MAX_PATH_LEN {
            return Err(anyhow!("Path too long for clipboard"));
        }
        self.clipboard.set_text(path_str)?;
        Ok(())
    }
}

/// Writes the artifact to exactly `path`, replacing any existing file.
pub fn save_artifact<P: AsRef<Path>>(artifact: &Artifact, path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    validate_file_name(path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(artifact.bytes())?;
    file.flush()?;

    info!("Saved {} bytes to {}", artifact.bytes().len(), path.display());
    Ok(path.to_path_buf())
}

/// Writes a still of the train as PNG to exactly `path`.
pub fn save_png<P: AsRef<Path>>(image: &RgbaImage, path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    validate_file_name(path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    image.save_with_format(path, ImageFormat::Png)?;

    info!("Saved {}x{} PNG to {}", image.width(), image.height(), path.display());
    Ok(path.to_path_buf())
}

/// Writes the artifact into `dir` under its suggested name, numbering the
/// name when a file with it already exists.
pub fn save_to_directory<P: AsRef<Path>>(artifact: &Artifact, dir: P) -> Result<PathBuf> {
    let path = unique_path(dir.as_ref(), artifact.file_name())?;
    save_artifact(artifact, path)
}

fn validate_file_name(path: &Path) -> Result<()> {
    let filename = path
        .file_name()
        .ok_or_else(|| anyhow!("Invalid filename"))?
        .to_string_lossy();

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Err(anyhow!("Invalid filename characters"));
    }
    if path.to_string_lossy().len() > MAX_PATH_LEN {
        return Err(anyhow!("Path too long"));
    }
    Ok(())
}

fn unique_path(dir: &Path, file_name: &str) -> Result<PathBuf> {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let name = Path::new(file_name);
    let stem = name.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let ext = name.extension().map(|e| e.to_string_lossy()).unwrap_or_default();
    for n in 1..=MAX_NAME_ATTEMPTS {
        let candidate = if ext.is_empty() {
            dir.join(format!("{}-{}", stem, n))
        } else {
            dir.join(format!("{}-{}.{}", stem, n, ext))
        };
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(anyhow!("No free file name for {} in {}", file_name, dir.display()))
}

fn sanitize_notification_text(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n')
        .take(MAX_NOTIFICATION_LEN)
        .collect()
}

pub fn show_notification(title: &str, body: &str) -> Result<()> {
    let safe_title = sanitize_notification_text(title);
    let safe_body = sanitize_notification_text(body);

    #[cfg(not(target_os = "macos"))]
    {
        notify_rust::Notification::new()
            .summary(&safe_title)
            .body(&safe_body)
            .timeout(notify_rust::Timeout::Milliseconds(3000))
            .show()?;
    }

    #[cfg(target_os = "macos")]
    {
        notify_rust::Notification::new()
            .summary(&safe_title)
            .body(&safe_body)
            .show()?;
    }

    Ok(())
}
