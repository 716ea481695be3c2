pub mod style;
pub mod views;

use iced::widget::image::Handle as ImageHandle;
use iced::{Element, Task, Theme};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::capture::{GlyphRasterizer, RasterOptions, Rasterizer};
use crate::config::{Config, SNAPSHOT_FILE_NAME};
use crate::export::{
    Artifact, ExportOptions, ExportSession, GifEncoderFactory, JobState, SessionEvent, StartError,
};
use crate::output::{
    save_artifact, save_png, save_to_directory, show_notification, ClipboardManager,
};
use crate::train::{Badge, LayoutError, Train, TrainCar, TrainLayout, MAX_CARS};
use crate::widget::{AnimationHandle, TrainWidget};

use self::style::GeneratorTheme;
use self::views::{ContentMode, GeneratorState, GeneratorView};

#[derive(Debug, Clone)]
pub enum Message {
    Tick,
    ModeChanged(ContentMode),
    ContentChanged(String),
    Generate,
    Cancel,
    SaveAs,
    SaveAsPath(Option<PathBuf>),
    SaveToOutput,
    ArtifactSaved(Result<String, String>),
    SavePng,
    SavePngPath(Option<PathBuf>),
    SnapshotSaved(Result<String, String>),
    Dismiss,
}

pub struct App {
    config: Config,
    theme: GeneratorTheme,
    runtime: Handle,
    widget: Arc<TrainWidget>,
    rasterizer: Option<Arc<dyn Rasterizer>>,
    _animation: AnimationHandle,
    session: Option<ExportSession>,
    events: Receiver<SessionEvent>,
    clipboard: Option<ClipboardManager>,
    mode: ContentMode,
    input: String,
    input_error: Option<String>,
    progress: Option<u8>,
    artifact: Option<Artifact>,
    result_preview: Option<ImageHandle>,
    status: Option<String>,
}

impl App {
    pub fn new(config: Config, runtime: Handle) -> (Self, Task<Message>) {
        let theme = GeneratorTheme::from_config(&config);

        let train = Train::default()
            .animated(config.train.animated)
            .with_track_segments(config.train.additional_track_segments);
        let widget = TrainWidget::new(train);
        let animation = widget.spawn_animation(&runtime, config.train.track_interval());

        let (tx, events) = channel();
        let mut status = None;
        let rasterizer: Option<Arc<dyn Rasterizer>> = match GlyphRasterizer::from_config(&config.render) {
            Ok(rasterizer) => Some(Arc::new(rasterizer)),
            Err(e) => {
                warn!("GIF export unavailable: {:#}", e);
                status = Some(format!("GIF export unavailable: {}", e));
                None
            }
        };
        let session = rasterizer.as_ref().map(|rasterizer| {
            ExportSession::new(
                runtime.clone(),
                Arc::clone(rasterizer),
                Arc::new(GifEncoderFactory),
                Arc::new(tx),
            )
        });

        let app = Self {
            config,
            theme,
            runtime,
            widget,
            rasterizer,
            _animation: animation,
            session,
            events,
            clipboard: ClipboardManager::new().ok(),
            mode: ContentMode::Text,
            input: String::new(),
            input_error: None,
            progress: None,
            artifact: None,
            result_preview: None,
            status,
        };

        (app, Task::none())
    }

    pub fn title(&self) -> String {
        match self.progress {
            Some(percent) => format!("zaamurets - Generating {}%", percent),
            None => String::from("zaamurets"),
        }
    }

    pub fn theme(&self) -> Theme {
        if self.theme.is_dark {
            Theme::Dark
        } else {
            Theme::Light
        }
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Tick => self.drain_session_events(),
            Message::ModeChanged(mode) => {
                if self.mode != mode {
                    self.mode = mode;
                    self.input.clear();
                    self.apply_input();
                }
            }
            Message::ContentChanged(value) => {
                if self.progress.is_none() {
                    self.input = value;
                    self.apply_input();
                }
            }
            Message::Generate => return self.start_export(),
            Message::Cancel => {
                if let Some(ref session) = self.session {
                    session.cancel();
                }
            }
            Message::SaveAs => {
                let file_name = self
                    .artifact
                    .as_ref()
                    .map(|a| a.file_name())
                    .unwrap_or(crate::config::ARTIFACT_FILE_NAME);
                return Task::perform(
                    async move {
                        let dialog = rfd::AsyncFileDialog::new()
                            .add_filter("GIF", &["gif"])
                            .set_file_name(file_name);
                        dialog.save_file().await.map(|h| h.path().to_path_buf())
                    },
                    Message::SaveAsPath,
                );
            }
            Message::SaveAsPath(path_opt) => {
                let (Some(path), Some(artifact)) = (path_opt, self.artifact.clone()) else {
                    return Task::none();
                };
                if let Err(e) = Self::validate_save_path(&path) {
                    return Task::done(Message::ArtifactSaved(Err(e)));
                }
                return Task::perform(
                    async move {
                        save_artifact(&artifact, &path)
                            .map(|p| p.to_string_lossy().to_string())
                            .map_err(|e| e.to_string())
                    },
                    Message::ArtifactSaved,
                );
            }
            Message::SaveToOutput => {
                let Some(artifact) = self.artifact.clone() else {
                    return Task::none();
                };
                if let Err(e) = self.config.ensure_output_dir() {
                    return Task::done(Message::ArtifactSaved(Err(e.to_string())));
                }
                let dir = self.config.output.directory.clone();
                return Task::perform(
                    async move {
                        save_to_directory(&artifact, &dir)
                            .map(|p| p.to_string_lossy().to_string())
                            .map_err(|e| e.to_string())
                    },
                    Message::ArtifactSaved,
                );
            }
            Message::ArtifactSaved(result) => match result {
                Ok(path) => {
                    info!("GIF saved to {}", path);
                    if self.config.ui.copy_path_to_clipboard {
                        if let Some(ref mut cb) = self.clipboard {
                            let _ = cb.copy_file_path(&path);
                        }
                    }
                    self.notify("GIF Saved", &format!("Saved to {}", path));
                    self.status = Some(format!("Saved to {}", path));
                }
                Err(e) => {
                    warn!("Saving GIF failed: {}", e);
                    self.notify("GIF Save Failed", &e);
                    self.status = Some(format!("Save failed: {}", e));
                }
            },
            Message::SavePng => {
                return Task::perform(
                    async move {
                        let dialog = rfd::AsyncFileDialog::new()
                            .add_filter("PNG", &["png"])
                            .set_file_name(SNAPSHOT_FILE_NAME);
                        dialog.save_file().await.map(|h| h.path().to_path_buf())
                    },
                    Message::SavePngPath,
                );
            }
            Message::SavePngPath(path_opt) => {
                let (Some(path), Some(rasterizer)) = (path_opt, self.rasterizer.clone()) else {
                    return Task::none();
                };
                if let Err(e) = Self::validate_save_path(&path) {
                    return Task::done(Message::SnapshotSaved(Err(e)));
                }
                let layout = self.widget.layout();
                let options = RasterOptions::from_config(&self.config);
                let job = self
                    .runtime
                    .spawn_blocking(move || Self::save_snapshot(rasterizer.as_ref(), &layout, &options, &path));
                return Task::perform(
                    async move {
                        match job.await {
                            Ok(result) => result
                                .map(|p| p.to_string_lossy().to_string())
                                .map_err(|e| format!("{:#}", e)),
                            Err(e) => Err(e.to_string()),
                        }
                    },
                    Message::SnapshotSaved,
                );
            }
            Message::SnapshotSaved(result) => match result {
                Ok(path) => {
                    info!("PNG saved to {}", path);
                    self.notify("PNG Saved", &format!("Saved to {}", path));
                    self.status = Some(format!("Saved to {}", path));
                }
                Err(e) => {
                    warn!("Saving PNG failed: {}", e);
                    self.status = Some(format!("Save failed: {}", e));
                }
            },
            Message::Dismiss => {
                self.artifact = None;
                self.result_preview = None;
                self.status = None;
            }
        }
        Task::none()
    }

    fn apply_input(&mut self) {
        match Self::build_train(self.mode, &self.input) {
            Ok(cars) => match Train::new(cars) {
                Ok(train) => {
                    let train = train
                        .animated(self.config.train.animated)
                        .with_track_segments(self.config.train.additional_track_segments);
                    self.widget.set_train(train);
                    self.input_error = None;
                }
                Err(e) => self.input_error = Some(e.to_string()),
            },
            Err(e) => self.input_error = Some(e.to_string()),
        }
    }

    /// One still of the train, with remote badges loaded first.
    fn save_snapshot(
        rasterizer: &dyn Rasterizer,
        layout: &TrainLayout,
        options: &RasterOptions,
        path: &Path,
    ) -> anyhow::Result<PathBuf> {
        rasterizer.prepare(layout, options);
        let image = rasterizer.rasterize(layout, options)?;
        save_png(&image, path)
    }

    fn build_train(mode: ContentMode, input: &str) -> Result<Vec<TrainCar>, LayoutError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Vec::new());
        }
        match mode {
            ContentMode::Text => Ok(vec![TrainCar::text(input)?]),
            ContentMode::Badges => {
                let sources: Vec<&str> = input
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|s| !s.is_empty())
                    .collect();
                if sources.len() > MAX_CARS {
                    return Err(LayoutError::TooManyCars);
                }
                sources
                    .into_iter()
                    .map(|raw| TrainCar::badges(vec![Badge::parse(raw)?]))
                    .collect()
            }
        }
    }

    fn start_export(&mut self) -> Task<Message> {
        let Some(ref session) = self.session else {
            return Task::none();
        };
        if self.input.trim().is_empty() || self.input_error.is_some() {
            return Task::none();
        }

        let options = ExportOptions::from_config(&self.config);
        match session.start(self.widget.clone(), options) {
            Ok(id) => {
                info!("Export job {} started", id);
                self.progress = Some(0);
                self.artifact = None;
                self.result_preview = None;
                self.status = None;
            }
            Err(StartError::ResultPending) => {
                session.reset();
                return Task::done(Message::Generate);
            }
            Err(e) => self.status = Some(e.to_string()),
        }
        Task::none()
    }

    fn drain_session_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                SessionEvent::Progress(_, percent) => self.progress = Some(percent),
                SessionEvent::Completed(_, artifact) => {
                    if let Some(ref session) = self.session {
                        let _ = session.take_result();
                    }
                    self.progress = None;
                    self.result_preview = Some(ImageHandle::from_bytes(artifact.bytes().to_vec()));
                    self.artifact = Some(artifact);
                    self.notify("GIF Ready", "The train GIF has been generated");
                }
                SessionEvent::Failed(_, reason) => {
                    if let Some(ref session) = self.session {
                        let _ = session.take_result();
                    }
                    self.progress = None;
                    self.status = Some(format!("Generation failed: {}", reason));
                    self.notify("GIF Generation Failed", &reason.to_string());
                }
            }
        }
    }

    fn notify(&self, title: &str, body: &str) {
        if self.config.ui.show_notifications {
            let _ = show_notification(title, body);
        }
    }

    fn validate_save_path(path: &Path) -> Result<(), String> {
        let path_str = path.to_string_lossy();

        if path_str.contains("..") {
            return Err("Path contains directory traversal".to_string());
        }

        #[cfg(windows)]
        {
            if path_str.starts_with("\\\\") {
                return Err("Network paths are not allowed".to_string());
            }

            let dangerous_prefixes = ["C:\\Windows", "C:\\Program Files", "C:\\System"];
            let path_lower = path_str.to_lowercase();
            for prefix in &dangerous_prefixes {
                if path_lower.starts_with(&prefix.to_lowercase()) {
                    return Err("Cannot save to system directories".to_string());
                }
            }
        }

        #[cfg(unix)]
        {
            let dangerous_prefixes = ["/bin", "/sbin", "/usr/bin", "/usr/sbin", "/etc", "/boot"];
            for prefix in &dangerous_prefixes {
                if path_str.starts_with(prefix) {
                    return Err("Cannot save to system directories".to_string());
                }
            }
        }

        if let Some(filename) = path.file_name() {
            let name = filename.to_string_lossy();
            if name.starts_with('.') && !name.chars().skip(1).any(|c| c == '.') {
                return Err("Cannot create hidden files".to_string());
            }
        }

        Ok(())
    }

    pub fn view(&self) -> Element<'_, Message> {
        let running = self.progress.is_some();
        let state = GeneratorState {
            mode: self.mode,
            input: &self.input,
            input_error: self.input_error.as_deref(),
            preview: self.widget.layout().plain_text(),
            progress: self.progress,
            capturing: self
                .session
                .as_ref()
                .is_some_and(|s| s.state() == JobState::Sampling),
            result: self.result_preview.as_ref(),
            status: self.status.as_deref(),
            can_snapshot: self.rasterizer.is_some() && !running,
            can_generate: self.session.is_some()
                && !running
                && !self.input.trim().is_empty()
                && self.input_error.is_none(),
        };
        GeneratorView::view(&self.theme, state)
    }

    pub fn subscription(&self) -> iced::Subscription<Message> {
        iced::time::every(std::time::Duration::from_millis(100)).map(|_| Message::Tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::mock::SolidRasterizer;
    use crate::train::CarContent;
    use image::GenericImageView;

    #[test]
    fn test_build_train_text_mode() {
        let cars = App::build_train(ContentMode::Text, "  hello  ").unwrap();
        assert_eq!(cars.len(), 1);
        assert_eq!(cars[0].content(), &CarContent::Text(String::from("hello")));
        assert!(App::build_train(ContentMode::Text, "").unwrap().is_empty());
        assert_eq!(
            App::build_train(ContentMode::Text, &"x".repeat(21)).unwrap_err(),
            LayoutError::TextTooLong
        );
    }

    #[test]
    fn test_build_train_badge_mode() {
        let cars = App::build_train(
            ContentMode::Badges,
            "https://img.shields.io/badge/build-passing-green, https://img.shields.io/badge/rust-1.80-orange",
        )
        .unwrap();
        assert_eq!(cars.len(), 2);

        let too_many = ["https://img.shields.io/badge/a-b-c"; 4].join(" ");
        assert_eq!(
            App::build_train(ContentMode::Badges, &too_many).unwrap_err(),
            LayoutError::TooManyCars
        );
        assert!(App::build_train(ContentMode::Badges, "https://example.com/x.png").is_err());
    }

    #[tokio::test]
    async fn test_input_is_locked_while_generating() {
        let (mut app, _) = App::new(Config::default(), Handle::current());
        let _ = app.update(Message::ContentChanged(String::from("hello")));
        let columns = app.widget.layout().columns();

        app.progress = Some(0);
        let _ = app.update(Message::ContentChanged(String::from("a much longer line")));
        assert_eq!(app.input, "hello");
        assert_eq!(app.widget.layout().columns(), columns);

        app.progress = None;
        let _ = app.update(Message::ContentChanged(String::from("a much longer line")));
        assert_eq!(app.input, "a much longer line");
        assert!(app.widget.layout().columns() > columns);
    }

    #[tokio::test]
    async fn test_app_uses_the_config_it_is_given() {
        let mut config = Config::default();
        config.export.frame_count = 7;
        config.train.animated = false;
        let (app, _) = App::new(config, Handle::current());
        assert_eq!(app.config.export.frame_count, 7);
        assert_eq!(ExportOptions::from_config(&app.config).frame_count, 7);
        assert!(!app.config.train.animated);
    }

    #[test]
    fn test_save_snapshot_writes_png() {
        let dir = std::env::temp_dir().join(format!("zaamurets-snapshot-{}", uuid::Uuid::new_v4()));
        let rasterizer = SolidRasterizer::new(None);
        let layout = Train::default().layout(0);
        let options = RasterOptions::default();

        let path = App::save_snapshot(rasterizer.as_ref(), &layout, &options, &dir.join(SNAPSHOT_FILE_NAME)).unwrap();
        assert_eq!(rasterizer.calls(), 1);
        assert_eq!(image::open(&path).unwrap().dimensions(), (4, 3));
        std::fs::remove_dir_all(dir).unwrap();

        let failing = SolidRasterizer::new(Some(1));
        let missing = std::env::temp_dir().join(format!("zaamurets-{}.png", uuid::Uuid::new_v4()));
        assert!(App::save_snapshot(failing.as_ref(), &layout, &options, &missing).is_err());
        assert!(!missing.exists());
    }

    #[test]
    fn test_build_train_badge_builder_shorthand() {
        let cars = App::build_train(ContentMode::Badges, "rust:1.80:orange:for-the-badge:rust").unwrap();
        match cars[0].content() {
            CarContent::Badges(badges) => assert_eq!(badges[0].alt, "rust 1.80"),
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn test_validate_save_path() {
        assert!(App::validate_save_path(Path::new("out/../train.gif")).is_err());
        assert!(App::validate_save_path(Path::new("out/.hidden")).is_err());
        assert!(App::validate_save_path(Path::new("out/zaamurets-train.gif")).is_ok());
    }
}
