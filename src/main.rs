#![windows_subsystem = "windows"]

mod cancel;
mod capture;
mod config;
mod export;
mod output;
mod train;
mod ui;
mod widget;

use iced::{window, Size};
use tracing_subscriber::EnvFilter;

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::load().unwrap_or_default();
    if config::Config::config_path().is_some_and(|p| !p.exists()) {
        if let Err(e) = config.save() {
            tracing::warn!("Failed to write default config: {}", e);
        }
    }
    if let Err(e) = config.ensure_output_dir() {
        tracing::warn!("Output directory unavailable: {}", e);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .thread_name("zaamurets-export")
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start export runtime: {}", e);
            std::process::exit(1);
        }
    };
    let handle = runtime.handle().clone();

    iced::application(ui::App::title, ui::App::update, ui::App::view)
        .subscription(ui::App::subscription)
        .theme(ui::App::theme)
        .window(window::Settings {
            size: Size::new(720.0, 560.0),
            min_size: Some(Size::new(480.0, 400.0)),
            resizable: true,
            decorations: true,
            ..Default::default()
        })
        .run_with(move || ui::App::new(config, handle))
}
