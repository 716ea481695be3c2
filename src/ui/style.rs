use iced::widget::{button, container};
use iced::{Background, Border, Color, Shadow};
use image::Rgba;

use crate::config::Config;

const PAGE_DARK: Color = Color::from_rgb(0.08, 0.08, 0.08);
const PAGE_LIGHT: Color = Color::from_rgb(0.96, 0.96, 0.96);
const CONTROL_DARK: Color = Color::from_rgb(0.2, 0.2, 0.2);
const CONTROL_LIGHT: Color = Color::from_rgb(0.85, 0.85, 0.85);
const HOVER_DARK: Color = Color::from_rgb(0.27, 0.27, 0.27);
const HOVER_LIGHT: Color = Color::from_rgb(0.75, 0.75, 0.75);
const ACCENT: Color = Color::from_rgb(0.23, 0.51, 0.96);
const ACCENT_DISABLED: Color = Color::from_rgb(0.4, 0.4, 0.4);
const TEXT_DARK: Color = Color::from_rgb(0.9, 0.9, 0.9);
const TEXT_LIGHT: Color = Color::from_rgb(0.1, 0.1, 0.1);
const RADIUS: f32 = 8.0;

/// App chrome plus the stage colors the train is drawn with, so the live
/// preview matches the exported frames.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorTheme {
    pub is_dark: bool,
    pub stage: Color,
    pub ink: Color,
}

impl GeneratorTheme {
    pub fn from_config(config: &Config) -> Self {
        Self {
            is_dark: matches!(config.ui.theme, crate::config::Theme::Dark),
            stage: to_color(config.export.background_color()),
            ink: to_color(config.render.foreground_color()),
        }
    }

    pub fn page(&self) -> Color {
        if self.is_dark {
            PAGE_DARK
        } else {
            PAGE_LIGHT
        }
    }

    pub fn text(&self) -> Color {
        if self.is_dark {
            TEXT_DARK
        } else {
            TEXT_LIGHT
        }
    }

    fn control(&self, hovered: bool) -> Color {
        match (self.is_dark, hovered) {
            (true, false) => CONTROL_DARK,
            (true, true) => HOVER_DARK,
            (false, false) => CONTROL_LIGHT,
            (false, true) => HOVER_LIGHT,
        }
    }
}

fn to_color(rgba: Rgba<u8>) -> Color {
    Color::from_rgb8(rgba[0], rgba[1], rgba[2])
}

fn rounded() -> Border {
    Border {
        color: Color::TRANSPARENT,
        width: 0.0,
        radius: RADIUS.into(),
    }
}

pub fn control_button_style(theme: &GeneratorTheme, status: button::Status) -> button::Style {
    let hovered = matches!(status, button::Status::Hovered | button::Status::Pressed);
    button::Style {
        background: Some(Background::Color(theme.control(hovered))),
        text_color: theme.text(),
        border: rounded(),
        shadow: Shadow::default(),
    }
}

pub fn primary_button_style(status: button::Status) -> button::Style {
    let background = match status {
        button::Status::Disabled => ACCENT_DISABLED,
        button::Status::Hovered | button::Status::Pressed => Color { a: 0.85, ..ACCENT },
        button::Status::Active => ACCENT,
    };
    button::Style {
        background: Some(Background::Color(background)),
        text_color: Color::WHITE,
        border: rounded(),
        shadow: Shadow::default(),
    }
}

pub fn page_style(theme: &GeneratorTheme) -> container::Style {
    container::Style {
        background: Some(Background::Color(theme.page())),
        text_color: Some(theme.text()),
        border: Border::default(),
        shadow: Shadow::default(),
    }
}

pub fn stage_style(theme: &GeneratorTheme) -> container::Style {
    container::Style {
        background: Some(Background::Color(theme.stage)),
        text_color: Some(theme.ink),
        border: rounded(),
        shadow: Shadow::default(),
    }
}
