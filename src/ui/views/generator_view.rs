use iced::widget::{
    button, column, container, horizontal_space, image, progress_bar, radio, row, scrollable,
    text, text_input,
};
use iced::{Alignment, Element, Font, Length};

use crate::train::MAX_TEXT_LEN;
use crate::ui::style::{
    control_button_style, page_style, primary_button_style, stage_style, GeneratorTheme,
};
use crate::ui::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentMode {
    Text,
    Badges,
}

/// Everything the generator screen shows.
pub struct GeneratorState<'a> {
    pub mode: ContentMode,
    pub input: &'a str,
    pub input_error: Option<&'a str>,
    pub preview: String,
    pub progress: Option<u8>,
    /// Frames are still being captured; encoding has not begun.
    pub capturing: bool,
    pub result: Option<&'a image::Handle>,
    pub status: Option<&'a str>,
    pub can_snapshot: bool,
    pub can_generate: bool,
}

pub struct GeneratorView;

impl GeneratorView {
    pub fn view<'a>(theme: &GeneratorTheme, state: GeneratorState<'a>) -> Element<'a, Message> {
        let page = page_style(theme);
        let stage = stage_style(theme);

        let title = text("GIF Generator").size(24);
        let subtitle = text("Capture the animated train as a looping GIF").size(14);
        let header = column![title, subtitle].spacing(8);

        let modes = row![
            radio("Text", ContentMode::Text, Some(state.mode), Message::ModeChanged),
            radio("Badges", ContentMode::Badges, Some(state.mode), Message::ModeChanged),
        ]
        .spacing(16);

        let placeholder = match state.mode {
            ContentMode::Text => format!("Up to {} characters", MAX_TEXT_LEN),
            ContentMode::Badges => String::from(
                "shields.io URL, image path or label:message:color:style:logo:logoColor:labelColor per car",
            ),
        };
        // Read-only during a job so every frame has the same layout.
        let input = text_input(&placeholder, state.input)
            .on_input_maybe(state.progress.is_none().then_some(Message::ContentChanged))
            .on_submit(Message::Generate)
            .padding(8)
            .size(14);

        let mut controls = column![modes, input].spacing(8);
        if let Some(err) = state.input_error {
            controls = controls.push(text(err.to_string()).size(12));
        }

        let generate = Self::generate_row(theme, &state);
        let preview = container(
            scrollable(text(state.preview).font(Font::MONOSPACE).size(14).color(theme.ink))
                .direction(scrollable::Direction::Horizontal(Default::default())),
        )
        .width(Length::Fill)
        .padding(12)
        .style(move |_| stage);

        let mut content = column![header, controls, preview, generate]
            .spacing(20)
            .width(Length::Fill);

        if let Some(percent) = state.progress {
            content = content.push(progress_bar(0.0..=100.0, percent as f32).height(Length::Fixed(8.0)));
        }
        if let Some(status) = state.status {
            content = content.push(text(status.to_string()).size(12));
        }
        if let Some(handle) = state.result {
            content = content.push(Self::result_panel(theme, handle));
        }

        container(scrollable(content))
            .width(Length::Fill)
            .height(Length::Fill)
            .padding(20)
            .style(move |_| page)
            .into()
    }

    fn generate_row<'a>(theme: &GeneratorTheme, state: &GeneratorState<'a>) -> Element<'a, Message> {
        let label = match state.progress {
            Some(_) if state.capturing => String::from("Capturing frames..."),
            Some(percent) => format!("Generating... {}%", percent),
            None => String::from("Generate GIF"),
        };
        let generate = button(text(label).size(14))
            .padding([8, 16])
            .style(|_t, status| primary_button_style(status))
            .on_press_maybe(state.can_generate.then_some(Message::Generate));

        let mut actions = row![generate].spacing(8).align_y(Alignment::Center);
        if state.progress.is_some() {
            actions = actions.push(Self::small_button(theme, "Cancel", Message::Cancel));
        }
        if state.can_snapshot {
            actions = actions
                .push(horizontal_space())
                .push(Self::small_button(theme, "Save PNG", Message::SavePng));
        }
        actions.into()
    }

    fn result_panel<'a>(theme: &GeneratorTheme, handle: &'a image::Handle) -> Element<'a, Message> {
        let actions = row![
            Self::small_button(theme, "Save GIF", Message::SaveAs),
            Self::small_button(theme, "Save to output folder", Message::SaveToOutput),
            horizontal_space(),
            Self::small_button(theme, "Dismiss", Message::Dismiss),
        ]
        .spacing(8)
        .align_y(Alignment::Center);

        column![text("Generated GIF").size(16), image(handle.clone()), actions]
            .spacing(8)
            .into()
    }

    fn small_button(
        theme: &GeneratorTheme,
        label: &str,
        message: Message,
    ) -> Element<'static, Message> {
        let theme = *theme;
        button(text(label.to_string()).size(12))
            .padding([6, 12])
            .style(move |_t, status| control_button_style(&theme, status))
            .on_press(message)
            .into()
    }
}
