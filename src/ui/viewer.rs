use iced::widget::image::Handle as ImageHandle;
use iced::widget::{button, canvas, column, container, horizontal_space, image, row, stack, text, toggler, Row};
use iced::{Alignment, ContentFit, Element, Length};

use super::canvas::ViewerInput;
use crate::state::config::ViewerConfig;
use crate::viewer::Phase;
use crate::Message;

/// Everything the viewer screen needs to draw itself
pub struct ViewerScreen<'a> {
    pub asset_name: Option<&'a str>,
    pub phase: Phase,
    pub frame: Option<&'a ImageHandle>,
    pub config: &'a ViewerConfig,
    pub fullscreen: bool,
}

pub fn viewer_view(screen: ViewerScreen<'_>) -> Element<'_, Message> {
    column![controls(&screen), body(&screen)]
        .spacing(8)
        .padding(8)
        .into()
}

fn controls<'a>(screen: &ViewerScreen<'a>) -> Element<'a, Message> {
    let mut bar: Row<Message> = row![
        button("← Back").on_press(Message::Back).padding(8),
        text(screen.asset_name.unwrap_or_default()).size(16),
        horizontal_space(),
    ]
    .spacing(12)
    .align_y(Alignment::Center);

    if screen.config.show_zoom_controls {
        bar = bar
            .push(button("−").on_press(Message::Zoom(-1.0)).padding(8))
            .push(button("+").on_press(Message::Zoom(1.0)).padding(8));
    }

    bar = bar.push(
        toggler(screen.config.auto_rotate)
            .label("Auto-rotate")
            .on_toggle(Message::ToggleAutoRotate),
    );

    if screen.config.show_fullscreen_control {
        let label = if screen.fullscreen { "Exit fullscreen" } else { "Fullscreen" };
        bar = bar.push(button(label).on_press(Message::ToggleFullscreen).padding(8));
    }

    bar.into()
}

fn body<'a>(screen: &ViewerScreen<'a>) -> Element<'a, Message> {
    match (screen.phase, screen.frame) {
        (Phase::Ready, Some(frame)) => stack![
            image::<ImageHandle>(frame.clone())
                .content_fit(ContentFit::Cover)
                .width(Length::Fill)
                .height(Length::Fill),
            canvas(ViewerInput).width(Length::Fill).height(Length::Fill),
        ]
        .width(Length::Fill)
        .height(Length::Fill)
        .into(),
        _ => container(text("Loading…").size(20))
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x(Length::Fill)
            .center_y(Length::Fill)
            .into(),
    }
}
