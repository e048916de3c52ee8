use iced::widget::image::Handle as ImageHandle;
use iced::widget::{button, column, container, image, row, scrollable, text, Row};
use iced::{Alignment, Element, Length};
use std::collections::HashMap;

use crate::state::library::{Library, LibraryEntry};
use crate::Message;

const TILE_WIDTH: f32 = 256.0;
const TILE_HEIGHT: f32 = 128.0;

/// Thumbnails by asset name. `None` means generation failed.
pub type Thumbnails = HashMap<String, Option<ImageHandle>>;

/// The library grid. Tiles are disabled while `interactive` is false.
pub fn grid_view<'a>(library: &'a Library, thumbnails: &'a Thumbnails, interactive: bool) -> Element<'a, Message> {
    if library.is_empty() {
        return container(text("No panoramas yet. Select files or import a folder to get started.").size(16))
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x(Length::Fill)
            .center_y(Length::Fill)
            .into();
    }

    let tiles: Row<Message> = row(library
        .entries()
        .iter()
        .map(|entry| tile(entry, thumbnails.get(entry.name()), interactive)))
    .spacing(16);

    scrollable(container(tiles.wrap()).padding(16).width(Length::Fill))
        .height(Length::Fill)
        .into()
}

fn tile<'a>(entry: &'a LibraryEntry, thumbnail: Option<&'a Option<ImageHandle>>, interactive: bool) -> Element<'a, Message> {
    let preview: Element<Message> = match thumbnail {
        Some(Some(handle)) => image::<ImageHandle>(handle.clone())
            .width(TILE_WIDTH)
            .height(TILE_HEIGHT)
            .into(),
        Some(None) => placeholder("Preview unavailable"),
        None => placeholder("Loading…"),
    };

    let content = column![preview, text(entry.name()).size(12)]
        .spacing(6)
        .align_x(Alignment::Center);

    button(content)
        .on_press_maybe(interactive.then(|| Message::OpenViewer(entry.name().to_string())))
        .padding(6)
        .into()
}

fn placeholder(label: &str) -> Element<'_, Message> {
    container(text(label).size(12))
        .width(TILE_WIDTH)
        .height(TILE_HEIGHT)
        .center_x(TILE_WIDTH)
        .center_y(TILE_HEIGHT)
        .into()
}
