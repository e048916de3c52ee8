use bytes::Bytes;
use image::imageops::FilterType;

use super::probe::DecodeError;

/// Width of generated grid thumbnails
pub const THUMBNAIL_WIDTH: u32 = 256;

/// Decoded RGBA thumbnail, ready to hand to the grid
#[derive(Clone)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub pixels: Bytes,
}

impl std::fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thumbnail")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Generate a grid thumbnail from an asset's encoded bytes.
///
/// Thumbnails live in memory only and are rebuilt whenever the library is.
pub async fn generate_thumbnail(data: Bytes) -> Result<Thumbnail, DecodeError> {
    // Spawn blocking because full-size panoramas are expensive to decode
    tokio::task::spawn_blocking(move || generate_thumbnail_blocking(&data)).await?
}

fn generate_thumbnail_blocking(data: &[u8]) -> Result<Thumbnail, DecodeError> {
    let img = image::load_from_memory(data)?;

    // Resize maintaining aspect ratio (width-constrained)
    let thumbnail = img
        .resize(THUMBNAIL_WIDTH, THUMBNAIL_WIDTH * 10, FilterType::Triangle)
        .to_rgba8();

    let (width, height) = thumbnail.dimensions();
    Ok(Thumbnail {
        width,
        height,
        pixels: Bytes::from(thumbnail.into_raw()),
    })
}
