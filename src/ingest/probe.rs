/// Image dimension probing
///
/// Reads just enough of the encoded image to learn its pixel size.
/// Decoding runs on the blocking pool so large batches don't stall the UI.

use bytes::Bytes;
use image::ImageReader;
use std::io::Cursor;
use tokio::task;

/// Pixel size of a decoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// The bytes could not be read as an image. Callers reject the file and move on.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("unrecognized image format")]
    UnknownFormat,
    #[error("image has no pixels")]
    Empty,
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("decode task failed: {0}")]
    Join(String),
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        DecodeError::Decode(err.to_string())
    }
}

impl From<task::JoinError> for DecodeError {
    fn from(err: task::JoinError) -> Self {
        DecodeError::Join(err.to_string())
    }
}

/// Determine the pixel size of an encoded image
pub async fn probe_dimensions(bytes: Bytes) -> Result<Dimensions, DecodeError> {
    task::spawn_blocking(move || probe_blocking(&bytes)).await?
}

/// Blocking implementation of dimension probing
fn probe_blocking(bytes: &[u8]) -> Result<Dimensions, DecodeError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::Decode(e.to_string()))?;

    if reader.format().is_none() {
        return Err(DecodeError::UnknownFormat);
    }

    let (width, height) = reader.into_dimensions()?;
    if width == 0 || height == 0 {
        return Err(DecodeError::Empty);
    }

    Ok(Dimensions { width, height })
}
