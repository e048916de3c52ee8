//! Fixtures shared by the ingestion and viewer tests

use bytes::Bytes;
use chrono::Utc;
use std::io::Cursor;

use crate::state::data::RawFile;

/// Encode a blank RGB image of the given size as PNG
pub fn encode_png(width: u32, height: u32) -> Bytes {
    let image = image::RgbImage::new(width, height);
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode test png");
    Bytes::from(out.into_inner())
}

/// A picked file carrying a PNG of the given size
pub fn png_file(name: &str, width: u32, height: u32) -> RawFile {
    let data = encode_png(width, height);
    RawFile {
        name: name.to_string(),
        size: data.len() as u64,
        mime_type: "image/png".to_string(),
        last_modified: Utc::now(),
        data,
    }
}

/// A picked file with arbitrary contents and MIME type
pub fn file_with(name: &str, mime_type: &str, data: &'static [u8]) -> RawFile {
    RawFile {
        name: name.to_string(),
        size: data.len() as u64,
        mime_type: mime_type.to_string(),
        last_modified: Utc::now(),
        data: Bytes::from_static(data),
    }
}
