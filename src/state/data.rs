/// Shared data structures for the application state
///
/// These structs represent the data model that flows between
/// the file picker, the ingestion pipeline, the durable store and the UI.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;

/// A file handed over by the host's file-selection facility, before classification
#[derive(Clone)]
pub struct RawFile {
    /// File name only (e.g., "IMG_0001.jpg")
    pub name: String,
    /// Declared size in bytes
    pub size: u64,
    /// Declared MIME type (e.g., "image/jpeg")
    pub mime_type: String,
    /// Last modification time reported by the host
    pub last_modified: DateTime<Utc>,
    /// Raw file contents
    pub data: Bytes,
}

impl RawFile {
    /// Only files declared as `image/*` are considered for the library
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// An accepted panorama.
///
/// The name is the identity: a later asset with the same name replaces the
/// stored one. Assets are never mutated in place.
#[derive(Clone, PartialEq)]
pub struct Asset {
    pub name: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub mime_type: String,
    pub data: Bytes,
}

impl From<RawFile> for Asset {
    fn from(file: RawFile) -> Self {
        Self {
            name: file.name,
            size: file.size,
            last_modified: file.last_modified,
            mime_type: file.mime_type,
            data: file.data,
        }
    }
}

// Payloads can be hundreds of megabytes, print their length only
impl fmt::Debug for RawFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFile")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("mime_type", &self.mime_type)
            .field("last_modified", &self.last_modified)
            .field("data", &format_args!("<{} bytes>", self.data.len()))
            .finish()
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("mime_type", &self.mime_type)
            .field("last_modified", &self.last_modified)
            .field("data", &format_args!("<{} bytes>", self.data.len()))
            .finish()
    }
}
