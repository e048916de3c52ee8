/// Raw file input: turns picked paths into named in-memory blobs
///
/// The host hands us paths (from the file dialog or a folder walk). Each one is
/// read fully into memory and tagged with a MIME type derived from its extension.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::state::data::RawFile;

const UNKNOWN_MIME: &str = "application/octet-stream";

/// MIME type from the file extension, `application/octet-stream` if unknown
pub fn mime_type_for(path: &Path) -> &'static str {
    image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type())
        .unwrap_or(UNKNOWN_MIME)
}

/// Collect every file below `folder`, sorted by path for a stable input order
pub fn collect_folder(folder: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(folder)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();
    paths
}

/// Read picked files in the order given. Unreadable files are logged and skipped.
pub async fn read_files(paths: Vec<PathBuf>) -> Vec<RawFile> {
    let mut files = Vec::with_capacity(paths.len());

    for path in paths {
        match read_file(&path).await {
            Ok(file) => files.push(file),
            Err(e) => tracing::warn!("⚠️  Could not read {}: {}", path.display(), e),
        }
    }

    tracing::info!("🔍 Read {} files", files.len());
    files
}

async fn read_file(path: &Path) -> std::io::Result<RawFile> {
    let metadata = tokio::fs::metadata(path).await?;
    let data = tokio::fs::read(path).await?;

    let last_modified: DateTime<Utc> = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    let name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    Ok(RawFile {
        name,
        size: metadata.len(),
        mime_type: mime_type_for(path).to_string(),
        last_modified,
        data: Bytes::from(data),
    })
}
