/// Ingestion module
///
/// This module handles:
/// - Reading picked files and folders into memory (source.rs)
/// - Probing image dimensions (probe.rs)
/// - The panorama aspect-ratio heuristic (classify.rs)
/// - Driving a batch into the durable store (pipeline.rs)
/// - Generating grid thumbnails (thumbnail.rs)

pub mod classify;
pub mod pipeline;
pub mod probe;
pub mod source;
pub mod thumbnail;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::Classifier;
pub use pipeline::{CancelToken, IngestError, IngestPipeline, IngestReport};
pub use probe::DecodeError;
