/// Ingestion: picked files -> probe -> classify -> durable store
///
/// Files are considered strictly in input order. Nothing is persisted until
/// the whole batch has been classified, so a failure or cancellation halfway
/// through never leaves a partial batch in the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::classify::Classifier;
use super::probe::probe_dimensions;
use crate::state::data::{Asset, RawFile};
use crate::state::handles::HandleAllocator;
use crate::state::library::LibraryEntry;
use crate::state::store::SharedStore;

/// Advisory cancellation flag shared between the UI and a running ingestion
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum IngestError {
    #[error("ingestion cancelled after {considered} images")]
    Cancelled { considered: usize },
}

/// Result of a completed ingestion run
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Accepted panoramas in input order, each with its live view handle
    pub entries: Vec<LibraryEntry>,
    /// Images considered (accepted, rejected or undecodable)
    pub considered: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Set when the batch could not be written; the entries are session-only
    pub persist_warning: Option<String>,
}

impl IngestReport {
    pub fn accepted(&self) -> usize {
        self.entries.len()
    }
}

/// Drives a batch of picked files through the prober, the classifier and the store.
///
/// Not reentrant: the caller must not start a second run while one is in flight.
#[derive(Clone)]
pub struct IngestPipeline {
    classifier: Classifier,
    handles: HandleAllocator,
    store: SharedStore,
}

impl IngestPipeline {
    pub fn new(classifier: Classifier, handles: HandleAllocator, store: SharedStore) -> Self {
        Self {
            classifier,
            handles,
            store,
        }
    }

    /// Run the batch.
    ///
    /// `on_progress` receives the running count of images considered so far.
    /// Once `cancel` is observed no further progress is reported, nothing is
    /// persisted and every handle allocated by this run is revoked.
    pub async fn ingest<F>(
        &self,
        files: Vec<RawFile>,
        mut on_progress: F,
        cancel: &CancelToken,
    ) -> Result<IngestReport, IngestError>
    where
        F: FnMut(usize),
    {
        let mut entries: Vec<LibraryEntry> = Vec::new();
        let mut considered = 0;
        let mut rejected = 0;
        let mut failed = 0;

        for file in files {
            if cancel.is_cancelled() {
                return Err(self.abandon(entries, considered));
            }

            if !file.is_image() {
                tracing::debug!("⏭️  Skipping {} ({})", file.name, file.mime_type);
                continue;
            }

            let asset = Asset::from(file);
            let handle = self.handles.allocate(&asset);
            let probed = probe_dimensions(asset.data.clone()).await;

            // Not counted: its progress call will never fire
            if cancel.is_cancelled() {
                self.handles.revoke(&handle);
                return Err(self.abandon(entries, considered));
            }
            considered += 1;

            match probed {
                Ok(dims) if self.classifier.classify(dims.width, dims.height) => {
                    tracing::debug!("✅ {} is a panorama ({}x{})", asset.name, dims.width, dims.height);
                    self.accept(&mut entries, LibraryEntry::new(asset, handle));
                }
                Ok(dims) => {
                    tracing::debug!("❌ {} rejected ({}x{})", asset.name, dims.width, dims.height);
                    self.handles.revoke(&handle);
                    rejected += 1;
                }
                Err(e) => {
                    tracing::warn!("⚠️  Skipping {}: {}", asset.name, e);
                    self.handles.revoke(&handle);
                    failed += 1;
                }
            }

            on_progress(considered);
        }

        if cancel.is_cancelled() {
            return Err(self.abandon(entries, considered));
        }

        let assets: Vec<Asset> = entries.iter().map(|entry| entry.asset().clone()).collect();
        let persist_warning = match self.persist(assets).await {
            Ok(()) => None,
            Err(reason) => {
                tracing::warn!("⚠️  Could not persist {} panoramas: {}", entries.len(), reason);
                Some(reason)
            }
        };

        tracing::info!(
            "📊 Ingestion complete: {} accepted, {} rejected, {} unreadable",
            entries.len(),
            rejected,
            failed
        );

        Ok(IngestReport {
            entries,
            considered,
            rejected,
            failed,
            persist_warning,
        })
    }

    /// Names are unique: a later file replaces an earlier one of the same name
    fn accept(&self, entries: &mut Vec<LibraryEntry>, entry: LibraryEntry) {
        match entries.iter_mut().find(|existing| existing.name() == entry.name()) {
            Some(existing) => {
                tracing::debug!("🔁 {} appears twice in the batch, keeping the later one", entry.name());
                let replaced = std::mem::replace(existing, entry);
                self.handles.revoke(&replaced.handle());
            }
            None => entries.push(entry),
        }
    }

    /// Write the batch on the blocking pool; blobs can be large
    async fn persist(&self, assets: Vec<Asset>) -> Result<(), String> {
        let store = self.store.clone();
        let written = tokio::task::spawn_blocking(move || {
            let mut store = store.lock();
            store.put_all(&assets)
        });
        match written.await {
            Ok(written) => written.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Revoke everything this run allocated and report the cancellation
    fn abandon(&self, entries: Vec<LibraryEntry>, considered: usize) -> IngestError {
        for entry in &entries {
            self.handles.revoke(&entry.handle());
        }
        tracing::info!("🛑 Ingestion cancelled after {} images", considered);
        IngestError::Cancelled { considered }
    }
}
