use super::data::Asset;
use super::handles::{HandleAllocator, ViewHandle};
use super::store::{AssetStore, StoreError};

/// One library entry: an asset paired with the view handle that addresses it
#[derive(Debug, Clone)]
pub struct LibraryEntry {
    asset: Asset,
    handle: ViewHandle,
}

impl LibraryEntry {
    pub fn new(asset: Asset, handle: ViewHandle) -> Self {
        Self { asset, handle }
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn name(&self) -> &str {
        &self.asset.name
    }

    pub fn handle(&self) -> ViewHandle {
        self.handle
    }
}

/// The Library is the in-memory working set shown in the grid.
///
/// It owns exactly one live view handle per asset and is the only place
/// that revokes them: on replacement, on clear and on drop.
pub struct Library {
    handles: HandleAllocator,
    entries: Vec<LibraryEntry>,
}

impl Library {
    pub fn new(handles: HandleAllocator) -> Self {
        Self {
            handles,
            entries: Vec::new(),
        }
    }

    /// Rebuild the library from everything persisted in the store.
    ///
    /// Store order is unspecified, so entries are sorted by name.
    pub fn load_from(&mut self, store: &dyn AssetStore) -> Result<usize, StoreError> {
        let mut assets = store.get_all()?;
        assets.sort_by(|a, b| a.name.cmp(&b.name));
        self.replace_with_assets(assets);

        tracing::info!("🖼️  Library loaded with {} panoramas", self.entries.len());
        Ok(self.entries.len())
    }

    /// Replace the working set with freshly allocated handles for `assets`
    pub fn replace_with_assets(&mut self, assets: Vec<Asset>) {
        let entries = assets
            .into_iter()
            .map(|asset| {
                let handle = self.handles.allocate(&asset);
                LibraryEntry::new(asset, handle)
            })
            .collect();
        self.adopt(entries);
    }

    /// Replace the working set with entries whose handles were already
    /// allocated (e.g. by ingestion). The library takes over revocation.
    pub fn adopt(&mut self, entries: Vec<LibraryEntry>) {
        self.clear();
        self.entries = entries;
    }

    /// Drop every entry, revoking its handle
    pub fn clear(&mut self) {
        for entry in self.entries.drain(..) {
            self.handles.revoke(&entry.handle);
        }
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&LibraryEntry> {
        self.entries.iter().find(|entry| entry.name() == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn handles(&self) -> &HandleAllocator {
        &self.handles
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("entries", &self.entries.len())
            .field("handles", &self.handles)
            .finish()
    }
}
