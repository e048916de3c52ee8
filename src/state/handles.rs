/// View handles: process-local references to in-memory asset bytes
///
/// A handle lets the grid and the renderer address an asset's payload
/// without copying it. Handles are never persisted. The allocator only
/// remembers the handle -> bytes pairing; deciding *when* to revoke is the
/// owner's job (see `Library`).

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::data::Asset;

/// Opaque, cloneable reference to an asset's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle {
    id: u64,
}

impl fmt::Display for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:pano-viewer/{}", self.id)
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    live: HashMap<u64, Bytes>,
}

/// Issues and revokes view handles.
///
/// Cheap to clone; all clones share one registry.
#[derive(Clone, Default)]
pub struct HandleAllocator {
    registry: Arc<Mutex<Registry>>,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new handle for the asset's in-memory bytes. Never fails.
    pub fn allocate(&self, asset: &Asset) -> ViewHandle {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.live.insert(id, asset.data.clone());

        let handle = ViewHandle { id };
        tracing::debug!("🔗 Allocated {} for {}", handle, asset.name);
        handle
    }

    /// Release a handle. Revoking an unknown or already revoked handle is a no-op.
    pub fn revoke(&self, handle: &ViewHandle) {
        if self.registry.lock().live.remove(&handle.id).is_some() {
            tracing::debug!("✂️  Revoked {}", handle);
        }
    }

    /// Bytes behind a live handle, or None once it has been revoked
    pub fn resolve(&self, handle: &ViewHandle) -> Option<Bytes> {
        self.registry.lock().live.get(&handle.id).cloned()
    }

    pub fn is_live(&self, handle: &ViewHandle) -> bool {
        self.registry.lock().live.contains_key(&handle.id)
    }

    /// Number of handles issued and not yet revoked
    pub fn live_count(&self) -> usize {
        self.registry.lock().live.len()
    }
}

impl fmt::Debug for HandleAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleAllocator")
            .field("live", &self.live_count())
            .finish()
    }
}
