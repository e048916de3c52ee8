//! The panorama renderer port.
//!
//! A renderer turns a byte-addressable source into a navigable sphere
//! mounted at a named point of the UI. Loading is asynchronous: `create`
//! returns the instance immediately together with a [`LoadSignal`] that
//! resolves once the renderer reports ready (`Ok`) or failed (`Err`).

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

use crate::state::config::ViewerConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("failed to load panorama: {0}")]
    Load(String),
    #[error("view handle {0} no longer resolves to any data")]
    Unresolved(String),
    #[error("renderer instance was destroyed before it finished loading")]
    Destroyed,
    #[error("renderer dropped its load signal")]
    SignalLost,
    #[error("renderer teardown failed: {0}")]
    Teardown(String),
}

/// Resolves once when the renderer reports ready or error
pub type LoadSignal = Pin<Box<dyn Future<Output = Result<(), RenderError>> + Send>>;

pub trait PanoramaRenderer {
    type Instance: PanoramaInstance;

    /// Start loading `source` into a new instance mounted at `mount`
    fn create(
        &mut self,
        mount: &str,
        source: Bytes,
        config: &ViewerConfig,
    ) -> Result<(Self::Instance, LoadSignal), RenderError>;
}

pub trait PanoramaInstance {
    /// Release everything the instance holds. Called at most once per instance.
    fn destroy(&mut self) -> Result<(), RenderError>;
}
