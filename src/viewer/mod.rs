/// Immersive viewer module
///
/// Architecture:
/// - `renderer.rs` - the panorama renderer port (create / load signal / destroy)
/// - `equirect.rs` - CPU equirectangular renderer and camera
/// - `session.rs` - the single-session controller state machine

pub mod equirect;
pub mod renderer;
pub mod session;

pub use equirect::{Camera, EquirectInstance, EquirectRenderer};
pub use renderer::{PanoramaInstance, PanoramaRenderer, RenderError};
pub use session::{LoadOutcome, Phase, ViewerController, ViewerError};
