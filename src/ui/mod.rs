/// User interface module
///
/// - `grid.rs` - the library grid of thumbnails
/// - `viewer.rs` - the immersive viewer screen and its controls
/// - `canvas.rs` - drag/zoom input layer over the rendered view

pub mod canvas;
pub mod grid;
pub mod viewer;
