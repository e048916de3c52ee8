/// CPU equirectangular panorama renderer
///
/// The source image is decoded once on the blocking pool, then every view is
/// produced by casting a ray per output pixel through a pinhole camera and
/// sampling the equirectangular source at the ray's longitude/latitude.
/// Rows are projected in parallel.

use bytes::Bytes;
use cgmath::{Deg, InnerSpace, Matrix3, Vector3};
use image::imageops::FilterType;
use image::RgbaImage;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::f32::consts::{PI, TAU};
use std::sync::Arc;

use super::renderer::{LoadSignal, PanoramaInstance, PanoramaRenderer, RenderError};
use crate::state::config::ViewerConfig;

/// Degrees of field of view removed per zoom step
const ZOOM_STEP: f32 = 5.0;

/// Where the viewer is looking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Degrees, normalized to (-180, 180]
    pub yaw: f32,
    /// Degrees, clamped to [-90, 90]
    pub pitch: f32,
    /// Horizontal field of view in degrees
    pub hfov: f32,
    min_hfov: f32,
    max_hfov: f32,
}

impl Camera {
    pub fn from_config(config: &ViewerConfig) -> Self {
        let mut camera = Self {
            yaw: 0.0,
            pitch: 0.0,
            hfov: config.hfov,
            min_hfov: config.min_hfov.min(config.max_hfov),
            max_hfov: config.max_hfov.max(config.min_hfov),
        };
        camera.look(config.yaw, config.pitch);
        camera.hfov = camera.hfov.clamp(camera.min_hfov, camera.max_hfov);
        camera
    }

    fn look(&mut self, yaw: f32, pitch: f32) {
        let mut yaw = yaw.rem_euclid(360.0);
        if yaw > 180.0 {
            yaw -= 360.0;
        }
        self.yaw = yaw;
        self.pitch = pitch.clamp(-90.0, 90.0);
    }

    /// Pan by a drag expressed as a fraction of the view width
    pub fn drag(&mut self, dx: f32, dy: f32) {
        self.look(self.yaw - dx * self.hfov, self.pitch + dy * self.hfov);
    }

    /// Positive steps zoom in
    pub fn zoom(&mut self, steps: f32) {
        self.hfov = (self.hfov - steps * ZOOM_STEP).clamp(self.min_hfov, self.max_hfov);
    }

    /// Auto-rotate by `speed` degrees per second
    pub fn advance(&mut self, seconds: f32, speed: f32) {
        self.look(self.yaw + speed * seconds, self.pitch);
    }
}

/// Project the equirectangular `panorama` into a `width` x `height` view
pub fn project(panorama: &RgbaImage, camera: &Camera, width: u32, height: u32) -> RgbaImage {
    let mut view = RgbaImage::new(width, height);
    let (src_width, src_height) = panorama.dimensions();
    if width == 0 || height == 0 || src_width == 0 || src_height == 0 {
        return view;
    }

    let focal = (width as f32 / 2.0) / (camera.hfov.to_radians() / 2.0).tan();
    let rotation = Matrix3::from_angle_y(Deg(camera.yaw)) * Matrix3::from_angle_x(Deg(-camera.pitch));
    let half_width = width as f32 / 2.0;
    let half_height = height as f32 / 2.0;

    view.par_chunks_mut(width as usize * 4)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let ray = Vector3::new(
                    x as f32 + 0.5 - half_width,
                    half_height - (y as f32 + 0.5),
                    focal,
                );
                let world = (rotation * ray).normalize();

                let longitude = world.x.atan2(world.z);
                let latitude = world.y.clamp(-1.0, 1.0).asin();

                let u = ((longitude / TAU + 0.5) * src_width as f32) as u32 % src_width;
                let v = (((0.5 - latitude / PI) * src_height as f32) as u32).min(src_height - 1);

                row[x * 4..x * 4 + 4].copy_from_slice(&panorama.get_pixel(u, v).0);
            }
        });

    view
}

/// Decode the source and cap its width
fn decode_panorama(source: &[u8], max_width: u32) -> Result<RgbaImage, RenderError> {
    let img = image::load_from_memory(source).map_err(|e| RenderError::Load(e.to_string()))?;

    let img = if max_width > 0 && img.width() > max_width {
        let scaled_height = (u64::from(img.height()) * u64::from(max_width) / u64::from(img.width())).max(1);
        img.resize_exact(max_width, scaled_height as u32, FilterType::Triangle)
    } else {
        img
    };

    Ok(img.to_rgba8())
}

#[derive(Default)]
struct Slot {
    panorama: Option<Arc<RgbaImage>>,
    destroyed: bool,
}

/// One loaded (or loading) panorama
pub struct EquirectInstance {
    mount: String,
    slot: Arc<Mutex<Slot>>,
}

impl EquirectInstance {
    pub fn mount(&self) -> &str {
        &self.mount
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.lock().panorama.is_some()
    }

    /// Size of the decoded source, once loaded
    pub fn source_size(&self) -> Option<(u32, u32)> {
        self.slot.lock().panorama.as_ref().map(|p| p.dimensions())
    }

    /// Render the current view, or None if nothing is loaded
    pub fn render_view(&self, camera: &Camera, width: u32, height: u32) -> Option<RgbaImage> {
        let panorama = self.slot.lock().panorama.clone()?;
        Some(project(&panorama, camera, width, height))
    }
}

impl PanoramaInstance for EquirectInstance {
    fn destroy(&mut self) -> Result<(), RenderError> {
        let mut slot = self.slot.lock();
        if slot.destroyed {
            return Err(RenderError::Teardown(format!("{} already destroyed", self.mount)));
        }
        slot.destroyed = true;
        slot.panorama = None;
        Ok(())
    }
}

impl std::fmt::Debug for EquirectInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EquirectInstance")
            .field("mount", &self.mount)
            .field("source_size", &self.source_size())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct EquirectRenderer;

impl PanoramaRenderer for EquirectRenderer {
    type Instance = EquirectInstance;

    fn create(
        &mut self,
        mount: &str,
        source: Bytes,
        config: &ViewerConfig,
    ) -> Result<(EquirectInstance, LoadSignal), RenderError> {
        let slot = Arc::new(Mutex::new(Slot::default()));
        let max_width = config.max_source_width;

        let loading = slot.clone();
        let signal: LoadSignal = Box::pin(async move {
            let decoded = tokio::task::spawn_blocking(move || decode_panorama(&source, max_width))
                .await
                .map_err(|e| RenderError::Load(e.to_string()))??;

            let mut loading = loading.lock();
            if loading.destroyed {
                return Err(RenderError::Destroyed);
            }
            tracing::info!("🌐 Panorama decoded: {}x{}", decoded.width(), decoded.height());
            loading.panorama = Some(Arc::new(decoded));
            Ok(())
        });

        let instance = EquirectInstance {
            mount: mount.to_string(),
            slot,
        };
        Ok((instance, signal))
    }
}
