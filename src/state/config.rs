/// Policy defaults for classification and viewing
///
/// Serializable defaults, persisted as JSON in the store's `settings` table.

use serde::{Deserialize, Serialize};

/// Panorama acceptance heuristic
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
    /// Expected width / height ratio (2:1 for equirectangular)
    pub target_ratio: f64,
    /// Accepted iff |ratio - target_ratio| < tolerance (strict)
    pub tolerance: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            target_ratio: 2.0,
            tolerance: 0.1,
        }
    }
}

/// Projection used by the renderer
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    #[default]
    Equirectangular,
}

/// Fixed renderer configuration handed to every new viewer session
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    pub projection: Projection,

    // ========== Motion ==========

    /// Rotate the view automatically while idle
    pub auto_rotate: bool,
    /// Auto-rotate speed in degrees per second
    /// - Negative values rotate counter-clockwise
    pub auto_rotate_speed: f32,

    // ========== Field of view ==========

    /// Initial horizontal field of view in degrees
    pub hfov: f32,
    pub min_hfov: f32,
    pub max_hfov: f32,

    // ========== Orientation ==========

    /// Initial yaw in degrees (0 = center of the panorama)
    pub yaw: f32,
    /// Initial pitch in degrees (0 = horizon)
    pub pitch: f32,

    // ========== Controls ==========

    pub show_zoom_controls: bool,
    pub show_fullscreen_control: bool,

    /// Sources wider than this are downscaled once at load time
    pub max_source_width: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            projection: Projection::Equirectangular,
            auto_rotate: true,
            auto_rotate_speed: -2.0,
            hfov: 100.0,
            min_hfov: 50.0,
            max_hfov: 120.0,
            yaw: 0.0,
            pitch: 0.0,
            show_zoom_controls: true,
            show_fullscreen_control: true,
            max_source_width: 4096,
        }
    }
}

/// Everything the application persists besides the assets themselves
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub classifier: ClassifierConfig,
    pub viewer: ViewerConfig,
}

impl AppConfig {
    /// Convert to JSON string for database storage
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON string (from database)
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
