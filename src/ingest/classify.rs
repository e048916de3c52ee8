use crate::state::config::ClassifierConfig;

/// Decides whether an image is an equirectangular panorama.
///
/// This is an aspect-ratio heuristic, not a format check: a 2:1 photo of
/// a wall passes, a slightly cropped panorama may not.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classifier {
    target_ratio: f64,
    tolerance: f64,
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            target_ratio: config.target_ratio,
            tolerance: config.tolerance,
        }
    }

    /// Accept iff |width / height - target| < tolerance
    pub fn classify(&self, width: u32, height: u32) -> bool {
        if height == 0 {
            return false;
        }
        let ratio = f64::from(width) / f64::from(height);
        (ratio - self.target_ratio).abs() < self.tolerance
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}
