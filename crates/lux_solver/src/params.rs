//! Solver configuration.

use serde::{Deserialize, Serialize};

/// Controls vertex stitching, smoothing groups and adaptive subdivision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingParameters {
    /// Vertices closer than this are treated as one
    pub min_feature_size: f32,
    /// Max angle (radians) between normals smoothed together
    pub max_smooth_angle: f32,
    /// Subdivision aggressiveness; 0 disables subdivision
    pub subdivision_speed: f32,
    pub max_subdivision_depth: u8,
    /// Patches at or below this area are never split
    pub min_patch_area: f32,
}

impl Default for SmoothingParameters {
    fn default() -> Self {
        Self {
            min_feature_size: 0.0,
            max_smooth_angle: 0.5,
            subdivision_speed: 1.0,
            max_subdivision_depth: 6,
            min_patch_area: 1e-4,
        }
    }
}

/// Controls energy propagation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationParameters {
    /// Rays shot per selected patch
    pub rays_per_shot: u32,
    /// Stop once no patch holds more than this fraction of the primary power
    pub convergence_threshold: f32,
    /// Bounces through specular reflection/transmission per ray
    pub max_specular_depth: u32,
    pub seed: u64,
}

impl Default for PropagationParameters {
    fn default() -> Self {
        Self {
            rays_per_shot: 256,
            convergence_threshold: 1e-3,
            max_specular_depth: 4,
            seed: 0x5eed,
        }
    }
}
