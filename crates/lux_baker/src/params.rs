//! Bake configuration.

use lux_core::Color;
use serde::{Deserialize, Serialize};

/// Quantity written to output buffers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputQuantity {
    #[default]
    Irradiance,
    /// Irradiance times diffuse reflectance plus emittance
    Exitance,
}

/// Controls one `update_lightmap` / `update_environment_map` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateParameters {
    /// Hemisphere rays per texel (or per vertex corner)
    pub quality: u32,
    /// Shoot shadow rays at registered lights
    pub apply_lights: bool,
    /// Sample the environment on rays that leave the scene
    pub apply_environment: bool,
    /// Read the solver's exitance where rays hit
    pub apply_current_solution: bool,
    /// Hits farther than this count as misses
    pub locality: f32,
    /// Hits closer than this are unreliable
    pub rug_distance: f32,
    /// Unreliable fraction above which a sample is discarded
    pub inside_objects_threshold: f32,
    pub quantity: OutputQuantity,
}

impl Default for UpdateParameters {
    fn default() -> Self {
        Self {
            quality: 100,
            apply_lights: true,
            apply_environment: false,
            apply_current_solution: true,
            locality: 100_000.0,
            rug_distance: 0.001,
            inside_objects_threshold: 1.0,
            quantity: OutputQuantity::Irradiance,
        }
    }
}

/// Post-bake cleanup of lightmaps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilteringParameters {
    /// Hole-filling passes
    pub spread_passes: u32,
    /// Treat the map as toroidal (texel coordinates wrap)
    pub wrap: bool,
    /// Color of texels no pass reached; zero when `None`
    pub background: Option<Color>,
}

impl Default for FilteringParameters {
    fn default() -> Self {
        Self {
            spread_passes: 2,
            wrap: true,
            background: None,
        }
    }
}
