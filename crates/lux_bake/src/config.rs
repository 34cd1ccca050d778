//! Bake configuration, read from JSON. Every field is optional.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lux_baker::{FilteringParameters, UpdateParameters};
use lux_collider::Technique;
use lux_core::Color;
use lux_solver::{PropagationParameters, SmoothingParameters};
use serde::{Deserialize, Serialize};

/// Collision structure choice as written in config files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechniqueName {
    Linear,
    BspCompact,
    #[default]
    BspFast,
    Verification,
}

impl From<TechniqueName> for Technique {
    fn from(name: TechniqueName) -> Self {
        match name {
            TechniqueName::Linear => Technique::Linear,
            TechniqueName::BspCompact => Technique::BspCompact,
            TechniqueName::BspFast => Technique::BspFast,
            TechniqueName::Verification => Technique::Verification,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeConfig {
    /// Width and height of every baked lightmap
    pub lightmap_size: u32,
    /// Wall-clock budget for the solver, in seconds
    pub solve_seconds: f32,
    /// Upper bound on `calculate` calls
    pub max_solve_steps: u32,
    pub technique: TechniqueName,
    pub smoothing: SmoothingParameters,
    pub propagation: PropagationParameters,
    pub update: UpdateParameters,
    pub filtering: FilteringParameters,
    /// Lat-long image lighting the scene; a uniform sky otherwise
    pub environment: Option<PathBuf>,
    pub sky: Color,
    /// Also capture a lat-long map at the room center
    pub capture_environment: bool,
    pub output_dir: PathBuf,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            lightmap_size: 128,
            solve_seconds: 2.0,
            max_solve_steps: 64,
            technique: TechniqueName::default(),
            smoothing: SmoothingParameters::default(),
            propagation: PropagationParameters::default(),
            update: UpdateParameters::default(),
            filtering: FilteringParameters::default(),
            environment: None,
            sky: Color::ZERO,
            capture_environment: false,
            output_dir: PathBuf::from("lightmaps"),
        }
    }
}

impl BakeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }
}
