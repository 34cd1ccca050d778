//! Output buffers the baker writes into.
//!
//! Lightmaps and per-vertex buffers share one contract: a flat list of
//! slots addressed by index plus a layout telling the baker how to fill it.

use lux_math::Vec3;
use thiserror::Error;

use crate::{Color, Scaler};

/// Errors that can occur while allocating output buffers.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BufferError {
    #[error("Buffer has zero size")]
    ZeroSize,

    #[error("Out of memory allocating {slots} slots")]
    OutOfMemory { slots: usize },
}

pub type BufferResult<T> = Result<T, BufferError>;

/// Shape of an output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferLayout {
    /// Row-major texels, v = 0 on the first row.
    Texels { width: u32, height: u32 },
    /// One slot per mesh vertex (post-import numbering).
    Vertices(usize),
}

impl BufferLayout {
    pub fn slot_count(&self) -> usize {
        match *self {
            BufferLayout::Texels { width, height } => width as usize * height as usize,
            BufferLayout::Vertices(n) => n,
        }
    }
}

/// Destination of baked illumination.
pub trait OutputBuffer: Send {
    fn layout(&self) -> BufferLayout;

    /// Store the final color of slot `index`; `weight` is the sample
    /// reliability in `[0, 1]` (0 = filled from neighbours or background).
    fn render_texel(&mut self, index: usize, color: Color, weight: f32);
}

fn allocate(slots: usize) -> BufferResult<Vec<[f32; 4]>> {
    if slots == 0 {
        return Err(BufferError::ZeroSize);
    }
    let mut texels = Vec::new();
    texels
        .try_reserve_exact(slots)
        .map_err(|_| BufferError::OutOfMemory { slots })?;
    texels.resize(slots, [0.0; 4]);
    Ok(texels)
}

/// RGBA float lightmap. Alpha holds the weight.
#[derive(Debug, Clone)]
pub struct LightmapBuffer {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

impl LightmapBuffer {
    /// Create a new lightmap filled with transparent black.
    pub fn new(width: u32, height: u32) -> BufferResult<Self> {
        let texels = allocate(width as usize * height as usize)?;
        Ok(Self {
            width,
            height,
            texels,
        })
    }

    /// Get the color at (x, y).
    pub fn get(&self, x: u32, y: u32) -> Color {
        let [r, g, b, _] = self.texels[(y * self.width + x) as usize];
        Vec3::new(r, g, b)
    }

    /// Get the stored weight at (x, y).
    pub fn weight(&self, x: u32, y: u32) -> f32 {
        self.texels[(y * self.width + x) as usize][3]
    }

    /// Raw bytes, e.g. for GPU upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    /// Convert to 8-bit RGBA (for display or saving).
    ///
    /// Colors are converted with `scaler` (physical → custom) when given,
    /// then clamped to [0, 1].
    pub fn to_rgba8(&self, scaler: Option<&dyn Scaler>) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.texels.len() * 4);
        for &[r, g, b, _] in &self.texels {
            let mut color = Vec3::new(r, g, b);
            if let Some(scaler) = scaler {
                color = scaler.from_physical(color);
            }
            let color = color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0;
            bytes.extend_from_slice(&[color.x as u8, color.y as u8, color.z as u8, 255]);
        }
        bytes
    }
}

impl OutputBuffer for LightmapBuffer {
    fn layout(&self) -> BufferLayout {
        BufferLayout::Texels {
            width: self.width,
            height: self.height,
        }
    }

    fn render_texel(&mut self, index: usize, color: Color, weight: f32) {
        debug_assert!(index < self.texels.len());
        if let Some(texel) = self.texels.get_mut(index) {
            *texel = [color.x, color.y, color.z, weight];
        }
    }
}

/// Per-vertex RGBA colors.
#[derive(Debug, Clone)]
pub struct VertexBuffer {
    pub colors: Vec<[f32; 4]>,
}

impl VertexBuffer {
    pub fn new(vertex_count: usize) -> BufferResult<Self> {
        Ok(Self {
            colors: allocate(vertex_count)?,
        })
    }

    pub fn get(&self, vertex: usize) -> Option<Color> {
        self.colors.get(vertex).map(|&[r, g, b, _]| Vec3::new(r, g, b))
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.colors)
    }
}

impl OutputBuffer for VertexBuffer {
    fn layout(&self) -> BufferLayout {
        BufferLayout::Vertices(self.colors.len())
    }

    fn render_texel(&mut self, index: usize, color: Color, weight: f32) {
        debug_assert!(index < self.colors.len());
        if let Some(slot) = self.colors.get_mut(index) {
            *slot = [color.x, color.y, color.z, weight];
        }
    }
}
