//! Environment (sky) radiance sampled by rays that leave the scene.
//!
//! Lat-long maps use a Y-up convention: `u` wraps around the vertical axis,
//! `v = 0` is straight up.

use std::path::Path;

use lux_math::{Vec2, Vec3};
use std::f32::consts::{PI, TAU};
use thiserror::Error;

use crate::Color;

/// Errors that can occur during environment loading.
#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Environment map {width}x{height} has no pixels")]
    Empty { width: u32, height: u32 },

    #[error("Pixel count {got} doesn't match {width}x{height}")]
    SizeMismatch { width: u32, height: u32, got: usize },
}

pub type EnvironmentResult<T> = Result<T, EnvironmentError>;

/// Radiance arriving from infinity along a direction.
pub trait Environment: Send + Sync {
    /// Radiance seen when looking along `direction` (unit), physical units.
    fn radiance(&self, direction: Vec3) -> Color;
}

/// Same radiance from every direction.
#[derive(Debug, Clone, Copy)]
pub struct UniformEnvironment(pub Color);

impl Environment for UniformEnvironment {
    fn radiance(&self, _direction: Vec3) -> Color {
        self.0
    }
}

/// Direction for lat-long coordinates in `[0, 1]^2`.
pub fn latlong_direction(uv: Vec2) -> Vec3 {
    let phi = uv.x * TAU;
    let theta = uv.y * PI;
    let (sin_t, cos_t) = theta.sin_cos();
    Vec3::new(sin_t * phi.cos(), cos_t, sin_t * phi.sin())
}

/// Lat-long coordinates of a unit direction.
pub fn direction_to_latlong(direction: Vec3) -> Vec2 {
    let phi = direction.z.atan2(direction.x);
    let u = (phi / TAU).rem_euclid(1.0);
    let v = direction.y.clamp(-1.0, 1.0).acos() / PI;
    Vec2::new(u, v)
}

/// Equirectangular environment map with linear float pixels.
#[derive(Debug, Clone)]
pub struct LatLongEnvironment {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Color>,
}

impl LatLongEnvironment {
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Color>) -> EnvironmentResult<Self> {
        if width == 0 || height == 0 {
            return Err(EnvironmentError::Empty { width, height });
        }
        if pixels.len() != width as usize * height as usize {
            return Err(EnvironmentError::SizeMismatch {
                width,
                height,
                got: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Load an image; 8-bit images are treated as sRGB, float images as linear.
    pub fn load(path: impl AsRef<Path>) -> EnvironmentResult<Self> {
        let path = path.as_ref();
        let img = image::open(path)?;
        let is_float = matches!(
            img.color(),
            image::ColorType::Rgb32F | image::ColorType::Rgba32F
        );
        let rgb = img.to_rgb32f();
        let (width, height) = rgb.dimensions();
        let pixels = rgb
            .pixels()
            .map(|p| {
                let c = Vec3::new(p[0], p[1], p[2]);
                if is_float {
                    c
                } else {
                    Vec3::new(srgb_to_linear(c.x), srgb_to_linear(c.y), srgb_to_linear(c.z))
                }
            })
            .collect();

        log::debug!("Loaded environment: {} ({}x{})", path.display(), width, height);

        Self::from_pixels(width, height, pixels)
    }

    fn pixel(&self, x: u32, y: u32) -> Color {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Bilinear sample at lat-long coordinates; `u` wraps, `v` clamps.
    pub fn sample(&self, uv: Vec2) -> Color {
        let x = uv.x.rem_euclid(1.0) * self.width as f32 - 0.5;
        let y = (uv.y.clamp(0.0, 1.0) * self.height as f32 - 0.5).clamp(0.0, (self.height - 1) as f32);

        let x0 = x.floor();
        let fx = x - x0;
        let x0 = (x0 as i64).rem_euclid(self.width as i64) as u32;
        let x1 = (x0 + 1) % self.width;
        let y0 = y.floor() as u32;
        let y1 = (y0 + 1).min(self.height - 1);
        let fy = y - y0 as f32;

        let top = self.pixel(x0, y0).lerp(self.pixel(x1, y0), fx);
        let bottom = self.pixel(x0, y1).lerp(self.pixel(x1, y1), fx);
        top.lerp(bottom, fy)
    }
}

impl Environment for LatLongEnvironment {
    fn radiance(&self, direction: Vec3) -> Color {
        self.sample(direction_to_latlong(direction))
    }
}

/// Convert an sRGB-encoded value in [0, 1] to linear.
pub fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latlong_roundtrip() {
        for dir in [
            Vec3::new(0.3, 0.5, -0.8).normalize(),
            Vec3::new(-1.0, 0.2, 0.1).normalize(),
            Vec3::X,
        ] {
            let back = latlong_direction(direction_to_latlong(dir));
            assert!((back - dir).length() < 1e-4, "{dir} -> {back}");
        }
        assert!((direction_to_latlong(Vec3::Y).y).abs() < 1e-6);
    }

    #[test]
    fn test_latlong_sample_constant() {
        let env = LatLongEnvironment::from_pixels(4, 2, vec![Color::splat(0.25); 8]).unwrap();
        let c = env.radiance(Vec3::new(0.1, -0.9, 0.3).normalize());
        assert!((c - Color::splat(0.25)).length() < 1e-6);
    }

    #[test]
    fn test_latlong_sky_and_ground() {
        // Top row bright, bottom row dark
        let mut pixels = vec![Color::ONE; 4];
        pixels.extend(vec![Color::ZERO; 4]);
        let env = LatLongEnvironment::from_pixels(4, 2, pixels).unwrap();
        assert!(env.radiance(Vec3::Y).x > 0.99);
        assert!(env.radiance(-Vec3::Y).x < 0.01);
    }

    #[test]
    fn test_from_pixels_validation() {
        assert!(matches!(
            LatLongEnvironment::from_pixels(0, 2, vec![]),
            Err(EnvironmentError::Empty { .. })
        ));
        assert!(matches!(
            LatLongEnvironment::from_pixels(2, 2, vec![Color::ZERO; 3]),
            Err(EnvironmentError::SizeMismatch { got: 3, .. })
        ));
    }

    #[test]
    fn test_srgb_to_linear() {
        assert!((srgb_to_linear(0.0)).abs() < 0.001);
        assert!((srgb_to_linear(1.0) - 1.0).abs() < 0.001);
        let mid = srgb_to_linear(0.5);
        assert!(mid > 0.1 && mid < 0.5);
    }
}
