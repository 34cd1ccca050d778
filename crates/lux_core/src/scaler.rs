//! Conversion between physical (linear) and custom (display) units.

use crate::Color;

/// Converts colors between physical units and a custom scale.
pub trait Scaler: Send + Sync {
    /// Custom scale → physical.
    fn to_physical(&self, custom: Color) -> Color;

    /// Physical → custom scale.
    fn from_physical(&self, physical: Color) -> Color;
}

/// Power-law scaler: `custom = physical ^ power`, sign preserved.
///
/// A power of 0.45 approximates the sRGB transfer curve.
#[derive(Debug, Clone, Copy)]
pub struct GammaScaler {
    power: f32,
}

impl GammaScaler {
    pub fn new(power: f32) -> Self {
        debug_assert!(power > 0.0);
        Self {
            power: power.max(f32::EPSILON),
        }
    }

    pub fn srgb() -> Self {
        Self::new(0.45)
    }
}

#[inline]
fn signed_pow(c: Color, p: f32) -> Color {
    Color::new(
        c.x.abs().powf(p).copysign(c.x),
        c.y.abs().powf(p).copysign(c.y),
        c.z.abs().powf(p).copysign(c.z),
    )
}

impl Scaler for GammaScaler {
    fn to_physical(&self, custom: Color) -> Color {
        signed_pow(custom, 1.0 / self.power)
    }

    fn from_physical(&self, physical: Color) -> Color {
        signed_pow(physical, self.power)
    }
}
