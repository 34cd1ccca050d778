//! Selection of output quantities from internal energy.

use lux_core::{Color, Material, Scaler};
use lux_math::Vec2;
use serde::{Deserialize, Serialize};

/// What a measure query returns.
///
/// Internally every surface element stores irradiance split into a direct
/// part (from emitters and injected direct illumination) and an indirect
/// part (after at least one diffuse bounce). A `Measure` selects and
/// converts those channels; selecting both equals the sum of selecting each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Measure {
    /// Exitance (leaving the surface) instead of irradiance
    pub exiting: bool,
    /// Multiply by area
    pub flux: bool,
    /// Convert to custom scale with the query's scaler
    pub scaled: bool,
    pub direct: bool,
    pub indirect: bool,
    /// Average through smoothing vertices instead of flat per-patch values
    pub smoothed: bool,
}

impl Measure {
    pub const IRRADIANCE: Measure = Measure {
        exiting: false,
        flux: false,
        scaled: false,
        direct: true,
        indirect: true,
        smoothed: false,
    };

    pub const EXITANCE: Measure = Measure {
        exiting: true,
        ..Measure::IRRADIANCE
    };

    pub const fn direct_only(self) -> Self {
        Self {
            direct: true,
            indirect: false,
            ..self
        }
    }

    pub const fn indirect_only(self) -> Self {
        Self {
            direct: false,
            indirect: true,
            ..self
        }
    }

    pub const fn smooth(self) -> Self {
        Self {
            smoothed: true,
            ..self
        }
    }

    pub const fn flux(self) -> Self {
        Self { flux: true, ..self }
    }

    pub const fn scaled(self) -> Self {
        Self {
            scaled: true,
            ..self
        }
    }
}

impl Default for Measure {
    fn default() -> Self {
        Measure::IRRADIANCE
    }
}

/// Measured value of one leaf patch of a triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubtriangleMeasure {
    /// Patch corners as barycentric weights of triangle vertices 1 and 2
    pub corners: [Vec2; 3],
    /// Value at each corner; all equal unless the measure is smoothed
    pub colors: [Color; 3],
}

/// Irradiance split by origin, physical units.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub(crate) struct Channels {
    pub direct: Color,
    pub indirect: Color,
}

impl Channels {
    pub fn scale(self, s: f32) -> Self {
        Self {
            direct: self.direct * s,
            indirect: self.indirect * s,
        }
    }

    pub fn add(self, other: Channels) -> Self {
        Self {
            direct: self.direct + other.direct,
            indirect: self.indirect + other.indirect,
        }
    }

    /// Physical per-area value selected by `measure`.
    pub fn select(self, material: &Material, measure: Measure) -> Color {
        let mut color = Color::ZERO;
        if measure.exiting {
            if measure.direct {
                color += material.diffuse_emittance + material.diffuse_reflectance * self.direct;
            }
            if measure.indirect {
                color += material.diffuse_reflectance * self.indirect;
            }
        } else {
            if measure.direct {
                color += self.direct;
            }
            if measure.indirect {
                color += self.indirect;
            }
        }
        color
    }
}

/// Apply the flux and scaling parts of `measure`.
pub(crate) fn finish(color: Color, area: f32, measure: Measure, scaler: Option<&dyn Scaler>) -> Color {
    let color = if measure.flux { color * area } else { color };
    match (measure.scaled, scaler) {
        (true, Some(scaler)) => scaler.from_physical(color),
        _ => color,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_decomposes() {
        let material = Material::emissive("lamp", Color::splat(0.5), Color::new(1.0, 2.0, 3.0));
        let channels = Channels {
            direct: Color::splat(2.0),
            indirect: Color::splat(0.4),
        };
        for base in [Measure::IRRADIANCE, Measure::EXITANCE] {
            let both = channels.select(&material, base);
            let direct = channels.select(&material, base.direct_only());
            let indirect = channels.select(&material, base.indirect_only());
            assert!((direct + indirect - both).length() < 1e-6);
        }
        let exitance = channels.select(&material, Measure::EXITANCE);
        assert!((exitance - Color::new(2.2, 3.2, 4.2)).length() < 1e-5);
    }

    #[test]
    fn test_finish_flux() {
        let color = finish(Color::ONE, 4.0, Measure::IRRADIANCE.flux(), None);
        assert_eq!(color, Color::splat(4.0));
        // Scaled without a scaler stays physical
        let color = finish(Color::splat(0.25), 1.0, Measure::IRRADIANCE.scaled(), None);
        assert_eq!(color, Color::splat(0.25));
    }
}
