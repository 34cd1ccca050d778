//! Analytic lights: directional, point and spot.

use lux_math::Vec3;

use crate::{Color, Scaler};

/// Geometry of a light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Infinitely distant light travelling along `direction`.
    Directional { direction: Vec3 },
    /// Omnidirectional point light.
    Point { position: Vec3 },
    /// Cone light. Angles in radians; full intensity inside
    /// `outer_angle - falloff_angle`, zero outside `outer_angle`.
    Spot {
        position: Vec3,
        direction: Vec3,
        outer_angle: f32,
        falloff_angle: f32,
        spot_exponent: f32,
    },
}

/// How irradiance decreases with distance from a local light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceFalloff {
    /// `color` is physical; irradiance falls with `1 / d^2`.
    Physical,
    /// `color` is in custom scale; no falloff.
    None,
    /// `color` is in custom scale; `max(0, 1 - (d / radius)^2) ^ exponent`.
    Exponential { radius: f32, exponent: f32 },
    /// `color` is in custom scale; `1 / max(c0 + c1 d + c2 d^2, 1 / max_attenuation)`.
    Polynomial { coefficients: Vec3, max_attenuation: f32 },
}

/// A light source registered with the baker.
#[derive(Debug, Clone)]
pub struct Light {
    pub kind: LightKind,
    /// Irradiance at normal incidence (directional) or intensity (local).
    pub color: Color,
    pub falloff: DistanceFalloff,
    pub casts_shadows: bool,
    pub enabled: bool,
}

impl Light {
    pub fn directional(direction: Vec3, color: Color) -> Self {
        Self {
            kind: LightKind::Directional {
                direction: direction.normalize(),
            },
            color,
            falloff: DistanceFalloff::Physical,
            casts_shadows: true,
            enabled: true,
        }
    }

    pub fn point(position: Vec3, color: Color) -> Self {
        Self {
            kind: LightKind::Point { position },
            color,
            falloff: DistanceFalloff::Physical,
            casts_shadows: true,
            enabled: true,
        }
    }

    pub fn spot(position: Vec3, direction: Vec3, color: Color, outer_angle: f32, falloff_angle: f32) -> Self {
        Self {
            kind: LightKind::Spot {
                position,
                direction: direction.normalize(),
                outer_angle,
                falloff_angle,
                spot_exponent: 1.0,
            },
            color,
            falloff: DistanceFalloff::Physical,
            casts_shadows: true,
            enabled: true,
        }
    }

    pub fn with_falloff(mut self, falloff: DistanceFalloff) -> Self {
        self.falloff = falloff;
        self
    }

    /// Unit direction from `receiver` towards the light and the distance to
    /// it (infinite for directional lights).
    pub fn direction_from(&self, receiver: Vec3) -> (Vec3, f32) {
        match self.kind {
            LightKind::Directional { direction } => (-direction, f32::INFINITY),
            LightKind::Point { position } | LightKind::Spot { position, .. } => {
                let to_light = position - receiver;
                let distance = to_light.length();
                if distance > 0.0 {
                    (to_light / distance, distance)
                } else {
                    (Vec3::ZERO, 0.0)
                }
            }
        }
    }

    /// Irradiance at `receiver` for a surface facing the light, physical
    /// units, ignoring occlusion.
    ///
    /// Custom-scale colors are converted with `scaler` when one is given and
    /// used as-is otherwise.
    pub fn irradiance(&self, receiver: Vec3, scaler: Option<&dyn Scaler>) -> Color {
        if !self.enabled {
            return Color::ZERO;
        }
        let (to_light, distance) = self.direction_from(receiver);
        if to_light == Vec3::ZERO {
            return Color::ZERO;
        }

        let distance_attenuation = match (self.kind, self.falloff) {
            (LightKind::Directional { .. }, _) => 1.0,
            (_, DistanceFalloff::Physical) => 1.0 / (distance * distance).max(1e-8),
            (_, DistanceFalloff::None) => 1.0,
            (_, DistanceFalloff::Exponential { radius, exponent }) => {
                let r = distance / radius.max(f32::MIN_POSITIVE);
                (1.0 - r * r).max(0.0).powf(exponent)
            }
            (_, DistanceFalloff::Polynomial { coefficients, max_attenuation }) => {
                let poly = coefficients.x + coefficients.y * distance + coefficients.z * distance * distance;
                1.0 / poly.max(1.0 / max_attenuation.max(f32::MIN_POSITIVE))
            }
        };

        let spot_attenuation = match self.kind {
            LightKind::Spot {
                direction,
                outer_angle,
                falloff_angle,
                spot_exponent,
                ..
            } => {
                let angle = direction.dot(-to_light).clamp(-1.0, 1.0).acos();
                if angle >= outer_angle {
                    0.0
                } else if angle <= outer_angle - falloff_angle || falloff_angle <= 0.0 {
                    1.0
                } else {
                    ((outer_angle - angle) / falloff_angle).powf(spot_exponent)
                }
            }
            _ => 1.0,
        };

        let physical_color = match (self.falloff, scaler) {
            (DistanceFalloff::Physical, _) | (_, None) => self.color,
            (_, Some(scaler)) => scaler.to_physical(self.color),
        };
        physical_color * (distance_attenuation * spot_attenuation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GammaScaler;

    #[test]
    fn test_directional_irradiance_constant() {
        let light = Light::directional(-Vec3::Z, Color::ONE);
        assert_eq!(light.irradiance(Vec3::new(3.0, 4.0, 5.0), None), Color::ONE);
        let (dir, dist) = light.direction_from(Vec3::ZERO);
        assert_eq!(dir, Vec3::Z);
        assert!(dist.is_infinite());
    }

    #[test]
    fn test_point_inverse_square() {
        let light = Light::point(Vec3::new(0.0, 0.0, 2.0), Color::splat(8.0));
        let e = light.irradiance(Vec3::ZERO, None);
        assert!((e - Color::splat(2.0)).length() < 1e-5);
    }

    #[test]
    fn test_exponential_radius() {
        let light = Light::point(Vec3::ZERO, Color::ONE).with_falloff(DistanceFalloff::Exponential {
            radius: 2.0,
            exponent: 1.0,
        });
        assert!((light.irradiance(Vec3::X, None).x - 0.75).abs() < 1e-5);
        assert_eq!(light.irradiance(Vec3::X * 3.0, None), Color::ZERO);
    }

    #[test]
    fn test_polynomial_with_scaler() {
        let light = Light::point(Vec3::ZERO, Color::splat(0.25)).with_falloff(DistanceFalloff::Polynomial {
            coefficients: Vec3::new(1.0, 0.0, 0.0),
            max_attenuation: 10.0,
        });
        let scaler = GammaScaler::new(0.5);
        // 0.25 custom → 0.0625 physical
        let e = light.irradiance(Vec3::X, Some(&scaler));
        assert!((e.x - 0.0625).abs() < 1e-5);
    }

    #[test]
    fn test_spot_cone() {
        let light = Light::spot(Vec3::ZERO, -Vec3::Y, Color::ONE, 0.5, 0.1).with_falloff(DistanceFalloff::None);
        // On axis: full
        assert_eq!(light.irradiance(-Vec3::Y, None), Color::ONE);
        // Far outside the cone
        assert_eq!(light.irradiance(Vec3::X, None), Color::ZERO);
        // In the falloff band
        let angle: f32 = 0.45;
        let p = Vec3::new(angle.sin(), -angle.cos(), 0.0);
        let e = light.irradiance(p, None).x;
        assert!(e > 0.0 && e < 1.0, "{e}");
    }

    #[test]
    fn test_disabled_light_is_dark() {
        let mut light = Light::point(Vec3::Z, Color::ONE);
        light.enabled = false;
        assert_eq!(light.irradiance(Vec3::ZERO, None), Color::ZERO);
    }
}
