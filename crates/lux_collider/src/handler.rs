//! Hit acceptance callbacks.

use crate::Hit;

/// Decides which candidate hits end a query.
///
/// `collides` sees candidates in near-to-far order (BSP techniques) or in
/// triangle order (linear). Returning `true` accepts the hit and ends the
/// query; `false` ignores it and the search continues.
pub trait CollisionHandler {
    fn collides(&mut self, hit: &Hit) -> bool;
}

impl<F: FnMut(&Hit) -> bool> CollisionHandler for F {
    fn collides(&mut self, hit: &Hit) -> bool {
        self(hit)
    }
}

/// Accepts the first candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl CollisionHandler for AcceptAll {
    fn collides(&mut self, _hit: &Hit) -> bool {
        true
    }
}

/// Ignores one triangle (usually the one the ray starts on).
#[derive(Debug, Clone, Copy)]
pub struct SkipTriangle(pub u32);

impl CollisionHandler for SkipTriangle {
    fn collides(&mut self, hit: &Hit) -> bool {
        hit.triangle != self.0
    }
}

/// Accumulates visibility through partially transparent triangles.
///
/// Every candidate multiplies `visibility` by the triangle's transmittance.
/// Opaque triangles (transmittance 0) are accepted and end the query with
/// `visibility == 0`.
pub struct TransmittanceHandler<F> {
    transmittance: F,
    skip: Option<u32>,
    pub visibility: f32,
}

impl<F: FnMut(u32) -> f32> TransmittanceHandler<F> {
    /// `transmittance` maps a triangle index to the fraction of light it lets
    /// through.
    pub fn new(transmittance: F) -> Self {
        Self {
            transmittance,
            skip: None,
            visibility: 1.0,
        }
    }

    pub fn skipping(mut self, triangle: u32) -> Self {
        self.skip = Some(triangle);
        self
    }
}

impl<F: FnMut(u32) -> f32> CollisionHandler for TransmittanceHandler<F> {
    fn collides(&mut self, hit: &Hit) -> bool {
        if self.skip == Some(hit.triangle) {
            return false;
        }
        let t = (self.transmittance)(hit.triangle).clamp(0.0, 1.0);
        if t <= 0.0 {
            self.visibility = 0.0;
            return true;
        }
        self.visibility *= t;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lux_math::{Plane, Vec2, Vec3};

    fn hit(triangle: u32) -> Hit {
        Hit {
            distance: 1.0,
            triangle,
            point2d: Vec2::ZERO,
            point3d: Vec3::ZERO,
            plane: Plane::from_point_normal(Vec3::ZERO, Vec3::Z),
            front: true,
        }
    }

    #[test]
    fn test_skip_triangle() {
        let mut handler = SkipTriangle(3);
        assert!(!handler.collides(&hit(3)));
        assert!(handler.collides(&hit(4)));
    }

    #[test]
    fn test_transmittance_accumulates() {
        let mut handler = TransmittanceHandler::new(|t| if t == 0 { 0.0 } else { 0.5 });
        assert!(!handler.collides(&hit(1)));
        assert!(!handler.collides(&hit(2)));
        assert!((handler.visibility - 0.25).abs() < 1e-6);
        assert!(handler.collides(&hit(0)));
        assert_eq!(handler.visibility, 0.0);
    }

    #[test]
    fn test_closure_handler() {
        let mut seen = Vec::new();
        let mut handler = |h: &Hit| {
            seen.push(h.triangle);
            h.triangle == 2
        };
        assert!(!handler.collides(&hit(1)));
        assert!(handler.collides(&hit(2)));
        assert_eq!(seen, vec![1, 2]);
    }
}
