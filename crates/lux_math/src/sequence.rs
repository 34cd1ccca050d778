//! Deterministic low-discrepancy sampling.
//!
//! The gatherer shoots a fixed ray budget per texel; a Hilbert-ordered
//! stratification spreads any budget evenly over the unit square, and the
//! mapping helpers turn those points into hemisphere directions or points on
//! a triangle.

use crate::{Vec2, Vec3};
use std::f32::consts::TAU;

/// Van der Corput sequence (base 2), via bit reversal.
pub fn radical_inverse_base2(index: u32) -> f32 {
    index.reverse_bits() as f32 * 2.328_306_4e-10
}

/// Halton sequence value for an arbitrary base.
pub fn radical_inverse(index: u32, base: u32) -> f32 {
    let mut result = 0.0f32;
    let mut f = 1.0 / base as f32;
    let mut i = index;

    while i > 0 {
        result += f * (i % base) as f32;
        i /= base;
        f /= base as f32;
    }

    result
}

/// Map a distance `d` along a Hilbert curve filling a `side x side` grid
/// (`side` a power of two) to its cell.
pub fn hilbert_d2xy(side: u32, d: u32) -> (u32, u32) {
    let (mut x, mut y) = (0u32, 0u32);
    let mut t = d;
    let mut s = 1u32;
    while s < side {
        let rx = 1 & (t / 2);
        let ry = 1 & (t ^ rx);
        if ry == 0 {
            if rx == 1 {
                x = s - 1 - x;
                y = s - 1 - y;
            }
            std::mem::swap(&mut x, &mut y);
        }
        x += s * rx;
        y += s * ry;
        t /= 4;
        s *= 2;
    }
    (x, y)
}

/// A fixed set of `count` points in `[0, 1)^2`.
///
/// The square is divided into the smallest power-of-two grid with at least
/// `count` cells; cells are picked at even steps along the Hilbert curve and
/// jittered inside the cell with the Halton (2, 3) pair. Consecutive points
/// stay spatially close, so any prefix of the set is also well spread.
#[derive(Debug, Clone)]
pub struct HilbertSequence {
    points: Vec<Vec2>,
}

impl HilbertSequence {
    pub fn new(count: usize) -> Self {
        let count = count.max(1);
        let mut side = 1u32;
        while (side as usize) * (side as usize) < count {
            side *= 2;
        }
        let cells = (side * side) as f64;
        let cell_size = 1.0 / side as f32;
        let points = (0..count)
            .map(|i| {
                let d = ((i as f64 + 0.5) * cells / count as f64) as u32;
                let (cx, cy) = hilbert_d2xy(side, d);
                let jitter = Vec2::new(
                    radical_inverse_base2(i as u32 + 1),
                    radical_inverse(i as u32 + 1, 3),
                );
                (Vec2::new(cx as f32, cy as f32) + jitter) * cell_size
            })
            .collect();
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    /// Point `i`, wrapping past the end and rotated by `offset` (toroidally),
    /// so neighbouring texels do not share identical patterns.
    pub fn get(&self, i: usize, offset: Vec2) -> Vec2 {
        let p = self.points[i % self.points.len()] + offset;
        p - p.floor()
    }
}

/// Cosine-weighted direction in the local frame where +Z is the normal.
pub fn cosine_hemisphere(u: Vec2) -> Vec3 {
    let r = u.x.sqrt();
    let phi = TAU * u.y;
    Vec3::new(r * phi.cos(), r * phi.sin(), (1.0 - u.x).max(0.0).sqrt())
}

/// Uniform point on a triangle, as barycentric weights of vertices 1 and 2.
pub fn uniform_triangle(u: Vec2) -> Vec2 {
    let su = u.x.sqrt();
    Vec2::new(su * (1.0 - u.y), su * u.y)
}
