//! Resampling between lat-long maps of different sizes.
//!
//! An `Interpolator` is a sparse matrix of `(source, weight)` contributors
//! per destination texel. Building one is quadratic in the map sizes, so
//! the cache builds each configuration once and shares it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lux_core::environment::latlong_direction;
use lux_core::Color;
use lux_math::{Vec2, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct InterpolatorKey {
    input: (u32, u32),
    output: (u32, u32),
    radius_bits: u32,
}

/// Precomputed filter from an input lat-long map to an output one.
#[derive(Debug)]
pub struct Interpolator {
    input: (u32, u32),
    output: (u32, u32),
    /// Contributors of each output texel; weights sum to 1
    contributors: Vec<Vec<(u32, f32)>>,
}

fn texel_directions(width: u32, height: u32) -> Vec<Vec3> {
    (0..height)
        .flat_map(|y| {
            (0..width).map(move |x| {
                latlong_direction(Vec2::new(
                    (x as f32 + 0.5) / width as f32,
                    (y as f32 + 0.5) / height as f32,
                ))
            })
        })
        .collect()
}

impl Interpolator {
    /// Each output texel averages the input texels whose directions lie
    /// within `radius` (radians), weighted by `cos - cos(radius)`. An output
    /// texel with no input inside the radius takes the nearest one.
    pub fn new(input: (u32, u32), output: (u32, u32), radius: f32) -> Self {
        let sources = texel_directions(input.0, input.1);
        let cos_radius = radius.clamp(0.0, std::f32::consts::PI).cos();

        let contributors = texel_directions(output.0, output.1)
            .into_iter()
            .map(|d| {
                let mut list: Vec<(u32, f32)> = sources
                    .iter()
                    .enumerate()
                    .filter_map(|(i, s)| {
                        let w = s.dot(d) - cos_radius;
                        (w > 0.0).then_some((i as u32, w))
                    })
                    .collect();
                if list.is_empty() {
                    let nearest = sources
                        .iter()
                        .enumerate()
                        .max_by(|a, b| a.1.dot(d).total_cmp(&b.1.dot(d)))
                        .map(|(i, _)| i as u32);
                    list.extend(nearest.map(|i| (i, 1.0)));
                }
                let total: f32 = list.iter().map(|&(_, w)| w).sum();
                for entry in &mut list {
                    entry.1 /= total;
                }
                list
            })
            .collect();

        Self {
            input,
            output,
            contributors,
        }
    }

    pub fn input_size(&self) -> (u32, u32) {
        self.input
    }

    pub fn output_size(&self) -> (u32, u32) {
        self.output
    }

    /// Resample `input` (row-major, `input_size` texels).
    pub fn interpolate(&self, input: &[Color]) -> Vec<Color> {
        debug_assert_eq!(input.len(), (self.input.0 * self.input.1) as usize);
        self.contributors
            .iter()
            .map(|list| {
                list.iter()
                    .filter_map(|&(i, w)| input.get(i as usize).map(|c| *c * w))
                    .sum::<Color>()
            })
            .collect()
    }
}

/// Shares interpolators by (input size, output size, radius).
#[derive(Debug, Default)]
pub struct InterpolatorCache {
    entries: Mutex<HashMap<InterpolatorKey, Arc<Interpolator>>>,
}

impl InterpolatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, input: (u32, u32), output: (u32, u32), radius: f32) -> Arc<Interpolator> {
        let key = InterpolatorKey {
            input,
            output,
            radius_bits: radius.to_bits(),
        };
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries
            .entry(key)
            .or_insert_with(|| {
                log::debug!(
                    "Building interpolator {}x{} -> {}x{} (radius {:.3})",
                    input.0,
                    input.1,
                    output.0,
                    output.1,
                    radius
                );
                Arc::new(Interpolator::new(input, output, radius))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_map_stays_constant() {
        let interpolator = Interpolator::new((8, 4), (16, 8), 0.6);
        let input = vec![Color::new(0.2, 0.4, 0.6); 32];
        for c in interpolator.interpolate(&input) {
            assert!((c - Color::new(0.2, 0.4, 0.6)).length() < 1e-5);
        }
    }

    #[test]
    fn test_small_radius_picks_nearest() {
        // Same size, tiny radius: identity
        let interpolator = Interpolator::new((4, 2), (4, 2), 1e-4);
        let input: Vec<Color> = (0..8).map(|i| Color::splat(i as f32)).collect();
        let output = interpolator.interpolate(&input);
        for (a, b) in input.iter().zip(&output) {
            assert!((*a - *b).length() < 1e-5);
        }
    }

    #[test]
    fn test_cache_shares() {
        let cache = InterpolatorCache::new();
        let a = cache.get((8, 4), (4, 2), 0.5);
        let b = cache.get((8, 4), (4, 2), 0.5);
        assert!(Arc::ptr_eq(&a, &b));
        let _ = cache.get((8, 4), (4, 2), 0.25);
        assert_eq!(cache.len(), 2);
        assert_eq!(a.output_size(), (4, 2));
    }
}
