//! Lightmap post-processing: normalization, hole filling and background.
//!
//! Unwraps always leave texels too thin to be sampled; filling them from
//! their neighbours avoids black seams under bilinear filtering.

use lux_core::{Color, OutputBuffer};

use crate::FilteringParameters;

/// Kernel weight of edge neighbours; diagonals get half.
const EDGE_WEIGHT: f32 = 1.0;
const DIAGONAL_WEIGHT: f32 = 0.5;
/// Sum of all eight kernel weights
const KERNEL_SUM: f32 = 4.0 * EDGE_WEIGHT + 4.0 * DIAGONAL_WEIGHT;

/// One accumulator slot: weighted color sum and weight sum before
/// normalization, average color and reliability after.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Texel {
    pub color: Color,
    pub weight: f32,
}

/// `color = color / weight` where sampled, zero in holes. Weights stay.
///
/// On a buffer whose weights are all 1 this is a no-op.
pub fn normalize(texels: &mut [Texel]) {
    for texel in texels {
        if texel.weight > 0.0 {
            texel.color /= texel.weight;
        } else {
            texel.color = Color::ZERO;
            texel.weight = 0.0;
        }
    }
}

/// Spread normalized texels into holes and partially covered texels.
///
/// Texels with weight >= 1 are fixed. Every other texel is blended with
/// the weighted average of its eight neighbours from the previous pass,
/// in proportion to how much of it is uncovered. Returns the number of
/// passes run; stops early when a pass changes nothing.
pub fn fill_holes(texels: &mut [Texel], width: u32, height: u32, passes: u32, wrap: bool) -> u32 {
    let (w, h) = (width as i64, height as i64);
    debug_assert_eq!(texels.len() as i64, w * h);
    if texels.len() as i64 != w * h {
        return 0;
    }
    let sampled: Vec<Texel> = texels.to_vec();
    let mut previous = sampled.clone();

    for pass in 0..passes {
        let mut changed = false;
        for y in 0..h {
            for x in 0..w {
                let index = (y * w + x) as usize;
                let own = sampled[index];
                if own.weight >= 1.0 {
                    continue;
                }

                let mut color = Color::ZERO;
                let mut weight = 0.0;
                for dy in -1..=1i64 {
                    for dx in -1..=1i64 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let (mut nx, mut ny) = (x + dx, y + dy);
                        if wrap {
                            nx = nx.rem_euclid(w);
                            ny = ny.rem_euclid(h);
                        } else if nx < 0 || ny < 0 || nx >= w || ny >= h {
                            continue;
                        }
                        let neighbour = previous[(ny * w + nx) as usize];
                        if neighbour.weight <= 0.0 {
                            continue;
                        }
                        let k = if dx == 0 || dy == 0 { EDGE_WEIGHT } else { DIAGONAL_WEIGHT };
                        color += neighbour.color * (k * neighbour.weight);
                        weight += k * neighbour.weight;
                    }
                }
                if weight <= 0.0 {
                    continue;
                }

                let filled = Texel {
                    color: own.color * own.weight + color / weight * (1.0 - own.weight),
                    weight: own.weight.max((weight / KERNEL_SUM).min(1.0)),
                };
                let current = &mut texels[index];
                if (filled.color - current.color).abs().max_element() > 1e-6
                    || (filled.weight - current.weight).abs() > 1e-6
                {
                    changed = true;
                }
                *current = filled;
            }
        }
        if !changed {
            log::debug!("Hole filling settled after {} passes", pass);
            return pass;
        }
        previous.copy_from_slice(texels);
    }
    passes
}

/// Give remaining holes the background color (or zero).
pub fn apply_background(texels: &mut [Texel], background: Option<Color>) {
    let fill = background.unwrap_or(Color::ZERO);
    for texel in texels.iter_mut().filter(|t| t.weight <= 0.0) {
        texel.color = fill;
    }
}

/// Normalize, fill and write a baked lightmap.
pub fn finish_lightmap(
    mut texels: Vec<Texel>,
    width: u32,
    height: u32,
    params: &FilteringParameters,
    target: &mut dyn OutputBuffer,
) {
    normalize(&mut texels);
    fill_holes(&mut texels, width, height, params.spread_passes, params.wrap);
    apply_background(&mut texels, params.background);
    write(&texels, target);
}

/// Normalize and write per-vertex values.
pub fn finish_vertices(mut values: Vec<Texel>, params: &FilteringParameters, target: &mut dyn OutputBuffer) {
    normalize(&mut values);
    for value in &mut values {
        value.weight = value.weight.min(1.0);
    }
    apply_background(&mut values, params.background);
    write(&values, target);
}

fn write(texels: &[Texel], target: &mut dyn OutputBuffer) {
    for (index, texel) in texels.iter().enumerate() {
        target.render_texel(index, texel.color, texel.weight.clamp(0.0, 1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lux_core::LightmapBuffer;

    fn full(width: u32, height: u32) -> Vec<Texel> {
        (0..width * height)
            .map(|i| Texel {
                color: Color::splat(i as f32 * 0.1),
                weight: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_normalize_idempotent() {
        let mut texels = full(4, 4);
        let original = texels.clone();
        normalize(&mut texels);
        normalize(&mut texels);
        assert_eq!(texels, original);
        assert_eq!(fill_holes(&mut texels, 4, 4, 8, true), 0);
        assert_eq!(texels, original);
    }

    #[test]
    fn test_normalize_averages() {
        let mut texels = vec![
            Texel {
                color: Color::splat(1.5),
                weight: 0.5,
            },
            Texel {
                color: Color::ONE,
                weight: 0.0,
            },
        ];
        normalize(&mut texels);
        assert_eq!(texels[0].color, Color::splat(3.0));
        assert_eq!(texels[1], Texel::default());
    }

    #[test]
    fn test_hole_filled_from_neighbours() {
        let mut texels = vec![
            Texel {
                color: Color::ONE,
                weight: 1.0
            };
            9
        ];
        texels[4] = Texel::default();
        texels[0].color = Color::splat(3.0);

        fill_holes(&mut texels, 3, 3, 1, false);
        let centre = texels[4];
        assert!((centre.weight - 1.0).abs() < 1e-6);
        // (3 * 0.5 + 1 * 0.5 * 3 + 1 * 4) / 6
        assert!((centre.color - Color::splat(7.0 / 6.0)).length() < 1e-5);
        assert_eq!(texels[0].color, Color::splat(3.0));
    }

    #[test]
    fn test_fill_spreads_and_settles() {
        // One sampled texel in a 5x1 strip
        let mut texels = vec![Texel::default(); 5];
        texels[0] = Texel {
            color: Color::splat(2.0),
            weight: 1.0,
        };
        let passes = fill_holes(&mut texels, 5, 1, 2, false);
        assert_eq!(passes, 2);
        assert!(texels[1].weight > 0.0 && texels[2].weight > 0.0);
        assert_eq!(texels[3].weight, 0.0);
        assert!((texels[2].color - Color::splat(2.0)).length() < 1e-5);

        let passes = fill_holes(&mut texels, 5, 1, 100, false);
        assert!(passes < 100);
        assert!(texels.iter().all(|t| t.weight > 0.0));
    }

    #[test]
    fn test_background_and_write() {
        let mut texels = vec![Texel::default(); 4];
        texels[1] = Texel {
            color: Color::ONE,
            weight: 1.0,
        };
        let params = FilteringParameters {
            spread_passes: 0,
            wrap: false,
            background: Some(Color::new(0.0, 0.0, 1.0)),
        };
        let mut buffer = LightmapBuffer::new(2, 2).unwrap();
        finish_lightmap(texels, 2, 2, &params, &mut buffer);
        assert_eq!(buffer.get(1, 0), Color::ONE);
        assert_eq!(buffer.get(0, 1), Color::new(0.0, 0.0, 1.0));
        assert_eq!(buffer.weight(0, 1), 0.0);
    }
}
