//! Texel rasterization: the exact pieces of a triangle inside each texel.
//!
//! A texel square is clipped against the triangle's three edges
//! (Sutherland-Hodgman), giving a convex polygon of up to seven vertices
//! that is fan-triangulated into `SubTexel`s.

use lux_math::Vec2;

/// Part of a triangle inside one texel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubTexel {
    /// Corners as barycentric weights of triangle vertices 1 and 2
    pub corners: [Vec2; 3],
    /// Area in lightmap UV space
    pub area: f32,
}

impl SubTexel {
    pub fn centroid(&self) -> Vec2 {
        (self.corners[0] + self.corners[1] + self.corners[2]) / 3.0
    }
}

/// Clipped polygon; a triangle clipped by a square has at most 7 vertices.
type Polygon = Vec<Vec2>;

/// Keep the part of `polygon` left of the directed edge `a -> b`.
fn clip_edge(polygon: &Polygon, a: Vec2, b: Vec2) -> Polygon {
    let edge = b - a;
    let inside = |p: Vec2| edge.perp_dot(p - a) >= 0.0;
    let mut out = Vec::with_capacity(polygon.len() + 1);
    for (i, &current) in polygon.iter().enumerate() {
        let previous = polygon[(i + polygon.len() - 1) % polygon.len()];
        let (cur_in, prev_in) = (inside(current), inside(previous));
        if cur_in != prev_in {
            let dp = edge.perp_dot(previous - a);
            let dc = edge.perp_dot(current - a);
            let t = dp / (dp - dc);
            out.push(previous + (current - previous) * t);
        }
        if cur_in {
            out.push(current);
        }
    }
    out
}

/// Rasterize a triangle given by its lightmap UVs into a `width` x
/// `height` map.
///
/// Returns `(texel index, SubTexel)` pairs, row-major with `v = 0` on the
/// first row. With `wrap`, texels outside the map wrap around toroidally;
/// otherwise they are dropped.
pub fn rasterize(uv: [Vec2; 3], width: u32, height: u32, wrap: bool) -> Vec<(usize, SubTexel)> {
    let mut out = Vec::new();
    if width == 0 || height == 0 {
        return out;
    }
    let size = Vec2::new(width as f32, height as f32);
    let mut p = uv.map(|c| c * size);
    if wrap {
        // Move into the first map period; indices wrap anyway
        let shift = (p[0].min(p[1]).min(p[2]) / size).floor() * size;
        if shift.is_finite() {
            p = p.map(|c| c - shift);
        }
    }
    let e1 = p[1] - p[0];
    let e2 = p[2] - p[0];
    let det = e1.perp_dot(e2);
    if !det.is_finite() || det.abs() <= f32::EPSILON * size.max_element() {
        return out;
    }
    // Clip against counter-clockwise edges
    let edges = if det > 0.0 {
        [(p[0], p[1]), (p[1], p[2]), (p[2], p[0])]
    } else {
        [(p[0], p[2]), (p[2], p[1]), (p[1], p[0])]
    };
    let to_barycentric = |q: Vec2| {
        let d = q - p[0];
        Vec2::new(d.perp_dot(e2) / det, e1.perp_dot(d) / det)
    };
    let texel_to_uv_area = 1.0 / (size.x * size.y);

    let min = p[0].min(p[1]).min(p[2]).floor();
    let max = p[0].max(p[1]).max(p[2]).ceil();
    let (mut x0, mut y0, mut x1, mut y1) = (min.x as i64, min.y as i64, max.x as i64, max.y as i64);
    if !wrap {
        x0 = x0.max(0);
        y0 = y0.max(0);
        x1 = x1.min(width as i64);
        y1 = y1.min(height as i64);
    }

    for y in y0..y1 {
        for x in x0..x1 {
            let (fx, fy) = (x as f32, y as f32);
            let mut polygon: Polygon = vec![
                Vec2::new(fx, fy),
                Vec2::new(fx + 1.0, fy),
                Vec2::new(fx + 1.0, fy + 1.0),
                Vec2::new(fx, fy + 1.0),
            ];
            for &(a, b) in &edges {
                polygon = clip_edge(&polygon, a, b);
                if polygon.len() < 3 {
                    break;
                }
            }
            if polygon.len() < 3 {
                continue;
            }

            let tx = x.rem_euclid(width as i64) as usize;
            let ty = y.rem_euclid(height as i64) as usize;
            let index = ty * width as usize + tx;
            let anchor = polygon[0];
            for pair in polygon[1..].windows(2) {
                let area = 0.5 * (pair[0] - anchor).perp_dot(pair[1] - anchor).abs();
                if area <= 0.0 {
                    continue;
                }
                out.push((
                    index,
                    SubTexel {
                        corners: [to_barycentric(anchor), to_barycentric(pair[0]), to_barycentric(pair[1])],
                        area: area * texel_to_uv_area,
                    },
                ));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uv_area(uv: [Vec2; 3]) -> f32 {
        0.5 * (uv[1] - uv[0]).perp_dot(uv[2] - uv[0]).abs()
    }

    #[test]
    fn test_area_conservation() {
        for uv in [
            [Vec2::new(0.1, 0.1), Vec2::new(0.9, 0.2), Vec2::new(0.3, 0.8)],
            // Clockwise
            [Vec2::new(0.1, 0.1), Vec2::new(0.3, 0.8), Vec2::new(0.9, 0.2)],
            // Thin sliver inside one column
            [Vec2::new(0.51, 0.05), Vec2::new(0.52, 0.05), Vec2::new(0.515, 0.95)],
        ] {
            let subtexels = rasterize(uv, 16, 16, false);
            let total: f32 = subtexels.iter().map(|(_, s)| s.area).sum();
            assert!(
                (total - uv_area(uv)).abs() < 1e-5,
                "{total} != {}",
                uv_area(uv)
            );
        }
    }

    #[test]
    fn test_barycentric_corners_inside_triangle() {
        let uv = [Vec2::new(0.05, 0.1), Vec2::new(0.95, 0.3), Vec2::new(0.4, 0.9)];
        for (index, sub) in rasterize(uv, 8, 8, false) {
            assert!(index < 64);
            for c in sub.corners {
                assert!(c.x >= -1e-4 && c.y >= -1e-4 && c.x + c.y <= 1.0 + 1e-4, "{c}");
            }
        }
    }

    #[test]
    fn test_seam_covers_texels() {
        // Two triangles of a quad over a 2x2 map, diagonal through texels 0 and 3
        let a = rasterize([Vec2::ZERO, Vec2::X, Vec2::ONE], 2, 2, false);
        let b = rasterize([Vec2::ZERO, Vec2::ONE, Vec2::Y], 2, 2, false);

        let mut per_texel = [0.0f32; 4];
        let mut sources = [[false; 2]; 4];
        for (index, sub) in &a {
            per_texel[*index] += sub.area;
            sources[*index][0] = true;
        }
        for (index, sub) in &b {
            per_texel[*index] += sub.area;
            sources[*index][1] = true;
        }
        for area in per_texel {
            assert!((area - 0.25).abs() < 1e-6);
        }
        assert_eq!(sources[0], [true, true]);
        assert_eq!(sources[3], [true, true]);
    }

    #[test]
    fn test_wrap() {
        let uv = [Vec2::new(-0.25, 0.25), Vec2::new(0.25, 0.25), Vec2::new(0.0, 0.75)];
        let clipped: f32 = rasterize(uv, 4, 4, false).iter().map(|(_, s)| s.area).sum();
        let wrapped = rasterize(uv, 4, 4, true);
        let total: f32 = wrapped.iter().map(|(_, s)| s.area).sum();
        assert!((total - uv_area(uv)).abs() < 1e-6);
        assert!((clipped - 0.5 * uv_area(uv)).abs() < 1e-6);
        assert!(wrapped.iter().any(|(i, _)| i % 4 == 3));
    }

    #[test]
    fn test_degenerate_is_empty() {
        let uv = [Vec2::ZERO, Vec2::splat(0.5), Vec2::ONE];
        assert!(rasterize(uv, 8, 8, false).is_empty());
    }

    #[test]
    fn test_wrap_far_outside_map() {
        let base = [Vec2::new(0.1, 0.1), Vec2::new(0.6, 0.15), Vec2::new(0.3, 0.7)];
        let expected = rasterize(base, 8, 8, true);
        let mut texels: Vec<usize> = expected.iter().map(|(i, _)| *i).collect();
        texels.dedup();
        let area: f32 = expected.iter().map(|(_, s)| s.area).sum();

        for offset in [Vec2::new(1000.0, 0.0), Vec2::new(-1000.0, 2000.0)] {
            let far = base.map(|c| c + offset);
            let pieces = rasterize(far, 8, 8, true);
            let mut far_texels: Vec<usize> = pieces.iter().map(|(i, _)| *i).collect();
            far_texels.dedup();
            assert_eq!(far_texels, texels);
            let far_area: f32 = pieces.iter().map(|(_, s)| s.area).sum();
            assert!((far_area - area).abs() < 5e-3 * area, "{far_area} vs {area}");
        }
    }
}
