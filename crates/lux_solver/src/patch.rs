//! Patch hierarchy: one binary subdivision tree per triangle.
//!
//! Patches live in a flat arena and reference children by index. Patch
//! corners are stored as barycentric weights `(w1, w2)` of the root
//! triangle's vertices 1 and 2, so lookups never touch world space.

use lux_core::Color;
use lux_math::{Vec2, Vec3};

use crate::ivertex::IVertexArena;
use crate::SmoothingParameters;

/// Contrast between corner illumination above which a patch splits
/// (at `subdivision_speed == 1`).
const SPLIT_CONTRAST: f32 = 0.2;

/// Root triangle corners in barycentric parameter space.
pub(crate) const ROOT_CORNERS: [Vec2; 3] = [Vec2::ZERO, Vec2::X, Vec2::Y];

/// World-space data of an imported triangle.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TriangleGeometry {
    pub vertices: [Vec3; 3],
    pub normal: Vec3,
    pub area: f32,
    pub ivertices: [u32; 3],
}

impl TriangleGeometry {
    /// World position of a barycentric parameter point.
    #[inline]
    pub fn point(&self, param: Vec2) -> Vec3 {
        let [a, b, c] = self.vertices;
        a + (b - a) * param.x + (c - a) * param.y
    }

    pub fn centroid(&self) -> Vec3 {
        (self.vertices[0] + self.vertices[1] + self.vertices[2]) / 3.0
    }
}

/// Energy carried by a leaf patch, physical flux.
///
/// Index 0 of the per-side arrays is the front side.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PatchEnergy {
    pub received_direct: Color,
    pub received_indirect: Color,
    /// Not yet shot; arrives at receivers as direct light
    pub unshot_emitted: [Color; 2],
    /// Not yet shot; arrives at receivers as indirect light
    pub unshot_reflected: [Color; 2],
}

impl PatchEnergy {
    /// Magnitude of the energy waiting on `side`.
    pub fn unshot_power(&self, side: usize) -> f32 {
        (self.unshot_emitted[side] + self.unshot_reflected[side])
            .abs()
            .element_sum()
    }

    /// False once any accumulated or queued energy turned NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.received_direct.is_finite()
            && self.received_indirect.is_finite()
            && self.unshot_emitted.iter().all(|c| c.is_finite())
            && self.unshot_reflected.iter().all(|c| c.is_finite())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Split {
    /// Corner `edge` to corner `edge + 1` was halved
    pub edge: u8,
    pub children: [u32; 2],
}

#[derive(Debug, Clone)]
pub(crate) struct Patch {
    pub triangle: u32,
    pub corners: [Vec2; 3],
    pub ivertices: [u32; 3],
    pub area: f32,
    pub depth: u8,
    pub split: Option<Split>,
    pub energy: PatchEnergy,
}

/// All patches of a scene plus the IVertices joining them.
#[derive(Debug, Default)]
pub(crate) struct Hierarchy {
    pub patches: Vec<Patch>,
    /// Root patch of each triangle
    pub roots: Vec<Option<u32>>,
    pub leaves: Vec<u32>,
    pub ivertices: IVertexArena,
}

impl Hierarchy {
    /// Subdivide every triangle where `field` (scalar primary illumination
    /// at a parameter point) varies strongly between patch corners.
    pub fn build(
        triangles: &[Option<TriangleGeometry>],
        corner_ivertex_count: usize,
        params: &SmoothingParameters,
        field: impl Fn(usize, Vec2) -> f32,
    ) -> Self {
        let mut hierarchy = Hierarchy {
            patches: Vec::new(),
            roots: vec![None; triangles.len()],
            leaves: Vec::new(),
            ivertices: IVertexArena::with_corners(corner_ivertex_count),
        };

        for (t, geometry) in triangles.iter().enumerate() {
            let Some(geometry) = geometry else { continue };
            let root = hierarchy.push(Patch {
                triangle: t as u32,
                corners: ROOT_CORNERS,
                ivertices: geometry.ivertices,
                area: geometry.area,
                depth: 0,
                split: None,
                energy: PatchEnergy::default(),
            });
            hierarchy.roots[t] = Some(root);

            let mut stack = vec![root];
            while let Some(index) = stack.pop() {
                let patch = &hierarchy.patches[index as usize];
                if !should_split(patch, t, params, &field) {
                    hierarchy.leaves.push(index);
                    continue;
                }
                let children = hierarchy.split(index, geometry);
                stack.extend(children);
            }
        }

        // Corner angles weight each leaf's share of an IVertex
        for &leaf in &hierarchy.leaves {
            let patch = &hierarchy.patches[leaf as usize];
            let Some(Some(geometry)) = triangles.get(patch.triangle as usize) else {
                continue;
            };
            let world = patch.corners.map(|c| geometry.point(c));
            let ivertices = patch.ivertices;
            for k in 0..3 {
                let e1 = world[(k + 1) % 3] - world[k];
                let e2 = world[(k + 2) % 3] - world[k];
                let angle = e1.angle_between(e2);
                let weight = if angle.is_finite() { angle } else { 0.0 };
                hierarchy.ivertices.add_entry(ivertices[k], leaf, weight);
            }
        }

        log::debug!(
            "Patch hierarchy: {} patches, {} leaves, {} IVertices",
            hierarchy.patches.len(),
            hierarchy.leaves.len(),
            hierarchy.ivertices.len()
        );

        hierarchy
    }

    fn push(&mut self, patch: Patch) -> u32 {
        self.patches.push(patch);
        (self.patches.len() - 1) as u32
    }

    /// Halve the longest edge of patch `index`.
    fn split(&mut self, index: u32, geometry: &TriangleGeometry) -> [u32; 2] {
        let parent = self.patches[index as usize].clone();
        let world = parent.corners.map(|c| geometry.point(c));
        let edge = (0..3)
            .max_by(|&i, &j| {
                let li = world[i].distance_squared(world[(i + 1) % 3]);
                let lj = world[j].distance_squared(world[(j + 1) % 3]);
                li.total_cmp(&lj)
            })
            .unwrap_or(0);

        let (a, b, c) = (edge, (edge + 1) % 3, (edge + 2) % 3);
        let mid = (parent.corners[a] + parent.corners[b]) * 0.5;
        let mid_iv = self
            .ivertices
            .midpoint(parent.ivertices[a], parent.ivertices[b]);

        let first = Patch {
            triangle: parent.triangle,
            corners: [parent.corners[a], mid, parent.corners[c]],
            ivertices: [parent.ivertices[a], mid_iv, parent.ivertices[c]],
            area: parent.area * 0.5,
            depth: parent.depth + 1,
            split: None,
            energy: PatchEnergy::default(),
        };
        let second = Patch {
            corners: [mid, parent.corners[b], parent.corners[c]],
            ivertices: [mid_iv, parent.ivertices[b], parent.ivertices[c]],
            ..first.clone()
        };
        let children = [self.push(first), self.push(second)];
        self.patches[index as usize].split = Some(Split {
            edge: edge as u8,
            children,
        });
        children
    }

    /// Leaf of `triangle` containing the parameter point `p`.
    pub fn locate(&self, triangle: usize, p: Vec2) -> Option<u32> {
        let mut node = (*self.roots.get(triangle)?)?;
        loop {
            let patch = &self.patches[node as usize];
            let Some(split) = patch.split else {
                return Some(node);
            };
            let k = split.edge as usize;
            let a = patch.corners[k];
            let b = patch.corners[(k + 1) % 3];
            let c = patch.corners[(k + 2) % 3];
            let cut = (a + b) * 0.5 - c;
            let side = cut.perp_dot(p - c);
            let a_side = cut.perp_dot(a - c);
            node = if side * a_side >= 0.0 {
                split.children[0]
            } else {
                split.children[1]
            };
        }
    }

    /// Leaves of `triangle` in depth-first order.
    pub fn leaves_of(&self, triangle: usize) -> Vec<u32> {
        let mut leaves = Vec::new();
        let Some(Some(root)) = self.roots.get(triangle) else {
            return leaves;
        };
        let mut stack = vec![*root];
        while let Some(node) = stack.pop() {
            match self.patches[node as usize].split {
                Some(split) => {
                    stack.push(split.children[1]);
                    stack.push(split.children[0]);
                }
                None => leaves.push(node),
            }
        }
        leaves
    }
}

/// Barycentric weights of parameter point `p` inside a patch.
pub(crate) fn patch_weights(corners: &[Vec2; 3], p: Vec2) -> [f32; 3] {
    let [a, b, c] = *corners;
    let det = (b - a).perp_dot(c - a);
    if det.abs() <= f32::MIN_POSITIVE {
        return [1.0 / 3.0; 3];
    }
    let s = (p - a).perp_dot(c - a) / det;
    let t = (b - a).perp_dot(p - a) / det;
    [1.0 - s - t, s, t]
}

fn should_split(
    patch: &Patch,
    triangle: usize,
    params: &SmoothingParameters,
    field: &impl Fn(usize, Vec2) -> f32,
) -> bool {
    if params.subdivision_speed <= 0.0
        || patch.depth >= params.max_subdivision_depth
        || patch.area <= params.min_patch_area
    {
        return false;
    }
    let values = patch.corners.map(|c| field(triangle, c));
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    if !(max > 0.0) {
        return false;
    }
    let contrast = (max - min) / (max + min.max(0.0));
    contrast * params.subdivision_speed > SPLIT_CONTRAST
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> Vec<Option<TriangleGeometry>> {
        vec![Some(TriangleGeometry {
            vertices: [Vec3::ZERO, Vec3::X, Vec3::Y],
            normal: Vec3::Z,
            area: 0.5,
            ivertices: [0, 1, 2],
        })]
    }

    #[test]
    fn test_uniform_field_stays_coarse() {
        let h = Hierarchy::build(&unit_triangle(), 3, &SmoothingParameters::default(), |_, _| 1.0);
        assert_eq!(h.patches.len(), 1);
        assert_eq!(h.leaves, vec![0]);
        assert_eq!(h.ivertices.len(), 3);
    }

    #[test]
    fn test_gradient_refines_and_conserves_area() {
        let params = SmoothingParameters {
            max_subdivision_depth: 4,
            min_patch_area: 0.0,
            ..Default::default()
        };
        // Bright near vertex 1
        let h = Hierarchy::build(&unit_triangle(), 3, &params, |_, p| p.x * 10.0 + 0.01);
        assert!(h.leaves.len() > 1);
        let area: f32 = h.leaves.iter().map(|&l| h.patches[l as usize].area).sum();
        assert!((area - 0.5).abs() < 1e-6);
        assert!(h.patches.iter().all(|p| p.depth <= 4));
        assert_eq!(h.leaves_of(0).len(), h.leaves.len());
    }

    #[test]
    fn test_locate_finds_containing_leaf() {
        let params = SmoothingParameters {
            max_subdivision_depth: 5,
            min_patch_area: 0.0,
            ..Default::default()
        };
        let h = Hierarchy::build(&unit_triangle(), 3, &params, |_, p| p.x + p.y * 0.1 + 0.001);
        for p in [Vec2::new(0.1, 0.1), Vec2::new(0.7, 0.2), Vec2::new(0.05, 0.9), Vec2::X] {
            let leaf = h.locate(0, p).unwrap();
            let patch = &h.patches[leaf as usize];
            assert!(patch.split.is_none());
            let w = patch_weights(&patch.corners, p);
            assert!(w.iter().all(|&x| x >= -1e-5), "{p} not inside leaf: {w:?}");
        }
        assert!(h.locate(1, Vec2::ZERO).is_none());
    }

    #[test]
    fn test_patch_weights() {
        let w = patch_weights(&ROOT_CORNERS, Vec2::new(0.25, 0.5));
        assert!((w[0] - 0.25).abs() < 1e-6);
        assert!((w[1] - 0.25).abs() < 1e-6);
        assert!((w[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_energy_finiteness() {
        let mut energy = PatchEnergy {
            unshot_emitted: [Color::ONE, Color::ZERO],
            ..Default::default()
        };
        assert!(energy.is_finite());
        assert_eq!(energy.unshot_power(0), 3.0);

        energy.received_indirect.y = f32::NAN;
        assert!(!energy.is_finite());
        energy.received_indirect = Color::ZERO;
        energy.unshot_reflected[1].x = f32::INFINITY;
        assert!(!energy.is_finite());
    }
}
