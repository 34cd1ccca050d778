//! Binary space partitioning tree over triangle planes.
//!
//! Nodes live in a flat arena and reference children by index. A split node
//! keeps the triangles lying in its plane; triangles straddling the plane
//! are referenced from both subtrees. Traversal visits the subtree on the
//! ray's near side first, so hits reach the handler in near-to-far order.

use lux_math::{Aabb, Interval, Plane, Side, Vec3};

use crate::{triangle::TriangleP, CollisionHandler, CollisionRay, Hit};

/// Tree shape knobs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BspParams {
    /// Stop splitting at or below this many triangles
    pub leaf_size: usize,
    /// Triangle planes evaluated per split
    pub max_candidates: usize,
    pub max_depth: u32,
}

impl BspParams {
    /// Larger leaves and fewer candidates: smaller tree, slower queries.
    pub const COMPACT: BspParams = BspParams {
        leaf_size: 16,
        max_candidates: 8,
        max_depth: 24,
    };

    /// Small leaves and more candidates: bigger tree, faster queries.
    pub const FAST: BspParams = BspParams {
        leaf_size: 4,
        max_candidates: 24,
        max_depth: 40,
    };
}

/// Split cost weights.
const SPLIT_COST: usize = 8;
const BALANCE_COST: usize = 2;
const COPLANAR_COST: usize = 1;

enum BspNode {
    Split {
        bounds: Aabb,
        plane: Plane,
        /// Triangles lying in `plane`
        coplanar: Vec<u32>,
        front: Option<u32>,
        back: Option<u32>,
    },
    Leaf {
        bounds: Aabb,
        triangles: Vec<u32>,
    },
}

/// Shape summary, for logging and stats.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct BspShape {
    pub nodes: usize,
    pub leaves: usize,
    pub max_depth: u32,
    /// Triangle references including duplicates
    pub references: usize,
}

pub(crate) struct BspTree {
    nodes: Vec<BspNode>,
    root: Option<u32>,
    epsilon: f32,
    shape: BspShape,
}

struct Builder<'a> {
    triangles: &'a [Option<TriangleP>],
    params: BspParams,
    epsilon: f32,
    nodes: Vec<BspNode>,
    shape: BspShape,
}

impl BspTree {
    /// Build over every non-degenerate triangle.
    pub fn build(triangles: &[Option<TriangleP>], params: BspParams) -> Self {
        let indices: Vec<u32> = triangles
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_ref().map(|_| i as u32))
            .collect();

        let scene_bounds = Aabb::enclosing(
            triangles
                .iter()
                .flatten()
                .flat_map(|t| t.vertices()),
        );
        let epsilon = if scene_bounds.is_empty() {
            1e-6
        } else {
            (scene_bounds.diagonal() * 1e-6).max(1e-7)
        };

        let mut builder = Builder {
            triangles,
            params,
            epsilon,
            nodes: Vec::new(),
            shape: BspShape::default(),
        };
        let root = if indices.is_empty() {
            None
        } else {
            Some(builder.build_node(indices, 0))
        };
        builder.shape.nodes = builder.nodes.len();

        Self {
            nodes: builder.nodes,
            root,
            epsilon,
            shape: builder.shape,
        }
    }

    pub fn shape(&self) -> BspShape {
        self.shape
    }

    pub fn memory_usage(&self) -> usize {
        self.nodes.len() * std::mem::size_of::<BspNode>()
            + self.shape.references * std::mem::size_of::<u32>()
    }

    /// First accepted hit in near-to-far order.
    pub fn intersect(
        &self,
        triangles: &[Option<TriangleP>],
        ray: &CollisionRay,
        handler: &mut dyn CollisionHandler,
    ) -> Option<Hit> {
        let root = self.root?;
        let mut offered = Offered::default();
        self.visit(Some(root), triangles, ray, ray.range, handler, &mut offered)
    }

    fn visit(
        &self,
        node: Option<u32>,
        triangles: &[Option<TriangleP>],
        ray: &CollisionRay,
        range: Interval,
        handler: &mut dyn CollisionHandler,
        offered: &mut Offered,
    ) -> Option<Hit> {
        if range.is_empty() {
            return None;
        }
        match &self.nodes[node? as usize] {
            BspNode::Leaf {
                bounds,
                triangles: members,
            } => {
                let range = bounds.clip(&ray.ray, range)?;
                offered.offer(triangles, members, ray, range, handler)
            }
            BspNode::Split {
                bounds,
                plane,
                coplanar,
                front,
                back,
            } => {
                let range = bounds.clip(&ray.ray, range)?;
                let denom = plane.normal.dot(ray.ray.direction);
                let origin_distance = plane.distance(ray.ray.origin);

                // Parallel to the plane: stays on the origin's side
                if denom == 0.0 {
                    let side = if origin_distance >= 0.0 { *front } else { *back };
                    return self.visit(side, triangles, ray, range, handler, offered);
                }

                let (before, after) = if denom > 0.0 {
                    (*back, *front)
                } else {
                    (*front, *back)
                };
                let t_split = -origin_distance / denom;
                if t_split <= range.min {
                    return self.visit(after, triangles, ray, range, handler, offered);
                }
                if t_split >= range.max {
                    return self.visit(before, triangles, ray, range, handler, offered);
                }

                // Triangles touching the plane within epsilon may be hit just
                // past the split point. Straddling triangles can then show up
                // in both halves; `offered` keeps the handler from seeing a
                // rejected hit twice.
                let tolerance = (self.epsilon / denom.abs()).min(self.epsilon * 64.0);
                let near = Interval::new(range.min, (t_split + tolerance).min(range.max));
                if let Some(hit) = self.visit(before, triangles, ray, near, handler, offered) {
                    return Some(hit);
                }
                if let Some(hit) = offered.offer(triangles, coplanar, ray, range, handler) {
                    return Some(hit);
                }
                let far = Interval::new((t_split - tolerance).max(range.min), range.max);
                self.visit(after, triangles, ray, far, handler, offered)
            }
        }
    }
}

/// Triangles whose hits the handler already rejected during one query.
#[derive(Debug, Default)]
pub(crate) struct Offered {
    rejected: Vec<u32>,
}

impl Offered {
    /// Offer the hits among `members` to the handler, nearest first,
    /// skipping triangles it has already rejected.
    pub fn offer(
        &mut self,
        triangles: &[Option<TriangleP>],
        members: &[u32],
        ray: &CollisionRay,
        range: Interval,
        handler: &mut dyn CollisionHandler,
    ) -> Option<Hit> {
        let mut hits: Vec<Hit> = members
            .iter()
            .filter(|i| !self.rejected.contains(i))
            .filter_map(|&i| triangles[i as usize].as_ref()?.intersect(ray, range, i))
            .collect();
        hits.sort_unstable_by(|a, b| a.distance.total_cmp(&b.distance));
        for hit in hits {
            if handler.collides(&hit) {
                return Some(hit);
            }
            self.rejected.push(hit.triangle);
        }
        None
    }
}

impl Builder<'_> {
    fn body(&self, i: u32) -> Option<&TriangleP> {
        self.triangles[i as usize].as_ref()
    }

    fn bounds_of(&self, indices: &[u32]) -> Aabb {
        Aabb::enclosing(
            indices
                .iter()
                .filter_map(|&i| self.body(i))
                .flat_map(|t| t.vertices()),
        )
        .padded(self.epsilon * 4.0)
    }

    fn push(&mut self, node: BspNode) -> u32 {
        self.nodes.push(node);
        (self.nodes.len() - 1) as u32
    }

    fn leaf(&mut self, triangles: Vec<u32>, bounds: Aabb, depth: u32) -> u32 {
        self.shape.leaves += 1;
        self.shape.references += triangles.len();
        self.shape.max_depth = self.shape.max_depth.max(depth);
        self.push(BspNode::Leaf { bounds, triangles })
    }

    fn build_node(&mut self, indices: Vec<u32>, depth: u32) -> u32 {
        let bounds = self.bounds_of(&indices);

        if indices.len() <= self.params.leaf_size || depth >= self.params.max_depth {
            return self.leaf(indices, bounds, depth);
        }

        let Some(plane) = self.choose_split(&indices, &bounds) else {
            return self.leaf(indices, bounds, depth);
        };

        let mut front = Vec::new();
        let mut back = Vec::new();
        let mut coplanar = Vec::new();
        for &i in &indices {
            let Some(tri) = self.body(i) else { continue };
            match plane.classify_triangle(&tri.vertices(), self.epsilon) {
                Side::Front => front.push(i),
                Side::Back => back.push(i),
                Side::Coplanar => coplanar.push(i),
                Side::Spanning => {
                    front.push(i);
                    back.push(i);
                }
            }
        }

        let front = if front.is_empty() {
            None
        } else {
            Some(self.build_node(front, depth + 1))
        };
        let back = if back.is_empty() {
            None
        } else {
            Some(self.build_node(back, depth + 1))
        };

        self.shape.references += coplanar.len();
        self.shape.max_depth = self.shape.max_depth.max(depth);
        self.push(BspNode::Split {
            bounds,
            plane,
            coplanar,
            front,
            back,
        })
    }

    /// Best plane among sampled triangle planes and the longest-axis median.
    ///
    /// `None` when no candidate makes both children smaller than the parent.
    fn choose_split(&self, indices: &[u32], bounds: &Aabb) -> Option<Plane> {
        let n = indices.len();
        let stride = (n / self.params.max_candidates).max(1);

        let mut candidates: Vec<Plane> = indices
            .iter()
            .step_by(stride)
            .take(self.params.max_candidates)
            .filter_map(|&i| self.body(i).map(|t| t.plane))
            .collect();

        // Median centroid on the longest axis, for coplanar-heavy sets
        let axis = bounds.longest_axis();
        let mut centroids: Vec<f32> = indices
            .iter()
            .filter_map(|&i| self.body(i).map(|t| t.centroid()[axis]))
            .collect();
        if !centroids.is_empty() {
            let mid = centroids.len() / 2;
            let (_, median, _) = centroids.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
            let mut normal = Vec3::ZERO;
            normal[axis] = 1.0;
            let mut point = Vec3::ZERO;
            point[axis] = *median;
            candidates.push(Plane::from_point_normal(point, normal));
        }

        let mut best: Option<(usize, Plane)> = None;
        for plane in candidates {
            let (mut front, mut back, mut spanning, mut coplanar) = (0, 0, 0, 0);
            for tri in indices.iter().filter_map(|&i| self.body(i)) {
                match plane.classify_triangle(&tri.vertices(), self.epsilon) {
                    Side::Front => front += 1,
                    Side::Back => back += 1,
                    Side::Coplanar => coplanar += 1,
                    Side::Spanning => spanning += 1,
                }
            }
            if coplanar == n || front + spanning >= n || back + spanning >= n || spanning * 2 > n {
                continue;
            }
            let score = spanning * SPLIT_COST
                + front.abs_diff(back) * BALANCE_COST
                + coplanar * COPLANAR_COST;
            if best.map_or(true, |(s, _)| score < s) {
                best = Some((score, plane));
            }
        }
        best.map(|(_, plane)| plane)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AcceptAll, TransmittanceHandler};

    fn grid(n: usize) -> Vec<Option<TriangleP>> {
        // Flat n x n quad grid on z = 0
        let mut tris = Vec::new();
        for y in 0..n {
            for x in 0..n {
                let p = Vec3::new(x as f32, y as f32, 0.0);
                tris.push(TriangleP::new([p, p + Vec3::X, p + Vec3::X + Vec3::Y]));
                tris.push(TriangleP::new([p, p + Vec3::X + Vec3::Y, p + Vec3::Y]));
            }
        }
        tris
    }

    #[test]
    fn test_flat_grid_splits() {
        let tris = grid(8);
        let tree = BspTree::build(&tris, BspParams::FAST);
        let shape = tree.shape();
        assert!(shape.leaves > 1, "coplanar set should split on an axis");
        assert!(shape.references >= tris.len());

        let ray = CollisionRay::new(Vec3::new(3.3, 5.6, 2.0), -Vec3::Z, Interval::FORWARD);
        let hit = tree.intersect(&tris, &ray, &mut AcceptAll).unwrap();
        assert!((hit.distance - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_tree() {
        let tree = BspTree::build(&[None, None], BspParams::COMPACT);
        let ray = CollisionRay::new(Vec3::ZERO, Vec3::Z, Interval::FORWARD);
        assert!(tree.intersect(&[None, None], &ray, &mut AcceptAll).is_none());
        assert_eq!(tree.shape().nodes, 0);
    }

    #[test]
    fn test_near_to_far_order() {
        // Stack of parallel quads at z = 1..=6, viewed from below
        let mut tris = Vec::new();
        for k in 1..=6 {
            let z = k as f32;
            tris.push(TriangleP::new([
                Vec3::new(-1.0, -1.0, z),
                Vec3::new(1.0, -1.0, z),
                Vec3::new(0.0, 1.0, z),
            ]));
        }
        let tree = BspTree::build(&tris, BspParams::FAST);
        let ray = CollisionRay::new(Vec3::ZERO, Vec3::Z, Interval::FORWARD);
        let mut seen = Vec::new();
        let mut record = |hit: &Hit| {
            seen.push(hit.distance);
            false
        };
        assert!(tree.intersect(&tris, &ray, &mut record).is_none());
        assert_eq!(seen.len(), 6);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    }

    #[test]
    fn test_straddling_triangle_offered_once() {
        // Floor triangle crossing the x = 0 split, referenced from both sides
        let tris = vec![TriangleP::new([
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ])];
        let bounds = Aabb::from_points(Vec3::splat(-2.0), Vec3::splat(2.0));
        let tree = BspTree {
            nodes: vec![
                BspNode::Split {
                    bounds,
                    plane: Plane::from_point_normal(Vec3::ZERO, Vec3::X),
                    coplanar: Vec::new(),
                    front: Some(1),
                    back: Some(2),
                },
                BspNode::Leaf {
                    bounds,
                    triangles: vec![0],
                },
                BspNode::Leaf {
                    bounds,
                    triangles: vec![0],
                },
            ],
            root: Some(0),
            epsilon: 1e-5,
            shape: BspShape::default(),
        };

        // Crosses the split plane exactly where it hits the floor
        let ray = CollisionRay::new(
            Vec3::new(-1.0, 0.2, 1.0),
            Vec3::new(1.0, 0.0, -1.0).normalize(),
            Interval::FORWARD,
        );
        let mut offers = 0;
        let mut count = |_: &Hit| {
            offers += 1;
            false
        };
        assert!(tree.intersect(&tris, &ray, &mut count).is_none());
        assert_eq!(offers, 1);

        let mut shadow = TransmittanceHandler::new(|_| 0.5);
        assert!(tree.intersect(&tris, &ray, &mut shadow).is_none());
        assert!((shadow.visibility - 0.5).abs() < 1e-6);
    }
}
