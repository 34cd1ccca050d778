//! Collider: acceleration structure bound to a mesh.

use std::sync::Arc;
use std::time::Instant;

use lux_core::MeshAdapter;
use lux_math::Plane;

use crate::bsp::{self, BspParams, BspTree};
use crate::triangle::TriangleP;
use crate::{AcceptAll, CollisionHandler, CollisionRay, Hit};

/// Acceleration technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Technique {
    /// Test every triangle. No build cost.
    Linear,
    /// BSP with large leaves: less memory, slower queries.
    BspCompact,
    /// BSP with small leaves: more memory, faster queries.
    #[default]
    BspFast,
    /// Run the BSP and cross-check every query against the linear scan.
    Verification,
}

/// Build summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColliderStats {
    pub triangles: usize,
    /// Zero-area or non-finite triangles, never reported as hits
    pub degenerate: usize,
    pub nodes: usize,
    pub leaves: usize,
    pub max_depth: u32,
    /// Triangle references stored in the tree, duplicates included
    pub references: usize,
    pub memory_bytes: usize,
}

/// Ray/mesh intersection for one immutable mesh.
///
/// Triangle indices in hits are the mesh's post-import indices.
pub struct Collider {
    mesh: Arc<dyn MeshAdapter>,
    technique: Technique,
    triangles: Vec<Option<TriangleP>>,
    bsp: Option<BspTree>,
    stats: ColliderStats,
}

impl Collider {
    pub fn build(mesh: Arc<dyn MeshAdapter>, technique: Technique) -> Self {
        let start = Instant::now();

        let triangles: Vec<Option<TriangleP>> = (0..mesh.num_triangles())
            .map(|t| {
                let tri = mesh.triangle_body(t).and_then(TriangleP::new);
                if tri.is_none() {
                    log::debug!("Triangle {} is degenerate, excluded from collisions", t);
                }
                tri
            })
            .collect();

        let bsp = match technique {
            Technique::Linear => None,
            Technique::BspCompact => Some(BspTree::build(&triangles, BspParams::COMPACT)),
            Technique::BspFast | Technique::Verification => {
                Some(BspTree::build(&triangles, BspParams::FAST))
            }
        };

        let degenerate = triangles.iter().filter(|t| t.is_none()).count();
        let mut stats = ColliderStats {
            triangles: triangles.len(),
            degenerate,
            memory_bytes: triangles.len() * std::mem::size_of::<Option<TriangleP>>(),
            ..Default::default()
        };
        if let Some(tree) = &bsp {
            let shape = tree.shape();
            stats.nodes = shape.nodes;
            stats.leaves = shape.leaves;
            stats.max_depth = shape.max_depth;
            stats.references = shape.references;
            stats.memory_bytes += tree.memory_usage();
        }

        log::info!(
            "Built {:?} collider: {} triangles ({} degenerate), {} nodes, depth {} in {:.2?}",
            technique,
            stats.triangles,
            stats.degenerate,
            stats.nodes,
            stats.max_depth,
            start.elapsed()
        );

        Self {
            mesh,
            technique,
            triangles,
            bsp,
            stats,
        }
    }

    pub fn mesh(&self) -> &Arc<dyn MeshAdapter> {
        &self.mesh
    }

    pub fn technique(&self) -> Technique {
        self.technique
    }

    pub fn stats(&self) -> ColliderStats {
        self.stats
    }

    /// Plane of triangle `t`, `None` for degenerate or out-of-range triangles.
    pub fn triangle_plane(&self, t: usize) -> Option<Plane> {
        self.triangles.get(t)?.as_ref().map(|tri| tri.plane)
    }

    pub fn is_degenerate(&self, t: usize) -> bool {
        self.triangle_plane(t).is_none()
    }

    /// First hit accepted by `handler`, searching `ray.range`.
    ///
    /// With BSP techniques candidates arrive nearest first and the result is
    /// the nearest accepted hit. `Linear` offers candidates in triangle order
    /// but still returns the nearest accepted one.
    pub fn intersect(&self, ray: &CollisionRay, handler: &mut dyn CollisionHandler) -> Option<Hit> {
        match (&self.bsp, self.technique) {
            (Some(tree), Technique::Verification) => {
                let hit = tree.intersect(&self.triangles, ray, handler);
                self.verify(tree, ray);
                hit
            }
            (Some(tree), _) => tree.intersect(&self.triangles, ray, handler),
            (None, _) => self.intersect_linear(ray, handler),
        }
    }

    /// Nearest hit of any triangle.
    pub fn intersect_nearest(&self, ray: &CollisionRay) -> Option<Hit> {
        self.intersect(ray, &mut AcceptAll)
    }

    fn intersect_linear(&self, ray: &CollisionRay, handler: &mut dyn CollisionHandler) -> Option<Hit> {
        let mut range = ray.range;
        let mut nearest = None;
        for (i, tri) in self.triangles.iter().enumerate() {
            let Some(tri) = tri else { continue };
            if let Some(hit) = tri.intersect(ray, range, i as u32) {
                if handler.collides(&hit) {
                    range.max = hit.distance;
                    nearest = Some(hit);
                }
            }
        }
        nearest
    }

    fn verify(&self, tree: &BspTree, ray: &CollisionRay) {
        let expected = self.intersect_linear(ray, &mut AcceptAll);
        let got = tree.intersect(&self.triangles, ray, &mut AcceptAll);
        let agree = match (&expected, &got) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                let tolerance = 1e-4 * a.distance.abs().max(1.0);
                (a.distance - b.distance).abs() <= tolerance
            }
            _ => false,
        };
        if !agree {
            log::error!(
                "Collider mismatch for ray {:?}: linear {:?}, bsp {:?}",
                ray.ray,
                expected.map(|h| (h.triangle, h.distance)),
                got.map(|h| (h.triangle, h.distance))
            );
        }
    }

    /// Offer hits among the given triangles to `handler`, nearest first.
    pub fn intersect_subset(
        &self,
        ray: &CollisionRay,
        triangles: &[u32],
        handler: &mut dyn CollisionHandler,
    ) -> Option<Hit> {
        let members: Vec<u32> = triangles
            .iter()
            .copied()
            .filter(|&t| (t as usize) < self.triangles.len())
            .collect();
        bsp::Offered::default().offer(&self.triangles, &members, ray, ray.range, handler)
    }
}
