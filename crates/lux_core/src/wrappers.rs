//! Mesh wrappers composed over `MeshAdapter`.
//!
//! Each wrapper owns an `Arc<dyn MeshAdapter>` and implements the adapter
//! itself, so wrappers nest freely (a transformed mesh inside a multi-mesh,
//! a welded multi-mesh, ...).

use std::collections::HashMap;
use std::sync::Arc;

use lux_math::{Aabb, Mat4, Mat4Ext, Vec2, Vec3};

use crate::mesh::MeshAdapter;

/// Mesh seen through a local-to-world matrix.
pub struct TransformWrapper {
    inner: Arc<dyn MeshAdapter>,
    matrix: Mat4,
    flip: bool,
}

impl TransformWrapper {
    pub fn new(inner: Arc<dyn MeshAdapter>, matrix: Mat4) -> Self {
        Self {
            flip: matrix.flips_winding(),
            inner,
            matrix,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    // Mirroring transforms swap corners 1 and 2 to keep the winding counter-clockwise.
    fn reorder<T: Copy>(&self, corners: [T; 3]) -> [T; 3] {
        if self.flip {
            [corners[0], corners[2], corners[1]]
        } else {
            corners
        }
    }
}

impl MeshAdapter for TransformWrapper {
    fn num_vertices(&self) -> usize {
        self.inner.num_vertices()
    }

    fn vertex(&self, v: usize) -> Option<Vec3> {
        self.inner.vertex(v).map(|p| self.matrix.transform_point3(p))
    }

    fn num_triangles(&self) -> usize {
        self.inner.num_triangles()
    }

    fn triangle(&self, t: usize) -> Option<[u32; 3]> {
        self.inner.triangle(t).map(|tri| self.reorder(tri))
    }

    fn triangle_normals(&self, t: usize) -> Option<[Vec3; 3]> {
        let normals = self.inner.triangle_normals(t)?;
        Some(self.reorder(normals.map(|n| self.matrix.transform_normal(n))))
    }

    fn triangle_mapping(&self, t: usize) -> Option<[Vec2; 3]> {
        self.inner.triangle_mapping(t).map(|uv| self.reorder(uv))
    }

    fn pre_import_vertex(&self, post_import: usize) -> Option<usize> {
        self.inner.pre_import_vertex(post_import)
    }

    fn post_import_vertex(&self, pre_import: usize) -> Option<usize> {
        self.inner.post_import_vertex(pre_import)
    }

    fn pre_import_triangle(&self, post_import: usize) -> Option<usize> {
        self.inner.pre_import_triangle(post_import)
    }

    fn post_import_triangle(&self, pre_import: usize) -> Option<usize> {
        self.inner.post_import_triangle(pre_import)
    }

    fn bounds(&self) -> Aabb {
        self.matrix.transform_aabb(&self.inner.bounds())
    }
}

/// Several meshes concatenated into one index space.
///
/// Vertices and triangles of mesh `i` follow those of mesh `i - 1`.
pub struct MultiMeshWrapper {
    meshes: Vec<Arc<dyn MeshAdapter>>,
    /// Prefix sums, `len == meshes.len() + 1`
    vertex_offsets: Vec<usize>,
    triangle_offsets: Vec<usize>,
}

impl MultiMeshWrapper {
    pub fn new(meshes: Vec<Arc<dyn MeshAdapter>>) -> Self {
        let mut vertex_offsets = Vec::with_capacity(meshes.len() + 1);
        let mut triangle_offsets = Vec::with_capacity(meshes.len() + 1);
        let (mut v, mut t) = (0, 0);
        for mesh in &meshes {
            vertex_offsets.push(v);
            triangle_offsets.push(t);
            v += mesh.num_vertices();
            t += mesh.num_triangles();
        }
        vertex_offsets.push(v);
        triangle_offsets.push(t);
        Self {
            meshes,
            vertex_offsets,
            triangle_offsets,
        }
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// First global triangle index of mesh `mesh`.
    pub fn triangle_offset(&self, mesh: usize) -> Option<usize> {
        (mesh < self.meshes.len()).then(|| self.triangle_offsets[mesh])
    }

    /// First global vertex index of mesh `mesh`.
    pub fn vertex_offset(&self, mesh: usize) -> Option<usize> {
        (mesh < self.meshes.len()).then(|| self.vertex_offsets[mesh])
    }

    /// Global triangle index → (mesh, local triangle).
    pub fn locate_triangle(&self, t: usize) -> Option<(usize, usize)> {
        locate(&self.triangle_offsets, t)
    }

    /// Global vertex index → (mesh, local vertex).
    pub fn locate_vertex(&self, v: usize) -> Option<(usize, usize)> {
        locate(&self.vertex_offsets, v)
    }
}

fn locate(offsets: &[usize], index: usize) -> Option<(usize, usize)> {
    let total = *offsets.last()?;
    if index >= total {
        return None;
    }
    // First offset greater than index, minus one; skips empty meshes
    let mesh = offsets.partition_point(|&o| o <= index) - 1;
    Some((mesh, index - offsets[mesh]))
}

impl MeshAdapter for MultiMeshWrapper {
    fn num_vertices(&self) -> usize {
        *self.vertex_offsets.last().unwrap_or(&0)
    }

    fn vertex(&self, v: usize) -> Option<Vec3> {
        let (mesh, local) = self.locate_vertex(v)?;
        self.meshes[mesh].vertex(local)
    }

    fn num_triangles(&self) -> usize {
        *self.triangle_offsets.last().unwrap_or(&0)
    }

    fn triangle(&self, t: usize) -> Option<[u32; 3]> {
        let (mesh, local) = self.locate_triangle(t)?;
        let offset = self.vertex_offsets[mesh] as u32;
        self.meshes[mesh]
            .triangle(local)
            .map(|tri| tri.map(|v| v + offset))
    }

    fn triangle_normals(&self, t: usize) -> Option<[Vec3; 3]> {
        let (mesh, local) = self.locate_triangle(t)?;
        self.meshes[mesh].triangle_normals(local)
    }

    fn triangle_mapping(&self, t: usize) -> Option<[Vec2; 3]> {
        let (mesh, local) = self.locate_triangle(t)?;
        self.meshes[mesh].triangle_mapping(local)
    }

    fn bounds(&self) -> Aabb {
        self.meshes
            .iter()
            .fold(Aabb::EMPTY, |acc, m| Aabb::surrounding(&acc, &m.bounds()))
    }
}

/// Welds vertices closer than a tolerance into one.
///
/// Triangle numbering is unchanged; triangles that collapse keep their slot
/// and are dropped as degenerate by the consumers.
pub struct DedupVerticesWrapper {
    inner: Arc<dyn MeshAdapter>,
    /// unique vertex → first original vertex
    post_to_pre: Vec<usize>,
    /// original vertex → unique vertex
    pre_to_post: Vec<usize>,
}

impl DedupVerticesWrapper {
    pub fn new(inner: Arc<dyn MeshAdapter>, tolerance: f32) -> Self {
        let tolerance = tolerance.max(f32::EPSILON);
        let n = inner.num_vertices();
        let mut grid: HashMap<[i64; 3], Vec<usize>> = HashMap::new();
        let mut post_to_pre = Vec::new();
        let mut pre_to_post = Vec::with_capacity(n);

        for v in 0..n {
            let p = inner.vertex(v).unwrap_or(Vec3::ZERO);
            let cell = (p / tolerance).floor();
            let key = [cell.x as i64, cell.y as i64, cell.z as i64];

            let mut found = None;
            'search: for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        let k = [key[0] + dx, key[1] + dy, key[2] + dz];
                        let Some(bucket) = grid.get(&k) else { continue };
                        for &unique in bucket {
                            let q = inner.vertex(post_to_pre[unique]).unwrap_or(Vec3::ZERO);
                            if q.distance(p) <= tolerance {
                                found = Some(unique);
                                break 'search;
                            }
                        }
                    }
                }
            }

            let unique = match found {
                Some(unique) => unique,
                None => {
                    let unique = post_to_pre.len();
                    post_to_pre.push(v);
                    grid.entry(key).or_default().push(unique);
                    unique
                }
            };
            pre_to_post.push(unique);
        }

        log::debug!(
            "Welded {} vertices into {} (tolerance {})",
            n,
            post_to_pre.len(),
            tolerance
        );

        Self {
            inner,
            post_to_pre,
            pre_to_post,
        }
    }
}

impl MeshAdapter for DedupVerticesWrapper {
    fn num_vertices(&self) -> usize {
        self.post_to_pre.len()
    }

    fn vertex(&self, v: usize) -> Option<Vec3> {
        self.inner.vertex(*self.post_to_pre.get(v)?)
    }

    fn num_triangles(&self) -> usize {
        self.inner.num_triangles()
    }

    fn triangle(&self, t: usize) -> Option<[u32; 3]> {
        let tri = self.inner.triangle(t)?;
        let mut out = [0u32; 3];
        for (dst, src) in out.iter_mut().zip(tri) {
            *dst = *self.pre_to_post.get(src as usize)? as u32;
        }
        Some(out)
    }

    fn triangle_normals(&self, t: usize) -> Option<[Vec3; 3]> {
        self.inner.triangle_normals(t)
    }

    fn triangle_mapping(&self, t: usize) -> Option<[Vec2; 3]> {
        self.inner.triangle_mapping(t)
    }

    fn pre_import_vertex(&self, post_import: usize) -> Option<usize> {
        self.post_to_pre.get(post_import).copied()
    }

    fn post_import_vertex(&self, pre_import: usize) -> Option<usize> {
        self.pre_to_post.get(pre_import).copied()
    }

    fn bounds(&self) -> Aabb {
        self.inner.bounds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mesh;

    fn triangle_mesh(offset: Vec3) -> Arc<dyn MeshAdapter> {
        Arc::new(Mesh::new(
            vec![offset, offset + Vec3::X, offset + Vec3::Y],
            vec![0, 1, 2],
            None,
        ))
    }

    #[test]
    fn test_transform_wrapper_positions() {
        let wrapped = TransformWrapper::new(
            triangle_mesh(Vec3::ZERO),
            Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)),
        );
        assert_eq!(wrapped.vertex(1), Some(Vec3::new(1.0, 0.0, 5.0)));
        assert!((wrapped.bounds().min.z - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_transform_wrapper_mirror_keeps_winding() {
        let wrapped = TransformWrapper::new(
            triangle_mesh(Vec3::ZERO),
            Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0)),
        );
        assert_eq!(wrapped.triangle(0), Some([0, 2, 1]));
        // Face normal of the mirrored triangle still faces +Z
        let [a, b, c] = wrapped.triangle_body(0).unwrap();
        assert!((b - a).cross(c - a).z > 0.0);
        let normals = wrapped.triangle_normals(0).unwrap();
        assert!((normals[0] - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_multi_mesh_offsets() {
        let empty: Arc<dyn MeshAdapter> = Arc::new(Mesh::new(vec![], vec![], None));
        let multi = MultiMeshWrapper::new(vec![
            triangle_mesh(Vec3::ZERO),
            empty,
            triangle_mesh(Vec3::Z),
        ]);
        assert_eq!(multi.num_vertices(), 6);
        assert_eq!(multi.num_triangles(), 2);
        assert_eq!(multi.triangle(1), Some([3, 4, 5]));
        assert_eq!(multi.vertex(3), Some(Vec3::Z));
        assert_eq!(multi.locate_triangle(1), Some((2, 0)));
        assert_eq!(multi.triangle_offset(2), Some(1));
        assert_eq!(multi.locate_triangle(2), None);
    }

    #[test]
    fn test_dedup_welds_shared_corners() {
        // Two triangles of a quad stored with 6 separate vertices
        let mesh: Arc<dyn MeshAdapter> = Arc::new(Mesh::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 1e-6),
            ],
            vec![0, 1, 2, 3, 4, 5],
            None,
        ));
        let welded = DedupVerticesWrapper::new(mesh, 1e-4);
        assert_eq!(welded.num_vertices(), 4);
        assert_eq!(welded.triangle(1), Some([0, 2, 3]));
        assert_eq!(welded.post_import_vertex(4), Some(2));
        assert_eq!(welded.pre_import_vertex(3), Some(5));
    }
}
