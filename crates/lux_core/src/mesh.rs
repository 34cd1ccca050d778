//! Geometry adapter contract and the plain indexed mesh.
//!
//! Everything downstream (collider, solver, baker) reads geometry only
//! through `MeshAdapter`, so host meshes, transformed meshes and merged
//! multi-object meshes all look the same. Triangles are referenced by index
//! and never copied out of the adapter.

use lux_math::{Aabb, Plane, Vec2, Vec3};

/// Uniform triangle/vertex accessor a host mesh implements.
///
/// Indices returned by a wrapper may differ from the indices of the mesh it
/// wraps (vertex welding, merging several meshes). The `pre_import_*` /
/// `post_import_*` pairs translate between the two numberings: *pre-import*
/// is the index in the original data, *post-import* the index in this
/// adapter.
pub trait MeshAdapter: Send + Sync {
    fn num_vertices(&self) -> usize;

    /// Vertex position, `None` when out of range.
    fn vertex(&self, v: usize) -> Option<Vec3>;

    fn num_triangles(&self) -> usize;

    /// Vertex indices of triangle `t`, counter-clockwise seen from the front.
    fn triangle(&self, t: usize) -> Option<[u32; 3]>;

    /// Per-corner shading normals. Defaults to the flat face normal.
    fn triangle_normals(&self, t: usize) -> Option<[Vec3; 3]> {
        let [a, b, c] = self.triangle_body(t)?;
        let plane = Plane::from_triangle(a, b, c)?;
        Some([plane.normal; 3])
    }

    /// Per-corner lightmap UVs, `None` when the mesh has no mapping.
    fn triangle_mapping(&self, _t: usize) -> Option<[Vec2; 3]> {
        None
    }

    fn pre_import_vertex(&self, post_import: usize) -> Option<usize> {
        (post_import < self.num_vertices()).then_some(post_import)
    }

    fn post_import_vertex(&self, pre_import: usize) -> Option<usize> {
        (pre_import < self.num_vertices()).then_some(pre_import)
    }

    fn pre_import_triangle(&self, post_import: usize) -> Option<usize> {
        (post_import < self.num_triangles()).then_some(post_import)
    }

    fn post_import_triangle(&self, pre_import: usize) -> Option<usize> {
        (pre_import < self.num_triangles()).then_some(pre_import)
    }

    /// Corner positions of triangle `t`.
    fn triangle_body(&self, t: usize) -> Option<[Vec3; 3]> {
        let [a, b, c] = self.triangle(t)?;
        Some([
            self.vertex(a as usize)?,
            self.vertex(b as usize)?,
            self.vertex(c as usize)?,
        ])
    }

    /// Bounding box of all vertices.
    fn bounds(&self) -> Aabb {
        Aabb::enclosing((0..self.num_vertices()).filter_map(|v| self.vertex(v)))
    }
}

/// A mesh consisting of vertex positions, optional normals and UVs, and
/// triangle indices.
///
/// UVs are the lightmap channel: one `[u, v]` per vertex in `[0, 1]`.
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Vertex positions (one Vec3 per vertex)
    pub positions: Vec<Vec3>,

    /// Vertex normals (optional - flat normals are used otherwise)
    pub normals: Option<Vec<Vec3>>,

    /// Lightmap UV coordinates (optional - one per vertex)
    pub uvs: Option<Vec<Vec2>>,

    /// Triangle indices (every 3 indices form a triangle)
    pub indices: Vec<u32>,

    /// Axis-aligned bounding box
    pub bounds: Aabb,
}

impl Mesh {
    /// Create a new mesh from positions and indices, optionally with normals.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>, normals: Option<Vec<Vec3>>) -> Self {
        let bounds = Aabb::enclosing(positions.iter().copied());
        if indices.len() % 3 != 0 {
            log::warn!(
                "Index count {} is not a multiple of 3, trailing indices ignored",
                indices.len()
            );
        }
        Self {
            positions,
            normals,
            uvs: None,
            indices,
            bounds,
        }
    }

    /// Attach lightmap UVs (one per vertex).
    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        if uvs.len() != self.positions.len() {
            log::warn!(
                "UV count ({}) doesn't match vertex count ({}), mapping ignored",
                uvs.len(),
                self.positions.len()
            );
            return self;
        }
        self.uvs = Some(uvs);
        self
    }

    /// Compute smooth vertex normals by averaging area-weighted face normals.
    pub fn compute_normals(&mut self) {
        let vertex_count = self.positions.len();
        let mut normals = vec![Vec3::ZERO; vertex_count];

        for face in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [face[0] as usize, face[1] as usize, face[2] as usize];
            if i0 >= vertex_count || i1 >= vertex_count || i2 >= vertex_count {
                continue;
            }
            let p0 = self.positions[i0];
            let face_normal = (self.positions[i1] - p0).cross(self.positions[i2] - p0);

            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }

        for normal in &mut normals {
            *normal = normal.try_normalize().unwrap_or(Vec3::Y);
        }

        self.normals = Some(normals);
    }

    /// Get the number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get the number of vertices in the mesh.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

impl MeshAdapter for Mesh {
    fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    fn vertex(&self, v: usize) -> Option<Vec3> {
        self.positions.get(v).copied()
    }

    fn num_triangles(&self) -> usize {
        self.triangle_count()
    }

    fn triangle(&self, t: usize) -> Option<[u32; 3]> {
        let face = self.indices.get(t * 3..t * 3 + 3)?;
        Some([face[0], face[1], face[2]])
    }

    fn triangle_normals(&self, t: usize) -> Option<[Vec3; 3]> {
        match &self.normals {
            Some(normals) => {
                let [a, b, c] = self.triangle(t)?;
                Some([
                    *normals.get(a as usize)?,
                    *normals.get(b as usize)?,
                    *normals.get(c as usize)?,
                ])
            }
            None => {
                let [a, b, c] = self.triangle_body(t)?;
                let plane = Plane::from_triangle(a, b, c)?;
                Some([plane.normal; 3])
            }
        }
    }

    fn triangle_mapping(&self, t: usize) -> Option<[Vec2; 3]> {
        let uvs = self.uvs.as_ref()?;
        let [a, b, c] = self.triangle(t)?;
        Some([
            *uvs.get(a as usize)?,
            *uvs.get(b as usize)?,
            *uvs.get(c as usize)?,
        ])
    }

    fn bounds(&self) -> Aabb {
        self.bounds
    }
}
