//! Smoothing vertices (IVertices).
//!
//! An IVertex is shared by every patch corner that should show the same
//! smoothed value: corners of triangles meeting at a stitched mesh vertex
//! with similar normals, and midpoints introduced when patches split. It
//! stores plain `(patch, weight)` entries; the patch arena owns the patches.

use std::collections::HashMap;
use std::sync::Arc;

use lux_core::{DedupVerticesWrapper, MeshAdapter};
use lux_math::Vec3;

use crate::SmoothingParameters;

#[derive(Debug, Default, Clone)]
pub(crate) struct IVertex {
    /// Leaf patch and its corner angle
    pub entries: Vec<(u32, f32)>,
}

/// Arena of IVertices with midpoint sharing.
#[derive(Debug, Default)]
pub(crate) struct IVertexArena {
    vertices: Vec<IVertex>,
    midpoints: HashMap<(u32, u32), u32>,
}

impl IVertexArena {
    /// Arena holding `count` corner IVertices.
    pub fn with_corners(count: usize) -> Self {
        Self {
            vertices: vec![IVertex::default(); count],
            midpoints: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn get(&self, ivertex: u32) -> Option<&IVertex> {
        self.vertices.get(ivertex as usize)
    }

    /// IVertex at the midpoint of the edge `a`-`b`, shared by both sides of
    /// the edge when they split it.
    pub fn midpoint(&mut self, a: u32, b: u32) -> u32 {
        let key = (a.min(b), a.max(b));
        if let Some(&existing) = self.midpoints.get(&key) {
            return existing;
        }
        let index = self.vertices.len() as u32;
        self.vertices.push(IVertex::default());
        self.midpoints.insert(key, index);
        index
    }

    pub fn add_entry(&mut self, ivertex: u32, patch: u32, weight: f32) {
        if let Some(v) = self.vertices.get_mut(ivertex as usize) {
            v.entries.push((patch, weight));
        }
    }
}

/// Assign an IVertex to every corner of every usable triangle.
///
/// Vertices closer than `min_feature_size` are stitched. Around each
/// stitched vertex, corners whose face normals are within
/// `max_smooth_angle` of a group's first normal join that group.
/// Returns per-triangle corner IVertices and the number of IVertices.
pub(crate) fn corner_ivertices(
    mesh: &Arc<dyn MeshAdapter>,
    normals: &[Option<Vec3>],
    params: &SmoothingParameters,
) -> (Vec<Option<[u32; 3]>>, usize) {
    let welded = DedupVerticesWrapper::new(mesh.clone(), params.min_feature_size);

    let mut incident: Vec<Vec<(usize, usize)>> = vec![Vec::new(); welded.num_vertices()];
    for (t, normal) in normals.iter().enumerate() {
        if normal.is_none() {
            continue;
        }
        let Some(tri) = welded.triangle(t) else { continue };
        for (k, &v) in tri.iter().enumerate() {
            if let Some(list) = incident.get_mut(v as usize) {
                list.push((t, k));
            }
        }
    }

    let cos_limit = params.max_smooth_angle.clamp(0.0, std::f32::consts::PI).cos();
    let mut corners: Vec<Option<[u32; 3]>> = vec![None; normals.len()];
    let mut count = 0u32;

    for list in &incident {
        // (group normal, ivertex)
        let mut groups: Vec<(Vec3, u32)> = Vec::new();
        for &(t, k) in list {
            let Some(normal) = normals[t] else { continue };
            let ivertex = match groups.iter().find(|(n, _)| n.dot(normal) >= cos_limit) {
                Some(&(_, iv)) => iv,
                None => {
                    let iv = count;
                    count += 1;
                    groups.push((normal, iv));
                    iv
                }
            };
            corners[t].get_or_insert([u32::MAX; 3])[k] = ivertex;
        }
    }

    // Corners a malformed triangle left unassigned get private IVertices
    for tri in corners.iter_mut().flatten() {
        for iv in tri.iter_mut() {
            if *iv == u32::MAX {
                *iv = count;
                count += 1;
            }
        }
    }

    log::debug!(
        "Smoothing: {} mesh vertices stitched into {}, {} IVertices",
        mesh.num_vertices(),
        welded.num_vertices(),
        count
    );

    (corners, count as usize)
}
