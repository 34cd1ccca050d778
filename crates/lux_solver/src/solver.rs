//! Static solver: progressive refinement radiosity over the patch hierarchy.
//!
//! Energy moves by shooting: the leaf patch holding the most un-shot power
//! sends it along stochastic cosine-distributed rays traced through the
//! collider, and every receiving leaf queues the diffusely reflected part
//! as its own un-shot energy. Propagation is single-threaded and
//! cooperative: the caller's stop predicate is polled between shots.

use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Instant;

use lux_collider::{Collider, CollisionRay, SkipTriangle};
use lux_core::{Color, MaterialTable, Scaler};
use lux_math::sequence::{cosine_hemisphere, uniform_triangle};
use lux_math::{orthonormal_basis, Interval, Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ivertex::corner_ivertices;
use crate::measure::{finish, Channels};
use crate::patch::{patch_weights, Hierarchy, PatchEnergy, TriangleGeometry, ROOT_CORNERS};
use crate::{Measure, PropagationParameters, SmoothingParameters, SubtriangleMeasure};

/// Lifecycle of a solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    /// Nothing usable was imported
    Unbuilt,
    /// Patch hierarchy must be (re)built
    FactorsDirty,
    /// Primary sources changed since the last reset
    EnergyDirty,
    Converging,
    Stable,
    /// Closed by the validity gate
    Aborted,
}

/// Result of an improvement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Improvement {
    /// At least one shot was made
    Improved,
    /// Stopped before any shot
    NotImproved,
    /// Nothing meaningful left to shoot
    Finished,
    /// Energy became non-finite; the solution is unusable
    InternalError,
}

/// Primary sources already loaded into the patches.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct LoadedPrimary {
    emittance: Color,
    direct: [Color; 3],
}

pub struct StaticSolver {
    collider: Arc<Collider>,
    materials: Arc<MaterialTable>,
    smoothing: SmoothingParameters,
    propagation: PropagationParameters,
    triangles: Vec<Option<TriangleGeometry>>,
    corner_ivertex_count: usize,
    emitters: Vec<u32>,
    hierarchy: Hierarchy,
    /// Injected direct irradiance per triangle corner
    direct_illumination: Vec<[Color; 3]>,
    loaded: Vec<LoadedPrimary>,
    loaded_power: f32,
    rng: StdRng,
    state: SolverState,
    valid: bool,
    epsilon: f32,
    shots: u64,
}

impl StaticSolver {
    /// Import the collider's mesh with per-triangle materials.
    ///
    /// Degenerate triangles and triangles without a material are skipped;
    /// they still block rays through the collider.
    pub fn new(
        collider: Arc<Collider>,
        materials: Arc<MaterialTable>,
        smoothing: SmoothingParameters,
        propagation: PropagationParameters,
    ) -> Self {
        let start = Instant::now();
        let mesh = collider.mesh().clone();
        let n = mesh.num_triangles();
        if materials.triangle_count() != n {
            log::warn!(
                "Material table covers {} triangles, mesh has {}",
                materials.triangle_count(),
                n
            );
        }

        let normals: Vec<Option<Vec3>> = (0..n)
            .map(|t| {
                materials.get(t)?;
                collider.triangle_plane(t).map(|plane| plane.normal)
            })
            .collect();
        let (corners, corner_ivertex_count) = corner_ivertices(&mesh, &normals, &smoothing);

        let triangles: Vec<Option<TriangleGeometry>> = (0..n)
            .map(|t| {
                let normal = normals[t]?;
                let ivertices = corners[t]?;
                let vertices = mesh.triangle_body(t)?;
                let area = 0.5 * (vertices[1] - vertices[0]).cross(vertices[2] - vertices[0]).length();
                Some(TriangleGeometry {
                    vertices,
                    normal,
                    area,
                    ivertices,
                })
            })
            .collect();

        let emitters: Vec<u32> = triangles
            .iter()
            .enumerate()
            .filter(|(t, g)| g.is_some() && materials.get(*t).is_some_and(|m| m.is_emissive()))
            .map(|(t, _)| t as u32)
            .collect();

        let imported = triangles.iter().flatten().count();
        let bounds = mesh.bounds();
        let epsilon = if bounds.is_empty() {
            1e-5
        } else {
            (bounds.diagonal() * 1e-5).max(1e-6)
        };

        log::info!(
            "Imported {} of {} triangles ({} emissive) in {:.2?}",
            imported,
            n,
            emitters.len(),
            start.elapsed()
        );

        Self {
            collider,
            materials,
            smoothing,
            propagation,
            triangles,
            corner_ivertex_count,
            emitters,
            hierarchy: Hierarchy::default(),
            direct_illumination: vec![[Color::ZERO; 3]; n],
            loaded: vec![LoadedPrimary::default(); n],
            loaded_power: 0.0,
            rng: StdRng::seed_from_u64(propagation.seed),
            state: if imported == 0 {
                SolverState::Unbuilt
            } else {
                SolverState::FactorsDirty
            },
            valid: true,
            epsilon,
            shots: 0,
        }
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn collider(&self) -> &Arc<Collider> {
        &self.collider
    }

    pub fn materials(&self) -> &Arc<MaterialTable> {
        &self.materials
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.hierarchy.leaves.len()
    }

    pub fn patch_count(&self) -> usize {
        self.hierarchy.patches.len()
    }

    /// Total shots since construction.
    pub fn shots(&self) -> u64 {
        self.shots
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Validity gate. While closed, every operation is a no-op returning
    /// `Finished` or zero.
    pub fn set_valid(&mut self, valid: bool) {
        if self.valid == valid {
            return;
        }
        self.valid = valid;
        if valid {
            self.state = if self.triangles.iter().any(Option::is_some) {
                SolverState::FactorsDirty
            } else {
                SolverState::Unbuilt
            };
        } else {
            log::warn!("Solver invalidated, results are zero until re-enabled");
            self.state = SolverState::Aborted;
        }
    }

    /// Inject constant direct irradiance (physical) on the front side of
    /// `triangle`. Takes effect at the next reset.
    pub fn set_direct_illumination(&mut self, triangle: usize, irradiance: Color) {
        self.set_direct_illumination_corners(triangle, [irradiance; 3]);
    }

    /// Inject direct irradiance given at the triangle's corners, linearly
    /// interpolated across it.
    pub fn set_direct_illumination_corners(&mut self, triangle: usize, irradiance: [Color; 3]) {
        debug_assert!(triangle < self.direct_illumination.len(), "triangle {triangle} out of range");
        if !self.valid {
            return;
        }
        let Some(slot) = self.direct_illumination.get_mut(triangle) else {
            return;
        };
        if *slot != irradiance {
            *slot = irradiance;
            if matches!(self.state, SolverState::Converging | SolverState::Stable) {
                self.state = SolverState::EnergyDirty;
            }
        }
    }

    pub fn clear_direct_illumination(&mut self) {
        for t in 0..self.direct_illumination.len() {
            self.set_direct_illumination(t, Color::ZERO);
        }
    }

    /// Reset the solution.
    ///
    /// `reset_factors` rebuilds the patch hierarchy (and so clears all
    /// energy). `reset_propagation` clears accumulated energy and reloads
    /// the primary sources. With neither, only the change of the primary
    /// sources since the last load is queued for shooting; it may be
    /// negative.
    pub fn illumination_reset(&mut self, reset_factors: bool, reset_propagation: bool) {
        if !self.valid || self.state == SolverState::Unbuilt {
            return;
        }
        let rebuild = reset_factors || self.state == SolverState::FactorsDirty;
        if rebuild {
            self.build_hierarchy();
        }
        if rebuild || reset_propagation {
            for patch in &mut self.hierarchy.patches {
                patch.energy = PatchEnergy::default();
            }
            self.loaded.fill(LoadedPrimary::default());
        }
        self.load_primary();
        self.state = SolverState::Converging;
    }

    fn build_hierarchy(&mut self) {
        let start = Instant::now();
        let hierarchy = Hierarchy::build(
            &self.triangles,
            self.corner_ivertex_count,
            &self.smoothing,
            |t, param| self.primary_irradiance(t, param).element_sum() / 3.0,
        );
        self.hierarchy = hierarchy;
        log::info!(
            "Subdivided {} triangles into {} patches in {:.2?}",
            self.triangles.iter().flatten().count(),
            self.hierarchy.leaves.len(),
            start.elapsed()
        );
    }

    /// Unoccluded primary irradiance at a point of `triangle`, used to
    /// decide where to subdivide.
    fn primary_irradiance(&self, triangle: usize, param: Vec2) -> Color {
        let Some(receiver) = &self.triangles[triangle] else {
            return Color::ZERO;
        };
        let [d0, d1, d2] = self.direct_illumination[triangle];
        let mut irradiance = d0 * (1.0 - param.x - param.y) + d1 * param.x + d2 * param.y;

        let p = receiver.point(param);
        for &e in &self.emitters {
            let e = e as usize;
            if e == triangle {
                continue;
            }
            let (Some(emitter), Some(material)) = (&self.triangles[e], self.materials.get(e)) else {
                continue;
            };
            let to_emitter = emitter.centroid() - p;
            let distance2 = to_emitter.length_squared().max(emitter.area);
            let direction = to_emitter.normalize_or_zero();
            let cos_receiver = receiver.normal.dot(direction).abs();
            let cos_emitter = -emitter.normal.dot(direction);
            let emits = if cos_emitter >= 0.0 {
                material.sides[0].emit_to
            } else {
                material.sides[1].emit_to
            };
            if emits {
                irradiance += material.diffuse_emittance
                    * (emitter.area * cos_receiver * cos_emitter.abs() / (PI * distance2));
            }
        }
        irradiance
    }

    /// Queue the difference between current and loaded primary sources.
    fn load_primary(&mut self) {
        let mut power = 0.0;
        for t in 0..self.triangles.len() {
            let (Some(geometry), Some(material)) = (&self.triangles[t], self.materials.get(t)) else {
                continue;
            };
            let current = LoadedPrimary {
                emittance: material.diffuse_emittance,
                direct: self.direct_illumination[t],
            };
            let emitting_sides = material.sides.iter().filter(|s| s.emit_to).count() as f32;
            let mean_direct = (current.direct[0] + current.direct[1] + current.direct[2]) / 3.0;
            power += (current.emittance * emitting_sides + material.diffuse_reflectance * mean_direct)
                .abs()
                .element_sum()
                * geometry.area;

            let previous = self.loaded[t];
            if previous == current {
                continue;
            }
            let delta_emittance = current.emittance - previous.emittance;
            let delta_direct = [0, 1, 2].map(|k| current.direct[k] - previous.direct[k]);
            let front = material.sides[0];

            for leaf in self.hierarchy.leaves_of(t) {
                let patch = &mut self.hierarchy.patches[leaf as usize];
                let area = patch.area;
                // Mean of the linear field over the patch = mean at its corners
                let direct = patch
                    .corners
                    .iter()
                    .map(|c| {
                        delta_direct[0] * (1.0 - c.x - c.y) + delta_direct[1] * c.x + delta_direct[2] * c.y
                    })
                    .sum::<Color>()
                    / 3.0;

                let energy = &mut patch.energy;
                if front.catch_from {
                    energy.received_direct += direct * area;
                    if front.reflect {
                        energy.unshot_reflected[0] += material.diffuse_reflectance * direct * area;
                    }
                }
                for (side, bits) in material.sides.iter().enumerate() {
                    if bits.emit_to {
                        energy.unshot_emitted[side] += delta_emittance * area;
                    }
                }
            }
            self.loaded[t] = current;
        }
        self.loaded_power = power;
        log::debug!("Loaded primary power {:.4}", power);
    }

    /// Shoot energy until `should_stop` returns true or the solution
    /// converges.
    pub fn illumination_improve(&mut self, mut should_stop: impl FnMut() -> bool) -> Improvement {
        if !self.valid {
            return Improvement::Finished;
        }
        match self.state {
            SolverState::Unbuilt | SolverState::Aborted => return Improvement::Finished,
            SolverState::FactorsDirty => self.illumination_reset(true, true),
            SolverState::EnergyDirty => self.illumination_reset(false, false),
            SolverState::Converging | SolverState::Stable => {}
        }

        let threshold = self.propagation.convergence_threshold * self.loaded_power;
        let mut shots = 0u64;
        while !should_stop() {
            let Some((leaf, side, power)) = self.pick_shooter() else {
                self.state = SolverState::Stable;
                return Improvement::Finished;
            };
            if !self.hierarchy.patches[leaf as usize].energy.is_finite() {
                log::error!("Non-finite energy on patch {}", leaf);
                return Improvement::InternalError;
            }
            if power <= threshold {
                self.state = SolverState::Stable;
                return Improvement::Finished;
            }
            self.shoot(leaf, side);
            self.shots += 1;
            shots += 1;
        }

        if shots > 0 {
            self.state = SolverState::Converging;
            Improvement::Improved
        } else {
            Improvement::NotImproved
        }
    }

    /// Leaf side with the most un-shot power.
    fn pick_shooter(&self) -> Option<(u32, usize, f32)> {
        let mut best: Option<(u32, usize, f32)> = None;
        for &leaf in &self.hierarchy.leaves {
            let energy = &self.hierarchy.patches[leaf as usize].energy;
            for side in 0..2 {
                let power = energy.unshot_power(side);
                if !power.is_finite() {
                    return Some((leaf, side, power));
                }
                if best.map_or(true, |(_, _, p)| power > p) {
                    best = Some((leaf, side, power));
                }
            }
        }
        best
    }

    fn shoot(&mut self, leaf: u32, side: usize) {
        let patch = &mut self.hierarchy.patches[leaf as usize];
        let emitted = std::mem::take(&mut patch.energy.unshot_emitted[side]);
        let reflected = std::mem::take(&mut patch.energy.unshot_reflected[side]);
        let triangle = patch.triangle;
        let corners = patch.corners;
        let Some(geometry) = self.triangles[triangle as usize] else {
            return;
        };

        let rays = self.propagation.rays_per_shot.max(1);
        let per_ray_emitted = emitted / rays as f32;
        let per_ray_reflected = reflected / rays as f32;
        let normal = if side == 0 { geometry.normal } else { -geometry.normal };
        let (tangent, bitangent) = orthonormal_basis(normal);
        let world = corners.map(|c| geometry.point(c));

        for _ in 0..rays {
            let w = uniform_triangle(Vec2::new(self.rng.gen(), self.rng.gen()));
            let origin = world[0] + (world[1] - world[0]) * w.x + (world[2] - world[0]) * w.y;
            let local = cosine_hemisphere(Vec2::new(self.rng.gen(), self.rng.gen()));
            let direction = (tangent * local.x + bitangent * local.y + normal * local.z).normalize_or_zero();
            if direction == Vec3::ZERO {
                continue;
            }
            self.trace(origin, direction, triangle, per_ray_emitted, per_ray_reflected, 0);
        }
    }

    /// Deliver flux along one ray, following specular paths.
    fn trace(
        &mut self,
        origin: Vec3,
        direction: Vec3,
        from: u32,
        emitted: Color,
        reflected: Color,
        depth: u32,
    ) {
        let ray = CollisionRay::new(origin, direction, Interval::new(self.epsilon, f32::INFINITY));
        let Some(hit) = self.collider.intersect(&ray, &mut SkipTriangle(from)) else {
            return;
        };
        let t = hit.triangle as usize;
        let Some(material) = self.materials.get(t) else {
            return;
        };
        let side_index = if hit.front { 0 } else { 1 };
        let side = material.side(hit.front);
        let rho = material.diffuse_reflectance;
        let transmittance = material.specular_transmittance;
        let mirror = material.specular_reflectance;

        if side.catch_from {
            if let Some(leaf) = self.hierarchy.locate(t, hit.point2d) {
                let energy = &mut self.hierarchy.patches[leaf as usize].energy;
                energy.received_direct += emitted;
                energy.received_indirect += reflected;
                if side.reflect {
                    energy.unshot_reflected[side_index] += rho * (emitted + reflected);
                }
            }
        }

        if depth >= self.propagation.max_specular_depth {
            return;
        }
        if transmittance > 0.0 && side.transmit {
            self.trace(
                hit.point3d,
                direction,
                hit.triangle,
                emitted * transmittance,
                reflected * transmittance,
                depth + 1,
            );
        }
        if mirror > 0.0 && side.reflect {
            let n = hit.plane.normal;
            let mirrored = direction - 2.0 * direction.dot(n) * n;
            self.trace(
                hit.point3d,
                mirrored,
                hit.triangle,
                emitted * mirror,
                reflected * mirror,
                depth + 1,
            );
        }
    }

    /// Fraction of the loaded primary power still waiting to be shot.
    pub fn unshot_fraction(&self) -> f32 {
        if self.loaded_power <= 0.0 {
            return 0.0;
        }
        let unshot: f32 = self
            .hierarchy
            .leaves
            .iter()
            .map(|&l| {
                let e = &self.hierarchy.patches[l as usize].energy;
                e.unshot_power(0) + e.unshot_power(1)
            })
            .sum();
        unshot / self.loaded_power
    }

    fn leaf_channels(&self, leaf: u32) -> Channels {
        let patch = &self.hierarchy.patches[leaf as usize];
        if patch.area <= 0.0 {
            return Channels::default();
        }
        Channels {
            direct: patch.energy.received_direct / patch.area,
            indirect: patch.energy.received_indirect / patch.area,
        }
    }

    fn ivertex_channels(&self, ivertex: u32) -> Channels {
        let Some(iv) = self.hierarchy.ivertices.get(ivertex) else {
            return Channels::default();
        };
        let total: f32 = iv.entries.iter().map(|&(_, w)| w).sum();
        if total <= 0.0 {
            return Channels::default();
        }
        iv.entries
            .iter()
            .fold(Channels::default(), |acc, &(leaf, w)| {
                acc.add(self.leaf_channels(leaf).scale(w / total))
            })
    }

    /// Smoothed channels at barycentric `weights` inside a leaf.
    fn smoothed_channels(&self, leaf: u32, weights: [f32; 3]) -> Channels {
        let ivertices = self.hierarchy.patches[leaf as usize].ivertices;
        (0..3).fold(Channels::default(), |acc, k| {
            acc.add(self.ivertex_channels(ivertices[k]).scale(weights[k]))
        })
    }

    /// Measure of a whole triangle (`vertex == None`) or at one of its
    /// corners.
    ///
    /// Flux of a corner is a third of the triangle's flux. Triangles without
    /// a material measure zero.
    pub fn triangle_measure(
        &self,
        triangle: usize,
        vertex: Option<usize>,
        measure: Measure,
        scaler: Option<&dyn Scaler>,
    ) -> Color {
        debug_assert!(triangle < self.triangles.len(), "triangle {triangle} out of range");
        debug_assert!(vertex.map_or(true, |k| k < 3), "corner {vertex:?} out of range");
        if !self.valid {
            return Color::ZERO;
        }
        let (Some(Some(geometry)), Some(material)) = (self.triangles.get(triangle), self.materials.get(triangle))
        else {
            return Color::ZERO;
        };
        if self.hierarchy.roots.get(triangle).copied().flatten().is_none() {
            return Color::ZERO;
        }

        let (channels, area) = match vertex {
            Some(k) if k < 3 => {
                let channels = if measure.smoothed {
                    self.ivertex_channels(geometry.ivertices[k])
                } else {
                    self.hierarchy
                        .locate(triangle, ROOT_CORNERS[k])
                        .map(|leaf| self.leaf_channels(leaf))
                        .unwrap_or_default()
                };
                (channels, geometry.area / 3.0)
            }
            Some(_) => return Color::ZERO,
            None => {
                let mut sum = Channels::default();
                let mut total_area = 0.0;
                for leaf in self.hierarchy.leaves_of(triangle) {
                    let area = self.hierarchy.patches[leaf as usize].area;
                    let channels = if measure.smoothed {
                        self.smoothed_channels(leaf, [1.0 / 3.0; 3])
                    } else {
                        self.leaf_channels(leaf)
                    };
                    sum = sum.add(channels.scale(area));
                    total_area += area;
                }
                let channels = if total_area > 0.0 {
                    sum.scale(1.0 / total_area)
                } else {
                    Channels::default()
                };
                (channels, geometry.area)
            }
        };

        finish(channels.select(material, measure), area, measure, scaler)
    }

    /// Measures of every leaf patch of `triangle`.
    pub fn subtriangle_measures(
        &self,
        triangle: usize,
        measure: Measure,
        scaler: Option<&dyn Scaler>,
    ) -> Vec<SubtriangleMeasure> {
        debug_assert!(triangle < self.triangles.len(), "triangle {triangle} out of range");
        if !self.valid {
            return Vec::new();
        }
        let Some(material) = self.materials.get(triangle) else {
            return Vec::new();
        };
        self.hierarchy
            .leaves_of(triangle)
            .into_iter()
            .map(|leaf| {
                let patch = &self.hierarchy.patches[leaf as usize];
                let colors = if measure.smoothed {
                    patch.ivertices.map(|iv| {
                        let color = self.ivertex_channels(iv).select(material, measure);
                        finish(color, patch.area, measure, scaler)
                    })
                } else {
                    let color = self.leaf_channels(leaf).select(material, measure);
                    [finish(color, patch.area, measure, scaler); 3]
                };
                SubtriangleMeasure {
                    corners: patch.corners,
                    colors,
                }
            })
            .collect()
    }

    /// Measure at a point of `triangle` given as barycentric weights of its
    /// vertices 1 and 2 (as in `Hit::point2d`).
    pub fn point_measure(
        &self,
        triangle: usize,
        point: Vec2,
        measure: Measure,
        scaler: Option<&dyn Scaler>,
    ) -> Color {
        if !self.valid {
            return Color::ZERO;
        }
        let Some(material) = self.materials.get(triangle) else {
            return Color::ZERO;
        };
        let Some(leaf) = self.hierarchy.locate(triangle, point) else {
            return Color::ZERO;
        };
        let patch = &self.hierarchy.patches[leaf as usize];
        let channels = if measure.smoothed {
            let weights = patch_weights(&patch.corners, point).map(|w| w.clamp(0.0, 1.0));
            let sum: f32 = weights.iter().sum();
            let weights = if sum > 0.0 {
                weights.map(|w| w / sum)
            } else {
                [1.0 / 3.0; 3]
            };
            self.smoothed_channels(leaf, weights)
        } else {
            self.leaf_channels(leaf)
        };
        finish(channels.select(material, measure), patch.area, measure, scaler)
    }
}
