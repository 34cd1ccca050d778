//! Final gather: irradiance at surface points from lights, the current
//! solution and the environment.
//!
//! Work is split into independent slots (texels or vertices). Each slot
//! owns its accumulator, so the rayon loop needs no locking; the collider,
//! the solver and the lights are only read.

use std::sync::atomic::{AtomicBool, Ordering};

use lux_collider::{Collider, CollisionRay, Hit, SkipTriangle, TransmittanceHandler};
use lux_core::{BufferLayout, Color, Environment, Light, MaterialTable, MeshAdapter, Scaler};
use lux_math::sequence::{cosine_hemisphere, radical_inverse, radical_inverse_base2, HilbertSequence};
use lux_math::{orthonormal_basis, Interval, Vec2, Vec3};
use lux_solver::{Measure, StaticSolver};
use rayon::prelude::*;

use crate::filter::Texel;
use crate::subtexel::{rasterize, SubTexel};
use crate::{BakeError, BakeResult, OutputQuantity, UpdateParameters};

/// Read-only state shared by all gather workers.
pub struct GatherContext<'a> {
    pub mesh: &'a dyn MeshAdapter,
    pub collider: &'a Collider,
    pub materials: &'a MaterialTable,
    /// Present when the current solution should be read at hits
    pub solver: Option<&'a StaticSolver>,
    pub lights: &'a [Light],
    pub environment: Option<&'a dyn Environment>,
    pub scaler: Option<&'a dyn Scaler>,
    pub params: UpdateParameters,
    /// Ray offset from surfaces, scene units
    pub epsilon: f32,
    pub aborting: &'a AtomicBool,
    hemisphere: HilbertSequence,
}

/// Outcome of gathering at one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gathered {
    Irradiance(Color),
    /// Too many hemisphere rays hit backfaces or nearby geometry
    Unreliable,
}

impl<'a> GatherContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mesh: &'a dyn MeshAdapter,
        collider: &'a Collider,
        materials: &'a MaterialTable,
        solver: Option<&'a StaticSolver>,
        lights: &'a [Light],
        environment: Option<&'a dyn Environment>,
        scaler: Option<&'a dyn Scaler>,
        params: UpdateParameters,
        aborting: &'a AtomicBool,
    ) -> Self {
        let bounds = mesh.bounds();
        let epsilon = if bounds.is_empty() {
            1e-5
        } else {
            (bounds.diagonal() * 1e-5).max(1e-6)
        };
        Self {
            mesh,
            collider,
            materials,
            solver: if params.apply_current_solution { solver } else { None },
            lights,
            environment: if params.apply_environment { environment } else { None },
            scaler,
            params,
            epsilon,
            aborting,
            hemisphere: HilbertSequence::new(params.quality.max(1) as usize),
        }
    }

    fn is_aborting(&self) -> bool {
        self.aborting.load(Ordering::Relaxed)
    }

    /// Position and shading normal at a barycentric point of `triangle`.
    fn surface(&self, triangle: usize, param: Vec2) -> Option<(Vec3, Vec3)> {
        let [a, b, c] = self.mesh.triangle_body(triangle)?;
        let plane = self.collider.triangle_plane(triangle)?;
        let point = a + (b - a) * param.x + (c - a) * param.y;
        let normal = self
            .mesh
            .triangle_normals(triangle)
            .map(|[n0, n1, n2]| n0 * (1.0 - param.x - param.y) + n1 * param.x + n2 * param.y)
            .and_then(|n| n.try_normalize())
            .filter(|n| n.dot(plane.normal) > 0.0)
            .unwrap_or(plane.normal);
        Some((point, normal))
    }

    /// Irradiance from all lights at `point`, shadow-tested.
    pub fn light_irradiance(&self, point: Vec3, normal: Vec3, skip: u32) -> Color {
        let mut total = Color::ZERO;
        for light in self.lights.iter().filter(|l| l.enabled) {
            let (to_light, distance) = light.direction_from(point);
            let cos = normal.dot(to_light);
            if cos <= 0.0 {
                continue;
            }
            let irradiance = light.irradiance(point, self.scaler) * cos;
            if irradiance == Color::ZERO {
                continue;
            }
            let visibility = if light.casts_shadows {
                self.visibility(point, to_light, distance, skip)
            } else {
                1.0
            };
            total += irradiance * visibility;
        }
        total
    }

    /// Fraction of light passing from `point` along `direction` for
    /// `distance`, through partially transmissive surfaces.
    fn visibility(&self, point: Vec3, direction: Vec3, distance: f32, skip: u32) -> f32 {
        let range = Interval::new(self.epsilon, distance - self.epsilon);
        if range.is_empty() {
            return 1.0;
        }
        let ray = CollisionRay::new(point, direction, range);
        let mut handler = TransmittanceHandler::new(|t| {
            self.materials
                .get(t as usize)
                .map_or(0.0, |m| m.specular_transmittance)
        })
        .skipping(skip);
        self.collider.intersect(&ray, &mut handler);
        handler.visibility
    }

    /// Contribution of one hemisphere ray; `None` marks an unreliable hit.
    fn hemisphere_sample(&self, point: Vec3, direction: Vec3, skip: u32) -> Option<Color> {
        let ray = CollisionRay::new(point, direction, Interval::new(self.epsilon, self.params.locality));
        match self.collider.intersect(&ray, &mut SkipTriangle(skip)) {
            Some(hit) => self.hit_exitance(&hit),
            None => Some(
                self.environment
                    .map_or(Color::ZERO, |env| env.radiance(direction) * std::f32::consts::PI),
            ),
        }
    }

    fn hit_exitance(&self, hit: &Hit) -> Option<Color> {
        if hit.distance < self.params.rug_distance {
            return None;
        }
        let t = hit.triangle as usize;
        let Some(material) = self.materials.get(t) else {
            // Black occluder
            return Some(Color::ZERO);
        };
        if !material.side(hit.front).catch_from {
            // Looking at the inside of a solid
            return None;
        }
        Some(
            self.solver
                .map_or(Color::ZERO, |s| s.point_measure(t, hit.point2d, Measure::EXITANCE.smooth(), None)),
        )
    }

    /// Irradiance at a point of `triangle` using `rays` hemisphere rays.
    ///
    /// `slot` decorrelates the sample pattern between neighbouring slots.
    pub fn gather_point(&self, triangle: usize, param: Vec2, rays: usize, slot: usize) -> Gathered {
        let Some((point, normal)) = self.surface(triangle, param) else {
            return Gathered::Unreliable;
        };
        let skip = triangle as u32;
        let mut irradiance = if self.params.apply_lights {
            self.light_irradiance(point, normal, skip)
        } else {
            Color::ZERO
        };

        if rays > 0 && self.params.quality > 0 {
            let (tangent, bitangent) = orthonormal_basis(normal);
            let offset = Vec2::new(
                radical_inverse_base2(slot as u32),
                radical_inverse(slot as u32, 3),
            );
            let mut sum = Color::ZERO;
            let mut reliable = 0usize;
            for i in 0..rays {
                let local = cosine_hemisphere(self.hemisphere.get(i, offset));
                let direction = (tangent * local.x + bitangent * local.y + normal * local.z).normalize_or_zero();
                if direction == Vec3::ZERO {
                    continue;
                }
                if let Some(color) = self.hemisphere_sample(point, direction, skip) {
                    sum += color;
                    reliable += 1;
                }
            }
            let unreliable = (rays - reliable) as f32 / rays as f32;
            if reliable == 0 || unreliable > self.params.inside_objects_threshold {
                return Gathered::Unreliable;
            }
            irradiance += sum / reliable as f32;
        }
        Gathered::Irradiance(irradiance)
    }

    /// Output value for `quantity` from gathered irradiance.
    fn output(&self, triangle: usize, irradiance: Color) -> Color {
        match self.params.quantity {
            OutputQuantity::Irradiance => irradiance,
            OutputQuantity::Exitance => self.materials.get(triangle).map_or(Color::ZERO, |m| {
                irradiance * m.diffuse_reflectance + m.diffuse_emittance
            }),
        }
    }

    /// Bake texels of `width` x `height` map for `triangles`.
    ///
    /// Returns one accumulator per texel; a fully covered texel ends with
    /// weight 1.
    pub fn gather_texels(
        &self,
        triangles: std::ops::Range<usize>,
        width: u32,
        height: u32,
        wrap: bool,
    ) -> BakeResult<Vec<Texel>> {
        let slots = BufferLayout::Texels { width, height }.slot_count();
        let mut work: Vec<Vec<(u32, SubTexel)>> = Vec::new();
        work.try_reserve_exact(slots)
            .map_err(|_| BakeError::OutOfMemory { what: "texel work lists" })?;
        work.resize_with(slots, Vec::new);

        let mut mapped = 0usize;
        for t in triangles {
            let Some(uv) = self.mesh.triangle_mapping(t) else { continue };
            if self.collider.is_degenerate(t) || self.materials.get(t).is_none() {
                continue;
            }
            mapped += 1;
            for (index, sub) in rasterize(uv, width, height, wrap) {
                let list = &mut work[index];
                list.try_reserve(1)
                    .map_err(|_| BakeError::OutOfMemory { what: "subtexels" })?;
                list.push((t as u32, sub));
            }
        }
        log::debug!("Rasterized {} triangles into {}x{} texels", mapped, width, height);

        let mut texels: Vec<Texel> = Vec::new();
        texels
            .try_reserve_exact(slots)
            .map_err(|_| BakeError::OutOfMemory { what: "texel accumulators" })?;
        texels.resize(slots, Texel::default());

        let texel_area = 1.0 / (width as f32 * height as f32);
        let quality = self.params.quality as f32;
        texels
            .par_iter_mut()
            .zip(work.par_iter())
            .enumerate()
            .for_each(|(index, (texel, subtexels))| {
                if subtexels.is_empty() || self.is_aborting() {
                    return;
                }
                for (k, (t, sub)) in subtexels.iter().enumerate() {
                    let coverage = sub.area / texel_area;
                    let rays = (quality * coverage).ceil() as usize;
                    let slot = index * 7 + k;
                    if let Gathered::Irradiance(e) = self.gather_point(*t as usize, sub.centroid(), rays, slot) {
                        texel.color += self.output(*t as usize, e) * coverage;
                        texel.weight += coverage;
                    }
                }
            });

        if self.is_aborting() {
            return Err(BakeError::Aborted);
        }
        Ok(texels)
    }

    /// Bake per-vertex values for `triangles`; vertex `v` of the mesh goes
    /// to slot `v - vertex_offset`.
    pub fn gather_vertices(
        &self,
        triangles: std::ops::Range<usize>,
        vertex_offset: usize,
        vertex_count: usize,
    ) -> BakeResult<Vec<Texel>> {
        let mut corners: Vec<Vec<(u32, u8)>> = Vec::new();
        corners
            .try_reserve_exact(vertex_count)
            .map_err(|_| BakeError::OutOfMemory { what: "vertex work lists" })?;
        corners.resize_with(vertex_count, Vec::new);

        for t in triangles {
            if self.collider.is_degenerate(t) || self.materials.get(t).is_none() {
                continue;
            }
            let Some(tri) = self.mesh.triangle(t) else { continue };
            for (k, &v) in tri.iter().enumerate() {
                let Some(slot) = (v as usize).checked_sub(vertex_offset) else {
                    continue;
                };
                if let Some(list) = corners.get_mut(slot) {
                    list.push((t as u32, k as u8));
                }
            }
        }

        let mut values: Vec<Texel> = Vec::new();
        values
            .try_reserve_exact(vertex_count)
            .map_err(|_| BakeError::OutOfMemory { what: "vertex accumulators" })?;
        values.resize(vertex_count, Texel::default());

        let rays = self.params.quality as usize;
        let centroid = Vec2::splat(1.0 / 3.0);
        values
            .par_iter_mut()
            .zip(corners.par_iter())
            .enumerate()
            .for_each(|(slot, (value, list))| {
                if list.is_empty() || self.is_aborting() {
                    return;
                }
                let mut sum = Color::ZERO;
                let mut count = 0.0;
                for &(t, k) in list {
                    // Slightly inside the corner so the triangle's own edges
                    // do not shadow it
                    let corner = [Vec2::ZERO, Vec2::X, Vec2::Y][k as usize];
                    let param = corner.lerp(centroid, 1e-3);
                    if let Gathered::Irradiance(e) = self.gather_point(t as usize, param, rays, slot) {
                        sum += self.output(t as usize, e);
                        count += 1.0;
                    }
                }
                if count > 0.0 {
                    value.color = sum;
                    value.weight = count;
                }
            });

        if self.is_aborting() {
            return Err(BakeError::Aborted);
        }
        Ok(values)
    }

    /// Radiance arriving at `point` from `direction`, or `None` when the
    /// ray hits a backface or nearby geometry.
    pub fn radiance(&self, point: Vec3, direction: Vec3) -> Option<Color> {
        let ray = CollisionRay::new(point, direction, Interval::new(self.epsilon, self.params.locality));
        match self.collider.intersect_nearest(&ray) {
            Some(hit) => self.hit_exitance(&hit).map(|m| m / std::f32::consts::PI),
            None => Some(self.environment.map_or(Color::ZERO, |env| env.radiance(direction))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lux_collider::Technique;
    use lux_core::{Material, Mesh, UniformEnvironment};
    use std::sync::Arc;

    fn quad_mesh(z: f32) -> Mesh {
        Mesh::new(
            vec![
                Vec3::new(0.0, 0.0, z),
                Vec3::new(1.0, 0.0, z),
                Vec3::new(1.0, 1.0, z),
                Vec3::new(0.0, 1.0, z),
            ],
            vec![0, 1, 2, 0, 2, 3],
            None,
        )
        .with_uvs(vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y])
    }

    fn setup(mesh: Mesh) -> (Arc<dyn MeshAdapter>, Collider, MaterialTable) {
        let mesh: Arc<dyn MeshAdapter> = Arc::new(mesh);
        let collider = Collider::build(mesh.clone(), Technique::BspFast);
        let materials = MaterialTable::uniform(mesh.num_triangles(), Material::diffuse("grey", Color::splat(0.5)));
        (mesh, collider, materials)
    }

    #[test]
    fn test_uniform_environment_gives_pi_radiance() {
        let (mesh, collider, materials) = setup(quad_mesh(0.0));
        let env = UniformEnvironment(Color::splat(0.2));
        let aborting = AtomicBool::new(false);
        let params = UpdateParameters {
            quality: 64,
            apply_lights: false,
            apply_environment: true,
            apply_current_solution: false,
            ..Default::default()
        };
        let ctx = GatherContext::new(
            mesh.as_ref(),
            &collider,
            &materials,
            None,
            &[],
            Some(&env),
            None,
            params,
            &aborting,
        );
        let Gathered::Irradiance(e) = ctx.gather_point(0, Vec2::splat(0.25), 64, 0) else {
            panic!("unreliable sample on an open quad");
        };
        assert!((e - Color::splat(0.2 * std::f32::consts::PI)).length() < 1e-4);
    }

    #[test]
    fn test_shadowed_light() {
        // Receiver at z = 0, blocker at z = 1, light above
        let mut positions = quad_mesh(0.0).positions;
        positions.extend(quad_mesh(1.0).positions);
        let indices = vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7];
        let (mesh, collider, mut materials) = setup(Mesh::new(positions, indices, None));
        let aborting = AtomicBool::new(false);
        let lights = [Light::directional(-Vec3::Z, Color::ONE)];
        let params = UpdateParameters {
            quality: 0,
            ..Default::default()
        };

        let ctx = GatherContext::new(
            mesh.as_ref(),
            &collider,
            &materials,
            None,
            &lights,
            None,
            None,
            params,
            &aborting,
        );
        assert_eq!(ctx.gather_point(0, Vec2::splat(0.3), 0, 0), Gathered::Irradiance(Color::ZERO));
        // The blocker's top is lit
        let top = ctx.gather_point(2, Vec2::splat(0.3), 0, 0);
        assert_eq!(top, Gathered::Irradiance(Color::ONE));

        // A half-transparent blocker lets half through
        let glass = materials.add(Material::diffuse("glass", Color::ZERO).with_transmittance(0.5));
        materials.assign_range(2..4, glass);
        let ctx = GatherContext::new(
            mesh.as_ref(),
            &collider,
            &materials,
            None,
            &lights,
            None,
            None,
            params,
            &aborting,
        );
        let Gathered::Irradiance(e) = ctx.gather_point(0, Vec2::splat(0.3), 0, 0) else {
            panic!("unreliable");
        };
        assert!((e - Color::splat(0.5)).length() < 1e-5);
    }

    #[test]
    fn test_inside_solid_is_unreliable() {
        // Receiver under a quad whose back faces it and does not catch light
        let mut positions = quad_mesh(0.0).positions;
        positions.extend(quad_mesh(0.1).positions);
        let indices = vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7];
        let (mesh, collider, materials) = setup(Mesh::new(positions, indices, None));
        let aborting = AtomicBool::new(false);
        let params = UpdateParameters {
            quality: 32,
            apply_lights: false,
            inside_objects_threshold: 0.5,
            ..Default::default()
        };
        let ctx = GatherContext::new(
            mesh.as_ref(),
            &collider,
            &materials,
            None,
            &[],
            None,
            None,
            params,
            &aborting,
        );
        // Near the centre almost every ray hits the back of the cover
        assert_eq!(ctx.gather_point(0, Vec2::new(0.1, 0.4), 32, 0), Gathered::Unreliable);
    }

    #[test]
    fn test_gather_texels_weights_and_abort() {
        let (mesh, collider, materials) = setup(quad_mesh(0.0));
        let lights = [Light::directional(-Vec3::Z, Color::ONE)];
        let aborting = AtomicBool::new(false);
        let params = UpdateParameters {
            quality: 4,
            apply_current_solution: false,
            ..Default::default()
        };
        let ctx = GatherContext::new(
            mesh.as_ref(),
            &collider,
            &materials,
            None,
            &lights,
            None,
            None,
            params,
            &aborting,
        );
        let texels = ctx.gather_texels(0..2, 4, 4, false).unwrap();
        for texel in &texels {
            assert!((texel.weight - 1.0).abs() < 1e-4);
            assert!((texel.color - Color::ONE).length() < 1e-3);
        }

        aborting.store(true, Ordering::Relaxed);
        assert_eq!(ctx.gather_texels(0..2, 4, 4, false), Err(BakeError::Aborted));
    }

    #[test]
    fn test_gather_vertices_averages_corners() {
        let (mesh, collider, materials) = setup(quad_mesh(0.0));
        let lights = [Light::directional(-Vec3::Z, Color::splat(2.0))];
        let aborting = AtomicBool::new(false);
        let params = UpdateParameters {
            quality: 0,
            quantity: OutputQuantity::Exitance,
            ..Default::default()
        };
        let ctx = GatherContext::new(
            mesh.as_ref(),
            &collider,
            &materials,
            None,
            &lights,
            None,
            None,
            params,
            &aborting,
        );
        let values = ctx.gather_vertices(0..2, 0, 4).unwrap();
        // Vertex 0 is shared by both triangles
        assert_eq!(values[0].weight, 2.0);
        assert_eq!(values[1].weight, 1.0);
        assert!((values[0].color / values[0].weight - Color::ONE).length() < 1e-5);
    }
}
