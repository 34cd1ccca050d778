//! Dynamic solver: the host-facing entry point.
//!
//! Holds static objects, lights and the environment, tracks what changed
//! through dirty flags, and rebuilds the collider and the static solver
//! rather than patching them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use lux_collider::{Collider, Technique};
use lux_core::environment::latlong_direction;
use lux_core::{
    BufferLayout, Color, Environment, Light, MaterialTable, MeshAdapter, MultiMeshWrapper, OutputBuffer, Scaler,
    TransformWrapper,
};
use lux_math::{Mat4, Vec2, Vec3};
use lux_solver::{Improvement, PropagationParameters, SmoothingParameters, StaticSolver};
use rayon::prelude::*;

use crate::filter::{finish_lightmap, finish_vertices};
use crate::gather::GatherContext;
use crate::interpolator::InterpolatorCache;
use crate::{BakeError, BakeResult, FilteringParameters, UpdateParameters};

/// Static object as registered by the host.
#[derive(Clone)]
pub struct StaticObject {
    pub mesh: Arc<dyn MeshAdapter>,
    /// One entry per triangle of `mesh`
    pub materials: MaterialTable,
    pub transform: Mat4,
}

impl StaticObject {
    pub fn new(mesh: Arc<dyn MeshAdapter>, materials: MaterialTable) -> Self {
        Self {
            mesh,
            materials,
            transform: Mat4::IDENTITY,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }
}

/// Everything built from the static objects.
struct Scene {
    mesh: Arc<MultiMeshWrapper>,
    collider: Arc<Collider>,
    materials: Arc<MaterialTable>,
    solver: StaticSolver,
}

pub struct DynamicSolver {
    objects: Vec<StaticObject>,
    smoothing: SmoothingParameters,
    propagation: PropagationParameters,
    technique: Technique,
    lights: Vec<Light>,
    environment: Option<Arc<dyn Environment>>,
    scaler: Option<Arc<dyn Scaler>>,
    scene: Option<Scene>,
    geometry_dirty: bool,
    lights_dirty: bool,
    valid: bool,
    aborting: Arc<AtomicBool>,
    interpolators: InterpolatorCache,
}

impl Default for DynamicSolver {
    fn default() -> Self {
        Self::new(PropagationParameters::default())
    }
}

impl DynamicSolver {
    pub fn new(propagation: PropagationParameters) -> Self {
        Self {
            objects: Vec::new(),
            smoothing: SmoothingParameters::default(),
            propagation,
            technique: Technique::default(),
            lights: Vec::new(),
            environment: None,
            scaler: None,
            scene: None,
            geometry_dirty: false,
            lights_dirty: false,
            valid: true,
            aborting: Arc::new(AtomicBool::new(false)),
            interpolators: InterpolatorCache::new(),
        }
    }

    /// Replace all static objects. Takes effect at the next `calculate` or
    /// update.
    pub fn set_static_objects(
        &mut self,
        objects: Vec<StaticObject>,
        smoothing: SmoothingParameters,
        technique: Technique,
    ) {
        if !self.valid {
            return;
        }
        for (i, object) in objects.iter().enumerate() {
            if object.materials.triangle_count() != object.mesh.num_triangles() {
                log::warn!(
                    "Object {}: {} material slots for {} triangles",
                    i,
                    object.materials.triangle_count(),
                    object.mesh.num_triangles()
                );
            }
        }
        self.objects = objects;
        self.smoothing = smoothing;
        self.technique = technique;
        self.geometry_dirty = true;
    }

    pub fn static_objects(&self) -> &[StaticObject] {
        &self.objects
    }

    /// Mutable access to an object's materials; call
    /// `report_material_change` afterwards.
    pub fn object_materials_mut(&mut self, object: usize) -> Option<&mut MaterialTable> {
        self.objects.get_mut(object).map(|o| &mut o.materials)
    }

    pub fn set_lights(&mut self, lights: Vec<Light>) {
        if !self.valid {
            return;
        }
        self.lights = lights;
        self.lights_dirty = true;
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn set_environment(&mut self, environment: Option<Arc<dyn Environment>>) {
        if self.valid {
            self.environment = environment;
        }
    }

    /// Scaler for lights given in custom units.
    pub fn set_scaler(&mut self, scaler: Option<Arc<dyn Scaler>>) {
        if self.valid {
            self.scaler = scaler;
            self.lights_dirty = true;
        }
    }

    pub fn report_material_change(&mut self) {
        self.geometry_dirty = true;
    }

    pub fn report_geometry_change(&mut self) {
        self.geometry_dirty = true;
    }

    pub fn report_light_change(&mut self) {
        self.lights_dirty = true;
    }

    /// Request the running update to stop. Polled between texels.
    pub fn abort(&self) {
        self.aborting.store(true, Ordering::Relaxed);
    }

    /// Flag shared with other threads that may call `store(true)` to abort.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.aborting.clone()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Validity gate. While closed every operation returns a `Finished`,
    /// zero or empty result and changes nothing.
    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
        if let Some(scene) = &mut self.scene {
            scene.solver.set_valid(valid);
        }
    }

    pub fn solver(&self) -> Option<&StaticSolver> {
        self.scene.as_ref().map(|s| &s.solver)
    }

    /// Rebuild collider and solver if the objects changed.
    fn ensure_scene(&mut self) {
        if !self.geometry_dirty && self.scene.is_some() {
            return;
        }
        self.geometry_dirty = false;
        self.lights_dirty = true;
        if self.objects.is_empty() {
            self.scene = None;
            return;
        }

        let start = Instant::now();
        let meshes: Vec<Arc<dyn MeshAdapter>> = self
            .objects
            .iter()
            .map(|o| {
                if o.transform == Mat4::IDENTITY {
                    o.mesh.clone()
                } else {
                    Arc::new(TransformWrapper::new(o.mesh.clone(), o.transform)) as Arc<dyn MeshAdapter>
                }
            })
            .collect();
        let mesh = Arc::new(MultiMeshWrapper::new(meshes));

        let mut materials = MaterialTable::new(0);
        for object in &self.objects {
            let mut table = object.materials.clone();
            let triangles = object.mesh.num_triangles();
            if table.triangle_count() != triangles {
                table = resized(&table, triangles);
            }
            materials.append(&table);
        }
        let materials = Arc::new(materials);

        let collider = Arc::new(Collider::build(mesh.clone(), self.technique));
        let mut solver = StaticSolver::new(collider.clone(), materials.clone(), self.smoothing, self.propagation);
        solver.set_valid(self.valid);
        log::info!(
            "Built scene of {} objects, {} triangles in {:.2?}",
            self.objects.len(),
            mesh.num_triangles(),
            start.elapsed()
        );

        self.scene = Some(Scene {
            mesh,
            collider,
            materials,
            solver,
        });
    }

    /// Recompute the direct illumination lights inject into the solver.
    fn apply_lights(&mut self) {
        let Some(scene) = &mut self.scene else { return };
        let start = Instant::now();
        let aborting = AtomicBool::new(false);
        let params = UpdateParameters {
            quality: 0,
            apply_lights: true,
            apply_environment: false,
            apply_current_solution: false,
            ..Default::default()
        };
        let mesh: &dyn MeshAdapter = scene.mesh.as_ref();
        let ctx = GatherContext::new(
            mesh,
            &scene.collider,
            &scene.materials,
            None,
            &self.lights,
            None,
            self.scaler.as_deref(),
            params,
            &aborting,
        );

        let corners = [Vec2::ZERO, Vec2::X, Vec2::Y];
        let centroid = Vec2::splat(1.0 / 3.0);
        let direct: Vec<[Color; 3]> = (0..mesh.num_triangles())
            .into_par_iter()
            .map(|t| {
                let (Some([a, b, c]), Some(plane)) = (mesh.triangle_body(t), scene.collider.triangle_plane(t)) else {
                    return [Color::ZERO; 3];
                };
                corners.map(|corner| {
                    let param = corner.lerp(centroid, 1e-3);
                    let point = a + (b - a) * param.x + (c - a) * param.y;
                    ctx.light_irradiance(point, plane.normal, t as u32)
                })
            })
            .collect();

        for (t, irradiance) in direct.into_iter().enumerate() {
            scene.solver.set_direct_illumination_corners(t, irradiance);
        }
        log::debug!("Applied {} lights in {:.2?}", self.lights.len(), start.elapsed());
    }

    /// Bring the solution up to date and improve it until `should_stop`.
    pub fn calculate(&mut self, should_stop: impl FnMut() -> bool) -> Improvement {
        if !self.valid {
            return Improvement::Finished;
        }
        let rebuilt = self.geometry_dirty || self.scene.is_none();
        self.ensure_scene();
        if self.lights_dirty {
            self.apply_lights();
            self.lights_dirty = false;
            if let Some(scene) = &mut self.scene {
                scene.solver.illumination_reset(rebuilt, true);
            }
        }
        match &mut self.scene {
            Some(scene) => scene.solver.illumination_improve(should_stop),
            None => Improvement::Finished,
        }
    }

    /// Bake lightmaps or vertex buffers of object `object` into `targets`.
    ///
    /// Texel targets need a lightmap mapping; vertex targets need one slot
    /// per object vertex. Returns the number of updated targets. Every
    /// layout is checked before any target is written. Each target is
    /// written only after its own bake completes, so an abort can leave the
    /// earlier targets updated.
    pub fn update_lightmap(
        &mut self,
        object: usize,
        targets: &mut [&mut dyn OutputBuffer],
        params: &UpdateParameters,
        filtering: &FilteringParameters,
    ) -> BakeResult<usize> {
        if !self.valid {
            return Ok(0);
        }
        self.aborting.store(false, Ordering::Relaxed);
        if object >= self.objects.len() {
            return Err(BakeError::InvalidObject {
                index: object,
                count: self.objects.len(),
            });
        }
        self.ensure_scene();
        let Some(scene) = &self.scene else {
            return Ok(0);
        };

        let (Some(first_triangle), Some(first_vertex)) =
            (scene.mesh.triangle_offset(object), scene.mesh.vertex_offset(object))
        else {
            return Err(BakeError::InvalidObject {
                index: object,
                count: self.objects.len(),
            });
        };
        let triangles = first_triangle..first_triangle + self.objects[object].mesh.num_triangles();
        let vertex_count = self.objects[object].mesh.num_vertices();

        let start = Instant::now();
        let ctx = GatherContext::new(
            scene.mesh.as_ref(),
            &scene.collider,
            &scene.materials,
            Some(&scene.solver),
            &self.lights,
            self.environment.as_deref(),
            self.scaler.as_deref(),
            *params,
            &self.aborting,
        );

        for target in targets.iter() {
            match target.layout() {
                BufferLayout::Texels { .. } => {
                    if !triangles.clone().any(|t| scene.mesh.triangle_mapping(t).is_some()) {
                        return Err(BakeError::MissingMapping { object });
                    }
                }
                BufferLayout::Vertices(n) if n != vertex_count => {
                    return Err(BakeError::VertexCountMismatch {
                        object,
                        expected: vertex_count,
                        got: n,
                    });
                }
                BufferLayout::Vertices(_) => {}
            }
        }

        let mut updated = 0;
        for target in targets.iter_mut() {
            match target.layout() {
                BufferLayout::Texels { width, height } => {
                    let texels = ctx.gather_texels(triangles.clone(), width, height, filtering.wrap)?;
                    finish_lightmap(texels, width, height, filtering, &mut **target);
                }
                BufferLayout::Vertices(_) => {
                    let values = ctx.gather_vertices(triangles.clone(), first_vertex, vertex_count)?;
                    finish_vertices(values, filtering, &mut **target);
                }
            }
            updated += 1;
        }

        log::info!(
            "Updated {} buffers of object {} in {:.2?}",
            updated,
            object,
            start.elapsed()
        );
        Ok(updated)
    }

    /// Capture the radiance around `position` into a lat-long `target`.
    pub fn update_environment_map(
        &mut self,
        position: Vec3,
        target: &mut dyn OutputBuffer,
        params: &UpdateParameters,
    ) -> BakeResult<usize> {
        if !self.valid {
            return Ok(0);
        }
        let BufferLayout::Texels { width, height } = target.layout() else {
            return Err(BakeError::UnsupportedTarget);
        };
        self.aborting.store(false, Ordering::Relaxed);
        self.ensure_scene();

        // Gather grid: about `quality` directions, twice as wide as high
        let rows = ((params.quality.max(8) as f32 / 2.0).sqrt().ceil() as u32).max(2);
        let input = (rows * 2, rows);
        let directions: Vec<Vec3> = (0..input.1)
            .flat_map(|y| {
                (0..input.0).map(move |x| {
                    latlong_direction(Vec2::new(
                        (x as f32 + 0.5) / input.0 as f32,
                        (y as f32 + 0.5) / input.1 as f32,
                    ))
                })
            })
            .collect();

        let environment = if params.apply_environment {
            self.environment.as_deref()
        } else {
            None
        };
        let radiance: Vec<Color> = match &self.scene {
            Some(scene) => {
                let ctx = GatherContext::new(
                    scene.mesh.as_ref(),
                    &scene.collider,
                    &scene.materials,
                    Some(&scene.solver),
                    &self.lights,
                    self.environment.as_deref(),
                    self.scaler.as_deref(),
                    *params,
                    &self.aborting,
                );
                directions
                    .par_iter()
                    .map(|&d| ctx.radiance(position, d).unwrap_or(Color::ZERO))
                    .collect()
            }
            None => directions
                .iter()
                .map(|&d| environment.map_or(Color::ZERO, |env| env.radiance(d)))
                .collect(),
        };
        if self.aborting.load(Ordering::Relaxed) {
            return Err(BakeError::Aborted);
        }

        // Two input texels of blur
        let radius = 2.0 * std::f32::consts::PI / input.1 as f32;
        let interpolator = self.interpolators.get(input, (width, height), radius);
        for (index, color) in interpolator.interpolate(&radiance).into_iter().enumerate() {
            target.render_texel(index, color, 1.0);
        }
        Ok(1)
    }
}

/// Copy of `table` covering exactly `triangles` triangles.
fn resized(table: &MaterialTable, triangles: usize) -> MaterialTable {
    let mut out = MaterialTable::new(triangles);
    for t in 0..triangles {
        if let Some(material) = table.get(t) {
            let id = out.add(material.clone());
            out.assign(t, id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OutputQuantity;
    use lux_core::{LightmapBuffer, Material, Mesh, UniformEnvironment, VertexBuffer};

    fn unit_quad() -> Arc<dyn MeshAdapter> {
        Arc::new(
            Mesh::new(
                vec![
                    Vec3::new(0.0, 0.0, 0.0),
                    Vec3::new(1.0, 0.0, 0.0),
                    Vec3::new(1.0, 1.0, 0.0),
                    Vec3::new(0.0, 1.0, 0.0),
                ],
                vec![0, 1, 2, 0, 2, 3],
                None,
            )
            .with_uvs(vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y]),
        )
    }

    fn flat_lit_quad() -> DynamicSolver {
        let mut solver = DynamicSolver::default();
        let mesh = unit_quad();
        let materials = MaterialTable::uniform(2, Material::diffuse("grey", Color::splat(0.5)));
        solver.set_static_objects(
            vec![StaticObject::new(mesh, materials)],
            SmoothingParameters::default(),
            Technique::BspFast,
        );
        solver.set_lights(vec![Light::directional(-Vec3::Z, Color::ONE)]);
        solver
    }

    #[test]
    fn test_flat_lighting_lightmap() {
        let mut solver = flat_lit_quad();
        let params = UpdateParameters {
            quality: 16,
            apply_current_solution: false,
            quantity: OutputQuantity::Exitance,
            ..Default::default()
        };
        let mut lightmap = LightmapBuffer::new(8, 8).unwrap();
        let updated = solver
            .update_lightmap(0, &mut [&mut lightmap], &params, &FilteringParameters::default())
            .unwrap();
        assert_eq!(updated, 1);

        for y in 0..8 {
            for x in 0..8 {
                let color = lightmap.get(x, y);
                assert!((color - Color::splat(0.5)).abs().max_element() < 1e-3, "texel {x},{y}: {color}");
                assert!((lightmap.weight(x, y) - 1.0).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_vertex_target_and_errors() {
        let mut solver = flat_lit_quad();
        let params = UpdateParameters {
            quality: 4,
            ..Default::default()
        };
        let filtering = FilteringParameters::default();

        let mut vertices = VertexBuffer::new(4).unwrap();
        let updated = solver.update_lightmap(0, &mut [&mut vertices], &params, &filtering).unwrap();
        assert_eq!(updated, 1);
        for v in 0..4 {
            let color = vertices.get(v).unwrap();
            assert!((color - Color::ONE).abs().max_element() < 1e-3, "vertex {v}: {color}");
        }

        let mut wrong = VertexBuffer::new(3).unwrap();
        assert_eq!(
            solver.update_lightmap(0, &mut [&mut wrong], &params, &filtering),
            Err(BakeError::VertexCountMismatch {
                object: 0,
                expected: 4,
                got: 3
            })
        );

        // A bad target later in the list stops the bake before anything is written
        let mut lightmap = LightmapBuffer::new(2, 2).unwrap();
        {
            let mut targets: [&mut dyn OutputBuffer; 2] = [&mut lightmap, &mut wrong];
            assert!(matches!(
                solver.update_lightmap(0, &mut targets, &params, &filtering),
                Err(BakeError::VertexCountMismatch { .. })
            ));
        }
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            assert_eq!(lightmap.weight(x, y), 0.0);
            assert_eq!(lightmap.get(x, y), Color::ZERO);
        }

        assert!(matches!(
            solver.update_lightmap(3, &mut [&mut lightmap], &params, &filtering),
            Err(BakeError::InvalidObject { index: 3, .. })
        ));
    }

    #[test]
    fn test_missing_mapping() {
        let mut solver = DynamicSolver::default();
        let mesh: Arc<dyn MeshAdapter> = Arc::new(Mesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![0, 1, 2],
            None,
        ));
        let materials = MaterialTable::uniform(1, Material::default());
        solver.set_static_objects(
            vec![StaticObject::new(mesh, materials)],
            SmoothingParameters::default(),
            Technique::Linear,
        );
        let mut lightmap = LightmapBuffer::new(4, 4).unwrap();
        assert_eq!(
            solver.update_lightmap(
                0,
                &mut [&mut lightmap],
                &UpdateParameters::default(),
                &FilteringParameters::default()
            ),
            Err(BakeError::MissingMapping { object: 0 })
        );
    }

    /// Diffuse unit quad at z = 0 facing up, under an emissive quad at
    /// z = 0.5 facing down.
    fn lit_by_panel() -> DynamicSolver {
        let panel: Arc<dyn MeshAdapter> = Arc::new(
            Mesh::new(
                vec![
                    Vec3::new(0.0, 0.0, 0.5),
                    Vec3::new(1.0, 0.0, 0.5),
                    Vec3::new(1.0, 1.0, 0.5),
                    Vec3::new(0.0, 1.0, 0.5),
                ],
                vec![0, 2, 1, 0, 3, 2],
                None,
            )
            .with_uvs(vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y]),
        );
        let mut solver = DynamicSolver::default();
        solver.set_static_objects(
            vec![
                StaticObject::new(
                    unit_quad(),
                    MaterialTable::uniform(2, Material::diffuse("floor", Color::splat(0.5))),
                ),
                StaticObject::new(
                    panel,
                    MaterialTable::uniform(2, Material::emissive("panel", Color::ZERO, Color::ONE)),
                ),
            ],
            SmoothingParameters::default(),
            Technique::BspFast,
        );
        solver
    }

    #[test]
    fn test_bake_reads_solved_exitance() {
        let mut solver = lit_by_panel();
        assert_eq!(solver.calculate(|| false), Improvement::Finished);
        let static_solver = solver.solver().unwrap();
        let solved = (0..2)
            .map(|t| static_solver.triangle_measure(t, None, lux_solver::Measure::IRRADIANCE, None))
            .sum::<Color>()
            / 2.0;
        assert!(solved.x > 0.2, "solved irradiance {solved}");

        let params = UpdateParameters {
            quality: 400,
            apply_lights: false,
            apply_current_solution: true,
            ..Default::default()
        };
        let mut lightmap = LightmapBuffer::new(4, 4).unwrap();
        solver
            .update_lightmap(0, &mut [&mut lightmap], &params, &FilteringParameters::default())
            .unwrap();
        let mut baked = Color::ZERO;
        for y in 0..4 {
            for x in 0..4 {
                assert!((lightmap.weight(x, y) - 1.0).abs() < 1e-3);
                baked += lightmap.get(x, y);
            }
        }
        baked /= 16.0;
        assert!(
            (baked - solved).abs().max_element() < 0.25 * solved.x,
            "baked {baked} vs solved {solved}"
        );

        // Without the solution nothing lights the floor
        let params = UpdateParameters {
            apply_current_solution: false,
            ..params
        };
        solver
            .update_lightmap(0, &mut [&mut lightmap], &params, &FilteringParameters::default())
            .unwrap();
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(lightmap.get(x, y), Color::ZERO);
            }
        }
    }

    #[test]
    fn test_calculate_injects_lights() {
        let mut solver = flat_lit_quad();
        let result = solver.calculate(|| false);
        assert_eq!(result, Improvement::Finished);
        let static_solver = solver.solver().unwrap();
        let e = static_solver.triangle_measure(0, None, lux_solver::Measure::IRRADIANCE, None);
        assert!((e - Color::ONE).length() < 1e-4);

        // Light change only resets energy
        solver.set_lights(vec![Light::directional(-Vec3::Z, Color::splat(2.0))]);
        solver.calculate(|| false);
        let e = solver
            .solver()
            .unwrap()
            .triangle_measure(1, None, lux_solver::Measure::IRRADIANCE, None);
        assert!((e - Color::splat(2.0)).length() < 1e-4);
    }

    #[test]
    fn test_validity_gate() {
        let mut solver = flat_lit_quad();
        solver.set_valid(false);
        assert_eq!(solver.calculate(|| false), Improvement::Finished);
        let mut lightmap = LightmapBuffer::new(4, 4).unwrap();
        let updated = solver
            .update_lightmap(
                0,
                &mut [&mut lightmap],
                &UpdateParameters::default(),
                &FilteringParameters::default(),
            )
            .unwrap();
        assert_eq!(updated, 0);
        assert_eq!(lightmap.get(1, 1), Color::ZERO);
        assert!(solver.solver().is_none());
    }

    #[test]
    fn test_environment_capture() {
        let mut solver = DynamicSolver::default();
        solver.set_environment(Some(Arc::new(UniformEnvironment(Color::splat(0.3)))));
        let params = UpdateParameters {
            quality: 32,
            apply_environment: true,
            ..Default::default()
        };
        let mut map = LightmapBuffer::new(8, 4).unwrap();
        assert_eq!(solver.update_environment_map(Vec3::ZERO, &mut map, &params), Ok(1));
        for y in 0..4 {
            for x in 0..8 {
                assert!((map.get(x, y) - Color::splat(0.3)).length() < 1e-4);
            }
        }

        let mut vertices = VertexBuffer::new(3).unwrap();
        assert_eq!(
            solver.update_environment_map(Vec3::ZERO, &mut vertices, &params),
            Err(BakeError::UnsupportedTarget)
        );
    }
}
