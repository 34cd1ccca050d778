//! Surface materials as seen by the lighting solver.
//!
//! Only the diffuse/specular terms that move energy around matter here;
//! textures are resolved by the host before import.

use lux_math::Vec3;

/// Linear RGB color. Physical units (W/m^2) unless stated otherwise.
pub type Color = Vec3;

/// Per-side behaviour of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideBits {
    /// Light arriving from this side is received.
    pub catch_from: bool,
    /// Emittance leaves through this side.
    pub emit_to: bool,
    /// Received light is diffusely reflected back to this side.
    pub reflect: bool,
    /// Light may pass through to the other side.
    pub transmit: bool,
}

impl SideBits {
    /// An ordinary visible side.
    pub const SOLID: SideBits = SideBits {
        catch_from: true,
        emit_to: true,
        reflect: true,
        transmit: true,
    };

    /// A side that neither receives nor emits.
    pub const INERT: SideBits = SideBits {
        catch_from: false,
        emit_to: false,
        reflect: false,
        transmit: false,
    };
}

/// Radiometric surface description of one triangle.
#[derive(Clone, Debug)]
pub struct Material {
    /// Material name (for diagnostics)
    pub name: String,

    /// Fraction of incident light reflected diffusely, per channel
    pub diffuse_reflectance: Color,

    /// Exitance emitted by the surface, physical units
    pub diffuse_emittance: Color,

    /// Fraction of incident light mirrored
    pub specular_reflectance: f32,

    /// Fraction of incident light passed straight through
    pub specular_transmittance: f32,

    /// Behaviour of the front (index 0) and back (index 1) side
    pub sides: [SideBits; 2],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            diffuse_reflectance: Color::splat(0.5),
            diffuse_emittance: Color::ZERO,
            specular_reflectance: 0.0,
            specular_transmittance: 0.0,
            sides: [SideBits::SOLID, SideBits::INERT],
        }
    }
}

impl Material {
    /// One-sided diffuse material.
    pub fn diffuse(name: impl Into<String>, reflectance: Color) -> Self {
        Self {
            name: name.into(),
            diffuse_reflectance: reflectance,
            ..Default::default()
        }
    }

    /// One-sided emitter that also reflects.
    pub fn emissive(name: impl Into<String>, reflectance: Color, emittance: Color) -> Self {
        Self {
            name: name.into(),
            diffuse_reflectance: reflectance,
            diffuse_emittance: emittance,
            ..Default::default()
        }
    }

    /// Make both sides behave like the front side.
    pub fn two_sided(mut self) -> Self {
        self.sides = [SideBits::SOLID, SideBits::SOLID];
        self
    }

    pub fn with_transmittance(mut self, transmittance: f32) -> Self {
        self.specular_transmittance = transmittance;
        self
    }

    pub fn with_specular_reflectance(mut self, reflectance: f32) -> Self {
        self.specular_reflectance = reflectance;
        self
    }

    /// Side bits for the side a ray arrives on.
    #[inline]
    pub fn side(&self, front: bool) -> SideBits {
        self.sides[if front { 0 } else { 1 }]
    }

    /// Check if this material is emissive.
    pub fn is_emissive(&self) -> bool {
        self.diffuse_emittance.max_element() > 0.0
    }

    /// True if light can pass through (partially transparent occluder).
    pub fn is_transmissive(&self) -> bool {
        self.specular_transmittance > 0.0
    }

    /// Clamp terms into a physically plausible range.
    ///
    /// Reflectance plus transmittance may not exceed one, otherwise
    /// propagation would amplify energy. Returns true if anything changed.
    pub fn sanitize(&mut self) -> bool {
        let before = (
            self.diffuse_reflectance,
            self.diffuse_emittance,
            self.specular_reflectance,
            self.specular_transmittance,
        );
        self.diffuse_emittance = self.diffuse_emittance.max(Color::ZERO);
        self.specular_reflectance = self.specular_reflectance.clamp(0.0, 1.0);
        self.specular_transmittance = self
            .specular_transmittance
            .clamp(0.0, 1.0 - self.specular_reflectance);
        let budget = 1.0 - self.specular_reflectance - self.specular_transmittance;
        self.diffuse_reflectance = self
            .diffuse_reflectance
            .clamp(Color::ZERO, Color::splat(budget.max(0.0)));
        let changed = before
            != (
                self.diffuse_reflectance,
                self.diffuse_emittance,
                self.specular_reflectance,
                self.specular_transmittance,
            );
        if changed {
            log::warn!("Material '{}' clamped to conserve energy", self.name);
        }
        changed
    }
}

/// Per-triangle material assignment.
///
/// Triangles without an assignment have no material: they block rays but
/// neither receive nor reflect energy.
#[derive(Clone, Debug, Default)]
pub struct MaterialTable {
    materials: Vec<Material>,
    assignment: Vec<Option<u32>>,
}

impl MaterialTable {
    /// Empty table for `triangle_count` unassigned triangles.
    pub fn new(triangle_count: usize) -> Self {
        Self {
            materials: Vec::new(),
            assignment: vec![None; triangle_count],
        }
    }

    /// Every triangle uses the same material.
    pub fn uniform(triangle_count: usize, material: Material) -> Self {
        let mut table = Self::new(triangle_count);
        let id = table.add(material);
        table.assign_range(0..triangle_count, id);
        table
    }

    /// Register a material and return its id.
    pub fn add(&mut self, mut material: Material) -> u32 {
        material.sanitize();
        self.materials.push(material);
        (self.materials.len() - 1) as u32
    }

    /// Assign material `id` to triangle `triangle`.
    pub fn assign(&mut self, triangle: usize, id: u32) {
        debug_assert!((id as usize) < self.materials.len(), "unknown material {id}");
        if let Some(slot) = self.assignment.get_mut(triangle) {
            *slot = Some(id);
        }
    }

    pub fn assign_range(&mut self, triangles: std::ops::Range<usize>, id: u32) {
        for t in triangles {
            self.assign(t, id);
        }
    }

    /// Append the assignments of another table (for merged meshes).
    pub fn append(&mut self, other: &MaterialTable) {
        let base = self.materials.len() as u32;
        self.materials.extend(other.materials.iter().cloned());
        self.assignment
            .extend(other.assignment.iter().map(|a| a.map(|id| id + base)));
    }

    /// Material of triangle `triangle`, if any.
    pub fn get(&self, triangle: usize) -> Option<&Material> {
        let id = (*self.assignment.get(triangle)?)?;
        self.materials.get(id as usize)
    }

    /// Mutable access to a registered material (for material edits).
    pub fn material_mut(&mut self, id: u32) -> Option<&mut Material> {
        self.materials.get_mut(id as usize)
    }

    pub fn triangle_count(&self) -> usize {
        self.assignment.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_sides() {
        let one = Material::diffuse("wall", Color::splat(0.5));
        assert!(one.side(true).catch_from);
        assert!(!one.side(false).catch_from);

        let two = one.clone().two_sided();
        assert!(two.side(false).catch_from);
    }

    #[test]
    fn test_sanitize_clamps_energy() {
        let mut m = Material::diffuse("hot", Color::new(1.5, 0.5, -0.2)).with_transmittance(0.5);
        assert!(m.sanitize());
        assert_eq!(m.specular_transmittance, 0.5);
        assert!((m.diffuse_reflectance - Color::new(0.5, 0.5, 0.0)).length() < 1e-6);

        let mut ok = Material::diffuse("ok", Color::splat(0.3));
        assert!(!ok.sanitize());
    }

    #[test]
    fn test_table_assignment() {
        let mut table = MaterialTable::new(3);
        let red = table.add(Material::diffuse("red", Color::X));
        table.assign(0, red);
        table.assign(7, red); // out of range, ignored

        assert_eq!(table.get(0).unwrap().name, "red");
        assert!(table.get(1).is_none());
        assert!(table.get(7).is_none());
    }

    #[test]
    fn test_table_append() {
        let mut a = MaterialTable::uniform(2, Material::diffuse("a", Color::X));
        let b = MaterialTable::uniform(1, Material::emissive("b", Color::ZERO, Color::ONE));
        a.append(&b);
        assert_eq!(a.triangle_count(), 3);
        assert_eq!(a.get(2).unwrap().name, "b");
        assert!(a.get(2).unwrap().is_emissive());
        assert!(!a.get(0).unwrap().is_emissive());
    }
}
