//! Built-in demo scene: a closed room with a ceiling lamp, a block and a
//! point light.

use std::sync::Arc;

use lux_baker::StaticObject;
use lux_core::{Color, Light, Material, MaterialTable, Mesh, MeshAdapter};
use lux_math::{Mat4, Vec2, Vec3};

/// Atlas cells are laid out 3 x 2; this much of each cell is left empty
/// around the face so filtering does not bleed between faces.
const CELL_MARGIN: f32 = 0.04;

/// Box faces as corner indices, counter-clockwise seen from outside.
const BOX_FACES: [[u32; 4]; 6] = [
    [0, 2, 3, 1], // -z
    [4, 5, 7, 6], // +z
    [0, 1, 5, 4], // -y
    [2, 6, 7, 3], // +y
    [0, 4, 6, 2], // -x
    [1, 3, 7, 5], // +x
];

/// Axis-aligned box with one atlas cell per face.
///
/// With `inward` the faces point into the box (a room).
pub fn atlas_box(min: Vec3, max: Vec3, inward: bool) -> Mesh {
    let corner = |i: u32| {
        Vec3::new(
            if i & 1 == 0 { min.x } else { max.x },
            if i & 2 == 0 { min.y } else { max.y },
            if i & 4 == 0 { min.z } else { max.z },
        )
    };
    let cell_uvs = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)];

    let mut positions = Vec::with_capacity(24);
    let mut uvs = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (f, face) in BOX_FACES.iter().enumerate() {
        let base = positions.len() as u32;
        let cell = Vec2::new((f % 3) as f32, (f / 3) as f32);
        for (k, &c) in face.iter().enumerate() {
            positions.push(corner(c));
            let local = cell_uvs[k] * (1.0 - 2.0 * CELL_MARGIN) + Vec2::splat(CELL_MARGIN);
            uvs.push((cell + local) / Vec2::new(3.0, 2.0));
        }
        let quad = if inward {
            [base, base + 2, base + 1, base, base + 3, base + 2]
        } else {
            [base, base + 1, base + 2, base, base + 2, base + 3]
        };
        indices.extend(quad);
    }
    Mesh::new(positions, indices, None).with_uvs(uvs)
}

/// Downward-facing square lamp centered at `center`.
pub fn lamp(center: Vec3, half_size: f32) -> Mesh {
    let h = half_size;
    Mesh::new(
        vec![
            center + Vec3::new(-h, 0.0, -h),
            center + Vec3::new(h, 0.0, -h),
            center + Vec3::new(h, 0.0, h),
            center + Vec3::new(-h, 0.0, h),
        ],
        vec![0, 1, 2, 0, 2, 3],
        None,
    )
    .with_uvs(vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y])
}

/// Named static object of the demo scene.
pub struct DemoObject {
    pub name: &'static str,
    pub object: StaticObject,
}

pub fn demo_objects() -> Vec<DemoObject> {
    let room = atlas_box(Vec3::new(-2.0, 0.0, -2.0), Vec3::new(2.0, 3.0, 2.0), true);
    let mut room_materials = MaterialTable::new(room.num_triangles());
    let white = room_materials.add(Material::diffuse("white", Color::splat(0.75)));
    let red = room_materials.add(Material::diffuse("red", Color::new(0.75, 0.15, 0.1)));
    let green = room_materials.add(Material::diffuse("green", Color::new(0.15, 0.7, 0.15)));
    // -x wall red, +x wall green
    room_materials.assign_range(0..8, white);
    room_materials.assign_range(8..10, red);
    room_materials.assign_range(10..12, green);

    let block = atlas_box(Vec3::new(-0.5, 0.0, -0.5), Vec3::new(0.5, 1.2, 0.5), false);
    let block_materials = MaterialTable::uniform(block.num_triangles(), Material::diffuse("block", Color::splat(0.6)));
    let placement = Mat4::from_translation(Vec3::new(0.6, 0.0, 0.3)) * Mat4::from_rotation_y(0.4);

    let lamp_mesh = lamp(Vec3::new(0.0, 2.95, 0.0), 0.4);
    let lamp_materials = MaterialTable::uniform(
        lamp_mesh.num_triangles(),
        Material::emissive("lamp", Color::splat(0.8), Color::splat(12.0)),
    );

    let wrap = |mesh: Mesh| -> Arc<dyn MeshAdapter> { Arc::new(mesh) };
    vec![
        DemoObject {
            name: "room",
            object: StaticObject::new(wrap(room), room_materials),
        },
        DemoObject {
            name: "block",
            object: StaticObject::new(wrap(block), block_materials).with_transform(placement),
        },
        DemoObject {
            name: "lamp",
            object: StaticObject::new(wrap(lamp_mesh), lamp_materials),
        },
    ]
}

pub fn demo_lights() -> Vec<Light> {
    vec![Light::point(Vec3::new(-1.2, 2.5, 1.0), Color::splat(3.0))]
}

#[cfg(test)]
mod tests {
    use super::*;
    use lux_math::Plane;

    #[test]
    fn test_room_faces_point_inward() {
        let room = atlas_box(Vec3::splat(-1.0), Vec3::splat(1.0), true);
        for t in 0..room.num_triangles() {
            let [a, b, c] = room.triangle_body(t).unwrap();
            let plane = Plane::from_triangle(a, b, c).unwrap();
            let centroid = (a + b + c) / 3.0;
            assert!(plane.normal.dot(-centroid) > 0.0, "triangle {t} faces out");
        }
    }

    #[test]
    fn test_atlas_cells_do_not_overlap() {
        let room = atlas_box(Vec3::ZERO, Vec3::ONE, false);
        let uvs = room.uvs.as_ref().unwrap();
        for (i, uv) in uvs.iter().enumerate() {
            let cell = (i / 4) as f32;
            let cx = (cell % 3.0) / 3.0;
            assert!(uv.x > cx && uv.x < cx + 1.0 / 3.0);
            assert!(uv.y > 0.0 && uv.y < 1.0);
        }
    }

    #[test]
    fn test_lamp_faces_down() {
        let lamp = lamp(Vec3::Y, 0.5);
        let [a, b, c] = lamp.triangle_body(0).unwrap();
        let plane = Plane::from_triangle(a, b, c).unwrap();
        assert!(plane.normal.y < -0.99);
    }
}
