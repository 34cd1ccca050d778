use crate::Vec3;

/// Which side of a plane something lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Front,
    Back,
    Coplanar,
    Spanning,
}

/// Oriented plane `normal . p + offset = 0` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub offset: f32,
}

impl Plane {
    /// Plane through `point` with the given (not necessarily unit) normal.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize();
        Self {
            normal,
            offset: -normal.dot(point),
        }
    }

    /// Plane through a counter-clockwise triangle.
    ///
    /// Returns `None` for degenerate (zero-area or non-finite) triangles.
    pub fn from_triangle(a: Vec3, b: Vec3, c: Vec3) -> Option<Self> {
        let cross = (b - a).cross(c - a);
        let len = cross.length();
        if !(len.is_finite() && len > f32::MIN_POSITIVE) {
            return None;
        }
        let normal = cross / len;
        Some(Self {
            normal,
            offset: -normal.dot(a),
        })
    }

    /// Signed distance of `p` from the plane (positive in front).
    #[inline]
    pub fn distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.offset
    }

    /// Classify a point with tolerance `epsilon`.
    pub fn classify_point(&self, p: Vec3, epsilon: f32) -> Side {
        let d = self.distance(p);
        if d > epsilon {
            Side::Front
        } else if d < -epsilon {
            Side::Back
        } else {
            Side::Coplanar
        }
    }

    /// Classify a triangle with tolerance `epsilon`.
    pub fn classify_triangle(&self, vertices: &[Vec3; 3], epsilon: f32) -> Side {
        let mut front = false;
        let mut back = false;
        for v in vertices {
            match self.classify_point(*v, epsilon) {
                Side::Front => front = true,
                Side::Back => back = true,
                _ => {}
            }
        }
        match (front, back) {
            (true, true) => Side::Spanning,
            (true, false) => Side::Front,
            (false, true) => Side::Back,
            (false, false) => Side::Coplanar,
        }
    }
}
