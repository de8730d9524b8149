//! Small geometric value types used by the camera and the compositor.

use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

/// Axis-aligned pixel rectangle, `min` inclusive and `max` exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect2D {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect2D {
    pub fn xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            min: Vec2::new(x, y),
            max: Vec2::new(x + width, y + height),
        }
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        Self::xywh(0.0, 0.0, width as f32, height as f32)
    }

    pub fn x0(&self) -> f32 {
        self.min.x
    }

    pub fn y0(&self) -> f32 {
        self.min.y
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Shrinks every edge by `amount` (per axis).
    pub fn inset(&self, amount: Vec2) -> Self {
        Self {
            min: self.min + amount,
            max: self.max - amount,
        }
    }

    pub fn intersect(&self, other: &Rect2D) -> Self {
        Self {
            min: self.min.max(other.min),
            max: self.max.min(other.max).max(self.min.max(other.min)),
        }
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.y >= self.min.y && p.x < self.max.x && p.y < self.max.y
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length.
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Half-space `normal . p >= distance`. The normal points into the kept side.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn from_normal_and_point(normal: Vec3, point: Vec3) -> Self {
        let normal = normal.normalize();
        Self {
            normal,
            distance: normal.dot(point),
        }
    }

    /// Signed distance, positive on the kept side.
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) - self.distance
    }

    pub fn contains(&self, p: Vec3) -> bool {
        self.signed_distance(p) >= 0.0
    }

    pub fn to_world_space(&self, frame: &CoordinateFrame) -> Plane {
        let normal = frame.rotation * self.normal;
        Plane {
            normal,
            distance: self.distance + normal.dot(frame.translation),
        }
    }

    /// `(nx, ny, nz, -d)` so that `dot(v, (p, 1)) >= 0` inside.
    pub fn normal_d(&self) -> Vec4 {
        self.normal.extend(-self.distance)
    }
}

/// Clipping planes in the order near, right, left, top, bottom and, when the
/// far plane is finite, far. Normals face inward.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    pub planes: Vec<Plane>,
}

impl Frustum {
    pub const NEAR: usize = 0;
    pub const RIGHT: usize = 1;
    pub const LEFT: usize = 2;
    pub const TOP: usize = 3;
    pub const BOTTOM: usize = 4;
    pub const FAR: usize = 5;

    pub fn has_far_plane(&self) -> bool {
        self.planes.len() > Self::FAR
    }

    pub fn contains(&self, p: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.contains(p))
    }
}

/// Rigid transform from object (camera) space to world space.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CoordinateFrame {
    pub rotation: Quat,
    pub translation: Vec3,
}

impl CoordinateFrame {
    pub const IDENTITY: CoordinateFrame = CoordinateFrame {
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            rotation: Quat::IDENTITY,
            translation,
        }
    }

    /// Frame at `eye` whose -Z axis points at `target`.
    pub fn looking_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        let mut frame = Self::from_translation(eye);
        frame.look_at(target, up);
        frame
    }

    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let look = (target - self.translation).normalize();
        let mut right = look.cross(up);
        if right.length_squared() < 1e-12 {
            // Looking along `up`; pick any perpendicular.
            right = look.any_orthonormal_vector();
        }
        let right = right.normalize();
        let true_up = right.cross(look);
        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, true_up, -look)).normalize();
    }

    pub fn look_vector(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn right_vector(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn up_vector(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn point_to_world_space(&self, p: Vec3) -> Vec3 {
        self.rotation * p + self.translation
    }

    pub fn point_to_object_space(&self, p: Vec3) -> Vec3 {
        self.rotation.inverse() * (p - self.translation)
    }

    pub fn vector_to_world_space(&self, v: Vec3) -> Vec3 {
        self.rotation * v
    }

    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.translation)
    }
}

impl Default for CoordinateFrame {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Screen-space segment, used for debug overlays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineSegment2D {
    pub start: Vec2,
    pub end: Vec2,
}
