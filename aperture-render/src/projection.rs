//! Pinhole projection: field of view, clipping planes, sub-pixel jitter and
//! hyperbolic depth.
//!
//! Camera space looks down -Z. Pixel coordinates have their origin at the
//! viewport's top-left corner with y pointing down. Depth values in [0, 1]
//! are hyperbolic in camera-space z:
//!
//! ```text
//! 1/z = (1/f - 1/n) * d + 1/n
//! ```
//!
//! with `1/f = 0` when the far plane is at infinity.

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::geometry::{Plane, Rect2D};

/// Axis along which the field of view angle is measured, edge to edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum FovDirection {
    #[default]
    Horizontal,
    Vertical,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "ProjectionFields")
)]
pub struct Projection {
    near_plane_z: f32,
    far_plane_z: f32,
    field_of_view_angle: f32,
    field_of_view_direction: FovDirection,
    pixel_offset: Vec2,
}

/// Unchecked projection as read from a file.
#[cfg(feature = "serialize")]
#[derive(serde::Deserialize)]
struct ProjectionFields {
    near_plane_z: f32,
    far_plane_z: f32,
    field_of_view_angle: f32,
    field_of_view_direction: FovDirection,
    pixel_offset: Vec2,
}

#[cfg(feature = "serialize")]
impl TryFrom<ProjectionFields> for Projection {
    type Error = String;

    fn try_from(fields: ProjectionFields) -> Result<Self, Self::Error> {
        let ProjectionFields {
            near_plane_z,
            far_plane_z,
            field_of_view_angle,
            field_of_view_direction,
            pixel_offset,
        } = fields;
        if !(near_plane_z < 0.0) {
            return Err(format!("near plane z must be negative, got {near_plane_z}"));
        }
        if !(far_plane_z < near_plane_z) {
            return Err(format!("far plane z {far_plane_z} must be behind near plane {near_plane_z}"));
        }
        if !(field_of_view_angle > 0.0 && field_of_view_angle < std::f32::consts::PI) {
            return Err(format!("field of view {field_of_view_angle} out of range"));
        }
        Ok(Self {
            near_plane_z,
            far_plane_z,
            field_of_view_angle,
            field_of_view_direction,
            pixel_offset,
        })
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::new(90f32.to_radians(), FovDirection::Horizontal, -0.15, -150.0)
    }
}

impl Projection {
    /// # Panics
    ///
    /// Panics unless `far_plane_z < near_plane_z < 0` and the angle is in (0, pi).
    pub fn new(
        field_of_view_angle: f32,
        field_of_view_direction: FovDirection,
        near_plane_z: f32,
        far_plane_z: f32,
    ) -> Self {
        assert!(near_plane_z < 0.0, "near plane z must be negative, got {near_plane_z}");
        assert!(
            far_plane_z < near_plane_z,
            "far plane z {far_plane_z} must be behind near plane {near_plane_z}"
        );
        let mut projection = Self {
            near_plane_z,
            far_plane_z,
            field_of_view_angle: std::f32::consts::FRAC_PI_2,
            field_of_view_direction,
            pixel_offset: Vec2::ZERO,
        };
        projection.set_field_of_view_angle(field_of_view_angle);
        projection
    }

    pub fn near_plane_z(&self) -> f32 {
        self.near_plane_z
    }

    pub fn set_near_plane_z(&mut self, z: f32) {
        assert!(z < 0.0, "near plane z must be negative, got {z}");
        assert!(z > self.far_plane_z, "near plane z {z} must be in front of far plane {}", self.far_plane_z);
        self.near_plane_z = z;
    }

    pub fn far_plane_z(&self) -> f32 {
        self.far_plane_z
    }

    /// Accepts `f32::NEG_INFINITY` for an infinite far plane.
    pub fn set_far_plane_z(&mut self, z: f32) {
        assert!(
            z < self.near_plane_z,
            "far plane z {z} must be behind near plane {}",
            self.near_plane_z
        );
        self.far_plane_z = z;
    }

    pub fn is_far_plane_infinite(&self) -> bool {
        self.far_plane_z == f32::NEG_INFINITY
    }

    pub fn field_of_view_angle(&self) -> f32 {
        self.field_of_view_angle
    }

    pub fn field_of_view_angle_degrees(&self) -> f32 {
        self.field_of_view_angle.to_degrees()
    }

    pub fn set_field_of_view_angle(&mut self, radians: f32) {
        assert!(
            radians > 0.0 && radians < std::f32::consts::PI,
            "field of view {radians} out of range"
        );
        self.field_of_view_angle = radians;
    }

    pub fn set_field_of_view_angle_degrees(&mut self, degrees: f32) {
        self.set_field_of_view_angle(degrees.to_radians());
    }

    pub fn field_of_view_direction(&self) -> FovDirection {
        self.field_of_view_direction
    }

    pub fn set_field_of_view_direction(&mut self, direction: FovDirection) {
        self.field_of_view_direction = direction;
    }

    pub fn set_field_of_view(&mut self, radians: f32, direction: FovDirection) {
        self.set_field_of_view_angle(radians);
        self.field_of_view_direction = direction;
    }

    /// Sub-pixel jitter, in pixels.
    pub fn pixel_offset(&self) -> Vec2 {
        self.pixel_offset
    }

    pub fn set_pixel_offset(&mut self, offset: Vec2) {
        self.pixel_offset = offset;
    }

    /// Viewport extent along the field-of-view axis.
    pub fn fov_axis_dimension(&self, viewport: &Rect2D) -> f32 {
        match self.field_of_view_direction {
            FovDirection::Horizontal => viewport.width(),
            FovDirection::Vertical => viewport.height(),
        }
    }

    /// Half width and half height of the image plane at z = -1.
    pub fn image_plane_half_extents(&self, viewport: &Rect2D) -> Vec2 {
        let t = (self.field_of_view_angle * 0.5).tan();
        let aspect = viewport.width() / viewport.height();
        match self.field_of_view_direction {
            FovDirection::Horizontal => Vec2::new(t, t / aspect),
            FovDirection::Vertical => Vec2::new(t * aspect, t),
        }
    }

    /// Pixels per meter on the image plane at z = -1.
    pub fn image_plane_pixels_per_meter(&self, viewport: &Rect2D) -> f32 {
        self.fov_axis_dimension(viewport) * 0.5 / (self.field_of_view_angle * 0.5).tan()
    }

    pub fn near_plane_viewport_width(&self, viewport: &Rect2D) -> f32 {
        2.0 * self.image_plane_half_extents(viewport).x * -self.near_plane_z
    }

    pub fn near_plane_viewport_height(&self, viewport: &Rect2D) -> f32 {
        2.0 * self.image_plane_half_extents(viewport).y * -self.near_plane_z
    }

    /// Hyperbolic depth in [0, 1] of a camera-space z between the planes.
    pub fn camera_z_to_depth(&self, z: f32) -> f32 {
        let inv_n = 1.0 / self.near_plane_z;
        let inv_f = if self.is_far_plane_infinite() { 0.0 } else { 1.0 / self.far_plane_z };
        (1.0 / z - inv_n) / (inv_f - inv_n)
    }

    pub fn depth_to_camera_z(&self, depth: f32) -> f32 {
        let c = self.reconstruct_from_depth_clip_info();
        c.x / (c.y * depth + c.z)
    }

    /// `z = x / (y * d + z)`. Finite far: `(n f, n - f, f)`. Infinite far: `(n, -1, 1)`.
    pub fn reconstruct_from_depth_clip_info(&self) -> Vec3 {
        let n = self.near_plane_z;
        if self.is_far_plane_infinite() {
            Vec3::new(n, -1.0, 1.0)
        } else {
            let f = self.far_plane_z;
            Vec3::new(n * f, n - f, f)
        }
    }

    /// Camera-space position from a pixel and its camera-space z:
    /// `((x * p.x + p.z) * z, (y * p.y + p.w) * z, z)`.
    pub fn reconstruct_from_depth_proj_info(&self, viewport: &Rect2D) -> Vec4 {
        let s = self.image_plane_half_extents(viewport);
        let o = self.pixel_offset + viewport.min;
        let w = viewport.width();
        let h = viewport.height();
        Vec4::new(
            -2.0 * s.x / w,
            2.0 * s.y / h,
            s.x * (1.0 + 2.0 * o.x / w),
            -s.y * (1.0 + 2.0 * o.y / h),
        )
    }

    /// Clip-space projection with [0, 1] depth matching `camera_z_to_depth`
    /// and the pixel offset folded in.
    pub fn projection_matrix(&self, viewport: &Rect2D) -> Mat4 {
        let s = self.image_plane_half_extents(viewport);
        let n = self.near_plane_z;
        let (a, b) = if self.is_far_plane_infinite() {
            (-1.0, n)
        } else {
            let f = self.far_plane_z;
            (f / (n - f), -f * n / (n - f))
        };
        let shift = Vec2::new(
            -2.0 * self.pixel_offset.x / viewport.width(),
            2.0 * self.pixel_offset.y / viewport.height(),
        );
        Mat4::from_cols(
            Vec4::new(1.0 / s.x, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 1.0 / s.y, 0.0, 0.0),
            Vec4::new(shift.x, shift.y, a, -1.0),
            Vec4::new(0.0, 0.0, b, 0.0),
        )
    }

    /// Camera space to (pixel x, pixel y down, depth), homogeneous.
    pub fn project_pixel_matrix(&self, viewport: &Rect2D) -> Mat4 {
        let w = viewport.width();
        let h = viewport.height();
        let to_pixels = Mat4::from_cols(
            Vec4::new(w * 0.5, 0.0, 0.0, 0.0),
            Vec4::new(0.0, -h * 0.5, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0, 0.0),
            Vec4::new(viewport.x0() + w * 0.5, viewport.y0() + h * 0.5, 0.0, 1.0),
        );
        to_pixels * self.projection_matrix(viewport)
    }

    /// Projects a camera-space point to (pixel x, pixel y, depth). Points at
    /// or behind the eye plane return `Vec3::INFINITY`.
    pub fn project(&self, point: Vec3, viewport: &Rect2D) -> Vec3 {
        if point.z >= 0.0 {
            return Vec3::INFINITY;
        }
        let s = self.image_plane_half_extents(viewport);
        let ndc = Vec2::new(point.x / (-point.z * s.x), point.y / (-point.z * s.y));
        let x = viewport.x0() + (ndc.x * 0.5 + 0.5) * viewport.width() + self.pixel_offset.x;
        let y = viewport.y0() + (0.5 - ndc.y * 0.5) * viewport.height() + self.pixel_offset.y;
        Vec3::new(x, y, self.camera_z_to_depth(point.z))
    }

    /// Inverse of [`Projection::project`].
    pub fn unproject(&self, pixel: Vec3, viewport: &Rect2D) -> Vec3 {
        let z = self.depth_to_camera_z(pixel.z);
        self.image_plane_point(pixel.x, pixel.y, viewport) * -z
    }

    /// Point on the z = -1 image plane seen through pixel (x, y).
    pub fn image_plane_point(&self, x: f32, y: f32, viewport: &Rect2D) -> Vec3 {
        let s = self.image_plane_half_extents(viewport);
        let u = (x - self.pixel_offset.x - viewport.x0()) / viewport.width();
        let v = (y - self.pixel_offset.y - viewport.y0()) / viewport.height();
        Vec3::new((u * 2.0 - 1.0) * s.x, (1.0 - v * 2.0) * s.y, -1.0)
    }

    /// Camera-space clipping planes, inward facing, in the order near, right,
    /// left, top, bottom, far. The far plane is omitted when it is infinite.
    /// The sub-pixel offset is ignored.
    pub fn frustum_planes(&self, viewport: &Rect2D) -> Vec<Plane> {
        let s = self.image_plane_half_extents(viewport);
        let mut planes = vec![
            Plane::from_normal_and_point(Vec3::NEG_Z, Vec3::new(0.0, 0.0, self.near_plane_z)),
            Plane::from_normal_and_point(Vec3::new(-1.0, 0.0, -s.x), Vec3::ZERO),
            Plane::from_normal_and_point(Vec3::new(1.0, 0.0, -s.x), Vec3::ZERO),
            Plane::from_normal_and_point(Vec3::new(0.0, -1.0, -s.y), Vec3::ZERO),
            Plane::from_normal_and_point(Vec3::new(0.0, 1.0, -s.y), Vec3::ZERO),
        ];
        if !self.is_far_plane_infinite() {
            planes.push(Plane::from_normal_and_point(
                Vec3::Z,
                Vec3::new(0.0, 0.0, self.far_plane_z),
            ));
        }
        planes
    }

    /// Camera-space corners of the viewport at `z`: upper-right, upper-left,
    /// lower-left, lower-right.
    pub fn viewport_corners_at(&self, z: f32, viewport: &Rect2D) -> [Vec3; 4] {
        let s = self.image_plane_half_extents(viewport) * -z;
        [
            Vec3::new(s.x, s.y, z),
            Vec3::new(-s.x, s.y, z),
            Vec3::new(-s.x, -s.y, z),
            Vec3::new(s.x, -s.y, z),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Rect2D {
        Rect2D::from_size(640, 360)
    }

    #[test]
    fn test_defaults() {
        let p = Projection::default();
        assert_eq!(p.near_plane_z(), -0.15);
        assert_eq!(p.far_plane_z(), -150.0);
        assert!((p.field_of_view_angle_degrees() - 90.0).abs() < 1e-4);
        assert_eq!(p.field_of_view_direction(), FovDirection::Horizontal);
        assert_eq!(p.pixel_offset(), Vec2::ZERO);
    }

    #[test]
    fn test_depth_endpoints() {
        let p = Projection::default();
        assert!(p.camera_z_to_depth(-0.15).abs() < 1e-6);
        assert!((p.camera_z_to_depth(-150.0) - 1.0).abs() < 1e-5);
        assert!((p.depth_to_camera_z(0.5) - -0.29970).abs() < 1e-3);
    }

    #[test]
    fn test_infinite_far_depth() {
        let mut p = Projection::default();
        p.set_far_plane_z(f32::NEG_INFINITY);
        assert!(p.is_far_plane_infinite());
        assert_eq!(p.reconstruct_from_depth_clip_info(), Vec3::new(-0.15, -1.0, 1.0));
        let z = -42.0;
        let d = p.camera_z_to_depth(z);
        assert!((d - (1.0 - -0.15 / z)).abs() < 1e-6);
        assert!((p.depth_to_camera_z(d) - z).abs() < 1e-2);
        assert_eq!(p.depth_to_camera_z(1.0), f32::NEG_INFINITY);
    }

    #[test]
    fn test_clip_info_matches_depth() {
        let p = Projection::new(1.0, FovDirection::Vertical, -0.5, -80.0);
        for z in [-0.5f32, -1.0, -7.25, -80.0] {
            let d = p.camera_z_to_depth(z);
            assert!((p.depth_to_camera_z(d) - z).abs() < 1e-3 * z.abs(), "z = {z}");
        }
    }

    #[test]
    fn test_project_unproject_camera_space() {
        let mut p = Projection::default();
        p.set_pixel_offset(Vec2::new(0.25, -0.4));
        let vp = viewport();
        let point = Vec3::new(1.5, -0.75, -6.0);
        let pixel = p.project(point, &vp);
        let back = p.unproject(pixel, &vp);
        assert!((back - point).length() < 1e-3, "{back:?}");
    }

    #[test]
    fn test_project_behind_is_infinite() {
        let p = Projection::default();
        assert_eq!(p.project(Vec3::new(0.0, 0.0, 1.0), &viewport()), Vec3::INFINITY);
    }

    #[test]
    fn test_matrix_matches_project() {
        let mut p = Projection::default();
        p.set_pixel_offset(Vec2::new(-0.3, 0.2));
        let vp = Rect2D::xywh(10.0, 20.0, 320.0, 240.0);
        let point = Vec3::new(-2.0, 1.0, -9.0);
        let expected = p.project(point, &vp);
        let h = p.project_pixel_matrix(&vp) * point.extend(1.0);
        let got = h.truncate() / h.w;
        assert!((got - expected).length() < 1e-3, "{got:?} vs {expected:?}");
    }

    #[test]
    fn test_proj_info_reconstructs_position() {
        let mut p = Projection::default();
        p.set_pixel_offset(Vec2::new(0.1, 0.3));
        let vp = viewport();
        let point = Vec3::new(0.5, 2.0, -12.0);
        let pixel = p.project(point, &vp);
        let info = p.reconstruct_from_depth_proj_info(&vp);
        let z = point.z;
        let rebuilt = Vec3::new((pixel.x * info.x + info.z) * z, (pixel.y * info.y + info.w) * z, z);
        assert!((rebuilt - point).length() < 1e-3, "{rebuilt:?}");
    }

    #[test]
    fn test_vertical_fov_uses_height() {
        let mut p = Projection::default();
        p.set_field_of_view(60f32.to_radians(), FovDirection::Vertical);
        let vp = viewport();
        assert_eq!(p.fov_axis_dimension(&vp), 360.0);
        let expected = 180.0 / 30f32.to_radians().tan();
        assert!((p.image_plane_pixels_per_meter(&vp) - expected).abs() < 1e-3);
    }

    #[test]
    fn test_corners_lie_on_side_planes() {
        let p = Projection::default();
        let vp = viewport();
        let planes = p.frustum_planes(&vp);
        for corner in p.viewport_corners_at(-3.0, &vp) {
            let min_distance = planes.iter().map(|pl| pl.signed_distance(corner)).fold(f32::MAX, f32::min);
            assert!(min_distance.abs() < 1e-4);
        }
    }

    #[test]
    #[should_panic(expected = "near plane z must be negative")]
    fn test_positive_near_plane_panics() {
        let mut p = Projection::default();
        p.set_near_plane_z(0.5);
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn test_ron_enforces_plane_order() {
        let text = ron::to_string(&Projection::default()).unwrap();
        assert_eq!(ron::from_str::<Projection>(&text).unwrap(), Projection::default());

        let swapped = "(near_plane_z: -150.0, far_plane_z: -0.15, field_of_view_angle: 1.0, \
                       field_of_view_direction: Horizontal, pixel_offset: (0.0, 0.0))";
        let err = ron::from_str::<Projection>(swapped).unwrap_err();
        assert!(err.to_string().contains("must be behind near plane"), "{err}");
    }
}
