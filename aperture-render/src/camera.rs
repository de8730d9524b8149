//! World-space camera: a [`Projection`] plus a pose, the optical effect
//! settings and the temporal jitter state.

use aperture_gpu_shared::uniforms::CameraUniforms;
use glam::{Vec2, Vec3};

use crate::geometry::{CoordinateFrame, Frustum, Ray, Rect2D};
use crate::projection::{FovDirection, Projection};
use crate::settings::{
    DepthOfFieldModel, DepthOfFieldSettings, FilmSettings, MotionBlurSettings, UniversalBlurSettings,
};

/// Length of the jitter sequence. Must be a power of two.
const TAA_SAMPLES_PER_PIXEL: u32 = 64;

/// Van der Corput radical inverse of `index` in `base`, in [0, 1).
pub fn radical_inverse(index: u32, base: u32) -> f32 {
    let mut result = 0.0f64;
    let mut digit_weight = 1.0 / base as f64;
    let mut i = index;
    while i > 0 {
        result += digit_weight * (i % base) as f64;
        i /= base;
        digit_weight /= base as f64;
    }
    result as f32
}

/// Minimal scene-graph participant. The surrounding entity framework is
/// external; the camera implements just what a scene needs to drive it.
pub trait Entity {
    fn name(&self) -> &str;
    fn frame(&self) -> CoordinateFrame;
    fn previous_frame(&self) -> CoordinateFrame;
    fn on_simulation(&mut self, absolute_time: f64, delta_time: f64);
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize), serde(default))]
pub struct Camera {
    name: String,
    frame: CoordinateFrame,
    previous_frame: CoordinateFrame,
    projection: Projection,
    previous_projection: Projection,
    depth_of_field: DepthOfFieldSettings,
    motion_blur: MotionBlurSettings,
    film: FilmSettings,
    universal_blur: UniversalBlurSettings,
    viewport_fraction_max_circle_of_confusion: f32,
    closest_near_plane_z_for_depth_of_field: f32,
    override_pixel_offset: bool,
    taa_sample_index: u32,
    exposure_time: f32,
    visualization_scale: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new("Camera")
    }
}

impl Camera {
    pub fn new(name: impl Into<String>) -> Self {
        let projection = Projection::default();
        Self {
            name: name.into(),
            frame: CoordinateFrame::IDENTITY,
            previous_frame: CoordinateFrame::IDENTITY,
            projection,
            previous_projection: projection,
            depth_of_field: DepthOfFieldSettings::default(),
            motion_blur: MotionBlurSettings::default(),
            film: FilmSettings::default(),
            universal_blur: UniversalBlurSettings::default(),
            viewport_fraction_max_circle_of_confusion: 0.03,
            closest_near_plane_z_for_depth_of_field: -0.2,
            override_pixel_offset: true,
            taa_sample_index: 0,
            exposure_time: 0.0,
            visualization_scale: 1.0,
        }
    }

    /// Copies everything except the name.
    pub fn copy_parameters_from(&mut self, other: &Camera) {
        let name = std::mem::take(&mut self.name);
        *self = other.clone();
        self.name = name;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    // ---- pose ----

    pub fn frame(&self) -> CoordinateFrame {
        self.frame
    }

    pub fn set_frame(&mut self, frame: CoordinateFrame) {
        self.frame = frame;
    }

    pub fn previous_frame(&self) -> CoordinateFrame {
        self.previous_frame
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.frame.translation = position;
    }

    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.frame.look_at(target, up);
    }

    // ---- projection ----

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
    }

    /// Projection as it was before the most recent [`Camera::on_simulation`].
    pub fn previous_projection(&self) -> &Projection {
        &self.previous_projection
    }

    pub fn near_plane_z(&self) -> f32 {
        self.projection.near_plane_z()
    }

    pub fn set_near_plane_z(&mut self, z: f32) {
        self.projection.set_near_plane_z(z);
    }

    pub fn far_plane_z(&self) -> f32 {
        self.projection.far_plane_z()
    }

    pub fn set_far_plane_z(&mut self, z: f32) {
        self.projection.set_far_plane_z(z);
    }

    pub fn field_of_view_angle(&self) -> f32 {
        self.projection.field_of_view_angle()
    }

    pub fn field_of_view_direction(&self) -> FovDirection {
        self.projection.field_of_view_direction()
    }

    pub fn set_field_of_view(&mut self, radians: f32, direction: FovDirection) {
        self.projection.set_field_of_view(radians, direction);
    }

    pub fn pixel_offset(&self) -> Vec2 {
        self.projection.pixel_offset()
    }

    pub fn set_pixel_offset(&mut self, offset: Vec2) {
        self.projection.set_pixel_offset(offset);
    }

    /// When set, [`Camera::on_simulation`] owns the pixel offset.
    pub fn override_pixel_offset(&self) -> bool {
        self.override_pixel_offset
    }

    pub fn set_override_pixel_offset(&mut self, enabled: bool) {
        self.override_pixel_offset = enabled;
    }

    pub fn fov_axis_dimension(&self, viewport: &Rect2D) -> f32 {
        self.projection.fov_axis_dimension(viewport)
    }

    // ---- settings ----

    pub fn depth_of_field_settings(&self) -> &DepthOfFieldSettings {
        &self.depth_of_field
    }

    pub fn depth_of_field_settings_mut(&mut self) -> &mut DepthOfFieldSettings {
        &mut self.depth_of_field
    }

    pub fn motion_blur_settings(&self) -> &MotionBlurSettings {
        &self.motion_blur
    }

    pub fn motion_blur_settings_mut(&mut self) -> &mut MotionBlurSettings {
        &mut self.motion_blur
    }

    pub fn film_settings(&self) -> &FilmSettings {
        &self.film
    }

    pub fn film_settings_mut(&mut self) -> &mut FilmSettings {
        &mut self.film
    }

    pub fn universal_blur_settings(&self) -> &UniversalBlurSettings {
        &self.universal_blur
    }

    pub fn universal_blur_settings_mut(&mut self) -> &mut UniversalBlurSettings {
        &mut self.universal_blur
    }

    /// Largest allowed CoC radius as a fraction of the field-of-view axis.
    pub fn viewport_fraction_max_circle_of_confusion(&self) -> f32 {
        self.viewport_fraction_max_circle_of_confusion
    }

    pub fn set_viewport_fraction_max_circle_of_confusion(&mut self, f: f32) {
        self.viewport_fraction_max_circle_of_confusion = f;
    }

    /// Points nearer than this z are blurred as if they were at it.
    pub fn closest_near_plane_z_for_depth_of_field(&self) -> f32 {
        self.closest_near_plane_z_for_depth_of_field
    }

    pub fn set_closest_near_plane_z_for_depth_of_field(&mut self, z: f32) {
        self.closest_near_plane_z_for_depth_of_field = z;
    }

    pub fn exposure_time(&self) -> f32 {
        self.exposure_time
    }

    pub fn set_exposure_time(&mut self, t: f32) {
        self.exposure_time = t;
    }

    pub fn visualization_scale(&self) -> f32 {
        self.visualization_scale
    }

    pub fn set_visualization_scale(&mut self, s: f32) {
        self.visualization_scale = s;
    }

    // ---- simulation ----

    fn next_taa_offset(&mut self) -> Vec2 {
        self.taa_sample_index = (self.taa_sample_index + 1) & (TAA_SAMPLES_PER_PIXEL - 1);
        Vec2::new(
            radical_inverse(self.taa_sample_index, 2) - 0.5,
            radical_inverse(self.taa_sample_index, 3) - 0.5,
        )
    }

    /// Snapshots the pose and projection, then advances or clears the jitter.
    pub fn on_simulation(&mut self, _absolute_time: f64, _delta_time: f64) {
        self.previous_frame = self.frame;
        self.previous_projection = self.projection;
        if self.override_pixel_offset {
            let offset = if self.film.effects_enabled() && self.film.temporal_antialiasing_enabled() {
                self.next_taa_offset()
            } else {
                Vec2::ZERO
            };
            self.projection.set_pixel_offset(offset);
        }
    }

    /// Jitter applied this frame relative to the previous one, in pixels.
    pub fn jitter_motion(&self) -> Vec2 {
        self.projection.pixel_offset() - self.previous_projection.pixel_offset()
    }

    // ---- projection queries ----

    /// World point to (pixel x, pixel y, depth). Points behind the camera map
    /// to `Vec3::INFINITY`.
    pub fn project(&self, point: Vec3, viewport: &Rect2D) -> Vec3 {
        self.projection.project(self.frame.point_to_object_space(point), viewport)
    }

    pub fn unproject(&self, pixel: Vec3, viewport: &Rect2D) -> Vec3 {
        self.frame.point_to_world_space(self.projection.unproject(pixel, viewport))
    }

    /// Like [`Camera::project`] with x and y normalized to [0, 1] over the viewport.
    pub fn project_unit(&self, point: Vec3, viewport: &Rect2D) -> Vec3 {
        let p = self.project(point, viewport);
        if !p.is_finite() {
            return Vec3::INFINITY;
        }
        Vec3::new(
            (p.x - viewport.x0()) / viewport.width(),
            (p.y - viewport.y0()) / viewport.height(),
            p.z,
        )
    }

    pub fn unproject_unit(&self, unit: Vec3, viewport: &Rect2D) -> Vec3 {
        let pixel = Vec3::new(
            unit.x * viewport.width() + viewport.x0(),
            unit.y * viewport.height() + viewport.y0(),
            unit.z,
        );
        self.unproject(pixel, viewport)
    }

    /// Pinhole ray from the eye through pixel (x, y).
    pub fn world_ray(&self, x: f32, y: f32, viewport: &Rect2D) -> Ray {
        let dir = self.projection.image_plane_point(x, y, viewport);
        Ray::new(self.frame.translation, self.frame.vector_to_world_space(dir))
    }

    /// Thin-lens ray through pixel (x, y) from lens sample (u, v) in the unit
    /// disk. With depth of field off the lens sample is ignored.
    ///
    /// # Panics
    ///
    /// Panics under the artist model, which has no lens geometry.
    pub fn world_ray_lens(&self, x: f32, y: f32, u: f32, v: f32, viewport: &Rect2D) -> Ray {
        let model = self.depth_of_field.effective_model();
        assert!(
            model != DepthOfFieldModel::Artist,
            "cannot cast rays under the artist depth of field model"
        );
        let (u, v) = if model == DepthOfFieldModel::None { (0.0, 0.0) } else { (u, v) };

        let pinhole = self.world_ray(x, y, viewport);
        let focus_z = self.depth_of_field.focus_plane_z();
        let focus_point = pinhole.origin
            + pinhole.direction * (-focus_z / pinhole.direction.dot(self.frame.look_vector()));

        let lens_radius = self.depth_of_field.lens_radius();
        let origin = pinhole.origin
            + self.frame.right_vector() * (u * lens_radius)
            + self.frame.up_vector() * (v * lens_radius);
        Ray::new(origin, (focus_point - origin) * -focus_z.signum())
    }

    /// World-space clipping planes. See [`Frustum`] for the order.
    pub fn frustum(&self, viewport: &Rect2D) -> Frustum {
        Frustum {
            planes: self
                .projection
                .frustum_planes(viewport)
                .iter()
                .map(|plane| plane.to_world_space(&self.frame))
                .collect(),
        }
    }

    /// World-space near plane corners: upper-right, upper-left, lower-left, lower-right.
    pub fn near_viewport_corners(&self, viewport: &Rect2D) -> [Vec3; 4] {
        self.projection
            .viewport_corners_at(self.near_plane_z(), viewport)
            .map(|c| self.frame.point_to_world_space(c))
    }

    /// `None` when the far plane is at infinity.
    pub fn far_viewport_corners(&self, viewport: &Rect2D) -> Option<[Vec3; 4]> {
        if self.projection.is_far_plane_infinite() {
            return None;
        }
        Some(
            self.projection
                .viewport_corners_at(self.far_plane_z(), viewport)
                .map(|c| self.frame.point_to_world_space(c)),
        )
    }

    pub fn image_plane_pixels_per_meter(&self, viewport: &Rect2D) -> f32 {
        self.projection.image_plane_pixels_per_meter(viewport)
    }

    pub fn near_plane_viewport_width(&self, viewport: &Rect2D) -> f32 {
        self.projection.near_plane_viewport_width(viewport)
    }

    pub fn near_plane_viewport_height(&self, viewport: &Rect2D) -> f32 {
        self.projection.near_plane_viewport_height(viewport)
    }

    // ---- depth of field ----

    /// Signed blur radius of a point at camera-space `z`: negative in the near
    /// field, positive in the far field, zero with depth of field off.
    ///
    /// Under the physical model, points nearer than
    /// [`Camera::closest_near_plane_z_for_depth_of_field`] use that depth and
    /// the magnitude never exceeds the viewport-fraction limit.
    pub fn circle_of_confusion_radius_pixels(&self, z: f32, viewport: &Rect2D) -> f32 {
        let dof = &self.depth_of_field;
        let dimension = self.fov_axis_dimension(viewport);
        match dof.effective_model() {
            DepthOfFieldModel::None => 0.0,
            DepthOfFieldModel::Artist => {
                if z > dof.near_sharp_plane_z() {
                    let t = ((z - dof.near_sharp_plane_z())
                        / (dof.near_blurry_plane_z() - dof.near_sharp_plane_z()))
                    .min(1.0);
                    -t * dof.near_blur_radius_fraction() * dimension
                } else if z < dof.far_sharp_plane_z() {
                    let t = ((dof.far_sharp_plane_z() - z)
                        / (dof.far_sharp_plane_z() - dof.far_blurry_plane_z()))
                    .min(1.0);
                    t * dof.far_blur_radius_fraction() * dimension
                } else {
                    0.0
                }
            }
            DepthOfFieldModel::Physical => {
                let z = z.min(self.closest_near_plane_z_for_depth_of_field);
                let focus_z = dof.focus_plane_z();
                // (z - f) / z tends to 1 as z goes to -infinity.
                let ratio = if z.is_finite() { (z - focus_z) / z } else { 1.0 };
                let radius =
                    self.image_plane_pixels_per_meter(viewport) * dof.lens_radius() / focus_z.abs() * ratio;
                let limit = dimension * self.viewport_fraction_max_circle_of_confusion;
                radius.clamp(-limit, limit)
            }
        }
    }

    /// Upper bound on `|circle_of_confusion_radius_pixels(z)|` over the
    /// visible depth range. Sizes the blur search radius.
    pub fn max_circle_of_confusion_radius_pixels(&self, viewport: &Rect2D) -> f32 {
        let dof = &self.depth_of_field;
        let dimension = self.fov_axis_dimension(viewport);
        match dof.effective_model() {
            DepthOfFieldModel::None => 0.0,
            DepthOfFieldModel::Artist => {
                dof.near_blur_radius_fraction().max(dof.far_blur_radius_fraction()) * dimension
            }
            DepthOfFieldModel::Physical => {
                let near_z = self.near_plane_z().min(self.closest_near_plane_z_for_depth_of_field);
                let near = self.circle_of_confusion_radius_pixels(near_z, viewport).abs();
                let far = self.circle_of_confusion_radius_pixels(self.far_plane_z(), viewport).abs();
                near.max(far).min(dimension * self.viewport_fraction_max_circle_of_confusion)
            }
        }
    }

    /// Camera block for kernels, in pixel coordinates of `viewport`.
    pub fn shader_uniforms(&self, viewport: &Rect2D) -> CameraUniforms {
        CameraUniforms {
            frame: self.frame.to_mat4().to_cols_array_2d(),
            previous_frame: self.previous_frame.to_mat4().to_cols_array_2d(),
            project_to_pixel: self.projection.project_pixel_matrix(viewport).to_cols_array_2d(),
            clip_info: self.projection.reconstruct_from_depth_clip_info().extend(0.0).to_array(),
            proj_info: self.projection.reconstruct_from_depth_proj_info(viewport).to_array(),
            pixel_offset: self.projection.pixel_offset().to_array(),
            near_plane_z: self.near_plane_z(),
            far_plane_z: self.far_plane_z(),
        }
    }
}

impl Entity for Camera {
    fn name(&self) -> &str {
        &self.name
    }

    fn frame(&self) -> CoordinateFrame {
        self.frame
    }

    fn previous_frame(&self) -> CoordinateFrame {
        self.previous_frame
    }

    fn on_simulation(&mut self, absolute_time: f64, delta_time: f64) {
        Camera::on_simulation(self, absolute_time, delta_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Rect2D {
        Rect2D::from_size(1280, 720)
    }

    fn physical_camera() -> Camera {
        let mut camera = Camera::new("Physical");
        camera.depth_of_field_settings_mut().set_enabled(true);
        camera.depth_of_field_settings_mut().set_model(DepthOfFieldModel::Physical);
        camera.depth_of_field_settings_mut().set_lens_radius(0.05);
        camera
    }

    #[test]
    fn test_radical_inverse() {
        assert_eq!(radical_inverse(0, 2), 0.0);
        assert_eq!(radical_inverse(1, 2), 0.5);
        assert_eq!(radical_inverse(3, 2), 0.75);
        assert!((radical_inverse(1, 3) - 1.0 / 3.0).abs() < 1e-6);
        assert!((radical_inverse(5, 3) - 7.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_frustum_plane_count() {
        let mut camera = Camera::default();
        let vp = viewport();
        assert_eq!(camera.frustum(&vp).planes.len(), 6);
        camera.set_far_plane_z(f32::NEG_INFINITY);
        let frustum = camera.frustum(&vp);
        assert_eq!(frustum.planes.len(), 5);
        assert!(!frustum.has_far_plane());
    }

    #[test]
    fn test_frustum_plane_order_and_orientation() {
        let mut camera = Camera::default();
        camera.set_frame(CoordinateFrame::looking_at(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 2.0, -10.0), Vec3::Y));
        let vp = viewport();
        let frustum = camera.frustum(&vp);
        let look = camera.frame().look_vector();
        assert!(frustum.planes[Frustum::NEAR].normal.dot(look) > 0.99);
        assert!(frustum.planes[Frustum::FAR].normal.dot(look) < -0.99);
        assert!(frustum.planes[Frustum::RIGHT].normal.dot(camera.frame().right_vector()) < 0.0);
        assert!(frustum.planes[Frustum::LEFT].normal.dot(camera.frame().right_vector()) > 0.0);
        assert!(frustum.planes[Frustum::TOP].normal.dot(camera.frame().up_vector()) < 0.0);
        assert!(frustum.planes[Frustum::BOTTOM].normal.dot(camera.frame().up_vector()) > 0.0);
        assert!(frustum.contains(Vec3::new(1.0, 2.0, -5.0)));
        assert!(!frustum.contains(Vec3::new(1.0, 2.0, 5.0)));
    }

    #[test]
    fn test_project_unproject_round_trip() {
        let mut camera = Camera::default();
        camera.set_frame(CoordinateFrame::looking_at(Vec3::new(4.0, 1.0, 4.0), Vec3::ZERO, Vec3::Y));
        camera.set_pixel_offset(Vec2::new(0.2, -0.1));
        let vp = viewport();
        let frustum = camera.frustum(&vp);
        let points = [Vec3::ZERO, Vec3::new(0.5, 0.25, -1.0), Vec3::new(-3.0, 2.0, -6.0)];
        for p in points {
            assert!(frustum.contains(p), "{p:?} outside");
            let back = camera.unproject(camera.project(p, &vp), &vp);
            assert!((back - p).length() < 2e-3 * (1.0 + p.length()), "{p:?} -> {back:?}");
        }
    }

    #[test]
    fn test_project_behind_camera() {
        let camera = Camera::default();
        assert_eq!(camera.project(Vec3::new(0.0, 0.0, 2.0), &viewport()), Vec3::INFINITY);
        assert_eq!(camera.project_unit(Vec3::new(0.0, 0.0, 2.0), &viewport()), Vec3::INFINITY);
    }

    #[test]
    fn test_project_unit_center() {
        let camera = Camera::default();
        let unit = camera.project_unit(Vec3::new(0.0, 0.0, -5.0), &viewport());
        assert!((unit.x - 0.5).abs() < 1e-6 && (unit.y - 0.5).abs() < 1e-6);
        let back = camera.unproject_unit(unit, &viewport());
        assert!((back - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-3);
    }

    #[test]
    fn test_world_ray_through_center() {
        let camera = Camera::default();
        let ray = camera.world_ray(640.0, 360.0, &viewport());
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-5);
        assert_eq!(ray.origin, Vec3::ZERO);
    }

    #[test]
    fn test_lens_rays_converge_on_focus_plane() {
        let camera = physical_camera();
        let vp = viewport();
        let focus_z = camera.depth_of_field_settings().focus_plane_z();
        let pinhole = camera.world_ray(300.0, 200.0, &vp);
        let lens = camera.world_ray_lens(300.0, 200.0, 0.7, -0.4, &vp);
        let t_pin = focus_z / pinhole.direction.z;
        let t_lens = (focus_z - lens.origin.z) / lens.direction.z;
        assert!((pinhole.point_at(t_pin) - lens.point_at(t_lens)).length() < 1e-3);
        assert!(lens.direction.z < 0.0);
        assert!((lens.origin - Vec3::new(0.035, -0.02, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_lens_ignored_without_depth_of_field() {
        let camera = Camera::default();
        let vp = viewport();
        let ray = camera.world_ray_lens(10.0, 20.0, 0.9, 0.9, &vp);
        assert_eq!(ray.origin, Vec3::ZERO);
    }

    #[test]
    #[should_panic(expected = "artist depth of field model")]
    fn test_lens_ray_under_artist_model_panics() {
        let mut camera = Camera::default();
        camera.depth_of_field_settings_mut().set_enabled(true);
        camera.depth_of_field_settings_mut().set_model(DepthOfFieldModel::Artist);
        camera.world_ray_lens(0.0, 0.0, 0.0, 0.0, &viewport());
    }

    #[test]
    fn test_coc_sign_convention() {
        let camera = physical_camera();
        let vp = viewport();
        assert!(camera.circle_of_confusion_radius_pixels(-2.0, &vp) < 0.0);
        assert!(camera.circle_of_confusion_radius_pixels(-10.0, &vp).abs() < 1e-5);
        assert!(camera.circle_of_confusion_radius_pixels(-60.0, &vp) > 0.0);
        assert!(camera.circle_of_confusion_radius_pixels(f32::NEG_INFINITY, &vp).is_finite());
    }

    #[test]
    fn test_coc_disabled_is_zero() {
        let camera = Camera::default();
        assert_eq!(camera.circle_of_confusion_radius_pixels(-1.0, &viewport()), 0.0);
        assert_eq!(camera.max_circle_of_confusion_radius_pixels(&viewport()), 0.0);
    }

    #[test]
    fn test_physical_max_coc_bounds_every_depth() {
        let vp = viewport();
        for lens_radius in [0.001f32, 0.01, 0.05, 0.5] {
            let mut camera = physical_camera();
            camera.depth_of_field_settings_mut().set_lens_radius(lens_radius);
            let max = camera.max_circle_of_confusion_radius_pixels(&vp);
            assert!(max <= 1280.0 * 0.03 + 1e-4);
            let (near, far) = (camera.near_plane_z(), camera.far_plane_z());
            for i in 0..=400 {
                let t = i as f32 / 400.0;
                // Sample hyperbolically so the near field is well covered.
                let z = camera.projection().depth_to_camera_z(t);
                assert!(z <= near + 1e-4 && z >= far - 1e-2);
                let r = camera.circle_of_confusion_radius_pixels(z, &vp).abs();
                assert!(r <= max + 1e-3, "lens {lens_radius}: |coc({z})| = {r} > {max}");
            }
        }
    }

    #[test]
    fn test_physical_max_coc_is_clamped() {
        let mut camera = physical_camera();
        camera.depth_of_field_settings_mut().set_lens_radius(10.0);
        let vp = viewport();
        assert!((camera.max_circle_of_confusion_radius_pixels(&vp) - 1280.0 * 0.03).abs() < 1e-3);
    }

    #[test]
    fn test_artist_coc_ramps() {
        let mut camera = Camera::default();
        camera.depth_of_field_settings_mut().set_enabled(true);
        camera.depth_of_field_settings_mut().set_model(DepthOfFieldModel::Artist);
        let vp = viewport();
        let near_full = -0.015 * 1280.0;
        let far_full = 0.005 * 1280.0;
        assert!((camera.circle_of_confusion_radius_pixels(-0.2, &vp) - near_full).abs() < 1e-3);
        assert!((camera.circle_of_confusion_radius_pixels(-0.625, &vp) - near_full * 0.5).abs() < 1e-3);
        assert_eq!(camera.circle_of_confusion_radius_pixels(-20.0, &vp), 0.0);
        assert!((camera.circle_of_confusion_radius_pixels(-70.0, &vp) - far_full * 0.5).abs() < 1e-3);
        assert!((camera.circle_of_confusion_radius_pixels(-140.0, &vp) - far_full).abs() < 1e-3);
        assert!((camera.max_circle_of_confusion_radius_pixels(&vp) - 0.015 * 1280.0).abs() < 1e-3);
    }

    #[test]
    fn test_vertical_fov_uses_height_for_coc() {
        let mut camera = Camera::default();
        camera.depth_of_field_settings_mut().set_enabled(true);
        camera.depth_of_field_settings_mut().set_model(DepthOfFieldModel::Artist);
        camera.set_field_of_view(60f32.to_radians(), FovDirection::Vertical);
        let vp = viewport();
        assert!((camera.max_circle_of_confusion_radius_pixels(&vp) - 0.015 * 720.0).abs() < 1e-3);
    }

    #[test]
    fn test_on_simulation_snapshots_previous_projection() {
        let mut camera = Camera::default();
        camera.film_settings_mut().set_temporal_antialiasing_enabled(true);
        let before = *camera.projection();
        camera.on_simulation(0.0, 1.0 / 60.0);
        assert_eq!(*camera.previous_projection(), before);
        assert_eq!(camera.pixel_offset(), Vec2::new(0.0, 1.0 / 3.0 - 0.5));
        assert_eq!(camera.jitter_motion(), camera.pixel_offset());

        let first = camera.pixel_offset();
        camera.on_simulation(1.0 / 60.0, 1.0 / 60.0);
        assert_eq!(camera.previous_projection().pixel_offset(), first);
        assert_eq!(camera.pixel_offset(), Vec2::new(-0.25, 2.0 / 3.0 - 0.5));
    }

    #[test]
    fn test_jitter_period_is_64() {
        let mut camera = Camera::default();
        camera.film_settings_mut().set_temporal_antialiasing_enabled(true);
        let mut offsets = Vec::new();
        for i in 0..128 {
            camera.on_simulation(i as f64, 1.0);
            offsets.push(camera.pixel_offset());
        }
        assert_eq!(offsets[..64], offsets[64..]);
        for o in &offsets {
            assert!(o.x >= -0.5 && o.x < 0.5 && o.y >= -0.5 && o.y < 0.5);
        }
    }

    #[test]
    fn test_jitter_zeroed_without_taa() {
        let mut camera = Camera::default();
        camera.set_pixel_offset(Vec2::new(0.3, 0.3));
        camera.on_simulation(0.0, 0.1);
        assert_eq!(camera.pixel_offset(), Vec2::ZERO);
        assert_eq!(camera.previous_projection().pixel_offset(), Vec2::new(0.3, 0.3));

        camera.set_override_pixel_offset(false);
        camera.set_pixel_offset(Vec2::new(0.1, 0.0));
        camera.on_simulation(0.1, 0.1);
        assert_eq!(camera.pixel_offset(), Vec2::new(0.1, 0.0));
    }

    #[test]
    fn test_entity_snapshots_frame() {
        let mut camera = Camera::default();
        camera.set_position(Vec3::new(1.0, 0.0, 0.0));
        let entity: &mut dyn Entity = &mut camera;
        entity.on_simulation(0.0, 0.1);
        assert_eq!(entity.previous_frame().translation, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(entity.name(), "Camera");
    }

    #[test]
    fn test_copy_parameters_keeps_name() {
        let mut a = Camera::new("a");
        let mut b = Camera::new("b");
        b.set_near_plane_z(-0.5);
        a.copy_parameters_from(&b);
        assert_eq!(a.name(), "a");
        assert_eq!(a.near_plane_z(), -0.5);
    }

    #[test]
    fn test_near_corners_project_to_viewport_corners() {
        let camera = Camera::default();
        let vp = viewport();
        let [ur, ul, ll, lr] = camera.near_viewport_corners(&vp);
        assert!((camera.project(ur, &vp).truncate() - Vec2::new(1280.0, 0.0)).length() < 1e-2);
        assert!((camera.project(ul, &vp).truncate() - Vec2::new(0.0, 0.0)).length() < 1e-2);
        assert!((camera.project(ll, &vp).truncate() - Vec2::new(0.0, 720.0)).length() < 1e-2);
        assert!((camera.project(lr, &vp).truncate() - Vec2::new(1280.0, 720.0)).length() < 1e-2);
        assert!(camera.far_viewport_corners(&vp).is_some());
    }

    #[test]
    fn test_shader_uniforms_clip_info() {
        let camera = Camera::default();
        let u = camera.shader_uniforms(&viewport());
        assert_eq!(u.clip_info[0], -0.15 * -150.0);
        assert_eq!(u.near_plane_z, -0.15);
    }
}
