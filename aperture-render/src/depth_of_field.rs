//! Depth-of-field buffers and passes: circle-of-confusion packing, the
//! separable reduced-resolution blur and the final composite.

use aperture_gpu_shared::kernels::slot;
use aperture_gpu_shared::uniforms::{CocParams, DofBlurParams, DofCompositeParams};
use aperture_gpu_shared::Kernel;
use glam::{IVec2, Vec4};

use crate::camera::Camera;
use crate::device::{
    div_ceil, match_target, trimmed_extent, Args, AttachmentPoint, FramebufferId, RenderDevice, TextureDesc,
    TextureId,
};
use crate::geometry::Rect2D;
use crate::settings::DepthOfFieldModel;

/// Composite visualizations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum DebugOption {
    #[default]
    None,
    /// Unsigned radius as gray.
    ShowCoc,
    /// Near field blue, far field green, in focus white.
    ShowRegion,
    ShowNear,
    ShowBlurry,
    ShowInput,
    ShowMidAndFar,
    /// Near radius in red, far radius in green.
    ShowSignedCoc,
}

impl DebugOption {
    pub fn shader_index(self) -> i32 {
        match self {
            DebugOption::None => 0,
            DebugOption::ShowCoc => 1,
            DebugOption::ShowRegion => 2,
            DebugOption::ShowNear => 3,
            DebugOption::ShowBlurry => 4,
            DebugOption::ShowInput => 5,
            DebugOption::ShowMidAndFar => 6,
            DebugOption::ShowSignedCoc => 7,
        }
    }
}

/// Packed-buffer radius encoding: `radius / (2 * max) + 0.5`.
pub fn encode_coc_radius(radius: f32, max_radius: f32) -> f32 {
    radius / (2.0 * max_radius) + 0.5
}

pub fn decode_coc_radius(encoded: f32, max_radius: f32) -> f32 {
    (encoded * 2.0 - 1.0) * max_radius
}

/// Radius the packed buffer is normalized by: the camera's worst case,
/// rounded up, and never below one pixel.
pub fn normalization_radius(camera: &Camera, viewport: &Rect2D) -> f32 {
    camera.max_circle_of_confusion_radius_pixels(viewport).ceil().max(1.0)
}

/// Worst-case near-field blur for the frame, in full-resolution pixels.
/// Zero when it would be smaller than the downsampling itself.
pub fn near_blur_radius_pixels(camera: &Camera, viewport: &Rect2D, reduced_resolution_factor: i32) -> i32 {
    let dof = camera.depth_of_field_settings();
    let n = match dof.effective_model() {
        DepthOfFieldModel::Artist => dof.near_blur_radius_fraction() * camera.fov_axis_dimension(viewport),
        DepthOfFieldModel::Physical => -camera.circle_of_confusion_radius_pixels(
            camera.closest_near_plane_z_for_depth_of_field().min(camera.near_plane_z()),
            viewport,
        ),
        DepthOfFieldModel::None => 0.0,
    };
    let radius = (camera.viewport_fraction_max_circle_of_confusion() * viewport.width())
        .min(n)
        .ceil() as i32;
    if radius < reduced_resolution_factor - 1 {
        0
    } else {
        radius.max(0)
    }
}

pub struct DepthOfFieldBufferPipeline {
    packed: Option<TextureId>,
    temp_near: Option<TextureId>,
    temp_blur: Option<TextureId>,
    near: Option<TextureId>,
    blur: Option<TextureId>,
    packed_fb: Option<FramebufferId>,
    horizontal_fb: Option<FramebufferId>,
    vertical_fb: Option<FramebufferId>,
    reduced_resolution_factor: i32,
    /// Trimmed color extent of the last resize.
    viewport: Rect2D,
    max_coc_radius_pixels: f32,
    far_radius_rescale: f32,
}

impl Default for DepthOfFieldBufferPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthOfFieldBufferPipeline {
    pub fn new() -> Self {
        Self {
            packed: None,
            temp_near: None,
            temp_blur: None,
            near: None,
            blur: None,
            packed_fb: None,
            horizontal_fb: None,
            vertical_fb: None,
            reduced_resolution_factor: 1,
            viewport: Rect2D::default(),
            max_coc_radius_pixels: 1.0,
            far_radius_rescale: 1.0,
        }
    }

    fn attach(
        rd: &mut dyn RenderDevice,
        fb: &mut Option<FramebufferId>,
        label: &str,
        point: AttachmentPoint,
        texture: TextureId,
    ) {
        let framebuffer = *fb.get_or_insert_with(|| rd.create_framebuffer(label));
        rd.set_attachment(framebuffer, point, Some(texture));
    }

    /// Matches every buffer to `color` minus the guard band: packed at full
    /// size, the horizontal temps reduced in x, near and blur reduced in
    /// both. Buffers are reallocated only when the color format changes.
    ///
    /// # Panics
    ///
    /// Panics if `reduced_resolution_factor` is below one or `trim` covers
    /// all of `color`.
    pub fn resize_buffers(
        &mut self,
        rd: &mut dyn RenderDevice,
        color: TextureId,
        reduced_resolution_factor: i32,
        trim: IVec2,
    ) {
        assert!(reduced_resolution_factor >= 1, "reduced resolution factor must be at least 1");
        let info = rd.texture_info(color);
        let extent = trimmed_extent(info.size(), trim);
        let k = reduced_resolution_factor;
        let plus_alpha = info.format.with_alpha();
        let (w, h) = (extent.x as u32, extent.y as u32);
        let (low_w, low_h) = (div_ceil(extent.x, k) as u32, div_ceil(extent.y, k) as u32);

        let packed = match_target(rd, &mut self.packed, &TextureDesc::new("DepthOfField::packed", w, h, plus_alpha));
        let temp_near = match_target(
            rd,
            &mut self.temp_near,
            &TextureDesc::new("DepthOfField::tempNear", low_w, h, plus_alpha),
        );
        let temp_blur = match_target(
            rd,
            &mut self.temp_blur,
            &TextureDesc::new("DepthOfField::tempBlur", low_w, h, plus_alpha),
        );
        let near = match_target(
            rd,
            &mut self.near,
            &TextureDesc::new("DepthOfField::near", low_w, low_h, plus_alpha),
        );
        let blur = match_target(
            rd,
            &mut self.blur,
            &TextureDesc::new("DepthOfField::blur", low_w, low_h, info.format),
        );

        Self::attach(rd, &mut self.packed_fb, "DepthOfField::packed", AttachmentPoint::Color0, packed);
        Self::attach(rd, &mut self.horizontal_fb, "DepthOfField::horizontal", AttachmentPoint::Color0, temp_near);
        Self::attach(rd, &mut self.horizontal_fb, "DepthOfField::horizontal", AttachmentPoint::Color1, temp_blur);
        Self::attach(rd, &mut self.vertical_fb, "DepthOfField::vertical", AttachmentPoint::Color0, near);
        Self::attach(rd, &mut self.vertical_fb, "DepthOfField::vertical", AttachmentPoint::Color1, blur);

        self.reduced_resolution_factor = k;
        self.viewport = Rect2D::from_size(w, h);
    }

    fn require<T: Copy>(value: Option<T>) -> T {
        match value {
            Some(v) => v,
            None => panic!("depth of field buffers used before resize_buffers"),
        }
    }

    /// Uniforms of the circle-of-confusion pass for `camera` over `viewport`.
    /// Also returns the far-radius rescale the composite needs.
    ///
    /// # Panics
    ///
    /// Panics under the artist model when either normalization is negative,
    /// i.e. when the near blurry plane is behind the near sharp plane or the
    /// far blurry plane is in front of the far sharp plane.
    pub fn coc_params(camera: &Camera, viewport: &Rect2D, max_coc_radius_pixels: f32) -> (CocParams, f32) {
        let dof = camera.depth_of_field_settings();
        let dimension = camera.fov_axis_dimension(viewport);
        let clip = camera.projection().reconstruct_from_depth_clip_info();
        let mut params = CocParams {
            clip_info: clip.extend(0.0).to_array(),
            closest_near_z: camera.closest_near_plane_z_for_depth_of_field(),
            ..Default::default()
        };
        let mut far_radius_rescale = 1.0;
        match dof.effective_model() {
            DepthOfFieldModel::None => {}
            DepthOfFieldModel::Artist => {
                let near_scale =
                    dof.near_blur_radius_fraction() / (dof.near_blurry_plane_z() - dof.near_sharp_plane_z());
                assert!(near_scale >= 0.0, "near normalization must be a non-negative factor");
                let far_scale =
                    dof.far_blur_radius_fraction() / (dof.far_sharp_plane_z() - dof.far_blurry_plane_z());
                assert!(far_scale >= 0.0, "far normalization must be a non-negative factor");

                let to_normalized = dimension / max_coc_radius_pixels;
                params.model = 1;
                params.near_sharp_z = dof.near_sharp_plane_z();
                params.near_scale = near_scale * to_normalized;
                params.near_max = dof.near_blur_radius_fraction() * to_normalized;
                params.far_sharp_z = dof.far_sharp_plane_z();
                params.far_scale = far_scale * to_normalized;
                params.far_max = dof.far_blur_radius_fraction() * to_normalized;
                far_radius_rescale = dof.far_blur_radius_fraction().max(dof.near_blur_radius_fraction())
                    / dof.far_blur_radius_fraction().max(1e-4);
            }
            DepthOfFieldModel::Physical => {
                params.model = 2;
                params.focus_z = dof.focus_plane_z();
                params.physical_scale = camera.image_plane_pixels_per_meter(viewport) * dof.lens_radius()
                    / (dof.focus_plane_z().abs() * max_coc_radius_pixels);
            }
        }
        (params, far_radius_rescale)
    }

    /// Writes `(rgb, encoded radius)` for every trimmed pixel into the packed
    /// buffer.
    pub fn compute_coc(
        &mut self,
        rd: &mut dyn RenderDevice,
        color: TextureId,
        color_trim: IVec2,
        depth: TextureId,
        depth_trim: IVec2,
        camera: &Camera,
    ) {
        let viewport = self.viewport;
        self.max_coc_radius_pixels = normalization_radius(camera, &viewport);
        let (mut params, far_radius_rescale) = Self::coc_params(camera, &viewport, self.max_coc_radius_pixels);
        params.color_offset = color_trim.to_array();
        params.depth_offset = depth_trim.to_array();
        self.far_radius_rescale = far_radius_rescale;
        log::debug!(
            "DoF CoC: max radius {} px, far rescale {}",
            self.max_coc_radius_pixels,
            far_radius_rescale
        );

        rd.push_2d(Some(Self::require(self.packed_fb)));
        rd.clear(Vec4::ZERO);
        rd.launch(
            Kernel::CircleOfConfusion,
            &Args::new()
                .texture(slot::COLOR, color)
                .texture(slot::DEPTH, depth)
                .uniforms(&params)
                .rect(viewport),
        );
        rd.pop_2d();
    }

    fn blur_pass(
        &self,
        rd: &mut dyn RenderDevice,
        source: TextureId,
        near_source: TextureId,
        output: FramebufferId,
        horizontal: bool,
        near_blur_radius: i32,
    ) {
        rd.push_2d(Some(output));
        rd.clear(Vec4::ZERO);
        let viewport = rd.viewport();
        rd.launch(
            Kernel::DofBlur,
            &Args::new()
                .texture(slot::SOURCE, source)
                .texture(slot::NEAR_SOURCE, near_source)
                .uniforms(&DofBlurParams {
                    horizontal: horizontal as i32,
                    max_coc_radius_pixels: self.max_coc_radius_pixels as i32,
                    low_resolution_factor: self.reduced_resolution_factor,
                    near_blur_radius_pixels: near_blur_radius,
                    inv_near_blur_radius_pixels: 1.0 / (near_blur_radius as f32).max(1e-4),
                    ..Default::default()
                })
                .rect(viewport),
        );
        rd.pop_2d();
    }

    /// Horizontal then vertical blur from the packed buffer.
    pub fn blur(&mut self, rd: &mut dyn RenderDevice, camera: &Camera) {
        let near_radius = near_blur_radius_pixels(camera, &self.viewport, self.reduced_resolution_factor);
        log::trace!("DoF near blur radius {near_radius} px");
        let packed = Self::require(self.packed);
        self.blur_pass(rd, packed, packed, Self::require(self.horizontal_fb), true, near_radius);
        self.blur_pass(
            rd,
            Self::require(self.temp_blur),
            Self::require(self.temp_near),
            Self::require(self.vertical_fb),
            false,
            near_radius,
        );
    }

    /// Blends packed, blur and near into the bound framebuffer, leaving the
    /// guard band cleared.
    pub fn composite(&mut self, rd: &mut dyn RenderDevice, trim: IVec2, debug: DebugOption) {
        assert!(self.far_radius_rescale >= 0.0);
        rd.push_2d(None);
        rd.clear(Vec4::ZERO);
        rd.set_guard_band_clip(trim);
        let viewport = rd.viewport();
        rd.launch(
            Kernel::DofComposite,
            &Args::new()
                .texture(slot::PACKED, Self::require(self.packed))
                .texture(slot::BLUR, Self::require(self.blur))
                .texture(slot::NEAR, Self::require(self.near))
                .uniforms(&DofCompositeParams {
                    output_offset: trim.to_array(),
                    low_resolution_factor: self.reduced_resolution_factor,
                    debug_option: debug.shader_index(),
                    far_radius_rescale: self.far_radius_rescale,
                    max_coc_radius_pixels: self.max_coc_radius_pixels,
                    ..Default::default()
                })
                .rect(viewport.inset(trim.as_vec2())),
        );
        rd.pop_2d();
    }

    /// The per-effect path: CoC, both blur passes, composite into the bound
    /// framebuffer.
    pub fn apply(
        &mut self,
        rd: &mut dyn RenderDevice,
        color: TextureId,
        depth: TextureId,
        camera: &Camera,
        trim: IVec2,
        debug: DebugOption,
    ) {
        rd.push_debug_group("DepthOfField::apply");
        let k = camera.depth_of_field_settings().reduced_resolution_factor();
        self.resize_buffers(rd, color, k, trim);
        self.compute_coc(rd, color, trim, depth, trim, camera);
        self.blur(rd, camera);
        self.composite(rd, trim, debug);
        rd.pop_debug_group();
    }

    pub fn packed(&self) -> Option<TextureId> {
        self.packed
    }

    pub fn near(&self) -> Option<TextureId> {
        self.near
    }

    pub fn blur_buffer(&self) -> Option<TextureId> {
        self.blur
    }

    pub fn temp_near(&self) -> Option<TextureId> {
        self.temp_near
    }

    pub fn temp_blur(&self) -> Option<TextureId> {
        self.temp_blur
    }

    pub fn max_coc_radius_pixels(&self) -> f32 {
        self.max_coc_radius_pixels
    }

    pub fn far_radius_rescale(&self) -> f32 {
        self.far_radius_rescale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ImageFormat;
    use crate::software::SoftwareDevice;

    fn artist_camera() -> Camera {
        let mut camera = Camera::new("test");
        let dof = camera.depth_of_field_settings_mut();
        dof.set_enabled(true);
        dof.set_model(DepthOfFieldModel::Artist);
        camera
    }

    #[test]
    fn test_coc_encoding_round_trip() {
        for r in [-7.0, -0.5, 0.0, 3.25, 7.0] {
            let back = decode_coc_radius(encode_coc_radius(r, 7.0), 7.0);
            assert!((back - r).abs() < 1e-5);
        }
        assert_eq!(encode_coc_radius(-7.0, 7.0), 0.0);
        assert_eq!(encode_coc_radius(7.0, 7.0), 1.0);
    }

    #[test]
    fn test_buffer_sizes_round_up() {
        let mut rd = SoftwareDevice::new();
        let color = rd.create_texture(&TextureDesc::new("color", 101, 77, ImageFormat::RGB16F));
        let mut dof = DepthOfFieldBufferPipeline::new();
        dof.resize_buffers(&mut rd, color, 3, IVec2::new(2, 1));

        let size = |t: Option<TextureId>| rd.texture_info(t.unwrap()).size();
        assert_eq!(size(dof.packed()), IVec2::new(97, 75));
        assert_eq!(size(dof.temp_near()), IVec2::new(33, 75));
        assert_eq!(size(dof.near()), IVec2::new(33, 25));
        assert_eq!(size(dof.blur_buffer()), IVec2::new(33, 25));
        assert_eq!(rd.texture_info(dof.packed().unwrap()).format, ImageFormat::RGBA16F);
        assert_eq!(rd.texture_info(dof.blur_buffer().unwrap()).format, ImageFormat::RGB16F);
    }

    #[test]
    fn test_format_change_reallocates() {
        let mut rd = SoftwareDevice::new();
        let a = rd.create_texture(&TextureDesc::new("a", 64, 64, ImageFormat::RGB8));
        let b = rd.create_texture(&TextureDesc::new("b", 32, 32, ImageFormat::RGB8));
        let c = rd.create_texture(&TextureDesc::new("c", 32, 32, ImageFormat::RGBA16F));
        let mut dof = DepthOfFieldBufferPipeline::new();
        dof.resize_buffers(&mut rd, a, 2, IVec2::ZERO);
        let created = rd.stats().textures_created;

        dof.resize_buffers(&mut rd, b, 2, IVec2::ZERO);
        assert_eq!(rd.stats().textures_created, created);
        assert_eq!(rd.stats().textures_resized, 5);

        dof.resize_buffers(&mut rd, c, 2, IVec2::ZERO);
        assert_eq!(rd.stats().textures_created, created + 5);
        assert_eq!(rd.stats().textures_destroyed, 5);
    }

    #[test]
    fn test_artist_params_and_rescale() {
        let mut camera = artist_camera();
        let dof = camera.depth_of_field_settings_mut();
        dof.set_near_blur_radius_fraction(0.02);
        dof.set_far_blur_radius_fraction(0.005);
        let viewport = Rect2D::from_size(1000, 500);
        let max = normalization_radius(&camera, &viewport);
        assert_eq!(max, 20.0);
        let (params, rescale) = DepthOfFieldBufferPipeline::coc_params(&camera, &viewport, max);
        assert_eq!(params.model, 1);
        assert!((params.near_max - 1.0).abs() < 1e-6);
        assert!((params.far_max - 0.25).abs() < 1e-6);
        assert!((rescale - 4.0).abs() < 1e-4);
    }

    #[test]
    #[should_panic(expected = "near normalization")]
    fn test_inverted_near_planes_panic() {
        let mut camera = artist_camera();
        camera.depth_of_field_settings_mut().set_near_blurry_plane_z(-5.0);
        let viewport = Rect2D::from_size(100, 100);
        DepthOfFieldBufferPipeline::coc_params(&camera, &viewport, 2.0);
    }

    #[test]
    fn test_physical_params_scale() {
        let mut camera = Camera::new("test");
        camera.depth_of_field_settings_mut().set_enabled(true);
        let viewport = Rect2D::from_size(800, 600);
        let (params, rescale) = DepthOfFieldBufferPipeline::coc_params(&camera, &viewport, 4.0);
        assert_eq!(params.model, 2);
        assert_eq!(rescale, 1.0);
        // Normalized radius times the max radius is the camera's CoC.
        let z = -30.0;
        let expected = camera.circle_of_confusion_radius_pixels(z, &viewport);
        let normalized = params.physical_scale * (1.0 - params.focus_z / z);
        assert!((normalized * 4.0 - expected).abs() < 1e-3);
    }

    #[test]
    fn test_near_radius_threshold() {
        let mut camera = artist_camera();
        camera.depth_of_field_settings_mut().set_near_blur_radius_fraction(0.002);
        let viewport = Rect2D::from_size(1000, 1000);
        // 2 px of near blur survives a 3x reduction but not a 4x one.
        assert_eq!(near_blur_radius_pixels(&camera, &viewport, 3), 2);
        assert_eq!(near_blur_radius_pixels(&camera, &viewport, 4), 0);
        // Clamped by the viewport fraction limit.
        camera.depth_of_field_settings_mut().set_near_blur_radius_fraction(0.5);
        assert_eq!(near_blur_radius_pixels(&camera, &viewport, 1), 30);
    }

    #[test]
    fn test_in_focus_scene_is_unchanged() {
        let mut rd = SoftwareDevice::new();
        let mut camera = Camera::new("test");
        camera.depth_of_field_settings_mut().set_enabled(true);
        camera.depth_of_field_settings_mut().set_lens_radius(0.0);

        let color = rd.create_texture(&TextureDesc::new("color", 8, 8, ImageFormat::RGBA32F));
        let pixels: Vec<f32> = (0..64).flat_map(|i| [i as f32 / 64.0, 0.5, 1.0, 1.0]).collect();
        rd.write_texture(color, &pixels);
        let depth = rd.create_texture(&TextureDesc::new("depth", 8, 8, ImageFormat::R32F));
        rd.write_texture(depth, &[0.5; 64]);
        let out = rd.create_texture(&TextureDesc::new("out", 8, 8, ImageFormat::RGBA32F));
        let fb = rd.create_framebuffer("out");
        rd.set_attachment(fb, AttachmentPoint::Color0, Some(out));
        rd.set_framebuffer(Some(fb));

        let mut dof = DepthOfFieldBufferPipeline::new();
        dof.apply(&mut rd, color, depth, &camera, IVec2::ZERO, DebugOption::None);
        for i in 0..64u32 {
            assert_eq!(rd.read_pixel(out, i % 8, i / 8), rd.read_pixel(color, i % 8, i / 8));
        }
        assert_eq!(
            rd.stats().launches,
            vec![Kernel::CircleOfConfusion, Kernel::DofBlur, Kernel::DofBlur, Kernel::DofComposite]
        );
    }
}
