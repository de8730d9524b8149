//! Per-frame orchestration of motion blur and depth of field.

use aperture_gpu_shared::kernels::slot;
use aperture_gpu_shared::uniforms::{GatherParams, UniversalGatherParams, RANDOM_BUFFER_SIZE};
use aperture_gpu_shared::Kernel;
use glam::{IVec2, Vec4};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::camera::Camera;
use crate::depth_of_field::{DebugOption, DepthOfFieldBufferPipeline};
use crate::device::{
    match_target, trimmed_extent, Args, AttachmentPoint, FramebufferId, RenderDevice, TextureDesc, TextureId,
};
use crate::format::ImageFormat;
use crate::geometry::{LineSegment2D, Rect2D};
use crate::settings::GatherAlgorithm;
use crate::tile_velocity::TileVelocityReducer;

/// Rings of the lens disk the combined gather samples.
const DISK_RINGS: i32 = 6;

const DEFAULT_SEED: u64 = 0x6d62_646f_6621;

/// What `apply` will do for a camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlurState {
    /// Copy through, no blur passes.
    Disabled,
    /// Motion gather; the per-effect depth-of-field passes follow when
    /// `legacy_depth_of_field` is set.
    MotionOnly { legacy_depth_of_field: bool },
    /// One gather over velocity tiles and the packed CoC buffer.
    Combined,
}

/// Smallest odd number not below `n`.
pub fn next_odd(n: i32) -> i32 {
    n + 1 - (n & 1)
}

/// Largest blur radius the tiles support, in pixels.
pub fn max_blur_radius_pixels(camera: &Camera, viewport: &Rect2D) -> i32 {
    let dimension = camera.fov_axis_dimension(viewport);
    let diameter_fraction = camera.motion_blur_settings().max_blur_diameter_fraction();
    ((dimension * diameter_fraction / 2.0).ceil() as i32).max(4)
}

pub struct UniversalBlur {
    seed: u64,
    random_buffer: Option<TextureId>,
    cached_src: Option<TextureId>,
    intermediate: Option<TextureId>,
    intermediate_fb: Option<FramebufferId>,
    tiles: TileVelocityReducer,
    depth_of_field: DepthOfFieldBufferPipeline,
    debug_show_tiles: bool,
    tile_overlay: Vec<LineSegment2D>,
}

impl Default for UniversalBlur {
    fn default() -> Self {
        Self::new()
    }
}

impl UniversalBlur {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    /// The seed drives the jitter pattern of the random buffer.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            random_buffer: None,
            cached_src: None,
            intermediate: None,
            intermediate_fb: None,
            tiles: TileVelocityReducer::new(),
            depth_of_field: DepthOfFieldBufferPipeline::new(),
            debug_show_tiles: false,
            tile_overlay: Vec::new(),
        }
    }

    pub fn state_for(camera: &Camera) -> BlurState {
        let settings = camera.universal_blur_settings();
        if !settings.enabled() {
            return BlurState::Disabled;
        }
        let depth_of_field = camera.depth_of_field_settings().is_active();
        match settings.gather_algorithm() {
            GatherAlgorithm::Combined if depth_of_field => BlurState::Combined,
            _ => BlurState::MotionOnly {
                legacy_depth_of_field: depth_of_field,
            },
        }
    }

    pub fn set_debug_show_tiles(&mut self, show: bool) {
        self.debug_show_tiles = show;
    }

    pub fn debug_show_tiles(&self) -> bool {
        self.debug_show_tiles
    }

    /// Tile grid and neighborhood velocities of the last frame, when
    /// tile display is on.
    pub fn tile_overlay(&self) -> &[LineSegment2D] {
        &self.tile_overlay
    }

    pub fn tiles(&self) -> &TileVelocityReducer {
        &self.tiles
    }

    pub fn depth_of_field(&self) -> &DepthOfFieldBufferPipeline {
        &self.depth_of_field
    }

    pub fn random_buffer(&self) -> Option<TextureId> {
        self.random_buffer
    }

    pub fn cached_source(&self) -> Option<TextureId> {
        self.cached_src
    }

    fn ensure_random_buffer(&mut self, rd: &mut dyn RenderDevice) -> TextureId {
        if let Some(texture) = self.random_buffer {
            return texture;
        }
        let size = RANDOM_BUFFER_SIZE as u32;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let texels: Vec<f32> = (0..size * size)
            .map(|_| rng.gen_range(0u8..=255) as f32 / 255.0)
            .collect();
        let texture = rd.create_texture(&TextureDesc::new("UniversalBlur::random", size, size, ImageFormat::R8));
        rd.write_texture(texture, &texels);
        log::info!("Created {size}x{size} random buffer (seed {:#x})", self.seed);
        self.random_buffer = Some(texture);
        texture
    }

    /// Returns a trim-free color source safe to read while the bound
    /// framebuffer is written.
    fn guarded_source(&mut self, rd: &mut dyn RenderDevice, color: TextureId, trim: IVec2) -> TextureId {
        if rd.bound_color0() != Some(color) && trim == IVec2::ZERO {
            return color;
        }
        let info = rd.texture_info(color);
        let extent = trimmed_extent(info.size(), trim);
        let cached = match_target(
            rd,
            &mut self.cached_src,
            &TextureDesc::new("UniversalBlur::src", extent.x as u32, extent.y as u32, info.format)
                .with_encoding(info.encoding),
        );
        rd.copy_texture(color, cached, trim);
        cached
    }

    /// Target for the motion gather when depth of field runs after it.
    fn intermediate_target(&mut self, rd: &mut dyn RenderDevice, color: TextureId) -> FramebufferId {
        let info = rd.texture_info(color);
        let texture = match_target(
            rd,
            &mut self.intermediate,
            &TextureDesc::new("UniversalBlur::intermediate", info.width, info.height, info.format)
                .with_encoding(info.encoding),
        );
        let fb = *self
            .intermediate_fb
            .get_or_insert_with(|| rd.create_framebuffer("UniversalBlur::intermediate"));
        rd.set_attachment(fb, AttachmentPoint::Color0, Some(texture));
        fb
    }

    /// Blurs `color` into the currently bound framebuffer.
    ///
    /// `trim` is the guard band of `color`, `depth` and `velocity`; it is
    /// excluded from sampling and left cleared in the output.
    ///
    /// # Panics
    ///
    /// Panics if depth of field is active and `depth` is `None`, if `trim`
    /// covers all of `color`, and under the artist model when its plane
    /// markers are out of order.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &mut self,
        rd: &mut dyn RenderDevice,
        color: TextureId,
        depth: Option<TextureId>,
        velocity: TextureId,
        camera: &Camera,
        trim: IVec2,
        debug: DebugOption,
    ) {
        let state = Self::state_for(camera);
        if state == BlurState::Disabled {
            if let Some(target) = rd.bound_color0() {
                if target != color {
                    rd.copy_texture(color, target, trim);
                }
            }
            return;
        }
        let dof_depth = match state {
            BlurState::Combined | BlurState::MotionOnly { legacy_depth_of_field: true } => match depth {
                Some(d) => Some(d),
                None => panic!("depth buffer is required when depth of field is active"),
            },
            _ => None,
        };

        rd.push_debug_group("UniversalBlur::apply");
        let info = rd.texture_info(color);
        let extent = trimmed_extent(info.size(), trim);
        let viewport = Rect2D::from_size(extent.x as u32, extent.y as u32);

        let motion = camera.motion_blur_settings();
        let max_blur_radius = max_blur_radius_pixels(camera, &viewport);
        let num_samples_odd = next_odd(motion.num_samples());
        let exposure_time = if motion.enabled() { motion.exposure_fraction() } else { 0.0 };
        log::debug!(
            "UniversalBlur {state:?}: max blur {max_blur_radius} px, {num_samples_odd} samples, exposure {exposure_time}"
        );

        let random = self.ensure_random_buffer(rd);
        let src = self.guarded_source(rd, color, trim);

        if let (BlurState::Combined, Some(depth_buffer)) = (state, dof_depth) {
            let k = camera.depth_of_field_settings().reduced_resolution_factor();
            self.depth_of_field.resize_buffers(rd, color, k, trim);
            self.depth_of_field.compute_coc(rd, src, IVec2::ZERO, depth_buffer, trim, camera);
        }

        self.tiles.reduce(rd, velocity, max_blur_radius, trim);
        let neighbor = match self.tiles.neighbor_min_max() {
            Some(texture) => texture,
            None => panic!("tile reduction produced no neighborhood buffer"),
        };

        let mut args = Args::new()
            .texture(slot::COLOR, src)
            .texture(slot::VELOCITY, velocity)
            .texture(slot::NEIGHBOR_MIN_MAX, neighbor)
            .texture(slot::RANDOM, random);
        if let Some(depth_buffer) = depth {
            args.set_texture(slot::DEPTH, depth_buffer);
        }

        match state {
            BlurState::Combined => {
                let packed = match self.depth_of_field.packed() {
                    Some(texture) => texture,
                    None => panic!("combined gather needs the packed buffer"),
                };
                args.set_texture(slot::PACKED, packed);
                let params = UniversalGatherParams {
                    output_offset: trim.to_array(),
                    trim: trim.to_array(),
                    max_blur_radius,
                    num_samples_odd,
                    exposure_time,
                    has_depth: depth.is_some() as i32,
                    max_coc_radius_pixels: self.depth_of_field.max_coc_radius_pixels() as i32,
                    coc_rings: DISK_RINGS,
                    ..Default::default()
                };
                gather(rd, Kernel::UniversalGather, args.uniforms(&params), trim);
            }
            BlurState::MotionOnly { legacy_depth_of_field } => {
                let params = GatherParams {
                    output_offset: trim.to_array(),
                    trim: trim.to_array(),
                    max_blur_radius,
                    num_samples_odd,
                    exposure_time,
                    has_depth: depth.is_some() as i32,
                };
                if let (true, Some(depth_buffer)) = (legacy_depth_of_field, dof_depth) {
                    let intermediate_fb = self.intermediate_target(rd, color);
                    rd.push_2d(Some(intermediate_fb));
                    gather(rd, Kernel::MotionGather, args.uniforms(&params), trim);
                    rd.pop_2d();
                    let intermediate = match self.intermediate {
                        Some(texture) => texture,
                        None => panic!("intermediate target missing"),
                    };
                    self.depth_of_field.apply(rd, intermediate, depth_buffer, camera, trim, debug);
                } else {
                    gather(rd, Kernel::MotionGather, args.uniforms(&params), trim);
                }
            }
            BlurState::Disabled => {}
        }

        if self.debug_show_tiles {
            let size = rd.viewport().size();
            self.tile_overlay = self.tiles.debug_tile_overlay(&*rd, size);
        } else {
            self.tile_overlay.clear();
        }
        rd.pop_debug_group();
    }
}

/// Clears the bound framebuffer and gathers inside its guard band.
fn gather(rd: &mut dyn RenderDevice, kernel: Kernel, args: Args, trim: IVec2) {
    rd.push_2d(None);
    rd.clear(Vec4::ZERO);
    rd.set_guard_band_clip(trim);
    let viewport = rd.viewport();
    rd.launch(kernel, &args.rect(viewport));
    rd.pop_2d();
}
