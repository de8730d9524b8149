use bytemuck::{Pod, Zeroable};

/// Number of texture slots a kernel may bind. Sized for the universal gather.
pub const MAX_KERNEL_INPUTS: usize = 6;
/// Number of color attachments a kernel may write (the DoF blur writes two).
pub const MAX_KERNEL_OUTPUTS: usize = 2;
/// Side of the tiled jitter texture read by the gathers.
pub const RANDOM_BUFFER_SIZE: i32 = 32;

/// Per-slot read/write encodings, filled in by the device at launch time.
/// Matches bind group 0, binding 1 of every kernel.
///
/// A stored texel `s` decodes to `s * multiply + add`; a kernel result `v`
/// is stored as `(v - add) / multiply`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct KernelEncodings {
    pub input_multiply: [[f32; 4]; MAX_KERNEL_INPUTS],
    pub input_add: [[f32; 4]; MAX_KERNEL_INPUTS],
    pub output_multiply: [[f32; 4]; MAX_KERNEL_OUTPUTS],
    pub output_add: [[f32; 4]; MAX_KERNEL_OUTPUTS],
}

impl Default for KernelEncodings {
    fn default() -> Self {
        Self {
            input_multiply: [[1.0; 4]; MAX_KERNEL_INPUTS],
            input_add: [[0.0; 4]; MAX_KERNEL_INPUTS],
            output_multiply: [[1.0; 4]; MAX_KERNEL_OUTPUTS],
            output_add: [[0.0; 4]; MAX_KERNEL_OUTPUTS],
        }
    }
}

/// Texture copy with a source shift (used to strip a guard band).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CopyParams {
    pub offset: [i32; 2],
    pub _pad: [i32; 2],
}

/// One 1D tile reduction step. The output is transposed relative to the input.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct TileMinMaxParams {
    /// Offset added to every read (the guard band on the first pass).
    pub input_shift: [i32; 2],
    /// Valid input region, excluding the guard band.
    pub input_extent: [i32; 2],
    pub max_blur_radius: i32,
    /// Nonzero when the input already carries a min-speed channel in B.
    pub input_has_min_speed: i32,
    pub _pad: [i32; 2],
}

/// 3x3 tile neighborhood expansion.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct NeighborMinMaxParams {
    pub tile_count: [i32; 2],
    pub _pad: [i32; 2],
}

/// Motion-only gather.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GatherParams {
    /// Output pixel minus this offset is the trimmed-space pixel.
    pub output_offset: [i32; 2],
    /// Guard band of the velocity and depth buffers.
    pub trim: [i32; 2],
    pub max_blur_radius: i32,
    pub num_samples_odd: i32,
    pub exposure_time: f32,
    pub has_depth: i32,
}

/// Combined motion + depth-of-field gather.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct UniversalGatherParams {
    pub output_offset: [i32; 2],
    pub trim: [i32; 2],
    pub max_blur_radius: i32,
    pub num_samples_odd: i32,
    pub exposure_time: f32,
    pub has_depth: i32,
    pub max_coc_radius_pixels: i32,
    /// Concentric rings of the lens disk sampled around each pixel.
    pub coc_rings: i32,
    pub _pad: [i32; 2],
}

/// Circle-of-confusion pre-pass writing (rgb, encoded radius).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CocParams {
    pub color_offset: [i32; 2],
    pub depth_offset: [i32; 2],
    /// `z = x / (y * d + z)`
    pub clip_info: [f32; 4],
    /// 0 = none, 1 = artist, 2 = physical
    pub model: i32,
    pub near_sharp_z: f32,
    pub near_scale: f32,
    pub near_max: f32,
    pub far_sharp_z: f32,
    pub far_scale: f32,
    pub far_max: f32,
    pub focus_z: f32,
    pub physical_scale: f32,
    pub closest_near_z: f32,
    pub _pad: [f32; 2],
}

/// One separable DoF blur direction. Writes near (COLOR0) and blur (COLOR1).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct DofBlurParams {
    pub horizontal: i32,
    pub max_coc_radius_pixels: i32,
    pub low_resolution_factor: i32,
    pub near_blur_radius_pixels: i32,
    pub inv_near_blur_radius_pixels: f32,
    pub _pad: [f32; 3],
}

/// DoF composite over the bound framebuffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct DofCompositeParams {
    pub output_offset: [i32; 2],
    pub low_resolution_factor: i32,
    pub debug_option: i32,
    pub far_radius_rescale: f32,
    pub max_coc_radius_pixels: f32,
    pub _pad: [f32; 2],
}

/// Camera block for shaders that reconstruct positions or reproject.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CameraUniforms {
    /// World-from-camera transform.
    pub frame: [[f32; 4]; 4],
    pub previous_frame: [[f32; 4]; 4],
    /// Camera space to pixel coordinates, y down.
    pub project_to_pixel: [[f32; 4]; 4],
    pub clip_info: [f32; 4],
    pub proj_info: [f32; 4],
    pub pixel_offset: [f32; 2],
    pub near_plane_z: f32,
    pub far_plane_z: f32,
}
