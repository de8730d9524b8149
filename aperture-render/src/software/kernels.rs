//! Reference implementations of the compositor kernels.
//!
//! Each kernel is evaluated per output pixel `p` from decoded inputs and
//! returns up to two colors (COLOR0, COLOR1). The WGSL fragment shaders in
//! `aperture-gpu-shared` follow the same arithmetic.

use aperture_gpu_shared::uniforms::{
    CocParams, CopyParams, DofBlurParams, DofCompositeParams, GatherParams, NeighborMinMaxParams,
    TileMinMaxParams, UniversalGatherParams, MAX_KERNEL_INPUTS, RANDOM_BUFFER_SIZE,
};
use aperture_gpu_shared::Kernel;
use glam::{IVec2, Vec2, Vec3, Vec4, Vec4Swizzles};

use super::image::SoftwareImage;
use crate::device::Args;

/// Depth difference over which the gather's soft depth test ramps.
const SOFT_DEPTH_EXTENT: f32 = 0.001;

pub(crate) struct Inputs<'a> {
    images: [Option<&'a SoftwareImage>; MAX_KERNEL_INPUTS],
}

impl<'a> Inputs<'a> {
    pub(crate) fn new(images: [Option<&'a SoftwareImage>; MAX_KERNEL_INPUTS]) -> Self {
        Self { images }
    }

    fn load(&self, slot: usize, p: IVec2) -> Vec4 {
        self.images[slot].map_or(Vec4::ZERO, |image| image.load(p))
    }

    fn has(&self, slot: usize) -> bool {
        self.images[slot].is_some()
    }
}

/// A kernel with its uniform block decoded.
pub(crate) enum Prepared {
    Copy(CopyParams),
    TileMinMax(TileMinMaxParams),
    NeighborMinMax(NeighborMinMaxParams),
    MotionGather(GatherParams),
    UniversalGather(UniversalGatherParams),
    CircleOfConfusion(CocParams),
    DofBlur(DofBlurParams),
    DofComposite(DofCompositeParams),
}

impl Prepared {
    pub(crate) fn new(kernel: Kernel, args: &Args) -> Self {
        match kernel {
            Kernel::Copy => Prepared::Copy(args.read_uniforms()),
            Kernel::TileMinMax => Prepared::TileMinMax(args.read_uniforms()),
            Kernel::NeighborMinMax => Prepared::NeighborMinMax(args.read_uniforms()),
            Kernel::MotionGather => Prepared::MotionGather(args.read_uniforms()),
            Kernel::UniversalGather => Prepared::UniversalGather(args.read_uniforms()),
            Kernel::CircleOfConfusion => Prepared::CircleOfConfusion(args.read_uniforms()),
            Kernel::DofBlur => Prepared::DofBlur(args.read_uniforms()),
            Kernel::DofComposite => Prepared::DofComposite(args.read_uniforms()),
        }
    }

    pub(crate) fn shade(&self, inputs: &Inputs, p: IVec2) -> [Vec4; 2] {
        match self {
            Prepared::Copy(params) => [inputs.load(0, p + IVec2::from(params.offset)), Vec4::ZERO],
            Prepared::TileMinMax(params) => [tile_min_max(params, inputs, p), Vec4::ZERO],
            Prepared::NeighborMinMax(params) => [neighbor_min_max(params, inputs, p), Vec4::ZERO],
            Prepared::MotionGather(params) => [motion_gather(params, inputs, p), Vec4::ZERO],
            Prepared::UniversalGather(params) => [universal_gather(params, inputs, p), Vec4::ZERO],
            Prepared::CircleOfConfusion(params) => [circle_of_confusion(params, inputs, p), Vec4::ZERO],
            Prepared::DofBlur(params) => dof_blur(params, inputs, p),
            Prepared::DofComposite(params) => [dof_composite(params, inputs, p), Vec4::ZERO],
        }
    }
}

// ============================================================================
// Velocity tiles
// ============================================================================

struct MinMax {
    max_velocity: Vec2,
    max_length_squared: f32,
    min_speed: f32,
}

impl MinMax {
    fn new() -> Self {
        Self {
            max_velocity: Vec2::ZERO,
            max_length_squared: -1.0,
            min_speed: f32::INFINITY,
        }
    }

    fn add(&mut self, velocity: Vec2, speed: f32) {
        let length_squared = velocity.length_squared();
        if length_squared > self.max_length_squared {
            self.max_length_squared = length_squared;
            self.max_velocity = velocity;
        }
        self.min_speed = self.min_speed.min(speed);
    }

    fn finish(&self) -> Vec4 {
        let min_speed = if self.min_speed.is_finite() { self.min_speed } else { 0.0 };
        Vec4::new(self.max_velocity.x, self.max_velocity.y, min_speed, 1.0)
    }
}

/// Output (x, y) reduces input row x over the tile of columns starting at
/// y * R, so two launches produce a full R x R reduction.
fn tile_min_max(params: &TileMinMaxParams, inputs: &Inputs, p: IVec2) -> Vec4 {
    let radius = params.max_blur_radius;
    let shift = IVec2::from(params.input_shift);
    let mut acc = MinMax::new();
    for t in 0..radius {
        let column = p.y * radius + t;
        if column >= params.input_extent[0] {
            break;
        }
        let v = inputs.load(0, IVec2::new(column, p.x) + shift);
        let speed = if params.input_has_min_speed != 0 { v.z } else { v.xy().length() };
        acc.add(v.xy(), speed);
    }
    acc.finish()
}

fn neighbor_min_max(params: &NeighborMinMaxParams, inputs: &Inputs, p: IVec2) -> Vec4 {
    let last = IVec2::from(params.tile_count) - IVec2::ONE;
    let mut acc = MinMax::new();
    for dy in -1..=1 {
        for dx in -1..=1 {
            let tile = (p + IVec2::new(dx, dy)).clamp(IVec2::ZERO, last.max(IVec2::ZERO));
            let v = inputs.load(0, tile);
            acc.add(v.xy(), v.z);
        }
    }
    acc.finish()
}

// ============================================================================
// Gathers
// ============================================================================

fn clamp_length(v: Vec2, max: f32) -> Vec2 {
    let length = v.length();
    if length > max {
        v * (max / length)
    } else {
        v
    }
}

fn cone(distance: f32, radius: f32) -> f32 {
    (1.0 - distance / radius.max(1e-4)).clamp(0.0, 1.0)
}

fn cylinder(distance: f32, radius: f32) -> f32 {
    1.0 - smoothstep(0.95 * radius, 1.05 * radius, distance)
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// 1 when `a` is in front of `b` (smaller depth), ramping to 0.
fn soft_depth_compare(a: f32, b: f32) -> f32 {
    (1.0 - (a - b) / SOFT_DEPTH_EXTENT).clamp(0.0, 1.0)
}

/// Shared motion part of both gathers. Slots: 0 color, 1 velocity,
/// 2 neighbor min-max, `random_slot`, `depth_slot`.
struct MotionTaps {
    output_offset: IVec2,
    trim: IVec2,
    max_blur_radius: i32,
    num_samples_odd: i32,
    exposure_time: f32,
    has_depth: bool,
    random_slot: usize,
    depth_slot: usize,
}

impl MotionTaps {
    /// Half-extent of the blur along a velocity, in pixels.
    fn blur_vector(&self, velocity: Vec2) -> Vec2 {
        clamp_length(velocity * self.exposure_time * 0.5, self.max_blur_radius as f32)
    }

    fn jitter(&self, inputs: &Inputs, q: IVec2) -> f32 {
        let cell = IVec2::new(q.x.rem_euclid(RANDOM_BUFFER_SIZE), q.y.rem_euclid(RANDOM_BUFFER_SIZE));
        inputs.load(self.random_slot, cell).x - 0.5
    }

    fn depth(&self, inputs: &Inputs, q: IVec2) -> f32 {
        inputs.load(self.depth_slot, q + self.trim).x
    }

    /// Motion-blurred color at trimmed pixel `q`, reading colors through `color_at`.
    fn gather(&self, inputs: &Inputs, q: IVec2, color_at: impl Fn(IVec2) -> Vec3) -> Vec3 {
        let center = color_at(q);
        let tile = q.div_euclid(IVec2::splat(self.max_blur_radius.max(1)));
        let neighborhood = self.blur_vector(inputs.load(2, tile).xy());
        let neighborhood_length = neighborhood.length();
        if neighborhood_length < 0.5 {
            return center;
        }

        let center_radius = self.blur_vector(inputs.load(1, q + self.trim).xy()).length().max(0.5);
        let center_depth = if self.has_depth { self.depth(inputs, q) } else { 0.0 };
        let jitter = self.jitter(inputs, q);

        let mut weight_sum = 1.0 / center_radius;
        let mut sum = center * weight_sum;
        let n = self.num_samples_odd;
        for i in 0..n {
            if i == (n - 1) / 2 {
                continue;
            }
            let t = -1.0 + 2.0 * (i as f32 + jitter + 1.0) / (n as f32 + 1.0);
            let s = (q.as_vec2() + neighborhood * t).round().as_ivec2();
            let distance = t.abs() * neighborhood_length;
            let sample_radius = self.blur_vector(inputs.load(1, s + self.trim).xy()).length();

            let (front, back) = if self.has_depth {
                let sample_depth = self.depth(inputs, s);
                (
                    soft_depth_compare(sample_depth, center_depth),
                    soft_depth_compare(center_depth, sample_depth),
                )
            } else {
                (1.0, 1.0)
            };
            let w = front * cone(distance, sample_radius)
                + back * cone(distance, center_radius)
                + 2.0 * cylinder(distance, sample_radius) * cylinder(distance, center_radius);
            weight_sum += w;
            sum += color_at(s) * w;
        }
        sum / weight_sum
    }
}

fn motion_gather(params: &GatherParams, inputs: &Inputs, p: IVec2) -> Vec4 {
    let taps = MotionTaps {
        output_offset: IVec2::from(params.output_offset),
        trim: IVec2::from(params.trim),
        max_blur_radius: params.max_blur_radius,
        num_samples_odd: params.num_samples_odd,
        exposure_time: params.exposure_time,
        has_depth: params.has_depth != 0 && inputs.has(4),
        random_slot: 3,
        depth_slot: 4,
    };
    let q = p - taps.output_offset;
    taps.gather(inputs, q, |s| inputs.load(0, s).xyz()).extend(1.0)
}

fn decode_coc(encoded: f32) -> f32 {
    encoded * 2.0 - 1.0
}

/// Fraction of a pixel at `distance` covered by a disk of `radius`.
fn coverage(distance: f32, radius: f32) -> f32 {
    (radius - distance + 0.5).clamp(0.0, 1.0)
}

/// Radius and tap count of disk ring `ring` (1-based). The first `rings`
/// rings split the center's own radius, at least 1 px apart, so small
/// blurs are resolved. Any further rings span the rest of the worst-case
/// radius, where only samples wide enough to reach the center count.
fn disk_ring(ring: i32, rings: i32, gather_radius: f32, max_coc: f32) -> (f32, i32) {
    if ring <= rings {
        (ring as f32 * gather_radius / rings as f32, 6 * ring)
    } else {
        let outer = (ring - rings) as f32 * (max_coc - gather_radius) / rings as f32;
        (gather_radius + outer, 6 * rings)
    }
}

/// Motion taps first, then a lens-disk gather over the packed buffer in
/// which the center contributes the motion-blurred color. A sample spreads
/// over the center by its own radius when it is nearer, and by the smaller
/// of the two radii otherwise.
fn universal_gather(params: &UniversalGatherParams, inputs: &Inputs, p: IVec2) -> Vec4 {
    let taps = MotionTaps {
        output_offset: IVec2::from(params.output_offset),
        trim: IVec2::from(params.trim),
        max_blur_radius: params.max_blur_radius,
        num_samples_odd: params.num_samples_odd,
        exposure_time: params.exposure_time,
        has_depth: params.has_depth != 0 && inputs.has(5),
        random_slot: 4,
        depth_slot: 5,
    };
    let q = p - taps.output_offset;
    let motion = taps.gather(inputs, q, |s| inputs.load(3, s).xyz());

    let max_coc = params.max_coc_radius_pixels as f32;
    let rings = params.coc_rings.min(params.max_coc_radius_pixels);
    if rings <= 0 {
        return motion.extend(1.0);
    }

    let center_coc = decode_coc(inputs.load(3, q).w) * max_coc;
    let center_weight = 1.0 / center_coc.abs().max(1.0).powi(2);
    let mut weight_sum = center_weight;
    let mut sum = motion * center_weight;
    let angle_jitter = taps.jitter(inputs, q);

    let gather_radius = center_coc.abs().max(rings as f32).min(max_coc);
    let outer_rings = if gather_radius < max_coc { rings } else { 0 };
    for ring in 1..=rings + outer_rings {
        let (ring_radius, count) = disk_ring(ring, rings, gather_radius, max_coc);
        for k in 0..count {
            let angle = std::f32::consts::TAU * (k as f32 + angle_jitter) / count as f32;
            let offset = Vec2::new(angle.cos(), angle.sin()) * ring_radius;
            let s = (q.as_vec2() + offset).round().as_ivec2();
            let sample = inputs.load(3, s);
            let sample_coc = decode_coc(sample.w) * max_coc;
            let reach = if sample_coc < center_coc {
                sample_coc.abs()
            } else {
                sample_coc.abs().min(center_coc.abs())
            };
            let w = coverage(offset.length(), reach) / sample_coc.abs().max(1.0).powi(2);
            weight_sum += w;
            sum += sample.xyz() * w;
        }
    }
    (sum / weight_sum).extend(1.0)
}

// ============================================================================
// Depth of field
// ============================================================================

/// Normalized signed radius in [-1, 1] for camera-space reciprocal depth.
fn normalized_coc(params: &CocParams, inv_z: f32) -> f32 {
    let n = match params.model {
        1 => {
            let z = 1.0 / inv_z;
            if z > params.near_sharp_z {
                -((z - params.near_sharp_z) * params.near_scale).min(params.near_max)
            } else if z < params.far_sharp_z {
                ((params.far_sharp_z - z) * params.far_scale).min(params.far_max)
            } else {
                0.0
            }
        }
        2 => {
            // z' = min(z, closest) is max(1/z, 1/closest) for negative z;
            // (z' - focus) / z' = 1 - focus / z' stays finite at infinity.
            let inv_z = inv_z.max(1.0 / params.closest_near_z);
            params.physical_scale * (1.0 - params.focus_z * inv_z)
        }
        _ => 0.0,
    };
    n.clamp(-1.0, 1.0)
}

fn circle_of_confusion(params: &CocParams, inputs: &Inputs, p: IVec2) -> Vec4 {
    let color = inputs.load(0, p + IVec2::from(params.color_offset));
    let d = inputs.load(1, p + IVec2::from(params.depth_offset)).x;
    let clip = params.clip_info;
    let inv_z = (clip[1] * d + clip[2]) / clip[0];
    let n = normalized_coc(params, inv_z);
    color.xyz().extend(n * 0.5 + 0.5)
}

/// Separable blur writing near (rgb + coverage) to COLOR0 and far (rgb +
/// packed radius passthrough) to COLOR1. Steps are full-resolution source
/// pixels along the pass direction.
fn dof_blur(params: &DofBlurParams, inputs: &Inputs, p: IVec2) -> [Vec4; 2] {
    let k = params.low_resolution_factor.max(1);
    let (direction, center) = if params.horizontal != 0 {
        (IVec2::X, IVec2::new(p.x * k, p.y))
    } else {
        (IVec2::Y, IVec2::new(p.x, p.y * k))
    };
    let max_coc = params.max_coc_radius_pixels as f32;

    let center_sample = inputs.load(0, center);
    let mut far_sum = Vec3::ZERO;
    let mut far_weight = 0.0;
    for delta in -params.max_coc_radius_pixels..=params.max_coc_radius_pixels {
        let sample = inputs.load(0, center + direction * delta);
        let radius = decode_coc(sample.w) * max_coc;
        if radius < 0.0 {
            continue;
        }
        let w = (radius - delta.abs() as f32 + 1.0).clamp(0.0, 1.0);
        far_sum += sample.xyz() * w;
        far_weight += w;
    }
    let far = if far_weight > 0.0 { far_sum / far_weight } else { center_sample.xyz() };
    let blur = far.extend(center_sample.w);

    let near_radius = params.near_blur_radius_pixels;
    if near_radius <= 0 {
        return [Vec4::ZERO, blur];
    }
    let mut near_sum = Vec3::ZERO;
    let mut near_coverage = 0.0;
    for delta in -near_radius..=near_radius {
        let sample = inputs.load(1, center + direction * delta);
        let alpha = if params.horizontal != 0 {
            let radius = decode_coc(sample.w) * max_coc;
            if radius < 0.0 && -radius >= delta.abs() as f32 {
                1.0
            } else {
                0.0
            }
        } else {
            sample.w
        };
        near_sum += sample.xyz() * alpha;
        near_coverage += alpha;
    }
    let near_color = if near_coverage > 0.0 { near_sum / near_coverage } else { Vec3::ZERO };
    let taps = (2 * near_radius + 1) as f32;
    [near_color.extend((near_coverage / taps).clamp(0.0, 1.0)), blur]
}

fn luminance(c: Vec3) -> f32 {
    c.dot(Vec3::new(0.2126, 0.7152, 0.0722))
}

fn dof_composite(params: &DofCompositeParams, inputs: &Inputs, p: IVec2) -> Vec4 {
    let q = p - IVec2::from(params.output_offset);
    let low = q.div_euclid(IVec2::splat(params.low_resolution_factor.max(1)));
    let packed = inputs.load(0, q);
    let blur = inputs.load(1, low).xyz();
    let near = inputs.load(2, low);
    let sharp = packed.xyz();
    let n = decode_coc(packed.w);

    let far_blend = if n > 0.0 { (n * params.far_radius_rescale).clamp(0.0, 1.0) } else { 0.0 };
    let mid_and_far = sharp.lerp(blur, far_blend);
    let result = mid_and_far.lerp(near.xyz(), near.w.clamp(0.0, 1.0));

    let shown = match params.debug_option {
        1 => Vec3::splat(n.abs()),
        2 => {
            let region = if n < -1e-3 {
                Vec3::new(0.0, 0.0, 1.0)
            } else if n > 1e-3 {
                Vec3::new(0.0, 1.0, 0.0)
            } else {
                Vec3::ONE
            };
            region * (0.5 + 0.5 * luminance(sharp))
        }
        3 => near.xyz() * near.w,
        4 => blur,
        5 => sharp,
        6 => mid_and_far,
        7 => Vec3::new((-n).max(0.0), n.max(0.0), 0.0),
        _ => result,
    };
    shown.extend(1.0)
}
