//! Synthetic G-buffer: a checkered backdrop far away, a mid-distance wall
//! and a bright bar sweeping across the foreground.

use aperture_render::{Camera, Rect2D};
use glam::{Vec2, Vec3};

pub const BACKDROP_Z: f32 = -60.0;
pub const WALL_Z: f32 = -10.0;
pub const BAR_Z: f32 = -2.0;

/// Per-pixel buffers, row major, decoded values.
pub struct SceneBuffers {
    pub width: u32,
    pub height: u32,
    /// RGBA.
    pub color: Vec<f32>,
    /// Hardware depth in [0, 1].
    pub depth: Vec<f32>,
    /// Screen-space motion in pixels per frame.
    pub velocity: Vec<f32>,
}

/// `bar_speed` is the foreground bar's motion in pixels per frame; `trim`
/// pixels of guard band are added on every side.
pub fn build(camera: &Camera, width: u32, height: u32, trim: u32, bar_speed: f32) -> SceneBuffers {
    let full_w = width + 2 * trim;
    let full_h = height + 2 * trim;
    let viewport = Rect2D::from_size(width, height);
    let projection = camera.projection();

    let mut color = Vec::with_capacity((full_w * full_h * 4) as usize);
    let mut depth = Vec::with_capacity((full_w * full_h) as usize);
    let mut velocity = Vec::with_capacity((full_w * full_h * 2) as usize);

    let bar = (width as f32 * 0.35, width as f32 * 0.45);
    let wall = (height as f32 * 0.55, height as f32 * 0.8);

    for fy in 0..full_h {
        for fx in 0..full_w {
            let p = Vec2::new(fx as f32 - trim as f32, fy as f32 - trim as f32) + 0.5;
            let (rgb, z, motion) = if p.x >= bar.0 && p.x < bar.1 {
                (Vec3::new(4.0, 3.2, 1.5), BAR_Z, Vec2::new(bar_speed, 0.0))
            } else if p.y >= wall.0 && p.y < wall.1 {
                let brick = ((p.x / 12.0).floor() as i32 + (p.y / 6.0).floor() as i32) & 1;
                let shade = if brick == 0 { 0.55 } else { 0.35 };
                (Vec3::new(shade, 0.25, 0.2), WALL_Z, Vec2::ZERO)
            } else {
                let checker = ((p.x / 16.0).floor() as i32 + (p.y / 16.0).floor() as i32) & 1;
                let v = if checker == 0 { 0.9 } else { 0.15 };
                let sky = 1.0 - p.y / viewport.height();
                (Vec3::new(v * 0.6, v * 0.8, v * (0.7 + 0.3 * sky)), BACKDROP_Z, Vec2::ZERO)
            };
            color.extend_from_slice(&[rgb.x, rgb.y, rgb.z, 1.0]);
            depth.push(projection.camera_z_to_depth(z));
            velocity.extend_from_slice(&motion.to_array());
        }
    }

    SceneBuffers {
        width: full_w,
        height: full_h,
        color,
        depth,
        velocity,
    }
}
