//! Per-tile velocity reduction for the motion gather.
//!
//! Two launches of the tile kernel reduce R x R tiles (the first transposes
//! into a temp buffer so the second can reuse the same 1D kernel), then a
//! third expands each tile to its 3x3 neighborhood.

use aperture_gpu_shared::kernels::slot;
use aperture_gpu_shared::uniforms::{NeighborMinMaxParams, TileMinMaxParams};
use aperture_gpu_shared::Kernel;
use glam::{IVec2, Vec2};

use crate::device::{
    div_ceil, match_target, trimmed_extent, Args, AttachmentPoint, FramebufferId, RenderDevice, TextureDesc,
    TextureId,
};
use crate::format::{ImageFormat, NumberFormat};
use crate::geometry::LineSegment2D;

#[derive(Default)]
pub struct TileVelocityReducer {
    tile_min_max: Option<TextureId>,
    tile_min_max_temp: Option<TextureId>,
    neighbor_min_max: Option<TextureId>,
    tile_min_max_fb: Option<FramebufferId>,
    tile_min_max_temp_fb: Option<FramebufferId>,
    neighbor_min_max_fb: Option<FramebufferId>,
    /// Trimmed velocity extent of the last update.
    extent: IVec2,
    max_blur_radius: i32,
}

impl TileVelocityReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tile grid for a trimmed extent: `ceil(w / R) x ceil(h / R)`.
    pub fn tile_count(extent: IVec2, max_blur_radius: i32) -> IVec2 {
        IVec2::new(div_ceil(extent.x, max_blur_radius), div_ceil(extent.y, max_blur_radius))
    }

    /// Allocates the three reduction buffers on first use and resizes them
    /// afterwards. Their format adds a min-speed channel to the velocity's
    /// number format.
    ///
    /// # Panics
    ///
    /// Panics if `max_blur_radius` is not positive or `trim` covers all of
    /// `velocity`.
    pub fn update_buffers(
        &mut self,
        rd: &mut dyn RenderDevice,
        velocity: TextureId,
        max_blur_radius: i32,
        trim: IVec2,
    ) {
        assert!(max_blur_radius > 0, "max blur radius must be positive, got {max_blur_radius}");
        let info = rd.texture_info(velocity);
        let extent = trimmed_extent(info.size(), trim);
        let tiles = Self::tile_count(extent, max_blur_radius);

        let format = match info.format.number_format() {
            NumberFormat::Float => ImageFormat::RGB16F,
            NumberFormat::Unorm => ImageFormat::RGB8,
        };
        let encoding = info.encoding.with_blue_from_red();

        let temp = match_target(
            rd,
            &mut self.tile_min_max_temp,
            &TextureDesc::new("MotionBlur::tileMinMaxTemp", extent.y as u32, tiles.x as u32, format)
                .with_encoding(encoding),
        );
        let tile = match_target(
            rd,
            &mut self.tile_min_max,
            &TextureDesc::new("MotionBlur::tileMinMax", tiles.x as u32, tiles.y as u32, format)
                .with_encoding(encoding),
        );
        let neighbor = match_target(
            rd,
            &mut self.neighbor_min_max,
            &TextureDesc::new("MotionBlur::neighborMinMax", tiles.x as u32, tiles.y as u32, format)
                .with_encoding(encoding),
        );

        Self::attach(rd, &mut self.tile_min_max_temp_fb, "MotionBlur::tileMinMaxTemp", temp);
        Self::attach(rd, &mut self.tile_min_max_fb, "MotionBlur::tileMinMax", tile);
        Self::attach(rd, &mut self.neighbor_min_max_fb, "MotionBlur::neighborMinMax", neighbor);

        self.extent = extent;
        self.max_blur_radius = max_blur_radius;
    }

    fn attach(rd: &mut dyn RenderDevice, fb: &mut Option<FramebufferId>, label: &str, texture: TextureId) {
        let framebuffer = *fb.get_or_insert_with(|| rd.create_framebuffer(label));
        rd.set_attachment(framebuffer, AttachmentPoint::Color0, Some(texture));
    }

    fn require<T: Copy>(value: Option<T>) -> T {
        match value {
            Some(v) => v,
            None => panic!("tile velocity buffers used before update_buffers"),
        }
    }

    /// Both tile passes. Reads `velocity` shifted by the guard band.
    pub fn compute_tile_min_max(&mut self, rd: &mut dyn RenderDevice, velocity: TextureId, trim: IVec2) {
        let temp = Self::require(self.tile_min_max_temp);
        let tiles = Self::tile_count(self.extent, self.max_blur_radius);

        rd.push_2d(Some(Self::require(self.tile_min_max_temp_fb)));
        let viewport = rd.viewport();
        rd.launch(
            Kernel::TileMinMax,
            &Args::new()
                .texture(slot::SOURCE, velocity)
                .uniforms(&TileMinMaxParams {
                    input_shift: trim.to_array(),
                    input_extent: self.extent.to_array(),
                    max_blur_radius: self.max_blur_radius,
                    input_has_min_speed: 0,
                    ..Default::default()
                })
                .rect(viewport),
        );
        rd.pop_2d();

        rd.push_2d(Some(Self::require(self.tile_min_max_fb)));
        let viewport = rd.viewport();
        rd.launch(
            Kernel::TileMinMax,
            &Args::new()
                .texture(slot::SOURCE, temp)
                .uniforms(&TileMinMaxParams {
                    input_shift: [0, 0],
                    input_extent: [self.extent.y, tiles.x],
                    max_blur_radius: self.max_blur_radius,
                    input_has_min_speed: 1,
                    ..Default::default()
                })
                .rect(viewport),
        );
        rd.pop_2d();
    }

    pub fn compute_neighbor_min_max(&mut self, rd: &mut dyn RenderDevice) {
        let tile = Self::require(self.tile_min_max);
        let tiles = Self::tile_count(self.extent, self.max_blur_radius);
        rd.push_2d(Some(Self::require(self.neighbor_min_max_fb)));
        let viewport = rd.viewport();
        rd.launch(
            Kernel::NeighborMinMax,
            &Args::new()
                .texture(slot::SOURCE, tile)
                .uniforms(&NeighborMinMaxParams {
                    tile_count: tiles.to_array(),
                    ..Default::default()
                })
                .rect(viewport),
        );
        rd.pop_2d();
    }

    /// Full reduction: buffers, tiles, neighborhoods.
    pub fn reduce(&mut self, rd: &mut dyn RenderDevice, velocity: TextureId, max_blur_radius: i32, trim: IVec2) {
        rd.push_debug_group("MotionBlur::tiles");
        self.update_buffers(rd, velocity, max_blur_radius, trim);
        self.compute_tile_min_max(rd, velocity, trim);
        self.compute_neighbor_min_max(rd);
        rd.pop_debug_group();
    }

    pub fn tile_min_max(&self) -> Option<TextureId> {
        self.tile_min_max
    }

    pub fn tile_min_max_temp(&self) -> Option<TextureId> {
        self.tile_min_max_temp
    }

    pub fn neighbor_min_max(&self) -> Option<TextureId> {
        self.neighbor_min_max
    }

    pub fn max_blur_radius(&self) -> i32 {
        self.max_blur_radius
    }

    /// Tile grid lines and one neighborhood velocity segment per tile, in
    /// pixels of a `viewport_size` target. Reads back the neighborhood buffer.
    pub fn debug_tile_overlay(&self, rd: &dyn RenderDevice, viewport_size: Vec2) -> Vec<LineSegment2D> {
        let Some(neighbor) = self.neighbor_min_max else {
            return Vec::new();
        };
        let r = self.max_blur_radius.max(1) as f32;
        let mut lines = Vec::new();

        let mut x = 0.0;
        while x < viewport_size.x {
            lines.push(LineSegment2D { start: Vec2::new(x, 0.0), end: Vec2::new(x, viewport_size.y) });
            x += r;
        }
        let mut y = 0.0;
        while y < viewport_size.y {
            lines.push(LineSegment2D { start: Vec2::new(0.0, y), end: Vec2::new(viewport_size.x, y) });
            y += r;
        }

        let info = rd.texture_info(neighbor);
        for ty in 0..info.height {
            for tx in 0..info.width {
                let center = (Vec2::new(tx as f32, ty as f32) + 0.5) * r;
                let velocity = rd.read_pixel(neighbor, tx, ty).truncate().truncate();
                lines.push(LineSegment2D { start: center, end: center + velocity });
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::SoftwareDevice;
    use glam::Vec4;

    fn velocity_texture(rd: &mut SoftwareDevice, w: u32, h: u32, f: impl Fn(u32, u32) -> [f32; 2]) -> TextureId {
        let tex = rd.create_texture(&TextureDesc::new("velocity", w, h, ImageFormat::RG32F));
        let mut data = Vec::new();
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&f(x, y));
            }
        }
        rd.write_texture(tex, &data);
        tex
    }

    #[test]
    fn test_buffer_sizes_with_trim() {
        let mut rd = SoftwareDevice::new();
        let velocity = velocity_texture(&mut rd, 110, 64, |_, _| [0.0, 0.0]);
        let mut reducer = TileVelocityReducer::new();
        reducer.update_buffers(&mut rd, velocity, 10, IVec2::new(5, 2));

        let tile = rd.texture_info(reducer.tile_min_max().unwrap());
        assert_eq!((tile.width, tile.height), (10, 6));
        assert_eq!(tile.format, ImageFormat::RGB16F);
        let temp = rd.texture_info(reducer.tile_min_max_temp().unwrap());
        assert_eq!((temp.width, temp.height), (60, 10));
    }

    #[test]
    fn test_unorm_velocity_keeps_encoding() {
        let mut rd = SoftwareDevice::new();
        let encoding = crate::format::TextureEncoding::signed_velocity(32.0);
        let velocity =
            rd.create_texture(&TextureDesc::new("velocity", 16, 16, ImageFormat::RG8).with_encoding(encoding));
        let mut reducer = TileVelocityReducer::new();
        reducer.update_buffers(&mut rd, velocity, 4, IVec2::ZERO);
        let info = rd.texture_info(reducer.neighbor_min_max().unwrap());
        assert_eq!(info.format, ImageFormat::RGB8);
        assert_eq!(info.encoding.read_multiply_first.z, 64.0);
        assert_eq!(info.encoding.read_add_second.z, -32.0);
    }

    #[test]
    fn test_resize_does_not_reallocate() {
        let mut rd = SoftwareDevice::new();
        let small = velocity_texture(&mut rd, 32, 32, |_, _| [0.0, 0.0]);
        let large = velocity_texture(&mut rd, 64, 48, |_, _| [0.0, 0.0]);
        let mut reducer = TileVelocityReducer::new();
        reducer.update_buffers(&mut rd, small, 4, IVec2::ZERO);
        let created = rd.stats().textures_created;
        let first = reducer.tile_min_max();
        reducer.update_buffers(&mut rd, large, 4, IVec2::ZERO);
        assert_eq!(rd.stats().textures_created, created);
        assert_eq!(reducer.tile_min_max(), first);
        assert_eq!(rd.texture_info(first.unwrap()).size(), IVec2::new(16, 12));
    }

    #[test]
    fn test_tiles_bound_every_pixel() {
        let mut rd = SoftwareDevice::new();
        let field = |x: u32, y: u32| [((x * 7 + y * 3) % 11) as f32 - 5.0, ((x + 2 * y) % 9) as f32 - 4.0];
        let (w, h, r) = (37u32, 23u32, 5u32);
        let velocity = velocity_texture(&mut rd, w, h, field);
        let mut reducer = TileVelocityReducer::new();
        reducer.reduce(&mut rd, velocity, r as i32, IVec2::ZERO);

        let tile = reducer.tile_min_max().unwrap();
        let neighbor = reducer.neighbor_min_max().unwrap();
        // Half-float storage rounds to within a part in a thousand.
        let within_max = |speed: f32, max: Vec4| speed <= max.truncate().truncate().length() * 1.001 + 1e-3;
        for y in 0..h {
            for x in 0..w {
                let v = Vec2::from(field(x, y));
                let t = rd.read_pixel(tile, x / r, y / r);
                assert!(within_max(v.length(), t), "({x},{y})");
                assert!(v.length() >= t.z * 0.999 - 1e-3, "({x},{y})");
            }
        }

        let (tiles_x, tiles_y) = (w.div_ceil(r), h.div_ceil(r));
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let n = rd.read_pixel(neighbor, tx, ty);
                for uy in ty.saturating_sub(1)..=(ty + 1).min(tiles_y - 1) {
                    for ux in tx.saturating_sub(1)..=(tx + 1).min(tiles_x - 1) {
                        assert!(n.z <= rd.read_pixel(tile, ux, uy).z + 1e-3, "tile ({tx},{ty}) vs ({ux},{uy})");
                        for y in uy * r..((uy + 1) * r).min(h) {
                            for x in ux * r..((ux + 1) * r).min(w) {
                                let v = Vec2::from(field(x, y));
                                assert!(within_max(v.length(), n), "tile ({tx},{ty}) vs pixel ({x},{y})");
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_overlay_has_grid_and_vectors() {
        let mut rd = SoftwareDevice::new();
        let velocity = velocity_texture(&mut rd, 8, 8, |_, _| [2.0, 0.0]);
        let mut reducer = TileVelocityReducer::new();
        reducer.reduce(&mut rd, velocity, 4, IVec2::ZERO);
        let lines = reducer.debug_tile_overlay(&rd, Vec2::new(8.0, 8.0));
        // Two vertical, two horizontal, four tile vectors.
        assert_eq!(lines.len(), 8);
        let last = lines[7];
        assert_eq!(last.end - last.start, Vec2::new(2.0, 0.0));
    }
}
