//! Deterministic CPU implementation of [`RenderDevice`].
//!
//! Every launch evaluates into a fresh buffer before committing, so a kernel
//! may read the texture it writes without observing its own partial output.

mod image;
mod kernels;

pub use image::SoftwareImage;

use aperture_gpu_shared::uniforms::MAX_KERNEL_INPUTS;
use aperture_gpu_shared::Kernel;
use glam::{IVec2, Vec2, Vec4};

use crate::device::{
    AttachmentPoint, Args, FramebufferId, RenderDevice, TextureDesc, TextureId, TextureInfo,
};
use crate::geometry::Rect2D;
use crate::handle::HandleStore;
use kernels::{Inputs, Prepared};

struct SoftwareFramebuffer {
    label: String,
    attachments: [Option<TextureId>; 2],
}

#[derive(Clone, Copy, Default)]
struct Scope {
    framebuffer: Option<FramebufferId>,
    guard_band: IVec2,
}

/// Resource and pass counters, for tests and diagnostics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceStats {
    pub textures_created: usize,
    pub textures_resized: usize,
    pub textures_destroyed: usize,
    pub copies: usize,
    pub clears: usize,
    /// Every launched kernel, in order.
    pub launches: Vec<Kernel>,
}

#[derive(Default)]
pub struct SoftwareDevice {
    textures: HandleStore<SoftwareImage>,
    framebuffers: HandleStore<SoftwareFramebuffer>,
    scope: Scope,
    scope_stack: Vec<Scope>,
    debug_groups: Vec<String>,
    stats: DeviceStats,
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = DeviceStats::default();
    }

    /// Open debug groups, outermost first.
    pub fn debug_groups(&self) -> &[String] {
        &self.debug_groups
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// # Panics
    ///
    /// Panics if `texture` was destroyed or never created.
    pub fn image(&self, texture: TextureId) -> &SoftwareImage {
        match self.textures.get(texture.0) {
            Some(image) => image,
            None => panic!("unknown texture {texture:?}"),
        }
    }

    fn image_mut(&mut self, texture: TextureId) -> &mut SoftwareImage {
        match self.textures.get_mut(texture.0) {
            Some(image) => image,
            None => panic!("unknown texture {texture:?}"),
        }
    }

    fn framebuffer_ref(&self, framebuffer: FramebufferId) -> &SoftwareFramebuffer {
        match self.framebuffers.get(framebuffer.0) {
            Some(fb) => fb,
            None => panic!("unknown framebuffer {framebuffer:?}"),
        }
    }

    fn bound_attachments(&self) -> [Option<TextureId>; 2] {
        self.scope
            .framebuffer
            .map_or([None, None], |fb| self.framebuffer_ref(fb).attachments)
    }

    /// Viewport minus the guard band, as integer pixel bounds.
    fn clip_bounds(&self, rect: Option<Rect2D>) -> (IVec2, IVec2) {
        let viewport = self.viewport();
        let mut region = viewport.inset(self.scope.guard_band.as_vec2());
        if let Some(rect) = rect {
            region = region.intersect(&rect);
        }
        let region = region.intersect(&viewport);
        let min = region.min.max(Vec2::ZERO).ceil().as_ivec2();
        let max = region.max.floor().as_ivec2().max(min);
        (min, max)
    }
}

impl RenderDevice for SoftwareDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        self.stats.textures_created += 1;
        let image = SoftwareImage::new(desc.label, desc.width, desc.height, desc.format, desc.encoding);
        TextureId(self.textures.insert(image))
    }

    fn resize_texture(&mut self, texture: TextureId, width: u32, height: u32) {
        self.stats.textures_resized += 1;
        self.image_mut(texture).resize(width, height);
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(texture.0).is_some() {
            self.stats.textures_destroyed += 1;
        }
    }

    fn texture_info(&self, texture: TextureId) -> TextureInfo {
        let image = self.image(texture);
        TextureInfo {
            width: image.width,
            height: image.height,
            format: image.format,
            encoding: image.encoding,
        }
    }

    fn write_texture(&mut self, texture: TextureId, texels: &[f32]) {
        self.image_mut(texture).upload(texels);
    }

    fn create_framebuffer(&mut self, label: &str) -> FramebufferId {
        FramebufferId(self.framebuffers.insert(SoftwareFramebuffer {
            label: label.to_string(),
            attachments: [None, None],
        }))
    }

    fn set_attachment(&mut self, framebuffer: FramebufferId, point: AttachmentPoint, texture: Option<TextureId>) {
        match self.framebuffers.get_mut(framebuffer.0) {
            Some(fb) => fb.attachments[point.index()] = texture,
            None => panic!("unknown framebuffer {framebuffer:?}"),
        }
    }

    fn attachment(&self, framebuffer: FramebufferId, point: AttachmentPoint) -> Option<TextureId> {
        self.framebuffer_ref(framebuffer).attachments[point.index()]
    }

    fn set_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.scope.framebuffer = framebuffer;
    }

    fn framebuffer(&self) -> Option<FramebufferId> {
        self.scope.framebuffer
    }

    fn push_2d(&mut self, framebuffer: Option<FramebufferId>) {
        self.scope_stack.push(self.scope);
        self.scope = Scope {
            framebuffer: framebuffer.or(self.scope.framebuffer),
            guard_band: IVec2::ZERO,
        };
    }

    fn pop_2d(&mut self) {
        match self.scope_stack.pop() {
            Some(scope) => self.scope = scope,
            None => panic!("pop_2d without a matching push_2d"),
        }
    }

    fn set_guard_band_clip(&mut self, thickness: IVec2) {
        self.scope.guard_band = thickness;
    }

    fn viewport(&self) -> Rect2D {
        match self.bound_attachments()[0] {
            Some(texture) => {
                let image = self.image(texture);
                Rect2D::from_size(image.width, image.height)
            }
            None => Rect2D::from_size(0, 0),
        }
    }

    fn clear(&mut self, color: Vec4) {
        self.stats.clears += 1;
        for texture in self.bound_attachments().into_iter().flatten() {
            self.image_mut(texture).fill(color);
        }
    }

    fn launch(&mut self, kernel: Kernel, args: &Args) {
        let Some(framebuffer) = self.scope.framebuffer else {
            panic!("{kernel} launched with no framebuffer bound");
        };
        log::trace!("{kernel} -> {}", self.framebuffer_ref(framebuffer).label);
        self.stats.launches.push(kernel);

        let prepared = Prepared::new(kernel, args);
        let (min, max) = self.clip_bounds(args.launch_rect());

        let mut images = [None; MAX_KERNEL_INPUTS];
        for (i, slot) in kernel.texture_slots().iter().enumerate() {
            match args.get_texture(slot) {
                Some(texture) => images[i] = Some(self.image(texture)),
                None if kernel.is_optional_slot(slot) => {}
                None => panic!("{kernel} requires a texture in slot `{slot}`"),
            }
        }
        let inputs = Inputs::new(images);

        let mut results = Vec::with_capacity(((max.x - min.x) * (max.y - min.y)).max(0) as usize);
        for y in min.y..max.y {
            for x in min.x..max.x {
                let p = IVec2::new(x, y);
                results.push((p, prepared.shade(&inputs, p)));
            }
        }

        let attachments = self.bound_attachments();
        for (index, target) in attachments.iter().enumerate().take(kernel.color_outputs()) {
            if let Some(texture) = target {
                let image = self.image_mut(*texture);
                for (p, values) in &results {
                    image.store(*p, values[index]);
                }
            }
        }
    }

    fn copy_texture(&mut self, src: TextureId, dst: TextureId, offset: IVec2) {
        self.stats.copies += 1;
        let source = self.image(src).clone();
        let destination = self.image_mut(dst);
        for y in 0..destination.height as i32 {
            for x in 0..destination.width as i32 {
                let p = IVec2::new(x, y);
                destination.store(p, source.load(p + offset));
            }
        }
    }

    fn read_pixel(&self, texture: TextureId, x: u32, y: u32) -> Vec4 {
        self.image(texture).load(IVec2::new(x as i32, y as i32))
    }

    fn push_debug_group(&mut self, label: &str) {
        self.debug_groups.push(label.to_string());
    }

    fn pop_debug_group(&mut self) {
        self.debug_groups.pop();
    }
}
