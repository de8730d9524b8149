//! The narrow render-device surface the compositor is written against:
//! 2D textures, framebuffers with two color attachments, a 2D scope stack
//! with guard-band clipping, and kernel launches.

use aperture_gpu_shared::Kernel;
use bytemuck::Pod;
use glam::{IVec2, Vec4};

use crate::format::{ImageFormat, TextureEncoding};
use crate::geometry::Rect2D;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttachmentPoint {
    Color0,
    Color1,
}

impl AttachmentPoint {
    pub const ALL: [AttachmentPoint; 2] = [AttachmentPoint::Color0, AttachmentPoint::Color1];

    pub fn index(self) -> usize {
        match self {
            AttachmentPoint::Color0 => 0,
            AttachmentPoint::Color1 => 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub encoding: TextureEncoding,
    pub generate_mips: bool,
}

impl<'a> TextureDesc<'a> {
    pub fn new(label: &'a str, width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            label,
            width,
            height,
            format,
            encoding: TextureEncoding::IDENTITY,
            generate_mips: false,
        }
    }

    pub fn with_encoding(mut self, encoding: TextureEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub encoding: TextureEncoding,
}

impl TextureInfo {
    pub fn size(&self) -> IVec2 {
        IVec2::new(self.width as i32, self.height as i32)
    }

    pub fn rect(&self) -> Rect2D {
        Rect2D::from_size(self.width, self.height)
    }
}

/// Bound inputs of one kernel launch.
#[derive(Clone, Debug, Default)]
pub struct Args {
    textures: Vec<(&'static str, TextureId)>,
    uniforms: Vec<u8>,
    rect: Option<Rect2D>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture(mut self, slot: &'static str, texture: TextureId) -> Self {
        self.set_texture(slot, texture);
        self
    }

    pub fn set_texture(&mut self, slot: &'static str, texture: TextureId) {
        self.textures.retain(|(name, _)| *name != slot);
        self.textures.push((slot, texture));
    }

    pub fn uniforms<T: Pod>(mut self, params: &T) -> Self {
        self.uniforms = bytemuck::bytes_of(params).to_vec();
        self
    }

    /// Restricts the launch to `rect` (further clipped by the guard band).
    pub fn rect(mut self, rect: Rect2D) -> Self {
        self.rect = Some(rect);
        self
    }

    pub fn get_texture(&self, slot: &str) -> Option<TextureId> {
        self.textures.iter().find(|(name, _)| *name == slot).map(|(_, id)| *id)
    }

    pub fn textures(&self) -> &[(&'static str, TextureId)] {
        &self.textures
    }

    pub fn uniform_bytes(&self) -> &[u8] {
        &self.uniforms
    }

    /// # Panics
    ///
    /// Panics if the bound uniform block is not exactly a `T`.
    pub fn read_uniforms<T: Pod>(&self) -> T {
        assert_eq!(
            self.uniforms.len(),
            std::mem::size_of::<T>(),
            "uniform block size mismatch"
        );
        bytemuck::pod_read_unaligned(&self.uniforms)
    }

    pub fn launch_rect(&self) -> Option<Rect2D> {
        self.rect
    }
}

/// Device services consumed by the compositor.
///
/// Framebuffer binding follows a scope stack: `push_2d(Some(fb))` binds `fb`
/// for the scope, `push_2d(None)` keeps the current binding, and `pop_2d`
/// restores both the binding and the guard-band clip. Kernels write the
/// bound framebuffer's attachments inside the launch rectangle intersected
/// with the clip rectangle.
pub trait RenderDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId;
    /// Changes the size, keeping format and encoding. Contents are undefined.
    fn resize_texture(&mut self, texture: TextureId, width: u32, height: u32);
    fn destroy_texture(&mut self, texture: TextureId);
    fn texture_info(&self, texture: TextureId) -> TextureInfo;
    /// Uploads decoded texel values, `channels()` floats per texel, row major.
    fn write_texture(&mut self, texture: TextureId, texels: &[f32]);

    fn create_framebuffer(&mut self, label: &str) -> FramebufferId;
    fn set_attachment(&mut self, framebuffer: FramebufferId, point: AttachmentPoint, texture: Option<TextureId>);
    fn attachment(&self, framebuffer: FramebufferId, point: AttachmentPoint) -> Option<TextureId>;

    /// Replaces the binding of the current scope.
    fn set_framebuffer(&mut self, framebuffer: Option<FramebufferId>);
    fn framebuffer(&self) -> Option<FramebufferId>;

    fn push_2d(&mut self, framebuffer: Option<FramebufferId>);
    fn pop_2d(&mut self);
    /// Excludes a band of `thickness` pixels from every edge of the viewport.
    fn set_guard_band_clip(&mut self, thickness: IVec2);
    /// Full extent of the bound framebuffer's first attachment.
    fn viewport(&self) -> Rect2D;
    /// Clears every attachment of the bound framebuffer, ignoring the clip.
    fn clear(&mut self, color: Vec4);

    fn launch(&mut self, kernel: Kernel, args: &Args);
    /// `dst(p) = src(p + offset)` over all of `dst`.
    fn copy_texture(&mut self, src: TextureId, dst: TextureId, offset: IVec2);
    /// Decoded texel.
    fn read_pixel(&self, texture: TextureId, x: u32, y: u32) -> Vec4;

    fn push_debug_group(&mut self, _label: &str) {}
    fn pop_debug_group(&mut self) {}

    fn bound_color0(&self) -> Option<TextureId> {
        self.framebuffer()
            .and_then(|fb| self.attachment(fb, AttachmentPoint::Color0))
    }
}

/// Allocates into `slot` when it is empty or holds a different format,
/// otherwise resizes in place. Returns the texture now in `slot`.
pub(crate) fn match_target(
    rd: &mut dyn RenderDevice,
    slot: &mut Option<TextureId>,
    desc: &TextureDesc,
) -> TextureId {
    if let Some(existing) = *slot {
        let info = rd.texture_info(existing);
        if info.format == desc.format && info.encoding == desc.encoding {
            if info.width != desc.width || info.height != desc.height {
                log::trace!("Resizing {} to {}x{}", desc.label, desc.width, desc.height);
                rd.resize_texture(existing, desc.width, desc.height);
            }
            return existing;
        }
        log::debug!("Reallocating {} for format {:?}", desc.label, desc.format);
        rd.destroy_texture(existing);
    } else {
        log::info!("Allocating {} ({}x{} {:?})", desc.label, desc.width, desc.height, desc.format);
    }
    let texture = rd.create_texture(desc);
    *slot = Some(texture);
    texture
}

/// `ceil(a / b)` for positive sizes.
pub(crate) fn div_ceil(a: i32, b: i32) -> i32 {
    (a + b - 1) / b
}

/// `size` with `trim` removed from every side.
///
/// # Panics
///
/// Panics if the trim leaves no pixels.
pub(crate) fn trimmed_extent(size: IVec2, trim: IVec2) -> IVec2 {
    let extent = size - trim * 2;
    assert!(
        extent.cmpgt(IVec2::ZERO).all(),
        "trim {trim} leaves nothing of a {size} texture"
    );
    extent
}
