//! Texture creation and texel packing for kernel targets.
//!
//! Three-channel formats have no WebGPU equivalent and are stored as RGBA
//! with alpha 1. Every kernel texture can be sampled, rendered to and copied.

use aperture_render::{ImageFormat, TextureEncoding, TextureInfo};
use glam::Vec4;
use half::f16;

pub const KERNEL_TEXTURE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// A kernel-visible texture with its view and the compositor-facing format.
pub struct GpuTexture {
    pub label: String,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub encoding: TextureEncoding,
}

impl GpuTexture {
    pub fn info(&self) -> TextureInfo {
        TextureInfo {
            width: self.width,
            height: self.height,
            format: self.format,
            encoding: self.encoding,
        }
    }
}

pub fn gpu_format(format: ImageFormat) -> wgpu::TextureFormat {
    use ImageFormat::*;
    match format {
        R8 => wgpu::TextureFormat::R8Unorm,
        RG8 => wgpu::TextureFormat::Rg8Unorm,
        RGB8 | RGBA8 => wgpu::TextureFormat::Rgba8Unorm,
        R16F => wgpu::TextureFormat::R16Float,
        RG16F => wgpu::TextureFormat::Rg16Float,
        RGB16F | RGBA16F => wgpu::TextureFormat::Rgba16Float,
        R32F => wgpu::TextureFormat::R32Float,
        RG32F => wgpu::TextureFormat::Rg32Float,
        RGB32F | RGBA32F => wgpu::TextureFormat::Rgba32Float,
    }
}

/// Channels actually stored on the GPU.
pub fn stored_channels(format: ImageFormat) -> usize {
    match format.channels() {
        3 => 4,
        n => n,
    }
}

pub fn texel_bytes(format: ImageFormat) -> u32 {
    stored_channels(format) as u32 * format.bits_per_channel() / 8
}

pub fn create_gpu_texture(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: ImageFormat,
    encoding: TextureEncoding,
) -> GpuTexture {
    // Zero-sized textures are invalid; a 1x1 stands in until the next resize.
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: gpu_format(format),
        usage: KERNEL_TEXTURE_USAGE,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        label: label.to_string(),
        texture,
        view,
        width,
        height,
        format,
        encoding,
    }
}

/// Encodes decoded `channels()`-wide texels into the GPU byte layout.
pub fn pack_texels(format: ImageFormat, encoding: TextureEncoding, texels: &[f32]) -> Vec<u8> {
    let channels = format.channels();
    let stored = stored_channels(format);
    let mut bytes = Vec::with_capacity(texels.len() / channels.max(1) * texel_bytes(format) as usize);
    for chunk in texels.chunks_exact(channels) {
        let mut value = Vec4::new(0.0, 0.0, 0.0, 1.0);
        for (c, x) in chunk.iter().enumerate() {
            value[c] = *x;
        }
        let encoded = encode_channels(format, encoding, value);
        for c in 0..stored {
            push_channel(&mut bytes, format, encoded[c]);
        }
    }
    bytes
}

/// Decodes one texel read back from the GPU.
pub fn unpack_texel(format: ImageFormat, encoding: TextureEncoding, bytes: &[u8]) -> Vec4 {
    let mut stored = Vec4::new(0.0, 0.0, 0.0, 1.0);
    for c in 0..stored_channels(format) {
        stored[c] = read_channel(bytes, format, c);
    }
    if format.channels() == 3 {
        stored.w = 1.0;
    }
    let decoded = encoding.decode(stored);
    for c in 0..format.channels() {
        stored[c] = decoded[c];
    }
    stored
}

/// Encodes only the channels the format has; the rest keep their defaults.
pub fn encode_channels(format: ImageFormat, encoding: TextureEncoding, value: Vec4) -> Vec4 {
    let encoded = encoding.encode(value);
    let mut out = value;
    for c in 0..format.channels() {
        out[c] = encoded[c];
    }
    out
}

fn push_channel(bytes: &mut Vec<u8>, format: ImageFormat, x: f32) {
    match format.bits_per_channel() {
        8 => bytes.push((x.clamp(0.0, 1.0) * 255.0).round() as u8),
        16 => bytes.extend_from_slice(&f16::from_f32(x).to_le_bytes()),
        _ => bytes.extend_from_slice(&x.to_le_bytes()),
    }
}

fn read_channel(bytes: &[u8], format: ImageFormat, c: usize) -> f32 {
    match format.bits_per_channel() {
        8 => bytes[c] as f32 / 255.0,
        16 => f16::from_le_bytes([bytes[2 * c], bytes[2 * c + 1]]).to_f32(),
        _ => f32::from_le_bytes([bytes[4 * c], bytes[4 * c + 1], bytes[4 * c + 2], bytes[4 * c + 3]]),
    }
}
