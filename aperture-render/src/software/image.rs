//! CPU texel storage with the precision of the declared format.

use glam::{IVec2, Vec4};
use half::f16;

use crate::format::{ImageFormat, NumberFormat, TextureEncoding};

/// Texels are held as stored (encoded, quantized) RGBA; channels the format
/// lacks read back as 0 for G/B and 1 for A.
#[derive(Clone, Debug)]
pub struct SoftwareImage {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub encoding: TextureEncoding,
    texels: Vec<Vec4>,
}

fn quantize(format: ImageFormat, v: f32) -> f32 {
    match (format.number_format(), format.bits_per_channel()) {
        (NumberFormat::Unorm, _) => (v.clamp(0.0, 1.0) * 255.0).round() / 255.0,
        (NumberFormat::Float, 16) => f16::from_f32(v).to_f32(),
        _ => v,
    }
}

impl SoftwareImage {
    pub fn new(label: &str, width: u32, height: u32, format: ImageFormat, encoding: TextureEncoding) -> Self {
        let mut image = Self {
            label: label.to_string(),
            width,
            height,
            format,
            encoding,
            texels: Vec::new(),
        };
        image.resize(width, height);
        image
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.texels = vec![self.normalize(Vec4::ZERO); (width as usize) * (height as usize)];
    }

    pub fn size(&self) -> IVec2 {
        IVec2::new(self.width as i32, self.height as i32)
    }

    fn normalize(&self, stored: Vec4) -> Vec4 {
        let channels = self.format.channels();
        let mut out = Vec4::new(0.0, 0.0, 0.0, 1.0);
        for c in 0..channels {
            out[c] = quantize(self.format, stored[c]);
        }
        out
    }

    fn index(&self, p: IVec2) -> usize {
        p.y as usize * self.width as usize + p.x as usize
    }

    /// Decoded value at `p`, clamped to the image edge.
    pub fn load(&self, p: IVec2) -> Vec4 {
        if self.width == 0 || self.height == 0 {
            return Vec4::ZERO;
        }
        let q = p.clamp(IVec2::ZERO, self.size() - IVec2::ONE);
        self.decode(self.texels[self.index(q)])
    }

    fn decode(&self, stored: Vec4) -> Vec4 {
        let decoded = self.encoding.decode(stored);
        let mut out = stored;
        for c in 0..self.format.channels() {
            out[c] = decoded[c];
        }
        out
    }

    /// Encodes, quantizes and writes `value` at `p`. Out-of-bounds writes
    /// are dropped.
    pub fn store(&mut self, p: IVec2, value: Vec4) {
        if p.x < 0 || p.y < 0 || p.x >= self.width as i32 || p.y >= self.height as i32 {
            return;
        }
        let stored = self.normalize(self.encoding.encode(value));
        let i = self.index(p);
        self.texels[i] = stored;
    }

    pub fn fill(&mut self, value: Vec4) {
        let stored = self.normalize(self.encoding.encode(value));
        self.texels.fill(stored);
    }

    /// Row-major upload of decoded values, `channels()` floats per texel.
    ///
    /// # Panics
    ///
    /// Panics if `texels` does not cover the image exactly.
    pub fn upload(&mut self, texels: &[f32]) {
        let channels = self.format.channels();
        assert_eq!(
            texels.len(),
            self.texels.len() * channels,
            "upload to {} has the wrong length",
            self.label
        );
        for (i, chunk) in texels.chunks_exact(channels).enumerate() {
            let mut v = Vec4::new(0.0, 0.0, 0.0, 1.0);
            for (c, x) in chunk.iter().enumerate() {
                v[c] = *x;
            }
            let x = (i % self.width as usize) as i32;
            let y = (i / self.width as usize) as i32;
            self.store(IVec2::new(x, y), v);
        }
    }
}
