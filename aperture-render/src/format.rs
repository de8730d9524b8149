//! Image formats and per-channel read encodings.

use glam::Vec4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumberFormat {
    /// Fixed point, stored values in [0, 1].
    Unorm,
    Float,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum ImageFormat {
    R8,
    RG8,
    RGB8,
    RGBA8,
    R16F,
    RG16F,
    RGB16F,
    RGBA16F,
    R32F,
    RG32F,
    RGB32F,
    RGBA32F,
}

impl ImageFormat {
    pub fn channels(self) -> usize {
        use ImageFormat::*;
        match self {
            R8 | R16F | R32F => 1,
            RG8 | RG16F | RG32F => 2,
            RGB8 | RGB16F | RGB32F => 3,
            RGBA8 | RGBA16F | RGBA32F => 4,
        }
    }

    pub fn number_format(self) -> NumberFormat {
        use ImageFormat::*;
        match self {
            R8 | RG8 | RGB8 | RGBA8 => NumberFormat::Unorm,
            _ => NumberFormat::Float,
        }
    }

    pub fn bits_per_channel(self) -> u32 {
        use ImageFormat::*;
        match self {
            R8 | RG8 | RGB8 | RGBA8 => 8,
            R16F | RG16F | RGB16F | RGBA16F => 16,
            R32F | RG32F | RGB32F | RGBA32F => 32,
        }
    }

    pub fn has_alpha(self) -> bool {
        self.channels() == 4
    }

    /// Same number format with an alpha channel added.
    pub fn with_alpha(self) -> ImageFormat {
        match self.bits_per_channel() {
            8 => ImageFormat::RGBA8,
            16 => ImageFormat::RGBA16F,
            _ => ImageFormat::RGBA32F,
        }
    }

    /// Three-channel format with the same number format, at least 8/16 bits.
    pub fn rgb_like(self) -> ImageFormat {
        match self.number_format() {
            NumberFormat::Unorm => ImageFormat::RGB8,
            NumberFormat::Float => ImageFormat::RGB16F,
        }
    }
}

/// Decoding applied when reading a texel: `stored * read_multiply_first + read_add_second`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureEncoding {
    pub read_multiply_first: Vec4,
    pub read_add_second: Vec4,
}

impl TextureEncoding {
    pub const IDENTITY: TextureEncoding = TextureEncoding {
        read_multiply_first: Vec4::ONE,
        read_add_second: Vec4::ZERO,
    };

    pub fn new(read_multiply_first: Vec4, read_add_second: Vec4) -> Self {
        Self {
            read_multiply_first,
            read_add_second,
        }
    }

    /// Maps stored [0, 1] to [-range, range] in the first two channels.
    pub fn signed_velocity(range: f32) -> Self {
        Self::new(
            Vec4::new(2.0 * range, 2.0 * range, 1.0, 1.0),
            Vec4::new(-range, -range, 0.0, 0.0),
        )
    }

    pub fn decode(&self, stored: Vec4) -> Vec4 {
        stored * self.read_multiply_first + self.read_add_second
    }

    pub fn encode(&self, value: Vec4) -> Vec4 {
        (value - self.read_add_second) / self.read_multiply_first
    }

    /// Copies the red channel's mapping into blue. Used when a min-speed
    /// channel is appended to a two-channel velocity encoding.
    pub fn with_blue_from_red(self) -> Self {
        let mut out = self;
        out.read_multiply_first.z = self.read_multiply_first.x;
        out.read_add_second.z = self.read_add_second.x;
        out
    }
}

impl Default for TextureEncoding {
    fn default() -> Self {
        Self::IDENTITY
    }
}
