//! Named image kernels launched by the compositor.

use crate::shaders;

/// Texture slot names, bound by the compositor and resolved by each device.
pub mod slot {
    pub const SOURCE: &str = "source";
    pub const NEAR_SOURCE: &str = "near_source";
    pub const COLOR: &str = "color";
    pub const DEPTH: &str = "depth";
    pub const VELOCITY: &str = "velocity";
    pub const NEIGHBOR_MIN_MAX: &str = "neighbor_min_max";
    pub const PACKED: &str = "packed";
    pub const RANDOM: &str = "random";
    pub const BLUR: &str = "blur";
    pub const NEAR: &str = "near";
}

/// Every kernel reads textures by slot with `textureLoad` semantics (integer
/// texel, clamped to the edge) and writes the attachments of the bound
/// framebuffer inside the launch rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    Copy,
    TileMinMax,
    NeighborMinMax,
    MotionGather,
    UniversalGather,
    CircleOfConfusion,
    DofBlur,
    DofComposite,
}

impl Kernel {
    pub const ALL: [Kernel; 8] = [
        Kernel::Copy,
        Kernel::TileMinMax,
        Kernel::NeighborMinMax,
        Kernel::MotionGather,
        Kernel::UniversalGather,
        Kernel::CircleOfConfusion,
        Kernel::DofBlur,
        Kernel::DofComposite,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Kernel::Copy => "Texture_copy",
            Kernel::TileMinMax => "MotionBlur_tileMinMax",
            Kernel::NeighborMinMax => "MotionBlur_neighborMinMax",
            Kernel::MotionGather => "MotionBlur_gather",
            Kernel::UniversalGather => "MotionBlur_universalGather",
            Kernel::CircleOfConfusion => "DepthOfField_universalCircleOfConfusion",
            Kernel::DofBlur => "DepthOfField_blur",
            Kernel::DofComposite => "DepthOfField_composite",
        }
    }

    /// Slots in binding order (binding 2 onward).
    pub fn texture_slots(self) -> &'static [&'static str] {
        use slot::*;
        match self {
            Kernel::Copy | Kernel::TileMinMax | Kernel::NeighborMinMax => &[SOURCE],
            Kernel::MotionGather => &[COLOR, VELOCITY, NEIGHBOR_MIN_MAX, RANDOM, DEPTH],
            Kernel::UniversalGather => &[COLOR, VELOCITY, NEIGHBOR_MIN_MAX, PACKED, RANDOM, DEPTH],
            Kernel::CircleOfConfusion => &[COLOR, DEPTH],
            Kernel::DofBlur => &[SOURCE, NEAR_SOURCE],
            Kernel::DofComposite => &[PACKED, BLUR, NEAR],
        }
    }

    /// Slots a launch may leave unbound; the kernel is told through its params.
    pub fn is_optional_slot(self, name: &str) -> bool {
        matches!(self, Kernel::MotionGather | Kernel::UniversalGather) && name == slot::DEPTH
    }

    pub fn color_outputs(self) -> usize {
        match self {
            Kernel::DofBlur => 2,
            _ => 1,
        }
    }

    pub fn fragment_source(self) -> &'static str {
        match self {
            Kernel::Copy => shaders::COPY_FRAG,
            Kernel::TileMinMax => shaders::TILE_MIN_MAX_FRAG,
            Kernel::NeighborMinMax => shaders::NEIGHBOR_MIN_MAX_FRAG,
            Kernel::MotionGather => shaders::MOTION_GATHER_FRAG,
            Kernel::UniversalGather => shaders::UNIVERSAL_GATHER_FRAG,
            Kernel::CircleOfConfusion => shaders::CIRCLE_OF_CONFUSION_FRAG,
            Kernel::DofBlur => shaders::DOF_BLUR_FRAG,
            Kernel::DofComposite => shaders::DOF_COMPOSITE_FRAG,
        }
    }
}

impl std::fmt::Display for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
