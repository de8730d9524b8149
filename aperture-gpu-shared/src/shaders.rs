//! Embedded WGSL sources for every kernel.
//! `KERNEL_COMMON` is prepended to each fragment source at pipeline creation.

pub const FULLSCREEN_TRIANGLE_VERT: &str = include_str!("../shaders/fullscreen_triangle.wgsl");
pub const KERNEL_COMMON: &str = include_str!("../shaders/common.wgsl");
pub const COPY_FRAG: &str = include_str!("../shaders/copy.wgsl");
pub const TILE_MIN_MAX_FRAG: &str = include_str!("../shaders/tile_min_max.wgsl");
pub const NEIGHBOR_MIN_MAX_FRAG: &str = include_str!("../shaders/neighbor_min_max.wgsl");
pub const MOTION_GATHER_FRAG: &str = include_str!("../shaders/motion_gather.wgsl");
pub const UNIVERSAL_GATHER_FRAG: &str = include_str!("../shaders/universal_gather.wgsl");
pub const CIRCLE_OF_CONFUSION_FRAG: &str = include_str!("../shaders/circle_of_confusion.wgsl");
pub const DOF_BLUR_FRAG: &str = include_str!("../shaders/dof_blur.wgsl");
pub const DOF_COMPOSITE_FRAG: &str = include_str!("../shaders/dof_composite.wgsl");
