//! Aperture: camera optics and the combined motion blur / depth of field
//! compositor, written against the [`RenderDevice`] trait.
//!
//! [`software::SoftwareDevice`] runs every kernel on the CPU; the
//! `aperture-wgpu` crate runs them as fullscreen passes.

pub mod camera;
pub mod depth_of_field;
pub mod device;
pub mod format;
pub mod geometry;
pub mod handle;
pub mod projection;
pub mod settings;
pub mod software;
pub mod tile_velocity;
pub mod universal_blur;

pub use aperture_gpu_shared::Kernel;
pub use camera::{radical_inverse, Camera, Entity};
pub use depth_of_field::{DebugOption, DepthOfFieldBufferPipeline};
pub use device::{AttachmentPoint, Args, FramebufferId, RenderDevice, TextureDesc, TextureId, TextureInfo};
pub use format::{ImageFormat, NumberFormat, TextureEncoding};
pub use geometry::{CoordinateFrame, Frustum, LineSegment2D, Plane, Ray, Rect2D};
pub use projection::{FovDirection, Projection};
pub use settings::{
    DepthOfFieldModel, DepthOfFieldSettings, FilmSettings, GatherAlgorithm, MotionBlurSettings,
    UniversalBlurSettings,
};
pub use software::SoftwareDevice;
pub use tile_velocity::TileVelocityReducer;
pub use universal_blur::{BlurState, UniversalBlur};
