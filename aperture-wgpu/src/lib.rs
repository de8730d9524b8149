//! WebGPU render device for the Aperture compositor.
//!
//! Kernels run as fullscreen fragment passes restricted by scissor to the
//! launch region. Each pass binds its params block, the per-slot encodings
//! and one texture per slot; see `aperture_gpu_shared::shaders`.

pub mod backend;
pub mod passes;
pub mod pipeline;
pub mod render_targets;

pub use backend::WgpuDevice;
