//! Types shared between the platform-independent compositor and the device
//! backends: kernel identifiers, `#[repr(C)]` uniform blocks and the WGSL
//! source of every kernel.

pub mod kernels;
pub mod shaders;
pub mod uniforms;

pub use kernels::Kernel;
