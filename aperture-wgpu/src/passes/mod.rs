//! Render passes recorded by the WebGPU device.

pub mod clear;
pub mod kernel;
