// src/gpu/mod.rs
//! GPU rendering context and buffer import.
//!
//! - `context`: the `GpuBackend` seam, image import and `GpuContext`
//! - `egl`: the EGL/GLES backend

pub mod context;
pub mod egl;
mod ffi;

#[cfg(test)]
pub mod mock;
#[cfg(test)]
mod tests;

pub use context::{
    image_attributes, import, GpuBackend, GpuCapabilities, GpuContext, GpuError, GpuImage, ImageId,
    RenderTargetId, TextureId,
};
pub use egl::EglBackend;
