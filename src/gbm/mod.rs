// src/gbm/mod.rs
//! Buffer allocation through GBM.
//!
//! - `buffer`: buffer objects and the `BufferDevice` seam
//! - `pool`: modifier negotiation and the render buffer pool
//! - `device`: the real GBM device

pub mod buffer;
pub mod device;
mod ffi;
pub mod pool;

#[cfg(test)]
pub mod mock;

pub use buffer::{
    BufferDescriptor, BufferDevice, BufferHandle, BufferId, BufferObject, BufferUsage, PlaneLayout,
    SurfaceHandle,
};
pub use device::GbmDevice;
pub use pool::{AllocError, BufferAllocator, BufferPool, PoolParams, PoolStorage};
