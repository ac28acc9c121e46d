// src/kms/mod.rs
//! Kernel mode-setting.
//!
//! - `device`: the `KmsDevice` seam and the objects it reports
//! - `card`: the `Card` device over the `drm` crate
//! - `binder`: device/connector/mode/CRTC selection
//! - `framebuffer`: per-buffer scanout framebuffers

pub mod binder;
mod card;
pub mod device;
pub mod framebuffer;

#[cfg(test)]
pub mod mock;

pub use binder::{bind, bind_with, select_mode, BindError, BindRequest, DisplayBinding, ModeRequest};
pub use card::Card;
pub use device::{
    Connection, ConnectorInfo, EncoderInfo, FramebufferFlags, FramebufferRequest, KmsDevice,
    ModeInfo, ModeTypeFlags, Resources,
};
pub use framebuffer::{CreationPath, Framebuffer, FramebufferCache, FramebufferError};
