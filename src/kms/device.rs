// src/kms/device.rs

//! The kernel display device seam.
//!
//! [`KmsDevice`] is the minimal set of mode-setting primitives the binder and
//! the framebuffer cache need. [`Card`](super::Card) implements it on top of
//! the `drm` crate; tests implement it in memory.

use bitflags::bitflags;
use std::io;
use std::os::unix::io::RawFd;

/// Kernel limit on mode names, including the terminating NUL.
pub const DISPLAY_MODE_LEN: usize = 32;

bitflags! {
    /// `DRM_MODE_TYPE_*` bits of a mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModeTypeFlags: u32 {
        const BUILTIN = 1 << 0;
        const CLOCK_C = (1 << 1) | (1 << 0);
        const CRTC_C = (1 << 2) | (1 << 0);
        const PREFERRED = 1 << 3;
        const DEFAULT = 1 << 4;
        const USERDEF = 1 << 5;
        const DRIVER = 1 << 6;
    }
}

bitflags! {
    /// `DRM_MODE_FB_*` flags passed with a framebuffer request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FramebufferFlags: u32 {
        const INTERLACED = 1 << 0;
        const MODIFIERS = 1 << 1;
    }
}

/// A display mode advertised by a connector.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModeInfo {
    pub name: String,
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub mode_type: ModeTypeFlags,
}

impl ModeInfo {
    pub fn area(&self) -> u32 {
        self.hdisplay as u32 * self.vdisplay as u32
    }

    pub fn is_preferred(&self) -> bool {
        self.mode_type.contains(ModeTypeFlags::PREFERRED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Connected,
    Disconnected,
    Unknown,
}

impl From<u32> for Connection {
    fn from(raw: u32) -> Self {
        match raw {
            1 => Connection::Connected,
            2 => Connection::Disconnected,
            _ => Connection::Unknown,
        }
    }
}

/// A physical output and what it advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorInfo {
    pub id: u32,
    /// Interface and its per-type index, e.g. `HDMIA-1`.
    pub interface: String,
    pub connection: Connection,
    /// Encoder currently driving this connector, if any.
    pub encoder_id: Option<u32>,
    /// Encoders that can drive this connector.
    pub encoders: Vec<u32>,
    pub modes: Vec<ModeInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderInfo {
    pub id: u32,
    /// CRTC the encoder is currently bound to, if any.
    pub crtc_id: Option<u32>,
    /// Bit `i` set means the encoder can be driven by `Resources::crtcs[i]`.
    pub possible_crtcs: u32,
}

/// Object ids reported by `GETRESOURCES`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resources {
    pub crtcs: Vec<u32>,
    pub connectors: Vec<u32>,
    pub encoders: Vec<u32>,
}

impl Resources {
    /// A device is only usable for scanout if it exposes something to drive.
    pub fn is_empty(&self) -> bool {
        self.crtcs.is_empty() || self.connectors.is_empty()
    }
}

/// Arguments of an `ADDFB2` request. Unused planes are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FramebufferRequest {
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub handles: [u32; 4],
    pub pitches: [u32; 4],
    pub offsets: [u32; 4],
    pub modifiers: [u64; 4],
    pub flags: FramebufferFlags,
}

impl FramebufferRequest {
    pub fn new(width: u32, height: u32, format: u32) -> Self {
        Self {
            width,
            height,
            format,
            ..Default::default()
        }
    }
}

/// Mode-setting primitives of an opened display device.
pub trait KmsDevice {
    fn resources(&self) -> io::Result<Resources>;
    fn connector(&self, id: u32) -> io::Result<ConnectorInfo>;
    fn encoder(&self, id: u32) -> io::Result<EncoderInfo>;

    /// Whether the kernel accepts per-plane modifiers in `ADDFB2`.
    fn supports_fb_modifiers(&self) -> bool;

    /// Registers a scanout framebuffer and returns its id.
    fn add_framebuffer(&self, request: &FramebufferRequest) -> io::Result<u32>;
    fn remove_framebuffer(&self, fb_id: u32) -> io::Result<()>;

    /// Descriptor handed to the buffer allocator.
    fn raw_fd(&self) -> RawFd;
}
