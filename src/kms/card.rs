// src/kms/card.rs

//! The `/dev/dri/cardN` device, driven through the `drm` crate.

use super::device::{
    Connection, ConnectorInfo, EncoderInfo, FramebufferFlags, FramebufferRequest, KmsDevice, ModeInfo,
    ModeTypeFlags, Resources,
};
use drm::buffer::{self, DrmFourcc, DrmModifier, PlanarBuffer};
use drm::control::{self, connector, encoder, framebuffer, FbCmd2Flags};
use drm::control::Device as _;
use drm::Device as _;
use drm::DriverCapability;
use log::{debug, trace, warn};
use std::fs::{File, OpenOptions};
use std::io;
use std::num::NonZeroU32;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

const DRM_DIR: &str = "/dev/dri";

/// An opened DRM primary node.
#[derive(Debug)]
pub struct Card(File);

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl drm::Device for Card {}
impl control::Device for Card {}

impl Card {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)?;
        debug!("Opened DRM device {} (fd {})", path.display(), file.as_raw_fd());
        Ok(Self(file))
    }

    /// Lists primary nodes (`cardN`) in numeric order.
    pub fn enumerate() -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(DRM_DIR) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list {}: {}", DRM_DIR, e);
                return Vec::new();
            }
        };
        let mut cards: Vec<(u32, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let index = name.to_str()?.strip_prefix("card")?.parse::<u32>().ok()?;
                Some((index, entry.path()))
            })
            .collect();
        cards.sort_by_key(|(index, _)| *index);
        cards.into_iter().map(|(_, path)| path).collect()
    }
}

fn handle<T: From<control::RawResourceHandle>>(kind: &str, id: u32) -> io::Result<T> {
    control::from_u32(id)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid {} id {}", kind, id)))
}

fn raw_ids<T: Copy + Into<u32>>(handles: &[T]) -> Vec<u32> {
    handles.iter().map(|&handle| handle.into()).collect()
}

impl From<&control::Mode> for ModeInfo {
    fn from(mode: &control::Mode) -> Self {
        let (hdisplay, vdisplay) = mode.size();
        let (hsync_start, hsync_end, htotal) = mode.hsync();
        let (vsync_start, vsync_end, vtotal) = mode.vsync();
        ModeInfo {
            name: mode.name().to_string_lossy().into_owned(),
            clock: mode.clock(),
            hdisplay,
            hsync_start,
            hsync_end,
            htotal,
            hskew: mode.hskew(),
            vdisplay,
            vsync_start,
            vsync_end,
            vtotal,
            vscan: mode.vscan(),
            vrefresh: mode.vrefresh(),
            flags: mode.flags().bits(),
            mode_type: ModeTypeFlags::from_bits_retain(mode.mode_type().bits()),
        }
    }
}

/// A [`FramebufferRequest`] as the `drm` crate's planar buffer description.
///
/// The modifier is only reported when the request carries
/// [`FramebufferFlags::MODIFIERS`], matching the flags handed to `ADDFB2`.
pub(super) struct PlanarRequest<'a> {
    pub(super) request: &'a FramebufferRequest,
    pub(super) format: DrmFourcc,
}

impl PlanarBuffer for PlanarRequest<'_> {
    fn size(&self) -> (u32, u32) {
        (self.request.width, self.request.height)
    }

    fn format(&self) -> DrmFourcc {
        self.format
    }

    fn modifier(&self) -> Option<DrmModifier> {
        self.request
            .flags
            .contains(FramebufferFlags::MODIFIERS)
            .then(|| DrmModifier::from(self.request.modifiers[0]))
    }

    fn pitches(&self) -> [u32; 4] {
        self.request.pitches
    }

    fn handles(&self) -> [Option<buffer::Handle>; 4] {
        self.request
            .handles
            .map(|raw| NonZeroU32::new(raw).map(buffer::Handle::from))
    }

    fn offsets(&self) -> [u32; 4] {
        self.request.offsets
    }
}

impl KmsDevice for Card {
    fn resources(&self) -> io::Result<Resources> {
        let handles = self.resource_handles()?;
        Ok(Resources {
            crtcs: raw_ids(handles.crtcs()),
            connectors: raw_ids(handles.connectors()),
            encoders: raw_ids(handles.encoders()),
        })
    }

    fn connector(&self, id: u32) -> io::Result<ConnectorInfo> {
        // Forcing a probe refreshes the mode list of hot-plugged outputs.
        let info = self.get_connector(handle::<connector::Handle>("connector", id)?, true)?;
        Ok(ConnectorInfo {
            id,
            interface: format!("{:?}-{}", info.interface(), info.interface_id()),
            connection: match info.state() {
                connector::State::Connected => Connection::Connected,
                connector::State::Disconnected => Connection::Disconnected,
                connector::State::Unknown => Connection::Unknown,
            },
            encoder_id: info.current_encoder().map(u32::from),
            encoders: raw_ids(info.encoders()),
            modes: info.modes().iter().map(ModeInfo::from).collect(),
        })
    }

    fn encoder(&self, id: u32) -> io::Result<EncoderInfo> {
        let info = self.get_encoder(handle::<encoder::Handle>("encoder", id)?)?;
        // Rebuild the kernel bitmask against the GETRESOURCES CRTC order.
        let handles = self.resource_handles()?;
        let possible = handles.filter_crtcs(info.possible_crtcs());
        let possible_crtcs = handles
            .crtcs()
            .iter()
            .take(32)
            .enumerate()
            .filter(|&(_, crtc)| possible.contains(crtc))
            .fold(0u32, |mask, (index, _)| mask | (1 << index));
        Ok(EncoderInfo {
            id,
            crtc_id: info.crtc().map(u32::from),
            possible_crtcs,
        })
    }

    fn supports_fb_modifiers(&self) -> bool {
        match self.get_driver_capability(DriverCapability::AddFB2Modifiers) {
            Ok(value) => value != 0,
            Err(e) => {
                debug!("ADDFB2_MODIFIERS capability query failed: {}", e);
                false
            }
        }
    }

    fn add_framebuffer(&self, request: &FramebufferRequest) -> io::Result<u32> {
        let format = DrmFourcc::try_from(request.format).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown pixel format {:#010x}", request.format),
            )
        })?;
        let planar = PlanarRequest { request, format };
        let flags = FbCmd2Flags::from_bits_truncate(request.flags.bits());
        let fb = control::Device::add_planar_framebuffer(self, &planar, flags)?;
        let fb_id = u32::from(fb);
        trace!(
            "ADDFB2 {}x{} {:?} flags {:?} -> fb {}",
            request.width,
            request.height,
            format,
            request.flags,
            fb_id
        );
        Ok(fb_id)
    }

    fn remove_framebuffer(&self, fb_id: u32) -> io::Result<()> {
        self.destroy_framebuffer(handle::<framebuffer::Handle>("framebuffer", fb_id)?)?;
        trace!("RMFB {}", fb_id);
        Ok(())
    }

    fn raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}
