// src/kms/framebuffer.rs

//! Scanout framebuffers for buffer objects.
//!
//! Each buffer object gets at most one kernel framebuffer, created the first
//! time it is needed and stored on the buffer object itself. The framebuffer
//! is removed from the kernel exactly when its buffer object is dropped.

use super::device::{FramebufferFlags, FramebufferRequest, KmsDevice};
use crate::gbm::{BufferId, BufferObject, PlaneLayout};
use drm_fourcc::DrmModifier;
use log::{debug, info, trace, warn};
use std::fmt;
use std::io;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FramebufferError {
    #[error("failed to create framebuffer for {buffer}: {source}")]
    CreateFailed {
        buffer: BufferId,
        #[source]
        source: io::Error,
    },
}

/// How a framebuffer was registered with the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationPath {
    /// Every plane, with the buffer's modifier when it is not linear.
    Planar,
    /// Plane zero only, no modifier.
    Legacy,
}

/// A kernel scanout framebuffer. Removed from the kernel on drop.
pub struct Framebuffer {
    id: u32,
    owner: BufferId,
    path: CreationPath,
    device: Rc<dyn KmsDevice>,
}

impl Framebuffer {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The buffer object this framebuffer scans out. Lookup only.
    pub fn owner(&self) -> BufferId {
        self.owner
    }

    pub fn path(&self) -> CreationPath {
        self.path
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        if self.id == 0 {
            return;
        }
        match self.device.remove_framebuffer(self.id) {
            Ok(()) => trace!("Removed framebuffer {} of {}", self.id, self.owner),
            Err(e) => warn!("Failed to remove framebuffer {} of {}: {}", self.id, self.owner, e),
        }
    }
}

impl fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framebuffer")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("path", &self.path)
            .finish()
    }
}

fn is_explicit_modifier(modifier: DrmModifier) -> bool {
    modifier != DrmModifier::Linear && modifier != DrmModifier::Invalid
}

pub struct FramebufferCache {
    device: Rc<dyn KmsDevice>,
    kernel_modifiers: bool,
}

impl FramebufferCache {
    pub fn new(device: Rc<dyn KmsDevice>) -> Self {
        let kernel_modifiers = device.supports_fb_modifiers();
        debug!("Kernel framebuffer modifiers supported: {}", kernel_modifiers);
        Self {
            device,
            kernel_modifiers,
        }
    }

    /// Returns the buffer object's framebuffer, creating it on first use.
    ///
    /// Repeated calls on the same buffer object return the same framebuffer.
    pub fn get_or_create<'b>(
        &self,
        buffer: &'b mut BufferObject,
    ) -> Result<&'b Framebuffer, FramebufferError> {
        let framebuffer = match buffer.take_framebuffer() {
            Some(cached) => cached,
            None => self.create(buffer)?,
        };
        Ok(buffer.attach_framebuffer(framebuffer))
    }

    fn create(&self, buffer: &BufferObject) -> Result<Framebuffer, FramebufferError> {
        let (width, height, format) = (buffer.width(), buffer.height(), buffer.format());

        let mut planar_attempted_with_modifier = false;
        let planar = match (buffer.planes(), buffer.modifier()) {
            (Some(planes), Some(modifier)) => {
                if is_explicit_modifier(modifier) && !self.kernel_modifiers {
                    warn!(
                        "{}: kernel cannot take modifier {:#x}, using single-plane framebuffer",
                        buffer.id(),
                        u64::from(modifier)
                    );
                    None
                } else {
                    let request = planar_request(width, height, format, &planes, modifier);
                    if request.flags.contains(FramebufferFlags::MODIFIERS) {
                        info!("{}: using modifier {:#x}", buffer.id(), u64::from(modifier));
                        planar_attempted_with_modifier = true;
                    }
                    Some(self.device.add_framebuffer(&request))
                }
            }
            _ => None,
        };

        let (id, path) = match planar {
            Some(Ok(id)) => (id, CreationPath::Planar),
            Some(Err(e)) => {
                if planar_attempted_with_modifier {
                    warn!("{}: modifier framebuffer rejected: {}", buffer.id(), e);
                } else {
                    debug!("{}: planar framebuffer rejected: {}", buffer.id(), e);
                }
                (self.add_legacy(buffer)?, CreationPath::Legacy)
            }
            None => (self.add_legacy(buffer)?, CreationPath::Legacy),
        };

        debug!("{}: framebuffer {} via {:?} path", buffer.id(), id, path);
        Ok(Framebuffer {
            id,
            owner: buffer.id(),
            path,
            device: Rc::clone(&self.device),
        })
    }

    /// Plane zero only. Additional planes of a multi-plane buffer are dropped.
    fn add_legacy(&self, buffer: &BufferObject) -> Result<u32, FramebufferError> {
        let mut request = FramebufferRequest::new(buffer.width(), buffer.height(), buffer.format());
        request.handles[0] = buffer.gem_handle();
        request.pitches[0] = buffer.stride();
        self.device
            .add_framebuffer(&request)
            .map_err(|source| FramebufferError::CreateFailed {
                buffer: buffer.id(),
                source,
            })
    }
}

fn planar_request(
    width: u32,
    height: u32,
    format: u32,
    planes: &[PlaneLayout],
    modifier: DrmModifier,
) -> FramebufferRequest {
    let mut request = FramebufferRequest::new(width, height, format);
    let raw_modifier = u64::from(modifier);
    for (index, plane) in planes.iter().take(4).enumerate() {
        request.handles[index] = plane.handle;
        request.pitches[index] = plane.stride;
        request.offsets[index] = plane.offset;
        request.modifiers[index] = raw_modifier;
    }
    if is_explicit_modifier(modifier) {
        request.flags |= FramebufferFlags::MODIFIERS;
    }
    request
}
