// src/gpu/context.rs

//! Importing buffer objects into the rendering context as render targets.
//!
//! The rendering API sits behind [`GpuBackend`]. [`import`] turns one buffer
//! object into a [`GpuImage`]: an image created from the buffer's dma-buf,
//! a texture bound to it and a render target with that texture attached.
//! [`GpuContext`] owns the backend and every image imported at setup.

use super::ffi;
use crate::caps::CapabilityTable;
use crate::gbm::{BufferId, BufferObject};
use drm_fourcc::DrmModifier;
use log::{debug, info};
use std::os::fd::{AsRawFd, RawFd};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("required GPU capability {0} is not available")]
    MissingCapability(&'static str),
    #[error("failed to import {buffer} into the GPU context: {reason}")]
    ImportFailed { buffer: BufferId, reason: String },
    #[error("GPU platform error: {0}")]
    Platform(String),
}

/// Opaque handle of an image created from external memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetId(pub u32);

/// The capability tables negotiated during context setup.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub client: CapabilityTable,
    pub display: CapabilityTable,
    pub gl: CapabilityTable,
    /// Images can be created with an explicit layout modifier.
    pub modifiers_supported: bool,
}

impl GpuCapabilities {
    pub fn image_import_supported(&self) -> bool {
        self.display
            .contains_all(&[ffi::CREATE_IMAGE, ffi::DESTROY_IMAGE])
            && self.gl.contains(ffi::IMAGE_TARGET_TEXTURE_2D)
    }

    pub fn fence_sync_supported(&self) -> bool {
        self.display.contains_all(&[
            ffi::CREATE_SYNC,
            ffi::DESTROY_SYNC,
            ffi::WAIT_SYNC,
            ffi::CLIENT_WAIT_SYNC,
        ])
    }

    pub fn native_fence_supported(&self) -> bool {
        self.fence_sync_supported() && self.display.contains(ffi::DUP_NATIVE_FENCE_FD)
    }

    /// The first missing piece of image import, if any.
    fn missing_import_capability(&self) -> Option<&'static str> {
        if !self.display.contains_all(&[ffi::CREATE_IMAGE, ffi::DESTROY_IMAGE]) {
            Some("EGL_KHR_image_base")
        } else if !self.gl.contains(ffi::IMAGE_TARGET_TEXTURE_2D) {
            Some("GL_OES_EGL_image")
        } else {
            None
        }
    }
}

/// The rendering API operations image import needs.
pub trait GpuBackend {
    fn capabilities(&self) -> &GpuCapabilities;

    /// Creates an image from a dma-buf attribute list (terminated by `EGL_NONE`).
    fn create_image(&self, attributes: &[i32]) -> Result<ImageId, String>;
    fn destroy_image(&self, image: ImageId);

    /// A 2D texture whose storage is `image`.
    fn create_texture(&self, image: ImageId) -> TextureId;
    fn delete_texture(&self, texture: TextureId);

    /// A render target with `texture` as its colour attachment.
    fn create_render_target(&self, texture: TextureId) -> RenderTargetId;
    fn render_target_complete(&self, target: RenderTargetId) -> bool;
    fn delete_render_target(&self, target: RenderTargetId);
}

fn is_explicit_modifier(modifier: DrmModifier) -> bool {
    modifier != DrmModifier::Linear && modifier != DrmModifier::Invalid
}

/// Builds the dma-buf import attribute list for plane zero of `buffer`.
///
/// The modifier is only passed (split into its low and high halves) when the
/// context supports explicit modifiers and the buffer is not linear.
pub fn image_attributes(buffer: &BufferObject, fd: RawFd, modifiers_supported: bool) -> Vec<i32> {
    let offset = buffer
        .planes()
        .and_then(|planes| planes.first().map(|plane| plane.offset))
        .unwrap_or(0);

    let mut attributes = vec![
        ffi::EGL_WIDTH,
        buffer.width() as i32,
        ffi::EGL_HEIGHT,
        buffer.height() as i32,
        ffi::EGL_LINUX_DRM_FOURCC_EXT,
        buffer.format() as i32,
        ffi::EGL_DMA_BUF_PLANE0_FD_EXT,
        fd,
        ffi::EGL_DMA_BUF_PLANE0_OFFSET_EXT,
        offset as i32,
        ffi::EGL_DMA_BUF_PLANE0_PITCH_EXT,
        buffer.stride() as i32,
    ];

    if modifiers_supported {
        if let Some(modifier) = buffer.modifier().filter(|&m| is_explicit_modifier(m)) {
            let raw = u64::from(modifier);
            attributes.extend_from_slice(&[
                ffi::EGL_DMA_BUF_PLANE0_MODIFIER_LO_EXT,
                (raw & 0xffff_ffff) as u32 as i32,
                ffi::EGL_DMA_BUF_PLANE0_MODIFIER_HI_EXT,
                (raw >> 32) as u32 as i32,
            ]);
        }
    }

    attributes.push(ffi::EGL_NONE);
    attributes
}

/// A buffer object imported as a render target. Released by its context.
#[derive(Debug, PartialEq, Eq)]
pub struct GpuImage {
    source: BufferId,
    image: ImageId,
    texture: TextureId,
    target: RenderTargetId,
}

impl GpuImage {
    pub fn source(&self) -> BufferId {
        self.source
    }

    /// What rendering code binds to draw into the buffer.
    pub fn render_target(&self) -> RenderTargetId {
        self.target
    }

    fn release<B: GpuBackend + ?Sized>(&self, backend: &B) {
        backend.delete_render_target(self.target);
        backend.delete_texture(self.texture);
        backend.destroy_image(self.image);
    }
}

/// Imports `buffer` as a render target.
///
/// Nothing is left behind on failure.
pub fn import<B: GpuBackend + ?Sized>(backend: &B, buffer: &BufferObject) -> Result<GpuImage, GpuError> {
    let failed = |reason: String| GpuError::ImportFailed {
        buffer: buffer.id(),
        reason,
    };

    let fd = buffer
        .export_fd()
        .map_err(|e| failed(format!("could not export a dma-buf descriptor: {}", e)))?;
    let attributes = image_attributes(buffer, fd.as_raw_fd(), backend.capabilities().modifiers_supported);
    let image = backend.create_image(&attributes).map_err(failed)?;
    // The image holds its own reference to the memory now.
    drop(fd);

    let texture = backend.create_texture(image);
    let target = backend.create_render_target(texture);
    if !backend.render_target_complete(target) {
        backend.delete_render_target(target);
        backend.delete_texture(texture);
        backend.destroy_image(image);
        return Err(failed("render target is incomplete".to_string()));
    }

    debug!(
        "{}: imported as image {:?}, texture {}, render target {}",
        buffer.id(),
        image,
        texture.0,
        target.0
    );
    Ok(GpuImage {
        source: buffer.id(),
        image,
        texture,
        target,
    })
}

/// The rendering context and the images imported into it.
///
/// Images are released before the backend is torn down.
pub struct GpuContext<B: GpuBackend> {
    images: Vec<GpuImage>,
    backend: B,
}

impl<B: GpuBackend> GpuContext<B> {
    /// Takes ownership of `backend` and imports every buffer in `buffers`.
    ///
    /// Image import support is checked once here when there is anything to
    /// import. If an import fails, the images created before it are released.
    pub fn new(backend: B, buffers: &[BufferObject]) -> Result<Self, GpuError> {
        if !buffers.is_empty() {
            if let Some(missing) = backend.capabilities().missing_import_capability() {
                return Err(GpuError::MissingCapability(missing));
            }
        }

        let mut context = Self {
            images: Vec::with_capacity(buffers.len()),
            backend,
        };
        for buffer in buffers {
            let image = import(&context.backend, buffer)?;
            context.images.push(image);
        }

        if !context.images.is_empty() {
            info!("Imported {} buffer(s) as render targets", context.images.len());
        }
        Ok(context)
    }

    pub fn capabilities(&self) -> &GpuCapabilities {
        self.backend.capabilities()
    }

    pub fn images(&self) -> &[GpuImage] {
        &self.images
    }

    /// The image imported from `buffer`, if any.
    pub fn image_for(&self, buffer: BufferId) -> Option<&GpuImage> {
        self.images.iter().find(|image| image.source == buffer)
    }
}

impl<B: GpuBackend> Drop for GpuContext<B> {
    fn drop(&mut self) {
        let count = self.images.len();
        for image in self.images.drain(..) {
            image.release(&self.backend);
        }
        if count > 0 {
            debug!("Released {} imported image(s)", count);
        }
    }
}
