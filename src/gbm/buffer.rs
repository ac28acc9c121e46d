// src/gbm/buffer.rs

//! Buffer objects and the allocator seam they come from.
//!
//! A [`BufferObject`] owns the platform allocation behind a
//! [`BufferHandle`] and, once it has been scanned out, the kernel
//! [`Framebuffer`] registered for it. Dropping the buffer object removes the
//! framebuffer from the kernel before the memory is released.

use crate::kms::Framebuffer;
use bitflags::bitflags;
use drm_fourcc::{DrmFourcc, DrmModifier};
use log::trace;
use std::ffi::c_void;
use std::fmt;
use std::io;
use std::os::fd::OwnedFd;

bitflags! {
    /// `GBM_BO_USE_*` flags for allocations without modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const SCANOUT = 1 << 0;
        const CURSOR = 1 << 1;
        const RENDERING = 1 << 2;
        const WRITE = 1 << 3;
        const LINEAR = 1 << 4;
    }
}

/// Identity of a buffer object within one allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bo#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: DrmFourcc,
}

/// Layout of one memory plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaneLayout {
    /// Kernel (GEM) handle of the plane's memory.
    pub handle: u32,
    pub stride: u32,
    pub offset: u32,
}

/// Queries on a platform allocation. Dropping the handle frees the memory.
pub trait BufferHandle {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// FOURCC code of the pixel format.
    fn format(&self) -> u32;
    /// Kernel handle of plane zero.
    fn handle(&self) -> u32;
    /// Stride of plane zero.
    fn stride(&self) -> u32;
    /// `None` when the platform cannot report modifiers.
    fn modifier(&self) -> Option<DrmModifier>;
    /// Every plane's layout, or `None` when the platform has no per-plane queries.
    fn planes(&self) -> Option<Vec<PlaneLayout>>;
    /// A new shareable (dma-buf) descriptor for the buffer's memory.
    fn export_fd(&self) -> io::Result<OwnedFd>;
}

/// A windowed allocation whose buffers are handed out by the GPU driver.
pub trait SurfaceHandle {
    /// Native window handle for EGL window surface creation.
    fn native_window(&self) -> *mut c_void;
}

/// Buffer allocation primitives of a GPU device.
pub trait BufferDevice {
    /// Native display handle for EGL platform display creation.
    fn native_display(&self) -> *mut c_void;

    fn supports_modifiers(&self) -> bool;
    fn create_buffer_with_modifiers(
        &self,
        descriptor: &BufferDescriptor,
        modifiers: &[DrmModifier],
    ) -> io::Result<Box<dyn BufferHandle>>;
    fn create_buffer(
        &self,
        descriptor: &BufferDescriptor,
        usage: BufferUsage,
    ) -> io::Result<Box<dyn BufferHandle>>;

    fn supports_surface_modifiers(&self) -> bool;
    fn create_surface_with_modifiers(
        &self,
        descriptor: &BufferDescriptor,
        modifiers: &[DrmModifier],
    ) -> io::Result<Box<dyn SurfaceHandle>>;
    fn create_surface(
        &self,
        descriptor: &BufferDescriptor,
        usage: BufferUsage,
    ) -> io::Result<Box<dyn SurfaceHandle>>;
}

/// GPU-writable, scannable memory plus its cached scanout framebuffer.
pub struct BufferObject {
    id: BufferId,
    framebuffer: Option<Framebuffer>,
    handle: Box<dyn BufferHandle>,
}

impl BufferObject {
    pub(crate) fn new(id: BufferId, handle: Box<dyn BufferHandle>) -> Self {
        Self {
            id,
            framebuffer: None,
            handle,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.handle.width()
    }

    pub fn height(&self) -> u32 {
        self.handle.height()
    }

    pub fn format(&self) -> u32 {
        self.handle.format()
    }

    pub fn gem_handle(&self) -> u32 {
        self.handle.handle()
    }

    pub fn stride(&self) -> u32 {
        self.handle.stride()
    }

    pub fn modifier(&self) -> Option<DrmModifier> {
        self.handle.modifier()
    }

    pub fn planes(&self) -> Option<Vec<PlaneLayout>> {
        self.handle.planes()
    }

    pub fn export_fd(&self) -> io::Result<OwnedFd> {
        self.handle.export_fd()
    }

    /// The cached scanout framebuffer, if one has been created.
    pub fn framebuffer(&self) -> Option<&Framebuffer> {
        self.framebuffer.as_ref()
    }

    pub(crate) fn take_framebuffer(&mut self) -> Option<Framebuffer> {
        self.framebuffer.take()
    }

    pub(crate) fn attach_framebuffer(&mut self, framebuffer: Framebuffer) -> &Framebuffer {
        self.framebuffer.insert(framebuffer)
    }
}

impl Drop for BufferObject {
    fn drop(&mut self) {
        // The kernel framebuffer references our memory: remove it first.
        if let Some(framebuffer) = self.framebuffer.take() {
            trace!("{}: releasing framebuffer {}", self.id, framebuffer.id());
            drop(framebuffer);
        }
        trace!("{}: releasing memory", self.id);
    }
}

impl fmt::Debug for BufferObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferObject")
            .field("id", &self.id)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &format_args!("{:#010x}", self.format()))
            .field("framebuffer", &self.framebuffer.as_ref().map(Framebuffer::id))
            .finish()
    }
}
