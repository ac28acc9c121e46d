// src/gbm/pool.rs

//! Buffer allocation with modifier negotiation, and the fixed pool of
//! buffers (or the single window surface) rendering cycles through.

use super::buffer::{
    BufferDescriptor, BufferDevice, BufferHandle, BufferId, BufferObject, BufferUsage,
    SurfaceHandle,
};
use drm_fourcc::{DrmFourcc, DrmModifier};
use log::{debug, info, warn};
use std::cell::Cell;
use std::io;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AllocError {
    #[error("modifier {:#x} requested but modifier-aware allocation is not available", raw_modifier(.0))]
    UnsupportedModifier(DrmModifier),
    #[error("failed to allocate {width}x{height} {format:?} {kind} with modifier {:#x}: {source}", raw_modifier(.modifier))]
    AllocationFailed {
        kind: &'static str,
        width: u32,
        height: u32,
        format: DrmFourcc,
        modifier: DrmModifier,
        #[source]
        source: io::Error,
    },
}

fn raw_modifier(modifier: &DrmModifier) -> u64 {
    u64::from(*modifier)
}

const SCANOUT_RENDERING: BufferUsage = BufferUsage::SCANOUT.union(BufferUsage::RENDERING);

/// Allocates buffer objects and surfaces from one device.
pub struct BufferAllocator {
    device: Rc<dyn BufferDevice>,
    next_id: Cell<u64>,
}

impl BufferAllocator {
    pub fn new(device: Rc<dyn BufferDevice>) -> Self {
        Self {
            device,
            next_id: Cell::new(0),
        }
    }

    pub fn device(&self) -> &Rc<dyn BufferDevice> {
        &self.device
    }

    /// Allocates one scannable, renderable buffer object.
    ///
    /// Modifier-aware allocation is tried first. Without it, only the linear
    /// modifier can be honoured (by a plain allocation); any other modifier
    /// fails with [`AllocError::UnsupportedModifier`] before anything is
    /// allocated.
    pub fn allocate(
        &self,
        descriptor: &BufferDescriptor,
        modifier: DrmModifier,
    ) -> Result<BufferObject, AllocError> {
        let handle = negotiate(
            "buffer",
            descriptor,
            modifier,
            self.device.supports_modifiers(),
            |modifiers| self.device.create_buffer_with_modifiers(descriptor, modifiers),
            |usage| self.device.create_buffer(descriptor, usage),
        )?;
        Ok(self.wrap(handle))
    }

    /// Allocates a window surface under the same modifier policy as
    /// [`allocate`](Self::allocate).
    pub fn allocate_surface(
        &self,
        descriptor: &BufferDescriptor,
        modifier: DrmModifier,
    ) -> Result<Box<dyn SurfaceHandle>, AllocError> {
        negotiate(
            "surface",
            descriptor,
            modifier,
            self.device.supports_surface_modifiers(),
            |modifiers| self.device.create_surface_with_modifiers(descriptor, modifiers),
            |usage| self.device.create_surface(descriptor, usage),
        )
    }

    fn wrap(&self, handle: Box<dyn BufferHandle>) -> BufferObject {
        let id = BufferId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        debug!(
            "{}: allocated {}x{} stride {}",
            id,
            handle.width(),
            handle.height(),
            handle.stride()
        );
        BufferObject::new(id, handle)
    }
}

fn negotiate<T>(
    kind: &'static str,
    descriptor: &BufferDescriptor,
    modifier: DrmModifier,
    modifiers_supported: bool,
    with_modifiers: impl FnOnce(&[DrmModifier]) -> io::Result<T>,
    plain: impl FnOnce(BufferUsage) -> io::Result<T>,
) -> Result<T, AllocError> {
    let failed = |source: io::Error| AllocError::AllocationFailed {
        kind,
        width: descriptor.width,
        height: descriptor.height,
        format: descriptor.format,
        modifier,
        source,
    };

    if modifiers_supported {
        match with_modifiers(&[modifier]) {
            Ok(allocation) => return Ok(allocation),
            Err(e) if modifier != DrmModifier::Linear => return Err(failed(e)),
            Err(e) => warn!(
                "Modifier-aware {} allocation failed ({}), retrying without modifiers",
                kind, e
            ),
        }
    } else if modifier != DrmModifier::Linear {
        return Err(AllocError::UnsupportedModifier(modifier));
    }

    plain(SCANOUT_RENDERING).map_err(failed)
}

/// Parameters fixed when a pool is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolParams {
    pub width: u32,
    pub height: u32,
    pub format: DrmFourcc,
    pub modifier: DrmModifier,
    /// Render into pool-owned buffers instead of a window surface.
    pub surfaceless: bool,
    /// Number of buffers in surfaceless mode.
    pub count: usize,
}

/// What the pool renders into. Exactly one kind, chosen at creation.
pub enum PoolStorage {
    Surface(Box<dyn SurfaceHandle>),
    Buffers(Vec<BufferObject>),
}

/// Rotating render buffers for one output.
pub struct BufferPool {
    // Dropped before the allocator so every buffer (and its framebuffer)
    // goes away while the device is still alive.
    storage: PoolStorage,
    allocator: BufferAllocator,
    descriptor: BufferDescriptor,
    modifier: DrmModifier,
}

impl BufferPool {
    pub fn new(device: Rc<dyn BufferDevice>, params: &PoolParams) -> Result<Self, AllocError> {
        let allocator = BufferAllocator::new(device);
        let descriptor = BufferDescriptor {
            width: params.width,
            height: params.height,
            format: params.format,
        };

        let storage = if params.surfaceless {
            let count = params.count.max(1);
            let mut buffers = Vec::with_capacity(count);
            for _ in 0..count {
                // Buffers already in the vector are released if this fails.
                buffers.push(allocator.allocate(&descriptor, params.modifier)?);
            }
            PoolStorage::Buffers(buffers)
        } else {
            PoolStorage::Surface(allocator.allocate_surface(&descriptor, params.modifier)?)
        };

        info!(
            "Buffer pool ready: {}x{} {:?}, modifier {:#x}, {}",
            params.width,
            params.height,
            params.format,
            u64::from(params.modifier),
            match &storage {
                PoolStorage::Surface(_) => "window surface".to_string(),
                PoolStorage::Buffers(buffers) => format!("{} surfaceless buffer(s)", buffers.len()),
            }
        );

        Ok(Self {
            storage,
            allocator,
            descriptor,
            modifier: params.modifier,
        })
    }

    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    pub fn format(&self) -> DrmFourcc {
        self.descriptor.format
    }

    pub fn modifier(&self) -> DrmModifier {
        self.modifier
    }

    pub fn device(&self) -> &Rc<dyn BufferDevice> {
        self.allocator.device()
    }

    pub fn is_surfaceless(&self) -> bool {
        matches!(self.storage, PoolStorage::Buffers(_))
    }

    pub fn surface(&self) -> Option<&dyn SurfaceHandle> {
        match &self.storage {
            PoolStorage::Surface(surface) => Some(surface.as_ref()),
            PoolStorage::Buffers(_) => None,
        }
    }

    /// Pool buffers; empty in surface mode.
    pub fn buffers(&self) -> &[BufferObject] {
        match &self.storage {
            PoolStorage::Buffers(buffers) => buffers,
            PoolStorage::Surface(_) => &[],
        }
    }

    pub fn buffers_mut(&mut self) -> &mut [BufferObject] {
        match &mut self.storage {
            PoolStorage::Buffers(buffers) => buffers,
            PoolStorage::Surface(_) => &mut [],
        }
    }
}
