// src/gbm/mock.rs

//! In-memory `BufferDevice` for tests.

use super::buffer::{
    BufferDescriptor, BufferDevice, BufferHandle, BufferUsage, PlaneLayout, SurfaceHandle,
};
use drm_fourcc::DrmModifier;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::ffi::c_void;
use std::io;
use std::os::fd::OwnedFd;
use std::rc::Rc;

/// What the device has been asked to do, shared with the handles it made.
#[derive(Default)]
pub struct MockBufferState {
    pub modifier_allocations: RefCell<Vec<Vec<DrmModifier>>>,
    pub plain_allocations: RefCell<Vec<BufferUsage>>,
    pub surfaces_created: Cell<usize>,
    /// Scripted results for upcoming buffer allocations of either kind.
    pub allocation_results: RefCell<VecDeque<io::Result<()>>>,
    live_buffers: Cell<usize>,
    live_surfaces: Cell<usize>,
    next_handle: Cell<u32>,
}

impl MockBufferState {
    pub fn live_buffers(&self) -> usize {
        self.live_buffers.get()
    }

    pub fn live_surfaces(&self) -> usize {
        self.live_surfaces.get()
    }

    pub fn allocation_attempts(&self) -> usize {
        self.modifier_allocations.borrow().len() + self.plain_allocations.borrow().len()
    }

    pub fn fail_next_allocation(&self) {
        self.allocation_results
            .borrow_mut()
            .push_back(Err(io::Error::from_raw_os_error(libc::EINVAL)));
    }

    pub fn succeed_next_allocation(&self) {
        self.allocation_results.borrow_mut().push_back(Ok(()));
    }

    fn scripted(&self) -> io::Result<()> {
        self.allocation_results.borrow_mut().pop_front().unwrap_or(Ok(()))
    }
}

/// Test buffer. Dropping it marks the allocation as released.
pub struct MockBuffer {
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub handle: u32,
    pub stride: u32,
    pub modifier: Option<DrmModifier>,
    pub planes: Option<Vec<PlaneLayout>>,
    pub export_error: Option<i32>,
    state: Option<Rc<MockBufferState>>,
    on_release: Option<Box<dyn FnOnce()>>,
}

impl MockBuffer {
    /// A lone linear buffer, not tracked by any device.
    pub fn new(width: u32, height: u32, format: u32) -> Self {
        Self {
            width,
            height,
            format,
            handle: 7,
            stride: width * 4,
            modifier: Some(DrmModifier::Linear),
            planes: Some(vec![PlaneLayout {
                handle: 7,
                stride: width * 4,
                offset: 0,
            }]),
            export_error: None,
            state: None,
            on_release: None,
        }
    }

    pub fn with_modifier(mut self, modifier: DrmModifier) -> Self {
        self.modifier = Some(modifier);
        self
    }

    pub fn with_planes(mut self, planes: Vec<PlaneLayout>) -> Self {
        self.planes = Some(planes);
        self
    }

    /// Runs `hook` when the buffer memory is released.
    pub fn on_release(mut self, hook: impl FnOnce() + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    /// Behaves like a platform without modifier or per-plane queries.
    pub fn without_layout_queries(mut self) -> Self {
        self.modifier = None;
        self.planes = None;
        self
    }
}

impl BufferHandle for MockBuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> u32 {
        self.format
    }

    fn handle(&self) -> u32 {
        self.handle
    }

    fn stride(&self) -> u32 {
        self.stride
    }

    fn modifier(&self) -> Option<DrmModifier> {
        self.modifier
    }

    fn planes(&self) -> Option<Vec<PlaneLayout>> {
        self.planes.clone()
    }

    fn export_fd(&self) -> io::Result<OwnedFd> {
        if let Some(errno) = self.export_error {
            return Err(io::Error::from_raw_os_error(errno));
        }
        // Any real descriptor will do; it is only ever closed.
        Ok(std::fs::File::open("/dev/null")?.into())
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook();
        }
        if let Some(state) = &self.state {
            state.live_buffers.set(state.live_buffers.get() - 1);
        }
    }
}

pub struct MockSurface {
    state: Rc<MockBufferState>,
}

impl SurfaceHandle for MockSurface {
    fn native_window(&self) -> *mut c_void {
        0x5000 as *mut c_void
    }
}

impl Drop for MockSurface {
    fn drop(&mut self) {
        self.state.live_surfaces.set(self.state.live_surfaces.get() - 1);
    }
}

pub struct MockBufferDevice {
    pub modifiers: bool,
    pub surface_modifiers: bool,
    pub state: Rc<MockBufferState>,
}

impl MockBufferDevice {
    pub fn new(modifiers: bool) -> Self {
        Self {
            modifiers,
            surface_modifiers: modifiers,
            state: Rc::default(),
        }
    }

    pub fn state(&self) -> Rc<MockBufferState> {
        Rc::clone(&self.state)
    }

    fn make_buffer(
        &self,
        descriptor: &BufferDescriptor,
        modifier: Option<DrmModifier>,
    ) -> Box<dyn BufferHandle> {
        let handle = self.state.next_handle.get() + 1;
        self.state.next_handle.set(handle);
        self.state.live_buffers.set(self.state.live_buffers.get() + 1);
        let stride = descriptor.width * 4;
        Box::new(MockBuffer {
            width: descriptor.width,
            height: descriptor.height,
            format: descriptor.format as u32,
            handle,
            stride,
            modifier,
            planes: Some(vec![PlaneLayout {
                handle,
                stride,
                offset: 0,
            }]),
            export_error: None,
            state: Some(Rc::clone(&self.state)),
            on_release: None,
        })
    }

    fn make_surface(&self) -> Box<dyn SurfaceHandle> {
        self.state.surfaces_created.set(self.state.surfaces_created.get() + 1);
        self.state.live_surfaces.set(self.state.live_surfaces.get() + 1);
        Box::new(MockSurface {
            state: Rc::clone(&self.state),
        })
    }
}

impl BufferDevice for MockBufferDevice {
    fn native_display(&self) -> *mut c_void {
        0x4000 as *mut c_void
    }

    fn supports_modifiers(&self) -> bool {
        self.modifiers
    }

    fn create_buffer_with_modifiers(
        &self,
        descriptor: &BufferDescriptor,
        modifiers: &[DrmModifier],
    ) -> io::Result<Box<dyn BufferHandle>> {
        self.state.modifier_allocations.borrow_mut().push(modifiers.to_vec());
        self.state.scripted()?;
        Ok(self.make_buffer(descriptor, modifiers.first().copied()))
    }

    fn create_buffer(
        &self,
        descriptor: &BufferDescriptor,
        usage: BufferUsage,
    ) -> io::Result<Box<dyn BufferHandle>> {
        self.state.plain_allocations.borrow_mut().push(usage);
        self.state.scripted()?;
        Ok(self.make_buffer(descriptor, Some(DrmModifier::Linear)))
    }

    fn supports_surface_modifiers(&self) -> bool {
        self.surface_modifiers
    }

    fn create_surface_with_modifiers(
        &self,
        _descriptor: &BufferDescriptor,
        modifiers: &[DrmModifier],
    ) -> io::Result<Box<dyn SurfaceHandle>> {
        self.state.modifier_allocations.borrow_mut().push(modifiers.to_vec());
        self.state.scripted()?;
        Ok(self.make_surface())
    }

    fn create_surface(
        &self,
        _descriptor: &BufferDescriptor,
        usage: BufferUsage,
    ) -> io::Result<Box<dyn SurfaceHandle>> {
        self.state.plain_allocations.borrow_mut().push(usage);
        self.state.scripted()?;
        Ok(self.make_surface())
    }
}
