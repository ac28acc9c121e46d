// src/gpu/mock.rs

//! Recording `GpuBackend` for tests.

use super::context::{GpuBackend, GpuCapabilities, ImageId, RenderTargetId, TextureId};
use super::ffi;
use crate::caps::{CapabilityScope, CapabilityTable, EntryPoint, SymbolLoader};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::ffi::c_void;
use std::rc::Rc;

/// Resolves every symbol to a dummy address.
struct AnySymbol;

impl SymbolLoader for AnySymbol {
    fn load(&self, _symbol: &str) -> Option<EntryPoint> {
        EntryPoint::from_ptr(0x1000 as *mut c_void)
    }
}

/// Capabilities of a context that can import images.
pub fn import_capabilities(modifiers_supported: bool) -> GpuCapabilities {
    let mut display = CapabilityTable::new(CapabilityScope::Display);
    display.resolve_symbols(&[ffi::CREATE_IMAGE, ffi::DESTROY_IMAGE], &AnySymbol);
    let mut gl = CapabilityTable::new(CapabilityScope::Gl);
    gl.resolve_symbols(&[ffi::IMAGE_TARGET_TEXTURE_2D], &AnySymbol);
    GpuCapabilities {
        client: CapabilityTable::new(CapabilityScope::Client),
        display,
        gl,
        modifiers_supported,
    }
}

/// Capabilities of a context without image import.
pub fn bare_capabilities() -> GpuCapabilities {
    GpuCapabilities {
        client: CapabilityTable::new(CapabilityScope::Client),
        display: CapabilityTable::new(CapabilityScope::Display),
        gl: CapabilityTable::new(CapabilityScope::Gl),
        modifiers_supported: false,
    }
}

#[derive(Default)]
pub struct MockGpuState {
    pub image_requests: RefCell<Vec<Vec<i32>>>,
    pub live_images: RefCell<HashSet<usize>>,
    pub live_textures: RefCell<HashSet<u32>>,
    pub live_targets: RefCell<HashSet<u32>>,
    /// Zero-based index of the `create_image` call that fails.
    pub fail_image_at: Cell<Option<usize>>,
    /// Zero-based index of the render target that reports incomplete.
    pub incomplete_target_at: Cell<Option<usize>>,
    /// Set once the backend itself has been dropped.
    pub backend_dropped: Cell<bool>,
    /// Resources released after the backend was gone.
    pub late_releases: Cell<usize>,
    next_id: Cell<u32>,
    targets_checked: Cell<usize>,
}

impl MockGpuState {
    pub fn live_resources(&self) -> usize {
        self.live_images.borrow().len()
            + self.live_textures.borrow().len()
            + self.live_targets.borrow().len()
    }

    fn next(&self) -> u32 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    fn note_release(&self) {
        if self.backend_dropped.get() {
            self.late_releases.set(self.late_releases.get() + 1);
        }
    }
}

pub struct MockGpuBackend {
    pub capabilities: GpuCapabilities,
    pub state: Rc<MockGpuState>,
}

impl MockGpuBackend {
    pub fn new(capabilities: GpuCapabilities) -> Self {
        Self {
            capabilities,
            state: Rc::default(),
        }
    }

    pub fn state(&self) -> Rc<MockGpuState> {
        Rc::clone(&self.state)
    }
}

impl GpuBackend for MockGpuBackend {
    fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    fn create_image(&self, attributes: &[i32]) -> Result<ImageId, String> {
        let call = self.state.image_requests.borrow().len();
        self.state.image_requests.borrow_mut().push(attributes.to_vec());
        if self.state.fail_image_at.get() == Some(call) {
            return Err("EGL_BAD_MATCH".to_string());
        }
        let id = self.state.next() as usize;
        self.state.live_images.borrow_mut().insert(id);
        Ok(ImageId(id))
    }

    fn destroy_image(&self, image: ImageId) {
        self.state.note_release();
        self.state.live_images.borrow_mut().remove(&image.0);
    }

    fn create_texture(&self, _image: ImageId) -> TextureId {
        let id = self.state.next();
        self.state.live_textures.borrow_mut().insert(id);
        TextureId(id)
    }

    fn delete_texture(&self, texture: TextureId) {
        self.state.note_release();
        self.state.live_textures.borrow_mut().remove(&texture.0);
    }

    fn create_render_target(&self, _texture: TextureId) -> RenderTargetId {
        let id = self.state.next();
        self.state.live_targets.borrow_mut().insert(id);
        RenderTargetId(id)
    }

    fn render_target_complete(&self, _target: RenderTargetId) -> bool {
        let index = self.state.targets_checked.get();
        self.state.targets_checked.set(index + 1);
        self.state.incomplete_target_at.get() != Some(index)
    }

    fn delete_render_target(&self, target: RenderTargetId) {
        self.state.note_release();
        self.state.live_targets.borrow_mut().remove(&target.0);
    }
}

impl Drop for MockGpuBackend {
    fn drop(&mut self) {
        self.state.backend_dropped.set(true);
    }
}
