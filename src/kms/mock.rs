// src/kms/mock.rs

//! In-memory `KmsDevice` for tests.

use super::device::{
    Connection, ConnectorInfo, EncoderInfo, FramebufferRequest, KmsDevice, ModeInfo, ModeTypeFlags,
    Resources,
};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;

pub fn mode(name: &str, width: u16, height: u16, vrefresh: u32) -> ModeInfo {
    ModeInfo {
        name: name.to_string(),
        hdisplay: width,
        vdisplay: height,
        vrefresh,
        ..Default::default()
    }
}

pub fn preferred(mut mode: ModeInfo) -> ModeInfo {
    mode.mode_type |= ModeTypeFlags::PREFERRED;
    mode
}

pub fn connector(id: u32, connection: Connection, encoders: &[u32], modes: Vec<ModeInfo>) -> ConnectorInfo {
    ConnectorInfo {
        id,
        interface: format!("HDMIA-{}", id),
        connection,
        encoder_id: None,
        encoders: encoders.to_vec(),
        modes,
    }
}

pub fn encoder(id: u32, crtc_id: Option<u32>, possible_crtcs: u32) -> EncoderInfo {
    EncoderInfo {
        id,
        crtc_id,
        possible_crtcs,
    }
}

/// Shared state so tests can inspect a device after handing it away.
#[derive(Default)]
pub struct MockState {
    pub add_requests: RefCell<Vec<FramebufferRequest>>,
    pub removed: RefCell<Vec<u32>>,
    /// Scripted results for upcoming `add_framebuffer` calls; empty means success.
    pub add_results: RefCell<VecDeque<io::Result<()>>>,
    next_fb_id: Cell<u32>,
    failed_adds: Cell<usize>,
}

impl MockState {
    pub fn live_framebuffers(&self) -> usize {
        let added = self.add_requests.borrow().len() - self.failed_adds.get();
        added - self.removed.borrow().len()
    }

    fn record_failed_add(&self) {
        self.failed_adds.set(self.failed_adds.get() + 1);
    }
}

#[derive(Default)]
pub struct MockKmsDevice {
    pub resources: Resources,
    pub connectors: HashMap<u32, ConnectorInfo>,
    pub encoders: HashMap<u32, EncoderInfo>,
    pub fb_modifiers: bool,
    pub fail_resources: bool,
    pub state: Rc<MockState>,
}

impl MockKmsDevice {
    pub fn new(crtcs: &[u32]) -> Self {
        Self {
            resources: Resources {
                crtcs: crtcs.to_vec(),
                ..Default::default()
            },
            fb_modifiers: true,
            ..Default::default()
        }
    }

    pub fn with_connector(mut self, connector: ConnectorInfo) -> Self {
        self.resources.connectors.push(connector.id);
        self.connectors.insert(connector.id, connector);
        self
    }

    pub fn with_encoder(mut self, encoder: EncoderInfo) -> Self {
        self.resources.encoders.push(encoder.id);
        self.encoders.insert(encoder.id, encoder);
        self
    }

    pub fn state(&self) -> Rc<MockState> {
        Rc::clone(&self.state)
    }
}

fn not_found(what: &str, id: u32) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} {} not found", what, id))
}

impl KmsDevice for MockKmsDevice {
    fn resources(&self) -> io::Result<Resources> {
        if self.fail_resources {
            return Err(io::Error::from_raw_os_error(libc::EOPNOTSUPP));
        }
        Ok(self.resources.clone())
    }

    fn connector(&self, id: u32) -> io::Result<ConnectorInfo> {
        self.connectors.get(&id).cloned().ok_or_else(|| not_found("connector", id))
    }

    fn encoder(&self, id: u32) -> io::Result<EncoderInfo> {
        self.encoders.get(&id).copied().ok_or_else(|| not_found("encoder", id))
    }

    fn supports_fb_modifiers(&self) -> bool {
        self.fb_modifiers
    }

    fn add_framebuffer(&self, request: &FramebufferRequest) -> io::Result<u32> {
        self.state.add_requests.borrow_mut().push(*request);
        let scripted = self.state.add_results.borrow_mut().pop_front();
        if let Some(Err(e)) = scripted {
            self.state.record_failed_add();
            return Err(e);
        }
        let id = self.state.next_fb_id.get() + 100;
        self.state.next_fb_id.set(self.state.next_fb_id.get() + 1);
        Ok(id)
    }

    fn remove_framebuffer(&self, fb_id: u32) -> io::Result<()> {
        self.state.removed.borrow_mut().push(fb_id);
        Ok(())
    }

    fn raw_fd(&self) -> RawFd {
        -1
    }
}
