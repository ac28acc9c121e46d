// src/kms/binder.rs

//! Display resource binding: picks the device, connector, mode and CRTC the
//! rest of the pipeline scans out to.
//!
//! Binding happens once at startup. Every failure is fatal; nothing is
//! retried and no partial binding is ever returned.

use super::device::{ConnectorInfo, Connection, KmsDevice, ModeInfo, Resources, DISPLAY_MODE_LEN};
use super::card::Card;
use log::{debug, info, warn};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BindError {
    #[error("no usable display device: {0}")]
    NoDevice(String),
    #[error("no connected connector among {connectors} connector(s)")]
    NoOutput { connectors: usize },
    #[error("connector {connector_id} advertises no usable mode")]
    NoMode { connector_id: u32 },
    #[error("no CRTC can drive connector {connector_id}")]
    NoController { connector_id: u32 },
}

/// A mode requested by name, optionally pinned to a refresh rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeRequest {
    pub name: String,
    /// Zero means any refresh rate.
    pub vrefresh: u32,
}

impl ModeRequest {
    /// Parses `<name>[-<vrefresh>]`, e.g. `"1920x1080"` or `"1280x720-60"`.
    ///
    /// Returns `None` for an empty name. An unparsable refresh counts as zero.
    pub fn parse(text: &str) -> Option<Self> {
        let (name, vrefresh) = match text.split_once('-') {
            Some((name, refresh)) => (name, parse_unsigned(refresh)),
            None => (text, 0),
        };
        let mut name = name.to_string();
        if name.len() > DISPLAY_MODE_LEN - 1 {
            let mut end = DISPLAY_MODE_LEN - 1;
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            name.truncate(end);
        }
        if name.is_empty() {
            return None;
        }
        Some(Self { name, vrefresh })
    }
}

/// Reads the leading number like `strtoul(.., 0)`: `0x` hex, leading-zero
/// octal, else decimal. Trailing text is ignored; no digits reads as zero.
fn parse_unsigned(text: &str) -> u32 {
    let text = text.trim_start();
    let (digits, radix) = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) if hex.starts_with(|c: char| c.is_ascii_hexdigit()) => (hex, 16),
        _ if text.starts_with('0') => (text, 8),
        _ => (text, 10),
    };
    let end = digits
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(digits.len());
    if end == 0 {
        return 0;
    }
    u32::from_str_radix(&digits[..end], radix).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Default)]
pub struct BindRequest {
    /// Device to open. `None` probes every primary node.
    pub device: Option<PathBuf>,
    pub mode: Option<ModeRequest>,
}

/// The output, mode and CRTC chosen at startup. Immutable once created.
pub struct DisplayBinding {
    device: Rc<dyn KmsDevice>,
    device_path: PathBuf,
    connector_id: u32,
    crtc_id: u32,
    crtc_index: usize,
    mode: ModeInfo,
}

impl DisplayBinding {
    pub fn device(&self) -> &Rc<dyn KmsDevice> {
        &self.device
    }

    pub fn device_path(&self) -> &Path {
        &self.device_path
    }

    pub fn connector_id(&self) -> u32 {
        self.connector_id
    }

    pub fn crtc_id(&self) -> u32 {
        self.crtc_id
    }

    /// Position of the CRTC in the device's CRTC list.
    pub fn crtc_index(&self) -> usize {
        self.crtc_index
    }

    pub fn mode(&self) -> &ModeInfo {
        &self.mode
    }
}

impl fmt::Debug for DisplayBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayBinding")
            .field("device_path", &self.device_path)
            .field("connector_id", &self.connector_id)
            .field("crtc_id", &self.crtc_id)
            .field("crtc_index", &self.crtc_index)
            .field("mode", &self.mode.name)
            .finish()
    }
}

/// Binds against real DRM devices.
pub fn bind(request: &BindRequest) -> Result<DisplayBinding, BindError> {
    let candidates = match &request.device {
        Some(path) => vec![path.clone()],
        None => Card::enumerate(),
    };
    bind_with(&candidates, Card::open, request.mode.as_ref())
}

/// Binds against the first usable device produced by `open`.
///
/// With a single candidate (an explicitly requested device) its open or
/// resource error is reported as is.
pub fn bind_with<D, F>(
    candidates: &[PathBuf],
    open: F,
    mode: Option<&ModeRequest>,
) -> Result<DisplayBinding, BindError>
where
    D: KmsDevice + 'static,
    F: FnMut(&Path) -> io::Result<D>,
{
    let (device_path, device, resources) = open_device(candidates, open)?;

    let connector = find_connected_connector(&device, &resources)?;
    info!(
        "Using connector {} ({}) with {} mode(s)",
        connector.id,
        connector.interface,
        connector.modes.len()
    );

    let mode = select_mode(&connector.modes, mode)
        .cloned()
        .ok_or(BindError::NoMode {
            connector_id: connector.id,
        })?;
    info!(
        "Selected mode {} ({}x{}@{})",
        mode.name, mode.hdisplay, mode.vdisplay, mode.vrefresh
    );

    let crtc_id = find_crtc(&device, &resources, &connector).ok_or(BindError::NoController {
        connector_id: connector.id,
    })?;
    let crtc_index = resources
        .crtcs
        .iter()
        .position(|&id| id == crtc_id)
        .ok_or(BindError::NoController {
            connector_id: connector.id,
        })?;
    info!("Using CRTC {} (index {})", crtc_id, crtc_index);

    Ok(DisplayBinding {
        device: Rc::new(device),
        device_path,
        connector_id: connector.id,
        crtc_id,
        crtc_index,
        mode,
    })
}

fn open_device<D, F>(candidates: &[PathBuf], mut open: F) -> Result<(PathBuf, D, Resources), BindError>
where
    D: KmsDevice,
    F: FnMut(&Path) -> io::Result<D>,
{
    if let [path] = candidates {
        let device = open(path)
            .map_err(|e| BindError::NoDevice(format!("could not open {}: {}", path.display(), e)))?;
        let resources = device.resources().map_err(|e| {
            BindError::NoDevice(format!(
                "{} does not look like a modeset device: {}",
                path.display(),
                e
            ))
        })?;
        if resources.is_empty() {
            return Err(BindError::NoDevice(format!(
                "{} has no CRTCs or connectors",
                path.display()
            )));
        }
        info!("Using display device {}", path.display());
        return Ok((path.clone(), device, resources));
    }

    for path in candidates {
        let device = match open(path) {
            Ok(device) => device,
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        match device.resources() {
            Ok(resources) if !resources.is_empty() => {
                info!("Using display device {}", path.display());
                return Ok((path.clone(), device, resources));
            }
            Ok(_) => debug!("Skipping {}: no CRTCs or connectors", path.display()),
            Err(e) => debug!("Skipping {}: not a modeset device ({})", path.display(), e),
        }
    }

    Err(BindError::NoDevice(format!(
        "none of {} candidate device(s) is KMS capable",
        candidates.len()
    )))
}

/// First connected connector. There is no waiting for hotplug.
fn find_connected_connector(
    device: &dyn KmsDevice,
    resources: &Resources,
) -> Result<ConnectorInfo, BindError> {
    for &id in &resources.connectors {
        match device.connector(id) {
            Ok(connector) if connector.connection == Connection::Connected => return Ok(connector),
            Ok(connector) => debug!("Connector {} is {:?}", id, connector.connection),
            Err(e) => warn!("Failed to query connector {}: {}", id, e),
        }
    }
    Err(BindError::NoOutput {
        connectors: resources.connectors.len(),
    })
}

/// Mode precedence: requested name and refresh, requested name alone, the
/// preferred mode, then the largest mode by area (first one wins ties).
pub fn select_mode<'m>(modes: &'m [ModeInfo], request: Option<&ModeRequest>) -> Option<&'m ModeInfo> {
    if let Some(request) = request.filter(|r| !r.name.is_empty()) {
        let exact = modes.iter().find(|m| {
            m.name == request.name && (request.vrefresh == 0 || m.vrefresh == request.vrefresh)
        });
        if let Some(mode) = exact {
            return Some(mode);
        }
        if request.vrefresh != 0 {
            if let Some(mode) = modes.iter().find(|m| m.name == request.name) {
                warn!(
                    "Mode {} has no {}Hz variant, using {}Hz",
                    request.name, request.vrefresh, mode.vrefresh
                );
                return Some(mode);
            }
        }
        warn!("Requested mode {} not found, using default mode", request.name);
    }

    if let Some(preferred) = modes.iter().find(|m| m.is_preferred()) {
        return Some(preferred);
    }

    let mut best: Option<&ModeInfo> = None;
    for mode in modes {
        let best_area = best.map_or(0, ModeInfo::area);
        if mode.area() > best_area {
            best = Some(mode);
        }
    }
    best
}

/// CRTC already bound to the connector's current encoder, else the first
/// CRTC any candidate encoder can drive.
fn find_crtc(device: &dyn KmsDevice, resources: &Resources, connector: &ConnectorInfo) -> Option<u32> {
    if let Some(encoder_id) = connector.encoder_id {
        match device.encoder(encoder_id) {
            Ok(encoder) => {
                if let Some(crtc_id) = encoder.crtc_id {
                    debug!("Encoder {} is already bound to CRTC {}", encoder_id, crtc_id);
                    return Some(crtc_id);
                }
            }
            Err(e) => warn!("Failed to query encoder {}: {}", encoder_id, e),
        }
    }

    for &encoder_id in &connector.encoders {
        let encoder = match device.encoder(encoder_id) {
            Ok(encoder) => encoder,
            Err(e) => {
                warn!("Failed to query encoder {}: {}", encoder_id, e);
                continue;
            }
        };
        if let Some(crtc_id) = crtc_for_encoder(resources, encoder.possible_crtcs) {
            debug!("Encoder {} can drive CRTC {}", encoder_id, crtc_id);
            return Some(crtc_id);
        }
    }
    None
}

fn crtc_for_encoder(resources: &Resources, possible_crtcs: u32) -> Option<u32> {
    resources
        .crtcs
        .iter()
        .take(32)
        .enumerate()
        .find(|(index, _)| possible_crtcs & (1u32 << *index) != 0)
        .map(|(_, &crtc_id)| crtc_id)
}
