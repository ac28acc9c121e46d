// In src/main.rs

// Declare modules
pub mod caps;
pub mod config;
pub mod gbm;
pub mod gpu;
pub mod kms;
pub mod os;

use crate::{
    config::CONFIG,
    gbm::{BufferDevice, BufferPool, GbmDevice, PoolParams},
    gpu::{EglBackend, GpuContext},
    kms::{BindRequest, FramebufferCache},
};

// Logging
use anyhow::Context;
use log::info;
use std::rc::Rc;

/// Main entry point for the `kms-scanout` probe.
///
/// Runs the whole setup sequence once, reports what was bound and allocated,
/// then tears everything down again. There is no render loop.
fn main() -> anyhow::Result<()> {
    // Initialize the logger. Default filter is "info" if RUST_LOG is not set.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    info!("Starting kms-scanout...");

    // --- Configuration ---
    let config = &*CONFIG;
    let format = config
        .buffers
        .pixel_format()
        .context("Invalid buffer configuration")?;
    let modifier = config.buffers.modifier();

    // --- Display Binding ---
    let request = BindRequest {
        device: config.display.device.clone(),
        mode: config.display.mode_request(),
    };
    let binding = kms::bind(&request).context("Failed to bind display resources")?;
    info!("Display bound: {:?}", binding);

    // --- Buffer Pool ---
    let gbm = GbmDevice::new(binding.device().raw_fd()).context("Failed to create GBM device")?;
    let mode = binding.mode();
    let params = PoolParams {
        width: u32::from(mode.hdisplay),
        height: u32::from(mode.vdisplay),
        format,
        modifier,
        surfaceless: config.buffers.surfaceless,
        count: config.buffers.count,
    };
    let buffer_device: Rc<dyn BufferDevice> = Rc::new(gbm.clone());
    let mut pool = BufferPool::new(buffer_device, &params).context("Failed to allocate render buffers")?;

    // --- GPU Context ---
    let backend = EglBackend::new(&gbm, pool.surface(), format, config.gpu.samples)
        .context("Failed to set up the GPU context")?;
    let context =
        GpuContext::new(backend, pool.buffers()).context("Failed to import render buffers")?;
    let capabilities = context.capabilities();
    info!(
        "GPU sync: fence {}, native fence {}",
        capabilities.fence_sync_supported(),
        capabilities.native_fence_supported()
    );
    for image in context.images() {
        info!(
            "{} renders through target {}",
            image.source(),
            image.render_target().0
        );
    }

    // --- Scanout Framebuffers ---
    let framebuffers = FramebufferCache::new(Rc::clone(binding.device()));
    for buffer in pool.buffers_mut() {
        let framebuffer = framebuffers
            .get_or_create(buffer)
            .context("Failed to create scanout framebuffer")?;
        info!(
            "{} scans out through framebuffer {} ({:?} path)",
            framebuffer.owner(),
            framebuffer.id(),
            framebuffer.path()
        );
    }
    if !pool.is_surfaceless() {
        info!("Window surface mode: framebuffers are created per locked front buffer");
    }

    // --- Cleanup ---
    // Dependency order: images, then buffers (and their framebuffers), then
    // the allocator, then the display.
    info!("Tearing down...");
    drop(context);
    drop(pool);
    drop(gbm);
    drop(binding);
    info!("kms-scanout exited successfully.");

    Ok(())
}
