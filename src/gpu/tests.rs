// src/gpu/tests.rs

use super::ffi;
use super::mock::{bare_capabilities, import_capabilities, MockGpuBackend};
use super::*;
use crate::gbm::mock::MockBuffer;
use crate::gbm::{BufferId, BufferObject, PlaneLayout};
use anyhow::Result;
use drm_fourcc::{DrmFourcc, DrmModifier};
use test_log::test;

/// `I915_FORMAT_MOD_Y_TILED_CCS`, chosen for a non-zero high word.
fn y_tiled_ccs() -> DrmModifier {
    DrmModifier::from((1u64 << 56) | 4)
}

fn xrgb() -> u32 {
    DrmFourcc::Xrgb8888 as u32
}

fn buffer(id: u64, handle: MockBuffer) -> BufferObject {
    BufferObject::new(BufferId(id), Box::new(handle))
}

fn linear_buffers(count: u64) -> Vec<BufferObject> {
    (0..count)
        .map(|id| buffer(id, MockBuffer::new(1920, 1080, xrgb())))
        .collect()
}

/// Value following `key` in an `EGL_NONE` terminated attribute list.
fn attribute(attributes: &[i32], key: i32) -> Option<i32> {
    attributes
        .chunks(2)
        .find(|pair| pair[0] == key)
        .and_then(|pair| pair.get(1).copied())
}

#[test]
fn it_should_describe_plane_zero_in_the_import_attributes() {
    let bo = buffer(
        0,
        MockBuffer::new(1280, 720, xrgb()).with_planes(vec![PlaneLayout {
            handle: 7,
            stride: 5120,
            offset: 256,
        }]),
    );

    let attributes = image_attributes(&bo, 42, true);

    assert_eq!(attribute(&attributes, ffi::EGL_WIDTH), Some(1280));
    assert_eq!(attribute(&attributes, ffi::EGL_HEIGHT), Some(720));
    assert_eq!(
        attribute(&attributes, ffi::EGL_LINUX_DRM_FOURCC_EXT),
        Some(xrgb() as i32)
    );
    assert_eq!(attribute(&attributes, ffi::EGL_DMA_BUF_PLANE0_FD_EXT), Some(42));
    assert_eq!(attribute(&attributes, ffi::EGL_DMA_BUF_PLANE0_OFFSET_EXT), Some(256));
    assert_eq!(attribute(&attributes, ffi::EGL_DMA_BUF_PLANE0_PITCH_EXT), Some(1280 * 4));
    assert_eq!(attributes.last(), Some(&ffi::EGL_NONE));
}

#[test]
fn it_should_split_a_tiled_modifier_into_low_and_high_words() {
    let bo = buffer(0, MockBuffer::new(1920, 1080, xrgb()).with_modifier(y_tiled_ccs()));

    let attributes = image_attributes(&bo, 3, true);

    assert_eq!(
        attribute(&attributes, ffi::EGL_DMA_BUF_PLANE0_MODIFIER_LO_EXT),
        Some(4)
    );
    assert_eq!(
        attribute(&attributes, ffi::EGL_DMA_BUF_PLANE0_MODIFIER_HI_EXT),
        Some(0x0100_0000)
    );
    assert_eq!(attributes.len(), 17);
}

#[test]
fn it_should_omit_the_modifier_when_the_context_cannot_take_it() {
    let bo = buffer(0, MockBuffer::new(1920, 1080, xrgb()).with_modifier(y_tiled_ccs()));

    let attributes = image_attributes(&bo, 3, false);

    assert_eq!(attribute(&attributes, ffi::EGL_DMA_BUF_PLANE0_MODIFIER_LO_EXT), None);
    assert_eq!(attributes.len(), 13);
}

#[test]
fn it_should_omit_the_modifier_for_linear_buffers() {
    let bo = buffer(0, MockBuffer::new(1920, 1080, xrgb()));

    let attributes = image_attributes(&bo, 3, true);

    assert_eq!(attribute(&attributes, ffi::EGL_DMA_BUF_PLANE0_MODIFIER_HI_EXT), None);
}

#[test]
fn it_should_import_a_buffer_as_a_render_target() -> Result<()> {
    let backend = MockGpuBackend::new(import_capabilities(true));
    let state = backend.state();
    let bo = buffer(9, MockBuffer::new(1920, 1080, xrgb()));

    let image = import(&backend, &bo)?;

    assert_eq!(image.source(), BufferId(9));
    assert_eq!(state.live_images.borrow().len(), 1);
    assert_eq!(state.live_textures.borrow().len(), 1);
    assert!(state.live_targets.borrow().contains(&image.render_target().0));
    Ok(())
}

#[test]
fn it_should_release_everything_when_the_render_target_is_incomplete() {
    let backend = MockGpuBackend::new(import_capabilities(true));
    let state = backend.state();
    state.incomplete_target_at.set(Some(0));
    let bo = buffer(3, MockBuffer::new(1920, 1080, xrgb()));

    let result = import(&backend, &bo);

    assert!(matches!(
        result,
        Err(GpuError::ImportFailed {
            buffer: BufferId(3),
            ..
        })
    ));
    assert_eq!(state.live_resources(), 0);
}

#[test]
fn it_should_fail_an_import_the_platform_rejects() {
    let backend = MockGpuBackend::new(import_capabilities(false));
    let state = backend.state();
    state.fail_image_at.set(Some(0));
    let bo = buffer(4, MockBuffer::new(1920, 1080, xrgb()));

    match import(&backend, &bo) {
        Err(GpuError::ImportFailed { reason, .. }) => assert!(reason.contains("EGL_BAD_MATCH")),
        other => panic!("expected ImportFailed, got {:?}", other),
    }
    assert_eq!(state.live_resources(), 0);
}

#[test]
fn it_should_fail_an_import_without_a_shareable_descriptor() {
    let backend = MockGpuBackend::new(import_capabilities(false));
    let state = backend.state();
    let mut handle = MockBuffer::new(1920, 1080, xrgb());
    handle.export_error = Some(libc::ENOSYS);
    let bo = buffer(5, handle);

    let result = import(&backend, &bo);

    assert!(matches!(result, Err(GpuError::ImportFailed { .. })));
    assert!(state.image_requests.borrow().is_empty());
}

#[test]
fn it_should_import_every_pool_buffer_once() -> Result<()> {
    let backend = MockGpuBackend::new(import_capabilities(true));
    let state = backend.state();
    let buffers = linear_buffers(3);

    let context = GpuContext::new(backend, &buffers)?;

    assert_eq!(context.images().len(), 3);
    assert_eq!(state.image_requests.borrow().len(), 3);
    for bo in &buffers {
        assert!(context.image_for(bo.id()).is_some());
    }
    Ok(())
}

#[test]
fn it_should_refuse_to_import_without_image_support() {
    let backend = MockGpuBackend::new(bare_capabilities());
    let state = backend.state();
    let buffers = linear_buffers(2);

    let result = GpuContext::new(backend, &buffers);

    assert!(matches!(
        result,
        Err(GpuError::MissingCapability("EGL_KHR_image_base"))
    ));
    assert!(state.image_requests.borrow().is_empty());
}

#[test]
fn it_should_not_need_image_support_with_nothing_to_import() -> Result<()> {
    let context = GpuContext::new(MockGpuBackend::new(bare_capabilities()), &[])?;
    assert!(context.images().is_empty());
    Ok(())
}

#[test]
fn it_should_release_earlier_images_when_an_import_fails() {
    let backend = MockGpuBackend::new(import_capabilities(true));
    let state = backend.state();
    state.fail_image_at.set(Some(2));
    let buffers = linear_buffers(3);

    let result = GpuContext::new(backend, &buffers);

    assert!(matches!(
        result,
        Err(GpuError::ImportFailed {
            buffer: BufferId(2),
            ..
        })
    ));
    assert_eq!(state.live_resources(), 0);
    assert_eq!(state.late_releases.get(), 0);
}

#[test]
fn it_should_release_images_before_the_backend() -> Result<()> {
    let backend = MockGpuBackend::new(import_capabilities(true));
    let state = backend.state();
    let buffers = linear_buffers(2);

    let context = GpuContext::new(backend, &buffers)?;
    drop(context);

    assert!(state.backend_dropped.get());
    assert_eq!(state.live_resources(), 0);
    assert_eq!(state.late_releases.get(), 0);
    Ok(())
}

#[test]
fn it_should_report_sync_capabilities_only_when_resolved() {
    let capabilities = import_capabilities(false);

    assert!(capabilities.image_import_supported());
    assert!(!capabilities.fence_sync_supported());
    assert!(!capabilities.native_fence_supported());
}
