// src/gbm/device.rs

//! `BufferDevice` backed by a real GBM device.

use super::buffer::{
    BufferDescriptor, BufferDevice, BufferHandle, BufferUsage, PlaneLayout, SurfaceHandle,
};
use super::ffi::{self, GbmLibrary};
use anyhow::{anyhow, Context, Result};
use drm_fourcc::DrmModifier;
use log::{info, trace};
use std::ffi::c_void;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::os::raw::{c_int, c_uint};
use std::ptr::NonNull;
use std::rc::Rc;

struct DeviceInner {
    raw: NonNull<c_void>,
    lib: GbmLibrary,
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        trace!("Destroying GBM device {:p}", self.raw);
        unsafe { (self.lib.device_destroy)(self.raw.as_ptr()) };
    }
}

/// A GBM device on an open DRM file descriptor.
///
/// The descriptor is borrowed and must outlive the device and everything
/// allocated from it. Buffers and surfaces keep the device alive.
#[derive(Clone)]
pub struct GbmDevice {
    inner: Rc<DeviceInner>,
}

impl GbmDevice {
    pub fn new(fd: RawFd) -> Result<Self> {
        let lib = GbmLibrary::load().context("Failed to load the GBM library")?;
        let raw = unsafe { (lib.create_device)(fd as c_int) };
        let raw = NonNull::new(raw)
            .ok_or_else(|| anyhow!("gbm_create_device failed on fd {}", fd))?;
        info!(
            "Created GBM device (modifier-aware allocation: {}, plane queries: {})",
            lib.optional.contains(ffi::BO_CREATE_WITH_MODIFIERS),
            lib.optional.contains_all(&ffi::PLANE_QUERIES)
        );
        Ok(Self {
            inner: Rc::new(DeviceInner { raw, lib }),
        })
    }

    fn lib(&self) -> &GbmLibrary {
        &self.inner.lib
    }

    fn wrap_buffer(&self, raw: *mut c_void) -> io::Result<Box<dyn BufferHandle>> {
        let raw = NonNull::new(raw).ok_or_else(io::Error::last_os_error)?;
        Ok(Box::new(GbmBuffer {
            raw,
            device: Rc::clone(&self.inner),
        }))
    }

    fn wrap_surface(&self, raw: *mut c_void) -> io::Result<Box<dyn SurfaceHandle>> {
        let raw = NonNull::new(raw).ok_or_else(io::Error::last_os_error)?;
        Ok(Box::new(GbmSurface {
            raw,
            device: Rc::clone(&self.inner),
        }))
    }
}

fn raw_modifiers(modifiers: &[DrmModifier]) -> Vec<u64> {
    modifiers.iter().map(|&m| u64::from(m)).collect()
}

fn unsupported(symbol: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{} is not exported by {}", symbol, ffi::SONAME),
    )
}

impl BufferDevice for GbmDevice {
    fn native_display(&self) -> *mut c_void {
        self.inner.raw.as_ptr()
    }

    fn supports_modifiers(&self) -> bool {
        self.lib().optional.contains(ffi::BO_CREATE_WITH_MODIFIERS)
    }

    fn create_buffer_with_modifiers(
        &self,
        descriptor: &BufferDescriptor,
        modifiers: &[DrmModifier],
    ) -> io::Result<Box<dyn BufferHandle>> {
        let create = unsafe {
            self.lib()
                .optional
                .function::<ffi::BoCreateWithModifiersFn>(ffi::BO_CREATE_WITH_MODIFIERS)
        }
        .ok_or_else(|| unsupported(ffi::BO_CREATE_WITH_MODIFIERS))?;
        let modifiers = raw_modifiers(modifiers);
        let raw = unsafe {
            create(
                self.inner.raw.as_ptr(),
                descriptor.width,
                descriptor.height,
                descriptor.format as u32,
                modifiers.as_ptr(),
                modifiers.len() as c_uint,
            )
        };
        self.wrap_buffer(raw)
    }

    fn create_buffer(
        &self,
        descriptor: &BufferDescriptor,
        usage: BufferUsage,
    ) -> io::Result<Box<dyn BufferHandle>> {
        let raw = unsafe {
            (self.lib().bo_create)(
                self.inner.raw.as_ptr(),
                descriptor.width,
                descriptor.height,
                descriptor.format as u32,
                usage.bits(),
            )
        };
        self.wrap_buffer(raw)
    }

    fn supports_surface_modifiers(&self) -> bool {
        self.lib().optional.contains(ffi::SURFACE_CREATE_WITH_MODIFIERS)
    }

    fn create_surface_with_modifiers(
        &self,
        descriptor: &BufferDescriptor,
        modifiers: &[DrmModifier],
    ) -> io::Result<Box<dyn SurfaceHandle>> {
        let create = unsafe {
            self.lib()
                .optional
                .function::<ffi::SurfaceCreateWithModifiersFn>(ffi::SURFACE_CREATE_WITH_MODIFIERS)
        }
        .ok_or_else(|| unsupported(ffi::SURFACE_CREATE_WITH_MODIFIERS))?;
        let modifiers = raw_modifiers(modifiers);
        let raw = unsafe {
            create(
                self.inner.raw.as_ptr(),
                descriptor.width,
                descriptor.height,
                descriptor.format as u32,
                modifiers.as_ptr(),
                modifiers.len() as c_uint,
            )
        };
        self.wrap_surface(raw)
    }

    fn create_surface(
        &self,
        descriptor: &BufferDescriptor,
        usage: BufferUsage,
    ) -> io::Result<Box<dyn SurfaceHandle>> {
        let raw = unsafe {
            (self.lib().surface_create)(
                self.inner.raw.as_ptr(),
                descriptor.width,
                descriptor.height,
                descriptor.format as u32,
                usage.bits(),
            )
        };
        self.wrap_surface(raw)
    }
}

struct GbmBuffer {
    raw: NonNull<c_void>,
    device: Rc<DeviceInner>,
}

impl GbmBuffer {
    fn lib(&self) -> &GbmLibrary {
        &self.device.lib
    }

    fn plane_layout(&self) -> Option<Vec<PlaneLayout>> {
        let optional = &self.lib().optional;
        // SAFETY: signatures match gbm.h; the buffer is alive for &self.
        unsafe {
            let count = optional.function::<ffi::BoGetPlaneCountFn>(ffi::BO_GET_PLANE_COUNT)?;
            let handle = optional.function::<ffi::BoGetHandleForPlaneFn>(ffi::BO_GET_HANDLE_FOR_PLANE)?;
            let stride = optional.function::<ffi::BoGetPlaneU32Fn>(ffi::BO_GET_STRIDE_FOR_PLANE)?;
            let offset = optional.function::<ffi::BoGetPlaneU32Fn>(ffi::BO_GET_OFFSET)?;

            let bo = self.raw.as_ptr();
            let planes = count(bo).max(0);
            Some(
                (0..planes)
                    .map(|plane| PlaneLayout {
                        handle: handle(bo, plane).u32_,
                        stride: stride(bo, plane),
                        offset: offset(bo, plane),
                    })
                    .collect(),
            )
        }
    }
}

impl BufferHandle for GbmBuffer {
    fn width(&self) -> u32 {
        unsafe { (self.lib().bo_get_width)(self.raw.as_ptr()) }
    }

    fn height(&self) -> u32 {
        unsafe { (self.lib().bo_get_height)(self.raw.as_ptr()) }
    }

    fn format(&self) -> u32 {
        unsafe { (self.lib().bo_get_format)(self.raw.as_ptr()) }
    }

    fn handle(&self) -> u32 {
        unsafe { (self.lib().bo_get_handle)(self.raw.as_ptr()).u32_ }
    }

    fn stride(&self) -> u32 {
        unsafe { (self.lib().bo_get_stride)(self.raw.as_ptr()) }
    }

    fn modifier(&self) -> Option<DrmModifier> {
        let get = unsafe {
            self.lib()
                .optional
                .function::<ffi::BoGetModifierFn>(ffi::BO_GET_MODIFIER)?
        };
        Some(DrmModifier::from(unsafe { get(self.raw.as_ptr()) }))
    }

    fn planes(&self) -> Option<Vec<PlaneLayout>> {
        self.plane_layout()
    }

    fn export_fd(&self) -> io::Result<OwnedFd> {
        let fd = unsafe { (self.lib().bo_get_fd)(self.raw.as_ptr()) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: gbm_bo_get_fd returns a new descriptor we now own.
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }
}

impl Drop for GbmBuffer {
    fn drop(&mut self) {
        unsafe { (self.device.lib.bo_destroy)(self.raw.as_ptr()) };
    }
}

struct GbmSurface {
    raw: NonNull<c_void>,
    device: Rc<DeviceInner>,
}

impl SurfaceHandle for GbmSurface {
    fn native_window(&self) -> *mut c_void {
        self.raw.as_ptr()
    }
}

impl Drop for GbmSurface {
    fn drop(&mut self) {
        unsafe { (self.device.lib.surface_destroy)(self.raw.as_ptr()) };
    }
}
