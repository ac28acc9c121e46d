// src/gbm/ffi.rs

//! Entry points of `libgbm`, resolved at runtime.

use crate::caps::{CapabilityScope, CapabilityTable};
use crate::os::{DynamicLibrary, LoadError};
use log::debug;
use std::ffi::c_void;
use std::os::raw::{c_int, c_uint};

pub const SONAME: &str = "libgbm.so.1";

/// `union gbm_bo_handle`.
#[repr(C)]
#[derive(Clone, Copy)]
pub union GbmBoHandle {
    pub ptr: *mut c_void,
    pub s32: i32,
    pub u32_: u32,
    pub s64: i64,
    pub u64_: u64,
}

pub type CreateDeviceFn = unsafe extern "C" fn(fd: c_int) -> *mut c_void;
pub type DeviceDestroyFn = unsafe extern "C" fn(device: *mut c_void);
pub type BoCreateFn = unsafe extern "C" fn(
    device: *mut c_void,
    width: u32,
    height: u32,
    format: u32,
    flags: u32,
) -> *mut c_void;
pub type BoCreateWithModifiersFn = unsafe extern "C" fn(
    device: *mut c_void,
    width: u32,
    height: u32,
    format: u32,
    modifiers: *const u64,
    count: c_uint,
) -> *mut c_void;
pub type BoDestroyFn = unsafe extern "C" fn(bo: *mut c_void);
pub type BoGetU32Fn = unsafe extern "C" fn(bo: *mut c_void) -> u32;
pub type BoGetHandleFn = unsafe extern "C" fn(bo: *mut c_void) -> GbmBoHandle;
pub type BoGetFdFn = unsafe extern "C" fn(bo: *mut c_void) -> c_int;
pub type BoGetModifierFn = unsafe extern "C" fn(bo: *mut c_void) -> u64;
pub type BoGetPlaneCountFn = unsafe extern "C" fn(bo: *mut c_void) -> c_int;
pub type BoGetHandleForPlaneFn = unsafe extern "C" fn(bo: *mut c_void, plane: c_int) -> GbmBoHandle;
pub type BoGetPlaneU32Fn = unsafe extern "C" fn(bo: *mut c_void, plane: c_int) -> u32;
pub type SurfaceCreateFn = BoCreateFn;
pub type SurfaceCreateWithModifiersFn = BoCreateWithModifiersFn;
pub type SurfaceDestroyFn = unsafe extern "C" fn(surface: *mut c_void);

pub const BO_CREATE_WITH_MODIFIERS: &str = "gbm_bo_create_with_modifiers";
pub const SURFACE_CREATE_WITH_MODIFIERS: &str = "gbm_surface_create_with_modifiers";
pub const BO_GET_MODIFIER: &str = "gbm_bo_get_modifier";
pub const BO_GET_PLANE_COUNT: &str = "gbm_bo_get_plane_count";
pub const BO_GET_HANDLE_FOR_PLANE: &str = "gbm_bo_get_handle_for_plane";
pub const BO_GET_STRIDE_FOR_PLANE: &str = "gbm_bo_get_stride_for_plane";
pub const BO_GET_OFFSET: &str = "gbm_bo_get_offset";

/// Per-plane layout queries. Planes are only reported when all are present.
pub const PLANE_QUERIES: [&str; 4] = [
    BO_GET_PLANE_COUNT,
    BO_GET_HANDLE_FOR_PLANE,
    BO_GET_STRIDE_FOR_PLANE,
    BO_GET_OFFSET,
];

/// The loaded library: symbols every version exports, plus a table of the
/// optional ones newer versions add.
pub struct GbmLibrary {
    pub create_device: CreateDeviceFn,
    pub device_destroy: DeviceDestroyFn,
    pub bo_create: BoCreateFn,
    pub bo_destroy: BoDestroyFn,
    pub bo_get_width: BoGetU32Fn,
    pub bo_get_height: BoGetU32Fn,
    pub bo_get_format: BoGetU32Fn,
    pub bo_get_stride: BoGetU32Fn,
    pub bo_get_handle: BoGetHandleFn,
    pub bo_get_fd: BoGetFdFn,
    pub surface_create: SurfaceCreateFn,
    pub surface_destroy: SurfaceDestroyFn,
    pub optional: CapabilityTable,
    // Keeps every pointer above valid.
    _library: DynamicLibrary,
}

impl GbmLibrary {
    pub fn load() -> Result<Self, LoadError> {
        let library = DynamicLibrary::open(SONAME, env!("KMS_SCANOUT_GBM_LIBDIR"))?;

        let mut optional = CapabilityTable::new(CapabilityScope::Platform);
        let found = optional.resolve_symbols(
            &[
                BO_CREATE_WITH_MODIFIERS,
                SURFACE_CREATE_WITH_MODIFIERS,
                BO_GET_MODIFIER,
                BO_GET_PLANE_COUNT,
                BO_GET_HANDLE_FOR_PLANE,
                BO_GET_STRIDE_FOR_PLANE,
                BO_GET_OFFSET,
            ],
            &library,
        );
        debug!("{}: {} optional entry point(s) available", library.name(), found);

        // SAFETY: each type alias matches the prototype in gbm.h.
        unsafe {
            Ok(Self {
                create_device: library.require("gbm_create_device")?.cast(),
                device_destroy: library.require("gbm_device_destroy")?.cast(),
                bo_create: library.require("gbm_bo_create")?.cast(),
                bo_destroy: library.require("gbm_bo_destroy")?.cast(),
                bo_get_width: library.require("gbm_bo_get_width")?.cast(),
                bo_get_height: library.require("gbm_bo_get_height")?.cast(),
                bo_get_format: library.require("gbm_bo_get_format")?.cast(),
                bo_get_stride: library.require("gbm_bo_get_stride")?.cast(),
                bo_get_handle: library.require("gbm_bo_get_handle")?.cast(),
                bo_get_fd: library.require("gbm_bo_get_fd")?.cast(),
                surface_create: library.require("gbm_surface_create")?.cast(),
                surface_destroy: library.require("gbm_surface_destroy")?.cast(),
                optional,
                _library: library,
            })
        }
    }
}
