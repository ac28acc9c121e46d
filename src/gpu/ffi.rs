// src/gpu/ffi.rs

//! EGL and GLES 2 entry points, resolved at runtime.

use crate::caps::{EntryPoint, SymbolLoader};
use crate::os::{DynamicLibrary, LoadError};
use std::ffi::{c_void, CString};
use std::os::raw::c_char;

pub type EGLDisplay = *mut c_void;
pub type EGLConfig = *mut c_void;
pub type EGLContext = *mut c_void;
pub type EGLSurface = *mut c_void;
pub type EGLImageKHR = *mut c_void;
pub type EGLBoolean = u32;
pub type EGLenum = u32;
pub type EGLint = i32;

pub const EGL_FALSE: EGLBoolean = 0;
pub const EGL_NO_DISPLAY: EGLDisplay = std::ptr::null_mut();
pub const EGL_NO_CONTEXT: EGLContext = std::ptr::null_mut();
pub const EGL_NO_SURFACE: EGLSurface = std::ptr::null_mut();
pub const EGL_NO_IMAGE_KHR: EGLImageKHR = std::ptr::null_mut();

pub const EGL_ALPHA_SIZE: EGLint = 0x3021;
pub const EGL_BLUE_SIZE: EGLint = 0x3022;
pub const EGL_GREEN_SIZE: EGLint = 0x3023;
pub const EGL_RED_SIZE: EGLint = 0x3024;
pub const EGL_NATIVE_VISUAL_ID: EGLint = 0x302E;
pub const EGL_SAMPLES: EGLint = 0x3031;
pub const EGL_SURFACE_TYPE: EGLint = 0x3033;
pub const EGL_NONE: EGLint = 0x3038;
pub const EGL_RENDERABLE_TYPE: EGLint = 0x3040;
pub const EGL_VENDOR: EGLint = 0x3053;
pub const EGL_VERSION: EGLint = 0x3054;
pub const EGL_EXTENSIONS: EGLint = 0x3055;
pub const EGL_HEIGHT: EGLint = 0x3056;
pub const EGL_WIDTH: EGLint = 0x3057;
pub const EGL_CONTEXT_CLIENT_VERSION: EGLint = 0x3098;
pub const EGL_WINDOW_BIT: EGLint = 0x0004;
pub const EGL_OPENGL_ES2_BIT: EGLint = 0x0004;
pub const EGL_OPENGL_ES_API: EGLenum = 0x30A0;
pub const EGL_PLATFORM_GBM_KHR: EGLenum = 0x31D7;

pub const EGL_LINUX_DMA_BUF_EXT: EGLenum = 0x3270;
pub const EGL_LINUX_DRM_FOURCC_EXT: EGLint = 0x3271;
pub const EGL_DMA_BUF_PLANE0_FD_EXT: EGLint = 0x3272;
pub const EGL_DMA_BUF_PLANE0_OFFSET_EXT: EGLint = 0x3273;
pub const EGL_DMA_BUF_PLANE0_PITCH_EXT: EGLint = 0x3274;
pub const EGL_DMA_BUF_PLANE0_MODIFIER_LO_EXT: EGLint = 0x3443;
pub const EGL_DMA_BUF_PLANE0_MODIFIER_HI_EXT: EGLint = 0x3444;

pub type GLenum = u32;
pub type GLuint = u32;
pub type GLint = i32;
pub type GLsizei = i32;

pub const GL_TEXTURE_2D: GLenum = 0x0DE1;
pub const GL_VENDOR: GLenum = 0x1F00;
pub const GL_RENDERER: GLenum = 0x1F01;
pub const GL_VERSION: GLenum = 0x1F02;
pub const GL_EXTENSIONS: GLenum = 0x1F03;
pub const GL_LINEAR: GLint = 0x2601;
pub const GL_TEXTURE_MAG_FILTER: GLenum = 0x2800;
pub const GL_TEXTURE_MIN_FILTER: GLenum = 0x2801;
pub const GL_SHADING_LANGUAGE_VERSION: GLenum = 0x8B8C;
pub const GL_FRAMEBUFFER_COMPLETE: GLenum = 0x8CD5;
pub const GL_COLOR_ATTACHMENT0: GLenum = 0x8CE0;
pub const GL_FRAMEBUFFER: GLenum = 0x8D40;

// Optional entry points, keyed by symbol name in the capability tables.
pub const GET_PLATFORM_DISPLAY: &str = "eglGetPlatformDisplayEXT";
pub const CREATE_IMAGE: &str = "eglCreateImageKHR";
pub const DESTROY_IMAGE: &str = "eglDestroyImageKHR";
pub const CREATE_SYNC: &str = "eglCreateSyncKHR";
pub const DESTROY_SYNC: &str = "eglDestroySyncKHR";
pub const WAIT_SYNC: &str = "eglWaitSyncKHR";
pub const CLIENT_WAIT_SYNC: &str = "eglClientWaitSyncKHR";
pub const DUP_NATIVE_FENCE_FD: &str = "eglDupNativeFenceFDANDROID";
pub const IMAGE_TARGET_TEXTURE_2D: &str = "glEGLImageTargetTexture2DOES";

pub type GetPlatformDisplayFn =
    unsafe extern "C" fn(platform: EGLenum, native: *mut c_void, attribs: *const EGLint) -> EGLDisplay;
pub type CreateImageFn = unsafe extern "C" fn(
    display: EGLDisplay,
    context: EGLContext,
    target: EGLenum,
    buffer: *mut c_void,
    attribs: *const EGLint,
) -> EGLImageKHR;
pub type DestroyImageFn = unsafe extern "C" fn(display: EGLDisplay, image: EGLImageKHR) -> EGLBoolean;
pub type ImageTargetTexture2DFn = unsafe extern "C" fn(target: GLenum, image: EGLImageKHR);

pub struct EglLibrary {
    pub get_proc_address: unsafe extern "C" fn(name: *const c_char) -> *mut c_void,
    pub get_display: unsafe extern "C" fn(native: *mut c_void) -> EGLDisplay,
    pub initialize:
        unsafe extern "C" fn(display: EGLDisplay, major: *mut EGLint, minor: *mut EGLint) -> EGLBoolean,
    pub terminate: unsafe extern "C" fn(display: EGLDisplay) -> EGLBoolean,
    pub query_string: unsafe extern "C" fn(display: EGLDisplay, name: EGLint) -> *const c_char,
    pub bind_api: unsafe extern "C" fn(api: EGLenum) -> EGLBoolean,
    pub get_configs: unsafe extern "C" fn(
        display: EGLDisplay,
        configs: *mut EGLConfig,
        size: EGLint,
        count: *mut EGLint,
    ) -> EGLBoolean,
    pub choose_config: unsafe extern "C" fn(
        display: EGLDisplay,
        attribs: *const EGLint,
        configs: *mut EGLConfig,
        size: EGLint,
        count: *mut EGLint,
    ) -> EGLBoolean,
    pub get_config_attrib: unsafe extern "C" fn(
        display: EGLDisplay,
        config: EGLConfig,
        attribute: EGLint,
        value: *mut EGLint,
    ) -> EGLBoolean,
    pub create_context: unsafe extern "C" fn(
        display: EGLDisplay,
        config: EGLConfig,
        share: EGLContext,
        attribs: *const EGLint,
    ) -> EGLContext,
    pub destroy_context: unsafe extern "C" fn(display: EGLDisplay, context: EGLContext) -> EGLBoolean,
    pub create_window_surface: unsafe extern "C" fn(
        display: EGLDisplay,
        config: EGLConfig,
        window: *mut c_void,
        attribs: *const EGLint,
    ) -> EGLSurface,
    pub destroy_surface: unsafe extern "C" fn(display: EGLDisplay, surface: EGLSurface) -> EGLBoolean,
    pub make_current: unsafe extern "C" fn(
        display: EGLDisplay,
        draw: EGLSurface,
        read: EGLSurface,
        context: EGLContext,
    ) -> EGLBoolean,
    pub get_error: unsafe extern "C" fn() -> EGLint,
    library: DynamicLibrary,
}

impl EglLibrary {
    pub fn load() -> Result<Self, LoadError> {
        let library = DynamicLibrary::open("libEGL.so.1", env!("KMS_SCANOUT_EGL_LIBDIR"))?;
        // SAFETY: each field type matches the prototype in EGL/egl.h.
        unsafe {
            Ok(Self {
                get_proc_address: library.require("eglGetProcAddress")?.cast(),
                get_display: library.require("eglGetDisplay")?.cast(),
                initialize: library.require("eglInitialize")?.cast(),
                terminate: library.require("eglTerminate")?.cast(),
                query_string: library.require("eglQueryString")?.cast(),
                bind_api: library.require("eglBindAPI")?.cast(),
                get_configs: library.require("eglGetConfigs")?.cast(),
                choose_config: library.require("eglChooseConfig")?.cast(),
                get_config_attrib: library.require("eglGetConfigAttrib")?.cast(),
                create_context: library.require("eglCreateContext")?.cast(),
                destroy_context: library.require("eglDestroyContext")?.cast(),
                create_window_surface: library.require("eglCreateWindowSurface")?.cast(),
                destroy_surface: library.require("eglDestroySurface")?.cast(),
                make_current: library.require("eglMakeCurrent")?.cast(),
                get_error: library.require("eglGetError")?.cast(),
                library,
            })
        }
    }
}

/// Extension entry points come from `eglGetProcAddress`, falling back to
/// whatever the library exports directly.
impl SymbolLoader for EglLibrary {
    fn load(&self, symbol: &str) -> Option<EntryPoint> {
        let name = CString::new(symbol).ok()?;
        let ptr = unsafe { (self.get_proc_address)(name.as_ptr()) };
        EntryPoint::from_ptr(ptr).or_else(|| self.library.load(symbol))
    }
}

pub struct GlesLibrary {
    pub get_string: unsafe extern "C" fn(name: GLenum) -> *const u8,
    pub gen_textures: unsafe extern "C" fn(n: GLsizei, textures: *mut GLuint),
    pub delete_textures: unsafe extern "C" fn(n: GLsizei, textures: *const GLuint),
    pub bind_texture: unsafe extern "C" fn(target: GLenum, texture: GLuint),
    pub tex_parameteri: unsafe extern "C" fn(target: GLenum, pname: GLenum, param: GLint),
    pub gen_framebuffers: unsafe extern "C" fn(n: GLsizei, framebuffers: *mut GLuint),
    pub delete_framebuffers: unsafe extern "C" fn(n: GLsizei, framebuffers: *const GLuint),
    pub bind_framebuffer: unsafe extern "C" fn(target: GLenum, framebuffer: GLuint),
    pub framebuffer_texture_2d: unsafe extern "C" fn(
        target: GLenum,
        attachment: GLenum,
        textarget: GLenum,
        texture: GLuint,
        level: GLint,
    ),
    pub check_framebuffer_status: unsafe extern "C" fn(target: GLenum) -> GLenum,
    _library: DynamicLibrary,
}

impl GlesLibrary {
    pub fn load() -> Result<Self, LoadError> {
        let library = DynamicLibrary::open("libGLESv2.so.2", env!("KMS_SCANOUT_GLES_LIBDIR"))?;
        // SAFETY: each field type matches the prototype in GLES2/gl2.h.
        unsafe {
            Ok(Self {
                get_string: library.require("glGetString")?.cast(),
                gen_textures: library.require("glGenTextures")?.cast(),
                delete_textures: library.require("glDeleteTextures")?.cast(),
                bind_texture: library.require("glBindTexture")?.cast(),
                tex_parameteri: library.require("glTexParameteri")?.cast(),
                gen_framebuffers: library.require("glGenFramebuffers")?.cast(),
                delete_framebuffers: library.require("glDeleteFramebuffers")?.cast(),
                bind_framebuffer: library.require("glBindFramebuffer")?.cast(),
                framebuffer_texture_2d: library.require("glFramebufferTexture2D")?.cast(),
                check_framebuffer_status: library.require("glCheckFramebufferStatus")?.cast(),
                _library: library,
            })
        }
    }
}
