// src/gpu/egl.rs

//! EGL/GLES implementation of [`GpuBackend`].

use super::context::{GpuBackend, GpuCapabilities, GpuError, ImageId, RenderTargetId, TextureId};
use super::ffi::{self, EglLibrary, GlesLibrary};
use crate::caps::{CapabilityScope, CapabilityTable};
use crate::gbm::{BufferDevice, SurfaceHandle};
use drm_fourcc::DrmFourcc;
use log::{debug, info, trace, warn};
use std::ffi::{c_void, CStr};
use std::os::raw::c_char;

/// An initialized display with a current GLES 2 context.
///
/// The context renders to the pool's window surface when there is one and is
/// surfaceless otherwise. Everything is torn down on drop.
pub struct EglBackend {
    display: ffi::EGLDisplay,
    context: ffi::EGLContext,
    surface: ffi::EGLSurface,
    capabilities: GpuCapabilities,
    gl: GlesLibrary,
    egl: EglLibrary,
}

fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

impl EglBackend {
    /// Brings up EGL on `device`, rendering to `surface` if given.
    ///
    /// `samples` is the multisample count requested from the config chooser.
    pub fn new(
        device: &dyn BufferDevice,
        surface: Option<&dyn SurfaceHandle>,
        format: DrmFourcc,
        samples: i32,
    ) -> Result<Self, GpuError> {
        let egl = EglLibrary::load().map_err(|e| GpuError::Platform(e.to_string()))?;
        let gl = GlesLibrary::load().map_err(|e| GpuError::Platform(e.to_string()))?;

        let client_extensions =
            c_string(unsafe { (egl.query_string)(ffi::EGL_NO_DISPLAY, ffi::EGL_EXTENSIONS) });
        let mut client = CapabilityTable::new(CapabilityScope::Client);
        client.resolve(
            &client_extensions,
            "EGL_EXT_platform_base",
            &[ffi::GET_PLATFORM_DISPLAY],
            &egl,
        );

        let native = device.native_display();
        let display = match unsafe { client.function::<ffi::GetPlatformDisplayFn>(ffi::GET_PLATFORM_DISPLAY) } {
            Some(get_platform_display) => unsafe {
                get_platform_display(ffi::EGL_PLATFORM_GBM_KHR, native, std::ptr::null())
            },
            None => unsafe { (egl.get_display)(native) },
        };
        if display.is_null() {
            return Err(GpuError::Platform("no EGL display for the GBM device".to_string()));
        }

        let (mut major, mut minor) = (0, 0);
        if unsafe { (egl.initialize)(display, &mut major, &mut minor) } == ffi::EGL_FALSE {
            return Err(platform_error(&egl, "eglInitialize"));
        }

        // From here on, failures must terminate the display.
        let mut backend = Self {
            display,
            context: ffi::EGL_NO_CONTEXT,
            surface: ffi::EGL_NO_SURFACE,
            capabilities: GpuCapabilities {
                client,
                display: CapabilityTable::new(CapabilityScope::Display),
                gl: CapabilityTable::new(CapabilityScope::Gl),
                modifiers_supported: false,
            },
            gl,
            egl,
        };
        backend.negotiate_display(major, minor, &client_extensions);
        backend.create_context(surface, format, samples)?;
        backend.negotiate_gl();
        Ok(backend)
    }

    fn negotiate_display(&mut self, major: i32, minor: i32, client_extensions: &str) {
        let extensions = c_string(unsafe { (self.egl.query_string)(self.display, ffi::EGL_EXTENSIONS) });
        let table = &mut self.capabilities.display;
        table.resolve(
            &extensions,
            "EGL_KHR_image_base",
            &[ffi::CREATE_IMAGE, ffi::DESTROY_IMAGE],
            &self.egl,
        );
        table.resolve(
            &extensions,
            "EGL_KHR_fence_sync",
            &[
                ffi::CREATE_SYNC,
                ffi::DESTROY_SYNC,
                ffi::WAIT_SYNC,
                ffi::CLIENT_WAIT_SYNC,
            ],
            &self.egl,
        );
        table.resolve(
            &extensions,
            "EGL_ANDROID_native_fence_sync",
            &[ffi::DUP_NATIVE_FENCE_FD],
            &self.egl,
        );
        self.capabilities.modifiers_supported =
            crate::caps::has_extension(&extensions, "EGL_EXT_image_dma_buf_import_modifiers");

        info!("Using EGL display {:p} with EGL version {}.{}", self.display, major, minor);
        info!(
            "EGL version \"{}\", vendor \"{}\"",
            c_string(unsafe { (self.egl.query_string)(self.display, ffi::EGL_VERSION) }),
            c_string(unsafe { (self.egl.query_string)(self.display, ffi::EGL_VENDOR) })
        );
        debug!("EGL client extensions: {}", client_extensions);
        debug!("EGL display extensions: {}", extensions);
        info!(
            "Image modifiers: {}, fence sync: {}, native fences: {}",
            self.capabilities.modifiers_supported,
            self.capabilities.fence_sync_supported(),
            self.capabilities.native_fence_supported()
        );
    }

    fn create_context(
        &mut self,
        surface: Option<&dyn SurfaceHandle>,
        format: DrmFourcc,
        samples: i32,
    ) -> Result<(), GpuError> {
        if unsafe { (self.egl.bind_api)(ffi::EGL_OPENGL_ES_API) } == ffi::EGL_FALSE {
            return Err(platform_error(&self.egl, "eglBindAPI"));
        }

        let config = self.choose_config(format as u32 as i32, samples)?;

        let context_attributes = [ffi::EGL_CONTEXT_CLIENT_VERSION, 2, ffi::EGL_NONE];
        self.context = unsafe {
            (self.egl.create_context)(
                self.display,
                config,
                ffi::EGL_NO_CONTEXT,
                context_attributes.as_ptr(),
            )
        };
        if self.context.is_null() {
            return Err(platform_error(&self.egl, "eglCreateContext"));
        }

        if let Some(surface) = surface {
            self.surface = unsafe {
                (self.egl.create_window_surface)(
                    self.display,
                    config,
                    surface.native_window(),
                    std::ptr::null(),
                )
            };
            if self.surface.is_null() {
                return Err(platform_error(&self.egl, "eglCreateWindowSurface"));
            }
        }

        let current = unsafe {
            (self.egl.make_current)(self.display, self.surface, self.surface, self.context)
        };
        if current == ffi::EGL_FALSE {
            return Err(platform_error(&self.egl, "eglMakeCurrent"));
        }
        Ok(())
    }

    /// First config whose native visual is `visual_id`, or the first config
    /// at all when `visual_id` is zero.
    fn choose_config(&self, visual_id: i32, samples: i32) -> Result<ffi::EGLConfig, GpuError> {
        let attributes = [
            ffi::EGL_SURFACE_TYPE,
            ffi::EGL_WINDOW_BIT,
            ffi::EGL_RED_SIZE,
            1,
            ffi::EGL_GREEN_SIZE,
            1,
            ffi::EGL_BLUE_SIZE,
            1,
            ffi::EGL_ALPHA_SIZE,
            0,
            ffi::EGL_RENDERABLE_TYPE,
            ffi::EGL_OPENGL_ES2_BIT,
            ffi::EGL_SAMPLES,
            samples,
            ffi::EGL_NONE,
        ];

        let mut total = 0;
        let ok = unsafe { (self.egl.get_configs)(self.display, std::ptr::null_mut(), 0, &mut total) };
        if ok == ffi::EGL_FALSE || total <= 0 {
            return Err(GpuError::Platform("no EGL configs available".to_string()));
        }

        let mut configs: Vec<ffi::EGLConfig> = vec![std::ptr::null_mut(); total as usize];
        let mut matched = 0;
        let ok = unsafe {
            (self.egl.choose_config)(
                self.display,
                attributes.as_ptr(),
                configs.as_mut_ptr(),
                total,
                &mut matched,
            )
        };
        if ok == ffi::EGL_FALSE || matched <= 0 {
            return Err(GpuError::Platform(format!(
                "no EGL config matches the attributes (samples = {})",
                samples
            )));
        }
        configs.truncate(matched as usize);

        if visual_id == 0 {
            return Ok(configs[0]);
        }
        for &config in &configs {
            let mut id = 0;
            let ok = unsafe {
                (self.egl.get_config_attrib)(self.display, config, ffi::EGL_NATIVE_VISUAL_ID, &mut id)
            };
            if ok != ffi::EGL_FALSE && id == visual_id {
                trace!("EGL config {:p} matches visual {:#x}", config, visual_id);
                return Ok(config);
            }
        }
        Err(GpuError::Platform(format!(
            "none of {} EGL config(s) has native visual {:#x}",
            configs.len(),
            visual_id
        )))
    }

    fn negotiate_gl(&mut self) {
        let gl_string = |name| c_string(unsafe { (self.gl.get_string)(name) } as *const c_char);
        let extensions = gl_string(ffi::GL_EXTENSIONS);
        info!(
            "OpenGL ES version \"{}\", shading language \"{}\"",
            gl_string(ffi::GL_VERSION),
            gl_string(ffi::GL_SHADING_LANGUAGE_VERSION)
        );
        info!(
            "OpenGL ES vendor \"{}\", renderer \"{}\"",
            gl_string(ffi::GL_VENDOR),
            gl_string(ffi::GL_RENDERER)
        );
        debug!("OpenGL ES extensions: {}", extensions);

        self.capabilities.gl.resolve(
            &extensions,
            "GL_OES_EGL_image",
            &[ffi::IMAGE_TARGET_TEXTURE_2D],
            &self.egl,
        );
    }
}

fn platform_error(egl: &EglLibrary, call: &str) -> GpuError {
    let code = unsafe { (egl.get_error)() };
    GpuError::Platform(format!("{} failed (EGL error {:#x})", call, code))
}

impl GpuBackend for EglBackend {
    fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    fn create_image(&self, attributes: &[i32]) -> Result<ImageId, String> {
        let create = unsafe {
            self.capabilities
                .display
                .function::<ffi::CreateImageFn>(ffi::CREATE_IMAGE)
        }
        .ok_or_else(|| format!("{} is unavailable", ffi::CREATE_IMAGE))?;
        let image = unsafe {
            create(
                self.display,
                ffi::EGL_NO_CONTEXT,
                ffi::EGL_LINUX_DMA_BUF_EXT,
                std::ptr::null_mut(),
                attributes.as_ptr(),
            )
        };
        if image == ffi::EGL_NO_IMAGE_KHR {
            let code = unsafe { (self.egl.get_error)() };
            return Err(format!("eglCreateImageKHR failed (EGL error {:#x})", code));
        }
        Ok(ImageId(image as usize))
    }

    fn destroy_image(&self, image: ImageId) {
        let destroy = unsafe {
            self.capabilities
                .display
                .function::<ffi::DestroyImageFn>(ffi::DESTROY_IMAGE)
        };
        if let Some(destroy) = destroy {
            if unsafe { destroy(self.display, image.0 as *mut c_void) } == ffi::EGL_FALSE {
                warn!("eglDestroyImageKHR failed for image {:#x}", image.0);
            }
        }
    }

    fn create_texture(&self, image: ImageId) -> TextureId {
        let mut texture = 0;
        unsafe {
            (self.gl.gen_textures)(1, &mut texture);
            (self.gl.bind_texture)(ffi::GL_TEXTURE_2D, texture);
            if let Some(target_texture) = self
                .capabilities
                .gl
                .function::<ffi::ImageTargetTexture2DFn>(ffi::IMAGE_TARGET_TEXTURE_2D)
            {
                target_texture(ffi::GL_TEXTURE_2D, image.0 as *mut c_void);
            }
            (self.gl.tex_parameteri)(ffi::GL_TEXTURE_2D, ffi::GL_TEXTURE_MIN_FILTER, ffi::GL_LINEAR);
            (self.gl.tex_parameteri)(ffi::GL_TEXTURE_2D, ffi::GL_TEXTURE_MAG_FILTER, ffi::GL_LINEAR);
            (self.gl.bind_texture)(ffi::GL_TEXTURE_2D, 0);
        }
        TextureId(texture)
    }

    fn delete_texture(&self, texture: TextureId) {
        unsafe { (self.gl.delete_textures)(1, &texture.0) };
    }

    fn create_render_target(&self, texture: TextureId) -> RenderTargetId {
        let mut framebuffer = 0;
        unsafe {
            (self.gl.gen_framebuffers)(1, &mut framebuffer);
            (self.gl.bind_framebuffer)(ffi::GL_FRAMEBUFFER, framebuffer);
            (self.gl.framebuffer_texture_2d)(
                ffi::GL_FRAMEBUFFER,
                ffi::GL_COLOR_ATTACHMENT0,
                ffi::GL_TEXTURE_2D,
                texture.0,
                0,
            );
        }
        RenderTargetId(framebuffer)
    }

    fn render_target_complete(&self, target: RenderTargetId) -> bool {
        unsafe {
            (self.gl.bind_framebuffer)(ffi::GL_FRAMEBUFFER, target.0);
            (self.gl.check_framebuffer_status)(ffi::GL_FRAMEBUFFER) == ffi::GL_FRAMEBUFFER_COMPLETE
        }
    }

    fn delete_render_target(&self, target: RenderTargetId) {
        unsafe {
            (self.gl.bind_framebuffer)(ffi::GL_FRAMEBUFFER, 0);
            (self.gl.delete_framebuffers)(1, &target.0);
        }
    }
}

impl Drop for EglBackend {
    fn drop(&mut self) {
        unsafe {
            (self.egl.make_current)(
                self.display,
                ffi::EGL_NO_SURFACE,
                ffi::EGL_NO_SURFACE,
                ffi::EGL_NO_CONTEXT,
            );
            if !self.surface.is_null() {
                (self.egl.destroy_surface)(self.display, self.surface);
            }
            if !self.context.is_null() {
                (self.egl.destroy_context)(self.display, self.context);
            }
            if (self.egl.terminate)(self.display) == ffi::EGL_FALSE {
                warn!("eglTerminate failed");
            }
        }
        debug!("EGL display {:p} terminated", self.display);
    }
}
