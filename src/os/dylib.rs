// src/os/dylib.rs

//! Runtime loading of the platform graphics libraries using raw `libc`
//! `dlopen`/`dlsym` calls.
//!
//! Libraries are opened by soname at startup instead of being linked, so that
//! entry points which only newer library versions export can be treated as
//! optional capabilities rather than link-time requirements.

use crate::caps::{EntryPoint, SymbolLoader};
use log::{debug, trace};
use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr::NonNull;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {name}: {reason}")]
    Open { name: String, reason: String },
    #[error("{library} does not export required symbol `{symbol}`")]
    MissingSymbol {
        library: String,
        symbol: &'static str,
    },
}

/// An open `dlopen` handle, closed on drop.
#[derive(Debug)]
pub struct DynamicLibrary {
    name: String,
    handle: NonNull<libc::c_void>,
}

impl DynamicLibrary {
    /// Opens `soname`, trying `libdir/soname` first when `libdir` is known.
    ///
    /// `libdir` is normally the directory pkg-config reported at build time;
    /// an empty string skips straight to the default loader search path.
    pub fn open(soname: &str, libdir: &str) -> Result<Self, LoadError> {
        if !libdir.is_empty() {
            let candidate = Path::new(libdir).join(soname);
            match Self::open_exact(&candidate.to_string_lossy()) {
                Ok(lib) => return Ok(lib),
                Err(reason) => debug!(
                    "Could not open {} ({}), falling back to default search path",
                    candidate.display(),
                    reason
                ),
            }
        }
        Self::open_exact(soname).map_err(|reason| LoadError::Open {
            name: soname.to_string(),
            reason,
        })
    }

    fn open_exact(path: &str) -> Result<Self, String> {
        let c_path = CString::new(path).map_err(|e| e.to_string())?;
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        match NonNull::new(handle) {
            Some(handle) => {
                debug!("Opened {} ({:p})", path, handle);
                Ok(Self {
                    name: path.to_string(),
                    handle,
                })
            }
            None => Err(last_dl_error()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves a symbol that must exist for the library to be usable at all.
    pub fn require(&self, symbol: &'static str) -> Result<EntryPoint, LoadError> {
        self.load(symbol).ok_or_else(|| LoadError::MissingSymbol {
            library: self.name.clone(),
            symbol,
        })
    }
}

impl SymbolLoader for DynamicLibrary {
    fn load(&self, symbol: &str) -> Option<EntryPoint> {
        let c_symbol = CString::new(symbol).ok()?;
        let ptr = unsafe { libc::dlsym(self.handle.as_ptr(), c_symbol.as_ptr()) };
        trace!("dlsym({}, {}) = {:p}", self.name, symbol, ptr);
        EntryPoint::from_ptr(ptr)
    }
}

impl Drop for DynamicLibrary {
    fn drop(&mut self) {
        trace!("Closing {}", self.name);
        if unsafe { libc::dlclose(self.handle.as_ptr()) } != 0 {
            log::warn!("dlclose({}) failed: {}", self.name, last_dl_error());
        }
    }
}

fn last_dl_error() -> String {
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        "unknown dynamic loader error".to_string()
    } else {
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    }
}
