// src/caps.rs

//! Capability negotiation for optional platform entry points.
//!
//! Every subsystem this crate talks to (the buffer allocator library, the EGL
//! client, an initialized EGL display and the current GLES context) advertises
//! optional functionality, either as a space-separated extension string or
//! simply by exporting a symbol. Each of them gets one [`CapabilityTable`],
//! filled once during initialization. Call sites look entries up by name and
//! treat a missing entry as "feature unavailable", never as an error.

use log::{debug, trace};
use std::collections::BTreeMap;
use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

/// Returns true when `name` appears in `advertised` as a whole token.
///
/// `"EGL_KHR_image"` does not match an advertised `"EGL_KHR_image_base"`.
pub fn has_extension(advertised: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    advertised.split_ascii_whitespace().any(|token| token == name)
}

/// Address of a resolved function.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint(NonNull<c_void>);

impl EntryPoint {
    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// Reinterprets the address as a function pointer type.
    ///
    /// # Safety
    ///
    /// `F` must be an `extern "C"` function pointer type whose signature matches
    /// the symbol this entry point was resolved from.
    pub unsafe fn cast<F: Copy>(self) -> F {
        debug_assert_eq!(
            std::mem::size_of::<F>(),
            std::mem::size_of::<*mut c_void>()
        );
        std::mem::transmute_copy(&self.0.as_ptr())
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryPoint({:p})", self.0)
    }
}

/// Something that can turn a symbol name into an address.
pub trait SymbolLoader {
    fn load(&self, symbol: &str) -> Option<EntryPoint>;
}

/// Which subsystem a table describes. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityScope {
    /// Symbols exported (or not) by a dynamically loaded library.
    Platform,
    /// EGL client extensions, queried before any display exists.
    Client,
    /// Extensions of an initialized EGL display.
    Display,
    /// Extensions of the current GLES context.
    Gl,
}

/// Name-keyed table of optional entry points.
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    scope: CapabilityScope,
    entries: BTreeMap<&'static str, EntryPoint>,
}

impl CapabilityTable {
    pub fn new(scope: CapabilityScope) -> Self {
        Self {
            scope,
            entries: BTreeMap::new(),
        }
    }

    pub fn scope(&self) -> CapabilityScope {
        self.scope
    }

    /// Resolves `symbols` if `extension` is advertised in `advertised`.
    ///
    /// Returns whether the extension was advertised. Symbols the loader cannot
    /// find are left unset even when the extension is present.
    pub fn resolve(
        &mut self,
        advertised: &str,
        extension: &str,
        symbols: &[&'static str],
        loader: &dyn SymbolLoader,
    ) -> bool {
        if !has_extension(advertised, extension) {
            debug!("{:?}: {} not advertised", self.scope, extension);
            return false;
        }
        for &symbol in symbols {
            self.insert_from(symbol, loader);
        }
        true
    }

    /// Resolves `symbols` whose mere presence is the capability.
    ///
    /// Returns how many of them were found.
    pub fn resolve_symbols(&mut self, symbols: &[&'static str], loader: &dyn SymbolLoader) -> usize {
        symbols
            .iter()
            .filter(|&&symbol| self.insert_from(symbol, loader))
            .count()
    }

    fn insert_from(&mut self, symbol: &'static str, loader: &dyn SymbolLoader) -> bool {
        match loader.load(symbol) {
            Some(entry) => {
                trace!("{:?}: resolved {} at {:?}", self.scope, symbol, entry);
                self.entries.insert(symbol, entry);
                true
            }
            None => {
                debug!("{:?}: {} unavailable", self.scope, symbol);
                false
            }
        }
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.entries.contains_key(symbol)
    }

    pub fn contains_all(&self, symbols: &[&str]) -> bool {
        symbols.iter().all(|symbol| self.contains(symbol))
    }

    pub fn get(&self, symbol: &str) -> Option<EntryPoint> {
        self.entries.get(symbol).copied()
    }

    /// Typed lookup of an entry point.
    ///
    /// # Safety
    ///
    /// Same contract as [`EntryPoint::cast`].
    pub unsafe fn function<F: Copy>(&self, symbol: &str) -> Option<F> {
        self.get(symbol).map(|entry| entry.cast::<F>())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
