// src/os/mod.rs
//! Operating-system helpers shared by the platform bindings.

pub mod dylib;

pub use dylib::{DynamicLibrary, LoadError};
