// build.rs

fn main() {
    // --- Locate the platform graphics libraries ---
    // The binary opens libgbm, libEGL and libGLESv2 at runtime so that optional
    // entry points can be negotiated instead of hard-linked. pkg-config only
    // tells us where the libraries live; if it fails we leave the variable
    // empty and the loader falls back to the bare soname.

    let libraries = [
        ("gbm", "KMS_SCANOUT_GBM_LIBDIR"),
        ("egl", "KMS_SCANOUT_EGL_LIBDIR"),
        ("glesv2", "KMS_SCANOUT_GLES_LIBDIR"),
    ];

    for (lib, env_name) in &libraries {
        let libdir = pkg_config::Config::new()
            .cargo_metadata(false)
            .probe(lib)
            .ok()
            .and_then(|library| library.link_paths.first().cloned());

        match libdir {
            Some(dir) => {
                println!("cargo:rustc-env={}={}", env_name, dir.display());
            }
            None => {
                eprintln!(
                    "pkg-config could not find '{}'. Runtime loading will rely on the default search path.",
                    lib
                );
                println!("cargo:rustc-env={}=", env_name);
            }
        }
    }

    println!("cargo:rerun-if-changed=build.rs");
}
