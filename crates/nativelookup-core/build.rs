//! Build script for nativelookup-core
//!
//! This script checks build requirements before compilation:
//! - Minimum Rust version (C string literals = Rust 1.77.0+)
//! - Whether the target has a native host backend
//!
//! ## Requirements
//!
//! - **Rust**: 1.77.0 or newer
//! - **Linux / macOS**: native module enumeration and export lookup
//! - **Other targets**: the engine builds, but the host must supply its own
//!   capabilities (`Host::native()` returns an error)

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 77, 0);

        if rustc_version < min_rust_version {
            panic!(
                "nativelookup-core requires Rust {} or newer, found {}",
                min_rust_version, rustc_version
            );
        }
    } else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
    }

    check_target_backend();
}

fn check_target_backend()
{
    // Build scripts run on the host, so read the target from cargo's environment
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    if !matches!(target_os.as_str(), "linux" | "macos") {
        println!(
            "cargo:warning=nativelookup-core has no native host backend for '{target_os}'; \
             construct a Host from your own capabilities"
        );
    }
}
