//! Build script for machcompat-core
//!
//! Checks the toolchain and target before compilation:
//! - Minimum Rust version (let-else and `is_some_and` need Rust 1.70.0+)
//! - Host backend availability (the bundled backend needs Linux procfs)

fn main()
{
    // Check minimum Rust version
    match rustc_version::version() {
        Ok(rustc_version) => {
            let min_rust_version = rustc_version::Version::new(1, 70, 0);
            if rustc_version < min_rust_version {
                panic!(
                    "machcompat-core requires Rust {} or newer, found {}",
                    min_rust_version, rustc_version
                );
            }
        }
        // Some build environments cannot run rustc -vV
        Err(_) => println!("cargo:warning=could not verify Rust version"),
    }

    println!("cargo:rerun-if-changed=build.rs");

    // Only the target OS matters here, not the OS running the build script
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "linux" {
        println!(
            "cargo:warning=machcompat-core has no host backend for target_os={target_os}; \
             supply your own HostKernel implementation"
        );
    }
}
