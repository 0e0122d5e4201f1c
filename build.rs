// Build script for the audio monitor core
//
// flutter_rust_bridge v2 bindings are generated out of band with
//   flutter_rust_bridge_codegen generate
// so this script only tracks the API surface and Android linkage.

fn main() {
    // Tell cargo to rerun this build script if the FFI surface changes
    println!("cargo:rerun-if-changed=src/api.rs");
    println!("cargo:rerun-if-changed=src/api/dispatch.rs");

    // Oboe is C++; Android builds link against libc++_shared so symbols like
    // __cxa_pure_virtual resolve on all ABIs.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("android") {
        println!("cargo:rustc-link-lib=c++_shared");
    }
}
