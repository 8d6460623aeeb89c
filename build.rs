fn main() {
    println!("cargo:rerun-if-changed=src");

    let crate_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let config = cbindgen::Config::from_file("cbindgen.toml").unwrap_or_else(|_| cbindgen::Config {
        language: cbindgen::Language::C,
        include_guard: Some("XRBRIDGE_H".into()),
        ..Default::default()
    });

    // Header generation is best effort; a failed parse must not break the crate build.
    if let Ok(bindings) = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        bindings.write_to_file(format!("{}/include/xrbridge.h", crate_dir));
    }
}
