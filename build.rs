use std::env;

fn main() {
    // Version string shown by `butterfly-isochrone --version`
    let version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".to_string());
    let profile = env::var("PROFILE").unwrap_or_default();
    let full = if profile == "release" {
        version
    } else {
        format!("{version}-{profile}")
    };
    println!("cargo:rustc-env=BUTTERFLY_VERSION={full}");

    println!("cargo:rerun-if-changed=src/");
    println!("cargo:rerun-if-changed=Cargo.toml");
}
