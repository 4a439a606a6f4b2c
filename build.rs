fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Stamp the binary so `microcut --version` output can be matched to a build
    let build_date = chrono::Utc::now()
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string();
    println!("cargo:rustc-env=MICROCUT_BUILD_DATE={}", build_date);
}
