fn main() {
    // macOS: CBCentralManager refuses to scan unless the binary carries an
    // embedded Info.plist with NSBluetoothAlwaysUsageDescription. For a CLI
    // tool the plist goes into the __TEXT,__info_plist section via linker
    // flags; macOS reads it exactly as it would an app bundle's Info.plist.
    //
    // CARGO_CFG_TARGET_OS reflects the target, so cross-compiling from
    // Linux to macOS is handled too.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos") {
        let dir = std::env::var("CARGO_MANIFEST_DIR")
            .expect("CARGO_MANIFEST_DIR must be set by Cargo");
        let plist = format!("{dir}/Info.plist");

        println!("cargo:rustc-link-arg=-sectcreate");
        println!("cargo:rustc-link-arg=__TEXT");
        println!("cargo:rustc-link-arg=__info_plist");
        println!("cargo:rustc-link-arg={plist}");

        println!("cargo:rerun-if-changed=Info.plist");
    }
}
