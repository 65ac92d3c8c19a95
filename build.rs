fn main() {
    println!("cargo:rerun-if-changed=proto/mediaremote.proto");
    prost_build::compile_protos(&["proto/mediaremote.proto"], &["proto/"])
        .expect("failed to compile mediaremote.proto");
}
