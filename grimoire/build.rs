//! Cross-compiles `grimoire-ebpf` to `bpfel-unknown-none` and drops the
//! resulting object where `oracle.rs`'s `include_bytes_aligned!` expects
//! it (`$OUT_DIR/grimoire-ebpf`). No bindgen step: `aya-ebpf` already
//! supplies the kernel-side types.

use aya_build::{Package, Toolchain};

fn main() {
    let cargo_metadata::Metadata { packages, .. } = cargo_metadata::MetadataCommand::new()
        .no_deps()
        .exec()
        .expect("failed to run cargo metadata");
    let ebpf_package = packages
        .into_iter()
        .find(|p| p.name.as_str() == "grimoire-ebpf")
        .expect("grimoire-ebpf not found in workspace metadata");
    let root_dir = ebpf_package
        .manifest_path
        .parent()
        .expect("grimoire-ebpf manifest path has no parent directory");
    aya_build::build_ebpf(
        [Package {
            name: &ebpf_package.name,
            root_dir: root_dir.as_str(),
            no_default_features: false,
            features: &[],
        }],
        Toolchain::default(),
    )
    .expect("failed to build grimoire-ebpf");
}
