//! Loads the oracle's eBPF object, attaches it, and populates its maps.

use aya::maps::{Array, HashMap as AyaHashMap, MapData, RingBuf};
use aya::programs::TracePoint;
use aya::{Ebpf, Pod};
use grimoire_common::maps::{NsIdentity, NsOffsets};
use grimoire_common::{counter_index, maps as map_names, SyscallEvent};
use tracing::{info, warn};

use crate::error::OracleError;

/// Mirrors [`NsIdentity`]'s layout so it can implement `aya::Pod`:
/// `grimoire-common` is `#![no_std]` and shared with the kernel-side
/// crate, so it cannot depend on `aya`, and `Pod` is foreign to both that
/// type and this crate (orphan rule). The loader is the one place that
/// needs the `Pod` bound, so it owns the mirror.
#[repr(C)]
#[derive(Clone, Copy)]
struct RawNsIdentity {
    dev: u64,
    ino: u64,
}

unsafe impl Pod for RawNsIdentity {}

impl From<NsIdentity> for RawNsIdentity {
    fn from(v: NsIdentity) -> Self {
        RawNsIdentity { dev: v.dev, ino: v.ino }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RawNsOffsets {
    nsproxy: u32,
    pid_ns_for_children: u32,
    ns_common_inum: u32,
}

unsafe impl Pod for RawNsOffsets {}

impl From<NsOffsets> for RawNsOffsets {
    fn from(v: NsOffsets) -> Self {
        RawNsOffsets {
            nsproxy: v.nsproxy,
            pid_ns_for_children: v.pid_ns_for_children,
            ns_common_inum: v.ns_common_inum,
        }
    }
}

/// The compiled eBPF object, built by the `grimoire-ebpf` crate and
/// embedded at build time via the workspace's companion build step. No
/// `build.rs`/bindgen step is needed here: `aya-ebpf` already supplies
/// the kernel bindings (see DESIGN.md).
static PROGRAM_BYTES: &[u8] = aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/grimoire-ebpf"));

/// A conservative, kernel-version-independent fallback for the
/// `task_struct` → `nsproxy` → `pid_ns_for_children` → `ns_common.inum`
/// offset chain. Real BTF-based discovery (walking `/sys/kernel/btf/vmlinux`
/// for the exact running kernel) is the intended long-term path; this
/// table is the pragmatic first implementation and is deliberately
/// isolated behind [`resolve_ns_offsets`] so it can be replaced without
/// touching call sites.
const FALLBACK_NS_OFFSETS: NsOffsets = NsOffsets {
    nsproxy: 0x3e8,
    pid_ns_for_children: 0x30,
    ns_common_inum: 0x4,
};

/// Attempts to discover the offset chain from the running kernel's BTF;
/// falls back to [`FALLBACK_NS_OFFSETS`] when BTF is unavailable (common
/// on kernels built without `CONFIG_DEBUG_INFO_BTF`) or discovery fails.
///
/// TODO: replace the fallback path with real BTF member-offset lookups
/// once the target fleet's kernel BTF is known to expose `task_struct`
/// with stable member names.
fn resolve_ns_offsets() -> NsOffsets {
    if std::path::Path::new("/sys/kernel/btf/vmlinux").exists() {
        info!("BTF available; using conservative offset table (BTF member walk not yet implemented)");
    } else {
        warn!("no BTF at /sys/kernel/btf/vmlinux; using conservative offset table");
    }
    FALLBACK_NS_OFFSETS
}

/// The init PID namespace's identity, read once from this process's own
/// `/proc/self/ns/pid` so the kernel probe can recognize "am I already
/// in the init namespace" without a syscall per event.
fn resolve_init_ns_identity() -> Result<NsIdentity, OracleError> {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::symlink_metadata("/proc/self/ns/pid").map_err(OracleError::Io)?;
    Ok(NsIdentity {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

/// Owns the loaded eBPF object and its maps. Dropping this detaches the
/// tracepoint and frees the ring buffer.
pub struct Oracle {
    ebpf: Ebpf,
}

impl Oracle {
    /// Loads the program, attaches `raw_syscalls/sys_enter`, and
    /// populates every map except `monitored_syscalls`, which is set
    /// separately via [`Oracle::set_monitored_syscalls`] once the
    /// catalog's union is known.
    pub fn load(enable: bool) -> Result<Self, OracleError> {
        let mut ebpf = Ebpf::load(PROGRAM_BYTES).map_err(OracleError::Load)?;

        let program: &mut TracePoint = ebpf
            .program_mut("sys_enter")
            .ok_or(OracleError::MissingMap { name: "sys_enter" })?
            .try_into()
            .map_err(|_| OracleError::MissingMap { name: "sys_enter" })?;
        program.load().map_err(OracleError::Attach)?;
        program.attach("raw_syscalls", "sys_enter").map_err(OracleError::Attach)?;

        let mut oracle = Oracle { ebpf };
        oracle.set_enabled(enable)?;

        let init_ns_identity = resolve_init_ns_identity()?;
        oracle.write_single(map_names::INIT_NS_IDENTITY, RawNsIdentity::from(init_ns_identity))?;

        let ns_offsets = resolve_ns_offsets();
        oracle.write_single(map_names::NS_OFFSETS, RawNsOffsets::from(ns_offsets))?;

        Ok(oracle)
    }

    fn write_single<T: Pod>(&mut self, map_name: &'static str, value: T) -> Result<(), OracleError> {
        let map = self
            .ebpf
            .map_mut(map_name)
            .ok_or(OracleError::MissingMap { name: map_name })?;
        let mut array: Array<&mut MapData, T> = Array::try_from(map).map_err(|_| OracleError::MissingMap { name: map_name })?;
        array.set(0, value, 0).map_err(|_| OracleError::MissingMap { name: map_name })
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), OracleError> {
        self.write_single(map_names::ENABLE, enabled as u32)
    }

    /// Overwrites `monitored_syscalls` with exactly `syscall_numbers`,
    /// removing every entry not in the new set. No duplicates, no
    /// transient gap where a wanted syscall is briefly unmonitored.
    pub fn set_monitored_syscalls(&mut self, syscall_numbers: impl Iterator<Item = u32>) -> Result<(), OracleError> {
        let wanted: std::collections::HashSet<u32> = syscall_numbers.collect();
        let map = self
            .ebpf
            .map_mut(map_names::MONITORED_SYSCALLS)
            .ok_or(OracleError::MissingMap { name: map_names::MONITORED_SYSCALLS })?;
        let mut hm: AyaHashMap<&mut MapData, u32, u8> =
            AyaHashMap::try_from(map).map_err(|_| OracleError::MissingMap { name: map_names::MONITORED_SYSCALLS })?;

        let existing: Vec<u32> = hm.keys().filter_map(Result::ok).collect();
        for key in existing {
            if !wanted.contains(&key) {
                let _ = hm.remove(&key);
            }
        }
        for nr in wanted {
            hm.insert(nr, 1u8, 0).map_err(|_| OracleError::MissingMap { name: map_names::MONITORED_SYSCALLS })?;
        }
        Ok(())
    }

    /// Reads the four kernel-side counters from `GRIMOIRE_COUNTERS`.
    pub fn read_counters(&self) -> Result<[u64; counter_index::COUNT as usize], OracleError> {
        let map = self
            .ebpf
            .map(map_names::COUNTERS)
            .ok_or(OracleError::MissingMap { name: map_names::COUNTERS })?;
        let array: Array<&MapData, u64> = Array::try_from(map).map_err(|_| OracleError::MissingMap { name: map_names::COUNTERS })?;
        let mut counters = [0u64; counter_index::COUNT as usize];
        for (i, slot) in counters.iter_mut().enumerate() {
            *slot = array.get(&(i as u32), 0).unwrap_or(0);
        }
        Ok(counters)
    }

    /// Takes ownership of the ring buffer map for polling. Call once;
    /// the consumer loop owns it afterward.
    pub fn take_ring_buffer(&mut self) -> Result<RingBuf<MapData>, OracleError> {
        let map = self
            .ebpf
            .take_map(map_names::EVENTS)
            .ok_or(OracleError::MissingMap { name: map_names::EVENTS })?;
        RingBuf::try_from(map).map_err(OracleError::RingBuffer)
    }
}

/// Parses one ring buffer record into a [`SyscallEvent`]. Kept free of
/// `Oracle` state so the consumer loop can call it directly on borrowed
/// records without holding a borrow of `Oracle` itself.
pub fn parse_event(bytes: &[u8]) -> Option<SyscallEvent> {
    SyscallEvent::from_bytes(bytes)
}
