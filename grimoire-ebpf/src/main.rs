//! The oracle: one tracepoint on `raw_syscalls:sys_enter`.
//!
//! Per event: check the global enable flag, check the monitored-syscall
//! map, resolve the host PID, reserve a ring buffer record, fill it,
//! submit. Every branch increments the matching `GRIMOIRE_COUNTERS` cell;
//! nothing here blocks or retries.

#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::BPF_F_CURRENT_CPU,
    helpers::{bpf_get_current_task, bpf_get_ns_current_pid_tgid, bpf_ktime_get_ns, bpf_probe_read_kernel},
    macros::{map, tracepoint},
    maps::{Array, HashMap, RingBuf},
    programs::TracePointContext,
    EbpfContext,
};
use aya_log_ebpf::debug;
use grimoire_common::{
    counter_index,
    maps::{NsIdentity, NsOffsets},
    SyscallEvent,
};

/// `format/raw_syscalls/sys_enter/format` lays out:
/// `u16 common_type; u8 common_flags; u8 common_preempt_count; s32 common_pid;`
/// (8 bytes) followed by `s64 id; s64 args[6]`. `id` is the syscall number.
const SYS_ENTER_ID_OFFSET: usize = 8;
const SYS_ENTER_ARGS_OFFSET: usize = 16;

#[map(name = "GRIMOIRE_ENABLE")]
static ENABLE: Array<u32> = Array::with_max_entries(1, 0);

#[map(name = "MONITORED_SYSCALLS")]
static MONITORED_SYSCALLS: HashMap<u32, u8> = HashMap::with_max_entries(512, 0);

#[map(name = "GRIMOIRE_COUNTERS")]
static COUNTERS: Array<u64> = Array::with_max_entries(counter_index::COUNT, 0);

#[map(name = "EVENTS")]
static EVENTS: RingBuf = RingBuf::with_byte_size(0, 0);

#[map(name = "INIT_NS_IDENTITY")]
static INIT_NS_IDENTITY: Array<NsIdentity> = Array::with_max_entries(1, 0);

#[map(name = "NS_OFFSETS")]
static NS_OFFSETS: Array<NsOffsets> = Array::with_max_entries(1, 0);

#[inline(always)]
fn bump_counter(index: u32) {
    if let Some(cell) = COUNTERS.get_ptr_mut(index) {
        unsafe { *cell = (*cell).saturating_add(1) };
    }
}

#[inline(always)]
fn is_enabled() -> bool {
    ENABLE.get(0).copied().unwrap_or(0) != 0
}

#[inline(always)]
fn is_monitored(syscall_nr: u32) -> bool {
    unsafe { MONITORED_SYSCALLS.get(&syscall_nr).is_some() }
}

/// Resolves the host (init-namespace) PID for the task currently on CPU.
///
/// Uses `bpf_get_ns_current_pid_tgid` against the namespace identity the
/// loader captured for the init PID namespace at startup: the helper
/// reports the PID as seen *from that namespace*, which for the init
/// namespace is exactly the host PID.
#[inline(always)]
fn resolve_host_pid() -> u32 {
    let Some(identity) = INIT_NS_IDENTITY.get(0) else {
        return 0;
    };
    if identity.dev == 0 && identity.ino == 0 {
        return 0;
    }
    let mut out = aya_ebpf::bindings::bpf_pidns_info::default();
    let size = core::mem::size_of_val(&out) as u32;
    let ret = unsafe {
        bpf_get_ns_current_pid_tgid(
            identity.dev,
            identity.ino,
            &mut out as *mut _,
            size,
        )
    };
    if ret != 0 {
        return 0;
    }
    out.tgid
}

/// Walks `task->nsproxy->pid_ns_for_children->ns.inum` using offsets the
/// loader discovered from BTF. Never faults: every pointer dereference
/// goes through `bpf_probe_read_kernel`, which returns an error instead of
/// crashing the kernel on a bad address.
#[inline(always)]
fn resolve_pid_ns_inum() -> u64 {
    let Some(offsets) = NS_OFFSETS.get(0) else {
        return 0;
    };
    if offsets.nsproxy == 0 || offsets.pid_ns_for_children == 0 {
        return 0;
    }

    let task = bpf_get_current_task() as *const u8;

    let nsproxy_ptr: u64 = unsafe {
        match bpf_probe_read_kernel(task.add(offsets.nsproxy as usize) as *const u64) {
            Ok(v) => v,
            Err(_) => return 0,
        }
    };
    if nsproxy_ptr == 0 {
        return 0;
    }

    let pid_ns_ptr: u64 = unsafe {
        let p = (nsproxy_ptr as *const u8).add(offsets.pid_ns_for_children as usize) as *const u64;
        match bpf_probe_read_kernel(p) {
            Ok(v) => v,
            Err(_) => return 0,
        }
    };
    if pid_ns_ptr == 0 {
        return 0;
    }

    // `ns_common.inum` is the first field of `struct ns_common` embedded at
    // the start of `struct pid_namespace`.
    let inum_offset = offsets.ns_common_inum as usize;
    unsafe {
        let p = (pid_ns_ptr as *const u8).add(inum_offset) as *const u32;
        match bpf_probe_read_kernel(p) {
            Ok(v) => v as u64,
            Err(_) => 0,
        }
    }
}

#[tracepoint]
pub fn sys_enter(ctx: TracePointContext) -> u32 {
    bump_counter(counter_index::SEEN);

    if !is_enabled() {
        return 0;
    }

    let syscall_nr: i64 = match unsafe { ctx.read_at(SYS_ENTER_ID_OFFSET) } {
        Ok(v) => v,
        Err(_) => return 0,
    };
    let syscall_nr = syscall_nr as u32;

    if !is_monitored(syscall_nr) {
        return 0;
    }
    bump_counter(counter_index::FILTER_PASSED);

    let host_pid = resolve_host_pid();
    let pid_ns_inum = resolve_pid_ns_inum();
    let timestamp_ns = unsafe { bpf_ktime_get_ns() };

    let mut args = [0u64; 6];
    for (i, slot) in args.iter_mut().enumerate() {
        let offset = SYS_ENTER_ARGS_OFFSET + i * 8;
        *slot = unsafe { ctx.read_at::<u64>(offset).unwrap_or(0) };
    }

    let Some(mut entry) = EVENTS.reserve::<SyscallEvent>(0) else {
        bump_counter(counter_index::DROPPED);
        return 0;
    };

    let event = SyscallEvent {
        syscall_nr,
        host_pid,
        pid_ns_inum,
        timestamp_ns,
        args,
    };
    unsafe {
        core::ptr::write_unaligned(entry.as_mut_ptr(), event);
    }
    entry.submit(BPF_F_CURRENT_CPU as u64);

    bump_counter(counter_index::EMITTED);
    debug!(&ctx, "emitted syscall_nr={} host_pid={}", syscall_nr, host_pid);
    0
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
