//! Names of the kernel maps the oracle exposes. Both the
//! `grimoire-ebpf` program (which declares the maps) and the `grimoire`
//! loader (which looks them up by name through `aya`) import these
//! constants so a typo can't silently desync the two sides.

/// One `u32` cell: `0` disables the oracle entirely, `1` enables it.
pub const ENABLE: &str = "GRIMOIRE_ENABLE";

/// `u32 -> u8` hash map; presence of a key means that syscall number is
/// monitored. The value is unused.
pub const MONITORED_SYSCALLS: &str = "MONITORED_SYSCALLS";

/// Four-cell `u64` array, indexed by [`crate::counter_index`].
pub const COUNTERS: &str = "GRIMOIRE_COUNTERS";

/// The `SyscallEvent` ring buffer.
pub const EVENTS: &str = "EVENTS";

/// Single-cell array holding the `(dev, ino)` identity of the init PID
/// namespace, written once by the loader at startup so the oracle can
/// resolve host PIDs via `bpf_get_ns_current_pid_tgid`.
pub const INIT_NS_IDENTITY: &str = "INIT_NS_IDENTITY";

/// Single-cell array holding the `task_struct` field offsets the oracle
/// needs to read a task's own PID namespace inode, discovered by the
/// loader from BTF at startup.
pub const NS_OFFSETS: &str = "NS_OFFSETS";

/// `(dev, ino)` pair identifying a Linux namespace instance, as used by
/// [`INIT_NS_IDENTITY`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NsIdentity {
    pub dev: u64,
    pub ino: u64,
}

/// Field offsets (in bytes, from the start of `struct task_struct`) needed
/// to walk `task->nsproxy->pid_ns_for_children->ns.inum` without hardcoding
/// kernel-version-specific constants.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NsOffsets {
    pub nsproxy: u32,
    pub pid_ns_for_children: u32,
    pub ns_common_inum: u32,
}
