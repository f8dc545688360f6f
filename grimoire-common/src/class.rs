//! Syscall-class membership tables.
//!
//! A [`SyscallClass`] groups syscall numbers that play the same role in an
//! attack sequence (e.g. "anything that creates a process") so a pattern
//! step can match a class instead of a single `syscall_nr`. Numbers below
//! are x86_64 syscall numbers; the table is intentionally small and
//! contiguous-array-friendly, matching the "no heap indirection per step"
//! constraint on the pattern catalog.

/// x86_64 syscall numbers referenced by the built-in catalog and by the
/// class tables below.
pub mod nr {
    pub const READ: u32 = 0;
    pub const WRITE: u32 = 1;
    pub const OPEN: u32 = 2;
    pub const CLOSE: u32 = 3;
    pub const PREAD64: u32 = 17;
    pub const READV: u32 = 19;
    pub const DUP2: u32 = 33;
    pub const SOCKET: u32 = 41;
    pub const CONNECT: u32 = 42;
    pub const SENDTO: u32 = 44;
    pub const SENDMSG: u32 = 46;
    pub const BIND: u32 = 49;
    pub const CLONE: u32 = 56;
    pub const FORK: u32 = 57;
    pub const VFORK: u32 = 58;
    pub const EXECVE: u32 = 59;
    pub const SETUID: u32 = 105;
    pub const SETGID: u32 = 106;
    pub const INIT_MODULE: u32 = 175;
    pub const SETRESUID: u32 = 117;
    pub const SETRESGID: u32 = 119;
    pub const OPENAT: u32 = 257;
    pub const DUP3: u32 = 292;
    pub const FINIT_MODULE: u32 = 313;
    pub const CLONE3: u32 = 435;

    /// Every syscall number named above, for class-expansion iteration.
    pub const ALL: [u32; 25] = [
        READ, WRITE, OPEN, CLOSE, PREAD64, READV, DUP2, SOCKET, CONNECT, SENDTO, SENDMSG, BIND,
        CLONE, FORK, VFORK, EXECVE, SETUID, SETGID, INIT_MODULE, SETRESUID, SETRESGID, OPENAT,
        DUP3, FINIT_MODULE, CLONE3,
    ];
}

/// A coarse class of related syscalls, used by [`PatternStep`] in
/// `grimoire` when a step should match any member of a family rather than
/// one fixed number.
///
/// [`PatternStep`]: ../../grimoire/struct.PatternStep.html
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SyscallClass {
    Any = 0,
    Network = 1,
    FileRead = 2,
    FileWrite = 3,
    ProcessCreate = 4,
    Privilege = 5,
    Module = 6,
    IoRedirect = 7,
}

impl SyscallClass {
    /// Whether `syscall_nr` is a member of this class.
    pub fn contains(self, syscall_nr: u32) -> bool {
        match self {
            SyscallClass::Any => true,
            SyscallClass::Network => matches!(
                syscall_nr,
                nr::SOCKET | nr::CONNECT | nr::BIND | nr::SENDTO | nr::SENDMSG
            ),
            SyscallClass::FileRead => matches!(
                syscall_nr,
                nr::OPEN | nr::OPENAT | nr::READ | nr::PREAD64 | nr::READV
            ),
            SyscallClass::FileWrite => matches!(syscall_nr, nr::OPEN | nr::OPENAT | nr::WRITE),
            SyscallClass::ProcessCreate => {
                matches!(syscall_nr, nr::FORK | nr::VFORK | nr::CLONE | nr::CLONE3)
            }
            SyscallClass::Privilege => matches!(
                syscall_nr,
                nr::SETUID | nr::SETGID | nr::SETRESUID | nr::SETRESGID
            ),
            SyscallClass::Module => matches!(syscall_nr, nr::INIT_MODULE | nr::FINIT_MODULE),
            SyscallClass::IoRedirect => matches!(syscall_nr, nr::DUP2 | nr::DUP3),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn network_class_contains_socket_family() {
        assert!(SyscallClass::Network.contains(nr::SOCKET));
        assert!(SyscallClass::Network.contains(nr::CONNECT));
        assert!(!SyscallClass::Network.contains(nr::EXECVE));
    }

    #[test]
    fn any_class_matches_everything() {
        assert!(SyscallClass::Any.contains(0));
        assert!(SyscallClass::Any.contains(9999));
    }
}
