//! The five built-in incantations. Each is a `const` value so the whole
//! catalog lives in `.rodata`, not the heap.

use grimoire_common::class::{nr, SyscallClass};

use super::arg_constraint::{fixed_path, ArgConstraint, ArgConstraintKind};
use super::pattern::{PatternStep, ProcessRelationship, Severity, MAX_ARG_CONSTRAINTS, MAX_STEPS};
use super::Pattern;

const NO_ARGS: [Option<ArgConstraint>; MAX_ARG_CONSTRAINTS] = [None, None, None, None];

const fn step(syscall_nr: u32, max_time_delta_ns_from_prev: u64, max_step_distance: u32) -> PatternStep {
    PatternStep {
        syscall_nr: Some(syscall_nr),
        syscall_class: None,
        process_relationship: ProcessRelationship::SameProcess,
        max_time_delta_ns_from_prev,
        max_step_distance,
        arg_constraints: NO_ARGS,
    }
}

const fn class_step(class: SyscallClass, max_time_delta_ns_from_prev: u64, max_step_distance: u32) -> PatternStep {
    PatternStep {
        syscall_nr: None,
        syscall_class: Some(class),
        process_relationship: ProcessRelationship::SameProcess,
        max_time_delta_ns_from_prev,
        max_step_distance,
        arg_constraints: NO_ARGS,
    }
}

const fn empty_step() -> PatternStep {
    PatternStep {
        syscall_nr: None,
        syscall_class: None,
        process_relationship: ProcessRelationship::SameProcess,
        max_time_delta_ns_from_prev: 0,
        max_step_distance: 0,
        arg_constraints: NO_ARGS,
    }
}

/// Copies `steps[..count]` into a fixed `[PatternStep; MAX_STEPS]`, padding
/// the remainder with inert steps that `step_count` keeps unreachable.
const fn pad(steps: &[PatternStep], count: usize) -> [PatternStep; MAX_STEPS] {
    let mut out = [
        empty_step(),
        empty_step(),
        empty_step(),
        empty_step(),
        empty_step(),
        empty_step(),
        empty_step(),
        empty_step(),
    ];
    let mut i = 0;
    while i < count {
        out[i] = PatternStep {
            syscall_nr: steps[i].syscall_nr,
            syscall_class: steps[i].syscall_class,
            process_relationship: steps[i].process_relationship,
            max_time_delta_ns_from_prev: steps[i].max_time_delta_ns_from_prev,
            max_step_distance: steps[i].max_step_distance,
            arg_constraints: match &steps[i].arg_constraints[0] {
                Some(c) => [Some(ArgConstraint::new(c.arg_index, clone_kind(&c.kind))), None, None, None],
                None => NO_ARGS,
            },
        };
        i += 1;
    }
    out
}

/// `ArgConstraintKind` cannot derive `Copy` (it owns `FixedPathLiteral`
/// pairs), so `pad` needs an explicit `const` clone to move a step's lone
/// constraint into the padded array.
const fn clone_kind(kind: &ArgConstraintKind) -> ArgConstraintKind {
    match kind {
        ArgConstraintKind::Equals(v) => ArgConstraintKind::Equals(*v),
        ArgConstraintKind::NotEquals(v) => ArgConstraintKind::NotEquals(*v),
        ArgConstraintKind::GreaterThan(v) => ArgConstraintKind::GreaterThan(*v),
        ArgConstraintKind::LessThan(v) => ArgConstraintKind::LessThan(*v),
        ArgConstraintKind::BitmaskAny(v) => ArgConstraintKind::BitmaskAny(*v),
        ArgConstraintKind::BitmaskAll(v) => ArgConstraintKind::BitmaskAll(*v),
        ArgConstraintKind::PathContains(p) => ArgConstraintKind::PathContains(*p),
        ArgConstraintKind::PathStartsWith(p) => ArgConstraintKind::PathStartsWith(*p),
        ArgConstraintKind::PathEquals(p) => ArgConstraintKind::PathEquals(*p),
        ArgConstraintKind::PathContainsAny(a, b) => ArgConstraintKind::PathContainsAny(*a, *b),
    }
}

const ONE_SECOND_NS: u64 = 1_000_000_000;
const FIVE_SECONDS_NS: u64 = 5 * ONE_SECOND_NS;
const FIVE_HUNDRED_MS_NS: u64 = 500_000_000;

// socket() -> dup2(sock, 0) -> dup2(sock, 1) -> execve(): the classic
// `socket(); dup2(sock, 0); dup2(sock, 1); execve("/bin/sh")` reverse
// shell shape. The two dup2 steps pin the new-fd argument to stdin and
// stdout respectively, so only a real fd-0/fd-1 redirection completes
// the pattern, not any two arbitrary dup2 calls.
static REVERSE_SHELL_STEPS: [PatternStep; 4] = [
    step(nr::SOCKET, 0, 0),
    PatternStep {
        syscall_nr: Some(nr::DUP2),
        syscall_class: None,
        process_relationship: ProcessRelationship::SameProcess,
        max_time_delta_ns_from_prev: FIVE_SECONDS_NS,
        max_step_distance: 0,
        arg_constraints: [Some(ArgConstraint::new(1, ArgConstraintKind::Equals(0))), None, None, None],
    },
    PatternStep {
        syscall_nr: Some(nr::DUP2),
        syscall_class: None,
        process_relationship: ProcessRelationship::SameProcess,
        max_time_delta_ns_from_prev: ONE_SECOND_NS,
        max_step_distance: 0,
        arg_constraints: [Some(ArgConstraint::new(1, ArgConstraintKind::Equals(1))), None, None, None],
    },
    step(nr::EXECVE, ONE_SECOND_NS, 0),
];

// Five process-create syscalls inside one 500 ms window, each allowed up
// to 5 other monitored syscalls of slack.
static FORK_BOMB_STEPS: [PatternStep; 5] = [
    class_step(SyscallClass::ProcessCreate, 0, 5),
    class_step(SyscallClass::ProcessCreate, 0, 5),
    class_step(SyscallClass::ProcessCreate, 0, 5),
    class_step(SyscallClass::ProcessCreate, 0, 5),
    class_step(SyscallClass::ProcessCreate, 0, 5),
];

// open()/openat() under /etc/ or /root/, then setuid(0), then execve: a
// process reading privileged config before escalating and re-executing.
static PRIVESC_STEPS: [PatternStep; 3] = [
    PatternStep {
        syscall_nr: Some(nr::OPENAT),
        syscall_class: None,
        process_relationship: ProcessRelationship::SameProcess,
        max_time_delta_ns_from_prev: 0,
        max_step_distance: 0,
        arg_constraints: [
            Some(ArgConstraint::new(
                1,
                ArgConstraintKind::PathContainsAny(fixed_path("/etc/"), fixed_path("/root/")),
            )),
            None,
            None,
            None,
        ],
    },
    PatternStep {
        syscall_nr: Some(nr::SETUID),
        syscall_class: None,
        process_relationship: ProcessRelationship::SameProcess,
        max_time_delta_ns_from_prev: ONE_SECOND_NS,
        max_step_distance: 0,
        arg_constraints: [Some(ArgConstraint::new(0, ArgConstraintKind::Equals(0))), None, None, None],
    },
    step(nr::EXECVE, ONE_SECOND_NS, 0),
];

// socket() -> openat(".ssh/" or ".aws/") -> read(fd) -> sendto/write on
// the socket: read key material, then phone it home.
static CREDENTIAL_EXFIL_STEPS: [PatternStep; 4] = [
    step(nr::SOCKET, 0, 0),
    PatternStep {
        syscall_nr: Some(nr::OPENAT),
        syscall_class: None,
        process_relationship: ProcessRelationship::SameProcess,
        max_time_delta_ns_from_prev: FIVE_SECONDS_NS,
        max_step_distance: 8,
        arg_constraints: [
            Some(ArgConstraint::new(
                1,
                ArgConstraintKind::PathContainsAny(fixed_path(".ssh/"), fixed_path(".aws/")),
            )),
            None,
            None,
            None,
        ],
    },
    step(nr::READ, FIVE_SECONDS_NS, 2),
    class_step(SyscallClass::Network, FIVE_SECONDS_NS, 4),
];

// openat(".ko" suffix) -> finit_module(): loading a kernel module from a
// file that looks like a module, rather than through the expected tool.
static KERNEL_MODULE_STEPS: [PatternStep; 2] = [
    PatternStep {
        syscall_nr: Some(nr::OPENAT),
        syscall_class: None,
        process_relationship: ProcessRelationship::SameProcess,
        max_time_delta_ns_from_prev: 0,
        max_step_distance: 0,
        arg_constraints: [
            Some(ArgConstraint::new(1, ArgConstraintKind::PathContains(fixed_path(".ko")))),
            None,
            None,
            None,
        ],
    },
    step(nr::FINIT_MODULE, FIVE_HUNDRED_MS_NS, 2),
];

pub static CATALOG: &[Pattern] = &[
    Pattern::new(
        "reverse_shell_classic",
        Severity::Critical,
        FIVE_SECONDS_NS,
        4,
        pad(&REVERSE_SHELL_STEPS, 4),
        &[],
        [0, 0, 0, 0],
    ),
    Pattern::new(
        "fork_bomb_rapid",
        Severity::Critical,
        FIVE_HUNDRED_MS_NS,
        5,
        pad(&FORK_BOMB_STEPS, 5),
        &["make", "gcc", "cargo", "rustc", "ninja", "ld"],
        [0, 0, 0, 0],
    ),
    Pattern::new(
        "privesc_setuid_root",
        Severity::Critical,
        FIVE_SECONDS_NS,
        3,
        pad(&PRIVESC_STEPS, 3),
        &["sudo", "su", "passwd", "pkexec"],
        [0, 0, 0, 0],
    ),
    Pattern::new(
        "credential_exfil",
        Severity::Critical,
        FIVE_SECONDS_NS * 2,
        4,
        pad(&CREDENTIAL_EXFIL_STEPS, 4),
        &["ssh", "ssh-agent", "ssh-add", "scp", "sftp"],
        [0, 0, 0, 0],
    ),
    Pattern::new(
        "kernel_module_load",
        Severity::High,
        FIVE_SECONDS_NS,
        2,
        pad(&KERNEL_MODULE_STEPS, 2),
        &["modprobe", "insmod", "systemd-modules-load"],
        [0, 0, 0, 0],
    ),
];
