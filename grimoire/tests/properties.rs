//! Property-based tests for the two quantified invariants an example
//! stream can only demonstrate, not prove: counters never go backwards,
//! and a pattern never completes on an argument shape its constraints
//! were written to reject.

use proptest::prelude::*;

use grimoire::engine::{Engine, NoPathResolver};
use grimoire_common::class::nr;
use grimoire_common::SyscallEvent;

fn event(syscall_nr: u32, host_pid: u32, timestamp_ns: u64, args: [u64; 6]) -> SyscallEvent {
    SyscallEvent {
        syscall_nr,
        host_pid,
        pid_ns_inum: 7,
        timestamp_ns,
        args,
    }
}

proptest! {
    /// `Engine::stats().evictions` only ever grows: no sequence of events,
    /// however it overruns the process table's capacity, can make the
    /// eviction count drop between two calls.
    #[test]
    fn evictions_never_decrease(
        host_pids in prop::collection::vec(1u32..40, 1..200),
        spacing_ns in prop::collection::vec(0u64..50_000_000, 1..200),
    ) {
        let mut engine = Engine::new(8);
        let mut resolver = NoPathResolver;
        let mut now = 0u64;
        let mut last_evictions = 0u64;

        let len = host_pids.len().min(spacing_ns.len());
        for i in 0..len {
            now += spacing_ns[i];
            let e = event(nr::READ, host_pids[i], now, [0; 6]);
            engine.process_event(&e, &mut resolver);
            let evictions = engine.stats().evictions;
            prop_assert!(evictions >= last_evictions);
            last_evictions = evictions;
        }
    }

    /// `reverse_shell_classic` requires `dup2(sock, 0)` followed by
    /// `dup2(sock, 1)`: no pair of arbitrary-fd `dup2` calls between a
    /// `socket` and an `execve` may complete it.
    #[test]
    fn reverse_shell_requires_stdin_stdout_redirection(fd_a in 0u64..8, fd_b in 0u64..8) {
        let mut engine = Engine::new(8);
        let mut resolver = NoPathResolver;
        let stream = [
            event(nr::SOCKET, 9001, 0, [2, 1, 0, 0, 0, 0]),
            event(nr::DUP2, 9001, 1_000_000, [3, fd_a, 0, 0, 0, 0]),
            event(nr::DUP2, 9001, 2_000_000, [3, fd_b, 0, 0, 0, 0]),
            event(nr::EXECVE, 9001, 3_000_000, [0; 6]),
        ];

        let mut matched_reverse_shell = false;
        for e in &stream {
            if let Some(result) = engine.process_event(e, &mut resolver) {
                if result.pattern().name == "reverse_shell_classic" {
                    matched_reverse_shell = true;
                }
            }
        }

        prop_assert_eq!(matched_reverse_shell, fd_a == 0 && fd_b == 1);
    }
}
