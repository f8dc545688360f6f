//! The pattern engine: consumes [`SyscallEvent`]s, advances per-process
//! match state, and emits [`MatchResult`]s.

mod match_state;
mod process_table;

pub use match_state::{MatchResult, MatchState, StepRecord};
pub use process_table::{ProcessState, ProcessTable};

use grimoire_common::SyscallEvent;

use crate::catalog::{PatternStep, Severity, CATALOG};

/// Engine-intrinsic health counters, surfaced by the consumer loop
/// alongside the kernel counters. Whitelist-aware counters
/// (`matches_total`, `matches_by_severity`) are not tracked here: the
/// engine never sees whether a completed match is later suppressed, so
/// that bookkeeping belongs to whatever consumes its `MatchResult`s.
#[derive(Clone, Debug, Default)]
pub struct EngineStats {
    pub evictions: u64,
    /// Incremented when a pattern step names `process_relationship`
    /// other than `same_process` — that relationship degrades to
    /// `same_process`.
    pub unsupported_relationship: u64,
}

/// A resolver for syscall argument pointers: given a raw pointer value
/// (an event arg), returns the bytes of the NUL-terminated user-space
/// string it names, or `None` on resolution failure. Supplied by the
/// consumer so the engine stays free of `/proc`/ptrace I/O.
pub trait PathResolver {
    fn read_path(&mut self, host_pid: u32, pointer: u64) -> Option<Vec<u8>>;
}

/// No-op resolver: every path constraint evaluates to `false`. Useful for
/// tests that only exercise syscall/time/distance budgets.
pub struct NoPathResolver;

impl PathResolver for NoPathResolver {
    fn read_path(&mut self, _host_pid: u32, _pointer: u64) -> Option<Vec<u8>> {
        None
    }
}

/// Owns every process's state and advances it one [`SyscallEvent`] at a
/// time. Single-threaded by contract; sharding, if wanted, is one
/// independent `Engine` per `host_pid` partition.
pub struct Engine {
    table: ProcessTable,
    ttl_ns: u64,
    stats: EngineStats,
}

impl Engine {
    pub fn new(process_table_cap: usize) -> Self {
        let largest_window = CATALOG.iter().map(|p| p.max_sequence_window_ns).max().unwrap_or(0);
        Engine {
            table: ProcessTable::new(process_table_cap),
            ttl_ns: largest_window.saturating_mul(10),
            stats: EngineStats::default(),
        }
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn active_processes(&self) -> usize {
        self.table.len()
    }

    pub fn active_match_states(&self) -> usize {
        self.table.active_match_state_count()
    }

    pub fn process_state(&self, host_pid: u32) -> Option<&ProcessState> {
        self.table.get(host_pid)
    }

    pub fn process_state_mut(&mut self, host_pid: u32) -> Option<&mut ProcessState> {
        self.table.get_mut(host_pid)
    }

    /// Advances the engine by one event, with `resolver` able to resolve
    /// argument pointers into path bytes on demand. Returns at most one
    /// completed match: the first-completed pattern wins.
    pub fn process_event(
        &mut self,
        event: &SyscallEvent,
        resolver: &mut dyn PathResolver,
    ) -> Option<MatchResult> {
        self.table.remove_expired(event.timestamp_ns, self.ttl_ns);

        let host_pid = event.host_pid;
        let process = self.table.get_or_create(host_pid, event.pid_ns_inum, event.timestamp_ns);
        process.syscall_counter += 1;
        process.last_seen_ns = event.timestamp_ns;
        let syscall_counter = process.syscall_counter;
        let pid_ns_inum = process.pid_ns_inum;

        let record = StepRecord {
            syscall_nr: event.syscall_nr,
            timestamp_ns: event.timestamp_ns,
            args: event.args,
        };

        // 1. Expire every state whose global window has elapsed.
        for (index, pattern) in CATALOG.iter().enumerate() {
            if let Some(state) = &process.match_states[index] {
                if state.is_expired(pattern, event.timestamp_ns) {
                    process.match_states[index] = None;
                }
            }
        }

        // 2. Advance existing states. At most one completion is kept;
        // on a tie the higher-severity (then smaller id_hash) pattern
        // wins, and every other pattern that completed on this same
        // event still has its state deleted unconditionally.
        let mut winner: Option<MatchResult> = None;
        for (index, pattern) in CATALOG.iter().enumerate() {
            let Some(state) = process.match_states[index].take() else {
                continue;
            };
            let k = state.current_step as usize;
            if k >= pattern.step_count as usize {
                // Should not happen: completed states are deleted below.
                continue;
            }
            let step = &pattern.steps[k];
            let advances = step_advances(step, &record, &state, pattern, event.timestamp_ns, syscall_counter, host_pid, resolver);

            if !advances {
                continue; // delete: no rewind
            }

            let mut state = state;
            state.current_step += 1;
            state.last_step_ns = event.timestamp_ns;
            state.last_step_syscall_counter = syscall_counter;
            let _ = state.trace.try_push(record);

            if state.current_step as usize == pattern.step_count as usize {
                let candidate = MatchResult {
                    pattern_index: index,
                    host_pid,
                    pid_ns_inum,
                    matched_at_ns: event.timestamp_ns,
                    steps: state.trace.clone(),
                };
                winner = Some(pick_winner(winner, candidate));
                // state deleted: leave match_states[index] as None.
            } else {
                process.match_states[index] = Some(state);
            }
        }

        // 3. Start new sequences for every pattern whose step 0 matches,
        // unless a state for that pattern is already in flight.
        for (index, pattern) in CATALOG.iter().enumerate() {
            if process.match_states[index].is_some() {
                continue;
            }
            let step = &pattern.steps[0];
            if !step.matches_syscall(event.syscall_nr) {
                continue;
            }
            if !matches!(step.process_relationship, crate::catalog::ProcessRelationship::SameProcess) {
                self.stats.unsupported_relationship += 1;
            }
            if !arg_constraints_hold(step, &record.args, host_pid, resolver) {
                continue;
            }
            if pattern.step_count == 1 {
                let mut trace = arrayvec::ArrayVec::new();
                let _ = trace.try_push(record);
                let candidate = MatchResult {
                    pattern_index: index,
                    host_pid,
                    pid_ns_inum,
                    matched_at_ns: event.timestamp_ns,
                    steps: trace,
                };
                winner = Some(pick_winner(winner, candidate));
            } else {
                process.match_states[index] = Some(MatchState::start(record, syscall_counter));
            }
        }

        self.stats.evictions = self.table.evictions();
        winner
    }
}

#[allow(clippy::too_many_arguments)]
fn step_advances(
    step: &PatternStep,
    record: &StepRecord,
    state: &MatchState,
    pattern: &crate::catalog::Pattern,
    now_ns: u64,
    syscall_counter: u64,
    host_pid: u32,
    resolver: &mut dyn PathResolver,
) -> bool {
    if !step.matches_syscall(record.syscall_nr) {
        return false;
    }
    if step.max_time_delta_ns_from_prev != 0 && now_ns.saturating_sub(state.last_step_ns) > step.max_time_delta_ns_from_prev {
        return false;
    }
    if now_ns.saturating_sub(state.sequence_start_ns) > pattern.max_sequence_window_ns {
        return false;
    }
    let distance = syscall_counter.saturating_sub(state.last_step_syscall_counter).saturating_sub(1);
    if distance > step.max_step_distance as u64 {
        return false;
    }
    arg_constraints_hold(step, &record.args, host_pid, resolver)
}

fn arg_constraints_hold(step: &PatternStep, args: &[u64; 6], host_pid: u32, resolver: &mut dyn PathResolver) -> bool {
    step.arg_constraints.iter().flatten().all(|c| {
        let mut read = |pointer: u64| resolver.read_path(host_pid, pointer);
        c.evaluate(args, &mut read)
    })
}

/// Resolves a tie between the current `winner` (if any) and `candidate`:
/// higher severity wins; on a severity tie, the smaller `id_hash` wins.
fn pick_winner(winner: Option<MatchResult>, candidate: MatchResult) -> MatchResult {
    match winner {
        None => candidate,
        Some(current) => {
            let current_pattern = current.pattern();
            let candidate_pattern = candidate.pattern();
            if candidate_pattern.severity > current_pattern.severity
                || (candidate_pattern.severity == current_pattern.severity
                    && candidate_pattern.id_hash < current_pattern.id_hash)
            {
                candidate
            } else {
                current
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use grimoire_common::class::nr;

    fn event(syscall_nr: u32, host_pid: u32, timestamp_ns: u64, args: [u64; 6]) -> SyscallEvent {
        SyscallEvent {
            syscall_nr,
            host_pid,
            pid_ns_inum: 1,
            timestamp_ns,
            args,
        }
    }

    #[test]
    fn reverse_shell_matches_within_window() {
        let mut engine = Engine::new(16);
        let mut resolver = NoPathResolver;
        let stream = [
            event(nr::SOCKET, 1001, 0, [2, 1, 0, 0, 0, 0]),
            event(nr::DUP2, 1001, 1_000_000, [3, 0, 0, 0, 0, 0]),
            event(nr::DUP2, 1001, 2_000_000, [3, 1, 0, 0, 0, 0]),
            event(nr::EXECVE, 1001, 3_000_000, [0; 6]),
        ];
        let mut result = None;
        for e in &stream {
            if let Some(r) = engine.process_event(e, &mut resolver) {
                result = Some(r);
            }
        }
        let result = result.expect("expected a match");
        assert_eq!(result.pattern().name, "reverse_shell_classic");
        assert_eq!(result.steps.len(), 4);
    }

    #[test]
    fn fork_bomb_matches_at_edge_of_window() {
        let mut engine = Engine::new(16);
        let mut resolver = NoPathResolver;
        let times = [0, 100_000_000, 200_000_000, 300_000_000, 400_000_000];
        let mut matched = false;
        for &t in &times {
            let e = event(nr::CLONE, 2002, t, [0; 6]);
            if engine.process_event(&e, &mut resolver).is_some() {
                matched = true;
            }
        }
        assert!(matched);
    }

    #[test]
    fn fork_bomb_does_not_match_when_spaced_past_window() {
        let mut engine = Engine::new(16);
        let mut resolver = NoPathResolver;
        let times = [0, 150_000_000, 300_000_000, 450_000_000, 600_000_000];
        let mut matched = false;
        for &t in &times {
            let e = event(nr::CLONE, 2002, t, [0; 6]);
            if engine.process_event(&e, &mut resolver).is_some() {
                matched = true;
            }
        }
        assert!(!matched);
    }

    #[test]
    fn whitelisted_syscall_class_members_do_not_advance_unrelated_patterns() {
        let mut engine = Engine::new(16);
        let mut resolver = NoPathResolver;
        let e = event(nr::READ, 4004, 0, [0; 6]);
        assert!(engine.process_event(&e, &mut resolver).is_none());
    }
}
