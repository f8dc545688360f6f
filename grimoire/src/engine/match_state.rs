//! Per-`(host_pid, pattern_index)` progress through a pattern's steps.

use arrayvec::ArrayVec;

use crate::catalog::{Pattern, CATALOG, MAX_STEPS};

/// One matched step, kept so a completed [`MatchResult`] can carry the
/// evidence trace into the alert.
#[derive(Clone, Copy, Debug)]
pub struct StepRecord {
    pub syscall_nr: u32,
    pub timestamp_ns: u64,
    pub args: [u64; 6],
}

/// Progress of one pattern against one process. Exists only while an
/// in-flight sequence is within its timing and distance budgets.
#[derive(Clone, Debug)]
pub struct MatchState {
    /// `0` means step 0 has not yet matched; after matching step `k` this
    /// is `k + 1`.
    pub current_step: u8,
    pub sequence_start_ns: u64,
    pub last_step_ns: u64,
    pub last_step_syscall_counter: u64,
    pub trace: ArrayVec<StepRecord, MAX_STEPS>,
}

impl MatchState {
    /// Starts a state at step 0 having just matched `record`.
    pub fn start(record: StepRecord, syscall_counter: u64) -> Self {
        let mut trace = ArrayVec::new();
        let _ = trace.try_push(record);
        MatchState {
            current_step: 1,
            sequence_start_ns: record.timestamp_ns,
            last_step_ns: record.timestamp_ns,
            last_step_syscall_counter: syscall_counter,
            trace,
        }
    }

    pub fn is_expired(&self, pattern: &Pattern, now_ns: u64) -> bool {
        self.sequence_start_ns + pattern.max_sequence_window_ns < now_ns
    }
}

/// An immutable snapshot of a completed pattern match. References the
/// catalog by index, never by clone.
#[derive(Clone, Debug)]
pub struct MatchResult {
    pub pattern_index: usize,
    pub host_pid: u32,
    pub pid_ns_inum: u64,
    pub matched_at_ns: u64,
    pub steps: ArrayVec<StepRecord, MAX_STEPS>,
}

impl MatchResult {
    pub fn pattern(&self) -> &'static Pattern {
        &CATALOG[self.pattern_index]
    }
}
