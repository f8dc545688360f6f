//! The engine's process table: one [`ProcessState`] per observed host PID,
//! capped and LRU-evicted.

use std::collections::HashMap;

use crate::catalog::MAX_PATTERNS;

use super::match_state::{MatchState, StepRecord};

/// Per-host-PID bookkeeping the engine needs to evaluate pattern steps.
/// `match_states` is a dense array indexed by `pattern_index`, sized to
/// the catalog's upper bound so advancing a state never allocates.
pub struct ProcessState {
    pub host_pid: u32,
    pub pid_ns_inum: u64,
    /// Resolved lazily by the consumer loop and cached here so a
    /// process is only looked up in `/proc` once.
    pub binary_name: Option<String>,
    /// The parent PID at first observation, snapshotted once (like
    /// `binary_name`) rather than re-read on every event: a process
    /// that reparents mid-sequence keeps the identity it started with.
    pub parent_pid: Option<u32>,
    pub syscall_counter: u64,
    pub created_at_ns: u64,
    pub last_seen_ns: u64,
    pub match_states: [Option<MatchState>; MAX_PATTERNS],
}

impl ProcessState {
    fn new(host_pid: u32, pid_ns_inum: u64, now_ns: u64) -> Self {
        ProcessState {
            host_pid,
            pid_ns_inum,
            binary_name: None,
            parent_pid: None,
            syscall_counter: 0,
            created_at_ns: now_ns,
            last_seen_ns: now_ns,
            match_states: [const { None }; MAX_PATTERNS],
        }
    }

    pub fn has_active_match_states(&self) -> bool {
        self.match_states.iter().any(Option::is_some)
    }
}

/// Owns every [`ProcessState`] the engine knows about. Capped; on
/// overflow the entry with the oldest `last_seen_ns` is evicted,
/// discarding its match states.
pub struct ProcessTable {
    cap: usize,
    entries: HashMap<u32, ProcessState>,
    evictions: u64,
}

impl ProcessTable {
    pub fn new(cap: usize) -> Self {
        ProcessTable {
            cap: cap.max(1),
            entries: HashMap::new(),
            evictions: 0,
        }
    }

    /// Returns the state for `host_pid`, creating it (evicting the LRU
    /// entry first if at capacity) when absent.
    pub fn get_or_create(&mut self, host_pid: u32, pid_ns_inum: u64, now_ns: u64) -> &mut ProcessState {
        if !self.entries.contains_key(&host_pid) && self.entries.len() >= self.cap {
            self.evict_lru();
        }
        self.entries
            .entry(host_pid)
            .or_insert_with(|| ProcessState::new(host_pid, pid_ns_inum, now_ns))
    }

    pub fn get(&self, host_pid: u32) -> Option<&ProcessState> {
        self.entries.get(&host_pid)
    }

    pub fn get_mut(&mut self, host_pid: u32) -> Option<&mut ProcessState> {
        self.entries.get_mut(&host_pid)
    }

    fn evict_lru(&mut self) {
        if let Some(&oldest) = self
            .entries
            .values()
            .min_by_key(|p| p.last_seen_ns)
            .map(|p| &p.host_pid)
        {
            self.entries.remove(&oldest);
            self.evictions += 1;
        }
    }

    /// Removes every process whose `last_seen_ns` is older than `ttl_ns`
    /// and that has no in-flight match state.
    pub fn remove_expired(&mut self, now_ns: u64, ttl_ns: u64) {
        self.entries
            .retain(|_, p| !(now_ns.saturating_sub(p.last_seen_ns) > ttl_ns && !p.has_active_match_states()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn active_match_state_count(&self) -> usize {
        self.entries
            .values()
            .map(|p| p.match_states.iter().filter(|s| s.is_some()).count())
            .sum()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn creates_and_reuses_the_same_entry() {
        let mut table = ProcessTable::new(4);
        table.get_or_create(1, 0, 0).syscall_counter = 5;
        assert_eq!(table.get(1).unwrap().syscall_counter, 5);
    }

    #[test]
    fn evicts_oldest_when_at_capacity() {
        let mut table = ProcessTable::new(2);
        table.get_or_create(1, 0, 0);
        table.get_or_create(2, 0, 10);
        table.get_or_create(3, 0, 20);
        assert_eq!(table.len(), 2);
        assert!(table.get(1).is_none());
        assert_eq!(table.evictions(), 1);
    }

    #[test]
    fn expiry_preserves_entries_with_active_match_states() {
        let mut table = ProcessTable::new(4);
        let state = table.get_or_create(1, 0, 0);
        state.last_seen_ns = 0;
        state.match_states[0] = Some(MatchState::start(
            StepRecord {
                syscall_nr: 0,
                timestamp_ns: 0,
                args: [0; 6],
            },
            0,
        ));
        table.remove_expired(1_000_000_000, 100);
        assert!(table.get(1).is_some());
    }
}
