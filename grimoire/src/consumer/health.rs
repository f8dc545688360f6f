//! The health surface the CLI's status flag and any external monitor read.

use serde::Serialize;

use crate::engine::EngineStats;

/// Counters the consumer loop derives from the [`VerdictOutcome`] it gets
/// back for every match, never from raw match completion: a match the
/// whitelist suppresses must never be visible here.
///
/// [`VerdictOutcome`]: crate::verdict::VerdictOutcome
#[derive(Clone, Debug, Default)]
pub struct VerdictCounters {
    pub matches_total: u64,
    pub matches_by_severity: [u64; 5],
    pub terminations: u64,
    pub terminations_failed: u64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct HealthSnapshot {
    pub seen: u64,
    pub filter_passed: u64,
    pub emitted: u64,
    pub dropped: u64,
    pub active_processes: usize,
    pub active_match_states: usize,
    pub matches_total: u64,
    pub matches_by_severity: [u64; 5],
    pub terminations: u64,
    pub terminations_failed: u64,
    pub evictions: u64,
    pub log_write_fail: u64,
}

impl HealthSnapshot {
    pub fn new(
        kernel_counters: [u64; 4],
        active_processes: usize,
        active_match_states: usize,
        engine_stats: &EngineStats,
        verdict_counters: &VerdictCounters,
        log_write_fail: u64,
    ) -> Self {
        HealthSnapshot {
            seen: kernel_counters[0],
            filter_passed: kernel_counters[1],
            emitted: kernel_counters[2],
            dropped: kernel_counters[3],
            active_processes,
            active_match_states,
            matches_total: verdict_counters.matches_total,
            matches_by_severity: verdict_counters.matches_by_severity,
            terminations: verdict_counters.terminations,
            terminations_failed: verdict_counters.terminations_failed,
            evictions: engine_stats.evictions,
            log_write_fail,
        }
    }
}
