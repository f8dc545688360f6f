//! The JSON alert record written to the append-only alert log.

use serde::Serialize;

use crate::engine::MatchResult;

#[derive(Serialize)]
pub struct AlertStep {
    pub syscall_nr: u32,
    pub timestamp_ns: u64,
    pub args: [u64; 6],
}

/// One line of the append-only alert log. Field order is fixed so a
/// downstream parser keyed on position (rather than key name) still
/// works across versions.
#[derive(Serialize, Clone)]
pub struct Alert {
    pub timestamp_ns: u64,
    pub wall_time: String,
    pub pattern_id: String,
    pub pattern_name: String,
    pub severity: &'static str,
    pub host_pid: u32,
    pub pid_ns_inum: u64,
    pub binary: String,
    pub action: &'static str,
    pub errno: Option<i32>,
    pub steps: Vec<AlertStep>,
}

impl Alert {
    pub fn from_match(result: &MatchResult, binary: String, action: &'static str, errno: Option<i32>, wall_time: String) -> Self {
        let pattern = result.pattern();
        Alert {
            timestamp_ns: result.matched_at_ns,
            wall_time,
            pattern_id: format!("0x{:016x}", pattern.id_hash),
            pattern_name: pattern.name.to_string(),
            severity: pattern.severity.as_str(),
            host_pid: result.host_pid,
            pid_ns_inum: result.pid_ns_inum,
            binary,
            action,
            errno,
            steps: result
                .steps
                .iter()
                .map(|s| AlertStep {
                    syscall_nr: s.syscall_nr,
                    timestamp_ns: s.timestamp_ns,
                    args: s.args,
                })
                .collect(),
        }
    }

    /// Serializes to a single line, truncating `pattern_name` if the
    /// whole record would exceed the `PIPE_BUF`-bounded line budget.
    /// Never truncates the numeric `host_pid` or `severity` fields.
    pub fn to_line(&self) -> serde_json::Result<String> {
        const MAX_LINE_BYTES: usize = 4096;
        let line = serde_json::to_string(self)?;
        if line.len() <= MAX_LINE_BYTES {
            return Ok(line);
        }
        let overflow = line.len() - MAX_LINE_BYTES;
        let keep = self.pattern_name.len().saturating_sub(overflow + 3);
        let mut truncated = self.clone();
        truncated.pattern_name = self.pattern_name.chars().take(keep).collect();
        serde_json::to_string(&truncated)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use arrayvec::ArrayVec;

    fn sample_result() -> MatchResult {
        let mut steps = ArrayVec::new();
        let _ = steps.try_push(crate::engine::StepRecord {
            syscall_nr: 41,
            timestamp_ns: 0,
            args: [2, 1, 0, 0, 0, 0],
        });
        MatchResult {
            pattern_index: 0,
            host_pid: 1001,
            pid_ns_inum: 1,
            matched_at_ns: 0,
            steps,
        }
    }

    #[test]
    fn serializes_pattern_id_as_fixed_width_hex() {
        let alert = Alert::from_match(&sample_result(), "nc".to_string(), "logged", None, "2026-01-01T00:00:00Z".to_string());
        assert_eq!(alert.pattern_id.len(), 18);
        assert!(alert.pattern_id.starts_with("0x"));
    }

    #[test]
    fn same_match_result_serializes_byte_identically() {
        let result = sample_result();
        let a = Alert::from_match(&result, "nc".to_string(), "logged", None, "2026-01-01T00:00:00Z".to_string());
        let b = Alert::from_match(&result, "nc".to_string(), "logged", None, "2026-01-01T00:00:00Z".to_string());
        assert_eq!(a.to_line().unwrap(), b.to_line().unwrap());
    }
}
