//! End-to-end scenarios driving [`Engine`] and [`VerdictPipeline`]
//! together against synthetic syscall streams, with no kernel
//! involvement.

use grimoire::catalog::CATALOG;
use grimoire::config::Config;
use grimoire::engine::{Engine, NoPathResolver, PathResolver};
use grimoire::verdict::{SuppressReason, VerdictOutcome, VerdictPipeline};
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

fn wall_time() -> String {
    "2026-08-01T00:00:00Z".to_string()
}

fn test_config(log_path: &std::path::Path) -> Config {
    let mut config = Config::default_config();
    config.log_path = log_path.to_path_buf();
    config
}

fn read_alert_lines(path: &std::path::Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Scenario 1: reverse shell match in shadow mode produces exactly one
/// logged alert with four steps, no enforcement.
#[test]
fn scenario_reverse_shell_shadow_mode() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("alerts.jsonl");
    let config = test_config(&log_path);

    let mut engine = Engine::new(16);
    let mut verdict = VerdictPipeline::new();
    let mut resolver = NoPathResolver;

    let stream = [
        event(nr::SOCKET, 1001, 0, [2, 1, 0, 0, 0, 0]),
        event(nr::DUP2, 1001, 1_000_000, [3, 0, 0, 0, 0, 0]),
        event(nr::DUP2, 1001, 2_000_000, [3, 1, 0, 0, 0, 0]),
        event(nr::EXECVE, 1001, 3_000_000, [0; 6]),
    ];

    let mut outcome = None;
    for e in &stream {
        if let Some(result) = engine.process_event(e, &mut resolver) {
            outcome = Some(verdict.emit(&result, "nc", None, &config, wall_time).unwrap());
        }
    }

    assert_eq!(outcome, Some(VerdictOutcome::Logged));
    let lines = read_alert_lines(&log_path);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["pattern_name"], "reverse_shell_classic");
    assert_eq!(lines[0]["severity"], "critical");
    assert_eq!(lines[0]["action"], "logged");
    assert_eq!(lines[0]["steps"].as_array().unwrap().len(), 4);
}

/// Scenario 2: same stream with enforcement on and a binary not in any
/// whitelist. The sandbox this test runs in will not actually have a
/// process at this PID, so `kill` degrades to ESRCH — exercising the
/// `terminate_failed` path the spec calls out explicitly.
#[test]
fn scenario_reverse_shell_enforcement_whitelist_miss() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("alerts.jsonl");
    let mut config = test_config(&log_path);
    config.enforce = true;

    let mut engine = Engine::new(16);
    let mut verdict = VerdictPipeline::new();
    let mut resolver = NoPathResolver;

    // A PID vanishingly unlikely to be a real process in the test sandbox.
    const UNUSED_PID: u32 = 0x7fff_fffe;
    let stream = [
        event(nr::SOCKET, UNUSED_PID, 0, [2, 1, 0, 0, 0, 0]),
        event(nr::DUP2, UNUSED_PID, 1_000_000, [3, 0, 0, 0, 0, 0]),
        event(nr::DUP2, UNUSED_PID, 2_000_000, [3, 1, 0, 0, 0, 0]),
        event(nr::EXECVE, UNUSED_PID, 3_000_000, [0; 6]),
    ];

    let mut outcome = None;
    for e in &stream {
        if let Some(result) = engine.process_event(e, &mut resolver) {
            outcome = Some(verdict.emit(&result, "nc", None, &config, wall_time).unwrap());
        }
    }

    match outcome {
        Some(VerdictOutcome::Terminated) => {
            let lines = read_alert_lines(&log_path);
            assert_eq!(lines[0]["action"], "terminated");
        }
        Some(VerdictOutcome::TerminateFailed { errno }) => {
            let lines = read_alert_lines(&log_path);
            assert_eq!(lines[0]["action"], "terminate_failed");
            assert_eq!(lines[0]["errno"], errno);
        }
        other => panic!("expected a termination outcome, got {other:?}"),
    }
}

/// Scenario 3: same stream, binary in the pattern whitelist. No JSON
/// line is written: the whitelist check happens before the alert is
/// ever built, not after.
#[test]
fn scenario_reverse_shell_whitelist_hit() {
    let pattern = CATALOG.iter().find(|p| p.name == "reverse_shell_classic").unwrap();
    assert!(!pattern.is_whitelisted_process("ssh"));
    // `reverse_shell_classic` carries no built-in whitelist; this
    // exercises the caller-side whitelist instead (config.process_whitelist).
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("alerts.jsonl");
    let mut config = test_config(&log_path);
    config.process_whitelist = vec!["ssh".to_string()];

    let mut engine = Engine::new(16);
    let mut verdict = VerdictPipeline::new();
    let mut resolver = NoPathResolver;

    let stream = [
        event(nr::SOCKET, 1002, 0, [2, 1, 0, 0, 0, 0]),
        event(nr::DUP2, 1002, 1_000_000, [3, 0, 0, 0, 0, 0]),
        event(nr::DUP2, 1002, 2_000_000, [3, 1, 0, 0, 0, 0]),
        event(nr::EXECVE, 1002, 3_000_000, [0; 6]),
    ];

    let mut outcome = None;
    for e in &stream {
        if let Some(result) = engine.process_event(e, &mut resolver) {
            outcome = Some(verdict.emit(&result, "ssh", None, &config, wall_time).unwrap());
        }
    }

    assert_eq!(outcome, Some(VerdictOutcome::Suppressed(SuppressReason::Whitelist)));
    assert!(!log_path.exists() || read_alert_lines(&log_path).is_empty());
}

/// Scenario 4: fork bomb threshold edge, at the engine level only (no
/// verdict pipeline needed — this is purely a timing-budget property).
#[test]
fn scenario_fork_bomb_threshold_edge() {
    let mut matching = Engine::new(16);
    let mut resolver = NoPathResolver;
    let mut matches = 0;
    for &t in &[0, 100_000_000, 200_000_000, 300_000_000, 400_000_000] {
        if matching.process_event(&event(nr::CLONE, 2002, t, [0; 6]), &mut resolver).is_some() {
            matches += 1;
        }
    }
    assert_eq!(matches, 1);

    let mut at_edge = Engine::new(16);
    let mut matches = 0;
    for &t in &[0, 110_000_000, 220_000_000, 330_000_000, 440_000_000, 550_000_000] {
        if at_edge.process_event(&event(nr::CLONE, 2003, t, [0; 6]), &mut resolver).is_some() {
            matches += 1;
        }
    }
    assert_eq!(matches, 1);

    let mut too_slow = Engine::new(16);
    let mut matches = 0;
    for &t in &[0, 150_000_000, 300_000_000, 450_000_000, 600_000_000] {
        if too_slow.process_event(&event(nr::CLONE, 2004, t, [0; 6]), &mut resolver).is_some() {
            matches += 1;
        }
    }
    assert_eq!(matches, 0);
}

/// Scenario 5 (distance budget rejects interleavers), exercised against
/// `privesc_setuid_root`'s SETUID -> EXECVE step, which sets
/// `max_step_distance = 0`.
struct FixedPathResolver(&'static [u8]);

impl PathResolver for FixedPathResolver {
    fn read_path(&mut self, _host_pid: u32, _pointer: u64) -> Option<Vec<u8>> {
        Some(self.0.to_vec())
    }
}

#[test]
fn scenario_distance_budget_rejects_interleaving_syscall() {
    let mut resolver = FixedPathResolver(b"/etc/shadow");

    let mut interleaved = Engine::new(16);
    let blocked_stream = [
        event(nr::OPENAT, 3003, 0, [0, 1, 0, 0, 0, 0]),
        event(nr::SETUID, 3003, 500_000_000, [0, 0, 0, 0, 0, 0]),
        event(nr::READ, 3003, 600_000_000, [0; 6]),
        event(nr::EXECVE, 3003, 700_000_000, [0; 6]),
    ];
    let mut matches = 0;
    for e in &blocked_stream {
        if interleaved.process_event(e, &mut resolver).is_some() {
            matches += 1;
        }
    }
    assert_eq!(matches, 0);

    let mut adjacent = Engine::new(16);
    let clean_stream = [
        event(nr::OPENAT, 3004, 0, [0, 1, 0, 0, 0, 0]),
        event(nr::SETUID, 3004, 500_000_000, [0, 0, 0, 0, 0, 0]),
        event(nr::EXECVE, 3004, 900_000_000, [0; 6]),
    ];
    let mut matches = 0;
    for e in &clean_stream {
        if adjacent.process_event(e, &mut resolver).is_some() {
            matches += 1;
        }
    }
    assert_eq!(matches, 1);
}
