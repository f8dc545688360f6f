//! Polls the oracle's ring buffer, drives the engine, and forwards
//! completed matches to the verdict pipeline.

mod health;

pub use health::HealthSnapshot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aya::maps::{MapData, RingBuf};
use tokio::io::unix::AsyncFd;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::engine::{Engine, PathResolver};
use crate::error::{OracleError, VerdictError};
use crate::oracle::{self, Oracle};
use crate::verdict::{resolve_binary_hash, resolve_binary_name, resolve_parent_pid, VerdictOutcome, VerdictPipeline};
use health::VerdictCounters;

/// Reads a NUL-terminated user-space string out of `host_pid`'s address
/// space via `/proc/<pid>/mem`, bounded to [`Self::MAX_LEN`] bytes.
/// Resolution failure (process exited, unmapped page, permission denied)
/// yields `None`, never a panic.
pub struct ProcMemPathResolver;

impl ProcMemPathResolver {
    const MAX_LEN: usize = 256;
}

impl PathResolver for ProcMemPathResolver {
    fn read_path(&mut self, host_pid: u32, pointer: u64) -> Option<Vec<u8>> {
        use std::io::{Read, Seek, SeekFrom};
        if pointer == 0 {
            return None;
        }
        let mut file = std::fs::File::open(format!("/proc/{host_pid}/mem")).ok()?;
        file.seek(SeekFrom::Start(pointer)).ok()?;
        let mut buf = vec![0u8; Self::MAX_LEN];
        let mut read_total = 0;
        // `/proc/<pid>/mem` reads can come back short across page
        // boundaries; read byte-by-byte after the first chunk so a NUL
        // close to the end of a mapped page is still found.
        let n = file.read(&mut buf).unwrap_or(0);
        read_total += n;
        if let Some(end) = buf[..read_total].iter().position(|&b| b == 0) {
            buf.truncate(end);
            return Some(buf);
        }
        buf.truncate(read_total);
        if read_total == 0 {
            None
        } else {
            Some(buf)
        }
    }
}

/// Wires the oracle, engine, and verdict pipeline into the single poll
/// loop: single-threaded, bounded-timeout polling, best-effort per-event
/// handling with counters.
pub struct ConsumerLoop {
    oracle: Oracle,
    engine: Engine,
    verdict: VerdictPipeline,
    config: Config,
    resolver: ProcMemPathResolver,
    /// Counters derived from each match's [`VerdictOutcome`], owned here
    /// rather than by the engine, since only the verdict pipeline knows
    /// whether a match was whitelisted away.
    verdict_counters: VerdictCounters,
    /// When set, `run` logs a [`HealthSnapshot`] on this cadence in
    /// addition to returning one on request (not an IPC/dashboard
    /// surface — just the same counters, logged periodically).
    health_report: Option<(Duration, bool)>,
}

impl ConsumerLoop {
    pub fn new(oracle: Oracle, config: Config) -> Self {
        let engine = Engine::new(config.process_table_cap);
        ConsumerLoop {
            oracle,
            engine,
            verdict: VerdictPipeline::new(),
            config,
            resolver: ProcMemPathResolver,
            verdict_counters: VerdictCounters::default(),
            health_report: None,
        }
    }

    /// Enables periodic health logging inside `run` (`json` selects the
    /// rendering).
    pub fn with_health_reporting(mut self, interval: Duration, json: bool) -> Self {
        self.health_report = Some((interval, json));
        self
    }

    pub fn health(&self) -> Result<HealthSnapshot, OracleError> {
        let counters = self.oracle.read_counters()?;
        Ok(HealthSnapshot::new(
            counters,
            self.engine.active_processes(),
            self.engine.active_match_states(),
            self.engine.stats(),
            &self.verdict_counters,
            self.verdict.log_write_fail(),
        ))
    }

    /// Runs until `shutdown` is set, then drains the ring buffer with a
    /// short deadline (250 ms) and returns.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<(), OracleError> {
        let ring_buf = self.oracle.take_ring_buffer()?;
        let mut poll = AsyncFd::new(ring_buf).map_err(OracleError::Io)?;
        let poll_timeout = Duration::from_millis(self.config.poll_timeout_ms);
        let mut health_interval = self.health_report.as_ref().map(|(interval, _)| tokio::time::interval(*interval));

        while !shutdown.load(Ordering::Relaxed) {
            let tick = async {
                match health_interval.as_mut() {
                    Some(interval) => interval.tick().await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                result = tokio::time::timeout(poll_timeout, poll.readable_mut()) => match result {
                    Ok(Ok(mut guard)) => {
                        self.drain(guard.get_inner_mut());
                        guard.clear_ready();
                    }
                    Ok(Err(e)) => return Err(OracleError::Io(e)),
                    Err(_elapsed) => {}
                },
                _ = tick => self.log_health(),
            }
        }

        info!("shutdown requested; draining ring buffer");
        let drain_deadline = Duration::from_millis(250);
        let _ = tokio::time::timeout(drain_deadline, async {
            if let Ok(mut guard) = poll.readable_mut().await {
                self.drain(guard.get_inner_mut());
                guard.clear_ready();
            }
        })
        .await;
        self.drain(poll.get_mut());
        Ok(())
    }

    fn drain(&mut self, ring_buf: &mut RingBuf<MapData>) {
        while let Some(item) = ring_buf.next() {
            let Some(event) = oracle::parse_event(&item) else {
                debug!("dropped a short ring buffer record");
                continue;
            };
            let Some(result) = self.engine.process_event(&event, &mut self.resolver) else {
                continue;
            };

            let host_pid = result.host_pid;
            let (binary_name, binary_hash) = self.resolve_binary(host_pid);
            self.resolve_parent(host_pid);
            match self.verdict.emit(&result, &binary_name, binary_hash, &self.config, wall_time_now) {
                Ok(VerdictOutcome::Suppressed(_)) => {}
                Ok(VerdictOutcome::Logged) => {
                    self.verdict_counters.matches_total += 1;
                    self.verdict_counters.matches_by_severity[result.pattern().severity as usize] += 1;
                }
                Ok(VerdictOutcome::Terminated) => {
                    self.verdict_counters.matches_total += 1;
                    self.verdict_counters.matches_by_severity[result.pattern().severity as usize] += 1;
                    self.verdict_counters.terminations += 1;
                }
                Ok(VerdictOutcome::TerminateFailed { .. }) => {
                    self.verdict_counters.matches_total += 1;
                    self.verdict_counters.matches_by_severity[result.pattern().severity as usize] += 1;
                    self.verdict_counters.terminations_failed += 1;
                }
                Err(e) => self.report_verdict_error(e),
            }
        }
    }

    fn resolve_binary(&mut self, host_pid: u32) -> (String, Option<u64>) {
        if let Some(process) = self.engine.process_state_mut(host_pid) {
            if let Some(name) = &process.binary_name {
                return (name.clone(), resolve_binary_hash(host_pid));
            }
            let name = resolve_binary_name(host_pid);
            process.binary_name = Some(name.clone());
            return (name, resolve_binary_hash(host_pid));
        }
        (resolve_binary_name(host_pid), resolve_binary_hash(host_pid))
    }

    /// Snapshots `host_pid`'s parent PID the first time it's observed,
    /// caching it on `ProcessState` the same way `resolve_binary` caches
    /// the binary name. Keeps `/proc` reads out of the engine.
    fn resolve_parent(&mut self, host_pid: u32) {
        if let Some(process) = self.engine.process_state_mut(host_pid) {
            if process.parent_pid.is_none() {
                process.parent_pid = resolve_parent_pid(host_pid);
            }
        }
    }

    fn report_verdict_error(&self, error: VerdictError) {
        error!(%error, "verdict emission failed");
    }

    fn log_health(&self) {
        let json = matches!(self.health_report, Some((_, true)));
        match self.health() {
            Ok(snapshot) if json => match serde_json::to_string(&snapshot) {
                Ok(line) => println!("{line}"),
                Err(e) => error!(error = %e, "failed to serialize health snapshot"),
            },
            Ok(snapshot) => info!(?snapshot, "health"),
            Err(e) => error!(error = %e, "failed to read health counters"),
        }
    }
}

fn wall_time_now() -> String {
    chrono::Utc::now().to_rfc3339()
}
