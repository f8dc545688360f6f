//! Converts a [`MatchResult`] into a forensic JSON record and, if
//! configured, an enforcement action.

mod alert;
mod procmeta;
mod whitelist;

pub use alert::Alert;
pub use procmeta::{resolve_binary_hash, resolve_binary_name, resolve_parent_pid};

use std::fs::OpenOptions;
use std::io::Write;

use tracing::warn;

use crate::config::Config;
use crate::engine::MatchResult;
use crate::error::VerdictError;
use crate::ffi::syscall;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuppressReason {
    Whitelist,
    BelowLogThreshold,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerdictOutcome {
    Suppressed(SuppressReason),
    Logged,
    Terminated,
    TerminateFailed { errno: i32 },
}

/// Resolves process metadata, applies whitelists and thresholds, and
/// writes the forensic record. Owns nothing but its log handle and a
/// failure counter; the engine and process table stay with [`Engine`].
///
/// [`Engine`]: crate::engine::Engine
pub struct VerdictPipeline {
    log_write_fail: u64,
}

impl VerdictPipeline {
    pub fn new() -> Self {
        VerdictPipeline { log_write_fail: 0 }
    }

    pub fn log_write_fail(&self) -> u64 {
        self.log_write_fail
    }

    /// Resolves binary metadata for `result`, applies whitelists and
    /// severity thresholds, writes the alert, and enforces if
    /// configured. `binary_name`/`binary_hash` are supplied by the
    /// caller (the consumer loop, which caches them on `ProcessState`)
    /// so this pipeline never itself decides when to re-resolve them.
    pub fn emit(
        &mut self,
        result: &MatchResult,
        binary_name: &str,
        binary_hash: Option<u64>,
        config: &Config,
        wall_time: impl FnOnce() -> String,
    ) -> Result<VerdictOutcome, VerdictError> {
        let pattern = result.pattern();

        if whitelist::is_whitelisted(pattern, binary_name, binary_hash, &config.process_whitelist) {
            return Ok(VerdictOutcome::Suppressed(SuppressReason::Whitelist));
        }
        if pattern.severity < config.min_log_severity {
            return Ok(VerdictOutcome::Suppressed(SuppressReason::BelowLogThreshold));
        }

        let should_enforce = config.enforce && pattern.severity >= config.min_enforce_severity && result.host_pid != 0;
        let (action, errno) = if should_enforce {
            match syscall::kill(result.host_pid) {
                Ok(()) => ("terminated", None),
                Err(e) => ("terminate_failed", e.raw_os_error()),
            }
        } else {
            ("logged", None)
        };

        let alert = Alert::from_match(result, binary_name.to_string(), action, errno, wall_time());
        let line = alert.to_line().map_err(VerdictError::Serialize)?;
        self.append_line(&config.log_path, &line)?;

        Ok(match action {
            "terminated" => VerdictOutcome::Terminated,
            "terminate_failed" => VerdictOutcome::TerminateFailed { errno: errno.unwrap_or(0) },
            _ => VerdictOutcome::Logged,
        })
    }

    /// Appends one complete line to the log file, retrying once on
    /// failure before counting it and moving on.
    fn append_line(&mut self, path: &std::path::Path, line: &str) -> Result<(), VerdictError> {
        for attempt in 0..2 {
            let result = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut f| writeln!(f, "{line}"));
            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempt == 0 => {
                    warn!(error = %e, "alert log write failed, retrying once");
                }
                Err(e) => {
                    self.log_write_fail += 1;
                    return Err(VerdictError::Write {
                        path: path.display().to_string(),
                        source: e,
                    });
                }
            }
        }
        unreachable!()
    }
}

impl Default for VerdictPipeline {
    fn default() -> Self {
        Self::new()
    }
}
