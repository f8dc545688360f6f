//! Best-effort process metadata resolution via `/proc`. Every lookup here
//! degrades gracefully: a process that has already exited yields `"?"` or
//! `None`, never an error that blocks verdict emission.

use std::fs;
use std::io::Read;

use sha2::{Digest, Sha256};

const UNKNOWN_BINARY: &str = "?";

/// Resolves the executable name for `host_pid` via `/proc/<pid>/comm`.
/// Falls back to `"?"` if the process has already exited or `/proc` is
/// unreadable.
pub fn resolve_binary_name(host_pid: u32) -> String {
    fs::read_to_string(format!("/proc/{host_pid}/comm"))
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|_| UNKNOWN_BINARY.to_string())
}

/// Hashes `/proc/<pid>/exe`'s target with SHA-256 and truncates to the
/// first 8 bytes, matching the catalog's `whitelisted_binary_hashes`
/// representation.
pub fn resolve_binary_hash(host_pid: u32) -> Option<u64> {
    let path = fs::read_link(format!("/proc/{host_pid}/exe")).ok()?;
    let mut file = fs::File::open(path).ok()?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    Some(u64::from_be_bytes(digest[..8].try_into().ok()?))
}

/// Resolves `host_pid`'s parent PID from `/proc/<pid>/stat`. Field 4 of
/// that file (after the parenthesized comm field, which may itself
/// contain spaces and parentheses) is the parent PID.
pub fn resolve_parent_pid(host_pid: u32) -> Option<u32> {
    let stat = fs::read_to_string(format!("/proc/{host_pid}/stat")).ok()?;
    let after_comm = stat.rfind(')')? + 1;
    stat[after_comm..].split_whitespace().nth(1)?.parse().ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolve_binary_name_degrades_on_missing_process() {
        assert_eq!(resolve_binary_name(u32::MAX), UNKNOWN_BINARY);
    }

    #[test]
    fn resolve_parent_pid_handles_comm_with_parentheses() {
        let stat = "1234 (weird (name)) S 999 1234 1234 0 -1 0 0 0 0 0 0 0 0 0";
        let after_comm = stat.rfind(')').unwrap() + 1;
        let parent: u32 = stat[after_comm..].split_whitespace().nth(1).unwrap().parse().unwrap();
        assert_eq!(parent, 999);
    }
}
