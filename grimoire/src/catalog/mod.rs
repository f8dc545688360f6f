//! The forbidden-incantation catalog: an immutable, compile-time array of
//! [`Pattern`]s. Nothing in this module allocates; the engine indexes into
//! `CATALOG` by position and never clones a `Pattern` out of it.

mod arg_constraint;
mod builtin;
mod pattern;

pub use arg_constraint::{fixed_path, ArgConstraint, ArgConstraintKind, FixedPathLiteral};
pub use pattern::{PatternStep, ProcessRelationship, Severity, MAX_ARG_CONSTRAINTS, MAX_STEPS};

use grimoire_common::fnv1a_64;

/// Upper bound on the catalog size, used to size each process's dense
/// `[Option<MatchState>; MAX_PATTERNS]` array without a per-process heap
/// allocation. `CATALOG.len()` must not exceed this.
pub const MAX_PATTERNS: usize = 32;

/// A single forbidden incantation: an ordered sequence of syscall steps
/// with per-step and global budgets, plus the whitelists that suppress a
/// match without ever reaching the log.
#[derive(Debug)]
pub struct Pattern {
    /// Stable identity, `fnv1a_64(name)`. Computed at compile time by
    /// [`Pattern::new`] so the catalog never hashes at runtime.
    pub id_hash: u64,
    pub name: &'static str,
    pub severity: Severity,
    pub max_sequence_window_ns: u64,
    pub step_count: u8,
    pub steps: [PatternStep; MAX_STEPS],
    pub whitelisted_process_names: &'static [&'static str],
    /// SHA-256 of the binary, truncated to the first 8 bytes as a `u64`.
    /// `0` marks an unused slot.
    pub whitelisted_binary_hashes: [u64; 4],
    pub enabled: bool,
}

impl Pattern {
    /// Builds a pattern, deriving `id_hash` from `name`. `const fn` so
    /// every entry in [`CATALOG`] is evaluated at compile time.
    pub const fn new(
        name: &'static str,
        severity: Severity,
        max_sequence_window_ns: u64,
        step_count: u8,
        steps: [PatternStep; MAX_STEPS],
        whitelisted_process_names: &'static [&'static str],
        whitelisted_binary_hashes: [u64; 4],
    ) -> Self {
        Pattern {
            id_hash: fnv1a_64(name.as_bytes()),
            name,
            severity,
            max_sequence_window_ns,
            step_count,
            steps,
            whitelisted_process_names,
            whitelisted_binary_hashes,
            enabled: true,
        }
    }

    pub fn is_whitelisted_binary(&self, truncated_sha256: u64) -> bool {
        self.whitelisted_binary_hashes
            .iter()
            .any(|&h| h != 0 && h == truncated_sha256)
    }

    pub fn is_whitelisted_process(&self, binary_name: &str) -> bool {
        self.whitelisted_process_names.contains(&binary_name)
    }
}

/// The compiled-in catalog. Order is insertion order; `CATALOG[i]` is
/// `i`'s `pattern_index` for every `MatchState`/`MatchResult` in the
/// engine.
pub static CATALOG: &[Pattern] = builtin::CATALOG;

/// The union of every `syscall_nr` directly named by a step, plus the
/// expansion of every `syscall_class` named by a step, across all enabled
/// patterns. This is exactly what the loader writes into the kernel
/// `monitored_syscalls` map.
pub fn monitored_syscall_set() -> impl Iterator<Item = u32> {
    let mut seen = [false; 512];
    let mut out = arrayvec::ArrayVec::<u32, 512>::new();
    for pattern in CATALOG.iter().filter(|p| p.enabled) {
        for step in pattern.steps.iter().take(pattern.step_count as usize) {
            let mut push = |nr: u32| {
                if (nr as usize) < seen.len() && !seen[nr as usize] {
                    seen[nr as usize] = true;
                    let _ = out.try_push(nr);
                }
            };
            if let Some(nr) = step.syscall_nr {
                push(nr);
            }
            if let Some(class) = step.syscall_class {
                for nr in grimoire_common::class::nr::ALL {
                    if class.contains(nr) {
                        push(nr);
                    }
                }
            }
        }
    }
    out.into_iter()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn catalog_is_nonempty_and_ids_are_distinct() {
        assert!(!CATALOG.is_empty());
        assert!(CATALOG.len() <= MAX_PATTERNS);
        for (i, a) in CATALOG.iter().enumerate() {
            for b in &CATALOG[i + 1..] {
                assert_ne!(a.id_hash, b.id_hash, "{} and {} collide", a.name, b.name);
            }
        }
    }

    #[test]
    fn every_step_within_bounds_has_a_predicate() {
        for pattern in CATALOG {
            for step in pattern.steps.iter().take(pattern.step_count as usize) {
                assert!(
                    step.syscall_nr.is_some() || step.syscall_class.is_some(),
                    "{} has a step with no syscall predicate",
                    pattern.name
                );
            }
        }
    }

    #[test]
    fn monitored_syscall_set_covers_every_literal_step_nr() {
        let monitored: std::collections::HashSet<u32> = monitored_syscall_set().collect();
        for pattern in CATALOG {
            for step in pattern.steps.iter().take(pattern.step_count as usize) {
                if let Some(nr) = step.syscall_nr {
                    assert!(monitored.contains(&nr));
                }
            }
        }
    }
}
