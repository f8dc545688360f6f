use grimoire_common::class::SyscallClass;

use super::arg_constraint::ArgConstraint;

/// A pattern has at most this many steps.
pub const MAX_STEPS: usize = 8;

/// A step has at most this many simultaneous argument constraints.
pub const MAX_ARG_CONSTRAINTS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    Debug = 0,
    Info = 1,
    Warning = 2,
    High = 3,
    Critical = 4,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = crate::error::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(crate::error::ConfigError::InvalidSeverity(other.to_string())),
        }
    }
}

/// Only `SameProcess` is evaluated by the engine today. The other
/// variants are plumbed so a future catalog entry can name its intent;
/// setting one today trips `Engine`'s advisory
/// `unsupported_relationship` counter instead of silently matching the
/// wrong process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessRelationship {
    SameProcess,
    Child,
    AnyInTree,
}

/// One step of a pattern: a syscall predicate plus the budgets that bound
/// how it may follow the previous step.
#[derive(Clone, Debug)]
pub struct PatternStep {
    pub syscall_nr: Option<u32>,
    pub syscall_class: Option<SyscallClass>,
    pub process_relationship: ProcessRelationship,
    /// `0` means "no step-local bound, only the pattern-global window
    /// applies".
    pub max_time_delta_ns_from_prev: u64,
    /// `0` means "adjacent only": no other monitored syscall for this
    /// process may occur between the previous step and this one.
    pub max_step_distance: u32,
    pub arg_constraints: [Option<ArgConstraint>; MAX_ARG_CONSTRAINTS],
}

impl PatternStep {
    pub fn matches_syscall(&self, syscall_nr: u32) -> bool {
        if let Some(nr) = self.syscall_nr {
            if nr == syscall_nr {
                return true;
            }
        }
        if let Some(class) = self.syscall_class {
            return class.contains(syscall_nr);
        }
        false
    }
}
