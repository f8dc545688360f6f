//! Error types for the three subsystems that can fail independently:
//! config parsing, kernel attachment, and verdict delivery.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid severity {0:?}: expected one of debug, info, warning, high, critical")]
    InvalidSeverity(String),

    #[error("process_table_cap must be nonzero")]
    ZeroProcessTableCap,

    #[error("ring_buffer_bytes must be a power of two")]
    RingBufferBytesNotPowerOfTwo,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("failed to load eBPF object: {0}")]
    Load(#[source] aya::EbpfError),

    #[error("failed to attach tracepoint raw_syscalls/sys_enter: {0}")]
    Attach(#[source] aya::programs::ProgramError),

    #[error("failed to resolve pid namespace identity offsets from BTF: {0}")]
    BtfOffsets(String),

    #[error("map {name} is missing from the loaded object")]
    MissingMap { name: &'static str },

    #[error("failed to open ring buffer map: {0}")]
    RingBuffer(#[source] aya::EbpfError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum VerdictError {
    #[error("failed to resolve /proc metadata for pid {pid}: {source}")]
    ProcMeta {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize alert: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write alert to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("enforcement failed for pid {pid}: {source}")]
    Enforce {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}
