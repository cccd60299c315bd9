use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

/// Error kind, one per variant of [`Error`].
///
/// Lets callers (and tests) match on the failure class without caring
/// about the attached message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    InvalidType,
    Arity,
    MissingAdapter,
    Scope,
    TableGrowth,
    WideIntegerDisabled,
    MissingAllocator,
    Allocation,
    MissingExport,
    MemoryAccess,
    NullPointer,
    Json,
    Trap,
    Host,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::InvalidType => "invalid type",
            Self::Arity => "arity",
            Self::MissingAdapter => "missing adapter",
            Self::Scope => "scope",
            Self::TableGrowth => "table growth",
            Self::WideIntegerDisabled => "wide integer disabled",
            Self::MissingAllocator => "missing allocator",
            Self::Allocation => "allocation",
            Self::MissingExport => "missing export",
            Self::MemoryAccess => "memory access",
            Self::NullPointer => "null pointer",
            Self::Json => "json",
            Self::Trap => "trap",
            Self::Host => "host",
        };
        f.write_str(name)
    }
}

/// Errors raised by the bridge.
///
/// Every failure is synchronous and returned to the caller; nothing inside
/// the bridge retries.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Inconsistent or unsupported pointer configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unknown type tag, signature letter, or a value of the wrong shape.
    #[error("invalid type: {0}")]
    InvalidType(String),

    /// A wrapper and its target disagree on the argument count.
    #[error("{name}() requires {expected} argument(s), got {actual}")]
    Arity {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// A type tag used with `xwrap` has no registered adapter.
    #[error("{mode} adapter not found: {tag}")]
    MissingAdapter { mode: &'static str, tag: String },

    /// Scoped allocation without an active scope, or pop of an unknown scope.
    #[error("scope error: {0}")]
    Scope(String),

    /// The call table could not grow and no free slot was available.
    #[error("cannot grow the function table: {0}")]
    TableGrowth(String),

    /// A 64-bit integer operation was requested without wide-integer support.
    #[error("64-bit integer support is disabled")]
    WideIntegerDisabled,

    /// The environment lacks the `alloc`/`dealloc` pair an operation needs.
    #[error("missing alloc() and/or dealloc() required by {0}()")]
    MissingAllocator(&'static str),

    /// The module allocator returned null.
    #[error("allocation of {0} byte(s) failed")]
    Allocation(usize),

    /// A required export is absent or of the wrong kind.
    #[error("missing export: {0}")]
    MissingExport(String),

    /// An access fell outside the linear memory.
    #[error("memory access out of bounds: {addr:#x}+{len} exceeds {size} bytes")]
    MemoryAccess { addr: u64, len: u64, size: u64 },

    /// An operation that requires a non-null pointer received null.
    #[error("{0} does not accept NULL pointers")]
    NullPointer(&'static str),

    /// A `json` result adapter could not parse the decoded string.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The engine reported a trap or call failure.
    #[error("wasm trap: {0}")]
    Trap(String),

    /// A host callback reported a failure.
    #[error("host callback failed: {0}")]
    Host(String),
}

impl Error {
    /// The failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::InvalidType(_) => ErrorKind::InvalidType,
            Self::Arity { .. } => ErrorKind::Arity,
            Self::MissingAdapter { .. } => ErrorKind::MissingAdapter,
            Self::Scope(_) => ErrorKind::Scope,
            Self::TableGrowth(_) => ErrorKind::TableGrowth,
            Self::WideIntegerDisabled => ErrorKind::WideIntegerDisabled,
            Self::MissingAllocator(_) => ErrorKind::MissingAllocator,
            Self::Allocation(_) => ErrorKind::Allocation,
            Self::MissingExport(_) => ErrorKind::MissingExport,
            Self::MemoryAccess { .. } => ErrorKind::MemoryAccess,
            Self::NullPointer(_) => ErrorKind::NullPointer,
            Self::Json(_) => ErrorKind::Json,
            Self::Trap(_) => ErrorKind::Trap,
            Self::Host(_) => ErrorKind::Host,
        }
    }

    pub fn invalid_type(msg: impl Into<String>) -> Self {
        Self::InvalidType(msg.into())
    }

    pub fn host(msg: impl fmt::Display) -> Self {
        Self::Host(msg.to_string())
    }
}
