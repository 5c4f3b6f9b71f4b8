//! Control-plane errors and the exit-code mapping from spec.md §6
//! ("Exit codes: 0 success, 1 parse error, 2 execution error").

#[derive(Debug, thiserror::Error)]
pub enum ControlParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("malformed {command}: expected {expected}")]
    BadArity { command: &'static str, expected: &'static str },
    #[error("invalid {field} value: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Errors raised while *executing* an already-parsed command against a live
/// `Forwarder` (spec.md §7, `ControlError`: "respond with Nack on the
/// control channel").
#[derive(Debug, thiserror::Error)]
pub enum ControlExecutionError {
    #[error("no such connection: {0}")]
    NoSuchConnection(String),
    #[error("no such route: prefix {prefix} via {symbolic}")]
    NoSuchRoute { prefix: String, symbolic: String },
    #[error("no such prefix: {0}")]
    NoSuchPrefix(String),
    #[error("listener bring-up failed: {0}")]
    ListenerFailed(String),
}

impl ControlParseError {
    pub const EXIT_CODE: i32 = 1;
}

impl ControlExecutionError {
    pub const EXIT_CODE: i32 = 2;
}
