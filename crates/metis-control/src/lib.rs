//! The control-plane command grammar (spec.md §6). This crate owns only
//! the *shape* of the control channel — parsing and serializing the
//! command/response text and JSON forms — not the daemon that executes
//! them; the embedded text CLI that produces these commands is an
//! external collaborator out of scope for this workspace (spec.md §1).

pub mod command;
pub mod error;
pub mod name_text;
pub mod response;

pub use command::{CacheKind, ControlCommand, ListResource, ListenerKind, StrategyName, Toggle, TransportKind};
pub use error::{ControlExecutionError, ControlParseError};
pub use response::{ConnectionSummary, ControlResponse, CounterSnapshot, InterfaceSummary, RouteSummary};
