//! Structured response bodies the control channel sends back, realizing
//! spec.md §6's `list` command and §7's "respond with Nack on the control
//! channel" / "counters surfaced via `list` commands". Grounded in the
//! teacher's `styrene-ipc::types` plain-data response structs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSummary {
    pub id: u32,
    pub symbolic: String,
    pub local: String,
    pub remote: String,
    pub state: String,
    pub is_local: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RouteSummary {
    pub prefix: String,
    pub nexthops: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InterfaceSummary {
    pub symbolic: String,
    pub kind: String,
    pub addr: String,
}

/// Per-kind drop counters, mirroring `metis_core::ErrorCounters`
/// (spec.md §7: "bump counters surfaced via `list` commands").
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CounterSnapshot {
    pub invalid_packet: u64,
    pub no_route: u64,
    pub hop_limit_exceeded: u64,
    pub unsolicited: u64,
    pub queue_full: u64,
    pub connection_gone: u64,
}

impl From<metis_core::ErrorCounters> for CounterSnapshot {
    fn from(counters: metis_core::ErrorCounters) -> Self {
        Self {
            invalid_packet: counters.invalid_packet,
            no_route: counters.no_route,
            hop_limit_exceeded: counters.hop_limit_exceeded,
            unsolicited: counters.unsolicited,
            queue_full: counters.queue_full,
            connection_gone: counters.connection_gone,
        }
    }
}

/// The daemon's reply to one `ControlCommand`. `Ack`/`Nack` carry the exit
/// code semantics of spec.md §6 (0 success, 2 execution error); a parse
/// failure never reaches this far (exit code 1, raised by `parse` itself).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlResponse {
    Ack,
    Nack { reason: String },
    Connections { items: Vec<ConnectionSummary>, counters: CounterSnapshot },
    Routes { items: Vec<RouteSummary> },
    Interfaces { items: Vec<InterfaceSummary> },
    Help { text: String },
}

impl ControlResponse {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Nack { .. } => 2,
            _ => 0,
        }
    }

    pub fn nack(reason: impl Into<String>) -> Self {
        Self::Nack { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_and_nack_carry_spec_exit_codes() {
        assert_eq!(ControlResponse::Ack.exit_code(), 0);
        assert_eq!(ControlResponse::nack("no such route").exit_code(), 2);
    }

    #[test]
    fn serializes_as_tagged_json() {
        let response = ControlResponse::Routes {
            items: vec![RouteSummary { prefix: "/a".to_string(), nexthops: vec![1, 2] }],
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"kind\":\"routes\""));
        let back: ControlResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
    }
}
