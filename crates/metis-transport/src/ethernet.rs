//! Ethernet listener (spec.md §4.7: "An ethernet listener parses framed
//! TLV over a configurable ethertype"). Raw AF_PACKET sockets require
//! either `unsafe` or a dedicated crate (`pnet`, `socket2` + raw syscalls);
//! neither is in the workspace's dependency set and the workspace lints
//! forbid `unsafe_code` outright, so this listener is a backend stub, the
//! same shape as the teacher's BLE interface delegating to a
//! platform `native` module that may not exist on every target
//! (`reticulumd::interfaces::ble::windows`). Bringing one up always fails
//! with `ListenError::Unsupported`, which the entry point treats as fatal
//! (spec.md §7: "cannot bind listener ... Exit non-zero").

use crate::event::EventSink;
use crate::ListenError;
use tokio_util::sync::CancellationToken;

/// Ethertype Metis listens on absent any other configuration (spec.md §6).
pub const DEFAULT_ETHERTYPE: u16 = 0x0801;

pub struct EthernetConfig {
    pub interface: String,
    pub ethertype: u16,
}

/// Always returns `Err(ListenError::Unsupported)`: no raw-socket backend
/// is wired into this build. Kept as a real entry point (rather than
/// omitted) so `metisd`'s listener dispatch stays exhaustive over every
/// listener kind named in spec.md §6, and so a future backend only needs
/// to replace this one function.
pub async fn spawn(config: EthernetConfig, _sink: EventSink, _cancel: CancellationToken) -> Result<(), ListenError> {
    log::warn!(
        "metis-transport: ethernet listener on {} (ethertype {:#06x}) requested but no raw-socket backend is compiled in",
        config.interface,
        config.ethertype
    );
    Err(ListenError::Unsupported("ethernet listener requires a raw-socket backend not present in this build"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventSink;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn spawn_reports_unsupported() {
        let (tx, _rx) = mpsc::channel(1);
        let sink = EventSink::new(tx);
        let cancel = CancellationToken::new();
        let config = EthernetConfig { interface: "eth0".to_string(), ethertype: DEFAULT_ETHERTYPE };
        let err = spawn(config, sink, cancel).await.unwrap_err();
        assert!(matches!(err, ListenError::Unsupported(_)));
    }
}
