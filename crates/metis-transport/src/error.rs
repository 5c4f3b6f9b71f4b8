/// Listener bring-up failures (spec.md §7, `Fatal`: "cannot bind
/// listener ... Exit non-zero"). Once a listener is up, all subsequent
/// errors are per-connection and handled by logging + closing, never by
/// propagating here.
#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },
    #[error("failed to join multicast group {group} on {addr}: {source}")]
    Multicast { group: String, addr: String, source: std::io::Error },
    #[error("unsupported on this platform: {0}")]
    Unsupported(&'static str),
}
