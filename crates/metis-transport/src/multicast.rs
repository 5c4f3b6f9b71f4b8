//! IP multicast listener (spec.md §6, `add listener` kind `ether`'s group
//! sibling — a forwarder rendezvous group reachable without point-to-point
//! configuration). Multicast differs from plain UDP only in socket setup
//! (`join_multicast_v4`), so this module is a thin, named entry point over
//! `udp::spawn_multicast` rather than a parallel receive loop.

use std::net::{Ipv4Addr, SocketAddr};

use tokio_util::sync::CancellationToken;

use crate::event::EventSink;
use crate::udp;
use crate::ListenError;

/// Brings up a multicast listener: binds `bind_addr` and joins `group` on
/// it before handing off to the shared UDP receive loop.
pub async fn spawn(bind_addr: SocketAddr, group: Ipv4Addr, sink: EventSink, cancel: CancellationToken) -> Result<(), ListenError> {
    udp::spawn_multicast(bind_addr, group, sink, cancel).await
}
