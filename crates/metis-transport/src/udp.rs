//! UDP listener (spec.md §4.7): "UDP uses one connection per
//! `(local,remote)` tuple, created on first packet." Unlike TCP there is
//! no per-peer socket to split into read/write halves, so this module owns
//! one shared socket and a table mapping `ConnectionId` back to the peer
//! `SocketAddr` the Dispatcher's per-connection `Writer` channel should
//! ultimately be addressed to.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use metis_core::connection::{Address, AddressKind};
use metis_core::message::ConnectionId;

use crate::event::EventSink;
use crate::ListenError;

const RECV_BUFFER_SIZE: usize = 65_535;

/// Binds a UDP socket without yet running its receive loop (mirrors
/// `tcp::bind`, so `add listener udp` can report a bind failure back over
/// the control channel without blocking the Dispatcher on the loop itself).
pub async fn bind(bind_addr: SocketAddr) -> Result<UdpSocket, ListenError> {
    UdpSocket::bind(bind_addr).await.map_err(|err| ListenError::Bind { addr: bind_addr.to_string(), source: err })
}

/// Brings up a UDP listener bound to `bind_addr`. Every first-seen
/// `(local,remote)` pair is reported to the Dispatcher as a new
/// connection; a shared per-peer writer task drains its queued bytes onto
/// `send_to`.
pub async fn spawn(bind_addr: SocketAddr, sink: EventSink, cancel: CancellationToken) -> Result<(), ListenError> {
    let socket = bind(bind_addr).await?;
    serve(socket, bind_addr, sink, cancel).await;
    Ok(())
}

/// Runs the receive loop for an already-bound UDP socket until `cancel`
/// fires (mirrors `tcp::serve`, so `add listener udp` can bind first and
/// report a failure before committing to the loop).
pub async fn serve(socket: UdpSocket, bind_addr: SocketAddr, sink: EventSink, cancel: CancellationToken) {
    log::info!("metis-transport: udp listener bound to {bind_addr}");
    run(Arc::new(socket), bind_addr, sink, cancel).await;
}

/// "Dials" a UDP peer for an `add connection udp` control command: binds
/// an ephemeral local socket, reports the pair as a connection immediately
/// (UDP has no handshake to wait for), and serves it exactly like a
/// listener-discovered peer, just pre-seeded with one entry instead of
/// learning it from the first inbound packet.
pub async fn connect(remote_addr: SocketAddr, symbolic: String, sink: EventSink, cancel: CancellationToken) -> Result<(), ListenError> {
    let local_addr: SocketAddr = if remote_addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" }.parse().unwrap();
    let socket = Arc::new(bind(local_addr).await?);
    let bound_local = socket.local_addr().unwrap_or(local_addr);

    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let local = Address::new(AddressKind::Inet, bound_local.to_string());
    let remote = Address::new(AddressKind::Inet, remote_addr.to_string());
    let Some(connection_id) = sink.accepted_as(local, remote, false, writer_tx, Some(symbolic)).await else {
        return Ok(());
    };

    {
        let socket = Arc::clone(&socket);
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = writer_rx.recv() => {
                        match frame {
                            Some(bytes) => {
                                if let Err(err) = socket.send_to(&bytes, remote_addr).await {
                                    log::debug!("metis-transport: udp send_to {remote_addr} failed: {err}");
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        });
    }

    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buffer) => {
                match received {
                    Ok((len, from)) if from == remote_addr => sink.data(connection_id, buffer[..len].to_vec()).await,
                    Ok(_) => {}
                    Err(err) => {
                        log::debug!("metis-transport: udp recv_from on {bound_local} failed: {err}");
                        break;
                    }
                }
            }
        }
    }
    sink.closed(connection_id).await;
    Ok(())
}

/// Joins `group` on `bind_addr` (IPv4 only, matching spec.md §6's
/// "IP multicast" listener kind) before running the same receive loop as
/// a unicast UDP listener.
pub async fn spawn_multicast(bind_addr: SocketAddr, group: std::net::Ipv4Addr, sink: EventSink, cancel: CancellationToken) -> Result<(), ListenError> {
    let socket =
        UdpSocket::bind(bind_addr).await.map_err(|err| ListenError::Bind { addr: bind_addr.to_string(), source: err })?;
    let bind_ip = match bind_addr.ip() {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => std::net::Ipv4Addr::UNSPECIFIED,
    };
    socket.join_multicast_v4(group, bind_ip).map_err(|err| ListenError::Multicast {
        group: group.to_string(),
        addr: bind_addr.to_string(),
        source: err,
    })?;
    log::info!("metis-transport: joined multicast group {group} on {bind_addr}");
    run(Arc::new(socket), bind_addr, sink, cancel).await;
    Ok(())
}

async fn run(socket: Arc<UdpSocket>, bind_addr: SocketAddr, sink: EventSink, cancel: CancellationToken) {
    let peers: Arc<Mutex<HashMap<SocketAddr, (ConnectionId, mpsc::UnboundedSender<Vec<u8>>)>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buffer) => {
                match received {
                    Ok((len, peer_addr)) => {
                        let bytes = buffer[..len].to_vec();
                        let connection_id = ensure_connection(&socket, bind_addr, peer_addr, &peers, &sink, &cancel).await;
                        if let Some(connection_id) = connection_id {
                            sink.data(connection_id, bytes).await;
                        }
                    }
                    Err(err) => {
                        log::warn!("metis-transport: udp recv_from on {bind_addr} failed: {err}");
                        break;
                    }
                }
            }
        }
    }
}

/// Looks up (or creates, reporting to the Dispatcher) the pseudo-connection
/// for `peer_addr`. Each new peer gets its own outgoing-write task so that
/// a slow or gone peer's queue cannot block delivery to any other peer
/// sharing this socket.
async fn ensure_connection(
    socket: &Arc<UdpSocket>,
    bind_addr: SocketAddr,
    peer_addr: SocketAddr,
    peers: &Arc<Mutex<HashMap<SocketAddr, (ConnectionId, mpsc::UnboundedSender<Vec<u8>>)>>>,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> Option<ConnectionId> {
    {
        let table = peers.lock().await;
        if let Some((id, _)) = table.get(&peer_addr) {
            return Some(*id);
        }
    }

    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let local = Address::new(AddressKind::Inet, bind_addr.to_string());
    let remote = Address::new(AddressKind::Inet, peer_addr.to_string());
    let connection_id = sink.accepted(local, remote, false, writer_tx.clone()).await?;

    peers.lock().await.insert(peer_addr, (connection_id, writer_tx));

    let socket = Arc::clone(socket);
    let cancel = cancel.child_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = writer_rx.recv() => {
                    match frame {
                        Some(bytes) => {
                            if let Err(err) = socket.send_to(&bytes, peer_addr).await {
                                log::debug!("metis-transport: udp send_to {peer_addr} failed: {err}");
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });

    Some(connection_id)
}
