//! TCP listener (spec.md §4.7): "TCP and local listeners create new
//! Connections on accept." Frames are length-prefixed by the wire format's
//! own `packetLength` field (spec.md §6), so the read task only needs to
//! buffer until it has seen a complete fixed header, then a complete
//! packet, exactly once per frame — no separate framing layer is needed,
//! unlike the teacher's HDLC-framed serial links.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use metis_core::connection::{Address, AddressKind};
use metis_wire::header::{FixedHeader, FIXED_HEADER_LEN};

use crate::event::EventSink;
use crate::ListenError;

/// Binds a TCP listening socket without yet serving it, so a caller (the
/// static startup path, or a control-channel `add listener` handler) can
/// observe a bind failure before committing to the accept loop.
pub async fn bind(bind_addr: SocketAddr) -> Result<TokioTcpListener, ListenError> {
    TokioTcpListener::bind(bind_addr).await.map_err(|err| ListenError::Bind { addr: bind_addr.to_string(), source: err })
}

/// Brings up a TCP listener bound to `bind_addr` and accepts connections
/// until `cancel` fires. Each accepted peer gets its own read/write task
/// pair, mirroring the teacher's per-connection split
/// (`reticulum_legacy::iface::tcp_client`).
pub async fn spawn(bind_addr: SocketAddr, is_local: bool, sink: EventSink, cancel: CancellationToken) -> Result<(), ListenError> {
    let listener = bind(bind_addr).await?;
    serve(listener, bind_addr, is_local, sink, cancel).await;
    Ok(())
}

/// Runs the accept loop for an already-bound listener until `cancel` fires.
pub async fn serve(listener: TokioTcpListener, bind_addr: SocketAddr, is_local: bool, sink: EventSink, cancel: CancellationToken) {
    log::info!("metis-transport: tcp listener bound to {bind_addr}");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        let sink = sink.clone();
                        let cancel = cancel.child_token();
                        tokio::spawn(async move {
                            handle_connection(stream, bind_addr, peer_addr, is_local, None, sink, cancel).await;
                        });
                    }
                    Err(err) => log::warn!("metis-transport: tcp accept failed on {bind_addr}: {err}"),
                }
            }
        }
    }
}

/// Dials `remote_addr` for an `add connection tcp` control command
/// (spec.md §6). Unlike `spawn`, this returns only after the dialed
/// connection closes, matching the single-peer lifetime of an outbound
/// tunnel; the caller runs it inside its own `tokio::spawn`.
pub async fn connect(remote_addr: SocketAddr, is_local: bool, symbolic: String, sink: EventSink, cancel: CancellationToken) -> Result<(), ListenError> {
    let stream = TcpStream::connect(remote_addr)
        .await
        .map_err(|err| ListenError::Bind { addr: remote_addr.to_string(), source: err })?;
    let local_addr = stream.local_addr().unwrap_or(remote_addr);
    handle_connection(stream, local_addr, remote_addr, is_local, Some(symbolic), sink, cancel).await;
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    is_local: bool,
    symbolic: Option<String>,
    sink: EventSink,
    cancel: CancellationToken,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let local = Address::new(AddressKind::Inet, local_addr.to_string());
    let remote = Address::new(AddressKind::Inet, peer_addr.to_string());
    let Some(connection_id) = sink.accepted_as(local, remote, is_local, writer_tx, symbolic).await else {
        return;
    };

    let write_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = writer_rx.recv() => {
                        match frame {
                            Some(bytes) => {
                                if let Err(err) = write_half.write_all(&bytes).await {
                                    log::debug!("metis-transport: tcp write to {peer_addr} failed: {err}");
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
            let _ = write_half.shutdown().await;
        })
    };

    let mut buffer: Vec<u8> = Vec::with_capacity(4096);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = read_frame(&mut read_half, &mut buffer) => {
                match result {
                    Ok(Some(frame)) => sink.data(connection_id, frame).await,
                    Ok(None) => {
                        log::debug!("metis-transport: tcp peer {peer_addr} closed the connection");
                        break;
                    }
                    Err(err) => {
                        log::debug!("metis-transport: tcp read from {peer_addr} failed: {err}");
                        break;
                    }
                }
            }
        }
    }

    cancel.cancel();
    let _ = write_task.await;
    sink.closed(connection_id).await;
}

/// Reads exactly one CCNx v1 frame off a byte stream: the 8-byte fixed
/// header, then `packetLength - headerLength` more bytes (spec.md §6).
/// Returns `Ok(None)` on clean EOF before any bytes of the next frame
/// arrive.
async fn read_frame(stream: &mut (impl AsyncReadExt + Unpin), buffer: &mut Vec<u8>) -> std::io::Result<Option<Vec<u8>>> {
    buffer.clear();
    buffer.resize(FIXED_HEADER_LEN, 0);
    if !read_exact_or_eof(stream, buffer).await? {
        return Ok(None);
    }

    let header = match FixedHeader::parse(buffer) {
        Ok(header) => header,
        Err(_) => return Ok(Some(std::mem::take(buffer))),
    };

    let total_len = header.packet_length as usize;
    if total_len > FIXED_HEADER_LEN {
        let remaining = total_len - FIXED_HEADER_LEN;
        let mut rest = vec![0u8; remaining];
        stream.read_exact(&mut rest).await?;
        buffer.extend_from_slice(&rest);
    }
    Ok(Some(std::mem::take(buffer)))
}

/// Like `read_exact`, but returns `Ok(false)` instead of erroring when the
/// peer closes before sending any bytes of the next frame at all.
async fn read_exact_or_eof(stream: &mut (impl AsyncReadExt + Unpin), buffer: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = stream.read(&mut buffer[filled..]).await?;
        if read == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "peer closed mid-frame"));
        }
        filled += read;
    }
    Ok(true)
}
