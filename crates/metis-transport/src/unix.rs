//! Local (Unix-domain socket) listener (spec.md §4.7, §6 `local` listener
//! kind). Framing and accept-loop structure mirror `tcp.rs` exactly; the
//! only difference is the socket family and how peer addresses are named,
//! since `UnixStream` peers have no remote `SocketAddr`.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use metis_core::connection::{Address, AddressKind};
use metis_wire::header::{FixedHeader, FIXED_HEADER_LEN};

use crate::event::EventSink;
use crate::ListenError;

/// Binds a Unix-domain listening socket without serving it yet, removing
/// any stale socket file left behind by a previous run (mirrors
/// `tcp::bind`).
pub fn bind(path: impl AsRef<Path>) -> Result<UnixListener, ListenError> {
    let path = path.as_ref();
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
    UnixListener::bind(path).map_err(|err| ListenError::Bind { addr: path.display().to_string(), source: err })
}

/// Brings up a Unix-domain listener at `path`. Any stale socket file left
/// behind by a previous run is removed first, matching the teacher's
/// IPC-socket bring-up in `styrene-ipc-server`.
pub async fn spawn(path: impl AsRef<Path>, sink: EventSink, cancel: CancellationToken) -> Result<(), ListenError> {
    let path = path.as_ref().to_path_buf();
    let listener = bind(&path)?;
    serve(listener, path, sink, cancel).await;
    Ok(())
}

/// Runs the accept loop for an already-bound local listener until `cancel`
/// fires.
pub async fn serve(listener: UnixListener, path: PathBuf, sink: EventSink, cancel: CancellationToken) {
    log::info!("metis-transport: local listener bound to {}", path.display());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _peer)) => {
                        let sink = sink.clone();
                        let cancel = cancel.child_token();
                        let local_path = path.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, local_path, None, sink, cancel).await;
                        });
                    }
                    Err(err) => log::warn!("metis-transport: local accept failed on {}: {err}", path.display()),
                }
            }
        }
    }
}

/// Dials a local socket at `path` for an `add connection` control command
/// using the `local` address family (spec.md §6 lists `local` only as a
/// listener kind, but the daemon-side tunnel construction is symmetric
/// with `tcp::connect`/`udp::connect`, so it is offered here too).
pub async fn connect(path: impl AsRef<Path>, symbolic: String, sink: EventSink, cancel: CancellationToken) -> Result<(), ListenError> {
    let path = path.as_ref().to_path_buf();
    let stream = UnixStream::connect(&path).await.map_err(|err| ListenError::Bind { addr: path.display().to_string(), source: err })?;
    handle_connection(stream, path, Some(symbolic), sink, cancel).await;
    Ok(())
}

async fn handle_connection(stream: UnixStream, local_path: PathBuf, symbolic: Option<String>, sink: EventSink, cancel: CancellationToken) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let local = Address::new(AddressKind::Unix, local_path.display().to_string());
    let remote = Address::new(AddressKind::Unix, format!("{}#peer", local_path.display()));
    let Some(connection_id) = sink.accepted_as(local, remote, true, writer_tx, symbolic).await else {
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
                                    log::debug!("metis-transport: local write failed: {err}");
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
                    Ok(None) => break,
                    Err(err) => {
                        log::debug!("metis-transport: local read failed: {err}");
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
