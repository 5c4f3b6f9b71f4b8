//! The control channel itself: a local-socket listener that reads one
//! control command per line, submits it to the Dispatcher via
//! `ControlSink`, and writes back one JSON reply line carrying the
//! response body plus the exit-code semantics of spec.md §6 (0 success, 1
//! parse error, 2 execution error). The text CLI that would normally sit
//! on the other end of this socket is out of scope (spec.md §1); this is
//! only the wire shape it and `metisd` agree on.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;

use metis_control::{ControlCommand, ControlParseError};
use metis_transport::ControlSink;

#[derive(Serialize)]
struct ReplyLine<'a> {
    exit_code: i32,
    #[serde(flatten)]
    response: &'a serde_json::Value,
}

/// Binds the control socket at `path`, removing any stale socket file left
/// behind by a previous run (mirrors `metis_transport::unix::bind`'s own
/// cleanup).
pub fn bind(path: impl AsRef<Path>) -> std::io::Result<UnixListener> {
    let path = path.as_ref();
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
    UnixListener::bind(path)
}

/// Accepts control connections until `cancel` fires. Each connection is
/// served independently and can submit any number of commands, one per
/// line, until it disconnects or sends `quit`.
pub async fn serve(listener: UnixListener, path: PathBuf, control: ControlSink, cancel: CancellationToken) {
    log::info!("metisd: control channel listening on {}", path.display());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _peer)) => {
                        let control = control.clone();
                        let cancel = cancel.child_token();
                        tokio::spawn(async move { serve_connection(stream, control, cancel).await });
                    }
                    Err(err) => log::warn!("metisd: control accept failed on {}: {err}", path.display()),
                }
            }
        }
    }
}

async fn serve_connection(stream: tokio::net::UnixStream, control: ControlSink, cancel: CancellationToken) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let next_line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match next_line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                log::debug!("metisd: control connection read error: {err}");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let (exit_code, body) = match ControlCommand::parse(&line) {
            Ok(command) => {
                let quitting = matches!(command, ControlCommand::Quit);
                match control.submit(command).await {
                    Some(response) => {
                        let exit_code = response.exit_code();
                        let body = serde_json::to_value(&response).unwrap_or(serde_json::Value::Null);
                        if write_reply(&mut write_half, exit_code, &body).await.is_err() {
                            break;
                        }
                        if quitting {
                            break;
                        }
                        continue;
                    }
                    None => {
                        log::debug!("metisd: dispatcher gone, closing control connection");
                        break;
                    }
                }
            }
            Err(err) => (ControlParseError::EXIT_CODE, serde_json::json!({ "kind": "nack", "reason": err.to_string() })),
        };

        if write_reply(&mut write_half, exit_code, &body).await.is_err() {
            break;
        }
    }
}

async fn write_reply(
    write_half: &mut tokio::net::unix::OwnedWriteHalf,
    exit_code: i32,
    body: &serde_json::Value,
) -> std::io::Result<()> {
    let reply = ReplyLine { exit_code, response: body };
    let mut line = serde_json::to_string(&reply).unwrap_or_default();
    line.push('\n');
    write_half.write_all(line.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_reports_exit_code_one() {
        let err = ControlCommand::parse("frobnicate").unwrap_err();
        assert!(matches!(err, ControlParseError::UnknownCommand(_)));
        assert_eq!(ControlParseError::EXIT_CODE, 1);
    }
}
