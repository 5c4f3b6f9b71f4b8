//! The event vocabulary a listener pushes across the cross-thread ring
//! buffer into the Dispatcher (spec.md §5: "Listeners publish to the loop
//! via readiness events, never by directly inserting into tables").

use metis_core::connection::Address;
use metis_core::message::ConnectionId;
use tokio::sync::{mpsc, oneshot};

/// The write half a listener hands back to the Dispatcher on accept: a
/// channel the Dispatcher pushes raw outgoing bytes into, drained by the
/// listener's own write task. Per spec.md §9 ("Message sharing"), nothing
/// about a `Message` itself crosses this boundary — only bytes already
/// pulled off a Connection's outbox.
pub type Writer = mpsc::UnboundedSender<Vec<u8>>;

/// Emitted by a listener task, consumed by the Dispatcher's event loop.
pub enum TransportEvent {
    /// A new peer connected (TCP/local accept) or was observed for the
    /// first time (UDP first packet). `is_local` matches spec.md §4.5's
    /// "ingress connection has hop-limit semantics (non-local)" test.
    /// `assign` carries the `ConnectionId` the Dispatcher mints back to
    /// the accepting task, so its read loop can tag subsequent `Data`
    /// events correctly.
    Accepted {
        local: Address,
        remote: Address,
        is_local: bool,
        writer: Writer,
        /// Set when this connection was dialed out by an `add connection`
        /// control command (spec.md §6); `None` for peers discovered by a
        /// listener's accept loop. The Dispatcher uses it to populate the
        /// symbolic-name lookup `list connections`/`remove connection`
        /// operate on.
        symbolic: Option<String>,
        assign: oneshot::Sender<ConnectionId>,
    },
    /// Bytes arrived on an already-known connection.
    Data { connection_id: ConnectionId, bytes: Vec<u8> },
    /// The peer went away (EOF, RST, or an unrecoverable I/O error).
    Closed { connection_id: ConnectionId },
}

/// Handed to every accepted connection's read task so it can report bytes
/// and closure once the Dispatcher has assigned it a `ConnectionId`.
#[derive(Clone)]
pub struct EventSink {
    sender: mpsc::Sender<TransportEvent>,
}

impl EventSink {
    pub fn new(sender: mpsc::Sender<TransportEvent>) -> Self {
        Self { sender }
    }

    /// Reports a new peer and waits for the Dispatcher to mint its id.
    /// Returns `None` if the Dispatcher has already shut down.
    pub async fn accepted(&self, local: Address, remote: Address, is_local: bool, writer: Writer) -> Option<ConnectionId> {
        self.accepted_as(local, remote, is_local, writer, None).await
    }

    /// Like `accepted`, but tags the new connection with the symbolic name
    /// an `add connection` control command dialed it under.
    pub async fn accepted_as(
        &self,
        local: Address,
        remote: Address,
        is_local: bool,
        writer: Writer,
        symbolic: Option<String>,
    ) -> Option<ConnectionId> {
        let (assign, reply) = oneshot::channel();
        self.sender.send(TransportEvent::Accepted { local, remote, is_local, writer, symbolic, assign }).await.ok()?;
        reply.await.ok()
    }

    pub async fn data(&self, connection_id: ConnectionId, bytes: Vec<u8>) {
        let _ = self.sender.send(TransportEvent::Data { connection_id, bytes }).await;
    }

    pub async fn closed(&self, connection_id: ConnectionId) {
        let _ = self.sender.send(TransportEvent::Closed { connection_id }).await;
    }
}
