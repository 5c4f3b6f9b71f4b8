//! The channel a control-channel listener (`metisd`) uses to submit a
//! parsed `ControlCommand` onto the Dispatcher's loop thread and get back
//! a `ControlResponse` (spec.md §5: "All mutations of those data
//! structures happen on the loop thread" — control commands mutate the
//! FIB/Connection Table exactly like packet ingress does, so they cross
//! the same kind of cross-thread boundary `TransportEvent` does).

use tokio::sync::{mpsc, oneshot};

use metis_control::{ControlCommand, ControlResponse};

pub struct ControlRequest {
    pub command: ControlCommand,
    pub reply: oneshot::Sender<ControlResponse>,
}

#[derive(Clone)]
pub struct ControlSink {
    sender: mpsc::Sender<ControlRequest>,
}

impl ControlSink {
    pub fn new(sender: mpsc::Sender<ControlRequest>) -> Self {
        Self { sender }
    }

    /// Submits `command` to the Dispatcher and awaits its response.
    /// Returns `None` if the Dispatcher has already shut down.
    pub async fn submit(&self, command: ControlCommand) -> Option<ControlResponse> {
        let (reply, rx) = oneshot::channel();
        self.sender.send(ControlRequest { command, reply }).await.ok()?;
        rx.await.ok()
    }
}
