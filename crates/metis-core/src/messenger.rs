//! Publishes connection-state transitions to subscribers (spec.md §3,
//! "Connection" / "Lifecycle"; §2, "Messenger & Connection Manager").
//! Grounded in the teacher's `Transport` event plumbing
//! (`reticulum-legacy::transport::core`), which hands out
//! `tokio::sync::broadcast::Receiver`s for announce/link/interface events
//! rather than maintaining its own subscriber list.

use tokio::sync::broadcast;

use crate::connection::ConnectionState;
use crate::message::{ConnectionId, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissiveKind {
    Create,
    Up,
    Down,
    Closed,
    Destroyed,
}

#[derive(Debug, Clone, Copy)]
pub struct Missive {
    pub connection_id: ConnectionId,
    pub kind: MissiveKind,
    pub tick: Tick,
}

const MISSIVE_CHANNEL_CAPACITY: usize = 256;

/// A thin wrapper over a broadcast sender; `metisd` and any control-channel
/// consumer subscribe with `subscribe()`. Lagged receivers simply miss
/// older missives (spec.md places no ordering or delivery guarantee on
/// Missives themselves, only on Connection state as observed by the
/// pipeline).
pub struct Messenger {
    sender: broadcast::Sender<Missive>,
}

impl Messenger {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(MISSIVE_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Missive> {
        self.sender.subscribe()
    }

    pub fn publish(&self, connection_id: ConnectionId, kind: MissiveKind, tick: Tick) {
        // No receivers is the common case (nobody has subscribed yet); that
        // is not an error.
        let _ = self.sender.send(Missive { connection_id, kind, tick });
    }
}

impl Default for Messenger {
    fn default() -> Self {
        Self::new()
    }
}

pub fn missive_kind_for_transition(from: Option<ConnectionState>, to: ConnectionState) -> MissiveKind {
    match (from, to) {
        (None, ConnectionState::Up) | (None, ConnectionState::Down) => MissiveKind::Create,
        (Some(ConnectionState::Down), ConnectionState::Up) => MissiveKind::Up,
        (Some(ConnectionState::Up), ConnectionState::Down) => MissiveKind::Down,
        (Some(ConnectionState::Up), ConnectionState::Up)
        | (Some(ConnectionState::Down), ConnectionState::Down) => MissiveKind::Up,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_observe_published_missives() {
        let messenger = Messenger::new();
        let mut receiver = messenger.subscribe();
        messenger.publish(1, MissiveKind::Up, 5);

        let missive = receiver.try_recv().unwrap();
        assert_eq!(missive.connection_id, 1);
        assert_eq!(missive.kind, MissiveKind::Up);
        assert_eq!(missive.tick, 5);
    }

    #[test]
    fn create_transition_is_derived_from_no_prior_state() {
        assert_eq!(missive_kind_for_transition(None, ConnectionState::Up), MissiveKind::Create);
        assert_eq!(
            missive_kind_for_transition(Some(ConnectionState::Up), ConnectionState::Down),
            MissiveKind::Down
        );
    }
}
