//! Name-based forwarding core: interned Names, the FIB, the PIT, the
//! Content Store, pluggable Strategies, the Messenger, WLDR, and the
//! forwarding pipeline that binds them together.

pub mod connection;
pub mod content_store;
pub mod error;
pub mod fib;
pub mod message;
pub mod messenger;
pub mod name;
pub mod pipeline;
pub mod pit;
pub mod strategy;
pub mod wldr;

pub use connection::{Address, AddressKind, Connection, ConnectionState, ConnectionTable, OverflowPolicy};
pub use content_store::{ContentStore, CsEntry};
pub use error::{MetisError, MetisResult};
pub use fib::{Fib, FibEntry};
pub use message::{ConnectionId, Message, MessageKind, Tick};
pub use messenger::{Missive, MissiveKind, Messenger};
pub use name::{Name, NameId, NameSegment, NameTable};
pub use pipeline::{ErrorCounters, Forwarder, ForwarderConfig};
pub use pit::{Pit, PitEntry, PitKey, PitVerdict};
pub use strategy::{Strategy, StrategyKind};
pub use wldr::{WldrReceiver, WldrSender, BUFFER_SIZE, MAX_RTX};
