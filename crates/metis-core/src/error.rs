/// Error kinds distinguished at the pipeline's API surface (§7). Most of
/// these never escape the pipeline: they are counted and logged, not
/// propagated. Only `Fatal` reaches `main`.
#[derive(Debug, thiserror::Error)]
pub enum MetisError {
    #[error("wire parse failed: {0}")]
    InvalidPacket(#[from] metis_wire::WireError),
    #[error("no FIB entry covers this name")]
    NoRoute,
    #[error("hop limit decremented to zero")]
    HopLimitExceeded,
    #[error("content object matched no PIT entry")]
    Unsolicited,
    #[error("egress outbox at capacity")]
    QueueFull,
    #[error("send attempted on a closed connection")]
    ConnectionGone,
    #[error("malformed control message: {0}")]
    ControlError(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

pub type MetisResult<T> = Result<T, MetisError>;
