/// Errors surfaced at the wire-codec boundary.
///
/// Parse failures are never propagated past the forwarding pipeline (see
/// the drop-and-count policy); this enum only distinguishes *why* a buffer
/// was rejected so the caller can log and count accurately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("buffer too short for a fixed header")]
    Truncated,
    #[error("unsupported fixed-header version")]
    UnsupportedVersion,
    #[error("headerLength < 8")]
    HeaderTooShort,
    #[error("packetLength < headerLength")]
    PacketShorterThanHeader,
    #[error("packetLength exceeds the supplied buffer")]
    PacketLongerThanBuffer,
    #[error("a TLV extends beyond its containing region")]
    TlvOverrun,
    #[error("a unique field appeared more than once")]
    DuplicateUniqueField,
    #[error("message TLV type did not match the fixed-header packet type")]
    MessageTypeMismatch,
    #[error("field value too large for the destination buffer")]
    OutOfMemory,
    #[error("field value missing where the dictionary requires one")]
    MissingField,
}

pub type WireResult<T> = Result<T, WireError>;
