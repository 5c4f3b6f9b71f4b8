//! CCNx v1 TLV wire codec: fixed-header parsing, a zero-copy skeleton
//! parse, and a field-dictionary builder for the inverse direction.

pub mod buffer;
pub mod error;
pub mod header;
pub mod skeleton;
pub mod tlv;

pub use buffer::{InputBuffer, OutputBuffer};
pub use error::{WireError, WireResult};
pub use header::{FixedHeader, PacketType, FIXED_HEADER_LEN, WIRE_VERSION_V0, WIRE_VERSION_V1};
pub use skeleton::{build, parse_skeleton, FieldDict, Skeleton};
pub use tlv::Field;
