use crate::buffer::{InputBuffer, OutputBuffer};
use crate::error::WireError;

/// Only v1 is active; v0 is carried solely as a legacy test fixture tag
/// (spec.md §9, Open Question a) and is never produced by the builder.
pub const WIRE_VERSION_V1: u8 = 1;
pub const WIRE_VERSION_V0: u8 = 0;

pub const FIXED_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Interest,
    ContentObject,
    InterestReturn,
    Control,
}

impl PacketType {
    pub const CONTROL_WIRE_VALUE: u8 = 0xA4;

    pub fn to_wire(self) -> u8 {
        match self {
            PacketType::Interest => 0,
            PacketType::ContentObject => 1,
            PacketType::InterestReturn => 2,
            PacketType::Control => Self::CONTROL_WIRE_VALUE,
        }
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(PacketType::Interest),
            1 => Some(PacketType::ContentObject),
            2 => Some(PacketType::InterestReturn),
            Self::CONTROL_WIRE_VALUE => Some(PacketType::Control),
            _ => None,
        }
    }
}

/// The 8-byte fixed header described in spec.md §6.
///
/// `per_type` holds `(hopLimit, returnCode, flags)` for an Interest packet
/// and is reserved (read back as zero, written as zero) for every other
/// packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub version: u8,
    pub packet_type: PacketType,
    pub packet_length: u16,
    pub hop_limit: u8,
    pub return_code: u8,
    pub flags: u8,
    pub header_length: u8,
}

impl FixedHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(WireError::Truncated);
        }

        let mut input = InputBuffer::new(buf);
        let version = input.read_u8()?;
        if version != WIRE_VERSION_V1 {
            return Err(WireError::UnsupportedVersion);
        }

        let packet_type_raw = input.read_u8()?;
        let packet_type =
            PacketType::from_wire(packet_type_raw).ok_or(WireError::UnsupportedVersion)?;

        let packet_length = input.read_u16()?;
        let hop_limit = input.read_u8()?;
        let return_code = input.read_u8()?;
        let flags = input.read_u8()?;
        let header_length = input.read_u8()?;

        if header_length < FIXED_HEADER_LEN as u8 {
            return Err(WireError::HeaderTooShort);
        }
        if (packet_length as usize) < header_length as usize {
            return Err(WireError::PacketShorterThanHeader);
        }
        if (packet_length as usize) > buf.len() {
            return Err(WireError::PacketLongerThanBuffer);
        }

        Ok(Self {
            version,
            packet_type,
            packet_length,
            hop_limit,
            return_code,
            flags,
            header_length,
        })
    }

    pub fn write(&self, out: &mut OutputBuffer) -> Result<(), WireError> {
        out.write_u8(self.version)?;
        out.write_u8(self.packet_type.to_wire())?;
        out.write_u16(self.packet_length)?;
        match self.packet_type {
            PacketType::Interest => {
                out.write_u8(self.hop_limit)?;
                out.write_u8(self.return_code)?;
                out.write_u8(self.flags)?;
            }
            _ => {
                out.write_u8(0)?;
                out.write_u8(0)?;
                out.write_u8(0)?;
            }
        }
        out.write_u8(self.header_length)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_interest_header(packet_length: u16) -> FixedHeader {
        FixedHeader {
            version: WIRE_VERSION_V1,
            packet_type: PacketType::Interest,
            packet_length,
            hop_limit: 5,
            return_code: 0,
            flags: 0,
            header_length: FIXED_HEADER_LEN as u8,
        }
    }

    #[test]
    fn round_trips_interest_header() {
        let header = sample_interest_header(32);
        let mut out = OutputBuffer::new();
        header.write(&mut out).unwrap();
        let bytes = out.into_vec();
        assert_eq!(bytes.len(), FIXED_HEADER_LEN);
        let parsed = FixedHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn rejects_non_v1_version() {
        let mut bytes = [0u8; FIXED_HEADER_LEN];
        bytes[0] = 7;
        assert!(matches!(FixedHeader::parse(&bytes), Err(WireError::UnsupportedVersion)));
    }

    #[test]
    fn rejects_header_length_below_eight() {
        let mut bytes = [0u8; FIXED_HEADER_LEN];
        bytes[0] = WIRE_VERSION_V1;
        bytes[7] = 4;
        assert!(matches!(FixedHeader::parse(&bytes), Err(WireError::HeaderTooShort)));
    }

    #[test]
    fn rejects_packet_length_shorter_than_header_length() {
        let mut bytes = [0u8; FIXED_HEADER_LEN];
        bytes[0] = WIRE_VERSION_V1;
        bytes[2..4].copy_from_slice(&4u16.to_be_bytes());
        bytes[7] = 8;
        assert!(matches!(
            FixedHeader::parse(&bytes),
            Err(WireError::PacketShorterThanHeader)
        ));
    }

    #[test]
    fn rejects_buffer_shorter_than_packet_length() {
        let mut bytes = [0u8; FIXED_HEADER_LEN];
        bytes[0] = WIRE_VERSION_V1;
        bytes[2..4].copy_from_slice(&100u16.to_be_bytes());
        bytes[7] = 8;
        assert!(matches!(
            FixedHeader::parse(&bytes),
            Err(WireError::PacketLongerThanBuffer)
        ));
    }
}
