use crate::buffer::OutputBuffer;
use crate::error::WireError;
use crate::header::{FixedHeader, PacketType, FIXED_HEADER_LEN};
use crate::tlv::{
    each_tlv16, each_tlv8, write_tlv16, write_tlv8, Field, MSG_T_CPI_PAYLOAD, MSG_T_EXPIRY_TIME,
    MSG_T_HASH_RESTRICTION, MSG_T_INTEREST_LIFETIME, MSG_T_KEYID_RESTRICTION, MSG_T_NAME,
    MSG_T_PAYLOAD, MSG_T_RECOMMENDED_CACHE_TIME, OPT_HEADER_WLDR, VALIDATION_T_ALG,
    VALIDATION_T_PAYLOAD,
};

/// The fixed-shape record of `(offset, length)` pairs produced by wire
/// parsing (spec.md §4.1). References into the owning buffer only; no
/// heap allocation beyond the record itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Skeleton {
    pub header: FixedHeader,
    pub name: Field,
    pub keyid_restriction: Field,
    pub hash_restriction: Field,
    pub payload: Field,
    pub hop_limit: Field,
    pub interest_lifetime: Field,
    pub expiry_time: Field,
    pub recommended_cache_time: Field,
    pub cpi_payload: Field,
    pub validation_alg: Field,
    pub validation_payload: Field,
    pub wldr_header: Field,
}

impl Skeleton {
    pub fn packet_type(&self) -> PacketType {
        self.header.packet_type
    }
}

/// Parses a received byte buffer into a `Skeleton`. Fails with a
/// `WireError` under the exact conditions listed in spec.md §4.1: a
/// truncated/invalid fixed header, a TLV that overruns its container, or a
/// duplicate instance of a field marked unique.
pub fn parse_skeleton(buf: &[u8]) -> Result<Skeleton, WireError> {
    let header = FixedHeader::parse(buf)?;
    let packet_length = header.packet_length as usize;
    let header_length = header.header_length as usize;

    let mut wldr_header = Field::EMPTY;
    let mut seen_wldr = false;
    each_tlv8(buf, FIXED_HEADER_LEN, header_length, |t, field| {
        if t == OPT_HEADER_WLDR {
            if seen_wldr {
                return Err(WireError::DuplicateUniqueField);
            }
            seen_wldr = true;
            wldr_header = field;
        }
        Ok(())
    })?;

    // The message region runs from the end of the optional-headers area to
    // the end of the packet; its own outer TLV length tells us where the
    // validation region, if any, begins.
    if packet_length < header_length + 4 {
        // No room for even an empty message TLV container; legal only when
        // there is genuinely nothing left to parse (e.g. degenerate test
        // fixtures), in which case every remaining field is absent.
        return Ok(Skeleton {
            header,
            name: Field::EMPTY,
            keyid_restriction: Field::EMPTY,
            hash_restriction: Field::EMPTY,
            payload: Field::EMPTY,
            hop_limit: hop_limit_field(&header),
            interest_lifetime: Field::EMPTY,
            expiry_time: Field::EMPTY,
            recommended_cache_time: Field::EMPTY,
            cpi_payload: Field::EMPTY,
            validation_alg: Field::EMPTY,
            validation_payload: Field::EMPTY,
            wldr_header,
        });
    }

    let mut cursor = header_length;
    let msg_type_raw = u16::from_be_bytes([buf[cursor], buf[cursor + 1]]);
    let msg_len = u16::from_be_bytes([buf[cursor + 2], buf[cursor + 3]]) as usize;
    cursor += 4;
    if cursor + msg_len > packet_length {
        return Err(WireError::TlvOverrun);
    }
    if msg_type_raw != header.packet_type.to_wire() as u16 {
        return Err(WireError::MessageTypeMismatch);
    }
    let msg_start = cursor;
    let msg_end = cursor + msg_len;

    let mut name = Field::EMPTY;
    let mut keyid_restriction = Field::EMPTY;
    let mut hash_restriction = Field::EMPTY;
    let mut payload = Field::EMPTY;
    let mut interest_lifetime = Field::EMPTY;
    let mut expiry_time = Field::EMPTY;
    let mut recommended_cache_time = Field::EMPTY;
    let mut cpi_payload = Field::EMPTY;

    macro_rules! set_unique {
        ($slot:expr, $field:expr) => {{
            if $slot.is_present() {
                return Err(WireError::DuplicateUniqueField);
            }
            $slot = $field;
        }};
    }

    each_tlv16(buf, msg_start, msg_end, |t, field| {
        match t {
            MSG_T_NAME => set_unique!(name, field),
            MSG_T_KEYID_RESTRICTION => set_unique!(keyid_restriction, field),
            MSG_T_HASH_RESTRICTION => set_unique!(hash_restriction, field),
            MSG_T_PAYLOAD => set_unique!(payload, field),
            MSG_T_INTEREST_LIFETIME => set_unique!(interest_lifetime, field),
            MSG_T_EXPIRY_TIME => set_unique!(expiry_time, field),
            MSG_T_RECOMMENDED_CACHE_TIME => set_unique!(recommended_cache_time, field),
            MSG_T_CPI_PAYLOAD => set_unique!(cpi_payload, field),
            _ => {}
        }
        Ok(())
    })?;

    let mut validation_alg = Field::EMPTY;
    let mut validation_payload = Field::EMPTY;
    each_tlv16(buf, msg_end, packet_length, |t, field| {
        match t {
            VALIDATION_T_ALG => set_unique!(validation_alg, field),
            VALIDATION_T_PAYLOAD => set_unique!(validation_payload, field),
            _ => {}
        }
        Ok(())
    })?;

    Ok(Skeleton {
        header,
        name,
        keyid_restriction,
        hash_restriction,
        payload,
        hop_limit: hop_limit_field(&header),
        interest_lifetime,
        expiry_time,
        recommended_cache_time,
        cpi_payload,
        validation_alg,
        validation_payload,
        wldr_header,
    })
}

fn hop_limit_field(header: &FixedHeader) -> Field {
    if header.packet_type == PacketType::Interest {
        Field { offset: 4, length: 1 }
    } else {
        Field::EMPTY
    }
}

/// The logical content of a packet, independent of its wire encoding.
/// `build` serializes this into bytes such that
/// `parse_skeleton(&build(dict)?)` yields a `Skeleton` whose fields slice
/// back out to the same values (spec.md §4.1, invariant 5 / spec.md §8).
#[derive(Debug, Clone, Default)]
pub struct FieldDict {
    pub packet_type: Option<PacketType>,
    pub hop_limit: u8,
    pub return_code: u8,
    pub flags: u8,
    pub name: Option<Vec<u8>>,
    pub keyid_restriction: Option<Vec<u8>>,
    pub hash_restriction: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
    pub interest_lifetime: Option<Vec<u8>>,
    pub expiry_time: Option<Vec<u8>>,
    pub recommended_cache_time: Option<Vec<u8>>,
    pub cpi_payload: Option<Vec<u8>>,
    pub validation_alg: Option<Vec<u8>>,
    pub validation_payload: Option<Vec<u8>>,
    pub wldr_header: Option<Vec<u8>>,
}

pub fn build(dict: &FieldDict) -> Result<Vec<u8>, WireError> {
    let packet_type = dict.packet_type.ok_or(WireError::MissingField)?;

    let mut opt_headers = OutputBuffer::new();
    if let Some(wldr) = &dict.wldr_header {
        write_tlv8(&mut opt_headers, OPT_HEADER_WLDR, wldr)?;
    }
    let header_length = FIXED_HEADER_LEN + opt_headers.offset();
    if header_length > u8::MAX as usize {
        return Err(WireError::OutOfMemory);
    }

    let mut message_body = OutputBuffer::new();
    if let Some(name) = &dict.name {
        write_tlv16(&mut message_body, MSG_T_NAME, name)?;
    }
    if let Some(v) = &dict.keyid_restriction {
        write_tlv16(&mut message_body, MSG_T_KEYID_RESTRICTION, v)?;
    }
    if let Some(v) = &dict.hash_restriction {
        write_tlv16(&mut message_body, MSG_T_HASH_RESTRICTION, v)?;
    }
    if let Some(v) = &dict.payload {
        write_tlv16(&mut message_body, MSG_T_PAYLOAD, v)?;
    }
    if let Some(v) = &dict.interest_lifetime {
        write_tlv16(&mut message_body, MSG_T_INTEREST_LIFETIME, v)?;
    }
    if let Some(v) = &dict.expiry_time {
        write_tlv16(&mut message_body, MSG_T_EXPIRY_TIME, v)?;
    }
    if let Some(v) = &dict.recommended_cache_time {
        write_tlv16(&mut message_body, MSG_T_RECOMMENDED_CACHE_TIME, v)?;
    }
    if let Some(v) = &dict.cpi_payload {
        write_tlv16(&mut message_body, MSG_T_CPI_PAYLOAD, v)?;
    }

    let mut validation = OutputBuffer::new();
    if let Some(v) = &dict.validation_alg {
        write_tlv16(&mut validation, VALIDATION_T_ALG, v)?;
    }
    if let Some(v) = &dict.validation_payload {
        write_tlv16(&mut validation, VALIDATION_T_PAYLOAD, v)?;
    }

    let message_tlv_len = 4 + message_body.offset();
    let packet_length = header_length + message_tlv_len + validation.offset();
    if packet_length > u16::MAX as usize {
        return Err(WireError::OutOfMemory);
    }

    let header = FixedHeader {
        version: crate::header::WIRE_VERSION_V1,
        packet_type,
        packet_length: packet_length as u16,
        hop_limit: dict.hop_limit,
        return_code: dict.return_code,
        flags: dict.flags,
        header_length: header_length as u8,
    };

    let mut out = OutputBuffer::with_capacity(packet_length);
    header.write(&mut out)?;
    out.write(opt_headers.as_slice())?;
    out.write_u16(packet_type.to_wire() as u16)?;
    out.write_u16(message_body.offset() as u16)?;
    out.write(message_body.as_slice())?;
    out.write(validation.as_slice())?;

    Ok(out.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interest_dict() -> FieldDict {
        FieldDict {
            packet_type: Some(PacketType::Interest),
            hop_limit: 5,
            name: Some(b"/a/b".to_vec()),
            payload: None,
            validation_alg: Some(vec![0x01]),
            ..Default::default()
        }
    }

    #[test]
    fn round_trip_preserves_every_present_field() {
        let dict = interest_dict();
        let bytes = build(&dict).unwrap();
        let skeleton = parse_skeleton(&bytes).unwrap();

        assert_eq!(skeleton.packet_type(), PacketType::Interest);
        assert_eq!(skeleton.name.slice(&bytes), b"/a/b");
        assert_eq!(skeleton.hop_limit.slice(&bytes), &[5]);
        assert_eq!(skeleton.validation_alg.slice(&bytes), &[0x01]);
        assert!(!skeleton.payload.is_present());
    }

    #[test]
    fn round_trip_with_wldr_header_and_restrictors() {
        let dict = FieldDict {
            packet_type: Some(PacketType::ContentObject),
            name: Some(b"/p".to_vec()),
            hash_restriction: Some(vec![9; 8]),
            keyid_restriction: Some(vec![7; 4]),
            payload: Some(b"payload-bytes".to_vec()),
            expiry_time: Some(100u64.to_be_bytes().to_vec()),
            recommended_cache_time: Some(60u64.to_be_bytes().to_vec()),
            wldr_header: Some(vec![0xAB, 0xCD]),
            ..Default::default()
        };
        let bytes = build(&dict).unwrap();
        let skeleton = parse_skeleton(&bytes).unwrap();

        assert_eq!(skeleton.name.slice(&bytes), b"/p");
        assert_eq!(skeleton.hash_restriction.slice(&bytes), &[9; 8]);
        assert_eq!(skeleton.keyid_restriction.slice(&bytes), &[7; 4]);
        assert_eq!(skeleton.payload.slice(&bytes), b"payload-bytes");
        assert_eq!(skeleton.wldr_header.slice(&bytes), &[0xAB, 0xCD]);
        assert!(!skeleton.hop_limit.is_present());
    }

    #[test]
    fn every_skeleton_field_lies_within_packet_length() {
        let dict = FieldDict {
            packet_type: Some(PacketType::Control),
            cpi_payload: Some(b"add route e0 /a 10".to_vec()),
            ..Default::default()
        };
        let bytes = build(&dict).unwrap();
        let skeleton = parse_skeleton(&bytes).unwrap();
        let packet_length = skeleton.header.packet_length as usize;

        for field in [
            skeleton.name,
            skeleton.keyid_restriction,
            skeleton.hash_restriction,
            skeleton.payload,
            skeleton.interest_lifetime,
            skeleton.expiry_time,
            skeleton.recommended_cache_time,
            skeleton.cpi_payload,
            skeleton.validation_alg,
            skeleton.validation_payload,
        ] {
            let end = field.offset as usize + field.length as usize;
            assert!(end <= packet_length);
        }
    }

    #[test]
    fn rejects_message_tlv_overrunning_packet_length() {
        let mut bytes = build(&interest_dict()).unwrap();
        // Claim a far larger packetLength than the buffer actually holds.
        bytes[2..4].copy_from_slice(&60000u16.to_be_bytes());
        assert!(matches!(parse_skeleton(&bytes), Err(WireError::PacketLongerThanBuffer)));
    }

    #[test]
    fn rejects_duplicate_unique_field() {
        // Hand-build a message body with two Name TLVs.
        let mut message_body = OutputBuffer::new();
        write_tlv16(&mut message_body, MSG_T_NAME, b"/a").unwrap();
        write_tlv16(&mut message_body, MSG_T_NAME, b"/b").unwrap();

        let header_length = FIXED_HEADER_LEN;
        let packet_length = header_length + 4 + message_body.offset();

        let header = FixedHeader {
            version: crate::header::WIRE_VERSION_V1,
            packet_type: PacketType::Interest,
            packet_length: packet_length as u16,
            hop_limit: 1,
            return_code: 0,
            flags: 0,
            header_length: header_length as u8,
        };

        let mut out = OutputBuffer::new();
        header.write(&mut out).unwrap();
        out.write_u16(PacketType::Interest.to_wire() as u16).unwrap();
        out.write_u16(message_body.offset() as u16).unwrap();
        out.write(message_body.as_slice()).unwrap();

        let bytes = out.into_vec();
        assert!(matches!(parse_skeleton(&bytes), Err(WireError::DuplicateUniqueField)));
    }
}
