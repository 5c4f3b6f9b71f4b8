use crate::buffer::{InputBuffer, OutputBuffer};
use crate::error::WireError;

/// Optional-headers region: 1-byte type, 1-byte length, bounded by the
/// 8-bit `headerLength` field (spec.md §6: "from byte 8 until
/// headerLength").
pub const OPT_HEADER_WLDR: u8 = 0x01;

/// CCNx message body TLV types (inside the outer message container).
pub const MSG_T_NAME: u16 = 0x0000;
pub const MSG_T_PAYLOAD: u16 = 0x0001;
pub const MSG_T_KEYID_RESTRICTION: u16 = 0x0002;
pub const MSG_T_HASH_RESTRICTION: u16 = 0x0003;
pub const MSG_T_INTEREST_LIFETIME: u16 = 0x0004;
pub const MSG_T_EXPIRY_TIME: u16 = 0x0005;
pub const MSG_T_RECOMMENDED_CACHE_TIME: u16 = 0x0006;
pub const MSG_T_CPI_PAYLOAD: u16 = 0x0007;

/// Validation-section TLV types (siblings of the message TLV, spec.md §4.1).
pub const VALIDATION_T_ALG: u16 = 0x0001;
pub const VALIDATION_T_PAYLOAD: u16 = 0x0002;

/// A `(offset, length)` pair into the owning message buffer. Length 0 means
/// the field is absent (spec.md §4.1: "Missing fields carry length 0").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Field {
    pub offset: u16,
    pub length: u16,
}

impl Field {
    pub const EMPTY: Field = Field { offset: 0, length: 0 };

    pub fn is_present(&self) -> bool {
        self.length > 0
    }

    pub fn slice<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        if !self.is_present() {
            return &[];
        }
        &buf[self.offset as usize..(self.offset as usize + self.length as usize)]
    }
}

/// Walks a sequence of 2-byte-type/2-byte-length TLVs inside `[start, end)`
/// of `buf`, invoking `f(type, value_field)` for each. Returns
/// `WireError::TlvOverrun` if any TLV's length would extend past `end`.
pub fn each_tlv16(
    buf: &[u8],
    start: usize,
    end: usize,
    mut f: impl FnMut(u16, Field) -> Result<(), WireError>,
) -> Result<(), WireError> {
    if end > buf.len() || start > end {
        return Err(WireError::TlvOverrun);
    }
    let mut input = InputBuffer::at(buf, start);
    while input.offset() < end {
        if end - input.offset() < 4 {
            return Err(WireError::TlvOverrun);
        }
        let t = input.read_u16()?;
        let l = input.read_u16()?;
        let value_offset = input.offset();
        if value_offset + l as usize > end {
            return Err(WireError::TlvOverrun);
        }
        input.skip(l as usize)?;
        f(t, Field { offset: value_offset as u16, length: l })?;
    }
    Ok(())
}

/// Walks a sequence of 1-byte-type/1-byte-length TLVs (the optional-headers
/// region, which is itself bounded by the 8-bit `headerLength`).
pub fn each_tlv8(
    buf: &[u8],
    start: usize,
    end: usize,
    mut f: impl FnMut(u8, Field) -> Result<(), WireError>,
) -> Result<(), WireError> {
    if end > buf.len() || start > end {
        return Err(WireError::TlvOverrun);
    }
    let mut input = InputBuffer::at(buf, start);
    while input.offset() < end {
        if end - input.offset() < 2 {
            return Err(WireError::TlvOverrun);
        }
        let t = input.read_u8()?;
        let l = input.read_u8()?;
        let value_offset = input.offset();
        if value_offset + l as usize > end {
            return Err(WireError::TlvOverrun);
        }
        input.skip(l as usize)?;
        f(t, Field { offset: value_offset as u16, length: l as u16 })?;
    }
    Ok(())
}

pub fn write_tlv16(out: &mut OutputBuffer, t: u16, value: &[u8]) -> Result<(), WireError> {
    if value.len() > u16::MAX as usize {
        return Err(WireError::OutOfMemory);
    }
    out.write_u16(t)?;
    out.write_u16(value.len() as u16)?;
    out.write(value)?;
    Ok(())
}

pub fn write_tlv8(out: &mut OutputBuffer, t: u8, value: &[u8]) -> Result<(), WireError> {
    if value.len() > u8::MAX as usize {
        return Err(WireError::OutOfMemory);
    }
    out.write_u8(t)?;
    out.write_u8(value.len() as u8)?;
    out.write(value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_tlv16_visits_every_entry_in_order() {
        let mut out = OutputBuffer::new();
        write_tlv16(&mut out, MSG_T_NAME, b"/a/b").unwrap();
        write_tlv16(&mut out, MSG_T_PAYLOAD, b"hello").unwrap();
        let bytes = out.into_vec();

        let mut seen = Vec::new();
        each_tlv16(&bytes, 0, bytes.len(), |t, field| {
            seen.push((t, field.slice(&bytes).to_vec()));
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec![(MSG_T_NAME, b"/a/b".to_vec()), (MSG_T_PAYLOAD, b"hello".to_vec())]);
    }

    #[test]
    fn each_tlv16_rejects_overrun_length() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MSG_T_NAME.to_be_bytes());
        bytes.extend_from_slice(&100u16.to_be_bytes()); // claims 100 bytes but buffer is short
        bytes.extend_from_slice(b"short");

        let result = each_tlv16(&bytes, 0, bytes.len(), |_, _| Ok(()));
        assert!(matches!(result, Err(WireError::TlvOverrun)));
    }
}
