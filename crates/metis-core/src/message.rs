//! The reference-counted packet that flows through the pipeline (spec.md
//! §3, "Message"). Sharing is via `Arc`, so the only field ever mutated off
//! the event-loop thread is the refcount itself (spec.md §5, §9).

use std::sync::Arc;

use metis_wire::header::PacketType;
use metis_wire::skeleton::Skeleton;
use metis_wire::tlv::each_tlv16;

use crate::error::{MetisError, MetisResult};
use crate::name::{Name, NameSegment};

pub type ConnectionId = u32;
pub type Tick = u64;

/// Nested name-segment TLV type used to encode a Name's segments inside the
/// wire codec's `MSG_T_NAME` field value. One level of TLV nesting below
/// what `metis-wire` parses, so it lives here rather than in the codec.
pub fn parse_name(bytes: &[u8]) -> MetisResult<Name> {
    let mut segments = Vec::new();
    each_tlv16(bytes, 0, bytes.len(), |segment_type, field| {
        segments.push(NameSegment::new(segment_type, field.slice(bytes).to_vec()));
        Ok(())
    })
    .map_err(MetisError::InvalidPacket)?;
    Ok(Name::new(segments))
}

pub fn encode_name(name: &Name) -> Vec<u8> {
    let mut out = metis_wire::OutputBuffer::new();
    for segment in name.segments() {
        // A write failure here would mean a segment value exceeds u16::MAX
        // bytes, which no caller in this codebase constructs.
        let _ = metis_wire::tlv::write_tlv16(&mut out, segment.segment_type, &segment.value);
    }
    out.into_vec()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Interest,
    ContentObject,
    Control,
    InterestReturn,
}

impl From<PacketType> for MessageKind {
    fn from(packet_type: PacketType) -> Self {
        match packet_type {
            PacketType::Interest => MessageKind::Interest,
            PacketType::ContentObject => MessageKind::ContentObject,
            PacketType::Control => MessageKind::Control,
            PacketType::InterestReturn => MessageKind::InterestReturn,
        }
    }
}

/// A received or locally-built packet: the owning byte buffer plus the
/// skeleton of offsets into it, and the bookkeeping the pipeline needs
/// (arrival tick, ingress connection, schema version).
#[derive(Debug)]
pub struct Message {
    raw: Vec<u8>,
    skeleton: Skeleton,
    /// Only v1 is ever produced by this codebase; v0 is carried as a tag so
    /// legacy test fixtures can still be loaded and rejected deliberately
    /// (spec.md §9, Open Question a).
    schema_version: u8,
    ingress: Option<ConnectionId>,
    arrival_tick: Tick,
}

impl Message {
    pub fn new(raw: Vec<u8>, skeleton: Skeleton, ingress: Option<ConnectionId>, arrival_tick: Tick) -> Self {
        let schema_version = skeleton.header.version;
        Self { raw, skeleton, schema_version, ingress, arrival_tick }
    }

    /// Parses `raw` and wraps it as a shareable `Message`.
    pub fn parse(raw: Vec<u8>, ingress: Option<ConnectionId>, arrival_tick: Tick) -> MetisResult<Arc<Message>> {
        let skeleton = metis_wire::parse_skeleton(&raw).map_err(MetisError::InvalidPacket)?;
        Ok(Arc::new(Message::new(raw, skeleton, ingress, arrival_tick)))
    }

    pub fn kind(&self) -> MessageKind {
        self.skeleton.packet_type().into()
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn schema_version(&self) -> u8 {
        self.schema_version
    }

    pub fn ingress(&self) -> Option<ConnectionId> {
        self.ingress
    }

    pub fn arrival_tick(&self) -> Tick {
        self.arrival_tick
    }

    pub fn hop_limit(&self) -> Option<u8> {
        let field = self.skeleton.hop_limit;
        if field.is_present() {
            Some(field.slice(&self.raw)[0])
        } else {
            None
        }
    }

    /// Builds a copy of this message with its hop-limit byte decremented on
    /// the wire (spec.md §4.1, "Hop limit decrement"). Returns `None` if
    /// this message carries no hop-limit field at all (non-Interest
    /// messages); callers are responsible for not calling this once the
    /// hop limit has already reached zero.
    pub fn decrement_hop_limit(&self) -> Option<Arc<Message>> {
        let field = self.skeleton.hop_limit;
        if !field.is_present() {
            return None;
        }
        let mut raw = self.raw.clone();
        let offset = field.offset as usize;
        raw[offset] = raw[offset].saturating_sub(1);
        Some(Arc::new(Message::new(raw, self.skeleton, self.ingress, self.arrival_tick)))
    }

    pub fn name(&self) -> MetisResult<Option<Name>> {
        let field = self.skeleton.name;
        if !field.is_present() {
            return Ok(None);
        }
        parse_name(field.slice(&self.raw)).map(Some)
    }

    pub fn keyid_restriction(&self) -> Option<&[u8]> {
        let field = self.skeleton.keyid_restriction;
        field.is_present().then(|| field.slice(&self.raw))
    }

    pub fn hash_restriction(&self) -> Option<&[u8]> {
        let field = self.skeleton.hash_restriction;
        field.is_present().then(|| field.slice(&self.raw))
    }

    pub fn payload(&self) -> Option<&[u8]> {
        let field = self.skeleton.payload;
        field.is_present().then(|| field.slice(&self.raw))
    }

    pub fn expiry_time(&self) -> Option<u64> {
        self.skeleton.expiry_time.is_present().then(|| be_u64(self.skeleton.expiry_time.slice(&self.raw)))
    }

    pub fn recommended_cache_time(&self) -> Option<u64> {
        self.skeleton
            .recommended_cache_time
            .is_present()
            .then(|| be_u64(self.skeleton.recommended_cache_time.slice(&self.raw)))
    }

    pub fn interest_lifetime(&self) -> Option<u64> {
        self.skeleton
            .interest_lifetime
            .is_present()
            .then(|| be_u64(self.skeleton.interest_lifetime.slice(&self.raw)))
    }
}

fn be_u64(slice: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = slice.len().min(8);
    buf[8 - n..].copy_from_slice(&slice[slice.len() - n..]);
    u64::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::NameSegment;
    use metis_wire::{build, FieldDict, PacketType};

    #[test]
    fn parses_name_and_payload_from_a_built_interest() {
        let name = Name::new(vec![NameSegment::new(0, b"a".to_vec()), NameSegment::new(0, b"b".to_vec())]);
        let dict = FieldDict {
            packet_type: Some(PacketType::Interest),
            hop_limit: 9,
            name: Some(encode_name(&name)),
            ..Default::default()
        };
        let raw = build(&dict).unwrap();
        let message = Message::parse(raw, Some(1), 42).unwrap();

        assert_eq!(message.kind(), MessageKind::Interest);
        assert_eq!(message.hop_limit(), Some(9));
        assert_eq!(message.name().unwrap(), Some(name));
        assert_eq!(message.ingress(), Some(1));
        assert_eq!(message.arrival_tick(), 42);
    }
}
