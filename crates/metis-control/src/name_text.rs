//! Textual Name syntax used on the control channel (`add route`, `set
//! strategy`, …): slash-separated generic segments, e.g. `/a/b/c`. This is
//! a control-plane convenience, distinct from the wire-format TLV encoding
//! in `metis-core::message::encode_name` that packets actually carry.

use metis_core::{Name, NameSegment};

/// The CCNx generic name-segment TLV type (spec.md's Name segments carry no
/// distinguished type over the control channel; every segment parses as
/// this one).
const GENERIC_SEGMENT_TYPE: u16 = 0;

pub fn parse(text: &str) -> Option<Name> {
    let trimmed = text.strip_prefix('/').unwrap_or(text);
    if trimmed.is_empty() {
        return Some(Name::new(Vec::new()));
    }
    let segments = trimmed
        .split('/')
        .map(|segment| NameSegment::new(GENERIC_SEGMENT_TYPE, segment.as_bytes().to_vec()))
        .collect();
    Some(Name::new(segments))
}

pub fn format(name: &Name) -> String {
    if name.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for segment in name.segments() {
        out.push('/');
        out.push_str(&String::from_utf8_lossy(&segment.value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_simple_prefix() {
        let name = parse("/a/b/c").unwrap();
        assert_eq!(format(&name), "/a/b/c");
    }

    #[test]
    fn root_name_round_trips() {
        let name = parse("/").unwrap();
        assert!(name.is_empty());
        assert_eq!(format(&name), "/");
    }
}
