//! Names and the interning arena that hands out `NameId`s for them.
//!
//! Grounded in the teacher's `AddressHash`/`Hash` newtype-over-fixed-array
//! pattern (`reticulum-legacy::hash`): a small, `Copy`, hashable identifier
//! stands in for an expensive-to-compare value everywhere it is used as a
//! table key. Here the arena itself replaces the fixed array, since Names
//! are variable length.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash as StdHash, Hasher};

/// A single typed, length-delimited name component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameSegment {
    pub segment_type: u16,
    pub value: Vec<u8>,
}

impl NameSegment {
    pub fn new(segment_type: u16, value: impl Into<Vec<u8>>) -> Self {
        Self { segment_type, value: value.into() }
    }
}

/// An ordered sequence of typed name segments (spec.md §3, "Name").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Name {
    segments: Vec<NameSegment>,
}

impl Name {
    pub fn new(segments: Vec<NameSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[NameSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// `self` is a prefix of `other` iff `self`'s segments are a prefix of
    /// `other`'s (spec.md §3).
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        if self.segments.len() > other.segments.len() {
            return false;
        }
        self.segments.iter().zip(other.segments.iter()).all(|(a, b)| a == b)
    }

    /// A prefix of `self` truncated to `len` segments.
    pub fn prefix(&self, len: usize) -> Name {
        Name { segments: self.segments[..len.min(self.segments.len())].to_vec() }
    }

    /// Canonical byte encoding used as the interning key: a concatenation of
    /// `(type: u16 BE, length: u16 BE, value)` per segment. Two names encode
    /// identically iff their segment sequences are equal.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for segment in &self.segments {
            out.extend_from_slice(&segment.segment_type.to_be_bytes());
            out.extend_from_slice(&(segment.value.len() as u16).to_be_bytes());
            out.extend_from_slice(&segment.value);
        }
        out
    }

    /// One hash per prefix length, `hash(segments[..1]), hash(segments[..2]),
    /// ...`, supporting longest-prefix probing without re-hashing the whole
    /// name at every candidate length (spec.md §3, "per-prefix-length hash").
    pub fn prefix_hashes(&self) -> Vec<u64> {
        let mut hashes = Vec::with_capacity(self.segments.len());
        let mut hasher = DefaultHasher::new();
        for segment in &self.segments {
            segment.hash(&mut hasher);
            hashes.push(hasher.finish());
        }
        hashes
    }
}

/// An interned Name. Equality and hashing are pointer-speed integer
/// operations; the FIB and PIT key on these, not on raw Name bytes (spec.md
/// §9, "Name ownership & interning").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(u32);

/// Arena mapping canonical byte forms to `NameId`s. Never shrinks: Names
/// live for the process lifetime once referenced by a FIB or PIT entry, so
/// reclaiming ids would only complicate invariants for no benefit at this
/// scale.
#[derive(Debug, Default)]
pub struct NameTable {
    by_bytes: HashMap<Vec<u8>, NameId>,
    names: Vec<Name>,
}

impl NameTable {
    pub fn new() -> Self {
        Self { by_bytes: HashMap::new(), names: Vec::new() }
    }

    pub fn intern(&mut self, name: Name) -> NameId {
        let key = name.canonical_bytes();
        if let Some(&id) = self.by_bytes.get(&key) {
            return id;
        }
        let id = NameId(self.names.len() as u32);
        self.names.push(name);
        self.by_bytes.insert(key, id);
        id
    }

    pub fn resolve(&self, id: NameId) -> &Name {
        &self.names[id.0 as usize]
    }

    pub fn lookup(&self, name: &Name) -> Option<NameId> {
        self.by_bytes.get(&name.canonical_bytes()).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
