//! The Pending Interest Table (spec.md §4.3). Entries are keyed by a
//! *matching rule* derived from the Interest's restrictor set; Content
//! Object satisfaction probes strictest-to-loosest and unions the reverse
//! paths of every match.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::message::ConnectionId;
use crate::name::NameId;

pub type Tick = u64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PitKey {
    Name(NameId),
    NameKeyId(NameId, Vec<u8>),
    NameHash(NameId, Vec<u8>),
}

impl PitKey {
    /// The matching rule an Interest populates, per the table in spec.md
    /// §4.3: ContentObjectHash takes precedence over KeyId, which takes
    /// precedence over bare Name.
    pub fn for_interest(name_id: NameId, keyid: Option<&[u8]>, hash: Option<&[u8]>) -> Self {
        if let Some(hash) = hash {
            PitKey::NameHash(name_id, hash.to_vec())
        } else if let Some(keyid) = keyid {
            PitKey::NameKeyId(name_id, keyid.to_vec())
        } else {
            PitKey::Name(name_id)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitVerdict {
    NewEntry,
    Aggregated,
    Retransmit,
}

#[derive(Debug)]
pub struct PitEntry {
    pub name_id: NameId,
    pub reverse_path: HashSet<ConnectionId>,
    pub egress: HashSet<ConnectionId>,
    pub created_tick: Tick,
    pub expiry_tick: Tick,
}

#[derive(Debug, Default)]
pub struct Pit {
    entries: HashMap<PitKey, PitEntry>,
    expiry_index: BTreeMap<Tick, HashSet<PitKey>>,
}

impl Pit {
    pub fn new() -> Self {
        Self::default()
    }

    /// `receiveInterest` (spec.md §4.3). `requested_lifetime` is the
    /// Interest's own lifetime field if present; it is clamped to
    /// `[0, max_lifetime]` and defaults to `default_lifetime` when absent.
    pub fn receive_interest(
        &mut self,
        key: PitKey,
        name_id: NameId,
        ingress: ConnectionId,
        now: Tick,
        requested_lifetime: Option<Tick>,
        default_lifetime: Tick,
        max_lifetime: Tick,
    ) -> PitVerdict {
        if let Some(entry) = self.entries.get_mut(&key) {
            if entry.reverse_path.contains(&ingress) {
                return PitVerdict::Retransmit;
            }
            entry.reverse_path.insert(ingress);
            return PitVerdict::Aggregated;
        }

        let lifetime = requested_lifetime.unwrap_or(default_lifetime).min(max_lifetime);
        let expiry_tick = now + lifetime;
        let entry = PitEntry {
            name_id,
            reverse_path: HashSet::from([ingress]),
            egress: HashSet::new(),
            created_tick: now,
            expiry_tick,
        };
        self.entries.insert(key.clone(), entry);
        self.expiry_index.entry(expiry_tick).or_default().insert(key);
        PitVerdict::NewEntry
    }

    pub fn record_egress(&mut self, key: &PitKey, egress: HashSet<ConnectionId>) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.egress = egress;
        }
    }

    pub fn remove(&mut self, key: &PitKey) -> Option<PitEntry> {
        let entry = self.entries.remove(key)?;
        if let Some(bucket) = self.expiry_index.get_mut(&entry.expiry_tick) {
            bucket.remove(key);
            if bucket.is_empty() {
                self.expiry_index.remove(&entry.expiry_tick);
            }
        }
        Some(entry)
    }

    pub fn get(&self, key: &PitKey) -> Option<&PitEntry> {
        self.entries.get(key)
    }

    /// `receiveContentObject` (spec.md §4.3): probes `(n,h)`, `(n,keyid)`,
    /// `(n)` in that order and removes every entry that matches. Returns
    /// the removed entries themselves (not just the union of their reverse
    /// paths) so the caller can also tell, per entry, which nexthop its
    /// Interest was originally sent on and release that nexthop's
    /// outstanding-load accounting (spec.md §4.6, `Strategy::on_satisfied`).
    pub fn receive_content_object(
        &mut self,
        name_id: NameId,
        keyid: Option<&[u8]>,
        hash: Option<&[u8]>,
    ) -> Vec<PitEntry> {
        let mut candidates = Vec::new();
        if let Some(hash) = hash {
            candidates.push(PitKey::NameHash(name_id, hash.to_vec()));
        }
        if let Some(keyid) = keyid {
            candidates.push(PitKey::NameKeyId(name_id, keyid.to_vec()));
        }
        candidates.push(PitKey::Name(name_id));

        candidates.into_iter().filter_map(|key| self.remove(&key)).collect()
    }

    /// Removes every entry whose expiry tick is at or before `now`. A
    /// single pass over the ordered index, per the "single timer (or a
    /// timing wheel)" design in spec.md §4.3.
    pub fn expire(&mut self, now: Tick) -> Vec<PitKey> {
        let expired_ticks: Vec<Tick> = self.expiry_index.range(..=now).map(|(&tick, _)| tick).collect();
        let mut removed = Vec::new();
        for tick in expired_ticks {
            if let Some(keys) = self.expiry_index.remove(&tick) {
                for key in keys {
                    self.entries.remove(&key);
                    removed.push(key);
                }
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nid(n: u32) -> NameId {
        // NameId has no public constructor; tests go through NameTable in
        // the pipeline-level suite. Here we only need distinct opaque ids,
        // obtained by interning n throwaway names.
        let mut table = crate::name::NameTable::new();
        for i in 0..n {
            table.intern(crate::name::Name::new(vec![crate::name::NameSegment::new(0, vec![i as u8])]));
        }
        table.intern(crate::name::Name::new(vec![crate::name::NameSegment::new(0, vec![n as u8])]))
    }

    #[test]
    fn first_interest_is_a_new_entry_with_nonempty_reverse_path() {
        let mut pit = Pit::new();
        let name_id = nid(0);
        let key = PitKey::for_interest(name_id, None, None);
        let verdict = pit.receive_interest(key.clone(), name_id, 1, 0, None, 4000, 60000);
        assert_eq!(verdict, PitVerdict::NewEntry);
        assert_eq!(pit.get(&key).unwrap().reverse_path, HashSet::from([1]));
    }

    #[test]
    fn second_interest_from_different_connection_aggregates() {
        let mut pit = Pit::new();
        let name_id = nid(0);
        let key = PitKey::for_interest(name_id, None, None);
        pit.receive_interest(key.clone(), name_id, 1, 0, None, 4000, 60000);
        let verdict = pit.receive_interest(key.clone(), name_id, 2, 1, None, 4000, 60000);
        assert_eq!(verdict, PitVerdict::Aggregated);
        assert_eq!(pit.get(&key).unwrap().reverse_path, HashSet::from([1, 2]));
    }

    #[test]
    fn repeat_interest_from_same_connection_is_a_retransmit() {
        let mut pit = Pit::new();
        let name_id = nid(0);
        let key = PitKey::for_interest(name_id, None, None);
        pit.receive_interest(key.clone(), name_id, 1, 0, None, 4000, 60000);
        let verdict = pit.receive_interest(key, name_id, 1, 1, None, 4000, 60000);
        assert_eq!(verdict, PitVerdict::Retransmit);
    }

    #[test]
    fn content_object_satisfaction_unions_reverse_paths_and_removes_entry() {
        let mut pit = Pit::new();
        let name_id = nid(0);
        let key = PitKey::for_interest(name_id, None, None);
        pit.receive_interest(key.clone(), name_id, 1, 0, None, 4000, 60000);
        pit.receive_interest(key, name_id, 2, 1, None, 4000, 60000);

        let satisfied = pit.receive_content_object(name_id, None, None);
        assert_eq!(satisfied.len(), 1);
        assert_eq!(satisfied[0].reverse_path, HashSet::from([1, 2]));
        assert_eq!(pit.len(), 0);
    }

    #[test]
    fn expired_entries_are_removed_by_the_timer_pass() {
        let mut pit = Pit::new();
        let name_id = nid(0);
        let key = PitKey::for_interest(name_id, None, None);
        pit.receive_interest(key, name_id, 1, 0, Some(10), 4000, 60000);

        assert!(pit.expire(5).is_empty());
        let expired = pit.expire(10);
        assert_eq!(expired.len(), 1);
        assert_eq!(pit.len(), 0);
    }
}
