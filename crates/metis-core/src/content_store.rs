//! The in-memory Content Store with LRU eviction (spec.md §4.4). Entries
//! live in a slab-backed intrusive doubly linked list so that
//! "move to head" and "drop the tail" are O(1); three `HashMap` indices
//! point into the same slab, matching the "(name), (name,keyid), (name,hash)"
//! indexing the spec calls for.

use std::collections::HashMap;
use std::sync::Arc;

use crate::message::Message;
use crate::name::NameId;
use crate::pit::Tick;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CsKey {
    Name(NameId),
    NameKeyId(NameId, Vec<u8>),
    NameHash(NameId, Vec<u8>),
}

impl CsKey {
    fn strictest(name_id: NameId, keyid: Option<&[u8]>, hash: Option<&[u8]>) -> Self {
        if let Some(hash) = hash {
            CsKey::NameHash(name_id, hash.to_vec())
        } else if let Some(keyid) = keyid {
            CsKey::NameKeyId(name_id, keyid.to_vec())
        } else {
            CsKey::Name(name_id)
        }
    }
}

pub struct CsEntry {
    pub message: Arc<Message>,
    pub name_id: NameId,
    pub keyid: Option<Vec<u8>>,
    pub hash: Option<Vec<u8>>,
    pub expiry_walltime: Option<u64>,
    pub recommended_cache_time: Option<u64>,
    pub insertion_tick: Tick,
}

struct Node {
    entry: CsEntry,
    key: CsKey,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Capacity-bounded cache indexed by Name (and optional restrictors),
/// ordered intrusively with head = most recently used (spec.md §3, §4.4).
pub struct ContentStore {
    capacity: usize,
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    by_name: HashMap<NameId, usize>,
    by_name_keyid: HashMap<(NameId, Vec<u8>), usize>,
    by_name_hash: HashMap<(NameId, Vec<u8>), usize>,
    cache_serve: bool,
    cache_store: bool,
    len: usize,
}

impl ContentStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            by_name: HashMap::new(),
            by_name_keyid: HashMap::new(),
            by_name_hash: HashMap::new(),
            cache_serve: true,
            cache_store: true,
            len: 0,
        }
    }

    pub fn cache_serve(&self) -> bool {
        self.cache_serve
    }

    pub fn cache_store(&self) -> bool {
        self.cache_store
    }

    pub fn set_cache_serve(&mut self, on: bool) {
        self.cache_serve = on;
    }

    pub fn set_cache_store(&mut self, on: bool) {
        self.cache_store = on;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn index_of(&self, key: &CsKey) -> Option<usize> {
        match key {
            CsKey::Name(id) => self.by_name.get(id).copied(),
            CsKey::NameKeyId(id, keyid) => self.by_name_keyid.get(&(*id, keyid.clone())).copied(),
            CsKey::NameHash(id, hash) => self.by_name_hash.get(&(*id, hash.clone())).copied(),
        }
    }

    fn insert_index(&mut self, key: &CsKey, slot: usize) {
        match key {
            CsKey::Name(id) => {
                self.by_name.insert(*id, slot);
            }
            CsKey::NameKeyId(id, keyid) => {
                self.by_name_keyid.insert((*id, keyid.clone()), slot);
            }
            CsKey::NameHash(id, hash) => {
                self.by_name_hash.insert((*id, hash.clone()), slot);
            }
        }
    }

    fn remove_index(&mut self, key: &CsKey) {
        match key {
            CsKey::Name(id) => {
                self.by_name.remove(id);
            }
            CsKey::NameKeyId(id, keyid) => {
                self.by_name_keyid.remove(&(*id, keyid.clone()));
            }
            CsKey::NameHash(id, hash) => {
                self.by_name_hash.remove(&(*id, hash.clone()));
            }
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let node = self.slots[slot].as_ref().unwrap();
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.slots[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        {
            let node = self.slots[slot].as_mut().unwrap();
            node.prev = None;
            node.next = old_head;
        }
        if let Some(head) = old_head {
            self.slots[head].as_mut().unwrap().prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    fn remove_slot(&mut self, slot: usize) -> CsEntry {
        self.unlink(slot);
        let node = self.slots[slot].take().unwrap();
        self.remove_index(&node.key);
        self.free.push(slot);
        self.len -= 1;
        node.entry
    }

    /// `save` (spec.md §4.4): dedupes an identical-rule entry by replacing
    /// it and moving it to head, otherwise inserts fresh at head and evicts
    /// the tail if capacity is exceeded. Callers must not pass an already
    /// expired object; the Content Store does not re-check on save.
    pub fn save(&mut self, entry: CsEntry) {
        let key = CsKey::strictest(entry.name_id, entry.keyid.as_deref(), entry.hash.as_deref());

        if let Some(slot) = self.index_of(&key) {
            self.remove_slot(slot);
        }

        let slot = if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(Node { entry, key: key.clone(), prev: None, next: None });
            slot
        } else {
            self.slots.push(Some(Node { entry, key: key.clone(), prev: None, next: None }));
            self.slots.len() - 1
        };

        self.insert_index(&key, slot);
        self.push_front(slot);
        self.len += 1;

        if self.len > self.capacity {
            if let Some(tail) = self.tail {
                self.remove_slot(tail);
            }
        }
    }

    /// `fetch` (spec.md §4.4): probes strictest to loosest, skipping any
    /// match whose `expiry_walltime` has passed. On hit, promotes the node
    /// to head.
    pub fn fetch(&mut self, name_id: NameId, keyid: Option<&[u8]>, hash: Option<&[u8]>, now_walltime: u64) -> Option<&Arc<Message>> {
        let mut candidates = Vec::new();
        if let Some(hash) = hash {
            candidates.push(CsKey::NameHash(name_id, hash.to_vec()));
        }
        if let Some(keyid) = keyid {
            candidates.push(CsKey::NameKeyId(name_id, keyid.to_vec()));
        }
        candidates.push(CsKey::Name(name_id));

        for key in candidates {
            if let Some(slot) = self.index_of(&key) {
                let expired = self.slots[slot]
                    .as_ref()
                    .unwrap()
                    .entry
                    .expiry_walltime
                    .is_some_and(|expiry| expiry <= now_walltime);
                if expired {
                    self.remove_slot(slot);
                    continue;
                }
                self.unlink(slot);
                self.push_front(slot);
                return Some(&self.slots[slot].as_ref().unwrap().entry.message);
            }
        }
        None
    }

    /// Evicts all entries atomically (spec.md §4.4).
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.by_name.clear();
        self.by_name_keyid.clear();
        self.by_name_hash.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }
}
