//! The Forwarding Information Base: longest-prefix match from a Name to a
//! nexthop set and a Strategy (spec.md §4.2). Entries are keyed by interned
//! `NameId`, per the Name-ownership design note (spec.md §9); lookup walks
//! the queried name's prefixes from longest to shortest and stops at the
//! first one with a live entry.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::message::ConnectionId;
use crate::name::{Name, NameId, NameTable};
use crate::strategy::{Strategy, StrategyKind};

pub struct FibEntry {
    pub nexthops: HashSet<ConnectionId>,
    pub strategy: Box<dyn Strategy>,
}

impl std::fmt::Debug for FibEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FibEntry").field("nexthops", &self.nexthops).finish()
    }
}

#[derive(Debug, Default)]
pub struct Fib {
    entries: HashMap<NameId, FibEntry>,
}

impl Fib {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or extends the entry for `prefix`. A brand-new entry is
    /// given `strategy_kind`'s strategy; an existing entry keeps its
    /// current strategy and just gains the nexthop (changing a strategy is
    /// a separate operation, `set_strategy`).
    pub fn add(
        &mut self,
        name_table: &mut NameTable,
        prefix: Name,
        nexthop: ConnectionId,
        strategy_kind: StrategyKind,
    ) {
        let id = name_table.intern(prefix);
        self.entries
            .entry(id)
            .or_insert_with(|| FibEntry { nexthops: HashSet::new(), strategy: strategy_kind.build() })
            .nexthops
            .insert(nexthop);
    }

    /// Shrinks or deletes the entry for `prefix`. A no-op if no such entry
    /// exists.
    pub fn remove(&mut self, name_table: &NameTable, prefix: &Name, nexthop: ConnectionId) {
        let Some(id) = name_table.lookup(prefix) else { return };
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.nexthops.remove(&nexthop);
            if entry.nexthops.is_empty() {
                self.entries.remove(&id);
            }
        }
    }

    pub fn set_strategy(&mut self, name_table: &NameTable, prefix: &Name, strategy_kind: StrategyKind) -> bool {
        let Some(id) = name_table.lookup(prefix) else { return false };
        let Some(entry) = self.entries.get_mut(&id) else { return false };
        entry.strategy = strategy_kind.build();
        true
    }

    /// Longest-prefix lookup: checks `name` itself, then each shorter
    /// prefix, returning the first one with a live entry.
    pub fn lookup(&self, name_table: &NameTable, name: &Name) -> Option<NameId> {
        for len in (1..=name.len()).rev() {
            let candidate = name.prefix(len);
            if let Some(id) = name_table.lookup(&candidate) {
                if self.entries.contains_key(&id) {
                    return Some(id);
                }
            }
        }
        None
    }

    /// Same longest-prefix lookup as `lookup`, but starting from an already
    /// interned `NameId` (e.g. a PIT entry's queried name) rather than a
    /// borrowed `Name`, resolving it back through `name_table` first.
    pub fn lookup_by_name_id(&self, name_table: &NameTable, name_id: NameId) -> Option<NameId> {
        self.lookup(name_table, name_table.resolve(name_id))
    }

    pub fn entry(&self, id: NameId) -> Option<&FibEntry> {
        self.entries.get(&id)
    }

    pub fn entry_mut(&mut self, id: NameId) -> Option<&mut FibEntry> {
        self.entries.get_mut(&id)
    }

    /// Every live entry, for the control plane's `list routes` (spec.md §6).
    pub fn iter(&self) -> impl Iterator<Item = (NameId, &FibEntry)> {
        self.entries.iter().map(|(&id, entry)| (id, entry))
    }

    /// Removes `connection` from every entry's nexthop set, deleting any
    /// entry left empty, and notifies every remaining entry's strategy so
    /// per-nexthop state is cleaned (spec.md §4.2, §4.6).
    pub fn purge_connection(&mut self, connection: ConnectionId) {
        self.entries.retain(|_, entry| {
            entry.nexthops.remove(&connection);
            entry.strategy.purge_connection(connection);
            !entry.nexthops.is_empty()
        });
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
    use crate::name::NameSegment;

    fn name(segments: &[&str]) -> Name {
        Name::new(segments.iter().map(|s| NameSegment::new(0, s.as_bytes())).collect())
    }

    #[test]
    fn longest_prefix_wins_over_shorter_route() {
        let mut names = NameTable::new();
        let mut fib = Fib::new();
        fib.add(&mut names, name(&["a"]), 1, StrategyKind::All);
        fib.add(&mut names, name(&["a", "b"]), 2, StrategyKind::All);

        let query = name(&["a", "b", "x"]);
        names.intern(query.clone());
        let hit = fib.lookup(&names, &query).unwrap();
        assert!(fib.entry(hit).unwrap().nexthops.contains(&2));

        let query2 = name(&["a", "x"]);
        names.intern(query2.clone());
        let hit2 = fib.lookup(&names, &query2).unwrap();
        assert!(fib.entry(hit2).unwrap().nexthops.contains(&1));
    }

    #[test]
    fn purge_connection_removes_empty_entries() {
        let mut names = NameTable::new();
        let mut fib = Fib::new();
        fib.add(&mut names, name(&["a"]), 1, StrategyKind::All);
        fib.add(&mut names, name(&["a"]), 2, StrategyKind::All);

        fib.purge_connection(1);
        assert_eq!(fib.len(), 1);

        fib.purge_connection(2);
        assert_eq!(fib.len(), 0);
    }
}
