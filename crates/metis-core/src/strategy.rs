//! Per-FIB-entry forwarding strategies (spec.md §4.6). Dispatch is via a
//! trait object rather than an enum-with-match: the required strategy set
//! is small and fixed, but each carries distinct per-nexthop state, which
//! maps more directly onto a `{lookupNexthops, purgeConnection}` interface
//! than onto a sum type (spec.md §9, first design note offers either; a
//! trait reads closer to the teacher's `Strategy`-shaped interfaces than a
//! match arm carrying mutable per-variant state would).

use std::collections::HashSet;

use rand::seq::IteratorRandom;

use crate::message::ConnectionId;

pub trait Strategy: std::fmt::Debug + Send {
    /// Chooses the egress set for one Interest, given the live nexthops
    /// registered on this strategy's FIB entry and the connection it
    /// arrived on (always excluded from the result).
    fn lookup_nexthops(&mut self, nexthops: &HashSet<ConnectionId>, ingress: ConnectionId) -> HashSet<ConnectionId>;

    /// Called once an Interest has actually been sent on `nexthop`, so
    /// load-tracking strategies can account for it.
    fn on_interest_sent(&mut self, _nexthop: ConnectionId) {}

    /// Called when a Content Object satisfies an Interest that went out on
    /// `nexthop`, so load-tracking strategies can release the slot.
    fn on_satisfied(&mut self, _nexthop: ConnectionId) {}

    /// Drops any per-nexthop state held for a connection being destroyed
    /// (spec.md §4.6, "must be plumbed to strategies").
    fn purge_connection(&mut self, _connection: ConnectionId) {}
}

/// The legacy default: every nexthop except the one the Interest arrived on.
#[derive(Debug, Default)]
pub struct AllStrategy;

impl Strategy for AllStrategy {
    fn lookup_nexthops(&mut self, nexthops: &HashSet<ConnectionId>, ingress: ConnectionId) -> HashSet<ConnectionId> {
        nexthops.iter().copied().filter(|&id| id != ingress).collect()
    }
}

/// Uniformly picks one nexthop other than `ingress`.
#[derive(Debug, Default)]
pub struct RandomStrategy;

impl Strategy for RandomStrategy {
    fn lookup_nexthops(&mut self, nexthops: &HashSet<ConnectionId>, ingress: ConnectionId) -> HashSet<ConnectionId> {
        let mut rng = rand::thread_rng();
        nexthops
            .iter()
            .copied()
            .filter(|&id| id != ingress)
            .choose(&mut rng)
            .into_iter()
            .collect()
    }
}

/// Tracks pending-Interest counts per nexthop and picks the least loaded,
/// breaking ties by round-robin (spec.md §4.6).
#[derive(Debug, Default)]
pub struct LoadBalancerStrategy {
    pending: std::collections::HashMap<ConnectionId, u32>,
    round_robin_cursor: usize,
}

impl Strategy for LoadBalancerStrategy {
    fn lookup_nexthops(&mut self, nexthops: &HashSet<ConnectionId>, ingress: ConnectionId) -> HashSet<ConnectionId> {
        let mut candidates: Vec<ConnectionId> =
            nexthops.iter().copied().filter(|&id| id != ingress).collect();
        candidates.sort_unstable();
        if candidates.is_empty() {
            return HashSet::new();
        }

        let min_pending = candidates.iter().map(|id| self.pending.get(id).copied().unwrap_or(0)).min().unwrap();
        let least_loaded: Vec<ConnectionId> = candidates
            .into_iter()
            .filter(|id| self.pending.get(id).copied().unwrap_or(0) == min_pending)
            .collect();

        let chosen = least_loaded[self.round_robin_cursor % least_loaded.len()];
        self.round_robin_cursor = self.round_robin_cursor.wrapping_add(1);
        HashSet::from([chosen])
    }

    fn on_interest_sent(&mut self, nexthop: ConnectionId) {
        *self.pending.entry(nexthop).or_insert(0) += 1;
    }

    fn on_satisfied(&mut self, nexthop: ConnectionId) {
        if let Some(count) = self.pending.get_mut(&nexthop) {
            *count = count.saturating_sub(1);
        }
    }

    fn purge_connection(&mut self, connection: ConnectionId) {
        self.pending.remove(&connection);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    All,
    Random,
    LoadBalancer,
}

impl StrategyKind {
    pub fn build(self) -> Box<dyn Strategy> {
        match self {
            StrategyKind::All => Box::new(AllStrategy),
            StrategyKind::Random => Box::new(RandomStrategy),
            StrategyKind::LoadBalancer => Box::new(LoadBalancerStrategy::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_strategy_excludes_ingress() {
        let mut strategy = AllStrategy;
        let nexthops = HashSet::from([1, 2, 3]);
        let egress = strategy.lookup_nexthops(&nexthops, 2);
        assert_eq!(egress, HashSet::from([1, 3]));
    }

    #[test]
    fn random_strategy_never_returns_ingress() {
        let mut strategy = RandomStrategy;
        let nexthops = HashSet::from([1, 2]);
        for _ in 0..20 {
            let egress = strategy.lookup_nexthops(&nexthops, 1);
            assert_eq!(egress, HashSet::from([2]));
        }
    }

    #[test]
    fn load_balancer_prefers_least_loaded_nexthop() {
        let mut strategy = LoadBalancerStrategy::default();
        let nexthops = HashSet::from([1, 2]);

        let first = strategy.lookup_nexthops(&nexthops, 0);
        strategy.on_interest_sent(*first.iter().next().unwrap());

        let second = strategy.lookup_nexthops(&nexthops, 0);
        assert_ne!(first, second);
    }

    #[test]
    fn purge_connection_forgets_pending_state() {
        let mut strategy = LoadBalancerStrategy::default();
        strategy.on_interest_sent(1);
        strategy.purge_connection(1);
        assert_eq!(strategy.pending.get(&1), None);
    }

    /// `on_satisfied` must release the outstanding-Interest slot `on_interest_sent`
    /// claimed, so a nexthop that has been satisfied looks no more loaded than
    /// one that was never sent to (spec.md §4.6).
    #[test]
    fn on_satisfied_releases_the_pending_slot_claimed_by_on_interest_sent() {
        let mut strategy = LoadBalancerStrategy::default();
        strategy.on_interest_sent(1);
        assert_eq!(strategy.pending.get(&1).copied(), Some(1));

        strategy.on_satisfied(1);
        assert_eq!(strategy.pending.get(&1).copied(), Some(0));
    }

    #[test]
    fn on_satisfied_on_an_unknown_nexthop_is_a_no_op() {
        let mut strategy = LoadBalancerStrategy::default();
        strategy.on_satisfied(99);
        assert_eq!(strategy.pending.get(&99), None);
    }
}
