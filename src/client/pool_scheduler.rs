//! Pool-of-addresses scheduler (component C, §4.C): a deterministic, seeded
//! cycle generator over the set of candidate server addresses for the
//! Pool-of-Addresses protocol.
//!
//! Conceptually a two-index structure (an ordered set plus an auxiliary
//! socket-address set) collapsed here to a single authoritative `pool`
//! vector; the socket-address set is a derived lookup index rebuilt
//! incrementally as addresses are inserted.

use std::{
    collections::HashSet,
    net::{SocketAddr, SocketAddrV4, SocketAddrV6},
};

use rand::{seq::SliceRandom, SeedableRng};
use rand_pcg::Pcg32;

use crate::error::HarnessError;

/// A dual-stack candidate address, mirroring `QuicIPAddress`: it may carry a
/// v4 projection, a v6 projection, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QuicIpAddress {
    pub v4: Option<SocketAddrV4>,
    pub v6: Option<SocketAddrV6>,
}

impl QuicIpAddress {
    #[must_use]
    pub fn v4_only(addr: SocketAddrV4) -> Self {
        Self {
            v4: Some(addr),
            v6: None,
        }
    }

    #[must_use]
    pub fn v6_only(addr: SocketAddrV6) -> Self {
        Self {
            v4: None,
            v6: Some(addr),
        }
    }

    #[must_use]
    pub fn is_all_zero(&self) -> bool {
        self.v4.is_none() && self.v6.is_none()
    }

    fn socket_addresses(&self) -> impl Iterator<Item = SocketAddr> {
        [self.v4.map(SocketAddr::V4), self.v6.map(SocketAddr::V6)]
            .into_iter()
            .flatten()
    }
}

/// The seeded, restartable cycle over a pool of candidate server addresses.
pub struct PoolScheduler {
    pool: Vec<QuicIpAddress>,
    socket_addresses: HashSet<SocketAddr>,
    current_server_address: QuicIpAddress,
    pending_server_address: QuicIpAddress,
    iterating: bool,
    permutation: Vec<QuicIpAddress>,
    iter_index: usize,
    prng: Pcg32,
}

impl PoolScheduler {
    #[must_use]
    pub fn new(seed: u32) -> Self {
        Self {
            pool: Vec::new(),
            socket_addresses: HashSet::new(),
            current_server_address: QuicIpAddress::default(),
            pending_server_address: QuicIpAddress::default(),
            iterating: false,
            permutation: Vec::new(),
            iter_index: 0,
            prng: Pcg32::seed_from_u64(u64::from(seed)),
        }
    }

    /// Adds `address` to the pool. A no-op for the all-zero address (L3:
    /// inserting the same address twice does not change the cycle length,
    /// since the pool is a deduplicated set in effect).
    pub fn insert(&mut self, address: QuicIpAddress) {
        if address.is_all_zero() {
            return;
        }
        if !self.pool.contains(&address) {
            self.pool.push(address);
        }
        self.socket_addresses.extend(address.socket_addresses());
    }

    #[must_use]
    pub fn contains_address(&self, address: &QuicIpAddress) -> bool {
        self.pool.contains(address)
    }

    #[must_use]
    pub fn contains_socket(&self, address: &SocketAddr) -> bool {
        self.socket_addresses.contains(address)
    }

    /// If not iterating, updates both the current and pending server
    /// address. If a cycle is in progress, only the pending address is
    /// updated; it takes effect on the next cycle.
    pub fn set_current_server_address(&mut self, address: QuicIpAddress) {
        if self.iterating {
            self.pending_server_address = address;
        } else {
            self.current_server_address = address;
            self.pending_server_address = address;
        }
    }

    #[must_use]
    pub fn current_server_address(&self) -> QuicIpAddress {
        self.current_server_address
    }

    /// Discards any in-progress permutation; the next `next()` call starts a
    /// fresh cycle.
    pub fn restart(&mut self) {
        self.iterating = false;
        self.permutation.clear();
        self.iter_index = 0;
    }

    /// Returns the next address in the current cycle, entering a new cycle
    /// lazily if one isn't already in progress.
    ///
    /// # Errors
    /// `InternalError` if the pool is empty and there is no pending or
    /// current server address to seed a cycle with.
    pub fn next(&mut self) -> Result<QuicIpAddress, HarnessError> {
        if !self.iterating {
            self.current_server_address = self.pending_server_address;

            let mut permutation = self.pool.clone();
            if !self.current_server_address.is_all_zero()
                && !self.pool.contains(&self.current_server_address)
            {
                permutation.push(self.current_server_address);
            }

            if permutation.is_empty() {
                return Err(HarnessError::internal(
                    "attempt to iterate through an empty address pool",
                ));
            }

            permutation.shuffle(&mut self.prng);
            self.permutation = permutation;
            self.iter_index = 0;
            self.iterating = true;
        }

        let address = self.permutation[self.iter_index];
        self.iter_index += 1;
        if self.iter_index == self.permutation.len() {
            self.iterating = false;
        }
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> QuicIpAddress {
        QuicIpAddress::v4_only(SocketAddrV4::new(std::net::Ipv4Addr::new(10, 0, 0, 1), port))
    }

    #[test]
    fn next_on_empty_pool_is_internal_error() {
        let mut s = PoolScheduler::new(1);
        assert!(matches!(s.next(), Err(HarnessError::Internal(_))));
    }

    #[test]
    fn cycle_includes_current_server_address_exactly_once() {
        let mut s = PoolScheduler::new(42);
        s.insert(addr(1));
        s.insert(addr(2));
        s.insert(addr(3));
        s.set_current_server_address(addr(4));

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(s.next().unwrap());
        }
        assert_eq!(seen.len(), 4);
        let count_current = seen.iter().filter(|a| **a == addr(4)).count();
        assert_eq!(count_current, 1);

        // Next cycle is also a length-4 permutation of the same set.
        let mut second_cycle = Vec::new();
        for _ in 0..4 {
            second_cycle.push(s.next().unwrap());
        }
        assert_eq!(second_cycle.len(), 4);
    }

    #[test]
    fn deterministic_given_same_seed() {
        let mut a = PoolScheduler::new(42);
        let mut b = PoolScheduler::new(42);
        for s in [&mut a, &mut b] {
            s.insert(addr(1));
            s.insert(addr(2));
            s.insert(addr(3));
            s.set_current_server_address(addr(4));
        }
        let seq_a: Vec<_> = (0..8).map(|_| a.next().unwrap()).collect();
        let seq_b: Vec<_> = (0..8).map(|_| b.next().unwrap()).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn insert_during_cycle_defers_to_next_cycle() {
        let mut s = PoolScheduler::new(7);
        s.insert(addr(1));
        s.insert(addr(2));

        let _first = s.next().unwrap();
        assert!(s.iterating);
        // Insert mid-cycle: must not affect the permutation already drawn.
        s.insert(addr(99));
        let _second = s.next().unwrap();
        assert!(!s.iterating);

        // Now fully consumed the first (pre-insert) cycle of length 2.
        // The next cycle picks up the deferred insert.
        let third_cycle: Vec<_> = (0..3).map(|_| s.next().unwrap()).collect();
        assert!(third_cycle.contains(&addr(99)));
    }

    #[test]
    fn duplicate_insert_does_not_change_cycle_length() {
        let mut s = PoolScheduler::new(7);
        s.insert(addr(1));
        s.insert(addr(1));
        s.insert(addr(2));
        let cycle: Vec<_> = (0..2).map(|_| s.next().unwrap()).collect();
        assert_eq!(cycle.len(), 2);
    }

    #[test]
    fn restart_forces_fresh_permutation_on_next_call() {
        let mut s = PoolScheduler::new(7);
        s.insert(addr(1));
        s.insert(addr(2));
        let _ = s.next().unwrap();
        assert!(s.iterating);
        s.restart();
        assert!(!s.iterating);
        // Starting fresh must still return a full cycle.
        let cycle: Vec<_> = (0..2).map(|_| s.next().unwrap()).collect();
        assert_eq!(cycle.len(), 2);
    }

    #[test]
    fn all_zero_address_is_ignored_on_insert_and_as_current() {
        let mut s = PoolScheduler::new(7);
        s.insert(QuicIpAddress::default());
        assert!(s.pool.is_empty());
        s.insert(addr(1));
        // current stays all-zero (never set), so cycle is just the pool.
        let cycle: Vec<_> = (0..1).map(|_| s.next().unwrap()).collect();
        assert_eq!(cycle, vec![addr(1)]);
    }
}
