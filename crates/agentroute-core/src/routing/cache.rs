//! Decision cache for exploitative routing
//!
//! Stores only non-exploratory decisions, keyed by state. Entries expire
//! after a time-to-live and are evicted least-recently-used beyond the
//! capacity bound.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

use super::encoder::StateKey;
use super::types::RoutingDecision;

#[derive(Debug, Clone)]
struct CachedDecision {
    decision: RoutingDecision,
    inserted_at: Instant,
}

/// Bounded, TTL-limited cache of routing decisions
#[derive(Debug)]
pub struct DecisionCache {
    entries: LruCache<StateKey, CachedDecision>,
    ttl: Duration,
    hits: u64,
    misses: u64,
}

impl DecisionCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a live decision for a state
    pub fn get(&mut self, state: &StateKey) -> Option<RoutingDecision> {
        let expired = match self.entries.get(state) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                self.hits += 1;
                return Some(entry.decision.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.pop(state);
        }
        self.misses += 1;
        None
    }

    /// Store a decision; exploratory decisions are ignored
    pub fn put(&mut self, state: StateKey, decision: RoutingDecision) {
        if decision.is_exploration {
            return;
        }
        self.entries.put(
            state,
            CachedDecision {
                decision,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop the entry for one state
    pub fn invalidate(&mut self, state: &StateKey) {
        self.entries.pop(state);
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
