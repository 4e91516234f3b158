//! Tabular action-value store
//!
//! One [`QEntry`] per visited state, created lazily on the first update.
//! Reads of unknown states see an all-zero row without inserting it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::encoder::StateKey;

/// Share of the table dropped when the state bound is exceeded
pub const EVICTION_FRACTION: f64 = 0.2;

/// Q-values and bookkeeping for one state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QEntry {
    pub q_values: Vec<f64>,
    pub visits: u64,
    pub updated_at: DateTime<Utc>,
    /// Monotonic update counter, orders entries updated within the same instant
    pub update_seq: u64,
}

impl QEntry {
    fn new(num_actions: usize) -> Self {
        Self {
            q_values: vec![0.0; num_actions],
            visits: 0,
            updated_at: Utc::now(),
            update_seq: 0,
        }
    }
}

/// Map from state to Q-value row
#[derive(Debug, Clone)]
pub(crate) struct QTable {
    entries: HashMap<StateKey, QEntry>,
    num_actions: usize,
    seq: u64,
}

impl QTable {
    pub fn new(num_actions: usize) -> Self {
        Self {
            entries: HashMap::new(),
            num_actions,
            seq: 0,
        }
    }

    /// Q-value row for a state (zeros if never updated)
    pub fn values(&self, state: &StateKey) -> Vec<f64> {
        self.entries
            .get(state)
            .map(|e| e.q_values.clone())
            .unwrap_or_else(|| vec![0.0; self.num_actions])
    }

    /// max_a Q(state, a), 0 for unknown states
    pub fn max_value(&self, state: &StateKey) -> f64 {
        self.entries
            .get(state)
            .map(|e| e.q_values.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    #[cfg(test)]
    pub fn get(&self, state: &StateKey) -> Option<&QEntry> {
        self.entries.get(state)
    }

    /// Move Q(state, action) toward `target` by `alpha`
    ///
    /// Returns the TD error, or `None` when the action is out of range or
    /// the result would not be finite (the entry is left unchanged).
    pub fn td_update(
        &mut self,
        state: &StateKey,
        action: usize,
        target: f64,
        alpha: f64,
        count_visit: bool,
    ) -> Option<f64> {
        if action >= self.num_actions {
            return None;
        }
        let num_actions = self.num_actions;
        let entry = self
            .entries
            .entry(state.clone())
            .or_insert_with(|| QEntry::new(num_actions));

        let current = entry.q_values[action];
        let td_error = target - current;
        let updated = current + alpha * td_error;
        if !updated.is_finite() || !td_error.is_finite() {
            warn!(
                state = %state,
                action,
                target,
                "Rejected non-finite Q-value update"
            );
            return None;
        }

        self.seq += 1;
        entry.q_values[action] = updated;
        if count_visit {
            entry.visits += 1;
        }
        entry.updated_at = Utc::now();
        entry.update_seq = self.seq;
        Some(td_error)
    }

    /// Drop the least-recently-updated `fraction` of entries
    ///
    /// Returns the removed states (at least one when non-empty).
    pub fn evict_least_recent(&mut self, fraction: f64) -> Vec<StateKey> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let count = ((self.entries.len() as f64 * fraction).ceil() as usize)
            .clamp(1, self.entries.len());

        let mut by_age: Vec<(u64, StateKey)> = self
            .entries
            .iter()
            .map(|(k, e)| (e.update_seq, k.clone()))
            .collect();
        by_age.sort_unstable();

        by_age
            .into_iter()
            .take(count)
            .map(|(_, key)| {
                self.entries.remove(&key);
                key
            })
            .collect()
    }

    /// Replace the contents with restored entries
    pub fn replace(&mut self, entries: HashMap<StateKey, QEntry>) {
        self.seq = entries.values().map(|e| e.update_seq).max().unwrap_or(0);
        self.entries = entries;
    }

    /// Entries sorted by state key
    pub fn sorted_entries(&self) -> Vec<(StateKey, QEntry)> {
        let mut entries: Vec<(StateKey, QEntry)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
