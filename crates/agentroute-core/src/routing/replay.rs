//! Prioritized experience replay
//!
//! A fixed-capacity circular buffer of transitions. Sampling draws slots
//! with probability proportional to their stored priority, with
//! replacement.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};

use super::encoder::StateKey;

/// Floor added to every priority so no transition becomes unreachable
pub const PRIORITY_EPSILON: f64 = 0.01;

/// A stored transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state: StateKey,
    pub action: usize,
    pub reward: f64,
    pub next_state: Option<StateKey>,
    pub timestamp: DateTime<Utc>,
    pub priority: f64,
}

impl Experience {
    pub fn new(state: StateKey, action: usize, reward: f64, next_state: Option<StateKey>) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            timestamp: Utc::now(),
            priority: priority_for(reward),
        }
    }
}

/// Priority for a magnitude (reward or TD error)
pub fn priority_for(magnitude: f64) -> f64 {
    if magnitude.is_finite() {
        magnitude.abs() + PRIORITY_EPSILON
    } else {
        PRIORITY_EPSILON
    }
}

/// Circular replay buffer with priority-weighted sampling
#[derive(Debug)]
pub struct ReplayBuffer {
    capacity: usize,
    buffer: Vec<Experience>,
    position: usize,
}

impl ReplayBuffer {
    /// Create new replay buffer
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: Vec::with_capacity(capacity.min(4096)),
            position: 0,
        }
    }

    /// Add experience, overwriting the oldest once full
    pub fn push(&mut self, exp: Experience) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(exp);
        } else {
            self.buffer[self.position] = exp;
        }
        self.position = (self.position + 1) % self.capacity;
    }

    /// Draw `batch_size` slot indices, weighted by priority
    pub fn sample_indices<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<usize> {
        if self.buffer.is_empty() || batch_size == 0 {
            return Vec::new();
        }
        match WeightedIndex::new(self.buffer.iter().map(|e| e.priority)) {
            Ok(dist) => (0..batch_size).map(|_| dist.sample(rng)).collect(),
            // All priorities are floored above zero; fall back to uniform if that ever breaks
            Err(_) => (0..batch_size)
                .map(|_| rng.gen_range(0..self.buffer.len()))
                .collect(),
        }
    }

    /// Experience at a slot
    pub fn get(&self, index: usize) -> Option<&Experience> {
        self.buffer.get(index)
    }

    /// Refresh the priority of a slot from a TD error
    pub fn update_priority(&mut self, index: usize, td_error: f64) {
        if let Some(exp) = self.buffer.get_mut(index) {
            exp.priority = priority_for(td_error);
        }
    }

    /// Get buffer size
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
