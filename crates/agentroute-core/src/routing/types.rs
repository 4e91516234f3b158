//! Types shared by the routing engines
//!
//! This module defines the action space both engines route over and the
//! decision type returned by the Q-learning router.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Default route names, in index order
pub const DEFAULT_ROUTES: [&str; 8] = [
    "coder",
    "tester",
    "reviewer",
    "architect",
    "researcher",
    "security",
    "optimizer",
    "documenter",
];

/// Lower and upper bound applied to every reward signal
pub const REWARD_RANGE: (f64, f64) = (-1.0, 1.0);

/// A fixed, order-stable set of named routes
///
/// Index `i` always refers to the same name for the lifetime of the space,
/// and snapshots record the names so a restore can verify the mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpace {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl ActionSpace {
    /// Create an action space from an ordered list of names
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(Error::InvalidConfig(
                "action space needs at least one route".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("route {} has an empty name", i)));
            }
            if index.insert(name.clone(), i).is_some() {
                return Err(Error::InvalidConfig(format!("duplicate route name: {}", name)));
            }
        }

        Ok(Self { names, index })
    }

    /// Number of routes
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false; construction rejects empty spaces
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name for an index
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Index for a name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// All names in index order
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Default for ActionSpace {
    fn default() -> Self {
        let names: Vec<String> = DEFAULT_ROUTES.iter().map(|s| s.to_string()).collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self { names, index }
    }
}

/// A ranked runner-up in a routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    /// Route name
    pub route: String,
    /// Raw Q-value for this route
    pub score: f64,
}

/// Result of a Q-learning routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Selected route name
    pub route: String,
    /// Index of the selected route in the action space
    pub action_index: usize,
    /// Softmax probability of the selected route over the Q-value row
    pub confidence: f64,
    /// Q-value for every route, in action-space order
    pub scores: Vec<f64>,
    /// Next best routes by raw Q-value (up to three)
    pub alternatives: Vec<Alternative>,
    /// Whether this was an exploration (vs exploitation) choice
    pub is_exploration: bool,
    /// Discrete state the task text was mapped to
    pub state: String,
}

/// Clamp a reward into [`REWARD_RANGE`]
///
/// Returns `None` for NaN or infinite rewards, which callers treat as a no-op.
pub fn clamp_reward(reward: f64) -> Option<f64> {
    if !reward.is_finite() {
        return None;
    }
    Some(reward.clamp(REWARD_RANGE.0, REWARD_RANGE.1))
}
