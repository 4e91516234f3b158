//! Gating network result and report types

use serde::{Deserialize, Serialize};

/// Reference to an expert by position or by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpertRef {
    Index(usize),
    Name(String),
}

impl From<usize> for ExpertRef {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for ExpertRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ExpertRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// One of the top-k experts chosen for an input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertSelection {
    pub index: usize,
    pub name: String,
    /// Probability renormalized over the selected experts
    pub weight: f32,
    /// Softmax probability over all experts
    pub score: f32,
}

/// Activations of one forward pass, needed for the policy-gradient update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForwardTrace {
    pub(crate) input: Vec<f32>,
    pub(crate) hidden: Vec<f32>,
    pub(crate) probabilities: Vec<f32>,
}

impl ForwardTrace {
    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }
}

/// Output of [`GatingNetwork::route`](super::GatingNetwork::route)
///
/// Pass it back to
/// [`GatingNetwork::update_expert_weights`](super::GatingNetwork::update_expert_weights)
/// once the reward is known. The forward trace is not serialized, so a
/// result that went through serde can no longer be used for learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    /// Top-k experts, highest selection score first
    pub experts: Vec<ExpertSelection>,
    /// Softmax probability of every expert
    pub scores: Vec<f32>,
    /// `N · Σ f_i · p_i` for this routing; 1.0 when perfectly balanced
    pub load_balance_loss: f32,
    /// Entropy of `scores` in nats
    pub entropy: f32,
    #[serde(skip)]
    pub(crate) trace: ForwardTrace,
}

impl RoutingResult {
    /// Index of the highest-ranked selected expert
    pub fn top_expert(&self) -> Option<usize> {
        self.experts.first().map(|e| e.index)
    }

    /// Whether this result still carries its forward pass
    pub fn has_trace(&self) -> bool {
        !self.trace.is_empty()
    }
}

/// Routing count of one expert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertLoad {
    pub name: String,
    pub count: u64,
    pub fraction: f64,
}

/// Distribution of routings across experts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalanceReport {
    pub experts: Vec<ExpertLoad>,
    pub total: u64,
    pub gini: f64,
    pub coefficient_of_variation: f64,
}

/// Aggregate gating statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatingStats {
    pub total_routes: u64,
    pub total_updates: u64,
    pub skipped_updates: u64,
    pub cumulative_reward: f64,
    pub entropy_sum: f64,
    pub kernel: String,
}

impl GatingStats {
    pub fn mean_entropy(&self) -> f64 {
        if self.total_routes == 0 {
            return 0.0;
        }
        self.entropy_sum / self.total_routes as f64
    }
}
