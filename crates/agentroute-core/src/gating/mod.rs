//! Mixture-of-Experts gating
//!
//! Routes pre-computed embeddings to the top-k of a fixed set of experts
//! and learns online from per-decision rewards.
//!
//! # Example
//!
//! ```no_run
//! use agentroute_core::gating::{GatingConfig, GatingNetwork};
//!
//! # fn main() -> agentroute_core::Result<()> {
//! let mut network = GatingNetwork::new(GatingConfig::default())?;
//! let embedding = vec![0.0f32; 384];
//!
//! let result = network.route(&embedding)?;
//! let chosen = result.experts[0].index;
//! // ... run the task with the chosen expert ...
//! network.update_expert_weights(&result, chosen, 1.0);
//! # Ok(())
//! # }
//! ```

pub mod kernel;
pub mod network;
pub mod types;

pub use kernel::{DenseKernel, KernelKind, LaneKernel, ScalarKernel};
pub use network::{GatingConfig, GatingNetwork, GatingParameters, GatingSnapshot};
pub use types::{
    ExpertLoad, ExpertRef, ExpertSelection, ForwardTrace, GatingStats, LoadBalanceReport,
    RoutingResult,
};
