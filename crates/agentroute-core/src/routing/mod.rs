//! Adaptive task routing with online reinforcement learning
//!
//! This module provides tabular task routing that improves from feedback.
//! The key components are:
//!
//! - **Feature Encoder**: Deterministic mapping from task text to a
//!   normalized feature vector and a coarse, hashed state key.
//!
//! - **Q-Learning Router**: Epsilon-greedy selection over a fixed set of
//!   routes, temporal-difference updates, and prioritized experience replay.
//!
//! - **Decision Cache**: LRU + TTL cache of exploitative decisions, dropped
//!   as the values they were derived from change.
//!
//! - **Snapshot Store**: Versioned, checksummed JSON snapshots written
//!   atomically, shared with the gating network.
//!
//! ## How It Works
//!
//! 1. The task text is encoded into a state key
//! 2. With probability epsilon a random route is explored, otherwise the
//!    highest-valued route for the state is returned
//! 3. After the task completes, the caller reports a reward for the route
//! 4. The router updates the state's Q-value, replays past transitions,
//!    decays epsilon, and periodically snapshots itself
//!
//! ## Example
//!
//! ```no_run
//! use agentroute_core::routing::QLearningRouter;
//!
//! # fn main() -> agentroute_core::Result<()> {
//! let mut router = QLearningRouter::builder().build()?;
//!
//! let context = "implement user authentication";
//! let decision = router.route(context, true);
//!
//! // ... dispatch the task to decision.route ...
//!
//! router.update(context, &decision.route, 1.0, None);
//! # Ok(())
//! # }
//! ```

pub(crate) mod cache;
pub mod encoder;
pub mod engine;
pub mod metrics;
pub mod qtable;
pub(crate) mod replay;
pub mod router;
pub mod schedule;
pub mod store;
pub mod types;

pub use encoder::{EncodedTask, FEATURE_DIM, FeatureEncoder, StateKey};
pub use engine::RoutingEngine;
pub use router::{QLearningConfig, QLearningRouter, QLearningRouterBuilder, QLearningStats};
pub use schedule::{DecaySchedule, ExplorationSchedule};
pub use store::{FORMAT_VERSION, PersistedModel, SnapshotStore};
pub use types::{ActionSpace, Alternative, DEFAULT_ROUTES, RoutingDecision};
