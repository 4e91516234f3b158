//! Common contract of the routing engines
//!
//! Orchestration code can hold either engine behind this trait: ask for a
//! decision, report a reward once the routed task finished, and snapshot
//! or restore learned state.

use async_trait::async_trait;

use super::types::ActionSpace;
use crate::error::Result;

/// A self-learning router over a fixed action space
#[async_trait]
pub trait RoutingEngine: Send + Sync {
    /// Task representation the engine routes on
    type Task: ?Sized + Sync;
    /// Decision returned by [`RoutingEngine::route`]
    type Decision: Send + Sync;

    /// Routes this engine chooses between
    fn actions(&self) -> &ActionSpace;

    /// Produce a routing decision for a task
    fn route(&mut self, task: &Self::Task) -> Result<Self::Decision>;

    /// Feed back the reward observed for a decision
    ///
    /// Returns an engine-specific learning magnitude (TD error or gradient
    /// norm); `0.0` means nothing was learned.
    fn reinforce(&mut self, task: &Self::Task, decision: &Self::Decision, reward: f64) -> f64;

    /// Write a snapshot; `false` on any persistence failure
    async fn save(&self) -> bool;

    /// Restore the last snapshot; `false` leaves the in-memory state untouched
    async fn load(&mut self) -> bool;
}
