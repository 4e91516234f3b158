//! Agentroute Core Library
//!
//! This crate provides the self-learning routing engines of Agentroute:
//! - Task encoding (keyword, length, extension and bigram features)
//! - Q-learning router with prioritized replay and a decision cache
//! - Mixture-of-Experts gating network trained online with REINFORCE
//! - Versioned snapshot persistence with atomic writes
//! - Configuration management

pub mod config;
pub mod error;
pub mod gating;
pub mod routing;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::gating::{GatingConfig, GatingNetwork, RoutingResult};
    pub use crate::routing::{
        ActionSpace, QLearningConfig, QLearningRouter, RoutingDecision, RoutingEngine,
    };
}
