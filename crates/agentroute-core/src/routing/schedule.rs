//! Exploration-rate schedules
//!
//! Every schedule starts at `initial`, reaches `final_rate` at `horizon`
//! steps, stays there afterwards, and never increases in between.

use serde::{Deserialize, Serialize};

/// Steepness of the exponential schedule
const EXP_STEEPNESS: f64 = 5.0;

/// Shape of the epsilon decay curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecaySchedule {
    /// Straight line from initial to final
    Linear,
    /// Fast early decay, rescaled to land exactly on final at the horizon
    #[default]
    Exponential,
    /// Half-cosine annealing
    Cosine,
}

impl std::str::FromStr for DecaySchedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "exponential" | "exp" => Ok(Self::Exponential),
            "cosine" | "cos" => Ok(Self::Cosine),
            _ => Err(format!("Unknown decay schedule: {}", s)),
        }
    }
}

impl std::fmt::Display for DecaySchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Exponential => write!(f, "exponential"),
            Self::Cosine => write!(f, "cosine"),
        }
    }
}

/// Epsilon schedule bound to its endpoints and horizon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExplorationSchedule {
    pub kind: DecaySchedule,
    pub initial: f64,
    pub final_rate: f64,
    pub horizon: u64,
}

impl ExplorationSchedule {
    pub fn new(kind: DecaySchedule, initial: f64, final_rate: f64, horizon: u64) -> Self {
        Self {
            kind,
            initial,
            final_rate,
            horizon,
        }
    }

    /// Exploration rate after `step` learning updates
    pub fn rate(&self, step: u64) -> f64 {
        if self.horizon == 0 || step >= self.horizon {
            return self.final_rate;
        }
        let t = step as f64 / self.horizon as f64;
        let span = self.initial - self.final_rate;
        let fraction = match self.kind {
            DecaySchedule::Linear => 1.0 - t,
            DecaySchedule::Exponential => {
                let floor = (-EXP_STEEPNESS).exp();
                ((-EXP_STEEPNESS * t).exp() - floor) / (1.0 - floor)
            }
            DecaySchedule::Cosine => 0.5 * (1.0 + (std::f64::consts::PI * t).cos()),
        };
        (self.final_rate + span * fraction).clamp(self.final_rate, self.initial)
    }
}
