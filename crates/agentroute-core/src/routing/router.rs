//! Q-Learning Router - tabular task routing with online learning
//!
//! This module provides the QLearningRouter that combines:
//! - A deterministic text encoder mapping tasks to discrete states
//! - Epsilon-greedy selection with a decaying exploration rate
//! - Temporal-difference updates with prioritized experience replay
//! - A TTL-bounded cache of exploitative decisions
//! - Periodic snapshots so learning survives restarts

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cache::DecisionCache;
use super::encoder::{FeatureEncoder, StateKey};
use super::engine::RoutingEngine;
use super::metrics::softmax_at;
use super::qtable::{EVICTION_FRACTION, QEntry, QTable};
use super::replay::{Experience, ReplayBuffer};
use super::schedule::{DecaySchedule, ExplorationSchedule};
use super::store::{PersistedModel, SnapshotStore};
use super::types::{ActionSpace, Alternative, DEFAULT_ROUTES, RoutingDecision, clamp_reward};
use crate::error::{Error, Result};

/// Number of runner-up routes reported with each decision
const ALTERNATIVES: usize = 3;

/// Configuration for the Q-learning router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QLearningConfig {
    /// Step size alpha of the TD update
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Discount factor gamma applied to the next state's best value
    #[serde(default = "default_discount_factor")]
    pub discount_factor: f64,
    /// Exploration rate before any learning
    #[serde(default = "default_exploration_initial")]
    pub exploration_initial: f64,
    /// Exploration rate once the decay horizon is reached
    #[serde(default = "default_exploration_final")]
    pub exploration_final: f64,
    /// Number of updates over which exploration decays
    #[serde(default = "default_exploration_decay_steps")]
    pub exploration_decay_steps: u64,
    /// Shape of the decay curve
    #[serde(default)]
    pub exploration_schedule: DecaySchedule,
    /// Table size that triggers eviction of the least recently updated states
    #[serde(default = "default_max_states")]
    pub max_states: usize,
    /// Replay buffer capacity
    #[serde(default = "default_replay_capacity")]
    pub replay_capacity: usize,
    /// Transitions replayed per update once the buffer holds this many
    #[serde(default = "default_replay_batch_size")]
    pub replay_batch_size: usize,
    /// Maximum cached decisions
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// Lifetime of a cached decision in milliseconds
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// Clear the whole decision cache after this many updates
    #[serde(default = "default_cache_invalidation_interval")]
    pub cache_invalidation_interval: u64,
    /// Maximum memoized encodings
    #[serde(default = "default_encoder_cache_size")]
    pub encoder_cache_size: usize,
    /// Snapshot file; `None` keeps the router purely in memory
    #[serde(default)]
    pub persistence_path: Option<PathBuf>,
    /// Snapshot every N updates; 0 disables autosave
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval: u64,
    /// Route names, in index order
    #[serde(default = "default_routes")]
    pub routes: Vec<String>,
}

fn default_learning_rate() -> f64 {
    0.1
}
fn default_discount_factor() -> f64 {
    0.95
}
fn default_exploration_initial() -> f64 {
    1.0
}
fn default_exploration_final() -> f64 {
    0.01
}
fn default_exploration_decay_steps() -> u64 {
    10_000
}
fn default_max_states() -> usize {
    10_000
}
fn default_replay_capacity() -> usize {
    10_000
}
fn default_replay_batch_size() -> usize {
    32
}
fn default_cache_size() -> usize {
    1000
}
fn default_cache_ttl_ms() -> u64 {
    300_000
}
fn default_cache_invalidation_interval() -> u64 {
    100
}
fn default_encoder_cache_size() -> usize {
    1000
}
fn default_autosave_interval() -> u64 {
    100
}
fn default_routes() -> Vec<String> {
    DEFAULT_ROUTES.iter().map(|s| s.to_string()).collect()
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            discount_factor: default_discount_factor(),
            exploration_initial: default_exploration_initial(),
            exploration_final: default_exploration_final(),
            exploration_decay_steps: default_exploration_decay_steps(),
            exploration_schedule: DecaySchedule::default(),
            max_states: default_max_states(),
            replay_capacity: default_replay_capacity(),
            replay_batch_size: default_replay_batch_size(),
            cache_size: default_cache_size(),
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_invalidation_interval: default_cache_invalidation_interval(),
            encoder_cache_size: default_encoder_cache_size(),
            persistence_path: None,
            autosave_interval: default_autosave_interval(),
            routes: default_routes(),
        }
    }
}

impl QLearningConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let finite = [
            self.learning_rate,
            self.discount_factor,
            self.exploration_initial,
            self.exploration_final,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidConfig(
                "learning and exploration rates must be finite".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.discount_factor) {
            return Err(Error::InvalidConfig(format!(
                "discount_factor must be in [0, 1), got {}",
                self.discount_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.exploration_initial)
            || !(0.0..=1.0).contains(&self.exploration_final)
            || self.exploration_final > self.exploration_initial
        {
            return Err(Error::InvalidConfig(format!(
                "exploration rates must satisfy 0 <= final ({}) <= initial ({}) <= 1",
                self.exploration_final, self.exploration_initial
            )));
        }
        if self.max_states == 0 {
            return Err(Error::InvalidConfig("max_states must be positive".to_string()));
        }
        ActionSpace::new(self.routes.iter().cloned())?;
        Ok(())
    }

    fn schedule(&self) -> ExplorationSchedule {
        ExplorationSchedule::new(
            self.exploration_schedule,
            self.exploration_initial,
            self.exploration_final,
            self.exploration_decay_steps,
        )
    }
}

/// Aggregate router statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QLearningStats {
    pub total_routes: u64,
    pub exploration_routes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_updates: u64,
    pub replay_updates: u64,
    pub skipped_updates: u64,
    pub evictions: u64,
    pub cumulative_reward: f64,
    pub total_abs_td_error: f64,
    pub epsilon: f64,
    pub table_size: usize,
    pub replay_size: usize,
}

impl QLearningStats {
    /// Mean |TD error| over direct updates
    pub fn mean_abs_td_error(&self) -> f64 {
        if self.total_updates == 0 {
            return 0.0;
        }
        self.total_abs_td_error / self.total_updates as f64
    }
}

/// Config fields a snapshot depends on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QSnapshotConfig {
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub routes: Vec<String>,
}

/// Persisted Q-table row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub state: StateKey,
    #[serde(flatten)]
    pub entry: QEntry,
}

/// Persisted learned state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QSnapshotParameters {
    pub entries: Vec<PersistedEntry>,
}

/// On-disk form of the Q-learning router
pub type QSnapshot = PersistedModel<QSnapshotConfig, QSnapshotParameters, QLearningStats>;

/// Q-learning router over a fixed set of routes
///
/// Owned by the caller; there is no process-wide instance. Methods take
/// `&mut self`, so sharing one router across tasks means wrapping it in a
/// lock, which also serializes updates to the same state.
pub struct QLearningRouter {
    config: QLearningConfig,
    actions: ActionSpace,
    encoder: FeatureEncoder,
    table: QTable,
    replay: ReplayBuffer,
    cache: DecisionCache,
    schedule: ExplorationSchedule,
    epsilon: f64,
    stats: QLearningStats,
    updates_since_flush: u64,
    rng: ChaCha8Rng,
    store: Option<Arc<SnapshotStore>>,
}

impl QLearningRouter {
    /// Create a router with custom configuration
    pub fn new(config: QLearningConfig) -> Result<Self> {
        QLearningRouterBuilder::new().config(config).build()
    }

    /// Create a router and restore its snapshot, if any
    pub async fn open(config: QLearningConfig) -> Result<Self> {
        QLearningRouterBuilder::new().config(config).open().await
    }

    /// Start a builder
    pub fn builder() -> QLearningRouterBuilder {
        QLearningRouterBuilder::new()
    }

    /// Select a route for a task
    ///
    /// With `explore` set, a uniformly random route is chosen with
    /// probability epsilon. Otherwise the highest-valued route for the
    /// task's state is returned, from the decision cache when possible.
    pub fn route(&mut self, context: &str, explore: bool) -> RoutingDecision {
        let state = self.encoder.encode(context).state;
        self.stats.total_routes += 1;

        if explore && self.rng.r#gen::<f64>() < self.epsilon {
            let action = self.rng.gen_range(0..self.actions.len());
            self.stats.exploration_routes += 1;
            let decision = self.decide(&state, action, true);
            debug!(
                state = %state,
                route = %decision.route,
                epsilon = self.epsilon,
                "Exploratory route"
            );
            return decision;
        }

        if let Some(cached) = self.cache.get(&state) {
            debug!(state = %state, route = %cached.route, "Decision cache hit");
            return cached;
        }

        let q_values = self.table.values(&state);
        let action = argmax(&q_values);
        let decision = self.decide(&state, action, false);
        self.cache.put(state.clone(), decision.clone());

        debug!(
            state = %state,
            route = %decision.route,
            confidence = decision.confidence,
            "Selected route"
        );
        decision
    }

    /// Learn from the reward observed after routing `context` to `action`
    ///
    /// Returns the TD error of the direct update. Unknown routes and
    /// non-finite rewards are ignored with a warning and return 0.
    pub fn update(
        &mut self,
        context: &str,
        action: &str,
        reward: f64,
        next_context: Option<&str>,
    ) -> f64 {
        let Some(action_index) = self.actions.index_of(action) else {
            warn!(route = action, "Ignoring update for unknown route");
            self.stats.skipped_updates += 1;
            return 0.0;
        };
        let Some(reward) = clamp_reward(reward) else {
            warn!(route = action, reward, "Ignoring update with non-finite reward");
            self.stats.skipped_updates += 1;
            return 0.0;
        };

        let state = self.encoder.encode(context).state;
        let next_state = next_context.map(|next| self.encoder.encode(next).state);

        let Some(td_error) = self.learn(&state, action_index, reward, next_state.as_ref(), true)
        else {
            self.stats.skipped_updates += 1;
            return 0.0;
        };

        self.replay
            .push(Experience::new(state.clone(), action_index, reward, next_state));
        self.replay_batch();

        self.stats.total_updates += 1;
        self.stats.cumulative_reward += reward;
        self.stats.total_abs_td_error += td_error.abs();
        self.epsilon = self.schedule.rate(self.stats.total_updates);

        self.cache.invalidate(&state);
        self.updates_since_flush += 1;
        if self.updates_since_flush >= self.config.cache_invalidation_interval {
            self.cache.clear();
            self.updates_since_flush = 0;
            debug!("Decision cache flushed");
        }

        if self.table.len() > self.config.max_states {
            let evicted = self.table.evict_least_recent(EVICTION_FRACTION);
            for key in &evicted {
                self.cache.invalidate(key);
            }
            self.stats.evictions += evicted.len() as u64;
            info!(
                evicted = evicted.len(),
                remaining = self.table.len(),
                "Evicted least recently updated states"
            );
        }

        debug!(
            state = %state,
            route = action,
            reward,
            td_error,
            epsilon = self.epsilon,
            "Applied Q-learning update"
        );

        self.maybe_autosave();
        td_error
    }

    /// Drop every cached decision
    pub fn invalidate_cache(&mut self) {
        self.cache.clear();
        self.updates_since_flush = 0;
    }

    /// Current Q-values for a task's state
    pub fn q_values(&mut self, context: &str) -> Vec<f64> {
        let state = self.encoder.encode(context).state;
        self.table.values(&state)
    }

    /// State key a task maps to
    pub fn state_key(&mut self, context: &str) -> StateKey {
        self.encoder.encode(context).state
    }

    /// Current exploration rate
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Number of states in the table
    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    /// Aggregate statistics
    pub fn stats(&self) -> QLearningStats {
        QLearningStats {
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
            epsilon: self.epsilon,
            table_size: self.table.len(),
            replay_size: self.replay.len(),
            ..self.stats.clone()
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &QLearningConfig {
        &self.config
    }

    /// Write a snapshot; `false` on any persistence failure
    pub async fn save(&self) -> bool {
        let Some(store) = &self.store else {
            debug!("No persistence path configured; save skipped");
            return false;
        };
        let result = match self.snapshot() {
            Ok(snapshot) => store.save(&snapshot, self.stats.total_updates).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(written) => written,
            Err(e) => {
                warn!(
                    path = %store.path().display(),
                    error = %e,
                    code = e.code(),
                    "Failed to save Q-learning snapshot"
                );
                false
            }
        }
    }

    /// Restore the last snapshot; `false` leaves the in-memory state untouched
    pub async fn load(&mut self) -> bool {
        let Some(store) = self.store.clone() else {
            debug!("No persistence path configured; load skipped");
            return false;
        };
        let result = match store.load().await {
            Ok(snapshot) => self.restore(snapshot),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                info!(
                    path = %store.path().display(),
                    states = self.table.len(),
                    updates = self.stats.total_updates,
                    "Restored Q-learning snapshot"
                );
                true
            }
            Err(e) => {
                warn!(
                    path = %store.path().display(),
                    error = %e,
                    code = e.code(),
                    "Could not restore Q-learning snapshot; keeping current state"
                );
                false
            }
        }
    }

    fn decide(&self, state: &StateKey, action: usize, is_exploration: bool) -> RoutingDecision {
        let scores = self.table.values(state);
        let confidence = softmax_at(&scores, action);

        let mut ranked: Vec<usize> = (0..scores.len()).collect();
        ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
        let alternatives = ranked
            .into_iter()
            .filter(|&i| i != action)
            .take(ALTERNATIVES)
            .map(|i| Alternative {
                route: self.actions.name(i).unwrap_or_default().to_string(),
                score: scores[i],
            })
            .collect();

        RoutingDecision {
            route: self.actions.name(action).unwrap_or_default().to_string(),
            action_index: action,
            confidence,
            scores,
            alternatives,
            is_exploration,
            state: state.to_string(),
        }
    }

    fn learn(
        &mut self,
        state: &StateKey,
        action: usize,
        reward: f64,
        next_state: Option<&StateKey>,
        count_visit: bool,
    ) -> Option<f64> {
        let target = match next_state {
            Some(next) => reward + self.config.discount_factor * self.table.max_value(next),
            None => reward,
        };
        self.table
            .td_update(state, action, target, self.config.learning_rate, count_visit)
    }

    fn replay_batch(&mut self) {
        let batch = self.config.replay_batch_size;
        if batch == 0 || self.replay.len() < batch {
            return;
        }
        let indices = self.replay.sample_indices(batch, &mut self.rng);
        for index in indices {
            let Some(exp) = self.replay.get(index).cloned() else {
                continue;
            };
            if let Some(td_error) =
                self.learn(&exp.state, exp.action, exp.reward, exp.next_state.as_ref(), false)
            {
                self.replay.update_priority(index, td_error);
                self.cache.invalidate(&exp.state);
                self.stats.replay_updates += 1;
            }
        }
    }

    fn snapshot(&self) -> Result<QSnapshot> {
        let entries = self
            .table
            .sorted_entries()
            .into_iter()
            .map(|(state, entry)| PersistedEntry { state, entry })
            .collect();
        PersistedModel::new(
            QSnapshotConfig {
                learning_rate: self.config.learning_rate,
                discount_factor: self.config.discount_factor,
                routes: self.actions.names().to_vec(),
            },
            QSnapshotParameters { entries },
            self.stats(),
        )
    }

    fn restore(&mut self, snapshot: QSnapshot) -> Result<()> {
        if snapshot.config.routes != self.actions.names() {
            return Err(Error::SnapshotMismatch(format!(
                "snapshot routes [{}] differ from configured routes [{}]",
                snapshot.config.routes.join(", "),
                self.actions.names().join(", ")
            )));
        }

        let num_actions = self.actions.len();
        let mut entries = std::collections::HashMap::with_capacity(snapshot.parameters.entries.len());
        for persisted in snapshot.parameters.entries {
            let values = &persisted.entry.q_values;
            if values.len() != num_actions || values.iter().any(|v| !v.is_finite()) {
                return Err(Error::CorruptSnapshot(format!(
                    "state {} has an invalid Q-value row",
                    persisted.state
                )));
            }
            entries.insert(persisted.state, persisted.entry);
        }

        self.table.replace(entries);
        if self.table.len() > self.config.max_states {
            let evicted = self.table.evict_least_recent(EVICTION_FRACTION);
            self.stats.evictions += evicted.len() as u64;
        }
        self.stats.total_routes = snapshot.stats.total_routes;
        self.stats.exploration_routes = snapshot.stats.exploration_routes;
        self.stats.total_updates = snapshot.stats.total_updates;
        self.stats.replay_updates = snapshot.stats.replay_updates;
        self.stats.skipped_updates = snapshot.stats.skipped_updates;
        self.stats.evictions = self.stats.evictions.max(snapshot.stats.evictions);
        self.stats.cumulative_reward = snapshot.stats.cumulative_reward;
        self.stats.total_abs_td_error = snapshot.stats.total_abs_td_error;
        self.epsilon = self.schedule.rate(self.stats.total_updates);
        self.invalidate_cache();
        Ok(())
    }

    fn maybe_autosave(&self) {
        let interval = self.config.autosave_interval;
        if interval == 0 || self.stats.total_updates % interval != 0 {
            return;
        }
        let Some(store) = &self.store else {
            return;
        };
        match self.snapshot() {
            Ok(snapshot) => store.spawn_save(snapshot, self.stats.total_updates),
            Err(e) => warn!(error = %e, "Could not build Q-learning snapshot for autosave"),
        }
    }
}

/// Index of the first maximum
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[async_trait]
impl RoutingEngine for QLearningRouter {
    type Task = str;
    type Decision = RoutingDecision;

    fn actions(&self) -> &ActionSpace {
        &self.actions
    }

    fn route(&mut self, task: &str) -> Result<RoutingDecision> {
        Ok(QLearningRouter::route(self, task, true))
    }

    fn reinforce(&mut self, task: &str, decision: &RoutingDecision, reward: f64) -> f64 {
        self.update(task, &decision.route, reward, None)
    }

    async fn save(&self) -> bool {
        QLearningRouter::save(self).await
    }

    async fn load(&mut self) -> bool {
        QLearningRouter::load(self).await
    }
}

/// Builder for QLearningRouter
#[derive(Debug, Default)]
pub struct QLearningRouterBuilder {
    config: QLearningConfig,
    seed: Option<u64>,
}

impl QLearningRouterBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set configuration
    pub fn config(mut self, config: QLearningConfig) -> Self {
        self.config = config;
        self
    }

    /// Set route names
    pub fn routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.routes = routes.into_iter().map(Into::into).collect();
        self
    }

    /// Set snapshot path
    pub fn persistence_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.persistence_path = Some(path.into());
        self
    }

    /// Fix the random seed (for reproducibility in tests)
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the router
    pub fn build(self) -> Result<QLearningRouter> {
        self.config.validate()?;
        let actions = ActionSpace::new(self.config.routes.iter().cloned())?;
        let schedule = self.config.schedule();
        let rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let store = self
            .config
            .persistence_path
            .as_ref()
            .map(|path| Arc::new(SnapshotStore::new(path)));

        Ok(QLearningRouter {
            encoder: FeatureEncoder::new(self.config.encoder_cache_size),
            table: QTable::new(actions.len()),
            replay: ReplayBuffer::new(self.config.replay_capacity),
            cache: DecisionCache::new(
                self.config.cache_size,
                Duration::from_millis(self.config.cache_ttl_ms),
            ),
            epsilon: schedule.rate(0),
            schedule,
            stats: QLearningStats::default(),
            updates_since_flush: 0,
            rng,
            store,
            actions,
            config: self.config,
        })
    }

    /// Build the router and restore its snapshot best-effort
    pub async fn open(self) -> Result<QLearningRouter> {
        let mut router = self.build()?;
        router.load().await;
        Ok(router)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> QLearningRouter {
        QLearningRouter::builder().seed(42).build().unwrap()
    }

    #[test]
    fn test_cold_start_routes_to_first_route() {
        let mut router = router();
        let decision = router.route("implement user authentication", false);

        assert_eq!(decision.route, "coder");
        assert_eq!(decision.action_index, 0);
        assert!(decision.scores.iter().all(|q| *q == 0.0));
        assert!((decision.confidence - 0.125).abs() < 1e-12);
        assert_eq!(decision.alternatives.len(), 3);
        assert_eq!(decision.alternatives[0].route, "tester");
        assert!(!decision.is_exploration);
    }

    #[test]
    fn test_update_moves_q_value() {
        let mut router = router();
        let td = router.update("write unit tests", "tester", 1.0, None);
        assert!((td - 1.0).abs() < 1e-12);
        let q = router.q_values("write unit tests");
        assert!((q[1] - 0.1).abs() < 1e-12);
        assert_eq!(router.table_len(), 1);
    }

    #[test]
    fn test_update_uses_next_state() {
        let mut router = router();
        router.update("deploy the service", "coder", 1.0, None);
        let next_best = router.q_values("deploy the service")[0];

        router.update("plan the release", "architect", 0.0, Some("deploy the service"));
        let q = router.q_values("plan the release")[3];
        let expected = 0.1 * (0.0 + 0.95 * next_best);
        assert!((q - expected).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_route_is_noop() {
        let mut router = router();
        assert_eq!(router.update("anything", "pilot", 1.0, None), 0.0);
        assert_eq!(router.table_len(), 0);
        assert_eq!(router.stats().skipped_updates, 1);
        assert_eq!(router.stats().total_updates, 0);
    }

    #[test]
    fn test_non_finite_reward_is_noop() {
        let mut router = router();
        assert_eq!(router.update("anything", "coder", f64::NAN, None), 0.0);
        assert_eq!(router.table_len(), 0);
    }

    #[test]
    fn test_reward_is_clamped() {
        let mut router = router();
        let td = router.update("audit the login flow", "security", 25.0, None);
        assert!((td - 1.0).abs() < 1e-12);
        assert!(router.stats().cumulative_reward <= 1.0);
    }

    #[test]
    fn test_learned_route_wins() {
        let mut router = router();
        let task = "review the pull request for quality";
        for _ in 0..20 {
            router.update(task, "reviewer", 1.0, None);
        }
        let decision = router.route(task, false);
        assert_eq!(decision.route, "reviewer");
        assert!(decision.confidence > 0.125);
    }

    #[test]
    fn test_exploration_with_full_epsilon() {
        let config = QLearningConfig {
            exploration_initial: 1.0,
            exploration_final: 1.0,
            ..Default::default()
        };
        let mut router = QLearningRouter::builder().config(config).seed(3).build().unwrap();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let decision = router.route("build the api", true);
            assert!(decision.is_exploration);
            seen.insert(decision.route);
        }
        assert!(seen.len() > 4, "expected many routes, saw {:?}", seen);
        assert_eq!(router.stats().exploration_routes, 200);
    }

    #[test]
    fn test_epsilon_decays_with_updates() {
        let config = QLearningConfig {
            exploration_decay_steps: 10,
            exploration_schedule: DecaySchedule::Linear,
            ..Default::default()
        };
        let mut router = QLearningRouter::builder().config(config).seed(1).build().unwrap();
        assert_eq!(router.epsilon(), 1.0);
        for i in 0..10 {
            router.update(&format!("task {i}"), "coder", 0.5, None);
        }
        assert!((router.epsilon() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_cache_hit_on_repeat() {
        let mut router = router();
        let first = router.route("optimize the hot loop", false);
        let second = router.route("optimize the hot loop", false);
        assert_eq!(first, second);
        assert_eq!(router.stats().cache_hits, 1);
    }

    #[test]
    fn test_update_invalidates_cached_state() {
        let mut router = router();
        let task = "document the public api";
        router.route(task, false);
        router.update(task, "documenter", 1.0, None);
        let decision = router.route(task, false);
        assert_eq!(decision.route, "documenter");
        assert_eq!(router.stats().cache_hits, 0);
    }

    #[test]
    fn test_explicit_cache_invalidation() {
        let mut router = router();
        router.route("a task", false);
        router.invalidate_cache();
        router.route("a task", false);
        assert_eq!(router.stats().cache_hits, 0);
        assert_eq!(router.stats().cache_misses, 2);
    }

    #[test]
    fn test_periodic_flush_clears_unrelated_states() {
        let config = QLearningConfig {
            cache_invalidation_interval: 2,
            ..Default::default()
        };
        let mut router = QLearningRouter::builder().config(config).seed(7).build().unwrap();
        let cached = "document the public api";
        let other = "optimize the hot loop";
        assert_ne!(router.state_key(cached), router.state_key(other));

        router.route(cached, false);
        assert_eq!(router.stats().cache_misses, 1);

        router.update(other, "optimizer", 1.0, None);
        router.route(cached, false);
        assert_eq!(router.stats().cache_hits, 1);

        router.update(other, "optimizer", 1.0, None);
        router.route(cached, false);
        assert_eq!(router.stats().cache_hits, 1);
        assert_eq!(router.stats().cache_misses, 2);
    }

    #[test]
    fn test_eviction_drops_cached_decision() {
        let config = QLearningConfig {
            max_states: 10,
            cache_invalidation_interval: 1000,
            ..Default::default()
        };
        let mut router = QLearningRouter::builder().config(config).seed(8).build().unwrap();
        let task = "document the public api";
        router.update(task, "documenter", 1.0, None);
        let warm = router.route(task, false);
        assert!(warm.scores.iter().any(|q| *q > 0.0));

        let mut evicted = false;
        for keyword in crate::routing::encoder::KEYWORDS {
            router.update(keyword, "coder", 1.0, None);
            if router.q_values(task).iter().all(|q| *q == 0.0) {
                evicted = true;
                break;
            }
        }
        assert!(evicted);

        let hits = router.stats().cache_hits;
        let cold = router.route(task, false);
        assert!(cold.scores.iter().all(|q| *q == 0.0));
        assert_eq!(router.stats().cache_hits, hits);
    }

    #[tokio::test]
    async fn test_load_with_garbled_checksum_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.json");
        let mut router = QLearningRouter::builder()
            .persistence_path(&path)
            .build()
            .unwrap();
        router.update("trace the memory leak", "optimizer", 1.0, None);
        assert!(router.save().await);

        let mut value: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        value["checksum"] = serde_json::Value::String("aéééééééééééééé".to_string());
        tokio::fs::write(&path, value.to_string()).await.unwrap();

        let before = router.q_values("trace the memory leak");
        assert!(!router.load().await);
        assert_eq!(router.q_values("trace the memory leak"), before);
    }

    #[test]
    fn test_eviction_bounds_table() {
        let config = QLearningConfig {
            max_states: 10,
            ..Default::default()
        };
        let mut router = QLearningRouter::builder().config(config).seed(5).build().unwrap();
        let tasks: Vec<String> = (0..40)
            .map(|i| format!("{} task number {}", crate::routing::encoder::KEYWORDS[i % 32], i))
            .collect();
        for task in &tasks {
            router.update(task, "coder", 1.0, None);
            assert!(router.table_len() <= 10);
        }
        assert!(router.stats().evictions > 0);
    }

    #[test]
    fn test_replay_kicks_in_at_batch_size() {
        let config = QLearningConfig {
            replay_batch_size: 4,
            ..Default::default()
        };
        let mut router = QLearningRouter::builder().config(config).seed(9).build().unwrap();
        for _ in 0..3 {
            router.update("fix the bug", "coder", 1.0, None);
        }
        assert_eq!(router.stats().replay_updates, 0);
        router.update("fix the bug", "coder", 1.0, None);
        assert_eq!(router.stats().replay_updates, 4);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = QLearningConfig {
            exploration_initial: 0.1,
            exploration_final: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            QLearningRouter::new(config),
            Err(Error::InvalidConfig(_))
        ));

        let config = QLearningConfig {
            discount_factor: 1.0,
            ..Default::default()
        };
        assert!(QLearningRouter::new(config).is_err());

        let err = QLearningRouter::builder().routes(["a", "a"]).build();
        assert!(err.is_err());
    }

    #[test]
    fn test_custom_routes() {
        let mut router = QLearningRouter::builder()
            .routes(["fast", "slow"])
            .seed(1)
            .build()
            .unwrap();
        let decision = router.route("anything", false);
        assert_eq!(decision.scores.len(), 2);
        assert_eq!(decision.alternatives.len(), 1);
        assert_eq!(RoutingEngine::actions(&router).len(), 2);
    }

    #[test]
    fn test_argmax_first_max() {
        assert_eq!(argmax(&[0.0, 0.0, 0.0]), 0);
        assert_eq!(argmax(&[0.0, 2.0, 2.0]), 1);
        assert_eq!(argmax(&[-1.0, -3.0]), 0);
    }

    #[tokio::test]
    async fn test_save_without_path_fails_softly() {
        let mut router = router();
        assert!(!router.save().await);
        assert!(!router.load().await);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.json");
        let mut router = QLearningRouter::builder()
            .persistence_path(&path)
            .seed(11)
            .build()
            .unwrap();
        for _ in 0..5 {
            router.update("investigate flaky test", "tester", 1.0, None);
        }
        assert!(router.save().await);

        let mut restored = QLearningRouter::builder()
            .persistence_path(&path)
            .seed(12)
            .build()
            .unwrap();
        assert!(restored.load().await);
        assert_eq!(
            restored.q_values("investigate flaky test"),
            router.q_values("investigate flaky test")
        );
        assert_eq!(restored.stats().total_updates, 5);
        assert_eq!(restored.epsilon(), router.epsilon());
    }

    #[tokio::test]
    async fn test_restore_rejects_other_routes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.json");
        let mut router = QLearningRouter::builder()
            .persistence_path(&path)
            .build()
            .unwrap();
        router.update("task", "coder", 1.0, None);
        assert!(router.save().await);

        let mut other = QLearningRouter::builder()
            .routes(["alpha", "beta"])
            .persistence_path(&path)
            .build()
            .unwrap();
        assert!(!other.load().await);
        assert_eq!(other.table_len(), 0);
    }
}
