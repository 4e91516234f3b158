//! Mixture-of-Experts gating network
//!
//! A two-layer dense network maps a fixed-length embedding to a
//! distribution over experts:
//!
//! ```text
//! embedding ─► Linear(input→hidden) ─► ReLU ─► Linear(hidden→experts)
//!           ─► (+ Gaussian noise) ─► softmax(·/T) ─► top-k
//! ```
//!
//! Top-k selection ranks experts by logit plus a per-expert balance bias.
//! The bias is nudged after every routing toward equal cumulative counts,
//! so no expert starves while the network is still learning. Selection
//! weights come from the softmax alone.
//!
//! Learning is single-sample REINFORCE on the forward pass carried by the
//! [`RoutingResult`] the caller hands back.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::kernel::{DenseKernel, KernelKind};
use super::types::{
    ExpertLoad, ExpertRef, ExpertSelection, ForwardTrace, GatingStats, LoadBalanceReport,
    RoutingResult,
};
use crate::error::{Error, Result};
use crate::routing::engine::RoutingEngine;
use crate::routing::metrics::{coefficient_of_variation, entropy, gini, softmax_in_place};
use crate::routing::store::{PersistedModel, SnapshotStore};
use crate::routing::types::{ActionSpace, DEFAULT_ROUTES, clamp_reward};

/// Configuration for the gating network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatingConfig {
    /// Embedding length accepted by `route`
    #[serde(default = "default_input_dim")]
    pub input_dim: usize,
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: usize,
    /// Expert names, in index order
    #[serde(default = "default_experts")]
    pub experts: Vec<String>,
    /// Experts selected per routing
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Softmax temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Policy-gradient step size
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    /// Add Gaussian noise to the logits before selection
    #[serde(default = "default_noise_enabled")]
    pub noise_enabled: bool,
    #[serde(default = "default_noise_std")]
    pub noise_std: f32,
    /// Balance-bias change per routing
    #[serde(default = "default_balance_bias_step")]
    pub balance_bias_step: f32,
    /// Balance bias is kept within ±clamp
    #[serde(default = "default_balance_bias_clamp")]
    pub balance_bias_clamp: f32,
    #[serde(default)]
    pub kernel: KernelKind,
    /// Snapshot file; `None` keeps the network purely in memory
    #[serde(default)]
    pub persistence_path: Option<PathBuf>,
    /// Snapshot every N updates; 0 disables autosave
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval: u64,
}

fn default_input_dim() -> usize {
    384
}
fn default_hidden_dim() -> usize {
    128
}
fn default_experts() -> Vec<String> {
    DEFAULT_ROUTES.iter().map(|s| s.to_string()).collect()
}
fn default_top_k() -> usize {
    2
}
fn default_temperature() -> f32 {
    1.0
}
fn default_learning_rate() -> f32 {
    0.01
}
fn default_noise_enabled() -> bool {
    true
}
fn default_noise_std() -> f32 {
    0.1
}
fn default_balance_bias_step() -> f32 {
    0.01
}
fn default_balance_bias_clamp() -> f32 {
    2.0
}
fn default_autosave_interval() -> u64 {
    50
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            input_dim: default_input_dim(),
            hidden_dim: default_hidden_dim(),
            experts: default_experts(),
            top_k: default_top_k(),
            temperature: default_temperature(),
            learning_rate: default_learning_rate(),
            noise_enabled: default_noise_enabled(),
            noise_std: default_noise_std(),
            balance_bias_step: default_balance_bias_step(),
            balance_bias_clamp: default_balance_bias_clamp(),
            kernel: KernelKind::default(),
            persistence_path: None,
            autosave_interval: default_autosave_interval(),
        }
    }
}

impl GatingConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 || self.hidden_dim == 0 {
            return Err(Error::InvalidConfig(
                "input_dim and hidden_dim must be positive".to_string(),
            ));
        }
        let experts = ActionSpace::new(self.experts.iter().cloned())?;
        if self.top_k == 0 || self.top_k > experts.len() {
            return Err(Error::InvalidConfig(format!(
                "top_k must be in 1..={}, got {}",
                experts.len(),
                self.top_k
            )));
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "temperature must be positive, got {}",
                self.temperature
            )));
        }
        let non_negative = [
            ("learning_rate", self.learning_rate),
            ("noise_std", self.noise_std),
            ("balance_bias_step", self.balance_bias_step),
            ("balance_bias_clamp", self.balance_bias_clamp),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Learned weights in nested-array form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatingParameters {
    /// hidden × input
    pub w1: Vec<Vec<f32>>,
    pub b1: Vec<f32>,
    /// experts × hidden
    pub w2: Vec<Vec<f32>>,
    pub b2: Vec<f32>,
    pub balance_bias: Vec<f32>,
    pub expert_counts: Vec<u64>,
}

/// Config fields a gating snapshot depends on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatingSnapshotConfig {
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub experts: Vec<String>,
    pub temperature: f32,
    pub learning_rate: f32,
}

/// On-disk form of the gating network
pub type GatingSnapshot = PersistedModel<GatingSnapshotConfig, GatingParameters, GatingStats>;

/// Row-major weights of both layers
#[derive(Debug, Clone, PartialEq)]
struct Layers {
    w1: Vec<f32>,
    b1: Vec<f32>,
    w2: Vec<f32>,
    b2: Vec<f32>,
}

impl Layers {
    fn xavier<R: Rng>(input: usize, hidden: usize, experts: usize, rng: &mut R) -> Self {
        Self {
            w1: xavier_matrix(hidden, input, rng),
            b1: vec![0.0; hidden],
            w2: xavier_matrix(experts, hidden, rng),
            b2: vec![0.0; experts],
        }
    }

    fn forward(
        &self,
        kernel: &dyn DenseKernel,
        input: &[f32],
        hidden: &mut [f32],
        logits: &mut [f32],
    ) {
        kernel.affine(&self.w1, &self.b1, input, hidden);
        hidden.iter_mut().for_each(|h| *h = h.max(0.0));
        kernel.affine(&self.w2, &self.b2, hidden, logits);
    }
}

/// Glorot-scaled Gaussian matrix
fn xavier_matrix<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Vec<f32> {
    let std = (2.0 / (rows + cols) as f64).sqrt();
    (0..rows * cols)
        .map(|_| (box_muller(rng) * std) as f32)
        .collect()
}

/// Standard normal sample from two uniforms
fn box_muller<R: Rng>(rng: &mut R) -> f64 {
    // 1 - u keeps the log argument in (0, 1]
    let u1 = 1.0 - rng.r#gen::<f64>();
    let u2 = rng.r#gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Preallocated per-call buffers
#[derive(Debug)]
struct Scratch {
    hidden: Vec<f32>,
    logits: Vec<f32>,
    probabilities: Vec<f32>,
    output_grad: Vec<f32>,
    hidden_grad: Vec<f32>,
}

impl Scratch {
    fn new(hidden: usize, experts: usize) -> Self {
        Self {
            hidden: vec![0.0; hidden],
            logits: vec![0.0; experts],
            probabilities: vec![0.0; experts],
            output_grad: vec![0.0; experts],
            hidden_grad: vec![0.0; hidden],
        }
    }
}

/// Online-trained MoE gating network
pub struct GatingNetwork {
    config: GatingConfig,
    experts: ActionSpace,
    layers: Layers,
    balance_bias: Vec<f32>,
    counts: Vec<u64>,
    scratch: Scratch,
    kernel: Arc<dyn DenseKernel>,
    noise: Option<Normal<f32>>,
    rng: ChaCha8Rng,
    stats: GatingStats,
    store: Option<Arc<SnapshotStore>>,
}

impl std::fmt::Debug for GatingNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatingNetwork")
            .field("input_dim", &self.config.input_dim)
            .field("hidden_dim", &self.config.hidden_dim)
            .field("experts", &self.experts.names())
            .field("kernel", &self.kernel.name())
            .finish()
    }
}

impl GatingNetwork {
    /// Create a network with freshly initialized weights
    pub fn new(config: GatingConfig) -> Result<Self> {
        Self::with_rng(config, ChaCha8Rng::from_entropy())
    }

    /// Create a network with reproducible initialization and noise
    pub fn with_seed(config: GatingConfig, seed: u64) -> Result<Self> {
        Self::with_rng(config, ChaCha8Rng::seed_from_u64(seed))
    }

    /// Create a network and restore its snapshot, if any
    pub async fn open(config: GatingConfig) -> Result<Self> {
        let mut network = Self::new(config)?;
        network.load().await;
        Ok(network)
    }

    fn with_rng(config: GatingConfig, mut rng: ChaCha8Rng) -> Result<Self> {
        config.validate()?;
        let experts = ActionSpace::new(config.experts.iter().cloned())?;
        let n = experts.len();

        let noise = if config.noise_enabled && config.noise_std > 0.0 {
            Some(Normal::new(0.0, config.noise_std).map_err(|e| {
                Error::InvalidConfig(format!("noise_std {}: {}", config.noise_std, e))
            })?)
        } else {
            None
        };

        let kernel = config.kernel.build();
        let layers = Layers::xavier(config.input_dim, config.hidden_dim, n, &mut rng);
        let store = config
            .persistence_path
            .as_ref()
            .map(|path| Arc::new(SnapshotStore::new(path)));

        info!(
            input_dim = config.input_dim,
            hidden_dim = config.hidden_dim,
            experts = n,
            top_k = config.top_k,
            kernel = kernel.name(),
            "Initialized gating network"
        );

        Ok(Self {
            scratch: Scratch::new(config.hidden_dim, n),
            balance_bias: vec![0.0; n],
            counts: vec![0; n],
            stats: GatingStats {
                kernel: kernel.name().to_string(),
                ..Default::default()
            },
            layers,
            kernel,
            noise,
            rng,
            store,
            experts,
            config,
        })
    }

    /// Route an embedding to its top-k experts
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] when the embedding length differs from
    /// `input_dim`; [`Error::InvalidInput`] when it holds non-finite values.
    pub fn route(&mut self, embedding: &[f32]) -> Result<RoutingResult> {
        self.check_input(embedding)?;

        let scratch = &mut self.scratch;
        self.layers.forward(
            self.kernel.as_ref(),
            embedding,
            &mut scratch.hidden,
            &mut scratch.logits,
        );
        if let Some(noise) = &self.noise {
            for logit in scratch.logits.iter_mut() {
                *logit += noise.sample(&mut self.rng);
            }
        }
        if scratch.logits.iter().any(|l| !l.is_finite()) {
            return Err(Error::InvalidInput(
                "forward pass produced non-finite logits".to_string(),
            ));
        }
        scratch.probabilities.copy_from_slice(&scratch.logits);
        softmax_in_place(&mut scratch.probabilities, self.config.temperature);

        let selected = self.select_top_k();
        let probabilities = self.scratch.probabilities.clone();
        let k = selected.len();
        let mass: f32 = selected.iter().map(|&j| probabilities[j]).sum();
        let experts: Vec<ExpertSelection> = selected
            .iter()
            .map(|&j| ExpertSelection {
                index: j,
                name: self.experts.name(j).unwrap_or_default().to_string(),
                weight: if mass > 0.0 && mass.is_finite() {
                    probabilities[j] / mass
                } else {
                    1.0 / k as f32
                },
                score: probabilities[j],
            })
            .collect();

        let n = self.experts.len() as f32;
        let load_balance_loss = n * mass / k as f32;
        let entropy = entropy(&probabilities);

        for &j in &selected {
            self.counts[j] += 1;
        }
        self.rebalance();

        self.stats.total_routes += 1;
        self.stats.entropy_sum += entropy as f64;

        debug!(
            experts = ?experts.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            entropy,
            load_balance_loss,
            "Routed embedding"
        );

        Ok(RoutingResult {
            experts,
            scores: probabilities.clone(),
            load_balance_loss,
            entropy,
            trace: ForwardTrace {
                input: embedding.to_vec(),
                hidden: self.scratch.hidden.clone(),
                probabilities,
            },
        })
    }

    /// Noise-free expert probabilities, without selection or counting
    pub fn score(&self, embedding: &[f32]) -> Result<Vec<f32>> {
        self.check_input(embedding)?;
        let mut hidden = vec![0.0; self.config.hidden_dim];
        let mut probabilities = vec![0.0; self.experts.len()];
        self.layers
            .forward(self.kernel.as_ref(), embedding, &mut hidden, &mut probabilities);
        softmax_in_place(&mut probabilities, self.config.temperature);
        Ok(probabilities)
    }

    /// REINFORCE update toward (or away from) the chosen expert
    ///
    /// `result` must come from [`route`](Self::route) on this network. The
    /// reward is clamped to [-1, 1]. Returns the L2 norm of the output-layer
    /// gradient; 0 when nothing was learned.
    pub fn update_expert_weights(
        &mut self,
        result: &RoutingResult,
        expert: impl Into<ExpertRef>,
        reward: f64,
    ) -> f32 {
        let expert: ExpertRef = expert.into();
        let Some(selected) = self.resolve(&expert) else {
            warn!(expert = ?expert, "Ignoring update for unknown expert");
            self.stats.skipped_updates += 1;
            return 0.0;
        };
        let Some(reward) = clamp_reward(reward) else {
            warn!(reward, "Ignoring update with non-finite reward");
            self.stats.skipped_updates += 1;
            return 0.0;
        };
        if !self.trace_matches(&result.trace) {
            warn!(
                expert = selected,
                "No usable forward pass for this result; route() first and pass its result back"
            );
            self.stats.skipped_updates += 1;
            return 0.0;
        }

        let trace = &result.trace;
        let r = reward as f32;
        let lr = self.config.learning_rate;
        let temperature = self.config.temperature;
        let scratch = &mut self.scratch;

        // d log p_sel / d logit_j = (1[j = sel] - p_j) / T
        for (j, g) in scratch.output_grad.iter_mut().enumerate() {
            let indicator = if j == selected { 1.0 } else { 0.0 };
            *g = r * (indicator - trace.probabilities[j]) / temperature;
        }

        // Hidden gradient must see W2 before its update
        self.kernel
            .transpose_mul(&self.layers.w2, &scratch.output_grad, &mut scratch.hidden_grad);
        for (dh, h) in scratch.hidden_grad.iter_mut().zip(&trace.hidden) {
            if *h <= 0.0 {
                *dh = 0.0;
            }
        }

        if scratch
            .output_grad
            .iter()
            .chain(&scratch.hidden_grad)
            .any(|g| !g.is_finite())
        {
            warn!(expert = selected, "Rejected non-finite gradient");
            self.stats.skipped_updates += 1;
            return 0.0;
        }

        self.kernel
            .rank_one_update(&mut self.layers.w2, &scratch.output_grad, &trace.hidden, lr);
        for (b, g) in self.layers.b2.iter_mut().zip(&scratch.output_grad) {
            *b += lr * g;
        }
        self.kernel
            .rank_one_update(&mut self.layers.w1, &scratch.hidden_grad, &trace.input, lr);
        for (b, g) in self.layers.b1.iter_mut().zip(&scratch.hidden_grad) {
            *b += lr * g;
        }

        let grad_norm = scratch.output_grad.iter().map(|g| g * g).sum::<f32>().sqrt();
        self.stats.total_updates += 1;
        self.stats.cumulative_reward += reward;

        debug!(
            expert = self.experts.name(selected).unwrap_or_default(),
            reward,
            grad_norm,
            "Applied policy-gradient update"
        );

        self.maybe_autosave();
        grad_norm
    }

    /// Routing counts and their dispersion
    pub fn load_balance(&self) -> LoadBalanceReport {
        let total: u64 = self.counts.iter().sum();
        let experts = self
            .counts
            .iter()
            .enumerate()
            .map(|(j, &count)| ExpertLoad {
                name: self.experts.name(j).unwrap_or_default().to_string(),
                count,
                fraction: if total == 0 {
                    0.0
                } else {
                    count as f64 / total as f64
                },
            })
            .collect();
        LoadBalanceReport {
            experts,
            total,
            gini: gini(&self.counts),
            coefficient_of_variation: coefficient_of_variation(&self.counts),
        }
    }

    /// Current weights in nested-array form
    pub fn parameters(&self) -> GatingParameters {
        let input = self.config.input_dim;
        let hidden = self.config.hidden_dim;
        GatingParameters {
            w1: self.layers.w1.chunks(input).map(<[f32]>::to_vec).collect(),
            b1: self.layers.b1.clone(),
            w2: self.layers.w2.chunks(hidden).map(<[f32]>::to_vec).collect(),
            b2: self.layers.b2.clone(),
            balance_bias: self.balance_bias.clone(),
            expert_counts: self.counts.clone(),
        }
    }

    /// Expert names
    pub fn experts(&self) -> &ActionSpace {
        &self.experts
    }

    /// Aggregate statistics
    pub fn stats(&self) -> GatingStats {
        self.stats.clone()
    }

    /// Get the current configuration
    pub fn config(&self) -> &GatingConfig {
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
                    "Failed to save gating snapshot"
                );
                false
            }
        }
    }

    /// Restore the last snapshot; `false` leaves the current weights untouched
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
                    updates = self.stats.total_updates,
                    "Restored gating snapshot"
                );
                true
            }
            Err(e) => {
                warn!(
                    path = %store.path().display(),
                    error = %e,
                    code = e.code(),
                    "Could not restore gating snapshot; keeping current weights"
                );
                false
            }
        }
    }

    fn check_input(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.config.input_dim {
            return Err(Error::DimensionMismatch {
                expected: self.config.input_dim,
                actual: embedding.len(),
            });
        }
        if let Some(i) = embedding.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "value at index {} is not finite",
                i
            )));
        }
        Ok(())
    }

    /// Top-k by biased, temperature-scaled logit; ties go to the lower index
    fn select_top_k(&self) -> Vec<usize> {
        let t = self.config.temperature;
        let key = |j: usize| self.scratch.logits[j] / t + self.balance_bias[j];
        let mut order: Vec<usize> = (0..self.experts.len()).collect();
        order.sort_by(|&a, &b| key(b).total_cmp(&key(a)).then(a.cmp(&b)));
        order.truncate(self.config.top_k);
        order
    }

    /// Move each expert's bias toward the mean routing count
    fn rebalance(&mut self) {
        let step = self.config.balance_bias_step;
        if step == 0.0 {
            return;
        }
        let clamp = self.config.balance_bias_clamp;
        let mean = self.counts.iter().sum::<u64>() as f64 / self.counts.len() as f64;
        for (bias, &count) in self.balance_bias.iter_mut().zip(&self.counts) {
            let count = count as f64;
            if count < mean {
                *bias = (*bias + step).min(clamp);
            } else if count > mean {
                *bias = (*bias - step).max(-clamp);
            }
        }
    }

    fn resolve(&self, expert: &ExpertRef) -> Option<usize> {
        match expert {
            ExpertRef::Index(i) if *i < self.experts.len() => Some(*i),
            ExpertRef::Index(_) => None,
            ExpertRef::Name(name) => self.experts.index_of(name),
        }
    }

    fn trace_matches(&self, trace: &ForwardTrace) -> bool {
        trace.input.len() == self.config.input_dim
            && trace.hidden.len() == self.config.hidden_dim
            && trace.probabilities.len() == self.experts.len()
    }

    fn snapshot(&self) -> Result<GatingSnapshot> {
        PersistedModel::new(
            GatingSnapshotConfig {
                input_dim: self.config.input_dim,
                hidden_dim: self.config.hidden_dim,
                experts: self.experts.names().to_vec(),
                temperature: self.config.temperature,
                learning_rate: self.config.learning_rate,
            },
            self.parameters(),
            self.stats(),
        )
    }

    fn restore(&mut self, snapshot: GatingSnapshot) -> Result<()> {
        let config = &snapshot.config;
        if config.input_dim != self.config.input_dim
            || config.hidden_dim != self.config.hidden_dim
            || config.experts != self.experts.names()
        {
            return Err(Error::SnapshotMismatch(format!(
                "snapshot shape {}x{}x[{}] differs from configured {}x{}x[{}]",
                config.input_dim,
                config.hidden_dim,
                config.experts.join(", "),
                self.config.input_dim,
                self.config.hidden_dim,
                self.experts.names().join(", ")
            )));
        }

        let n = self.experts.len();
        let (input, hidden) = (self.config.input_dim, self.config.hidden_dim);
        let params = snapshot.parameters;
        let layers = Layers {
            w1: flatten("w1", &params.w1, hidden, input)?,
            b1: checked("b1", params.b1, hidden)?,
            w2: flatten("w2", &params.w2, n, hidden)?,
            b2: checked("b2", params.b2, n)?,
        };
        let balance_bias = checked("balance_bias", params.balance_bias, n)?;
        if params.expert_counts.len() != n {
            return Err(Error::CorruptSnapshot(format!(
                "expert_counts has {} entries, expected {}",
                params.expert_counts.len(),
                n
            )));
        }

        self.layers = layers;
        self.balance_bias = balance_bias;
        self.counts = params.expert_counts;
        self.stats = GatingStats {
            kernel: self.kernel.name().to_string(),
            ..snapshot.stats
        };
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
            Err(e) => warn!(error = %e, "Could not build gating snapshot for autosave"),
        }
    }
}

fn flatten(name: &str, rows: &[Vec<f32>], expected_rows: usize, cols: usize) -> Result<Vec<f32>> {
    if rows.len() != expected_rows || rows.iter().any(|r| r.len() != cols) {
        return Err(Error::CorruptSnapshot(format!(
            "{} is not a {}x{} matrix",
            name, expected_rows, cols
        )));
    }
    checked(name, rows.concat(), expected_rows * cols)
}

fn checked(name: &str, values: Vec<f32>, len: usize) -> Result<Vec<f32>> {
    if values.len() != len {
        return Err(Error::CorruptSnapshot(format!(
            "{} has {} values, expected {}",
            name,
            values.len(),
            len
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(Error::CorruptSnapshot(format!("{} holds non-finite values", name)));
    }
    Ok(values)
}

#[async_trait]
impl RoutingEngine for GatingNetwork {
    type Task = [f32];
    type Decision = RoutingResult;

    fn actions(&self) -> &ActionSpace {
        &self.experts
    }

    fn route(&mut self, task: &[f32]) -> Result<RoutingResult> {
        GatingNetwork::route(self, task)
    }

    fn reinforce(&mut self, _task: &[f32], decision: &RoutingResult, reward: f64) -> f64 {
        match decision.top_expert() {
            Some(expert) => self.update_expert_weights(decision, expert, reward) as f64,
            None => 0.0,
        }
    }

    async fn save(&self) -> bool {
        GatingNetwork::save(self).await
    }

    async fn load(&mut self) -> bool {
        GatingNetwork::load(self).await
    }
}
