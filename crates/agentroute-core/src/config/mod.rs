//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::gating::GatingConfig;
use crate::routing::QLearningConfig;

/// Agentroute configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub qlearning: QLearningConfig,
    #[serde(default)]
    pub gating: GatingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "agentroute=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

/// Keys accepted by [`Config::get`] and [`Config::set`]
pub const KEYS: &[&str] = &[
    "logging.filter",
    "qlearning.learning_rate",
    "qlearning.discount_factor",
    "qlearning.exploration_initial",
    "qlearning.exploration_final",
    "qlearning.exploration_decay_steps",
    "qlearning.exploration_schedule",
    "qlearning.max_states",
    "qlearning.replay_capacity",
    "qlearning.replay_batch_size",
    "qlearning.cache_size",
    "qlearning.cache_ttl_ms",
    "qlearning.cache_invalidation_interval",
    "qlearning.encoder_cache_size",
    "qlearning.autosave_interval",
    "qlearning.routes",
    "qlearning.persistence_path",
    "gating.input_dim",
    "gating.hidden_dim",
    "gating.experts",
    "gating.top_k",
    "gating.temperature",
    "gating.learning_rate",
    "gating.noise_enabled",
    "gating.noise_std",
    "gating.balance_bias_step",
    "gating.balance_bias_clamp",
    "gating.kernel",
    "gating.autosave_interval",
    "gating.persistence_path",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("AGENTROUTE_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("agentroute")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Directory holding engine snapshots
    pub fn data_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("AGENTROUTE_DATA_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow!("Could not determine data directory"))?
                .join("agentroute")
        };
        Ok(dir)
    }

    /// Load configuration from file, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.logging.filter.trim().is_empty() {
            return Err(anyhow!("logging.filter must not be empty"));
        }
        self.qlearning
            .validate()
            .context("Invalid [qlearning] section")?;
        self.gating.validate().context("Invalid [gating] section")?;
        Ok(())
    }

    /// Q-learning config with the snapshot path defaulted into `data_dir`
    pub fn qlearning_with_storage(&self, data_dir: &Path) -> QLearningConfig {
        let mut config = self.qlearning.clone();
        if config.persistence_path.is_none() {
            config.persistence_path = Some(data_dir.join("qlearning.json"));
        }
        config
    }

    /// Gating config with the snapshot path defaulted into `data_dir`
    pub fn gating_with_storage(&self, data_dir: &Path) -> GatingConfig {
        let mut config = self.gating.clone();
        if config.persistence_path.is_none() {
            config.persistence_path = Some(data_dir.join("gating.json"));
        }
        config
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        let q = &self.qlearning;
        let g = &self.gating;
        let value = match key {
            "logging.filter" => self.logging.filter.clone(),

            "qlearning.learning_rate" => q.learning_rate.to_string(),
            "qlearning.discount_factor" => q.discount_factor.to_string(),
            "qlearning.exploration_initial" => q.exploration_initial.to_string(),
            "qlearning.exploration_final" => q.exploration_final.to_string(),
            "qlearning.exploration_decay_steps" => q.exploration_decay_steps.to_string(),
            "qlearning.exploration_schedule" => q.exploration_schedule.to_string(),
            "qlearning.max_states" => q.max_states.to_string(),
            "qlearning.replay_capacity" => q.replay_capacity.to_string(),
            "qlearning.replay_batch_size" => q.replay_batch_size.to_string(),
            "qlearning.cache_size" => q.cache_size.to_string(),
            "qlearning.cache_ttl_ms" => q.cache_ttl_ms.to_string(),
            "qlearning.cache_invalidation_interval" => q.cache_invalidation_interval.to_string(),
            "qlearning.encoder_cache_size" => q.encoder_cache_size.to_string(),
            "qlearning.autosave_interval" => q.autosave_interval.to_string(),
            "qlearning.routes" => q.routes.join(", "),
            "qlearning.persistence_path" => display_path(q.persistence_path.as_deref()),

            "gating.input_dim" => g.input_dim.to_string(),
            "gating.hidden_dim" => g.hidden_dim.to_string(),
            "gating.experts" => g.experts.join(", "),
            "gating.top_k" => g.top_k.to_string(),
            "gating.temperature" => g.temperature.to_string(),
            "gating.learning_rate" => g.learning_rate.to_string(),
            "gating.noise_enabled" => g.noise_enabled.to_string(),
            "gating.noise_std" => g.noise_std.to_string(),
            "gating.balance_bias_step" => g.balance_bias_step.to_string(),
            "gating.balance_bias_clamp" => g.balance_bias_clamp.to_string(),
            "gating.kernel" => g.kernel.to_string(),
            "gating.autosave_interval" => g.autosave_interval.to_string(),
            "gating.persistence_path" => display_path(g.persistence_path.as_deref()),

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `agentroute config list` to see available keys.",
                    key
                ));
            }
        };
        Ok(value)
    }

    /// Set a configuration value by key
    ///
    /// The change is validated against the whole section before it is
    /// applied, so a rejected value leaves the configuration unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut next = self.clone();
        let q = &mut next.qlearning;
        let g = &mut next.gating;
        match key {
            "logging.filter" => next.logging.filter = value.trim().to_string(),

            "qlearning.learning_rate" => q.learning_rate = parse(key, value)?,
            "qlearning.discount_factor" => q.discount_factor = parse(key, value)?,
            "qlearning.exploration_initial" => q.exploration_initial = parse(key, value)?,
            "qlearning.exploration_final" => q.exploration_final = parse(key, value)?,
            "qlearning.exploration_decay_steps" => q.exploration_decay_steps = parse(key, value)?,
            "qlearning.exploration_schedule" => q.exploration_schedule = parse(key, value)?,
            "qlearning.max_states" => q.max_states = parse(key, value)?,
            "qlearning.replay_capacity" => q.replay_capacity = parse(key, value)?,
            "qlearning.replay_batch_size" => q.replay_batch_size = parse(key, value)?,
            "qlearning.cache_size" => q.cache_size = parse(key, value)?,
            "qlearning.cache_ttl_ms" => q.cache_ttl_ms = parse(key, value)?,
            "qlearning.cache_invalidation_interval" => {
                q.cache_invalidation_interval = parse(key, value)?
            }
            "qlearning.encoder_cache_size" => q.encoder_cache_size = parse(key, value)?,
            "qlearning.autosave_interval" => q.autosave_interval = parse(key, value)?,
            "qlearning.routes" => q.routes = parse_list(value),
            "qlearning.persistence_path" => q.persistence_path = parse_path(value),

            "gating.input_dim" => g.input_dim = parse(key, value)?,
            "gating.hidden_dim" => g.hidden_dim = parse(key, value)?,
            "gating.experts" => g.experts = parse_list(value),
            "gating.top_k" => g.top_k = parse(key, value)?,
            "gating.temperature" => g.temperature = parse(key, value)?,
            "gating.learning_rate" => g.learning_rate = parse(key, value)?,
            "gating.noise_enabled" => g.noise_enabled = parse(key, value)?,
            "gating.noise_std" => g.noise_std = parse(key, value)?,
            "gating.balance_bias_step" => g.balance_bias_step = parse(key, value)?,
            "gating.balance_bias_clamp" => g.balance_bias_clamp = parse(key, value)?,
            "gating.kernel" => g.kernel = parse(key, value)?,
            "gating.autosave_interval" => g.autosave_interval = parse(key, value)?,
            "gating.persistence_path" => g.persistence_path = parse_path(value),

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `agentroute config list` to see available keys.",
                    key
                ));
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| Ok((key.to_string(), self.get(key)?)))
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid value for {}: {} ({})", key, value, e))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

fn display_path(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "(default data directory)".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gating::KernelKind;
    use crate::routing::DecaySchedule;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.logging.filter, "agentroute=info");
        assert_eq!(config.qlearning.learning_rate, 0.1);
        assert_eq!(config.gating.top_k, 2);
    }

    #[test]
    fn test_every_key_readable() {
        let config = Config::default();
        let listed = config.list().unwrap();
        assert_eq!(listed.len(), KEYS.len());
        assert_eq!(config.get("gating.kernel").unwrap(), "auto");
        assert_eq!(
            config.get("qlearning.exploration_schedule").unwrap(),
            "exponential"
        );
    }

    #[test]
    fn test_set_values() {
        let mut config = Config::default();
        config.set("qlearning.exploration_schedule", "cosine").unwrap();
        config.set("gating.kernel", "scalar").unwrap();
        config.set("gating.top_k", "3").unwrap();
        config.set("qlearning.routes", "fast, slow , ,careful").unwrap();
        config.set("gating.persistence_path", "/tmp/g.json").unwrap();

        assert_eq!(config.qlearning.exploration_schedule, DecaySchedule::Cosine);
        assert_eq!(config.gating.kernel, KernelKind::Scalar);
        assert_eq!(config.gating.top_k, 3);
        assert_eq!(config.qlearning.routes, vec!["fast", "slow", "careful"]);
        assert_eq!(
            config.gating.persistence_path,
            Some(PathBuf::from("/tmp/g.json"))
        );
    }

    #[test]
    fn test_rejected_set_leaves_config_unchanged() {
        let mut config = Config::default();
        assert!(config.set("gating.top_k", "99").is_err());
        assert!(config.set("qlearning.learning_rate", "fast").is_err());
        assert!(config.set("qlearning.exploration_final", "2.0").is_err());
        assert!(config.set("nope.key", "1").is_err());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[qlearning]\nlearning_rate = 0.2\n\n[gating]\nnoise_enabled = false\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.qlearning.learning_rate, 0.2);
        assert_eq!(config.qlearning.discount_factor, 0.95);
        assert!(!config.gating.noise_enabled);
        assert_eq!(config.gating.input_dim, 384);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.set("gating.temperature", "0.5").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[gating]\ntop_k = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_storage_paths() {
        let config = Config::default();
        let data = Path::new("/var/lib/agentroute");
        assert_eq!(
            config.qlearning_with_storage(data).persistence_path,
            Some(data.join("qlearning.json"))
        );
        assert_eq!(
            config.gating_with_storage(data).persistence_path,
            Some(data.join("gating.json"))
        );
    }
}
