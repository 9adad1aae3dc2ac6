//! Intrinsic exploration strategies
//!
//! The PPO core is generic over an exploration strategy selected once at
//! configuration time:
//!
//! - [`Exploration::None`] — plain PPO, task reward only.
//! - [`Exploration::Rnd`] — Random Network Distillation: a frozen random
//!   target network and a trainable predictor; prediction error on the next
//!   observation is the exploration bonus, tracked as a second reward stream
//!   with its own value head and non-episodic discounting.
//! - [`Exploration::Rle`] — Random Latent Exploration: a slowly-adapted
//!   feature network and a per-environment random latent direction; the
//!   bonus is folded into the task reward stream at collection time.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::policy::ActorCritic;

pub mod rnd;
pub mod rle;

pub use rnd::{RndConfig, RndExploration};
pub use rle::{RleConfig, RleExploration};

/// Exploration strategy selection and hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ExploreConfig {
    /// Plain PPO, no intrinsic reward
    None,

    /// Random Network Distillation
    Rnd(RndConfig),

    /// Random Latent Exploration
    Rle(RleConfig),
}

impl Default for ExploreConfig {
    fn default() -> Self {
        ExploreConfig::None
    }
}

impl ExploreConfig {
    /// Latent input dimensionality the policy must accept
    pub fn latent_dim(&self) -> i64 {
        match self {
            ExploreConfig::Rle(cfg) => cfg.feature_size,
            _ => 0,
        }
    }

    /// Whether the policy needs a second (intrinsic) value head
    pub fn dual_value(&self) -> bool {
        matches!(self, ExploreConfig::Rnd(_))
    }

    /// Validate variant hyperparameters
    pub fn validate(&self) -> Result<()> {
        match self {
            ExploreConfig::None => Ok(()),
            ExploreConfig::Rnd(cfg) => cfg.validate(),
            ExploreConfig::Rle(cfg) => cfg.validate(),
        }
    }
}

/// Runtime state of the selected exploration strategy
pub enum Exploration {
    /// Plain PPO
    None,

    /// Random Network Distillation state
    Rnd(RndExploration),

    /// Random Latent Exploration state
    Rle(RleExploration),
}

impl Exploration {
    /// Build the runtime strategy for a configuration
    ///
    /// The RND predictor is created under the policy's variable store so the
    /// shared optimizer trains it; build the strategy before creating the
    /// optimizer.
    pub fn build(
        config: &ExploreConfig,
        policy: &ActorCritic,
        obs_dim: i64,
        num_envs: usize,
    ) -> Self {
        match config {
            ExploreConfig::None => Exploration::None,
            ExploreConfig::Rnd(cfg) => {
                Exploration::Rnd(RndExploration::new(policy, obs_dim, cfg.clone()))
            }
            ExploreConfig::Rle(cfg) => {
                Exploration::Rle(RleExploration::new(obs_dim, num_envs, cfg.clone(), policy.device()))
            }
        }
    }

    /// Latent input dimensionality (0 unless RLE)
    pub fn latent_dim(&self) -> i64 {
        match self {
            Exploration::Rle(rle) => rle.config().feature_size,
            _ => 0,
        }
    }

    /// Whether dual reward/value streams are active
    pub fn dual_value(&self) -> bool {
        matches!(self, Exploration::Rnd(_))
    }
}
