//! PPO configuration and hyperparameters
//!
//! All knobs of the training loop live here; validation runs before any
//! network or environment is constructed, so inconsistent settings fail
//! fast.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::explore::ExploreConfig;

/// Configuration for a training run
///
/// Defaults follow the four-room grid-world experiments: 32 environments,
/// 128-step rollouts, lr 1e-3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Environment identifier (informational; the caller supplies the
    /// environment factory)
    pub env_id: String,

    /// Seed for every randomness source of the run
    pub seed: u64,

    /// Number of parallel environment replicas
    pub num_envs: usize,

    /// Steps collected per environment per rollout
    pub num_steps: usize,

    /// Total environment steps for the run
    pub total_timesteps: usize,

    /// Adam learning rate
    pub learning_rate: f64,

    /// Linearly anneal the learning rate to zero over the run
    pub anneal_lr: bool,

    /// Discount factor for the extrinsic reward stream
    pub gamma: f64,

    /// GAE trace-decay parameter
    pub gae_lambda: f64,

    /// Number of minibatches per epoch; must divide the batch evenly
    pub num_minibatches: usize,

    /// Optimization epochs per rollout
    pub update_epochs: usize,

    /// Normalize advantages per minibatch
    pub norm_adv: bool,

    /// Surrogate clipping coefficient (epsilon)
    pub clip_coef: f64,

    /// Clip the value loss analogously to the policy ratio
    pub clip_vloss: bool,

    /// Entropy bonus coefficient
    pub ent_coef: f64,

    /// Value loss coefficient
    pub vf_coef: f64,

    /// Global gradient norm clip
    pub max_grad_norm: f64,

    /// Early-stop threshold on the approximate KL divergence, if set
    pub target_kl: Option<f64>,

    /// Normalize extrinsic rewards by the running std of their discounted
    /// stream
    pub norm_reward: bool,

    /// Multiplier applied to raw extrinsic rewards before anything else
    pub reward_scaler: f32,

    /// Exploration strategy and its hyperparameters
    pub exploration: ExploreConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            env_id: String::new(),
            seed: 1,
            num_envs: 32,
            num_steps: 128,
            total_timesteps: 2_500_000,
            learning_rate: 1e-3,
            anneal_lr: false,
            gamma: 0.99,
            gae_lambda: 0.95,
            num_minibatches: 4,
            update_epochs: 4,
            norm_adv: true,
            clip_coef: 0.2,
            clip_vloss: true,
            ent_coef: 0.01,
            vf_coef: 0.5,
            max_grad_norm: 0.5,
            target_kl: None,
            norm_reward: false,
            reward_scaler: 1.0,
            exploration: ExploreConfig::None,
        }
    }
}

impl TrainConfig {
    /// Transitions per rollout (`num_envs * num_steps`)
    pub fn batch_size(&self) -> usize {
        self.num_envs * self.num_steps
    }

    /// Samples per minibatch
    pub fn minibatch_size(&self) -> usize {
        self.batch_size() / self.num_minibatches
    }

    /// Number of update iterations in the run
    pub fn num_updates(&self) -> usize {
        self.total_timesteps / self.batch_size()
    }

    /// Validate the configuration, failing fast on inconsistent settings
    pub fn validate(&self) -> Result<()> {
        if self.num_envs == 0 {
            bail!("num_envs must be positive");
        }
        if self.num_steps == 0 {
            bail!("num_steps must be positive");
        }
        if self.num_minibatches == 0 {
            bail!("num_minibatches must be positive");
        }
        if self.batch_size() % self.num_minibatches != 0 {
            bail!(
                "batch size {} is not divisible into {} minibatches",
                self.batch_size(),
                self.num_minibatches
            );
        }
        if self.num_updates() == 0 {
            bail!(
                "total_timesteps {} is smaller than one batch ({})",
                self.total_timesteps,
                self.batch_size()
            );
        }
        if self.update_epochs == 0 {
            bail!("update_epochs must be positive");
        }
        if self.learning_rate <= 0.0 {
            bail!("learning_rate must be positive");
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            bail!("gamma must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            bail!("gae_lambda must be in [0, 1]");
        }
        if self.clip_coef <= 0.0 {
            bail!("clip_coef must be positive");
        }
        if self.ent_coef < 0.0 {
            bail!("ent_coef must be non-negative");
        }
        if self.vf_coef < 0.0 {
            bail!("vf_coef must be non-negative");
        }
        if self.max_grad_norm <= 0.0 {
            bail!("max_grad_norm must be positive");
        }
        if let Some(kl) = self.target_kl {
            if kl <= 0.0 {
                bail!("target_kl must be positive when set");
            }
        }
        if self.reward_scaler <= 0.0 {
            bail!("reward_scaler must be positive");
        }
        self.exploration.validate()
    }
}
