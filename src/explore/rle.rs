//! Random Latent Exploration (RLE)
//!
//! Based on "Random Latent Exploration for Deep Reinforcement Learning"
//! (Mahankali et al., 2024). Every environment carries a persistent
//! unit-norm latent direction `z` in feature space; the intrinsic reward for
//! a transition is the alignment between the (normalized) features of the
//! next observation and `z`:
//!
//! ```text
//! r_int(s', z) = < normalize(f(s')), z >
//! ```
//!
//! The feature network is never gradient-trained. Instead, after each
//! optimization pass its shared lower layers drift toward the policy's
//! corresponding layers by exponential interpolation with a small rate tau,
//! restricted to parameters whose shapes match — the policy's input layer
//! also sees `z`, so its input weights never match and are skipped.
//!
//! Latents are resampled when the episode ends or after a fixed number of
//! steps since the last resample, whichever comes first, and never more than
//! once per environment step.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tch::{
    nn::{self, Module},
    Device, Kind, Tensor,
};

use crate::policy::net::ortho_linear;
use crate::policy::ActorCritic;
use crate::utils::RunningMeanStd;

/// RLE hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RleConfig {
    /// Dimensionality of the feature space and latent vectors
    pub feature_size: i64,

    /// Blend rate toward the policy's lower layers after each update
    pub tau: f64,

    /// Weight of the intrinsic reward folded into the task reward stream
    pub int_coef: f32,

    /// Step budget after which a latent is resampled even mid-episode
    pub latent_reset_interval: u32,
}

impl Default for RleConfig {
    fn default() -> Self {
        Self { feature_size: 8, tau: 0.005, int_coef: 0.01, latent_reset_interval: 1280 }
    }
}

impl RleConfig {
    /// Validate hyperparameters
    pub fn validate(&self) -> Result<()> {
        if self.feature_size <= 0 {
            bail!("feature_size must be positive");
        }
        if !(0.0..=1.0).contains(&self.tau) {
            bail!("tau must be in [0, 1]");
        }
        if self.latent_reset_interval == 0 {
            bail!("latent_reset_interval must be positive");
        }
        Ok(())
    }
}

/// RLE runtime state: feature network, feature statistics, latent vectors
pub struct RleExploration {
    config: RleConfig,
    vs: nn::VarStore,
    shared: nn::Sequential,
    feature_head: nn::Linear,
    feat_rms: RunningMeanStd,
    feat_mean: Tensor,
    feat_std: Tensor,
    latents: Tensor,
    latent_rows: Vec<Vec<f32>>,
    steps_since_resample: Vec<u32>,
    device: Device,
}

impl RleExploration {
    /// Create the feature network and sample one latent per environment
    pub fn new(obs_dim: i64, num_envs: usize, config: RleConfig, device: Device) -> Self {
        let mut vs = nn::VarStore::new(device);
        let root = vs.root();
        let gain = 2.0_f64.sqrt();

        let shared = nn::seq()
            .add(ortho_linear(&root / "shared" / "fc1", obs_dim, 64, gain))
            .add_fn(|x| x.relu())
            .add(ortho_linear(&root / "shared" / "fc2", 64, 64, gain))
            .add_fn(|x| x.relu());
        let feature_head = ortho_linear(&root / "head", 64, config.feature_size, gain);

        // Never trained by gradient; only blended from the policy.
        vs.freeze();

        let feature_size = config.feature_size;
        let mut this = Self {
            config,
            vs,
            shared,
            feature_head,
            feat_rms: RunningMeanStd::new(feature_size as usize),
            feat_mean: Tensor::zeros([feature_size], (Kind::Float, device)),
            feat_std: Tensor::ones([feature_size], (Kind::Float, device)),
            latents: Tensor::zeros([num_envs as i64, feature_size], (Kind::Float, device)),
            latent_rows: vec![vec![0.0; feature_size as usize]; num_envs],
            steps_since_resample: vec![0; num_envs],
            device,
        };
        this.latents = this.sample_latents(num_envs as i64);
        this.sync_latent_rows();
        this
    }

    /// Strategy hyperparameters
    pub fn config(&self) -> &RleConfig {
        &self.config
    }

    /// Sample `n` fresh unit-norm latent vectors
    pub fn sample_latents(&self, n: i64) -> Tensor {
        let z = Tensor::randn([n, self.config.feature_size], (Kind::Float, self.device));
        let norm = (&z * &z)
            .sum_dim_intlist(-1, true, Kind::Float)
            .sqrt()
            .clamp_min(1e-12);
        z / norm
    }

    /// Current latent vectors as a `[num_envs, feature_size]` tensor
    pub fn latents(&self) -> &Tensor {
        &self.latents
    }

    /// Current latent vectors as per-environment rows (for buffer recording)
    pub fn latent_rows(&self) -> &[Vec<f32>] {
        &self.latent_rows
    }

    /// Advance the latent lifecycle by one environment step
    ///
    /// Each slot's age is incremented; slots whose episode just ended or
    /// whose age reached the reset interval get a fresh latent, exactly once
    /// even when both conditions hold. Call this once per collected step.
    pub fn refresh_latents(&mut self, done: &[bool]) -> Result<()> {
        debug_assert_eq!(done.len(), self.steps_since_resample.len());

        let mut reset_idx: Vec<i64> = Vec::new();
        for (i, age) in self.steps_since_resample.iter_mut().enumerate() {
            *age += 1;
            if done[i] || *age >= self.config.latent_reset_interval {
                reset_idx.push(i as i64);
            }
        }
        if reset_idx.is_empty() {
            return Ok(());
        }

        let fresh = self.sample_latents(reset_idx.len() as i64);
        let index = Tensor::from_slice(&reset_idx).to_device(self.device);
        let _ = self.latents.index_put_(&[Some(index)], &fresh, false);
        for &i in &reset_idx {
            self.steps_since_resample[i as usize] = 0;
        }
        self.sync_latent_rows();
        Ok(())
    }

    fn sync_latent_rows(&mut self) {
        let flat: Vec<f32> = Vec::try_from(&self.latents.to_device(Device::Cpu).reshape([-1]))
            .expect("latent tensor is contiguous f32");
        let dim = self.config.feature_size as usize;
        for (i, row) in self.latent_rows.iter_mut().enumerate() {
            row.copy_from_slice(&flat[i * dim..(i + 1) * dim]);
        }
    }

    /// Raw (unnormalized) features for a batch of observations
    pub fn features(&self, observations: &Tensor) -> Tensor {
        self.feature_head.forward(&self.shared.forward(observations))
    }

    /// Intrinsic rewards and raw features for a batch of next observations
    ///
    /// Rewards use the per-environment latents; features come back as rows
    /// so the caller can accumulate them for the per-rollout statistics
    /// update.
    pub fn intrinsic_reward(
        &self,
        next_observations: &Tensor,
    ) -> Result<(Vec<f32>, Vec<Vec<f32>>)> {
        let (rewards, features) = tch::no_grad(|| {
            let raw = self.features(next_observations);
            let normalized = (&raw - &self.feat_mean) / (&self.feat_std + 1e-8);
            let rewards = (normalized * &self.latents).sum_dim_intlist(-1, false, Kind::Float);
            (rewards, raw)
        });

        let rewards: Vec<f32> = Vec::try_from(&rewards.to_device(Device::Cpu))?;
        let flat: Vec<f32> = Vec::try_from(&features.to_device(Device::Cpu).reshape([-1]))?;
        let dim = self.config.feature_size as usize;
        let rows = flat.chunks(dim).map(|c| c.to_vec()).collect();
        Ok((rewards, rows))
    }

    /// Fold the rollout's feature batch into the running statistics
    ///
    /// Called once per rollout iteration with every feature row observed.
    pub fn update_feature_stats(&mut self, features: &[Vec<f32>]) {
        if features.is_empty() {
            return;
        }
        self.feat_rms.update(features);
        let mean: Vec<f32> = self.feat_rms.mean().iter().map(|&m| m as f32).collect();
        let std: Vec<f32> = self.feat_rms.std().iter().map(|&s| s as f32).collect();
        self.feat_mean = Tensor::from_slice(&mean).to_device(self.device);
        self.feat_std = Tensor::from_slice(&std).to_device(self.device);
    }

    /// Blend the shared layers toward the policy's lower actor layers
    ///
    /// `param <- tau * policy_param + (1 - tau) * param`, applied after each
    /// optimization pass to every shared parameter whose shape matches its
    /// policy counterpart. The policy's input weights include the latent
    /// columns and never match, so they are skipped; same-shaped biases
    /// still blend.
    pub fn blend_from_policy(&mut self, policy: &ActorCritic) {
        let policy_vars = policy.var_store().variables();
        let feature_vars = self.vs.variables();
        let tau = self.config.tau;

        let pairs = [
            ("shared.fc1", "actor.fc1"),
            ("shared.fc2", "actor.fc2"),
        ];
        tch::no_grad(|| {
            for (feat_layer, policy_layer) in pairs {
                for suffix in ["weight", "bias"] {
                    let feat_name = format!("{}.{}", feat_layer, suffix);
                    let policy_name = format!("{}.{}", policy_layer, suffix);
                    let (Some(feat), Some(pol)) =
                        (feature_vars.get(&feat_name), policy_vars.get(&policy_name))
                    else {
                        continue;
                    };
                    if feat.size() != pol.size() {
                        continue;
                    }
                    let blended = pol * tau + feat * (1.0 - tau);
                    let mut feat = feat.shallow_clone();
                    feat.copy_(&blended);
                }
            }
        });
    }
}
