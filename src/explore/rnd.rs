//! Random Network Distillation (RND)
//!
//! Based on "Exploration by Random Network Distillation" (Burda et al.,
//! 2018). A frozen, randomly initialized target network defines an arbitrary
//! function of the observation; a trainable predictor regresses toward it.
//! States the predictor has not seen produce large errors, which become the
//! intrinsic reward:
//!
//! ```text
//! r_int(s') = || target(s') - predictor(s') ||^2 / 2
//! ```
//!
//! Both networks see the observation normalized by running statistics and
//! clipped to [-5, 5] standard deviations. The statistics warm up from a
//! random-action phase before training and keep updating from every rollout
//! batch. The predictor loss is masked so only a configurable fraction of
//! each minibatch contributes, which keeps the predictor from saturating.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tch::{
    nn::{self, Module},
    Device, Kind, Tensor,
};

use crate::policy::net::ortho_linear;
use crate::policy::ActorCritic;
use crate::utils::RunningMeanStd;

/// RND hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RndConfig {
    /// Output dimensionality of target and predictor
    pub output_size: i64,

    /// Hidden width of the predictor network
    pub predictor_width: i64,

    /// Hidden width of the target network
    pub target_width: i64,

    /// Fraction of each minibatch that contributes to the predictor loss
    pub update_proportion: f64,

    /// Weight of the intrinsic advantage stream
    pub int_coef: f32,

    /// Weight of the extrinsic advantage stream
    pub ext_coef: f32,

    /// Discount for the intrinsic (non-episodic) reward stream
    pub int_gamma: f32,

    /// Number of rollout-sized random-action iterations used to initialize
    /// the observation normalization statistics
    pub obs_norm_init_iters: usize,
}

impl Default for RndConfig {
    fn default() -> Self {
        Self {
            output_size: 256,
            predictor_width: 256,
            target_width: 64,
            update_proportion: 0.75,
            int_coef: 1.0,
            ext_coef: 1.0,
            int_gamma: 0.99,
            obs_norm_init_iters: 50,
        }
    }
}

impl RndConfig {
    /// Validate hyperparameters
    pub fn validate(&self) -> Result<()> {
        if self.output_size <= 0 || self.predictor_width <= 0 || self.target_width <= 0 {
            bail!("RND network sizes must be positive");
        }
        if !(0.0..=1.0).contains(&self.update_proportion) {
            bail!("update_proportion must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.int_gamma) {
            bail!("int_gamma must be in [0, 1]");
        }
        Ok(())
    }
}

/// RND runtime state: frozen target, trainable predictor, obs statistics
pub struct RndExploration {
    config: RndConfig,
    // Keeps the frozen target parameters alive; never trained.
    _target_vs: nn::VarStore,
    target: nn::Sequential,
    predictor: nn::Sequential,
    obs_rms: RunningMeanStd,
    device: Device,
}

impl RndExploration {
    /// Create the RND networks
    ///
    /// The predictor lives under the policy's variable store (path
    /// `rnd_predictor`), so the policy's optimizer trains it; the target has
    /// its own frozen store.
    pub fn new(policy: &ActorCritic, obs_dim: i64, config: RndConfig) -> Self {
        let device = policy.device();
        let gain = 2.0_f64.sqrt();

        let root = policy.var_store().root();
        let p = &root / "rnd_predictor";
        let width = config.predictor_width;
        let out = config.output_size;
        let predictor = nn::seq()
            .add(ortho_linear(&p / "fc1", obs_dim, width, gain))
            .add_fn(|x| x.relu())
            .add(ortho_linear(&p / "fc2", width, width, gain))
            .add_fn(|x| x.relu())
            .add(ortho_linear(&p / "fc3", width, out, gain))
            .add_fn(|x| x.relu())
            .add(ortho_linear(&p / "fc4", out, out, gain))
            .add_fn(|x| x.relu())
            .add(ortho_linear(&p / "head", out, out, 0.01));

        let mut target_vs = nn::VarStore::new(device);
        let t = target_vs.root();
        let target = nn::seq()
            .add(ortho_linear(&t / "fc1", obs_dim, config.target_width, gain))
            .add_fn(|x| x.relu())
            .add(ortho_linear(&t / "head", config.target_width, out, gain));
        // Random, fixed for the whole run.
        target_vs.freeze();

        Self {
            config,
            _target_vs: target_vs,
            target,
            predictor,
            obs_rms: RunningMeanStd::new(obs_dim as usize),
            device,
        }
    }

    /// Strategy hyperparameters
    pub fn config(&self) -> &RndConfig {
        &self.config
    }

    /// Fold a batch of raw observations into the normalization statistics
    pub fn update_obs_stats(&mut self, observations: &[Vec<f32>]) {
        self.obs_rms.update(observations);
    }

    /// Normalize raw observation rows into the tensor the networks consume
    pub fn normalized_obs(&self, observations: &[Vec<f32>]) -> Tensor {
        let obs_dim = observations.first().map_or(0, |o| o.len());
        let mut flat = Vec::with_capacity(observations.len() * obs_dim);
        for obs in observations {
            flat.extend(self.obs_rms.normalize_clipped(obs, -5.0, 5.0));
        }
        Tensor::from_slice(&flat)
            .view([observations.len() as i64, obs_dim as i64])
            .to_device(self.device)
    }

    /// Intrinsic reward for a batch of raw *next* observations
    pub fn intrinsic_reward(&self, next_observations: &[Vec<f32>]) -> Result<Vec<f32>> {
        let rewards = tch::no_grad(|| {
            let normalized = self.normalized_obs(next_observations);
            let target = self.target.forward(&normalized);
            let predicted = self.predictor.forward(&normalized);
            (target - predicted)
                .pow_tensor_scalar(2)
                .sum_dim_intlist(-1, false, Kind::Float)
                / 2.0
        });
        Ok(Vec::try_from(&rewards.to_device(Device::Cpu))?)
    }

    /// Predictor regression loss for one minibatch of normalized observations
    ///
    /// A Bernoulli(update_proportion) mask selects the contributing samples;
    /// the sum is normalized by the mask count (floored at one sample).
    pub fn predictor_loss(&self, normalized_obs: &Tensor) -> Tensor {
        let target = self.target.forward(normalized_obs).detach();
        let predicted = self.predictor.forward(normalized_obs);
        let per_sample =
            (predicted - target).pow_tensor_scalar(2).mean_dim(-1, false, Kind::Float);

        let mask = Tensor::rand(per_sample.size(), (Kind::Float, self.device))
            .lt(self.config.update_proportion)
            .to_kind(Kind::Float);
        (per_sample * &mask).sum(Kind::Float) / mask.sum(Kind::Float).clamp_min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ActorCritic, NetConfig};

    fn make_rnd(obs_dim: i64) -> (ActorCritic, RndExploration) {
        let policy = ActorCritic::new(
            obs_dim,
            2,
            NetConfig { dual_value: true, ..Default::default() },
        );
        let rnd = RndExploration::new(&policy, obs_dim, RndConfig::default());
        (policy, rnd)
    }

    #[test]
    fn test_intrinsic_reward_is_nonnegative() {
        let (_policy, mut rnd) = make_rnd(3);
        let obs = vec![vec![0.1, 0.2, 0.3], vec![1.0, -1.0, 0.5]];
        rnd.update_obs_stats(&obs);

        let rewards = rnd.intrinsic_reward(&obs).unwrap();
        assert_eq!(rewards.len(), 2);
        for r in rewards {
            assert!(r >= 0.0);
            assert!(r.is_finite());
        }
    }

    #[test]
    fn test_predictor_params_live_in_policy_store() {
        let (policy, _rnd) = make_rnd(3);
        let vars = policy.var_store().variables();
        assert!(vars.keys().any(|k| k.starts_with("rnd_predictor.")));
    }

    #[test]
    fn test_predictor_loss_is_scalar_and_finite() {
        let (_policy, rnd) = make_rnd(3);
        let normalized = Tensor::randn([16, 3], (Kind::Float, rnd.device));
        let loss = rnd.predictor_loss(&normalized);
        assert!(loss.size().is_empty());
        let value = f64::try_from(&loss).unwrap();
        assert!(value.is_finite());
        assert!(value >= 0.0);
    }

    #[test]
    fn test_mask_floor_with_zero_proportion() {
        // With update_proportion = 0 the mask is empty; the floor keeps the
        // loss defined (zero) instead of dividing by zero.
        let policy = ActorCritic::new(3, 2, NetConfig::default());
        let config = RndConfig { update_proportion: 0.0, ..Default::default() };
        let rnd = RndExploration::new(&policy, 3, config);

        let normalized = Tensor::randn([8, 3], (Kind::Float, rnd.device));
        let value = f64::try_from(&rnd.predictor_loss(&normalized)).unwrap();
        assert_eq!(value, 0.0);
    }
}
