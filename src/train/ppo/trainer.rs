//! PPO trainer context and entry point
//!
//! [`Trainer`] owns every piece of mutable training state — environments,
//! networks, optimizer, rollout buffers, running statistics, RNG — and
//! threads it through the per-update phases explicitly: collect, normalize
//! rewards, estimate advantages, optimize, post-update hook. [`run`] is the
//! one-call entry point for driving scripts.
//!
//! Every randomness source (environment seeding, action sampling, parameter
//! initialization, minibatch shuffling, latent sampling) derives from the
//! single configured seed; wall-clock time only feeds the steps-per-second
//! metric.

use std::time::Instant;

use anyhow::{anyhow, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tch::{nn, Device, Kind, Tensor};

use crate::buffer::rollout::{gae, RolloutBuffer};
use crate::env::{pool::EnvPool, Environment};
use crate::explore::{ExploreConfig, Exploration};
use crate::metrics::ScalarSink;
use crate::policy::{ActorCritic, Activation, NetConfig};
use crate::utils::{RewardFilter, RunningMeanStd};

use super::collector::{collect_rollout, rows_to_tensor};
use super::config::TrainConfig;
use super::loss;
use super::stats::UpdateStats;

/// Final report of a training run
#[derive(Debug, Clone)]
pub struct TrainSummary {
    /// Total environment steps taken (excluding the normalization warm-up)
    pub global_step: u64,

    /// Number of PPO updates performed
    pub num_updates: usize,

    /// Episodes finished during training
    pub episodes_completed: u64,

    /// Average environment steps per second over the run
    pub steps_per_second: f64,
}

/// Mutable state of one training run
pub struct Trainer<E: Environment> {
    pub(crate) cfg: TrainConfig,
    pub(crate) pool: EnvPool<E>,
    pub(crate) policy: ActorCritic,
    pub(crate) exploration: Exploration,
    pub(crate) optimizer: nn::Optimizer,
    pub(crate) buffer: RolloutBuffer,
    pub(crate) ext_filter: RewardFilter,
    pub(crate) int_filter: RewardFilter,
    pub(crate) ext_reward_rms: RunningMeanStd,
    pub(crate) int_reward_rms: RunningMeanStd,
    pub(crate) rng: StdRng,
    pub(crate) sink: Box<dyn ScalarSink>,
    pub(crate) next_obs: Vec<Vec<f32>>,
    pub(crate) next_done: Vec<f32>,
    pub(crate) global_step: u64,
    pub(crate) episodes_completed: u64,
    pub(crate) obs_dim: usize,
    pub(crate) num_actions: usize,
    pub(crate) device: Device,
    start_time: Instant,
}

/// Run a full training session
///
/// `make_env` builds one environment replica per index; the sink receives
/// every scalar metric the loop produces.
pub fn run<E, F>(
    cfg: TrainConfig,
    make_env: F,
    sink: Box<dyn ScalarSink>,
) -> Result<TrainSummary>
where
    E: Environment,
    F: Fn(usize) -> E,
{
    let mut trainer = Trainer::new(cfg, make_env, sink)?;
    trainer.train()
}

impl<E: Environment> Trainer<E> {
    /// Build the full trainer context for a validated configuration
    pub fn new<F>(cfg: TrainConfig, make_env: F, sink: Box<dyn ScalarSink>) -> Result<Self>
    where
        F: Fn(usize) -> E,
    {
        cfg.validate()?;

        tch::manual_seed(cfg.seed as i64);
        let rng = StdRng::seed_from_u64(cfg.seed);

        let mut pool = EnvPool::new(make_env, cfg.num_envs)?;
        let obs_dim = pool.observation_space().flat_dim();
        let num_actions = pool
            .action_space()
            .discrete_n()
            .ok_or_else(|| anyhow!("training requires a discrete action space"))?;

        let latent_dim = cfg.exploration.latent_dim();
        let activation = match &cfg.exploration {
            ExploreConfig::Rle(_) => Activation::ReLU,
            _ => Activation::Tanh,
        };
        let net_cfg = NetConfig {
            hidden_dim: 64,
            activation,
            dual_value: cfg.exploration.dual_value(),
        };
        let policy = ActorCritic::new(obs_dim as i64 + latent_dim, num_actions as i64, net_cfg);
        // The strategy may register trainable parameters (the RND predictor)
        // under the policy's store, so it is built before the optimizer.
        let exploration = Exploration::build(&cfg.exploration, &policy, obs_dim as i64, cfg.num_envs);
        let optimizer = policy.optimizer(cfg.learning_rate)?;

        let buffer = RolloutBuffer::new(cfg.num_steps, cfg.num_envs, obs_dim, latent_dim as usize);
        let next_obs = pool.reset(cfg.seed);
        let next_done = vec![0.0; cfg.num_envs];
        let device = policy.device();

        let gamma = cfg.gamma as f32;
        let int_gamma = match &cfg.exploration {
            ExploreConfig::Rnd(rnd) => rnd.int_gamma,
            _ => gamma,
        };

        Ok(Self {
            ext_filter: RewardFilter::new(gamma, cfg.num_envs),
            int_filter: RewardFilter::new(int_gamma, cfg.num_envs),
            ext_reward_rms: RunningMeanStd::scalar(),
            int_reward_rms: RunningMeanStd::scalar(),
            cfg,
            pool,
            policy,
            exploration,
            optimizer,
            buffer,
            rng,
            sink,
            next_obs,
            next_done,
            global_step: 0,
            episodes_completed: 0,
            obs_dim,
            num_actions,
            device,
            start_time: Instant::now(),
        })
    }

    /// Get a reference to the trained policy
    pub fn policy(&self) -> &ActorCritic {
        &self.policy
    }

    /// Total environment steps taken so far
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    /// Run the training loop to the configured step budget
    pub fn train(&mut self) -> Result<TrainSummary> {
        self.warmup_obs_normalization()?;

        let num_updates = self.cfg.num_updates();
        tracing::info!(
            "training {} updates of {} steps x {} envs on {:?}",
            num_updates,
            self.cfg.num_steps,
            self.cfg.num_envs,
            self.device,
        );
        self.start_time = Instant::now();

        for update in 1..=num_updates {
            if self.cfg.anneal_lr {
                let frac = 1.0 - (update as f64 - 1.0) / num_updates as f64;
                let lr = frac * self.cfg.learning_rate;
                self.optimizer.set_lr(lr);
                self.sink.log_scalar("charts/learning_rate", lr, self.global_step);
            }

            collect_rollout(self)?;
            self.normalize_rewards();
            self.compute_advantages()?;
            let stats = self.optimize()?;
            self.post_update();

            stats.log_to(self.sink.as_mut(), self.global_step);
            let sps =
                self.global_step as f64 / self.start_time.elapsed().as_secs_f64().max(1e-9);
            self.sink.log_scalar("charts/SPS", sps, self.global_step);
            if stats.early_stopped {
                tracing::debug!(
                    "update {}: epoch loop stopped early at approx_kl {:.4}",
                    update,
                    stats.approx_kl
                );
            }
        }

        Ok(TrainSummary {
            global_step: self.global_step,
            num_updates,
            episodes_completed: self.episodes_completed,
            steps_per_second: self.global_step as f64
                / self.start_time.elapsed().as_secs_f64().max(1e-9),
        })
    }

    /// Random-action warm-up that initializes the observation normalization
    /// statistics (RND only); these steps do not count toward the budget
    fn warmup_obs_normalization(&mut self) -> Result<()> {
        let iters = match &self.exploration {
            Exploration::Rnd(rnd) => rnd.config().obs_norm_init_iters,
            _ => return Ok(()),
        };
        if iters == 0 {
            return Ok(());
        }
        tracing::info!("initializing observation normalization ({} random rollouts)", iters);

        for _ in 0..iters {
            let mut rows: Vec<Vec<f32>> =
                Vec::with_capacity(self.cfg.num_steps * self.cfg.num_envs);
            for _ in 0..self.cfg.num_steps {
                let actions: Vec<i64> = (0..self.cfg.num_envs)
                    .map(|_| self.rng.gen_range(0..self.num_actions as i64))
                    .collect();
                let step = self.pool.step(&actions)?;
                rows.extend(step.observations.iter().cloned());
                self.next_done = step
                    .terminated
                    .iter()
                    .zip(&step.truncated)
                    .map(|(&t, &r)| if t || r { 1.0 } else { 0.0 })
                    .collect();
                self.next_obs = step.observations;
            }
            if let Exploration::Rnd(rnd) = &mut self.exploration {
                rnd.update_obs_stats(&rows);
            }
        }
        Ok(())
    }

    /// Rescale reward streams by the running std of their discounted returns
    ///
    /// Order of operations is load-bearing: discount filter first, then fold
    /// the discounted stream into the running statistics, then divide the
    /// *raw* rewards by the resulting std.
    fn normalize_rewards(&mut self) {
        let num_steps = self.cfg.num_steps;
        let not_dones: Vec<Vec<f32>> = self
            .buffer
            .dones()
            .iter()
            .map(|row| row.iter().map(|d| 1.0 - d).collect())
            .collect();

        if self.cfg.norm_reward {
            let rewards = self.buffer.rewards().to_vec();
            let mut discounted = Vec::with_capacity(self.buffer.len());
            for t in 0..num_steps {
                discounted.extend(self.ext_filter.update(&rewards[t], &not_dones[t]));
            }
            self.ext_reward_rms.update_scalars(&discounted);
            let std = (self.ext_reward_rms.var()[0].sqrt().max(1e-8)) as f32;
            for row in self.buffer.rewards_mut() {
                for r in row.iter_mut() {
                    *r /= std;
                }
            }
        }

        if self.exploration.dual_value() {
            let rewards = self.buffer.intrinsic_rewards().to_vec();
            let mut discounted = Vec::with_capacity(self.buffer.len());
            for t in 0..num_steps {
                discounted.extend(self.int_filter.update(&rewards[t], &not_dones[t]));
            }
            self.int_reward_rms.update_scalars(&discounted);
            let std = (self.int_reward_rms.var()[0].sqrt().max(1e-8)) as f32;
            for row in self.buffer.intrinsic_rewards_mut() {
                for r in row.iter_mut() {
                    *r /= std;
                }
            }
        }

        let mean_of = |grid: &[Vec<f32>]| {
            let n = (grid.len() * grid.first().map_or(1, |r| r.len())) as f64;
            grid.iter().flatten().map(|&r| r as f64).sum::<f64>() / n
        };
        self.sink.log_scalar(
            "rewards/extrinsic_mean",
            mean_of(self.buffer.rewards()),
            self.global_step,
        );
        if self.exploration.dual_value() {
            self.sink.log_scalar(
                "rewards/intrinsic_mean",
                mean_of(self.buffer.intrinsic_rewards()),
                self.global_step,
            );
        }
    }

    /// Bootstrap values for the state after the rollout and run the GAE
    /// pass for each active reward stream
    fn compute_advantages(&mut self) -> Result<()> {
        let obs_t = rows_to_tensor(&self.next_obs, self.device);
        let input_t = match &self.exploration {
            Exploration::Rle(rle) => Tensor::cat(&[obs_t, rle.latents().shallow_clone()], 1),
            _ => obs_t,
        };
        let (ext_v, int_v) = tch::no_grad(|| self.policy.get_value(&input_t));
        let next_ext: Vec<f32> = Vec::try_from(&ext_v.to_device(Device::Cpu))?;

        let gamma = self.cfg.gamma as f32;
        let lambda = self.cfg.gae_lambda as f32;
        let next_done = self.next_done.clone();
        gae::compute_extrinsic(&mut self.buffer, &next_done, &next_ext, gamma, lambda);

        if let Some(int_v) = int_v {
            let next_int: Vec<f32> = Vec::try_from(&int_v.to_device(Device::Cpu))?;
            let int_gamma = match &self.exploration {
                Exploration::Rnd(rnd) => rnd.config().int_gamma,
                _ => gamma,
            };
            gae::compute_intrinsic(&mut self.buffer, &next_int, int_gamma, lambda);
        }
        Ok(())
    }

    fn advantage_coefs(&self) -> (f32, f32) {
        match &self.exploration {
            Exploration::Rnd(rnd) => (rnd.config().ext_coef, rnd.config().int_coef),
            _ => (1.0, 0.0),
        }
    }

    /// Run the clipped-PPO epochs over the flattened batch
    fn optimize(&mut self) -> Result<UpdateStats> {
        let flat = self.buffer.flatten();
        let batch = flat.len();
        let minibatch_size = self.cfg.minibatch_size();
        let device = self.device;

        let obs_t = Tensor::from_slice(&flat.observations)
            .view([batch as i64, self.obs_dim as i64])
            .to_device(device);
        let input_t = if flat.latent_dim > 0 {
            let latents_t = Tensor::from_slice(&flat.latents)
                .view([batch as i64, flat.latent_dim as i64])
                .to_device(device);
            Tensor::cat(&[obs_t, latents_t], 1)
        } else {
            obs_t
        };
        let actions_t = Tensor::from_slice(&flat.actions).to_device(device);
        let old_log_probs_t = Tensor::from_slice(&flat.log_probs).to_device(device);
        let ext_values_t = Tensor::from_slice(&flat.ext_values).to_device(device);
        let int_values_t = Tensor::from_slice(&flat.int_values).to_device(device);
        let ext_returns_t = Tensor::from_slice(&flat.ext_returns).to_device(device);
        let int_returns_t = Tensor::from_slice(&flat.int_returns).to_device(device);

        let (ext_coef, int_coef) = self.advantage_coefs();
        let advantages = flat.combined_advantages(ext_coef, int_coef);
        let advantages_t = Tensor::from_slice(&advantages).to_device(device);

        let mean_of = |xs: &[f32]| xs.iter().map(|&x| x as f64).sum::<f64>() / xs.len() as f64;
        self.sink.log_scalar("returns/advantages", mean_of(&advantages), self.global_step);
        self.sink.log_scalar("returns/ret_ext", mean_of(&flat.ext_returns), self.global_step);
        if self.exploration.dual_value() {
            self.sink.log_scalar("returns/ret_int", mean_of(&flat.int_returns), self.global_step);
        }

        // The predictor trains on the rollout observations normalized with
        // the statistics that were just refreshed from this batch.
        let rnd_obs_t = match &self.exploration {
            Exploration::Rnd(rnd) => {
                let rows: Vec<Vec<f32>> =
                    self.buffer.observations().iter().flatten().cloned().collect();
                Some(rnd.normalized_obs(&rows))
            }
            _ => None,
        };

        let clip_coef = self.cfg.clip_coef;
        let vf_clip = if self.cfg.clip_vloss { Some(clip_coef) } else { None };
        let mut stats = UpdateStats::default();
        let mut clip_fractions: Vec<f64> = Vec::new();

        'epochs: for _epoch in 0..self.cfg.update_epochs {
            let minibatches = loss::minibatch_indices(batch, minibatch_size, &mut self.rng);
            for mb in &minibatches {
                let idx = Tensor::from_slice(mb).to_device(device);
                let mb_input = input_t.index_select(0, &idx);
                let mb_actions = actions_t.index_select(0, &idx);
                let mb_old_log_probs = old_log_probs_t.index_select(0, &idx);
                let mut mb_advantages = advantages_t.index_select(0, &idx);
                if self.cfg.norm_adv {
                    mb_advantages = loss::normalize_advantages(&mb_advantages);
                }

                let out = self.policy.get_action_and_value(&mb_input, Some(&mb_actions));
                let pl = loss::policy_loss(
                    &out.log_probs,
                    &mb_old_log_probs,
                    &mb_advantages,
                    clip_coef,
                );

                let ext_v_loss = loss::value_loss(
                    &out.ext_value,
                    &ext_values_t.index_select(0, &idx),
                    &ext_returns_t.index_select(0, &idx),
                    vf_clip,
                );
                // The intrinsic head is never clipped; head losses sum
                // unweighted.
                let int_v_loss = out.int_value.as_ref().map(|v| {
                    loss::value_loss(
                        v,
                        &int_values_t.index_select(0, &idx),
                        &int_returns_t.index_select(0, &idx),
                        None,
                    )
                });
                let value_loss_total = match &int_v_loss {
                    Some(int) => &ext_v_loss + int,
                    None => ext_v_loss.shallow_clone(),
                };

                let entropy_mean = out.entropy.mean(Kind::Float);
                let aux_loss = match (&self.exploration, &rnd_obs_t) {
                    (Exploration::Rnd(rnd), Some(rnd_obs)) => {
                        Some(rnd.predictor_loss(&rnd_obs.index_select(0, &idx)))
                    }
                    _ => None,
                };

                let mut total = &pl.loss - self.cfg.ent_coef * &entropy_mean
                    + self.cfg.vf_coef * &value_loss_total;
                if let Some(aux) = &aux_loss {
                    total = total + aux;
                }

                self.optimizer.zero_grad();
                total.backward();
                self.optimizer.clip_grad_norm(self.cfg.max_grad_norm);
                self.optimizer.step();

                stats.policy_loss = f64::try_from(&pl.loss).unwrap_or(f64::NAN);
                stats.ext_value_loss = f64::try_from(&ext_v_loss).unwrap_or(f64::NAN);
                stats.int_value_loss = int_v_loss
                    .as_ref()
                    .map(|l| f64::try_from(l).unwrap_or(f64::NAN))
                    .unwrap_or(0.0);
                stats.entropy = f64::try_from(&entropy_mean).unwrap_or(f64::NAN);
                stats.aux_loss = aux_loss
                    .as_ref()
                    .map(|l| f64::try_from(l).unwrap_or(f64::NAN))
                    .unwrap_or(0.0);
                stats.total_loss = f64::try_from(&total).unwrap_or(f64::NAN);
                stats.approx_kl = pl.approx_kl;
                stats.old_approx_kl = pl.old_approx_kl;
                clip_fractions.push(pl.clip_fraction);
                stats.num_minibatches += 1;

                if !stats.total_loss.is_finite() {
                    tracing::warn!(
                        "non-finite loss {} at global step {}",
                        stats.total_loss,
                        self.global_step
                    );
                }
            }

            // Early stop decided on the last minibatch's second-order
            // estimator, as in the reference runs.
            if let Some(target) = self.cfg.target_kl {
                if stats.approx_kl > target {
                    stats.early_stopped = true;
                    break 'epochs;
                }
            }
        }

        if !clip_fractions.is_empty() {
            stats.clip_fraction =
                clip_fractions.iter().sum::<f64>() / clip_fractions.len() as f64;
        }
        stats.explained_variance =
            loss::explained_variance(&flat.ext_values, &flat.ext_returns);
        Ok(stats)
    }

    /// Strategy hook after the optimization pass (RLE weight blending)
    fn post_update(&mut self) {
        if let Exploration::Rle(rle) = &mut self.exploration {
            rle.blend_from_policy(&self.policy);
        }
    }
}
