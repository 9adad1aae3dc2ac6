//! Rollout buffer storage and data management
//!
//! This module handles the core storage functionality for rollout buffers:
//! pre-allocated `[num_steps, num_envs]` arrays for every recorded field,
//! row-wise recording in strict time order, and flattening into training
//! batches.

/// Rollout buffer for PPO training
///
/// Stores trajectories collected from environment interactions. Two reward
/// and value streams are carried: the extrinsic (task) stream and an
/// intrinsic (exploration bonus) stream. Single-stream setups simply leave
/// the intrinsic arrays at zero.
///
/// `dones[step][env]` is 1.0 if env's episode had ended *before* `step` was
/// taken, i.e. the flag travels one step behind the transition that caused
/// it, matching the advantage recursion in [`super::gae`].
#[derive(Debug, Clone)]
pub struct RolloutBuffer {
    num_steps: usize,
    num_envs: usize,
    obs_dim: usize,
    latent_dim: usize,

    /// Observations [num_steps, num_envs, obs_dim]
    observations: Vec<Vec<Vec<f32>>>,

    /// Exploration latent inputs [num_steps, num_envs, latent_dim]
    latents: Vec<Vec<Vec<f32>>>,

    /// Actions taken [num_steps, num_envs]
    actions: Vec<Vec<i64>>,

    /// Log probabilities of the taken actions [num_steps, num_envs]
    log_probs: Vec<Vec<f32>>,

    /// Extrinsic rewards [num_steps, num_envs]
    rewards: Vec<Vec<f32>>,

    /// Intrinsic rewards [num_steps, num_envs]
    intrinsic_rewards: Vec<Vec<f32>>,

    /// Done-before-step flags [num_steps, num_envs]
    dones: Vec<Vec<f32>>,

    /// Extrinsic value estimates [num_steps, num_envs]
    ext_values: Vec<Vec<f32>>,

    /// Intrinsic value estimates [num_steps, num_envs]
    int_values: Vec<Vec<f32>>,

    /// Computed extrinsic advantages [num_steps, num_envs]
    ext_advantages: Vec<Vec<f32>>,

    /// Computed intrinsic advantages [num_steps, num_envs]
    int_advantages: Vec<Vec<f32>>,

    /// Computed extrinsic returns [num_steps, num_envs]
    ext_returns: Vec<Vec<f32>>,

    /// Computed intrinsic returns [num_steps, num_envs]
    int_returns: Vec<Vec<f32>>,
}

impl RolloutBuffer {
    /// Create a new rollout buffer
    ///
    /// `latent_dim` is 0 unless a latent-conditioned exploration strategy is
    /// active.
    pub fn new(num_steps: usize, num_envs: usize, obs_dim: usize, latent_dim: usize) -> Self {
        let f32_grid = || vec![vec![0.0f32; num_envs]; num_steps];
        Self {
            num_steps,
            num_envs,
            obs_dim,
            latent_dim,
            observations: vec![vec![vec![0.0; obs_dim]; num_envs]; num_steps],
            latents: vec![vec![vec![0.0; latent_dim]; num_envs]; num_steps],
            actions: vec![vec![0; num_envs]; num_steps],
            log_probs: f32_grid(),
            rewards: f32_grid(),
            intrinsic_rewards: f32_grid(),
            dones: f32_grid(),
            ext_values: f32_grid(),
            int_values: f32_grid(),
            ext_advantages: f32_grid(),
            int_advantages: f32_grid(),
            ext_returns: f32_grid(),
            int_returns: f32_grid(),
        }
    }

    /// Record the state seen at `step`: observations, latent inputs, and the
    /// done-before-step flags
    pub fn record_state(
        &mut self,
        step: usize,
        observations: &[Vec<f32>],
        latents: Option<&[Vec<f32>]>,
        dones: &[f32],
    ) {
        debug_assert!(step < self.num_steps, "step {} >= num_steps {}", step, self.num_steps);
        debug_assert_eq!(observations.len(), self.num_envs);
        debug_assert_eq!(dones.len(), self.num_envs);

        for env in 0..self.num_envs {
            debug_assert_eq!(observations[env].len(), self.obs_dim);
            self.observations[step][env].copy_from_slice(&observations[env]);
            self.dones[step][env] = dones[env];
            if let Some(latents) = latents {
                debug_assert_eq!(latents[env].len(), self.latent_dim);
                self.latents[step][env].copy_from_slice(&latents[env]);
            }
        }
    }

    /// Record the policy's decision at `step`
    pub fn record_decision(
        &mut self,
        step: usize,
        actions: &[i64],
        log_probs: &[f32],
        ext_values: &[f32],
        int_values: Option<&[f32]>,
    ) {
        debug_assert!(step < self.num_steps);
        self.actions[step].copy_from_slice(actions);
        self.log_probs[step].copy_from_slice(log_probs);
        self.ext_values[step].copy_from_slice(ext_values);
        if let Some(int_values) = int_values {
            self.int_values[step].copy_from_slice(int_values);
        }
    }

    /// Record the rewards observed after stepping the environments at `step`
    pub fn record_rewards(&mut self, step: usize, rewards: &[f32], intrinsic: Option<&[f32]>) {
        debug_assert!(step < self.num_steps);
        self.rewards[step].copy_from_slice(rewards);
        if let Some(intrinsic) = intrinsic {
            self.intrinsic_rewards[step].copy_from_slice(intrinsic);
        }
    }

    /// Get buffer shape (num_steps, num_envs, obs_dim)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.num_steps, self.num_envs, self.obs_dim)
    }

    /// Latent input dimensionality (0 when unused)
    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    /// Total number of transitions per rollout
    pub fn len(&self) -> usize {
        self.num_steps * self.num_envs
    }

    /// Check if the buffer holds no transitions
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat batch index of `(step, env)` — the permutation every flattened
    /// field shares
    pub fn flat_index(&self, step: usize, env: usize) -> usize {
        step * self.num_envs + env
    }

    // Getters for raw data access
    /// Observations [num_steps][num_envs][obs_dim]
    pub fn observations(&self) -> &[Vec<Vec<f32>>] {
        &self.observations
    }
    /// Done-before-step flags [num_steps][num_envs]
    pub fn dones(&self) -> &[Vec<f32>] {
        &self.dones
    }
    /// Extrinsic rewards [num_steps][num_envs]
    pub fn rewards(&self) -> &[Vec<f32>] {
        &self.rewards
    }
    /// Mutable extrinsic rewards (for reward normalization)
    pub fn rewards_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.rewards
    }
    /// Intrinsic rewards [num_steps][num_envs]
    pub fn intrinsic_rewards(&self) -> &[Vec<f32>] {
        &self.intrinsic_rewards
    }
    /// Mutable intrinsic rewards (for reward normalization)
    pub fn intrinsic_rewards_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.intrinsic_rewards
    }
    /// Extrinsic value estimates [num_steps][num_envs]
    pub fn ext_values(&self) -> &[Vec<f32>] {
        &self.ext_values
    }
    /// Intrinsic value estimates [num_steps][num_envs]
    pub fn int_values(&self) -> &[Vec<f32>] {
        &self.int_values
    }
    /// Extrinsic advantages [num_steps][num_envs]
    pub fn ext_advantages(&self) -> &[Vec<f32>] {
        &self.ext_advantages
    }
    /// Intrinsic advantages [num_steps][num_envs]
    pub fn int_advantages(&self) -> &[Vec<f32>] {
        &self.int_advantages
    }

    /// Mutable extrinsic advantage/return grids for the GAE pass
    pub fn ext_advantages_and_returns_mut(&mut self) -> (&mut [Vec<f32>], &mut [Vec<f32>]) {
        (&mut self.ext_advantages, &mut self.ext_returns)
    }

    /// Mutable intrinsic advantage/return grids for the GAE pass
    pub fn int_advantages_and_returns_mut(&mut self) -> (&mut [Vec<f32>], &mut [Vec<f32>]) {
        (&mut self.int_advantages, &mut self.int_returns)
    }

    /// Flatten every field to `[num_steps * num_envs]` in time-major order
    pub fn flatten(&self) -> FlatRollout {
        let batch = self.len();
        let mut flat = FlatRollout {
            observations: Vec::with_capacity(batch * self.obs_dim),
            latents: Vec::with_capacity(batch * self.latent_dim),
            actions: Vec::with_capacity(batch),
            log_probs: Vec::with_capacity(batch),
            ext_values: Vec::with_capacity(batch),
            int_values: Vec::with_capacity(batch),
            ext_advantages: Vec::with_capacity(batch),
            int_advantages: Vec::with_capacity(batch),
            ext_returns: Vec::with_capacity(batch),
            int_returns: Vec::with_capacity(batch),
            obs_dim: self.obs_dim,
            latent_dim: self.latent_dim,
        };

        for step in 0..self.num_steps {
            for env in 0..self.num_envs {
                flat.observations.extend_from_slice(&self.observations[step][env]);
                flat.latents.extend_from_slice(&self.latents[step][env]);
                flat.actions.push(self.actions[step][env]);
                flat.log_probs.push(self.log_probs[step][env]);
                flat.ext_values.push(self.ext_values[step][env]);
                flat.int_values.push(self.int_values[step][env]);
                flat.ext_advantages.push(self.ext_advantages[step][env]);
                flat.int_advantages.push(self.int_advantages[step][env]);
                flat.ext_returns.push(self.ext_returns[step][env]);
                flat.int_returns.push(self.int_returns[step][env]);
            }
        }
        flat
    }
}

/// Flattened rollout data, ready to become training tensors
///
/// All arrays share the time-major permutation: sample `i` corresponds to
/// `(step, env) = (i / num_envs, i % num_envs)`.
#[derive(Debug, Clone)]
pub struct FlatRollout {
    /// Observations [batch * obs_dim]
    pub observations: Vec<f32>,

    /// Latent inputs [batch * latent_dim]
    pub latents: Vec<f32>,

    /// Actions [batch]
    pub actions: Vec<i64>,

    /// Old log probabilities [batch]
    pub log_probs: Vec<f32>,

    /// Old extrinsic values [batch]
    pub ext_values: Vec<f32>,

    /// Old intrinsic values [batch]
    pub int_values: Vec<f32>,

    /// Extrinsic advantages [batch]
    pub ext_advantages: Vec<f32>,

    /// Intrinsic advantages [batch]
    pub int_advantages: Vec<f32>,

    /// Extrinsic returns [batch]
    pub ext_returns: Vec<f32>,

    /// Intrinsic returns [batch]
    pub int_returns: Vec<f32>,

    /// Observation dimensionality
    pub obs_dim: usize,

    /// Latent dimensionality
    pub latent_dim: usize,
}

impl FlatRollout {
    /// Batch size
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Combined advantages: `ext_coef * A_ext + int_coef * A_int`
    pub fn combined_advantages(&self, ext_coef: f32, int_coef: f32) -> Vec<f32> {
        self.ext_advantages
            .iter()
            .zip(&self.int_advantages)
            .map(|(&e, &i)| ext_coef * e + int_coef * i)
            .collect()
    }
}
