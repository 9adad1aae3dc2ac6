//! Generalized Advantage Estimation (GAE) computation
//!
//! Implements the GAE recursion from "High-Dimensional Continuous Control
//! Using Generalized Advantage Estimation" (Schulman et al., 2016):
//!
//! ```text
//! delta_t = r_t + gamma * V(s_{t+1}) * (1 - done_{t+1}) - V(s_t)
//! A_t     = delta_t + gamma * lambda * (1 - done_{t+1}) * A_{t+1}
//! ```
//!
//! Time runs in reverse; at the rollout boundary `t = T-1` the `(1 -
//! done_{t+1})` mask comes from the externally supplied next-done flags and
//! `V(s_{t+1})` from the bootstrap values. Each stream (extrinsic,
//! intrinsic) gets its own pass with its own discount; the intrinsic stream
//! is non-episodic, so its mask is identically 1 and value bootstrapping
//! ignores episode boundaries.

use super::storage::RolloutBuffer;

/// Compute one GAE pass over `[num_steps][num_envs]` grids
///
/// `dones[t][env]` is the done-before-step flag; `next_done`/`next_values`
/// describe the state after the final step. With `episodic = false` every
/// non-terminal mask is 1.
///
/// Returns are written as `advantage + value`.
#[allow(clippy::too_many_arguments)]
pub fn advantage_pass(
    rewards: &[Vec<f32>],
    values: &[Vec<f32>],
    dones: &[Vec<f32>],
    next_done: &[f32],
    next_values: &[f32],
    gamma: f32,
    gae_lambda: f32,
    episodic: bool,
    advantages: &mut [Vec<f32>],
    returns: &mut [Vec<f32>],
) {
    let num_steps = rewards.len();
    if num_steps == 0 {
        return;
    }
    let num_envs = rewards[0].len();
    debug_assert_eq!(next_done.len(), num_envs, "next_done length mismatch");
    debug_assert_eq!(next_values.len(), num_envs, "next_values length mismatch");

    for env in 0..num_envs {
        let mut lastgaelam = 0.0f32;
        for t in (0..num_steps).rev() {
            let (next_nonterminal, next_value) = if t == num_steps - 1 {
                let mask = if episodic { 1.0 - next_done[env] } else { 1.0 };
                (mask, next_values[env])
            } else {
                let mask = if episodic { 1.0 - dones[t + 1][env] } else { 1.0 };
                (mask, values[t + 1][env])
            };

            let delta = rewards[t][env] + gamma * next_value * next_nonterminal - values[t][env];
            lastgaelam = delta + gamma * gae_lambda * next_nonterminal * lastgaelam;

            advantages[t][env] = lastgaelam;
            returns[t][env] = lastgaelam + values[t][env];
        }
    }
}

/// Run the extrinsic (episodic) GAE pass over a rollout buffer
pub fn compute_extrinsic(
    buffer: &mut RolloutBuffer,
    next_done: &[f32],
    next_values: &[f32],
    gamma: f32,
    gae_lambda: f32,
) {
    let rewards = buffer.rewards().to_vec();
    let values = buffer.ext_values().to_vec();
    let dones = buffer.dones().to_vec();
    let (advantages, returns) = buffer.ext_advantages_and_returns_mut();
    advantage_pass(
        &rewards,
        &values,
        &dones,
        next_done,
        next_values,
        gamma,
        gae_lambda,
        true,
        advantages,
        returns,
    );
}

/// Run the intrinsic (non-episodic) GAE pass over a rollout buffer
pub fn compute_intrinsic(
    buffer: &mut RolloutBuffer,
    next_values: &[f32],
    gamma: f32,
    gae_lambda: f32,
) {
    let rewards = buffer.intrinsic_rewards().to_vec();
    let values = buffer.int_values().to_vec();
    let dones = buffer.dones().to_vec();
    let next_done = vec![0.0; next_values.len()];
    let (advantages, returns) = buffer.int_advantages_and_returns_mut();
    advantage_pass(
        &rewards,
        &values,
        &dones,
        &next_done,
        next_values,
        gamma,
        gae_lambda,
        false,
        advantages,
        returns,
    );
}
