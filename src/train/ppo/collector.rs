//! Rollout collection
//!
//! Drives the vectorized environments for `num_steps` steps, recording every
//! transition into the rollout buffer in strict time order. Intrinsic
//! rewards are computed inline, per step, because they depend on the next
//! observation the moment it arrives; the RLE latent lifecycle advances here
//! for the same reason.

use anyhow::Result;
use tch::{Device, Tensor};

use crate::env::Environment;
use crate::explore::Exploration;

use super::trainer::Trainer;

/// Stack per-environment rows into a `[rows, dim]` tensor
pub(crate) fn rows_to_tensor(rows: &[Vec<f32>], device: Device) -> Tensor {
    let dim = rows.first().map_or(0, |r| r.len());
    let mut flat = Vec::with_capacity(rows.len() * dim);
    for row in rows {
        flat.extend_from_slice(row);
    }
    Tensor::from_slice(&flat)
        .view([rows.len() as i64, dim as i64])
        .to_device(device)
}

/// Collect one rollout of `num_steps * num_envs` transitions
pub(crate) fn collect_rollout<E: Environment>(t: &mut Trainer<E>) -> Result<()> {
    let num_steps = t.cfg.num_steps;
    let num_envs = t.cfg.num_envs;
    let reward_scaler = t.cfg.reward_scaler;
    let mut rle_features: Vec<Vec<f32>> = Vec::new();

    for step in 0..num_steps {
        t.global_step += num_envs as u64;

        let latent_rows: Option<Vec<Vec<f32>>> = match &t.exploration {
            Exploration::Rle(rle) => Some(rle.latent_rows().to_vec()),
            _ => None,
        };
        t.buffer.record_state(step, &t.next_obs, latent_rows.as_deref(), &t.next_done);

        // Act under the current policy; nothing here needs gradients.
        let obs_t = rows_to_tensor(&t.next_obs, t.device);
        let input_t = match &t.exploration {
            Exploration::Rle(rle) => Tensor::cat(&[obs_t, rle.latents().shallow_clone()], 1),
            _ => obs_t,
        };
        let out = tch::no_grad(|| t.policy.get_action_and_value(&input_t, None));

        let actions: Vec<i64> = Vec::try_from(&out.actions.to_device(Device::Cpu))?;
        let log_probs: Vec<f32> = Vec::try_from(&out.log_probs.to_device(Device::Cpu))?;
        let ext_values: Vec<f32> = Vec::try_from(&out.ext_value.to_device(Device::Cpu))?;
        let int_values: Option<Vec<f32>> = match &out.int_value {
            Some(v) => Some(Vec::try_from(&v.to_device(Device::Cpu))?),
            None => None,
        };
        t.buffer.record_decision(step, &actions, &log_probs, &ext_values, int_values.as_deref());

        let pool_step = t.pool.step(&actions)?;

        let done_flags: Vec<bool> = pool_step
            .terminated
            .iter()
            .zip(&pool_step.truncated)
            .map(|(&term, &trunc)| term || trunc)
            .collect();
        for stats in pool_step.episodes.iter().flatten() {
            t.sink.log_scalar(
                "charts/episodic_return",
                stats.episode_return as f64,
                t.global_step,
            );
            t.sink.log_scalar(
                "charts/episodic_length",
                stats.episode_length as f64,
                t.global_step,
            );
            t.episodes_completed += 1;
        }

        let scaled: Vec<f32> =
            pool_step.rewards.iter().map(|&r| r * reward_scaler).collect();

        match &mut t.exploration {
            Exploration::None => {
                t.buffer.record_rewards(step, &scaled, None);
            }
            Exploration::Rnd(rnd) => {
                // Prediction error on the next observation is the bonus; it
                // lives in its own reward stream.
                let intrinsic = rnd.intrinsic_reward(&pool_step.observations)?;
                t.buffer.record_rewards(step, &scaled, Some(&intrinsic));
            }
            Exploration::Rle(rle) => {
                // Alignment bonus folds straight into the task reward.
                let next_obs_t = rows_to_tensor(&pool_step.observations, t.device);
                let (intrinsic, features) = rle.intrinsic_reward(&next_obs_t)?;
                let int_coef = rle.config().int_coef;
                let combined: Vec<f32> = scaled
                    .iter()
                    .zip(&intrinsic)
                    .map(|(&ext, &int)| ext + int_coef * int)
                    .collect();
                t.buffer.record_rewards(step, &combined, None);
                rle_features.extend(features);
                rle.refresh_latents(&done_flags)?;
            }
        }

        t.next_obs = pool_step.observations;
        t.next_done = done_flags.iter().map(|&d| if d { 1.0 } else { 0.0 }).collect();
    }

    // Per-rollout statistics updates for the strategies.
    match &mut t.exploration {
        Exploration::Rnd(rnd) => {
            let rows: Vec<Vec<f32>> =
                t.buffer.observations().iter().flatten().cloned().collect();
            rnd.update_obs_stats(&rows);
        }
        Exploration::Rle(rle) => {
            rle.update_feature_stats(&rle_features);
        }
        Exploration::None => {}
    }

    Ok(())
}
