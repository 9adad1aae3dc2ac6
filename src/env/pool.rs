//! Vectorized environment pool for synchronous batched stepping
//!
//! `EnvPool` manages N environment replicas and steps them together. The
//! replicas are fanned out over Rayon's thread pool, but the call blocks
//! until every replica has returned, so from the trainer's perspective a
//! step is a single synchronous operation: no policy inference ever overlaps
//! environment stepping.
//!
//! The pool also takes over two chores the training loop relies on:
//!
//! - **Auto-reset**: when a replica terminates or truncates, the pool resets
//!   it immediately and returns the new episode's first observation, along
//!   with an [`EpisodeStats`] summary of the finished episode.
//! - **Action validation**: an action outside the declared discrete action
//!   space is a contract violation and fails the whole step with a
//!   descriptive error; it is never silently clamped.

use anyhow::{bail, Result};
use rayon::prelude::*;

use crate::env::{Environment, EpisodeStats, SpaceInfo};

/// A pool of environment replicas stepped in lockstep
pub struct EnvPool<E: Environment> {
    envs: Vec<E>,
    num_envs: usize,
    num_actions: usize,
    ep_returns: Vec<f32>,
    ep_lengths: Vec<u32>,
}

/// Result of stepping the whole pool once
///
/// All vectors have length `num_envs` and are indexed by environment slot.
/// `observations[i]` is the *next* observation for slot `i`; if that slot
/// finished an episode this step, it is the first observation of the fresh
/// episode and `episodes[i]` carries the finished episode's summary.
#[derive(Debug, Clone)]
pub struct PoolStep {
    /// Next observations (post auto-reset)
    pub observations: Vec<Vec<f32>>,

    /// Raw rewards
    pub rewards: Vec<f32>,

    /// Termination flags
    pub terminated: Vec<bool>,

    /// Truncation flags
    pub truncated: Vec<bool>,

    /// Episode summaries for slots that finished this step
    pub episodes: Vec<Option<EpisodeStats>>,
}

impl<E: Environment> EnvPool<E> {
    /// Create a new pool from an environment factory
    ///
    /// The factory receives the replica index so environments can
    /// differentiate themselves if they need to.
    pub fn new<F>(env_fn: F, num_envs: usize) -> Result<Self>
    where
        F: Fn(usize) -> E,
    {
        if num_envs == 0 {
            bail!("EnvPool requires at least one environment");
        }
        let envs: Vec<E> = (0..num_envs).map(&env_fn).collect();
        let num_actions = match envs[0].action_space().discrete_n() {
            Some(n) if n > 0 => n,
            _ => bail!("EnvPool only supports non-empty discrete action spaces"),
        };
        Ok(Self {
            envs,
            num_envs,
            num_actions,
            ep_returns: vec![0.0; num_envs],
            ep_lengths: vec![0; num_envs],
        })
    }

    /// Reset all environments, seeding replica `i` with `base_seed + i`
    pub fn reset(&mut self, base_seed: u64) -> Vec<Vec<f32>> {
        self.ep_returns.iter_mut().for_each(|r| *r = 0.0);
        self.ep_lengths.iter_mut().for_each(|l| *l = 0);
        self.envs
            .iter_mut()
            .enumerate()
            .map(|(i, env)| env.reset(Some(base_seed + i as u64)))
            .collect()
    }

    /// Step every replica with its action and auto-reset finished episodes
    pub fn step(&mut self, actions: &[i64]) -> Result<PoolStep> {
        if actions.len() != self.num_envs {
            bail!(
                "expected {} actions, got {}",
                self.num_envs,
                actions.len()
            );
        }
        for (i, &a) in actions.iter().enumerate() {
            if a < 0 || a >= self.num_actions as i64 {
                bail!(
                    "action {} for env {} outside discrete action space of size {}",
                    a,
                    i,
                    self.num_actions
                );
            }
        }

        // Each replica owns its state and RNG, so the fan-out is
        // deterministic regardless of thread scheduling.
        let results: Result<Vec<_>> = self
            .envs
            .par_iter_mut()
            .zip(actions.par_iter())
            .map(|(env, &action)| {
                let result = env.step(action)?;
                let obs = if result.terminated || result.truncated {
                    env.reset(None)
                } else {
                    result.observation.clone()
                };
                Ok((result, obs))
            })
            .collect();
        let results = results?;

        let mut step = PoolStep {
            observations: Vec::with_capacity(self.num_envs),
            rewards: Vec::with_capacity(self.num_envs),
            terminated: Vec::with_capacity(self.num_envs),
            truncated: Vec::with_capacity(self.num_envs),
            episodes: Vec::with_capacity(self.num_envs),
        };

        for (i, (result, next_obs)) in results.into_iter().enumerate() {
            self.ep_returns[i] += result.reward;
            self.ep_lengths[i] += 1;

            let finished = result.terminated || result.truncated;
            let episode = if finished {
                let stats = EpisodeStats {
                    episode_return: self.ep_returns[i],
                    episode_length: self.ep_lengths[i],
                };
                self.ep_returns[i] = 0.0;
                self.ep_lengths[i] = 0;
                Some(stats)
            } else {
                None
            };

            step.observations.push(next_obs);
            step.rewards.push(result.reward);
            step.terminated.push(result.terminated);
            step.truncated.push(result.truncated);
            step.episodes.push(episode);
        }

        Ok(step)
    }

    /// Get the number of environments in the pool
    pub fn num_envs(&self) -> usize {
        self.num_envs
    }

    /// Get observation space information from the first environment
    pub fn observation_space(&self) -> SpaceInfo {
        self.envs[0].observation_space()
    }

    /// Get action space information from the first environment
    pub fn action_space(&self) -> SpaceInfo {
        self.envs[0].action_space()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::chain::ChainWalk;

    #[test]
    fn test_pool_creation() {
        let pool = EnvPool::new(|_| ChainWalk::new(), 4).unwrap();
        assert_eq!(pool.num_envs(), 4);
    }

    #[test]
    fn test_pool_reset_shapes() {
        let mut pool = EnvPool::new(|_| ChainWalk::new(), 4).unwrap();
        let observations = pool.reset(7);
        assert_eq!(observations.len(), 4);
        for obs in observations {
            assert_eq!(obs.len(), pool.observation_space().flat_dim());
        }
    }

    #[test]
    fn test_pool_step_shapes() {
        let mut pool = EnvPool::new(|_| ChainWalk::new(), 4).unwrap();
        pool.reset(0);

        let step = pool.step(&[0, 1, 0, 1]).unwrap();
        assert_eq!(step.observations.len(), 4);
        assert_eq!(step.rewards.len(), 4);
        assert_eq!(step.terminated.len(), 4);
        assert_eq!(step.episodes.len(), 4);
    }

    #[test]
    fn test_pool_rejects_out_of_range_action() {
        let mut pool = EnvPool::new(|_| ChainWalk::new(), 2).unwrap();
        pool.reset(0);

        let err = pool.step(&[0, 5]).unwrap_err();
        assert!(err.to_string().contains("outside discrete action space"));

        let err = pool.step(&[-1, 0]).unwrap_err();
        assert!(err.to_string().contains("outside discrete action space"));
    }

    #[test]
    fn test_pool_rejects_wrong_action_count() {
        let mut pool = EnvPool::new(|_| ChainWalk::new(), 4).unwrap();
        pool.reset(0);
        assert!(pool.step(&[0, 1]).is_err());
    }

    #[test]
    fn test_pool_auto_reset_reports_episode() {
        let mut pool = EnvPool::new(|_| ChainWalk::with_length(3), 1).unwrap();
        pool.reset(0);

        // Walk right until the goal is reached; the pool must hand back the
        // fresh episode's observation together with the episode summary.
        let mut finished = None;
        for _ in 0..10 {
            let step = pool.step(&[1]).unwrap();
            if let Some(stats) = step.episodes[0] {
                finished = Some((stats, step.observations[0].clone()));
                break;
            }
        }
        let (stats, obs) = finished.expect("episode should finish within 10 steps");
        assert_eq!(stats.episode_length, 3);
        assert!(stats.episode_return > 0.0);
        // First observation of the new episode: back at the start.
        assert_eq!(obs[0], 0.0);
    }
}
