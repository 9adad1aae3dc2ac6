//! ChainWalk: a deterministic corridor environment
//!
//! A minimal sparse-reward task used by the tests and demos: the agent sits
//! on a 1-D chain of cells, starts at the left end, and receives a reward of
//! +1.0 only upon reaching the right end, which terminates the episode.
//! Transitions are fully deterministic, which makes hand-computed fixtures
//! possible; the seed only exists to satisfy the environment contract.
//!
//! Observations are `[position / length, steps / max_steps]`, so a policy
//! can in principle learn a time-aware value function.

use anyhow::Result;

use super::{Environment, SpaceInfo, SpaceType, StepResult};

const DEFAULT_LENGTH: usize = 10;

/// Deterministic 1-D corridor with a terminal goal on the right
#[derive(Debug)]
pub struct ChainWalk {
    position: usize,
    length: usize,
    steps: usize,
    max_steps: usize,
}

impl ChainWalk {
    /// Create a chain of the default length (10 cells)
    pub fn new() -> Self {
        Self::with_length(DEFAULT_LENGTH)
    }

    /// Create a chain with `length` cells and a step budget of `4 * length`
    pub fn with_length(length: usize) -> Self {
        assert!(length >= 2, "chain needs at least two cells");
        Self { position: 0, length, steps: 0, max_steps: 4 * length }
    }

    fn observation(&self) -> Vec<f32> {
        vec![
            self.position as f32 / self.length as f32,
            self.steps as f32 / self.max_steps as f32,
        ]
    }
}

impl Default for ChainWalk {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for ChainWalk {
    fn reset(&mut self, _seed: Option<u64>) -> Vec<f32> {
        self.position = 0;
        self.steps = 0;
        self.observation()
    }

    fn step(&mut self, action: i64) -> Result<StepResult> {
        // 0 = left, 1 = right
        match action {
            0 => self.position = self.position.saturating_sub(1),
            1 => self.position = (self.position + 1).min(self.length),
            _ => anyhow::bail!("ChainWalk only accepts actions 0 and 1, got {}", action),
        }
        self.steps += 1;

        let terminated = self.position == self.length;
        let truncated = !terminated && self.steps >= self.max_steps;
        let reward = if terminated { 1.0 } else { 0.0 };

        Ok(StepResult { observation: self.observation(), reward, terminated, truncated })
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![2], space_type: SpaceType::Box }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![], space_type: SpaceType::Discrete(2) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_right_reaches_goal() {
        let mut env = ChainWalk::with_length(4);
        env.reset(Some(0));

        for _ in 0..3 {
            let result = env.step(1).unwrap();
            assert!(!result.terminated);
            assert_eq!(result.reward, 0.0);
        }
        let result = env.step(1).unwrap();
        assert!(result.terminated);
        assert_eq!(result.reward, 1.0);
    }

    #[test]
    fn test_left_edge_is_absorbing() {
        let mut env = ChainWalk::with_length(4);
        let start = env.reset(None);
        let result = env.step(0).unwrap();
        assert_eq!(result.observation[0], start[0]);
    }

    #[test]
    fn test_truncation_at_step_budget() {
        let mut env = ChainWalk::with_length(2);
        env.reset(None);

        // Bounce off the left wall until the budget runs out.
        let mut last = None;
        for _ in 0..env.max_steps {
            last = Some(env.step(0).unwrap());
        }
        let last = last.unwrap();
        assert!(last.truncated);
        assert!(!last.terminated);
    }

    #[test]
    fn test_deterministic_replay() {
        let mut a = ChainWalk::new();
        let mut b = ChainWalk::new();
        a.reset(Some(1));
        b.reset(Some(99));

        for action in [1, 1, 0, 1, 1] {
            let ra = a.step(action).unwrap();
            let rb = b.step(action).unwrap();
            assert_eq!(ra.observation, rb.observation);
            assert_eq!(ra.reward, rb.reward);
        }
    }
}
