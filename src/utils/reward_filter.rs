//! Discounted reward accumulator for reward normalization
//!
//! The reward-normalization scheme divides raw rewards by the running
//! standard deviation of the *discounted* reward stream, not the raw stream.
//! This filter produces that discounted stream: one exponential accumulator
//! per environment slot, reset whenever that slot's episode ended.

/// Per-environment exponentially discounted reward accumulator
#[derive(Debug, Clone)]
pub struct RewardFilter {
    gamma: f32,
    acc: Vec<f32>,
}

impl RewardFilter {
    /// Create a filter over `num_envs` slots with discount `gamma`
    pub fn new(gamma: f32, num_envs: usize) -> Self {
        Self { gamma, acc: vec![0.0; num_envs] }
    }

    /// Fold one step of rewards into the accumulators
    ///
    /// `not_done[i]` is 1.0 while slot `i`'s episode is still running. On a
    /// running slot the accumulator decays: `acc = acc * gamma + reward`. On
    /// a finished slot the accumulator is overwritten with the raw reward
    /// (decay reset, not decayed).
    ///
    /// Returns an owned snapshot of the accumulator vector; later updates do
    /// not show through it.
    pub fn update(&mut self, rewards: &[f32], not_done: &[f32]) -> Vec<f32> {
        debug_assert_eq!(rewards.len(), self.acc.len(), "reward slot count mismatch");
        debug_assert_eq!(not_done.len(), self.acc.len(), "mask slot count mismatch");

        for i in 0..self.acc.len() {
            if not_done[i] == 0.0 {
                self.acc[i] = rewards[i];
            } else {
                self.acc[i] = self.acc[i] * self.gamma + rewards[i];
            }
        }
        self.acc.clone()
    }

    /// Number of environment slots
    pub fn num_envs(&self) -> usize {
        self.acc.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_and_reset() {
        // rewards [1,1,1] with not_done [1,1,0] at gamma 0.5:
        // step 1: 0*0.5 + 1   = 1
        // step 2: 1*0.5 + 1   = 1.5
        // step 3: reset -> raw = 1
        let mut filter = RewardFilter::new(0.5, 1);
        assert_eq!(filter.update(&[1.0], &[1.0]), vec![1.0]);
        assert_eq!(filter.update(&[1.0], &[1.0]), vec![1.5]);
        assert_eq!(filter.update(&[1.0], &[0.0]), vec![1.0]);
    }

    #[test]
    fn test_slots_are_independent() {
        let mut filter = RewardFilter::new(0.9, 2);
        filter.update(&[1.0, 2.0], &[1.0, 1.0]);
        let snap = filter.update(&[1.0, 2.0], &[1.0, 0.0]);
        assert!((snap[0] - 1.9).abs() < 1e-6);
        assert_eq!(snap[1], 2.0); // reset slot got the raw reward
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut filter = RewardFilter::new(0.5, 1);
        let snap = filter.update(&[1.0], &[1.0]);
        filter.update(&[100.0], &[1.0]);
        assert_eq!(snap, vec![1.0]);
    }
}
