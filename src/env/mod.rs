//! Environment traits and implementations
//!
//! This module defines the core environment interface the training loop
//! depends on. Concrete environments (grid worlds, control tasks, ...) are
//! external collaborators; the trainer only ever touches the narrow
//! `reset`/`step` surface defined here, vectorized by [`pool::EnvPool`].

use anyhow::Result;

/// Core trait for RL environments
///
/// Implementations must be deterministic given their seed: the same seed and
/// action sequence must produce the same observations and rewards.
pub trait Environment: Send {
    /// Reset the environment and return the initial observation
    ///
    /// A `Some(seed)` reseeds the environment's internal randomness; `None`
    /// continues from the existing random stream (used by auto-reset).
    fn reset(&mut self, seed: Option<u64>) -> Vec<f32>;

    /// Step the environment with a discrete action
    fn step(&mut self, action: i64) -> Result<StepResult>;

    /// Get the observation space dimensions
    fn observation_space(&self) -> SpaceInfo;

    /// Get the action space dimensions
    fn action_space(&self) -> SpaceInfo;
}

/// Result of an environment step
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Next observation
    pub observation: Vec<f32>,

    /// Reward received
    pub reward: f32,

    /// Whether the episode terminated
    pub terminated: bool,

    /// Whether the episode was truncated
    pub truncated: bool,
}

/// Space information for observations and actions
#[derive(Debug, Clone)]
pub struct SpaceInfo {
    /// Shape of the space
    pub shape: Vec<usize>,

    /// Data type
    pub space_type: SpaceType,
}

/// Space data types
#[derive(Debug, Clone, Copy)]
pub enum SpaceType {
    /// Discrete space with n options
    Discrete(usize),

    /// Continuous space (Box)
    Box,
}

impl SpaceInfo {
    /// Number of discrete actions, if this is a discrete space
    pub fn discrete_n(&self) -> Option<usize> {
        match self.space_type {
            SpaceType::Discrete(n) => Some(n),
            SpaceType::Box => None,
        }
    }

    /// Flattened dimensionality of the space
    pub fn flat_dim(&self) -> usize {
        self.shape.iter().product::<usize>().max(1)
    }
}

/// Summary of a finished episode (return and length)
///
/// Produced by [`pool::EnvPool`] when an environment terminates or truncates,
/// mirroring gym's `RecordEpisodeStatistics` info payload.
#[derive(Debug, Clone, Copy)]
pub struct EpisodeStats {
    /// Undiscounted sum of raw rewards over the episode
    pub episode_return: f32,

    /// Number of steps in the episode
    pub episode_length: u32,
}

pub mod chain;
pub mod pool;
