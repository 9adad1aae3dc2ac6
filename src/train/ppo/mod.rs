//! Proximal Policy Optimization (PPO)
//!
//! This module implements the PPO training core shared by the plain, RND,
//! and RLE experiment variants:
//!
//! ```text
//! For each update iteration:
//!   1. Collect num_steps transitions from num_envs environments
//!   2. Normalize rewards against discounted-return running statistics
//!   3. Compute advantages with GAE (per reward stream)
//!   4. For update_epochs epochs:
//!      a. Shuffle the flattened batch into fixed-size minibatches
//!      b. Compute the clipped surrogate loss (+ value, entropy,
//!         exploration auxiliary terms)
//!      c. Step the optimizer; stop early if approx KL exceeds the target
//! ```
//!
//! # References
//!
//! - [Proximal Policy Optimization Algorithms](https://arxiv.org/abs/1707.06347)
//! - [Exploration by Random Network Distillation](https://arxiv.org/abs/1810.12894)

pub mod collector;
pub mod config;
pub mod loss;
pub mod stats;
pub mod trainer;

pub use config::TrainConfig;
pub use stats::UpdateStats;
pub use trainer::{run, TrainSummary, Trainer};
