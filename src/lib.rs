//! # Wander
//!
//! On-policy actor-critic reinforcement learning in Rust + PyTorch (via
//! tch-rs), built around a single generic PPO core with pluggable intrinsic
//! exploration strategies.
//!
//! The crate implements:
//! - Clipped-objective PPO over vectorized environments
//! - Generalized Advantage Estimation with dual (extrinsic/intrinsic) streams
//! - Reward normalization via discounted-return running statistics
//! - Random Network Distillation (RND) exploration bonus
//! - Random Latent Exploration (RLE) with a slowly-blended feature network
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wander_rl::env::chain::ChainWalk;
//! use wander_rl::metrics::NoopSink;
//! use wander_rl::train::ppo::{config::TrainConfig, trainer::run};
//!
//! let cfg = TrainConfig::default();
//! run(cfg, |_| ChainWalk::new(), Box::new(NoopSink)).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Environment traits and implementations
pub mod env;

/// Experience buffers and advantage estimation
pub mod buffer;

/// Policy and value network implementations
pub mod policy;

/// Intrinsic exploration strategies (RND, RLE)
pub mod explore;

/// Training algorithms (PPO core)
pub mod train;

/// Scalar metric sinks for experiment logging
pub mod metrics;

/// Utility functions and helpers
pub mod utils;

/// Current version of wander-rl
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
    }
}
