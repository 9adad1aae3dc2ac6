//! Training algorithms
//!
//! One generic on-policy PPO core drives all experiment variants; the
//! exploration strategy is the only moving part.

pub mod ppo;
