//! Experience buffers and advantage estimation

pub mod rollout;
