//! End-to-end smoke runs: each exploration variant trains for a few updates
//! on ChainWalk and must produce finite losses and the exact configured
//! number of environment steps.

use std::sync::{Arc, Mutex};

use wander_rl::env::chain::ChainWalk;
use wander_rl::explore::{ExploreConfig, RleConfig, RndConfig};
use wander_rl::metrics::{MemorySink, ScalarSink};
use wander_rl::train::ppo::{config::TrainConfig, trainer::run};

/// Sink handle the test can keep after `run` consumes the box
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<MemorySink>>);

impl ScalarSink for SharedSink {
    fn log_scalar(&mut self, name: &str, value: f64, step: u64) {
        self.0.lock().unwrap().log_scalar(name, value, step);
    }
}

impl SharedSink {
    fn last(&self, name: &str) -> Option<f64> {
        self.0.lock().unwrap().last(name)
    }
}

fn tiny_config() -> TrainConfig {
    TrainConfig {
        env_id: "ChainWalk".into(),
        seed: 3,
        num_envs: 4,
        num_steps: 16,
        total_timesteps: 256,
        learning_rate: 1e-3,
        num_minibatches: 4,
        update_epochs: 2,
        ..Default::default()
    }
}

fn assert_finite_losses(sink: &SharedSink) {
    for name in ["losses/policy_loss", "losses/value_loss", "losses/entropy"] {
        let value = sink.last(name).unwrap_or_else(|| panic!("{} never logged", name));
        assert!(value.is_finite(), "{} = {}", name, value);
    }
}

#[test]
fn plain_ppo_trains_on_chain_walk() {
    let sink = SharedSink::default();
    let summary =
        run(tiny_config(), |_| ChainWalk::new(), Box::new(sink.clone())).unwrap();

    assert_eq!(summary.global_step, 256);
    assert_eq!(summary.num_updates, 4);
    assert!(summary.episodes_completed > 0);
    assert_finite_losses(&sink);
    assert!(sink.last("charts/episodic_length").is_some());
}

#[test]
fn rnd_variant_trains_with_dual_streams() {
    let mut cfg = tiny_config();
    cfg.norm_reward = true;
    cfg.exploration = ExploreConfig::Rnd(RndConfig {
        output_size: 32,
        predictor_width: 32,
        target_width: 16,
        obs_norm_init_iters: 1,
        ..Default::default()
    });

    let sink = SharedSink::default();
    let summary = run(cfg, |_| ChainWalk::new(), Box::new(sink.clone())).unwrap();

    assert_eq!(summary.global_step, 256);
    assert_finite_losses(&sink);

    // The predictor loss and the intrinsic stream must both be live.
    let aux = sink.last("losses/aux_loss").unwrap();
    assert!(aux.is_finite() && aux >= 0.0);
    assert!(sink.last("rewards/intrinsic_mean").unwrap().is_finite());
    assert!(sink.last("losses/int_value_loss").unwrap().is_finite());
}

#[test]
fn rle_variant_trains_with_latent_inputs() {
    let mut cfg = tiny_config();
    cfg.exploration = ExploreConfig::Rle(RleConfig {
        feature_size: 4,
        latent_reset_interval: 8,
        ..Default::default()
    });

    let sink = SharedSink::default();
    let summary = run(cfg, |_| ChainWalk::new(), Box::new(sink.clone())).unwrap();

    assert_eq!(summary.global_step, 256);
    assert_finite_losses(&sink);
    // Single value head: the intrinsic head loss stays at zero.
    assert_eq!(sink.last("losses/int_value_loss"), Some(0.0));
}

#[test]
fn target_kl_config_is_honored() {
    let mut cfg = tiny_config();
    cfg.target_kl = Some(1e-9);
    let summary =
        run(cfg, |_| ChainWalk::new(), Box::new(wander_rl::metrics::NoopSink)).unwrap();
    // With a vanishing KL budget the run still completes every update.
    assert_eq!(summary.num_updates, 4);
}

#[test]
fn invalid_config_fails_before_training() {
    let cfg = TrainConfig {
        num_envs: 3,
        num_steps: 5,
        num_minibatches: 4,
        total_timesteps: 300,
        ..Default::default()
    };
    let err = run(cfg, |_| ChainWalk::new(), Box::new(wander_rl::metrics::NoopSink))
        .unwrap_err();
    assert!(err.to_string().contains("not divisible"));
}
