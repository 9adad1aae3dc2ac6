//! Training statistics for PPO updates

use crate::metrics::ScalarSink;

/// Diagnostics from one PPO update iteration
///
/// Loss fields carry the last minibatch's values (the reference behavior);
/// `clip_fraction` is averaged over every minibatch of the update. The
/// `approx_kl` value is the one the early-stop decision used.
#[derive(Debug, Clone, Default)]
pub struct UpdateStats {
    /// Clipped surrogate policy loss
    pub policy_loss: f64,

    /// Extrinsic value head loss
    pub ext_value_loss: f64,

    /// Intrinsic value head loss (0 without dual heads)
    pub int_value_loss: f64,

    /// Mean policy entropy
    pub entropy: f64,

    /// Exploration auxiliary loss (0 without one)
    pub aux_loss: f64,

    /// Total optimized loss
    pub total_loss: f64,

    /// Approximate KL divergence, `mean((ratio - 1) - log ratio)`
    pub approx_kl: f64,

    /// Simpler KL estimator `mean(-log ratio)`, logged for comparison
    pub old_approx_kl: f64,

    /// Fraction of clipped samples, averaged over minibatches
    pub clip_fraction: f64,

    /// Explained variance of the extrinsic value predictions
    pub explained_variance: f64,

    /// Gradient minibatch steps taken this update
    pub num_minibatches: usize,

    /// Whether the KL early stop fired
    pub early_stopped: bool,
}

impl UpdateStats {
    /// Report every diagnostic to the scalar sink
    pub fn log_to(&self, sink: &mut dyn ScalarSink, global_step: u64) {
        sink.log_scalar("losses/policy_loss", self.policy_loss, global_step);
        sink.log_scalar("losses/ext_value_loss", self.ext_value_loss, global_step);
        sink.log_scalar("losses/int_value_loss", self.int_value_loss, global_step);
        sink.log_scalar(
            "losses/value_loss",
            self.ext_value_loss + self.int_value_loss,
            global_step,
        );
        sink.log_scalar("losses/entropy", self.entropy, global_step);
        sink.log_scalar("losses/aux_loss", self.aux_loss, global_step);
        sink.log_scalar("losses/all_loss", self.total_loss, global_step);
        sink.log_scalar("losses/approx_kl", self.approx_kl, global_step);
        sink.log_scalar("losses/old_approx_kl", self.old_approx_kl, global_step);
        sink.log_scalar("losses/clipfrac", self.clip_fraction, global_step);
        sink.log_scalar(
            "losses/explained_variance",
            self.explained_variance,
            global_step,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MemorySink;

    #[test]
    fn test_log_to_reports_all_losses() {
        let stats = UpdateStats {
            policy_loss: -0.1,
            ext_value_loss: 0.4,
            int_value_loss: 0.2,
            ..Default::default()
        };
        let mut sink = MemorySink::default();
        stats.log_to(&mut sink, 128);

        assert_eq!(sink.last("losses/policy_loss"), Some(-0.1));
        assert_eq!(sink.last("losses/value_loss"), Some(0.6000000000000001));
        assert!(sink.records.iter().all(|(_, _, step)| *step == 128));
    }
}
