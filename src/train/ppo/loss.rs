//! Loss computation functions for PPO
//!
//! Core loss terms for the clipped-objective update: surrogate policy loss,
//! (optionally clipped) value loss, per-minibatch advantage normalization,
//! and the KL diagnostics used for early stopping.

use rand::seq::SliceRandom;
use rand::Rng;
use tch::{Kind, Tensor};

/// Policy loss output with its diagnostics
pub struct PolicyLoss {
    /// Clipped surrogate loss (scalar, differentiable)
    pub loss: Tensor,

    /// `mean((ratio - 1) - log ratio)` — the estimator the early stop uses
    pub approx_kl: f64,

    /// `mean(-log ratio)` — retained for logging/comparison only
    pub old_approx_kl: f64,

    /// Fraction of samples whose ratio left the clip band
    pub clip_fraction: f64,
}

/// Compute the clipped surrogate policy loss
///
/// ```text
/// ratio = exp(new_log_prob - old_log_prob)
/// loss  = mean(max(-A * ratio, -A * clip(ratio, 1-eps, 1+eps)))
/// ```
pub fn policy_loss(
    new_log_probs: &Tensor,
    old_log_probs: &Tensor,
    advantages: &Tensor,
    clip_coef: f64,
) -> PolicyLoss {
    let logratio = new_log_probs - old_log_probs;
    let ratio = logratio.exp();

    let pg_loss1 = -advantages * &ratio;
    let pg_loss2 = -advantages * ratio.clamp(1.0 - clip_coef, 1.0 + clip_coef);
    let loss = pg_loss1.max_other(&pg_loss2).mean(Kind::Float);

    let (approx_kl, old_approx_kl, clip_fraction) = tch::no_grad(|| {
        // http://joschu.net/blog/kl-approx.html
        let approx_kl =
            f64::try_from((&ratio - 1.0 - &logratio).mean(Kind::Float)).unwrap_or(f64::NAN);
        let old_approx_kl =
            f64::try_from((-&logratio).mean(Kind::Float)).unwrap_or(f64::NAN);
        let clip_fraction = f64::try_from(
            (&ratio - 1.0).abs().gt(clip_coef).to_kind(Kind::Float).mean(Kind::Float),
        )
        .unwrap_or(f64::NAN);
        (approx_kl, old_approx_kl, clip_fraction)
    });

    PolicyLoss { loss, approx_kl, old_approx_kl, clip_fraction }
}

/// Compute the value loss for one head
///
/// With `clip_coef` set, the *value change* (not the ratio) is clipped and
/// the elementwise maximum of clipped/unclipped squared errors is taken,
/// as in the PPO paper.
pub fn value_loss(
    new_values: &Tensor,
    old_values: &Tensor,
    returns: &Tensor,
    clip_coef: Option<f64>,
) -> Tensor {
    match clip_coef {
        Some(clip) => {
            let unclipped = (new_values - returns).pow_tensor_scalar(2);
            let clipped_values = old_values + (new_values - old_values).clamp(-clip, clip);
            let clipped = (clipped_values - returns).pow_tensor_scalar(2);
            0.5 * unclipped.max_other(&clipped).mean(Kind::Float)
        }
        None => 0.5 * (new_values - returns).pow_tensor_scalar(2).mean(Kind::Float),
    }
}

/// Normalize advantages to zero mean, unit variance (epsilon-floored)
pub fn normalize_advantages(advantages: &Tensor) -> Tensor {
    let mean = advantages.mean(Kind::Float);
    let std = advantages.std(false);
    (advantages - mean) / (std + 1e-8)
}

/// Explained variance of value predictions: `1 - Var(ret - val) / Var(ret)`
///
/// Returns NaN when the returns have no variance.
pub fn explained_variance(values: &[f32], returns: &[f32]) -> f64 {
    debug_assert_eq!(values.len(), returns.len());
    let n = returns.len();
    if n == 0 {
        return f64::NAN;
    }

    let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
    let variance = |xs: &[f64]| {
        let m = mean(xs);
        xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / xs.len() as f64
    };

    let returns_f64: Vec<f64> = returns.iter().map(|&r| r as f64).collect();
    let residuals: Vec<f64> =
        returns.iter().zip(values).map(|(&r, &v)| (r - v) as f64).collect();

    let var_returns = variance(&returns_f64);
    if var_returns == 0.0 {
        f64::NAN
    } else {
        1.0 - variance(&residuals) / var_returns
    }
}

/// Shuffle `0..batch_size` into minibatches of `minibatch_size`
///
/// The permutation is drawn from the supplied RNG so the whole run stays
/// reproducible from one seed.
pub fn minibatch_indices<R: Rng>(
    batch_size: usize,
    minibatch_size: usize,
    rng: &mut R,
) -> Vec<Vec<i64>> {
    let mut indices: Vec<i64> = (0..batch_size as i64).collect();
    indices.shuffle(rng);
    indices.chunks(minibatch_size).map(|chunk| chunk.to_vec()).collect()
}
