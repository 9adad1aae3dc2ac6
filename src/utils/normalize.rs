//! Running mean/variance statistics for normalization
//!
//! Tracks streaming per-dimension statistics used for observation, reward,
//! and feature normalization. Batches are folded in with the parallel
//! variance-merge identity rather than a scalar-at-a-time loop, which keeps
//! the update order-independent and numerically stable when the accumulated
//! and batch statistics have very different magnitudes.

/// Running mean and standard deviation tracker
///
/// Accumulators are kept in `f64`; the initial count is a small epsilon so
/// the statistics can be used as a denominator before the first update.
#[derive(Debug, Clone)]
pub struct RunningMeanStd {
    mean: Vec<f64>,
    var: Vec<f64>,
    count: f64,
}

impl RunningMeanStd {
    /// Create a tracker over `dim`-dimensional samples
    ///
    /// Initial state: mean 0, variance 1, count 1e-4.
    pub fn new(dim: usize) -> Self {
        Self { mean: vec![0.0; dim], var: vec![1.0; dim], count: 1e-4 }
    }

    /// Create a tracker over a scalar stream
    pub fn scalar() -> Self {
        Self::new(1)
    }

    /// Fold a batch of samples into the running statistics
    ///
    /// Each row must have the tracker's dimensionality. An empty batch is a
    /// no-op.
    pub fn update<R: AsRef<[f32]>>(&mut self, rows: &[R]) {
        if rows.is_empty() {
            return;
        }

        let dim = self.mean.len();
        let batch_count = rows.len() as f64;

        let mut batch_mean = vec![0.0f64; dim];
        for row in rows {
            debug_assert_eq!(row.as_ref().len(), dim, "sample dimension mismatch");
            for (i, &v) in row.as_ref().iter().enumerate() {
                batch_mean[i] += v as f64;
            }
        }
        for m in &mut batch_mean {
            *m /= batch_count;
        }

        let mut batch_var = vec![0.0f64; dim];
        for row in rows {
            for (i, &v) in row.as_ref().iter().enumerate() {
                let diff = v as f64 - batch_mean[i];
                batch_var[i] += diff * diff;
            }
        }
        for v in &mut batch_var {
            *v /= batch_count;
        }

        self.update_from_moments(&batch_mean, &batch_var, batch_count);
    }

    /// Fold a flat batch of scalar samples into a 1-dimensional tracker
    pub fn update_scalars(&mut self, samples: &[f32]) {
        debug_assert_eq!(self.mean.len(), 1, "update_scalars requires a scalar tracker");
        if samples.is_empty() {
            return;
        }
        let rows: Vec<[f32; 1]> = samples.iter().map(|&s| [s]).collect();
        self.update(&rows);
    }

    /// Merge pre-computed batch moments into the running statistics
    ///
    /// Parallel-merge identity:
    /// ```text
    /// delta = batch_mean - mean
    /// total = count + batch_count
    /// mean' = mean + delta * batch_count / total
    /// M2'   = var*count + batch_var*batch_count + delta^2 * count*batch_count/total
    /// var'  = M2' / total
    /// ```
    pub fn update_from_moments(&mut self, batch_mean: &[f64], batch_var: &[f64], batch_count: f64) {
        if batch_count <= 0.0 {
            return;
        }

        let total = self.count + batch_count;
        for i in 0..self.mean.len() {
            let delta = batch_mean[i] - self.mean[i];
            let m_a = self.var[i] * self.count;
            let m_b = batch_var[i] * batch_count;
            let m2 = m_a + m_b + delta * delta * self.count * batch_count / total;
            self.mean[i] += delta * batch_count / total;
            self.var[i] = m2 / total;
        }
        self.count = total;
    }

    /// Z-score a sample against the running statistics
    pub fn normalize(&self, sample: &[f32]) -> Vec<f32> {
        sample
            .iter()
            .zip(&self.mean)
            .zip(&self.var)
            .map(|((&x, &mean), &var)| ((x as f64 - mean) / (var.sqrt() + 1e-8)) as f32)
            .collect()
    }

    /// Z-score a sample and clip each dimension to `[lo, hi]` standard
    /// deviations (the RND observation preprocessing)
    pub fn normalize_clipped(&self, sample: &[f32], lo: f32, hi: f32) -> Vec<f32> {
        self.normalize(sample).into_iter().map(|x| x.clamp(lo, hi)).collect()
    }

    /// Get current mean
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Get current variance
    pub fn var(&self) -> &[f64] {
        &self.var
    }

    /// Get current standard deviation
    pub fn std(&self) -> Vec<f64> {
        self.var.iter().map(|v| v.sqrt()).collect()
    }

    /// Get number of samples seen
    pub fn count(&self) -> f64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "expected {} ~= {}", a, b);
    }

    #[test]
    fn test_tracks_mean_and_var() {
        let mut rms = RunningMeanStd::new(2);
        let data = vec![vec![1.0, 2.0], vec![2.0, 4.0], vec![3.0, 6.0]];
        rms.update(&data);

        assert_close(rms.mean()[0], 2.0, 1e-3);
        assert_close(rms.mean()[1], 4.0, 1e-3);
        // Population variance of [1,2,3] is 2/3; the epsilon prior pulls it
        // only negligibly.
        assert_close(rms.var()[0], 2.0 / 3.0, 1e-2);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut rms = RunningMeanStd::new(3);
        let before_count = rms.count();
        rms.update::<Vec<f32>>(&[]);
        assert_eq!(rms.count(), before_count);
        assert_eq!(rms.mean(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_merge_is_associative() {
        // Folding [A,B] then C must match folding A then [B,C].
        let a = vec![vec![1.0f32], vec![2.0]];
        let b = vec![vec![10.0f32], vec![20.0], vec![30.0]];
        let c = vec![vec![-5.0f32], vec![5.0]];

        let mut left = RunningMeanStd::new(1);
        let mut ab: Vec<Vec<f32>> = a.clone();
        ab.extend(b.clone());
        left.update(&ab);
        left.update(&c);

        let mut right = RunningMeanStd::new(1);
        let mut bc: Vec<Vec<f32>> = b.clone();
        bc.extend(c.clone());
        right.update(&a);
        right.update(&bc);

        assert_close(left.mean()[0], right.mean()[0], 1e-9);
        assert_close(left.var()[0], right.var()[0], 1e-9);
        assert_close(left.count(), right.count(), 1e-9);
    }

    #[test]
    fn test_stable_under_magnitude_gap() {
        let mut rms = RunningMeanStd::new(1);
        rms.update(&[vec![1e-6f32], vec![2e-6]]);
        rms.update(&[vec![1e6f32], vec![2e6]]);
        assert!(rms.var()[0].is_finite());
        assert!(rms.var()[0] > 0.0);
    }

    #[test]
    fn test_normalize_clipped_bounds() {
        let mut rms = RunningMeanStd::new(1);
        rms.update(&[vec![0.0f32], vec![1.0], vec![2.0]]);

        let z = rms.normalize_clipped(&[1e9], -5.0, 5.0);
        assert_eq!(z[0], 5.0);
        let z = rms.normalize_clipped(&[-1e9], -5.0, 5.0);
        assert_eq!(z[0], -5.0);
    }

    #[test]
    fn test_scalar_stream() {
        let mut rms = RunningMeanStd::scalar();
        rms.update_scalars(&[1.0, 2.0, 3.0, 4.0]);
        assert_close(rms.mean()[0], 2.5, 1e-3);
    }
}
