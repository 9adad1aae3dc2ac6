//! Scalar metric sinks
//!
//! The trainer reports every scalar it produces through this narrow
//! interface. Experiment-tracking backends (TensorBoard, W&B, ...) live
//! outside the crate; a driving script adapts them by implementing
//! [`ScalarSink`].

/// Destination for scalar training metrics
///
/// Implementations must tolerate any metric name and may drop values.
pub trait ScalarSink {
    /// Record `value` for metric `name` at global environment step `step`
    fn log_scalar(&mut self, name: &str, value: f64, step: u64);
}

/// Sink that discards everything
pub struct NoopSink;

impl ScalarSink for NoopSink {
    fn log_scalar(&mut self, _name: &str, _value: f64, _step: u64) {}
}

/// Sink that forwards metrics to `tracing` at debug level
pub struct TracingSink;

impl ScalarSink for TracingSink {
    fn log_scalar(&mut self, name: &str, value: f64, step: u64) {
        tracing::debug!(target: "metrics", step, "{} = {:.6}", name, value);
    }
}

/// Sink that keeps every reported value in memory (used by tests)
#[derive(Default)]
pub struct MemorySink {
    /// Recorded (name, value, step) triples in report order
    pub records: Vec<(String, f64, u64)>,
}

impl MemorySink {
    /// Latest value reported under `name`, if any
    pub fn last(&self, name: &str) -> Option<f64> {
        self.records.iter().rev().find(|(n, _, _)| n == name).map(|(_, v, _)| *v)
    }
}

impl ScalarSink for MemorySink {
    fn log_scalar(&mut self, name: &str, value: f64, step: u64) {
        self.records.push((name.to_string(), value, step));
    }
}
