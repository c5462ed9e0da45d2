//! In-process metrics.
//!
//! Every metric has a dimension name and publishes `(dimension, value)` to
//! its hooks on each mutation. Hooks are primed once with the zero value when
//! the metric is built. Metrics are shared by reference between the wrapper
//! that updates them and the reporter that reads them.
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use num_traits::{Num, ToPrimitive, Unsigned};

use crate::error::GnssError;

/// Callback invoked with `(dimension, value)` whenever a metric changes
pub type MetricHook = Arc<dyn Fn(&str, f64) + Send + Sync>;

/// Anything that can be flattened into a dimension to value mapping
pub trait Metric: Send + Sync {
    /// Dimension name the metric is registered under
    fn dimension(&self) -> &str;
    /// All `(dimension, value)` pairs the metric exposes
    fn mappify(&self) -> Vec<(String, f64)>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panicking hook must not take the metric down with it
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn publish(hooks: &[MetricHook], dimension: &str, value: f64) {
    for hook in hooks {
        hook(dimension, value);
    }
}

/// Signed accumulator
pub struct ValueMetric<T> {
    dimension: String,
    value: Mutex<T>,
    hooks: Vec<MetricHook>,
}

impl<T: Num + ToPrimitive + Copy + Send> ValueMetric<T> {
    /// Build the metric and prime its hooks with zero
    pub fn new(dimension: impl Into<String>, hooks: Vec<MetricHook>) -> Self {
        let metric = Self {
            dimension: dimension.into(),
            value: Mutex::new(T::zero()),
            hooks,
        };
        metric.notify(T::zero());
        metric
    }

    /// Current value
    pub fn value(&self) -> T {
        *lock(&self.value)
    }

    /// Add `amount` to the value
    pub fn increase(&self, amount: T) {
        let value = {
            let mut value = lock(&self.value);
            *value = *value + amount;
            *value
        };
        self.notify(value);
    }

    /// Subtract `amount` from the value
    pub fn decrease(&self, amount: T) {
        let value = {
            let mut value = lock(&self.value);
            *value = *value - amount;
            *value
        };
        self.notify(value);
    }

    fn notify(&self, value: T) {
        publish(&self.hooks, &self.dimension, value.to_f64().unwrap_or(f64::NAN));
    }
}

impl<T: Num + ToPrimitive + Copy + Send> Metric for ValueMetric<T> {
    fn dimension(&self) -> &str {
        &self.dimension
    }

    fn mappify(&self) -> Vec<(String, f64)> {
        vec![(
            self.dimension.clone(),
            self.value().to_f64().unwrap_or(f64::NAN),
        )]
    }
}

/// Non-negative counter
pub struct CounterMetric<T = u64> {
    inner: ValueMetric<T>,
}

impl<T: Num + Unsigned + ToPrimitive + Copy + Send> CounterMetric<T> {
    /// Build the counter and prime its hooks with zero
    pub fn new(dimension: impl Into<String>, hooks: Vec<MetricHook>) -> Self {
        Self {
            inner: ValueMetric::new(dimension, hooks),
        }
    }

    /// Current count
    pub fn value(&self) -> T {
        self.inner.value()
    }

    /// Add `amount` to the counter
    pub fn increase(&self, amount: T) {
        self.inner.increase(amount)
    }
}

impl<T: Num + Unsigned + ToPrimitive + Copy + Send> Metric for CounterMetric<T> {
    fn dimension(&self) -> &str {
        self.inner.dimension()
    }

    fn mappify(&self) -> Vec<(String, f64)> {
        self.inner.mappify()
    }
}

/// Pair of counters for successful and failed operations.
///
/// Publishes under `<dimension>_Success` and `<dimension>_Failure`.
pub struct SuccessCounterMetric {
    dimension: String,
    success: CounterMetric,
    failure: CounterMetric,
}

impl SuccessCounterMetric {
    /// Build both counters, sharing the same hooks
    pub fn new(dimension: impl Into<String>, hooks: Vec<MetricHook>) -> Self {
        let dimension = dimension.into();
        Self {
            success: CounterMetric::new(format!("{dimension}_Success"), hooks.clone()),
            failure: CounterMetric::new(format!("{dimension}_Failure"), hooks),
            dimension,
        }
    }

    /// Count one success or one failure
    pub fn record(&self, success: bool) {
        if success {
            self.success.increase(1);
        } else {
            self.failure.increase(1);
        }
    }

    /// Successful operations
    pub fn success(&self) -> u64 {
        self.success.value()
    }

    /// Failed operations
    pub fn failure(&self) -> u64 {
        self.failure.value()
    }

    /// All operations
    pub fn total(&self) -> u64 {
        self.success() + self.failure()
    }
}

impl Metric for SuccessCounterMetric {
    fn dimension(&self) -> &str {
        &self.dimension
    }

    fn mappify(&self) -> Vec<(String, f64)> {
        let mut pairs = self.success.mappify();
        pairs.extend(self.failure.mappify());
        pairs
    }
}

/// Duration of the last timed operation in seconds.
///
/// The value reads as infinity while a measurement is in progress.
pub struct LatencyMetric {
    dimension: String,
    state: Mutex<(f64, Option<Instant>)>,
    hooks: Vec<MetricHook>,
}

impl LatencyMetric {
    /// Build the metric and prime its hooks with zero
    pub fn new(dimension: impl Into<String>, hooks: Vec<MetricHook>) -> Self {
        let metric = Self {
            dimension: dimension.into(),
            state: Mutex::new((0.0, None)),
            hooks,
        };
        publish(&metric.hooks, &metric.dimension, 0.0);
        metric
    }

    /// Last measured latency in seconds
    pub fn value(&self) -> f64 {
        lock(&self.state).0
    }

    /// Start a measurement
    pub fn start(&self) -> Result<(), GnssError> {
        {
            let mut state = lock(&self.state);
            if state.1.is_some() {
                return Err(GnssError::Time(format!(
                    "{} already started",
                    self.dimension
                )));
            }
            *state = (f64::INFINITY, Some(Instant::now()));
        }
        publish(&self.hooks, &self.dimension, f64::INFINITY);
        Ok(())
    }

    /// Stop the running measurement and return the elapsed seconds
    pub fn stop(&self) -> Result<f64, GnssError> {
        let elapsed = {
            let mut state = lock(&self.state);
            let started = state
                .1
                .take()
                .ok_or_else(|| GnssError::Time(format!("{} was not started", self.dimension)))?;
            state.0 = started.elapsed().as_secs_f64();
            state.0
        };
        publish(&self.hooks, &self.dimension, elapsed);
        Ok(elapsed)
    }

    /// Start a measurement that stops when the guard is dropped
    pub fn time(&self) -> Result<LatencyGuard<'_>, GnssError> {
        self.start()?;
        Ok(LatencyGuard { metric: self })
    }

    /// [`LatencyMetric::time`] for callers that carry on unmeasured when a
    /// measurement is already running
    pub fn time_or_warn(&self) -> Option<LatencyGuard<'_>> {
        match self.time() {
            Ok(guard) => Some(guard),
            Err(e) => {
                log::warn!("Latency not recorded: {e}");
                None
            }
        }
    }
}

impl Metric for LatencyMetric {
    fn dimension(&self) -> &str {
        &self.dimension
    }

    fn mappify(&self) -> Vec<(String, f64)> {
        vec![(self.dimension.clone(), self.value())]
    }
}

/// Scoped latency measurement
pub struct LatencyGuard<'a> {
    metric: &'a LatencyMetric,
}

impl Drop for LatencyGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.metric.stop() {
            log::warn!("{e}");
        }
    }
}

#[derive(Default, Clone)]
/// Registry of metrics by dimension name
pub struct MetricsCollection {
    metrics: BTreeMap<String, Arc<dyn Metric>>,
}

impl MetricsCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a metric under its dimension, returning it for the caller to keep
    pub fn add<M: Metric + 'static>(&mut self, metric: M) -> Arc<M> {
        let metric = Arc::new(metric);
        self.metrics
            .insert(metric.dimension().to_string(), metric.clone());
        metric
    }

    /// Look a metric up by dimension
    pub fn get(&self, dimension: &str) -> Option<&Arc<dyn Metric>> {
        self.metrics.get(dimension)
    }

    /// Merge the metrics of another collection into this one
    pub fn extend(&mut self, other: &MetricsCollection) {
        for (dimension, metric) in &other.metrics {
            self.metrics.insert(dimension.clone(), metric.clone());
        }
    }

    /// Flatten every metric into a dimension to value mapping
    pub fn mappify(&self) -> BTreeMap<String, f64> {
        self.metrics
            .values()
            .flat_map(|metric| metric.mappify())
            .collect()
    }
}
