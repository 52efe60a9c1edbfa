//! Compilation metrics

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const CLASSES_COMPILED: &str = "classes_compiled";
pub const CLASSES_FAILED: &str = "classes_failed";
pub const METHODS_COMPILED: &str = "methods_compiled";

/// Per-stage timings and counters, shared across compiler threads
pub struct CompileMetrics {
    timings: RwLock<HashMap<String, Vec<Duration>>>,
    counters: RwLock<HashMap<String, u64>>,
    start_time: Instant,
}

impl CompileMetrics {
    pub fn new() -> Self {
        Self {
            timings: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    pub fn record_timing(&self, name: impl Into<String>, duration: Duration) {
        let mut timings = self.timings.write();
        timings.entry(name.into()).or_default().push(duration);
    }

    pub fn increment(&self, name: impl Into<String>) {
        self.add(name, 1);
    }

    pub fn add(&self, name: impl Into<String>, value: u64) {
        let mut counters = self.counters.write();
        *counters.entry(name.into()).or_default() += value;
    }

    pub fn get_timing_stats(&self, name: &str) -> Option<TimingStats> {
        self.timings.read().get(name).map(|durations| TimingStats::from_durations(durations))
    }

    pub fn get_counter(&self, name: &str) -> u64 {
        self.counters.read().get(name).copied().unwrap_or(0)
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn summary(&self) -> MetricsSummary {
        let mut timings: Vec<(String, TimingStats)> = self
            .timings
            .read()
            .iter()
            .map(|(name, durations)| (name.clone(), TimingStats::from_durations(durations)))
            .collect();
        timings.sort_by(|a, b| a.0.cmp(&b.0));

        let mut counters: Vec<(String, u64)> =
            self.counters.read().iter().map(|(k, v)| (k.clone(), *v)).collect();
        counters.sort();

        MetricsSummary { elapsed: self.elapsed(), timings, counters }
    }
}

impl Default for CompileMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct TimingStats {
    pub count: usize,
    pub total: Duration,
    pub mean: Duration,
    pub max: Duration,
}

impl TimingStats {
    fn from_durations(durations: &[Duration]) -> Self {
        let count = durations.len();
        let total: Duration = durations.iter().sum();
        let mean = if count == 0 { Duration::ZERO } else { total / count as u32 };
        let max = durations.iter().max().copied().unwrap_or(Duration::ZERO);
        Self { count, total, mean, max }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub elapsed: Duration,
    /// Sorted by stage name
    pub timings: Vec<(String, TimingStats)>,
    pub counters: Vec<(String, u64)>,
}

impl MetricsSummary {
    pub fn report(&self) -> String {
        let mut lines = vec![format!("Elapsed: {:.2?}", self.elapsed), "=== Stages ===".to_string()];

        for (name, stats) in &self.timings {
            lines.push(format!(
                "{:<10} count {:>4}  total {:.2?}  mean {:.2?}  max {:.2?}",
                name, stats.count, stats.total, stats.mean, stats.max
            ));
        }

        lines.push("=== Counters ===".to_string());
        for (name, value) in &self.counters {
            lines.push(format!("{}: {}", name, value));
        }

        lines.join("\n")
    }
}

/// RAII timer recording into [`CompileMetrics`] on drop
pub struct Timer<'a> {
    metrics: &'a CompileMetrics,
    name: &'static str,
    start: Instant,
}

impl<'a> Timer<'a> {
    pub fn new(metrics: &'a CompileMetrics, name: &'static str) -> Self {
        Self { metrics, name, start: Instant::now() }
    }
}

impl<'a> Drop for Timer<'a> {
    fn drop(&mut self) {
        self.metrics.record_timing(self.name, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timing() {
        let metrics = CompileMetrics::new();
        metrics.record_timing("infer", Duration::from_millis(100));
        metrics.record_timing("infer", Duration::from_millis(200));

        let stats = metrics.get_timing_stats("infer").unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, Duration::from_millis(150));
        assert_eq!(stats.max, Duration::from_millis(200));
        assert!(metrics.get_timing_stats("compile").is_none());
    }

    #[test]
    fn test_counters() {
        let metrics = CompileMetrics::new();
        metrics.increment(CLASSES_COMPILED);
        metrics.increment(CLASSES_COMPILED);
        metrics.add(METHODS_COMPILED, 5);
        assert_eq!(metrics.get_counter(CLASSES_COMPILED), 2);
        assert_eq!(metrics.get_counter(METHODS_COMPILED), 5);
        assert_eq!(metrics.get_counter(CLASSES_FAILED), 0);
    }

    #[test]
    fn test_timer_records_on_drop() {
        let metrics = CompileMetrics::new();
        {
            let _timer = Timer::new(&metrics, "validate");
            thread::sleep(Duration::from_millis(5));
        }
        let stats = metrics.get_timing_stats("validate").unwrap();
        assert_eq!(stats.count, 1);
        assert!(stats.total >= Duration::from_millis(5));

        let report = metrics.summary().report();
        assert!(report.contains("validate"));
    }
}
