use std::collections::HashMap;
use std::time::Instant;

/// Cross-cutting logger for capture loop events.
///
/// Decouples the loop from specific output mechanisms so tests can run it
/// silently while the binary routes everything through the `log` crate.
pub trait PipelineLogger: Send {
    /// A capture cycle started on the frame with the given sequence number.
    fn cycle(&mut self, cycle: usize, sequence: u64);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. region count).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Log a recoverable failure.
    fn warn(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn cycle(&mut self, _cycle: usize, _sequence: u64) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
    fn warn(&mut self, _message: &str) {}
}

/// Running aggregate of one stage's timings or one metric's values.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SampleStats {
    pub count: usize,
    pub total: f64,
    pub max: f64,
}

impl SampleStats {
    fn record(&mut self, value: f64) {
        if self.count == 0 || value > self.max {
            self.max = value;
        }
        self.count += 1;
        self.total += value;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Logger backed by the `log` crate that also aggregates per-stage timings
/// and metrics for a summary when the capture loop stops.
///
/// Cycle starts go to `info` every `throttle_cycles` cycles and to `debug`
/// otherwise. Storage is one aggregate per stage or metric name, so it does
/// not grow with the number of cycles.
pub struct LogPipelineLogger {
    throttle_cycles: usize,
    timings: HashMap<String, SampleStats>,
    metrics: HashMap<String, SampleStats>,
    start_time: Instant,
    cycles: usize,
    warnings: usize,
}

impl LogPipelineLogger {
    pub fn new(throttle_cycles: usize) -> Self {
        Self {
            throttle_cycles: throttle_cycles.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            cycles: 0,
            warnings: 0,
        }
    }

    /// Returns the formatted summary string, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() && self.warnings == 0 {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = Vec::new();

        lines.push(format!(
            "Capture summary ({} cycles, {} transient failures, {:.1}s total):",
            self.cycles,
            self.warnings,
            elapsed_ms / 1000.0
        ));

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let stats = &self.timings[stage];
            lines.push(format!(
                "  {stage:12}: avg {:6.1}ms  max {:6.1}ms  total {:7.0}ms",
                stats.mean(),
                stats.max,
                stats.total
            ));
        }

        let mut metric_names: Vec<_> = self.metrics.keys().collect();
        metric_names.sort();
        for name in metric_names {
            lines.push(format!("  {name}: avg {:.1}", self.metrics[name].mean()));
        }

        if self.cycles > 0 && elapsed_ms > 0.0 {
            let rate = self.cycles as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {rate:.2} frames/s"));
        }

        Some(lines.join("\n"))
    }

    pub fn timing_stats(&self, stage: &str) -> Option<SampleStats> {
        self.timings.get(stage).copied()
    }

    pub fn metric_stats(&self, name: &str) -> Option<SampleStats> {
        self.metrics.get(name).copied()
    }
}

impl Default for LogPipelineLogger {
    fn default() -> Self {
        Self::new(10)
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn cycle(&mut self, cycle: usize, sequence: u64) {
        self.cycles = self.cycles.max(cycle);
        if cycle % self.throttle_cycles == 0 || cycle == 1 {
            log::info!("Capture cycle {cycle} (frame {sequence})");
        } else {
            log::debug!("Capture cycle {cycle} (frame {sequence})");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        if let Some(stats) = self.timings.get_mut(stage) {
            stats.record(duration_ms);
        } else {
            let mut stats = SampleStats::default();
            stats.record(duration_ms);
            self.timings.insert(stage.to_string(), stats);
        }
    }

    fn metric(&mut self, name: &str, value: f64) {
        if let Some(stats) = self.metrics.get_mut(name) {
            stats.record(value);
        } else {
            let mut stats = SampleStats::default();
            stats.record(value);
            self.metrics.insert(name.to_string(), stats);
        }
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn warn(&mut self, message: &str) {
        self.warnings += 1;
        log::warn!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullPipelineLogger;
        logger.cycle(1, 0);
        logger.timing("detect", 5.0);
        logger.metric("regions", 3.0);
        logger.info("hello");
        logger.warn("careful");
        logger.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let mut logger = LogPipelineLogger::new(10);
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);

        let detect = logger.timing_stats("detect").unwrap();
        assert_eq!(detect.count, 2);
        assert_relative_eq!(detect.mean(), 25.0);
        assert_relative_eq!(detect.max, 30.0);
        assert!(logger.timing_stats("annotate").is_none());
    }

    #[test]
    fn test_metric_records_values() {
        let mut logger = LogPipelineLogger::new(10);
        logger.metric("regions", 3.0);
        logger.metric("regions", 4.0);

        let values = logger.metric_stats("regions").unwrap();
        assert_relative_eq!(values.mean(), 3.5);
    }

    #[test]
    fn test_long_runs_keep_one_aggregate_per_name() {
        let mut logger = LogPipelineLogger::new(1000);
        for cycle in 1..=20_000usize {
            logger.cycle(cycle, cycle as u64);
            logger.timing("detect", (cycle % 10) as f64);
            logger.metric("regions", 2.0);
        }

        assert_eq!(logger.timings.len(), 1);
        assert_eq!(logger.metrics.len(), 1);
        let detect = logger.timing_stats("detect").unwrap();
        assert_eq!(detect.count, 20_000);
        assert_relative_eq!(detect.max, 9.0);
        assert_relative_eq!(detect.mean(), 4.5);
        assert_relative_eq!(logger.metric_stats("regions").unwrap().mean(), 2.0);
    }

    #[test]
    fn test_negative_first_sample_sets_max() {
        let mut stats = SampleStats::default();
        stats.record(-3.0);
        assert_relative_eq!(stats.max, -3.0);
        assert_relative_eq!(SampleStats::default().mean(), 0.0);
    }

    #[test]
    fn test_summary_includes_stages_metrics_and_counts() {
        let mut logger = LogPipelineLogger::new(10);
        logger.cycle(1, 0);
        logger.cycle(2, 1);
        logger.warn("image was empty");
        logger.timing("detect", 12.0);
        logger.metric("regions", 2.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Capture summary (2 cycles, 1 transient failures"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("regions: avg 2.0"));
        assert!(summary.contains("frames/s"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        let logger = LogPipelineLogger::new(10);
        assert!(logger.summary_string().is_none());
    }

    #[test]
    fn test_warn_alone_produces_summary() {
        let mut logger = LogPipelineLogger::new(10);
        logger.warn("device 0 not ready");
        assert!(logger.summary_string().is_some());
    }

    #[test]
    fn test_default_throttle() {
        let logger = LogPipelineLogger::default();
        assert_eq!(logger.throttle_cycles, 10);
    }

    #[test]
    fn test_zero_throttle_is_clamped() {
        let logger = LogPipelineLogger::new(0);
        assert_eq!(logger.throttle_cycles, 1);
    }
}
