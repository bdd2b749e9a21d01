//! Ambient observability (SPEC_FULL.md §4, §10): plain counters/gauges
//! always constructed, recording a no-op until an embedding application
//! installs a `metrics` recorder. The HTTP `/metrics` exposition endpoint
//! itself is out of scope.

use metrics::{Counter, Gauge, Histogram};

pub struct Metrics {
    pub renders_started: Counter,
    pub renders_succeeded: Counter,
    pub renders_failed: Counter,
    pub render_duration: Histogram,
    pub pool_active_instances: Gauge,
    pub instance_restarts: Counter,
    pub hard_timeouts: Counter,
    pub soft_timeouts: Counter,
    pub redirects_detected: Counter,
    pub comparisons_run: Counter,
    pub comparisons_major: Counter,
    pub comparisons_minor: Counter,
    pub comparisons_none: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            renders_started: Counter::noop(),
            renders_succeeded: Counter::noop(),
            renders_failed: Counter::noop(),
            render_duration: Histogram::noop(),
            pool_active_instances: Gauge::noop(),
            instance_restarts: Counter::noop(),
            hard_timeouts: Counter::noop(),
            soft_timeouts: Counter::noop(),
            redirects_detected: Counter::noop(),
            comparisons_run: Counter::noop(),
            comparisons_major: Counter::noop(),
            comparisons_minor: Counter::noop(),
            comparisons_none: Counter::noop(),
        }
    }

    pub fn record_render(&self, duration: std::time::Duration, success: bool) {
        self.renders_started.increment(1);
        if success {
            self.renders_succeeded.increment(1);
        } else {
            self.renders_failed.increment(1);
        }
        self.render_duration.record(duration.as_secs_f64());
    }

    pub fn record_pool_usage(&self, active_instances: usize) {
        self.pool_active_instances.set(active_instances as f64);
    }

    pub fn record_restart(&self) {
        self.instance_restarts.increment(1);
    }

    pub fn record_hard_timeout(&self) {
        self.hard_timeouts.increment(1);
    }

    pub fn record_soft_timeout(&self) {
        self.soft_timeouts.increment(1);
    }

    pub fn record_redirect(&self) {
        self.redirects_detected.increment(1);
    }

    pub fn record_comparison(&self, overall_change: &crate::compare::OverallChange) {
        self.comparisons_run.increment(1);
        match overall_change {
            crate::compare::OverallChange::Major => self.comparisons_major.increment(1),
            crate::compare::OverallChange::Minor => self.comparisons_minor.increment(1),
            crate::compare::OverallChange::None => self.comparisons_none.increment(1),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_metrics_do_not_panic() {
        let metrics = Metrics::new();
        metrics.record_render(std::time::Duration::from_millis(5), true);
        metrics.record_pool_usage(2);
        metrics.record_restart();
    }
}
