//! Prometheus text exposition for follower statistics.

use crate::change::ShardId;
use crate::stats::{AutoFollowStat, ShardReplayStats};

/// Kind of a Prometheus metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// Monotonic counter.
    Counter,
    /// Point-in-time value.
    Gauge,
}

impl MetricType {
    fn as_str(self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// A single labelled sample.
#[derive(Debug, Clone)]
pub struct Metric {
    /// Metric name, e.g. `ccr_follower_ops_written_total`.
    pub name: &'static str,
    /// Help text.
    pub help: &'static str,
    /// Counter or gauge.
    pub metric_type: MetricType,
    /// Label pairs.
    pub labels: Vec<(&'static str, String)>,
    /// Sample value.
    pub value: f64,
}

impl Metric {
    /// A counter sample.
    pub fn counter(
        name: &'static str,
        help: &'static str,
        labels: Vec<(&'static str, String)>,
        value: f64,
    ) -> Self {
        Self {
            name,
            help,
            metric_type: MetricType::Counter,
            labels,
            value,
        }
    }

    /// A gauge sample.
    pub fn gauge(
        name: &'static str,
        help: &'static str,
        labels: Vec<(&'static str, String)>,
        value: f64,
    ) -> Self {
        Self {
            name,
            help,
            metric_type: MetricType::Gauge,
            labels,
            value,
        }
    }

    /// The sample line, without HELP/TYPE headers.
    pub fn sample_line(&self) -> String {
        if self.labels.is_empty() {
            return format!("{} {}\n", self.name, self.format_value());
        }
        let labels = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}{{{}}} {}\n", self.name, labels, self.format_value())
    }

    /// Format with HELP and TYPE headers.
    pub fn format(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} {}\n{}",
            self.name,
            self.help,
            self.name,
            self.metric_type.as_str(),
            self.sample_line()
        )
    }

    fn format_value(&self) -> String {
        if self.value.fract() == 0.0 && self.value.abs() < 1e15 {
            format!("{}", self.value as i64)
        } else {
            format!("{}", self.value)
        }
    }
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Metrics for one autofollow rule.
pub fn autofollow_metrics(stat: &AutoFollowStat) -> Vec<Metric> {
    let labels = vec![("rule", stat.name.clone())];
    vec![
        Metric::counter(
            "ccr_follower_autofollow_started_total",
            "Replication jobs started by the rule",
            labels.clone(),
            stat.success_count as f64,
        ),
        Metric::gauge(
            "ccr_follower_autofollow_start_failures",
            "Start failures in the most recent poll",
            labels.clone(),
            stat.fail_count as f64,
        ),
        Metric::counter(
            "ccr_follower_autofollow_leader_failures_total",
            "Failed calls to the leader cluster",
            labels.clone(),
            stat.failed_leader_call as f64,
        ),
        Metric::gauge(
            "ccr_follower_autofollow_failed_indices",
            "Indices cooling down after a failed start",
            labels.clone(),
            stat.failed_indices.len() as f64,
        ),
        Metric::gauge(
            "ccr_follower_autofollow_last_execution_millis",
            "Epoch millis of the last completed poll",
            labels,
            stat.last_execution_time as f64,
        ),
    ]
}

/// Metrics for one replayed shard.
pub fn shard_metrics(shard: &ShardId, stats: &ShardReplayStats) -> Vec<Metric> {
    let labels = vec![("index", shard.index.clone()), ("shard", shard.shard.to_string())];
    vec![
        Metric::counter(
            "ccr_follower_ops_written_total",
            "Operations applied to the follower shard",
            labels.clone(),
            stats.ops_written as f64,
        ),
        Metric::counter(
            "ccr_follower_ops_write_failures_total",
            "Operations the follower shard rejected",
            labels.clone(),
            stats.ops_write_failures as f64,
        ),
        Metric::counter(
            "ccr_follower_batches_dispatched_total",
            "Change batches handed to replay",
            labels.clone(),
            stats.batches_dispatched as f64,
        ),
        Metric::counter(
            "ccr_follower_write_time_millis_total",
            "Time spent in successful replay calls",
            labels.clone(),
            stats.total_write_time_millis as f64,
        ),
        Metric::gauge(
            "ccr_follower_high_watermark",
            "Highest sequence number handed off for application",
            labels.clone(),
            stats.high_watermark as f64,
        ),
        Metric::gauge(
            "ccr_follower_buffered_batches",
            "Batches waiting for a predecessor",
            labels,
            stats.buffered_batches as f64,
        ),
    ]
}

/// Render samples, emitting each metric family's HELP/TYPE header once.
pub fn format_prometheus(metrics: &[Metric]) -> String {
    let mut out = String::new();
    let mut seen: Vec<&str> = Vec::new();
    for m in metrics {
        if !seen.contains(&m.name) {
            seen.push(m.name);
            out.push_str(&m.format());
            for other in metrics.iter().filter(|o| o.name == m.name).skip(1) {
                out.push_str(&other.sample_line());
            }
        }
    }
    out
}
