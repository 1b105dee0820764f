//! Statistics for autofollow rules and replayed follower shards.
//!
//! Counters are kept in atomic inners so the sequencer's apply tasks and the
//! autofollow poll loop can update them without locks; callers read plain snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Snapshot of one autofollow rule's bookkeeping, as reported to status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoFollowStat {
    /// Rule name.
    pub name: String,
    /// Leader index pattern the rule matches.
    pub pattern: String,
    /// Replication jobs started successfully (cumulative).
    #[serde(rename = "num_success_start_replication")]
    pub success_count: u64,
    /// Start failures in the most recent poll.
    #[serde(rename = "num_failed_start_replication")]
    pub fail_count: u64,
    /// Failed calls to the leader cluster (cumulative).
    #[serde(rename = "num_failed_leader_calls")]
    pub failed_leader_call: u64,
    /// Indices currently cooling down after a failed start.
    pub failed_indices: BTreeSet<String>,
    /// Epoch millis of the last completed poll, 0 if none yet.
    pub last_execution_time: i64,
}

impl AutoFollowStat {
    /// Create an empty stat for a rule.
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            success_count: 0,
            fail_count: 0,
            failed_leader_call: 0,
            failed_indices: BTreeSet::new(),
            last_execution_time: 0,
        }
    }
}

/// Lock-free counters behind an [`AutoFollowStat`].
#[derive(Debug, Default)]
pub struct AutoFollowCounters {
    success_count: AtomicU64,
    fail_count: AtomicU64,
    failed_leader_call: AtomicU64,
    last_execution_time: AtomicI64,
}

impl AutoFollowCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully started job.
    pub fn record_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish the failure count of the run that just finished.
    pub fn set_run_failures(&self, failures: u64) {
        self.fail_count.store(failures, Ordering::Relaxed);
    }

    /// Record a failed leader call and return the cumulative count.
    pub fn record_leader_failure(&self) -> u64 {
        self.failed_leader_call.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Stamp the completion time of a poll.
    pub fn mark_executed(&self, at_millis: i64) {
        self.last_execution_time.store(at_millis, Ordering::Relaxed);
    }

    /// Build a snapshot, attaching the current cooldown set.
    pub fn snapshot(
        &self,
        name: &str,
        pattern: &str,
        failed_indices: BTreeSet<String>,
    ) -> AutoFollowStat {
        AutoFollowStat {
            name: name.to_string(),
            pattern: pattern.to_string(),
            success_count: self.success_count.load(Ordering::Relaxed),
            fail_count: self.fail_count.load(Ordering::Relaxed),
            failed_leader_call: self.failed_leader_call.load(Ordering::Relaxed),
            failed_indices,
            last_execution_time: self.last_execution_time.load(Ordering::Relaxed),
        }
    }
}

/// Autofollow statistics aggregated across every rule on the follower.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoFollowClusterStats {
    /// Sum of started jobs.
    pub num_success_start_replication: u64,
    /// Sum of last-run start failures.
    pub num_failed_start_replication: u64,
    /// Sum of failed leader calls.
    pub num_failed_leader_calls: u64,
    /// Union of all cooldown sets.
    pub failed_indices: BTreeSet<String>,
    /// Per-rule stats.
    pub autofollow_stats: Vec<AutoFollowStat>,
}

impl AutoFollowClusterStats {
    /// Aggregate per-rule snapshots.
    pub fn from_stats(stats: impl IntoIterator<Item = AutoFollowStat>) -> Self {
        let mut total = Self::default();
        for stat in stats {
            total.num_success_start_replication += stat.success_count;
            total.num_failed_start_replication += stat.fail_count;
            total.num_failed_leader_calls += stat.failed_leader_call;
            total.failed_indices.extend(stat.failed_indices.iter().cloned());
            total.autofollow_stats.push(stat);
        }
        total
    }
}

/// Internal replay counters with atomic fields, shared with apply tasks.
#[derive(Debug)]
pub(crate) struct ReplayCounters {
    pub(crate) ops_written: AtomicU64,
    pub(crate) ops_write_failures: AtomicU64,
    pub(crate) batches_dispatched: AtomicU64,
    pub(crate) total_write_time_millis: AtomicU64,
    pub(crate) high_watermark: AtomicI64,
    pub(crate) buffered_batches: AtomicU64,
}

impl ReplayCounters {
    pub(crate) fn new(initial_seq_no: i64) -> Self {
        Self {
            ops_written: AtomicU64::new(0),
            ops_write_failures: AtomicU64::new(0),
            batches_dispatched: AtomicU64::new(0),
            total_write_time_millis: AtomicU64::new(0),
            high_watermark: AtomicI64::new(initial_seq_no),
            buffered_batches: AtomicU64::new(0),
        }
    }

    pub(crate) fn snapshot(&self) -> ShardReplayStats {
        ShardReplayStats {
            ops_written: self.ops_written.load(Ordering::Relaxed),
            ops_write_failures: self.ops_write_failures.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            total_write_time_millis: self.total_write_time_millis.load(Ordering::Relaxed),
            high_watermark: self.high_watermark.load(Ordering::Relaxed),
            buffered_batches: self.buffered_batches.load(Ordering::Relaxed),
        }
    }
}

/// Replay statistics for one follower shard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardReplayStats {
    /// Operations applied successfully.
    pub ops_written: u64,
    /// Operations the store rejected.
    pub ops_write_failures: u64,
    /// Batches handed to the replay collaborator.
    pub batches_dispatched: u64,
    /// Wall time spent in successful replay calls.
    pub total_write_time_millis: u64,
    /// Highest sequence number handed off for application.
    pub high_watermark: i64,
    /// Batches waiting for a predecessor.
    pub buffered_batches: u64,
}
