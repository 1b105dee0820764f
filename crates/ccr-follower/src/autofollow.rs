//! Autofollow: discover new leader indices and start replicating them.
//!
//! One [`AutoFollowTask`] runs per autofollow rule. Every poll it lists the leader
//! indices matching the rule, drops the ones that already exist locally, are cooling
//! down after a failed start, or are still bootstrapping, and starts replication for
//! the rest while keeping at most `autofollow_concurrent_jobs` jobs bootstrapping.
//!
//! Failed starts go into a cooldown set that a [`RetryTimer`] clears every
//! `autofollow_retry_interval_ms`. Permission failures skip the cooldown: they need
//! a role fix, and retrying each poll keeps the failure visible.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::cluster::{FollowerCluster, LeaderCluster, ReplicationJobs, StartReplicationRequest};
use crate::config::AutoFollowRule;
use crate::error::{classify, classify_listing, ErrorKind, FollowerError};
use crate::index_set::IndexSet;
use crate::pattern::IndexPattern;
use crate::retry_timer::RetryTimer;
use crate::settings::ReplicationSettings;
use crate::stats::{AutoFollowCounters, AutoFollowStat};

/// Consecutive leader failures between error-level log lines.
const LEADER_FAILURE_LOG_EVERY: u64 = 10;

/// Whether the `consecutive`th leader failure in a row is logged at error level.
fn logs_at_error(consecutive: u64) -> bool {
    consecutive > 0 && consecutive % LEADER_FAILURE_LOG_EVERY == 0
}

/// What happened during one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Indices eligible for admission, in leader order.
    pub candidates: Vec<String>,
    /// In-flight jobs that finished bootstrapping this poll.
    pub completed: Vec<String>,
    /// Indices whose replication was started.
    pub admitted: Vec<String>,
    /// Indices whose start failed and were put in cooldown.
    pub failed: Vec<String>,
    /// Indices whose start was denied for lack of permissions.
    pub denied: Vec<String>,
    /// Set when a name collision with local indices was logged.
    pub collision_reported: bool,
}

enum StartOutcome {
    Started,
    Skipped,
    Failed,
    Denied,
}

/// The autofollow controller for one rule.
pub struct AutoFollowTask {
    rule: AutoFollowRule,
    pattern: IndexPattern,
    leader: Arc<dyn LeaderCluster>,
    jobs: Arc<dyn ReplicationJobs>,
    local: Arc<dyn FollowerCluster>,
    settings: watch::Receiver<ReplicationSettings>,
    in_flight: IndexSet,
    failed_indices: IndexSet,
    counters: AutoFollowCounters,
    retry_timer: Mutex<Option<RetryTimer>>,
    reported_local: Mutex<Option<BTreeSet<String>>>,
    consecutive_leader_failures: AtomicU64,
}

impl AutoFollowTask {
    /// Create a task for `rule`. Fails if the rule's pattern is invalid.
    pub fn new(
        rule: AutoFollowRule,
        leader: Arc<dyn LeaderCluster>,
        jobs: Arc<dyn ReplicationJobs>,
        local: Arc<dyn FollowerCluster>,
        settings: watch::Receiver<ReplicationSettings>,
    ) -> Result<Self, FollowerError> {
        rule.validate()?;
        let pattern = rule.index_pattern()?;
        Ok(Self {
            rule,
            pattern,
            leader,
            jobs,
            local,
            settings,
            in_flight: IndexSet::new(),
            failed_indices: IndexSet::new(),
            counters: AutoFollowCounters::new(),
            retry_timer: Mutex::new(None),
            reported_local: Mutex::new(None),
            consecutive_leader_failures: AtomicU64::new(0),
        })
    }

    /// Run the poll loop until `cancel` fires or a fatal leader error occurs.
    pub async fn execute(&self, cancel: CancellationToken) -> Result<(), FollowerError> {
        info!(
            rule = %self.rule.name,
            pattern = %self.pattern,
            leader = %self.rule.leader_alias,
            "Starting autofollow task"
        );

        while !cancel.is_cancelled() {
            let settings = self.settings.borrow().clone();
            self.ensure_retry_timer(&settings);
            self.run_once(&settings).await?;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(settings.poll_interval()) => {}
            }
        }

        info!(rule = %self.rule.name, "Autofollow task stopped");
        Ok(())
    }

    /// Cancel the pending retry timer. Called when the task is torn down.
    pub fn cleanup(&self) {
        let timer = self.retry_timer.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(timer) = timer {
            timer.cancel();
            debug!(rule = %self.rule.name, "Cancelled autofollow retry timer");
        }
    }

    /// Snapshot of the rule's statistics.
    pub fn status(&self) -> AutoFollowStat {
        self.counters
            .snapshot(&self.rule.name, &self.rule.pattern, self.failed_indices.snapshot())
    }

    /// The rule this task runs.
    pub fn rule(&self) -> &AutoFollowRule {
        &self.rule
    }

    /// Jobs currently bootstrapping.
    pub fn in_flight(&self) -> BTreeSet<String> {
        self.in_flight.snapshot()
    }

    /// Indices in cooldown.
    pub fn failed_indices(&self) -> BTreeSet<String> {
        self.failed_indices.snapshot()
    }

    /// One iteration: poll, classify a leader failure, stamp the execution time.
    async fn run_once(&self, settings: &ReplicationSettings) -> Result<(), FollowerError> {
        match self.poll_for_indices(settings).await {
            Ok(outcome) => {
                self.consecutive_leader_failures.store(0, Ordering::Relaxed);
                debug!(
                    rule = %self.rule.name,
                    candidates = outcome.candidates.len(),
                    admitted = outcome.admitted.len(),
                    failed = outcome.failed.len(),
                    in_flight = self.in_flight.len(),
                    "Autofollow poll complete"
                );
            }
            Err(e) => {
                self.counters.record_leader_failure();
                if classify_listing(&e) == ErrorKind::FatalClient {
                    error!(rule = %self.rule.name, error = %e, "Exiting autofollow task");
                    return Err(e);
                }
                let consecutive = self
                    .consecutive_leader_failures
                    .fetch_add(1, Ordering::Relaxed)
                    + 1;
                if logs_at_error(consecutive) {
                    error!(
                        rule = %self.rule.name,
                        consecutive,
                        error = %e,
                        "Fetching remote indices failed"
                    );
                } else {
                    debug!(
                        rule = %self.rule.name,
                        error = %e,
                        "Transient error while polling leader"
                    );
                }
            }
        }
        self.counters.mark_executed(chrono::Utc::now().timestamp_millis());
        Ok(())
    }

    /// Schedule the cooldown reset unless one is already pending.
    fn ensure_retry_timer(&self, settings: &ReplicationSettings) {
        let mut timer = self.retry_timer.lock().unwrap_or_else(PoisonError::into_inner);
        if timer.as_ref().is_some_and(RetryTimer::is_pending) {
            return;
        }
        let failed = self.failed_indices.clone();
        let rule = self.rule.name.clone();
        *timer = Some(RetryTimer::schedule(settings.retry_interval(), move || {
            debug!(rule = %rule, cleared = failed.len(), "Retrying failed autofollow indices");
            failed.clear();
        }));
    }

    /// List the leader, refresh in-flight jobs, and admit new ones.
    ///
    /// Only a failed leader listing is returned as an error.
    async fn poll_for_indices(
        &self,
        settings: &ReplicationSettings,
    ) -> Result<PollOutcome, FollowerError> {
        let listed = self
            .leader
            .list_indices(&self.rule.leader_alias, self.pattern.as_str())
            .await?;
        let remote = self.pattern.filter(listed);
        let local: BTreeSet<String> = self.local.index_names().into_iter().collect();

        let mut outcome = PollOutcome {
            collision_reported: self.report_collisions(&remote, &local),
            ..Default::default()
        };

        let mut seen = BTreeSet::new();
        outcome.candidates = remote
            .into_iter()
            .filter(|name| {
                !local.contains(name)
                    && !self.failed_indices.contains(name)
                    && !self.in_flight.contains(name)
                    && seen.insert(name.clone())
            })
            .collect();

        outcome.completed = self.refresh_in_flight().await;

        let limit = settings.autofollow_concurrent_jobs;
        let queued = self.in_flight.len();
        let mut run_failures = 0u64;
        if queued >= limit {
            debug!(
                rule = %self.rule.name,
                queued,
                limit,
                "Max concurrent replication jobs already in the queue"
            );
        } else {
            for index in outcome.candidates.iter().take(limit - queued) {
                match self.start_replication(index).await {
                    StartOutcome::Started => outcome.admitted.push(index.clone()),
                    StartOutcome::Skipped => {}
                    StartOutcome::Failed => {
                        run_failures += 1;
                        outcome.failed.push(index.clone());
                    }
                    StartOutcome::Denied => {
                        run_failures += 1;
                        outcome.denied.push(index.clone());
                    }
                }
            }
        }
        self.counters.set_run_failures(run_failures);

        Ok(outcome)
    }

    /// Log leader/follower name collisions once per distinct local index set.
    fn report_collisions(&self, remote: &[String], local: &BTreeSet<String>) -> bool {
        let collisions: Vec<&String> = remote.iter().filter(|n| local.contains(*n)).collect();
        if collisions.is_empty() {
            return false;
        }
        let mut reported = self.reported_local.lock().unwrap_or_else(PoisonError::into_inner);
        if reported.as_ref() == Some(local) {
            return false;
        }
        warn!(
            rule = %self.rule.name,
            leader = %self.rule.leader_alias,
            ?collisions,
            "Cannot initiate replication: indices with the same name already exist on the follower"
        );
        *reported = Some(local.clone());
        true
    }

    /// Drop in-flight jobs that are past bootstrapping. Returns the dropped names.
    async fn refresh_in_flight(&self) -> Vec<String> {
        let mut completed = Vec::new();
        for index in self.in_flight.snapshot() {
            match self.jobs.replication_status(&index).await {
                Ok(status) if !status.is_bootstrapping() => {
                    trace!(
                        rule = %self.rule.name,
                        index = %index,
                        ?status,
                        "Replication job left bootstrap"
                    );
                    completed.push(index);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(
                        rule = %self.rule.name,
                        index = %index,
                        error = %e,
                        "Status check failed; keeping job in flight"
                    );
                }
            }
        }
        self.in_flight.remove_all(&completed);
        completed
    }

    async fn start_replication(&self, leader_index: &str) -> StartOutcome {
        if self.local.has_index(leader_index) {
            info!(
                "Cannot replicate {}:{} as an index with the same name already exists",
                self.rule.leader_alias, leader_index
            );
            return StartOutcome::Skipped;
        }

        info!(
            rule = %self.rule.name,
            "Auto follow starting replication from {}:{} -> {}",
            self.rule.leader_alias, leader_index, leader_index
        );
        let request = StartReplicationRequest {
            leader_alias: self.rule.leader_alias.clone(),
            leader_index: leader_index.to_string(),
            follower_index: leader_index.to_string(),
            use_roles: self.rule.use_roles.clone(),
            settings: self.rule.index_settings.clone(),
            is_autofollow: true,
        };

        let result = match self.jobs.start_replication(request).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(FollowerError::NotAcknowledged {
                index: leader_index.to_string(),
            }),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.in_flight.insert(leader_index);
                self.failed_indices.remove(leader_index);
                self.counters.record_success();
                StartOutcome::Started
            }
            Err(e) if classify(&e) == ErrorKind::PermissionDenied => {
                warn!(
                    rule = %self.rule.name,
                    index = %leader_index,
                    error = %e,
                    "Cannot start replication due to missing permissions"
                );
                StartOutcome::Denied
            }
            Err(e) => {
                warn!(
                    rule = %self.rule.name,
                    error = %e,
                    "Failed to start replication for {}:{} -> {}",
                    self.rule.leader_alias, leader_index, leader_index
                );
                self.failed_indices.insert(leader_index);
                StartOutcome::Failed
            }
        }
    }
}
