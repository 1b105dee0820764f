//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ccr_follower::{
    ChangeBatch, FollowerCluster, FollowerError, LeaderCluster, Operation, ReplayApplier,
    ReplayRequest, ReplayResponse, ReplicationJobs, ReplicationStatus, StartReplicationRequest,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Batch covering `from..=to`.
pub fn batch(from: i64, to: i64) -> ChangeBatch {
    let ops = (from..=to)
        .map(|s| {
            let source = format!("{{\"n\":{}}}", s).into_bytes();
            Operation::index(s, 1, format!("doc-{}", s), source)
        })
        .collect();
    ChangeBatch::new(from, ops, to)
}

/// Wait until `cond` holds, yielding to other tasks between checks.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..5_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

/// A follower shard that records replay dispatch and completion order.
#[derive(Default)]
pub struct MemoryShard {
    dispatched: Mutex<Vec<i64>>,
    completed: Mutex<Vec<i64>>,
    applied: Mutex<Vec<i64>>,
    gates: Mutex<HashMap<i64, Arc<Notify>>>,
    reject: Mutex<BTreeSet<i64>>,
}

impl MemoryShard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hold the replay starting at `seq_no` until the returned gate is notified.
    pub fn gate(&self, seq_no: i64) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(seq_no, notify.clone());
        notify
    }

    /// Reject the operation with this sequence number.
    pub fn reject(&self, seq_no: i64) {
        self.reject.lock().unwrap().insert(seq_no);
    }

    /// First sequence number of each replay, in dispatch order.
    pub fn dispatched(&self) -> Vec<i64> {
        self.dispatched.lock().unwrap().clone()
    }

    /// First sequence number of each replay, in completion order.
    pub fn completed(&self) -> Vec<i64> {
        self.completed.lock().unwrap().clone()
    }

    /// Every applied operation's sequence number, in application order.
    pub fn applied(&self) -> Vec<i64> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplayApplier for MemoryShard {
    async fn replay(&self, request: ReplayRequest) -> Result<ReplayResponse, FollowerError> {
        let first = request.operations.first().map(|op| op.seq_no).unwrap_or(-1);
        self.dispatched.lock().unwrap().push(first);

        let gate = self.gates.lock().unwrap().get(&first).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut response = ReplayResponse::ok();
        {
            let reject = self.reject.lock().unwrap();
            let mut applied = self.applied.lock().unwrap();
            for op in &request.operations {
                if reject.contains(&op.seq_no) {
                    response.failed += 1;
                    response.failures.push(format!("version conflict at {}", op.seq_no));
                } else {
                    applied.push(op.seq_no);
                }
            }
        }
        self.completed.lock().unwrap().push(first);
        Ok(response)
    }
}

/// Leader and follower clusters plus the job registry in one in-memory model.
///
/// Starting replication creates the follower index, as the real job does.
#[derive(Default)]
pub struct MemoryClusters {
    leader: Mutex<Vec<String>>,
    follower: Mutex<BTreeSet<String>>,
    jobs: Mutex<BTreeMap<String, ReplicationStatus>>,
    started: Mutex<Vec<StartReplicationRequest>>,
    refuse: Mutex<BTreeSet<String>>,
    deny: Mutex<BTreeSet<String>>,
    list_error: Mutex<Option<u16>>,
    list_calls: Mutex<u64>,
}

impl MemoryClusters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn create_leader_index(&self, name: &str) {
        self.leader.lock().unwrap().push(name.to_string());
    }

    pub fn create_follower_index(&self, name: &str) {
        self.follower.lock().unwrap().insert(name.to_string());
    }

    /// Move a job past bootstrap.
    pub fn finish_bootstrap(&self, index: &str) {
        self.jobs.lock().unwrap().insert(index.to_string(), ReplicationStatus::Syncing);
    }

    /// Start requests for `index` come back unacknowledged.
    pub fn refuse(&self, index: &str) {
        self.refuse.lock().unwrap().insert(index.to_string());
    }

    pub fn accept(&self, index: &str) {
        self.refuse.lock().unwrap().remove(index);
    }

    /// Start requests for `index` fail with a permission error.
    pub fn deny(&self, index: &str) {
        self.deny.lock().unwrap().insert(index.to_string());
    }

    /// Make leader listings fail with this HTTP status, or succeed again with `None`.
    pub fn fail_listing(&self, status: Option<u16>) {
        *self.list_error.lock().unwrap() = status;
    }

    pub fn list_calls(&self) -> u64 {
        *self.list_calls.lock().unwrap()
    }

    /// Leader index of every start request, in request order.
    pub fn start_attempts(&self) -> Vec<String> {
        self.started.lock().unwrap().iter().map(|r| r.leader_index.clone()).collect()
    }

    pub fn attempts_for(&self, index: &str) -> usize {
        self.start_attempts().iter().filter(|n| *n == index).count()
    }

    pub fn bootstrapping(&self) -> Vec<String> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| s.is_bootstrapping())
            .map(|(n, _)| n.clone())
            .collect()
    }
}

#[async_trait]
impl LeaderCluster for MemoryClusters {
    async fn list_indices(
        &self,
        _leader_alias: &str,
        _pattern: &str,
    ) -> Result<Vec<String>, FollowerError> {
        *self.list_calls.lock().unwrap() += 1;
        match *self.list_error.lock().unwrap() {
            Some(status) => Err(FollowerError::Remote {
                status,
                msg: "leader listing failed".to_string(),
            }),
            None => Ok(self.leader.lock().unwrap().clone()),
        }
    }
}

#[async_trait]
impl ReplicationJobs for MemoryClusters {
    async fn start_replication(
        &self,
        request: StartReplicationRequest,
    ) -> Result<bool, FollowerError> {
        let index = request.follower_index.clone();
        self.started.lock().unwrap().push(request);
        if self.deny.lock().unwrap().contains(&index) {
            return Err(FollowerError::PermissionDenied {
                msg: format!("no permissions to follow {}", index),
            });
        }
        if self.refuse.lock().unwrap().contains(&index) {
            return Ok(false);
        }
        self.follower.lock().unwrap().insert(index.clone());
        self.jobs.lock().unwrap().insert(index, ReplicationStatus::Bootstrapping);
        Ok(true)
    }

    async fn replication_status(
        &self,
        follower_index: &str,
    ) -> Result<ReplicationStatus, FollowerError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .get(follower_index)
            .copied()
            .unwrap_or(ReplicationStatus::NotInProgress))
    }
}

impl FollowerCluster for MemoryClusters {
    fn index_names(&self) -> Vec<String> {
        self.follower.lock().unwrap().iter().cloned().collect()
    }
}
