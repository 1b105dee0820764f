//! Collaborator interfaces the follower engine drives.
//!
//! The engine never talks to a cluster directly. Replaying changes, listing leader
//! indices, starting replication jobs and reading local metadata all go through the
//! traits in this module, so callers plug in their own transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::change::{Operation, ShardId};
use crate::error::FollowerError;

/// Request to apply a contiguous run of leader operations to a follower shard.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRequest {
    /// Shard the operations are applied to.
    pub shard_id: ShardId,
    /// Alias of the leader cluster.
    pub leader_alias: String,
    /// Leader index the operations came from.
    pub leader_index: String,
    /// Operations in sequence-number order.
    pub operations: Vec<Operation>,
    /// Carried over from the originating batch.
    pub max_seq_no_of_updates_or_deletes: i64,
}

/// Outcome of a replay request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayResponse {
    /// Number of operations that failed to apply.
    pub failed: u64,
    /// Failure descriptions, one per failed operation.
    pub failures: Vec<String>,
}

impl ReplayResponse {
    /// A response with no failures.
    pub fn ok() -> Self {
        Self::default()
    }
}

/// Applies replayed operations to follower storage.
#[async_trait]
pub trait ReplayApplier: Send + Sync + 'static {
    /// Apply the request's operations, reporting per-operation failures.
    async fn replay(&self, request: ReplayRequest) -> Result<ReplayResponse, FollowerError>;
}

/// Read access to the leader cluster.
#[async_trait]
pub trait LeaderCluster: Send + Sync + 'static {
    /// List open leader indices matching `pattern`, in the leader's order.
    async fn list_indices(
        &self,
        leader_alias: &str,
        pattern: &str,
    ) -> Result<Vec<String>, FollowerError>;
}

/// Roles the replication job runs under on each side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMapping {
    /// Role used against the leader cluster.
    pub leader_cluster_role: String,
    /// Role used on the follower cluster.
    pub follower_cluster_role: String,
}

/// Request to start replicating one leader index.
#[derive(Debug, Clone, PartialEq)]
pub struct StartReplicationRequest {
    /// Alias of the leader cluster.
    pub leader_alias: String,
    /// Leader index name.
    pub leader_index: String,
    /// Follower index name.
    pub follower_index: String,
    /// Optional role mapping for the job.
    pub use_roles: Option<RoleMapping>,
    /// Index settings applied to the follower index.
    pub settings: BTreeMap<String, String>,
    /// Set when the request was issued by an autofollow rule.
    pub is_autofollow: bool,
}

/// Replication state of a follower index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationStatus {
    /// Initial copy of the leader index is still running.
    Bootstrapping,
    /// Following the leader's change stream.
    Syncing,
    /// Paused by an operator or after an error.
    Paused,
    /// The job failed.
    Failed,
    /// No replication job exists for the index.
    NotInProgress,
}

impl ReplicationStatus {
    /// Returns true while the job is still in its bootstrap phase.
    pub fn is_bootstrapping(&self) -> bool {
        matches!(self, Self::Bootstrapping)
    }
}

/// Starts replication jobs and reports their state.
#[async_trait]
pub trait ReplicationJobs: Send + Sync + 'static {
    /// Start a replication job. Returns whether the request was acknowledged.
    async fn start_replication(
        &self,
        request: StartReplicationRequest,
    ) -> Result<bool, FollowerError>;

    /// Current status of the job replicating into `follower_index`.
    async fn replication_status(
        &self,
        follower_index: &str,
    ) -> Result<ReplicationStatus, FollowerError>;
}

/// Metadata view of the local (follower) cluster.
pub trait FollowerCluster: Send + Sync + 'static {
    /// All index names on the follower cluster, open and closed.
    fn index_names(&self) -> Vec<String>;

    /// Returns true if an index with this name exists locally.
    fn has_index(&self, name: &str) -> bool {
        self.index_names().iter().any(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticCluster(Vec<String>);

    impl FollowerCluster for StaticCluster {
        fn index_names(&self) -> Vec<String> {
            self.0.clone()
        }
    }

    #[test]
    fn test_has_index_default() {
        let cluster = StaticCluster(vec!["logs-1".to_string(), "metrics".to_string()]);
        assert!(cluster.has_index("metrics"));
        assert!(!cluster.has_index("logs-2"));
    }

    #[test]
    fn test_status_bootstrapping() {
        assert!(ReplicationStatus::Bootstrapping.is_bootstrapping());
        assert!(!ReplicationStatus::Syncing.is_bootstrapping());
        assert!(!ReplicationStatus::NotInProgress.is_bootstrapping());
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&ReplicationStatus::NotInProgress).unwrap();
        assert_eq!(json, "\"NOT_IN_PROGRESS\"");
    }

    #[test]
    fn test_replay_response_ok() {
        let resp = ReplayResponse::ok();
        assert_eq!(resp.failed, 0);
        assert!(resp.failures.is_empty());
    }
}
