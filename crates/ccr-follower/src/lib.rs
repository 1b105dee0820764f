#![warn(missing_docs)]

//! Cross-cluster replication follower: in-order change replay and autofollow admission.
//!
//! [`sequencer::TranslogSequencer`] funnels out-of-order change batches for one follower
//! shard into sequence-number order. [`autofollow::AutoFollowTask`] polls a leader cluster
//! for indices matching a rule and starts a bounded number of replication jobs.

pub mod autofollow;
pub mod change;
pub mod cluster;
pub mod config;
pub mod error;
pub mod index_set;
pub mod metrics;
pub mod pattern;
pub mod retry_timer;
pub mod sequencer;
pub mod settings;
pub mod stats;

pub use autofollow::{AutoFollowTask, PollOutcome};
pub use change::{ChangeBatch, OpKind, Operation, ShardId};
pub use cluster::{
    FollowerCluster, LeaderCluster, ReplayApplier, ReplayRequest, ReplayResponse, ReplicationJobs,
    ReplicationStatus, RoleMapping, StartReplicationRequest,
};
pub use config::{AutoFollowRule, FollowerConfig};
pub use error::{classify, ErrorKind, FollowerError};
pub use pattern::IndexPattern;
pub use sequencer::{SequencerConfig, TranslogSequencer};
pub use settings::{ReplicationSettings, SettingsHandle};
pub use stats::{AutoFollowClusterStats, AutoFollowStat, ShardReplayStats};
