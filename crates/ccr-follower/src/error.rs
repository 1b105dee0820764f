//! Error types for the follower engine.

use thiserror::Error;

/// HTTP-style status code leaders use to signal rate limiting.
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Errors that can occur in the follower engine.
#[derive(Debug, Error)]
pub enum FollowerError {
    /// The leader answered with an error status.
    #[error("leader returned status {status}: {msg}")]
    Remote {
        /// Status code reported by the leader.
        status: u16,
        /// Error message describing the issue.
        msg: String,
    },

    /// Transport-level failure talking to a remote cluster.
    #[error("network error: {msg}")]
    Network {
        /// Error message describing the network issue.
        msg: String,
    },

    /// The configured roles lack the privileges for the request.
    #[error("permission denied: {msg}")]
    PermissionDenied {
        /// Error message from the security layer.
        msg: String,
    },

    /// A replication start request was not acknowledged.
    #[error("start replication for {index} was not acknowledged")]
    NotAcknowledged {
        /// Leader index the request was issued for.
        index: String,
    },

    /// The replay collaborator reported per-operation failures.
    #[error("{shard} replay failed for {failed} operation(s): {failures:?}")]
    ReplayFailed {
        /// Follower shard being replayed.
        shard: String,
        /// Number of failed operations.
        failed: u64,
        /// Failure messages reported by the store.
        failures: Vec<String>,
    },

    /// The sequencer stopped after a replay failure.
    #[error("{shard} sequencer failed: {reason}")]
    SequencerFailed {
        /// Follower shard owning the sequencer.
        shard: String,
        /// The failure that terminated the consumer loop.
        reason: String,
    },

    /// The sequencer no longer accepts batches.
    #[error("{shard} sequencer is closed")]
    SequencerClosed {
        /// Follower shard owning the sequencer.
        shard: String,
    },

    /// An index pattern expression could not be parsed.
    #[error("invalid index pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending expression.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A settings value is out of range.
    #[error("invalid settings: {msg}")]
    InvalidSettings {
        /// Description of the rejected value.
        msg: String,
    },

    /// The configuration file is unusable.
    #[error("config error: {msg}")]
    Config {
        /// Description of the problem.
        msg: String,
    },

    /// I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    /// TOML parse error.
    #[error("TOML error")]
    Toml(#[from] toml::de::Error),
}

/// How the engine reacts to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 5xx, rate limited, or generic network failure: retry after the poll delay.
    TransientRemote,
    /// 4xx other than rate limiting: stop the autofollow controller.
    FatalClient,
    /// Role assignment problem: log it, keep the candidate eligible.
    PermissionDenied,
    /// Start request failed for any other reason: cool the candidate down.
    GenericStartFailure,
    /// Replay failure: fatal to the sequencer instance.
    Sequencing,
}

impl ErrorKind {
    /// Returns true if the owning task must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalClient | Self::Sequencing)
    }
}

/// Classify a status code returned by a remote cluster.
pub fn classify_status(status: u16) -> ErrorKind {
    if status < 500 && status != TOO_MANY_REQUESTS {
        ErrorKind::FatalClient
    } else {
        ErrorKind::TransientRemote
    }
}

/// Classify an error into the engine's failure taxonomy.
pub fn classify(err: &FollowerError) -> ErrorKind {
    match err {
        FollowerError::Remote { status, .. } => classify_status(*status),
        FollowerError::Network { .. } | FollowerError::Io(_) => ErrorKind::TransientRemote,
        FollowerError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
        FollowerError::ReplayFailed { .. }
        | FollowerError::SequencerFailed { .. }
        | FollowerError::SequencerClosed { .. } => ErrorKind::Sequencing,
        FollowerError::NotAcknowledged { .. }
        | FollowerError::InvalidPattern { .. }
        | FollowerError::InvalidSettings { .. }
        | FollowerError::Config { .. }
        | FollowerError::Json(_)
        | FollowerError::Toml(_) => ErrorKind::GenericStartFailure,
    }
}

/// Classify a failed leader index listing.
///
/// A listing refused for lack of privileges means the rule's pattern or roles are
/// wrong, so it is fatal like any other client error. The permission carve-out of
/// [`classify`] only applies to job starts.
pub fn classify_listing(err: &FollowerError) -> ErrorKind {
    match classify(err) {
        ErrorKind::PermissionDenied => ErrorKind::FatalClient,
        kind => kind,
    }
}
