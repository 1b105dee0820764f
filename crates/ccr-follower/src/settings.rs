//! Dynamic replication settings.
//!
//! Settings are published through a [`SettingsHandle`]; running autofollow tasks
//! hold a receiver and read a fresh snapshot on every poll, so updates take effect
//! without restarting anything.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use crate::error::FollowerError;

/// Upper bound on concurrently starting jobs per autofollow rule.
pub const MAX_AUTOFOLLOW_CONCURRENT_JOBS: usize = 10;

/// Replication settings adjustable at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationSettings {
    /// How often autofollow rules poll the leader for new indices.
    pub autofollow_poll_interval_ms: u64,
    /// How long a failed index stays excluded before it is retried.
    pub autofollow_retry_interval_ms: u64,
    /// Maximum replication jobs an autofollow rule keeps bootstrapping at once.
    pub autofollow_concurrent_jobs: usize,
    /// Maximum concurrent replay tasks per follower shard.
    pub concurrent_writers_per_shard: usize,
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            autofollow_poll_interval_ms: 30_000,
            autofollow_retry_interval_ms: 3_600_000,
            autofollow_concurrent_jobs: 3,
            concurrent_writers_per_shard: 2,
        }
    }
}

impl ReplicationSettings {
    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.autofollow_poll_interval_ms)
    }

    /// Retry interval as a duration.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.autofollow_retry_interval_ms)
    }

    /// Check every value is within range.
    pub fn validate(&self) -> Result<(), FollowerError> {
        if self.autofollow_poll_interval_ms == 0 {
            return Err(FollowerError::InvalidSettings {
                msg: "autofollow_poll_interval_ms must be positive".to_string(),
            });
        }
        if self.autofollow_retry_interval_ms == 0 {
            return Err(FollowerError::InvalidSettings {
                msg: "autofollow_retry_interval_ms must be positive".to_string(),
            });
        }
        if !(1..=MAX_AUTOFOLLOW_CONCURRENT_JOBS).contains(&self.autofollow_concurrent_jobs) {
            return Err(FollowerError::InvalidSettings {
                msg: format!(
                    "autofollow_concurrent_jobs must be between 1 and {}, got {}",
                    MAX_AUTOFOLLOW_CONCURRENT_JOBS, self.autofollow_concurrent_jobs
                ),
            });
        }
        if self.concurrent_writers_per_shard == 0 {
            return Err(FollowerError::InvalidSettings {
                msg: "concurrent_writers_per_shard must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Publishes validated settings to running tasks.
#[derive(Debug)]
pub struct SettingsHandle {
    tx: watch::Sender<ReplicationSettings>,
}

impl SettingsHandle {
    /// Create a handle with validated initial settings.
    pub fn new(initial: ReplicationSettings) -> Result<Self, FollowerError> {
        initial.validate()?;
        let (tx, _rx) = watch::channel(initial);
        Ok(Self { tx })
    }

    /// A receiver for a task that needs the live settings.
    pub fn subscribe(&self) -> watch::Receiver<ReplicationSettings> {
        self.tx.subscribe()
    }

    /// Current settings.
    pub fn current(&self) -> ReplicationSettings {
        self.tx.borrow().clone()
    }

    /// Validate and publish new settings.
    pub fn update(&self, settings: ReplicationSettings) -> Result<(), FollowerError> {
        settings.validate()?;
        info!(?settings, "Replication settings updated");
        self.tx.send_replace(settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = ReplicationSettings::default();
        assert_eq!(s.poll_interval(), Duration::from_secs(30));
        assert_eq!(s.retry_interval(), Duration::from_secs(3600));
        assert_eq!(s.autofollow_concurrent_jobs, 3);
        assert_eq!(s.concurrent_writers_per_shard, 2);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let bad = [
            ReplicationSettings {
                autofollow_poll_interval_ms: 0,
                ..Default::default()
            },
            ReplicationSettings {
                autofollow_retry_interval_ms: 0,
                ..Default::default()
            },
            ReplicationSettings {
                autofollow_concurrent_jobs: 0,
                ..Default::default()
            },
            ReplicationSettings {
                autofollow_concurrent_jobs: 11,
                ..Default::default()
            },
            ReplicationSettings {
                concurrent_writers_per_shard: 0,
                ..Default::default()
            },
        ];
        for s in bad {
            assert!(matches!(s.validate(), Err(FollowerError::InvalidSettings { .. })));
        }
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let s: ReplicationSettings =
            serde_json::from_str(r#"{"autofollow_concurrent_jobs": 5}"#).unwrap();
        assert_eq!(s.autofollow_concurrent_jobs, 5);
        assert_eq!(s.autofollow_poll_interval_ms, 30_000);
    }

    #[tokio::test]
    async fn test_update_reaches_subscribers() {
        let handle = SettingsHandle::new(ReplicationSettings::default()).unwrap();
        let mut rx = handle.subscribe();

        let next = ReplicationSettings {
            autofollow_concurrent_jobs: 7,
            ..Default::default()
        };
        handle.update(next.clone()).unwrap();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), next);
        assert_eq!(handle.current(), next);
    }

    #[test]
    fn test_invalid_update_is_not_published() {
        let handle = SettingsHandle::new(ReplicationSettings::default()).unwrap();
        let rx = handle.subscribe();
        let bad = ReplicationSettings {
            concurrent_writers_per_shard: 0,
            ..Default::default()
        };
        assert!(handle.update(bad).is_err());
        assert_eq!(rx.borrow().concurrent_writers_per_shard, 2);
    }
}
