//! Ordering funnel between change fetchers and the follower shard.
//!
//! Fetchers may deliver [`ChangeBatch`]es in any order and may resend them. The
//! sequencer buffers every batch under its starting sequence number and a single
//! consumer task hands batches to the [`ReplayApplier`] strictly in sequence order:
//! a batch is released only when it starts right after the current high watermark.
//!
//! Dispatch is fire-and-forget. The consumer advances the watermark as soon as a
//! replay task is spawned, so batches are *submitted* in order but may *complete* in
//! any order; the follower store sequences the writes itself. Up to
//! `writers_per_shard` replay tasks run at once.
//!
//! Any replay failure is fatal: the consumer stops and every later [`send`] returns
//! the same error until the owner builds a new sequencer.
//!
//! [`send`]: TranslogSequencer::send

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::change::{ChangeBatch, ShardId};
use crate::cluster::{ReplayApplier, ReplayRequest};
use crate::error::FollowerError;
use crate::settings::ReplicationSettings;
use crate::stats::{ReplayCounters, ShardReplayStats};

/// Configuration for one shard's sequencer.
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Follower shard the batches are applied to.
    pub shard_id: ShardId,
    /// Alias of the leader cluster.
    pub leader_alias: String,
    /// Leader index the changes come from.
    pub leader_index: String,
    /// Sequence number already applied on the follower (-1 for an empty shard).
    pub initial_seq_no: i64,
    /// Maximum concurrent replay tasks.
    pub writers_per_shard: usize,
}

impl SequencerConfig {
    /// Create a config for a shard that has applied nothing yet, with default settings.
    pub fn new(
        shard_id: ShardId,
        leader_alias: impl Into<String>,
        leader_index: impl Into<String>,
    ) -> Self {
        Self {
            shard_id,
            leader_alias: leader_alias.into(),
            leader_index: leader_index.into(),
            initial_seq_no: -1,
            writers_per_shard: ReplicationSettings::default().concurrent_writers_per_shard,
        }
    }

    /// Take the writer bound from the live replication settings.
    pub fn with_settings(mut self, settings: &ReplicationSettings) -> Self {
        self.writers_per_shard = settings.concurrent_writers_per_shard;
        self
    }
}

/// First failure wins; later failures are only logged.
#[derive(Debug, Default)]
struct FailureSlot {
    reason: OnceLock<String>,
    tripped: CancellationToken,
}

impl FailureSlot {
    fn fail(&self, reason: String) {
        let _ = self.reason.set(reason);
        self.tripped.cancel();
    }

    fn reason(&self) -> Option<&String> {
        self.reason.get()
    }
}

type Unapplied = Arc<Mutex<HashMap<i64, ChangeBatch>>>;

/// Serializes replay of out-of-order change batches for one follower shard.
pub struct TranslogSequencer {
    shard_id: ShardId,
    unapplied: Unapplied,
    signals: Mutex<Option<mpsc::UnboundedSender<()>>>,
    consumer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    failure: Arc<FailureSlot>,
    counters: Arc<ReplayCounters>,
}

impl TranslogSequencer {
    /// Start a sequencer; spawns its consumer on the current tokio runtime.
    pub fn start(config: SequencerConfig, applier: Arc<dyn ReplayApplier>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let unapplied: Unapplied = Arc::new(Mutex::new(HashMap::new()));
        let failure = Arc::new(FailureSlot::default());
        let counters = Arc::new(ReplayCounters::new(config.initial_seq_no));

        let consumer = SequencerLoop {
            high_watermark: config.initial_seq_no,
            writers: Arc::new(Semaphore::new(config.writers_per_shard.max(1))),
            shard_id: config.shard_id.clone(),
            leader_alias: config.leader_alias,
            leader_index: config.leader_index,
            unapplied: Arc::clone(&unapplied),
            failure: Arc::clone(&failure),
            counters: Arc::clone(&counters),
            applier,
        };
        let handle = tokio::spawn(consumer.run(rx));

        Self {
            shard_id: config.shard_id,
            unapplied,
            signals: Mutex::new(Some(tx)),
            consumer: tokio::sync::Mutex::new(Some(handle)),
            failure,
            counters,
        }
    }

    /// Queue a batch for in-order application. Never waits on the consumer.
    ///
    /// A batch with the same `from_seq_no` as one still buffered replaces it.
    pub fn send(&self, batch: ChangeBatch) -> Result<(), FollowerError> {
        if let Some(reason) = self.failure.reason() {
            return Err(self.failed(reason));
        }

        let signals = self.signals.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = signals.as_ref().filter(|tx| !tx.is_closed()) {
            let buffered = {
                let mut unapplied = self.unapplied.lock().unwrap_or_else(PoisonError::into_inner);
                unapplied.insert(batch.from_seq_no, batch);
                unapplied.len()
            };
            self.counters
                .buffered_batches
                .store(buffered as u64, Ordering::Relaxed);
            if tx.send(()).is_ok() {
                return Ok(());
            }
        }
        match self.failure.reason() {
            Some(reason) => Err(self.failed(reason)),
            None => Err(FollowerError::SequencerClosed {
                shard: self.shard_id.to_string(),
            }),
        }
    }

    /// Stop accepting batches and wait for the consumer to drain.
    ///
    /// Every contiguous batch already buffered is dispatched before this returns;
    /// replay tasks it spawned may still be running. Returns the sequencing failure
    /// if one stopped the consumer.
    pub async fn close(&self) -> Result<(), FollowerError> {
        drop(self.signals.lock().unwrap_or_else(PoisonError::into_inner).take());

        if let Some(handle) = self.consumer.lock().await.take() {
            if let Err(e) = handle.await {
                self.failure.fail(format!("consumer task aborted: {}", e));
            }
        }
        info!(shard = %self.shard_id, "Sequencer closed");

        match self.failure.reason() {
            Some(reason) => Err(self.failed(reason)),
            None => Ok(()),
        }
    }

    /// Follower shard this sequencer feeds.
    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    /// Returns true once a replay failure has stopped the sequencer.
    pub fn is_failed(&self) -> bool {
        self.failure.reason().is_some()
    }

    /// Snapshot of the replay statistics.
    pub fn stats(&self) -> ShardReplayStats {
        self.counters.snapshot()
    }

    fn failed(&self, reason: &str) -> FollowerError {
        FollowerError::SequencerFailed {
            shard: self.shard_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// State owned by the consumer task.
struct SequencerLoop {
    high_watermark: i64,
    writers: Arc<Semaphore>,
    shard_id: ShardId,
    leader_alias: String,
    leader_index: String,
    unapplied: Unapplied,
    failure: Arc<FailureSlot>,
    counters: Arc<ReplayCounters>,
    applier: Arc<dyn ReplayApplier>,
}

impl SequencerLoop {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<()>) {
        let tripped = self.failure.tripped.clone();
        loop {
            let signal = tokio::select! {
                biased;
                _ = tripped.cancelled() => break,
                signal = rx.recv() => signal,
            };
            if signal.is_none() {
                break;
            }
            if !self.dispatch_ready(&tripped).await {
                break;
            }
        }
        rx.close();
        debug!(
            shard = %self.shard_id,
            high_watermark = self.high_watermark,
            "Sequencer consumer exited"
        );
    }

    /// Dispatch every batch contiguous with the watermark. Returns false on failure.
    async fn dispatch_ready(&mut self, tripped: &CancellationToken) -> bool {
        while let Some(next) = self.take_next() {
            let permit = tokio::select! {
                biased;
                _ = tripped.cancelled() => return false,
                permit = Arc::clone(&self.writers).acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                return false;
            };

            let from_seq_no = next.from_seq_no;
            self.high_watermark = next.last_seq_no().unwrap_or(self.high_watermark);
            self.counters.high_watermark.store(self.high_watermark, Ordering::Relaxed);
            self.counters.batches_dispatched.fetch_add(1, Ordering::Relaxed);
            debug!(
                shard = %self.shard_id,
                from_seq_no,
                high_watermark = self.high_watermark,
                ops = next.len(),
                "Dispatching replay"
            );
            self.spawn_replay(next, permit);
        }
        true
    }

    fn take_next(&self) -> Option<ChangeBatch> {
        let mut unapplied = self.unapplied.lock().unwrap_or_else(PoisonError::into_inner);
        let next = unapplied.remove(&(self.high_watermark + 1));
        self.counters.buffered_batches.store(unapplied.len() as u64, Ordering::Relaxed);
        next
    }

    fn spawn_replay(&self, batch: ChangeBatch, permit: OwnedSemaphorePermit) {
        let request = ReplayRequest {
            shard_id: self.shard_id.clone(),
            leader_alias: self.leader_alias.clone(),
            leader_index: self.leader_index.clone(),
            operations: batch.operations,
            max_seq_no_of_updates_or_deletes: batch.max_seq_no_of_updates_or_deletes,
        };
        let applier = Arc::clone(&self.applier);
        let failure = Arc::clone(&self.failure);
        let counters = Arc::clone(&self.counters);
        let shard = self.shard_id.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let started = Instant::now();
            let op_count = request.operations.len() as u64;

            match applier.replay(request).await {
                Ok(response) if response.failed == 0 => {
                    counters.ops_written.fetch_add(op_count, Ordering::Relaxed);
                    counters
                        .total_write_time_millis
                        .fetch_add(started.elapsed().as_millis() as u64, Ordering::Relaxed);
                }
                Ok(response) => {
                    for (i, failure) in response.failures.iter().enumerate() {
                        error!(
                            shard = %shard,
                            "Failed replaying changes. Failure:{}:{}", i, failure
                        );
                    }
                    counters.ops_write_failures.fetch_add(response.failed, Ordering::Relaxed);
                    let err = FollowerError::ReplayFailed {
                        shard: shard.to_string(),
                        failed: response.failed,
                        failures: response.failures,
                    };
                    failure.fail(err.to_string());
                }
                Err(e) => {
                    error!(shard = %shard, error = %e, "Replay request failed");
                    failure.fail(e.to_string());
                }
            }
        });
    }
}
