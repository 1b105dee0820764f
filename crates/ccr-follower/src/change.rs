//! Change operations and batches fetched from the leader's operation log.
//!
//! A [`ChangeBatch`] is a contiguous slice of one leader shard's history. Batches are
//! produced by the change-fetch side and handed to the sequencer, which applies them
//! to the follower shard in sequence-number order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one shard of a follower index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId {
    /// Follower index name.
    pub index: String,
    /// Shard number within the index.
    pub shard: u32,
}

impl ShardId {
    /// Create a new shard id.
    pub fn new(index: impl Into<String>, shard: u32) -> Self {
        Self {
            index: index.into(),
            shard,
        }
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]", self.index, self.shard)
    }
}

/// Kind of operation recorded in the leader's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Index (create or overwrite) a document.
    Index {
        /// Document id.
        id: String,
        /// Serialized document source.
        source: Vec<u8>,
    },
    /// Delete a document.
    Delete {
        /// Document id.
        id: String,
    },
    /// Placeholder that fills a sequence number without touching documents.
    NoOp {
        /// Why the slot was filled.
        reason: String,
    },
}

/// A single operation from the leader's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Monotonically assigned sequence number within the shard.
    pub seq_no: i64,
    /// Primary term the operation was written under.
    pub primary_term: i64,
    /// What the operation does.
    pub kind: OpKind,
}

impl Operation {
    /// Create an index operation.
    pub fn index(seq_no: i64, primary_term: i64, id: impl Into<String>, source: Vec<u8>) -> Self {
        Self {
            seq_no,
            primary_term,
            kind: OpKind::Index {
                id: id.into(),
                source,
            },
        }
    }

    /// Create a delete operation.
    pub fn delete(seq_no: i64, primary_term: i64, id: impl Into<String>) -> Self {
        Self {
            seq_no,
            primary_term,
            kind: OpKind::Delete { id: id.into() },
        }
    }

    /// Create a no-op.
    pub fn no_op(seq_no: i64, primary_term: i64, reason: impl Into<String>) -> Self {
        Self {
            seq_no,
            primary_term,
            kind: OpKind::NoOp {
                reason: reason.into(),
            },
        }
    }
}

/// A contiguous, ordered slice of the leader's operation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch {
    /// Sequence number the batch starts at.
    pub from_seq_no: i64,
    /// Operations ordered by sequence number.
    pub operations: Vec<Operation>,
    /// Passed through untouched to the replay step.
    pub max_seq_no_of_updates_or_deletes: i64,
}

impl ChangeBatch {
    /// Create a new batch.
    pub fn new(
        from_seq_no: i64,
        operations: Vec<Operation>,
        max_seq_no_of_updates_or_deletes: i64,
    ) -> Self {
        Self {
            from_seq_no,
            operations,
            max_seq_no_of_updates_or_deletes,
        }
    }

    /// Sequence number of the last operation, if any.
    pub fn last_seq_no(&self) -> Option<i64> {
        self.operations.last().map(|op| op.seq_no)
    }

    /// Number of operations in the batch.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the batch carries no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(from: i64, to: i64) -> ChangeBatch {
        let ops = (from..=to)
            .map(|s| Operation::index(s, 1, format!("doc-{}", s), vec![]))
            .collect();
        ChangeBatch::new(from, ops, to)
    }

    #[test]
    fn test_shard_id_display() {
        assert_eq!(ShardId::new("logs-2024", 3).to_string(), "[logs-2024][3]");
    }

    #[test]
    fn test_last_seq_no() {
        let b = batch(10, 14);
        assert_eq!(b.last_seq_no(), Some(14));
        assert_eq!(b.len(), 5);
        assert!(!b.is_empty());
    }

    #[test]
    fn test_empty_batch() {
        let b = ChangeBatch::new(7, vec![], -1);
        assert_eq!(b.last_seq_no(), None);
        assert!(b.is_empty());
    }

    #[test]
    fn test_operation_constructors() {
        assert_eq!(
            Operation::delete(4, 2, "a").kind,
            OpKind::Delete {
                id: "a".to_string()
            }
        );
        let noop = Operation::no_op(5, 2, "gap fill");
        assert_eq!(noop.seq_no, 5);
        assert!(matches!(noop.kind, OpKind::NoOp { .. }));
    }

    #[test]
    fn test_op_kind_serde_tag() {
        let json = serde_json::to_string(&OpKind::Delete {
            id: "x".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"delete":{"id":"x"}}"#);
    }
}
